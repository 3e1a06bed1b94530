//! Shared utilities for CLI commands

use serde_json::{Map, Value};
use tabled::{Table, settings::Style};

use crate::cli::error::{CliError, CliResult};

/// Truncate a string with ellipsis if it exceeds max length
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max - 3).collect();
        format!("{}...", truncated)
    }
}

/// `-` for absent values
pub fn or_dash(value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "-".to_string())
}

/// Join a list for a table cell, `-` when empty
pub fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

/// Build a parameter object from an optional JSON object and `key=value` pairs.
///
/// Pair values are parsed as JSON when possible (`project_id=7` is a number),
/// otherwise kept as strings. Pairs override keys of the JSON object.
pub fn build_params(json: Option<&str>, pairs: &[String]) -> CliResult<Map<String, Value>> {
    let mut params = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(CliError::invalid_input("--params must be a JSON object")),
            Err(e) => {
                return Err(CliError::invalid_input(format!(
                    "--params is not valid JSON: {}",
                    e
                )));
            }
        },
        None => Map::new(),
    };

    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            CliError::invalid_input(format!("expected key=value, got '{}'", pair))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::invalid_input(format!(
                "empty key in '{}'",
                pair
            )));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        params.insert(key.to_string(), value);
    }

    Ok(params)
}

/// Apply consistent table styling
pub fn apply_table_style(table: &mut Table) {
    table.with(Style::rounded());
}

#[cfg(test)]
#[path = "utils_test.rs"]
mod utils_test;
