//! Template context for report-style tools.

use chrono::Utc;
use serde_json::{Value, json};

use crate::db::Params;
use crate::upstream::{ReportWeek, Tool};

/// Flatten a HAL work package collection (or a plain list) into rows.
pub(crate) fn work_packages(raw: &Value) -> Vec<Value> {
    let elements = raw
        .pointer("/_embedded/elements")
        .and_then(Value::as_array)
        .or_else(|| raw.as_array());

    elements
        .map(|items| items.iter().map(work_package_row).collect())
        .unwrap_or_default()
}

fn work_package_row(wp: &Value) -> Value {
    json!({
        "id": wp.get("id").cloned().unwrap_or(Value::Null),
        "subject": wp.get("subject").cloned().unwrap_or(Value::Null),
        "status": link_title(wp, "status"),
        "priority": link_title(wp, "priority"),
        "assignee": link_title(wp, "assignee"),
        "due_date": wp.get("dueDate").cloned().unwrap_or(Value::Null),
        "updated_at": wp.get("updatedAt").cloned().unwrap_or(Value::Null),
    })
}

/// `_links.<rel>.title`, falling back to a plain string field of that name.
fn link_title(wp: &Value, rel: &str) -> Value {
    wp.get("_links")
        .and_then(|links| links.get(rel))
        .and_then(|link| link.get("title"))
        .or_else(|| wp.get(rel).filter(|v| v.is_string()))
        .cloned()
        .unwrap_or(Value::Null)
}

fn project_name(raw: &Value, project_id: &Value) -> String {
    raw.pointer("/_embedded/elements/0/_links/project/title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| match project_id {
            Value::String(id) => format!("Project {}", id),
            other => format!("Project {}", other),
        })
}

/// Everything a report template can see.
pub(crate) fn report_context(
    user_id: &str,
    tool: Tool,
    params: &Params,
    week: &ReportWeek,
    raw: &Value,
) -> Value {
    let project_id = params.get("project_id").cloned().unwrap_or(Value::Null);
    let rows = work_packages(raw);
    let total = rows.len();

    json!({
        "project": {
            "id": project_id,
            "name": project_name(raw, &project_id),
        },
        "week": week.label,
        "week_start": week.start.to_string(),
        "week_end": week.end.to_string(),
        "work_packages": rows,
        "total_packages": total,
        "summary": format!("Found {} work packages", total),
        "generated_at": Utc::now().to_rfc3339(),
        "user_id": user_id,
        "tool": tool.name(),
        "params": params,
    })
}
