//! JSONL (JSON Lines) persistence helpers.
//!
//! JSONL format: one JSON object per line, newline-delimited. Full rewrites
//! go through a temp file in the same directory followed by a rename, so a
//! concurrent reader sees either the old or the new file, never a mix.

use std::fs::{File, Metadata, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::db::DbError;

/// Errors that can occur during JSONL operations.
#[derive(Error, Diagnostic, Debug)]
pub enum JsonlError {
    #[error("IO error: {0}")]
    #[diagnostic(code(opgate::db::jsonl::io))]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    #[diagnostic(code(opgate::db::jsonl::serialize))]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid JSONL line {line}: {error}")]
    #[diagnostic(code(opgate::db::jsonl::invalid_line))]
    InvalidLine { line: usize, error: String },

    #[error("File kept changing while being read: {path}")]
    #[diagnostic(code(opgate::db::jsonl::unstable))]
    Unstable { path: String },
}

impl From<JsonlError> for DbError {
    fn from(e: JsonlError) -> Self {
        DbError::File {
            message: e.to_string(),
        }
    }
}

/// Replace the file with the given entities, atomically.
///
/// Returns the metadata of the written file, taken before the rename.
pub fn write_jsonl<T: Serialize>(path: &Path, entities: &[T]) -> Result<Metadata, JsonlError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        for entity in entities {
            let json = serde_json::to_string(entity)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    let metadata = tmp.as_file().metadata()?;
    tmp.persist(path).map_err(|e| JsonlError::Io(e.error))?;
    Ok(metadata)
}

/// Append a single entity as one line, creating the file if needed.
///
/// Returns the number of bytes written and the metadata of the handle
/// written to.
pub fn append_jsonl<T: Serialize>(path: &Path, entity: &T) -> Result<(u64, Metadata), JsonlError> {
    let mut line = serde_json::to_string(entity)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    // One write call per record keeps lines whole for concurrent readers.
    file.write_all(line.as_bytes())?;
    file.flush()?;
    Ok((line.len() as u64, file.metadata()?))
}

/// Read entities from a JSONL file. Blank lines are skipped.
pub fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, JsonlError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entities = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;

        if line.trim().is_empty() {
            continue;
        }

        let entity: T = serde_json::from_str(&line).map_err(|e| JsonlError::InvalidLine {
            line: line_num + 1,
            error: e.to_string(),
        })?;

        entities.push(entity);
    }

    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Row {
        key: String,
        n: i32,
    }

    fn row(key: &str, n: i32) -> Row {
        Row {
            key: key.to_string(),
            n,
        }
    }

    #[test]
    fn test_write_replaces_previous_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rows.jsonl");

        write_jsonl(&path, &[row("a", 1), row("b", 2)]).unwrap();
        write_jsonl(&path, &[row("c", 3)]).unwrap();

        let rows: Vec<Row> = read_jsonl(&path).unwrap();
        assert_eq!(rows, vec![row("c", 3)]);
        // No stray temp files left behind
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_append_adds_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.jsonl");

        append_jsonl(&path, &row("a", 1)).unwrap();
        append_jsonl(&path, &row("b", 2)).unwrap();

        let rows: Vec<Row> = read_jsonl(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].key, "b");
    }

    #[test]
    fn test_write_and_append_report_metadata_of_written_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rows.jsonl");

        let written = write_jsonl(&path, &[row("a", 1)]).unwrap();
        let on_disk = std::fs::metadata(&path).unwrap();
        assert_eq!(written.len(), on_disk.len());
        assert_eq!(written.modified().unwrap(), on_disk.modified().unwrap());

        let (bytes, appended) = append_jsonl(&path, &row("b", 2)).unwrap();
        assert_eq!(bytes, "{\"key\":\"b\",\"n\":2}\n".len() as u64);
        assert_eq!(appended.len(), on_disk.len() + bytes);
    }

    #[test]
    fn test_read_with_empty_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("with_empty.jsonl");
        std::fs::write(&path, "{\"key\":\"a\",\"n\":1}\n\n{\"key\":\"b\",\"n\":2}\n").unwrap();

        let rows: Vec<Row> = read_jsonl(&path).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_read_malformed_line_reports_line_number() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("malformed.jsonl");
        std::fs::write(&path, "{\"key\":\"a\",\"n\":1}\nnot json\n").unwrap();

        match read_jsonl::<Row>(&path) {
            Err(JsonlError::InvalidLine { line, .. }) => assert_eq!(line, 2),
            other => panic!("Expected InvalidLine error, got {:?}", other),
        }
    }

    #[test]
    fn test_file_not_found() {
        let result: Result<Vec<Row>, JsonlError> = read_jsonl(Path::new("/nonexistent/file.jsonl"));
        assert!(matches!(result.unwrap_err(), JsonlError::Io(_)));
    }
}
