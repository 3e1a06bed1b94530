//! Path resolution for opgate data locations.
//!
//! Follows the XDG base directory layout.

use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "opgate";

/// Data directory: `$XDG_DATA_HOME/opgate`, else `~/.local/share/opgate`.
///
/// Falls back to `./.opgate` when neither variable is set.
pub fn get_data_dir() -> PathBuf {
    env::var_os("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share")))
        .map(|base| base.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".opgate"))
}

/// SQLite database file inside `data_dir`.
pub fn get_db_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("opgate.db")
}

/// Directory of the JSONL file store inside `data_dir`.
pub fn get_file_store_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("store")
}
