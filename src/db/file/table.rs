//! Live-reloading JSONL table.
//!
//! A table holds an immutable snapshot of its file's rows together with the
//! file identity (length and mtime) it was read at. Reads compare that
//! identity against the disk; when it moved, a single reloader re-reads the
//! file and swaps the snapshot. Readers always get a complete snapshot.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::jsonl::{JsonlError, append_jsonl, read_jsonl, write_jsonl};
use crate::db::DbResult;

/// Re-reads attempted before giving up on a file that keeps changing.
const MAX_RELOAD_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileIdentity {
    /// Identity no file on disk can have; forces a reload on the next read.
    const UNKNOWN: Self = Self {
        len: u64::MAX,
        modified: None,
    };

    fn from_metadata(meta: &Metadata) -> Self {
        Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        }
    }

    /// `None` when the file does not exist.
    fn of(path: &Path) -> Result<Option<Self>, JsonlError> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(Self::from_metadata(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

struct Snapshot<T> {
    identity: Option<FileIdentity>,
    rows: Arc<Vec<T>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity,
            rows: Arc::clone(&self.rows),
        }
    }
}

pub(crate) struct JsonlTable<T> {
    path: PathBuf,
    snapshot: RwLock<Snapshot<T>>,
    reload: Mutex<()>,
    write: Mutex<()>,
}

impl<T> JsonlTable<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            snapshot: RwLock::new(Snapshot {
                identity: Some(FileIdentity::UNKNOWN),
                rows: Arc::new(Vec::new()),
            }),
            reload: Mutex::new(()),
            write: Mutex::new(()),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn current(&self) -> Snapshot<T> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install(&self, snapshot: Snapshot<T>) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Current rows, reloading first if the file changed on disk.
    ///
    /// A file that cannot be parsed leaves the previous snapshot in place.
    pub(crate) async fn rows(&self) -> DbResult<Arc<Vec<T>>> {
        let current = self.current();
        if current.identity == FileIdentity::of(&self.path)? {
            return Ok(current.rows);
        }

        let _reloading = self.reload.lock().await;

        // Another reader may have reloaded while we waited.
        let current = self.current();
        if current.identity == FileIdentity::of(&self.path)? {
            return Ok(current.rows);
        }

        match self.load_stable() {
            Ok(fresh) => {
                debug!(path = %self.path.display(), rows = fresh.rows.len(), "reloaded table");
                let rows = Arc::clone(&fresh.rows);
                self.install(fresh);
                Ok(rows)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "reload failed, keeping last snapshot");
                Ok(current.rows)
            }
        }
    }

    /// Read until two identity checks around the read agree.
    fn load_stable(&self) -> Result<Snapshot<T>, JsonlError> {
        let mut last_err = None;
        for _ in 0..MAX_RELOAD_ATTEMPTS {
            let before = FileIdentity::of(&self.path)?;
            let rows = match before {
                None => Vec::new(),
                Some(_) => match read_jsonl(&self.path) {
                    Ok(rows) => rows,
                    Err(e) => {
                        // Possibly a writer mid-flight; look again.
                        last_err = Some(e);
                        continue;
                    }
                },
            };
            let after = FileIdentity::of(&self.path)?;
            if before == after {
                return Ok(Snapshot {
                    identity: after,
                    rows: Arc::new(rows),
                });
            }
        }
        Err(last_err.unwrap_or_else(|| JsonlError::Unstable {
            path: self.path.display().to_string(),
        }))
    }

    /// Apply a mutation to the latest rows and persist the result.
    ///
    /// Writers are serialized; the closure's error aborts without touching the file.
    pub(crate) async fn update<R, F>(&self, mutate: F) -> DbResult<R>
    where
        F: FnOnce(&mut Vec<T>) -> DbResult<R>,
    {
        let _writing = self.write.lock().await;

        let mut rows = (*self.rows().await?).clone();
        let out = mutate(&mut rows)?;

        let written = write_jsonl(&self.path, &rows)?;
        self.install(Snapshot {
            identity: Some(FileIdentity::from_metadata(&written)),
            rows: Arc::new(rows),
        });
        Ok(out)
    }

    /// Append one row without rewriting the file.
    pub(crate) async fn append<F>(&self, make: F) -> DbResult<T>
    where
        F: FnOnce(&[T]) -> T,
    {
        let _writing = self.write.lock().await;

        self.rows().await?;
        let base = self.current();
        let row = make(&base.rows);
        let (written, meta) = append_jsonl(&self.path, &row)?;

        let mut next = (*base.rows).clone();
        next.push(row.clone());
        self.install(Snapshot {
            identity: Some(appended_identity(
                base.identity,
                written,
                FileIdentity::from_metadata(&meta),
            )),
            rows: Arc::new(next),
        });
        Ok(row)
    }
}

/// Identity to record after appending `written` bytes.
///
/// Only when the file grew by exactly our line from the identity the rows
/// were read at does the snapshot match the disk; otherwise someone else
/// touched the file and the next read must reload it.
fn appended_identity(
    base: Option<FileIdentity>,
    written: u64,
    after: FileIdentity,
) -> FileIdentity {
    let base_len = base.map_or(0, |b| b.len);
    if base != Some(FileIdentity::UNKNOWN) && base_len.checked_add(written) == Some(after.len) {
        after
    } else {
        FileIdentity::UNKNOWN
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn identity(len: u64) -> FileIdentity {
        FileIdentity {
            len,
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(len)),
        }
    }

    #[test]
    fn append_onto_known_file_keeps_written_identity() {
        assert_eq!(appended_identity(Some(identity(10)), 5, identity(15)), identity(15));
        assert_eq!(appended_identity(None, 5, identity(5)), identity(5));
    }

    #[test]
    fn append_onto_replaced_file_forces_reload() {
        assert_eq!(
            appended_identity(Some(identity(10)), 5, identity(42)),
            FileIdentity::UNKNOWN
        );
        assert_eq!(appended_identity(None, 5, identity(30)), FileIdentity::UNKNOWN);
        assert_eq!(
            appended_identity(Some(FileIdentity::UNKNOWN), 5, identity(5)),
            FileIdentity::UNKNOWN
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn external_rewrite_after_own_update_is_seen() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let table: JsonlTable<u32> = JsonlTable::new(temp_dir.path().join("n.jsonl"));

        table
            .update(|rows| {
                rows.push(1);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(*table.rows().await.unwrap(), vec![1]);

        write_jsonl(table.path(), &[7u32, 8]).unwrap();
        assert_eq!(*table.rows().await.unwrap(), vec![7, 8]);
    }
}
