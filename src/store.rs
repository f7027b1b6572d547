//! Key-value store collaborator, scoped to one document.
//!
//! Holds the last apply batch's backup and the progress record. Last write
//! wins; no transactions are assumed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BulkfixError, BulkfixResult};

/// Key of the last apply batch's backup entries.
pub const LAST_RUN_BACKUP: &str = "LAST_RUN_BACKUP";

/// Key of the persisted progress record.
pub const APPLY_PROGRESS: &str = "APPLY_PROGRESS";

/// Document-scoped string store.
pub trait KvStore {
    fn get(&self, key: &str) -> BulkfixResult<Option<String>>;
    fn set(&mut self, key: &str, value: String) -> BulkfixResult<()>;
    fn delete(&mut self, key: &str) -> BulkfixResult<()>;
}

/// Process-local store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> BulkfixResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> BulkfixResult<()> {
        self.values.insert(key.to_owned(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> BulkfixResult<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// JSON-file store, rewritten atomically on every change.
///
/// After [`FileStore::defer_writes`] changes stay in memory until
/// [`FileStore::commit`], so a caller can write the document first and only
/// then record the batch that produced it.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
    deferred: bool,
    dirty: bool,
}

impl FileStore {
    /// Store file that sits next to `document`: `<document>.bulkfix.json`.
    pub fn path_for(document: &Path) -> PathBuf {
        let mut name = document
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".bulkfix.json");
        document.with_file_name(name)
    }

    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> BulkfixResult<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(BulkfixError::Io { path, source }),
        };
        debug!(path = %path.display(), keys = values.len(), "store opened");
        Ok(Self {
            path,
            values,
            deferred: false,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hold later changes in memory until [`FileStore::commit`].
    pub fn defer_writes(&mut self) {
        self.deferred = true;
    }

    /// Write held changes, if any, and return to write-through mode.
    pub fn commit(&mut self) -> BulkfixResult<()> {
        self.deferred = false;
        if std::mem::take(&mut self.dirty) {
            debug!(path = %self.path.display(), "store committed");
            self.flush()?;
        }
        Ok(())
    }

    fn changed(&mut self) -> BulkfixResult<()> {
        if self.deferred {
            self.dirty = true;
            Ok(())
        } else {
            self.flush()
        }
    }

    fn flush(&self) -> BulkfixResult<()> {
        crate::util::atomic::atomic_write_json(&self.path, &self.values)
            .map_err(|e| BulkfixError::Store(format!("{e:#}")))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> BulkfixResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> BulkfixResult<()> {
        self.values.insert(key.to_owned(), value);
        self.changed()
    }

    fn delete(&mut self, key: &str) -> BulkfixResult<()> {
        if self.values.remove(key).is_some() {
            self.changed()?;
        }
        Ok(())
    }
}
