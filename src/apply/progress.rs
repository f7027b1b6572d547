//! Polled apply progress.
//!
//! The tracker is a cheap cloneable handle so a caller can poll from another
//! thread while a batch runs. Every change is mirrored into the store under
//! [`APPLY_PROGRESS`] for pollers in other processes.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BulkfixError, BulkfixResult};
use crate::store::{APPLY_PROGRESS, KvStore};

/// Snapshot of an apply batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub applied: usize,
    pub total: usize,
    pub done: bool,
}

impl Progress {
    /// Read the persisted record; a missing record reads as idle.
    pub fn load(store: &dyn KvStore) -> BulkfixResult<Self> {
        match store.get(APPLY_PROGRESS)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| BulkfixError::CorruptRecord {
                key: APPLY_PROGRESS.to_owned(),
                reason: e.to_string(),
            }),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<Progress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> Progress {
        *self.lock()
    }

    /// Start a batch of `total` suggestions.
    pub fn reset(&self, total: usize, store: &mut dyn KvStore) {
        let snapshot = {
            let mut p = self.lock();
            *p = Progress {
                applied: 0,
                total,
                done: false,
            };
            *p
        };
        persist(snapshot, store);
    }

    pub fn advance(&self, store: &mut dyn KvStore) {
        let snapshot = {
            let mut p = self.lock();
            p.applied += 1;
            *p
        };
        persist(snapshot, store);
    }

    /// Mark the batch finished, whatever its outcome.
    pub fn finish(&self, store: &mut dyn KvStore) {
        let snapshot = {
            let mut p = self.lock();
            p.done = true;
            *p
        };
        persist(snapshot, store);
    }
}

fn persist(progress: Progress, store: &mut dyn KvStore) {
    let result = serde_json::to_string(&progress)
        .map_err(BulkfixError::from)
        .and_then(|raw| store.set(APPLY_PROGRESS, raw));
    if let Err(e) = result {
        warn!(error = %e, "failed to persist progress");
    }
}
