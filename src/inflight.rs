//! Guard against double submission of the same form.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const NEW_RECORD: &str = "new";

/// Writes currently outstanding, keyed by session and record.
#[derive(Debug, Default, Clone)]
pub struct InFlight {
    pending: Arc<Mutex<HashSet<String>>>,
}

/// Held while a write is outstanding. Dropping it releases the slot.
#[derive(Debug)]
pub struct InFlightGuard {
    pending: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the submission of `record` (or of a new record) by `uid`.
    ///
    /// Returns `None` when the same submission is already outstanding.
    pub fn begin(&self, uid: &str, record: Option<&str>) -> Option<InFlightGuard> {
        let key = format!("{uid}:{}", record.unwrap_or(NEW_RECORD));
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !pending.insert(key.clone()) {
            tracing::debug!(%key, "duplicate submission rejected");
            return None;
        }

        Some(InFlightGuard {
            pending: Arc::clone(&self.pending),
            key,
        })
    }

    pub fn is_pending(&self, uid: &str, record: Option<&str>) -> bool {
        let key = format!("{uid}:{}", record.unwrap_or(NEW_RECORD));
        self.pending
            .lock()
            .map(|pending| pending.contains(&key))
            .unwrap_or(false)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.key);
        }
    }
}
