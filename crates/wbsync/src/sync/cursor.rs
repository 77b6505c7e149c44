//! Registry of listing cursors already handed to a worker.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use crate::marketplace::Cursor;

/// Fingerprint of a cursor: `"{lastId}_{lastUpdatedAt}"`.
///
/// The page size is not part of the key; two cursors pointing at the same
/// item are the same task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CursorKey(String);

impl CursorKey {
    pub fn of(cursor: &Cursor) -> Self {
        Self(format!("{}_{}", cursor.last_id, cursor.last_updated_at))
    }
}

impl fmt::Display for CursorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Thread-safe set of claimed cursor keys. Lives for one sync invocation.
#[derive(Debug, Default)]
pub struct CursorRegistry {
    claimed: Mutex<HashSet<CursorKey>>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `cursor` as dispatched.
    ///
    /// Returns `false` if an equal cursor was claimed before.
    pub fn claim(&self, cursor: &Cursor) -> bool {
        let key = CursorKey::of(cursor);
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        claimed.insert(key)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.claimed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
