//! Local identifiers for entities that do not have a server id yet.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source for optimistic drafts.
///
/// Ids are unique within one generator only: `<prefix>-<n>` with a per-session
/// random prefix.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        let session = uuid::Uuid::new_v4().simple().to_string();
        Self::with_prefix(format!("local-{}", &session[..8]))
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
