//! Per-share advisory locks

use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;
use twoparty_core::{Error, Result};

/// Share ids currently held by an in-flight operation
#[derive(Clone, Default)]
pub struct ShareLeases {
    held: Arc<DashMap<String, Instant>>,
}

impl ShareLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease on `share_id`, failing with [`Error::ShareBusy`] if
    /// another operation holds it
    pub fn acquire(&self, share_id: &str) -> Result<LeaseGuard> {
        match self.held.entry(share_id.to_string()) {
            Entry::Occupied(entry) => Err(Error::ShareBusy(format!(
                "share {share_id} is in use by an operation started {:?} ago",
                entry.get().elapsed()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                trace!(share_id, "Lease acquired");
                Ok(LeaseGuard {
                    held: self.held.clone(),
                    share_id: share_id.to_string(),
                })
            }
        }
    }

    pub fn is_held(&self, share_id: &str) -> bool {
        self.held.contains_key(share_id)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Releases its lease when dropped
pub struct LeaseGuard {
    held: Arc<DashMap<String, Instant>>,
    share_id: String,
}

impl LeaseGuard {
    pub fn share_id(&self) -> &str {
        &self.share_id
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.held.remove(&self.share_id);
        trace!(share_id = %self.share_id, "Lease released");
    }
}
