//! Responder-side share storage

use crate::{share::SavedShare, Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Where the responder keeps its half of each key
pub trait ShareStore: Send + Sync {
    fn put(&self, share: SavedShare) -> Result<()>;

    /// Fails with [`Error::ShareNotFound`] for unknown ids
    fn get(&self, share_id: &str) -> Result<SavedShare>;

    fn exists(&self, share_id: &str) -> bool;

    fn remove(&self, share_id: &str) -> Option<SavedShare>;

    /// Record that a rotation replaced `share_id`; the share stays usable
    /// until the store's retention sweep drops it
    fn mark_superseded(&self, share_id: &str);
}

/// Stored share plus bookkeeping
#[derive(Debug, Clone)]
pub struct StoredShare {
    pub share: SavedShare,
    pub created_at: DateTime<Utc>,
    pub superseded_at: Option<DateTime<Utc>>,
}

/// In-memory share store
#[derive(Clone, Default)]
pub struct MemoryShareStore {
    /// Shares indexed by share_id
    shares: Arc<DashMap<String, StoredShare>>,
}

impl MemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Share ids held for an identity, oldest first
    pub fn share_ids_for(&self, identity_id: &str) -> Vec<String> {
        let mut entries: Vec<(DateTime<Utc>, String)> = self
            .shares
            .iter()
            .filter(|entry| entry.share.identity_id == identity_id)
            .map(|entry| (entry.created_at, entry.key().clone()))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, id)| id).collect()
    }

    /// Drop shares superseded more than `retention` ago; returns how many
    pub fn cleanup(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let before = self.shares.len();
        self.shares.retain(|_, stored| match stored.superseded_at {
            Some(at) => now
                .signed_duration_since(at)
                .to_std()
                .map_or(true, |age| age < retention),
            None => true,
        });
        before.saturating_sub(self.shares.len())
    }
}

impl ShareStore for MemoryShareStore {
    fn put(&self, share: SavedShare) -> Result<()> {
        if self.shares.contains_key(&share.share_id) {
            return Err(Error::Internal(format!(
                "share {} already stored",
                share.share_id
            )));
        }
        let id = share.share_id.clone();
        self.shares.insert(
            id,
            StoredShare {
                share,
                created_at: Utc::now(),
                superseded_at: None,
            },
        );
        Ok(())
    }

    fn get(&self, share_id: &str) -> Result<SavedShare> {
        self.shares
            .get(share_id)
            .map(|entry| entry.share.clone())
            .ok_or_else(|| Error::ShareNotFound(share_id.to_string()))
    }

    fn exists(&self, share_id: &str) -> bool {
        self.shares.contains_key(share_id)
    }

    fn remove(&self, share_id: &str) -> Option<SavedShare> {
        self.shares.remove(share_id).map(|(_, stored)| stored.share)
    }

    fn mark_superseded(&self, share_id: &str) {
        if let Some(mut stored) = self.shares.get_mut(share_id) {
            if stored.superseded_at.is_none() {
                stored.superseded_at = Some(Utc::now());
            }
        }
    }
}
