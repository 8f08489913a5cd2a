//! Replay guard
//!
//! `RequestCache` remembers which execution request ids have been consumed
//! and when. It is the only mutable state shared between request flows.
//! Entries are inserted once and removed once by the expiry sweep; they are
//! never updated in place.

pub mod sweeper;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;

pub use sweeper::CacheSweeper;

/// Concurrent table of consumed request ids.
///
/// Backed by a sharded map: a test-and-insert on one id locks only that id's
/// shard, and eviction walks the shards one at a time.
#[derive(Debug, Default)]
pub struct RequestCache {
    entries: DashMap<String, DateTime<Utc>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` has already been consumed.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Record `id` as consumed now. Returns false if it was already present,
    /// in which case the original timestamp is kept.
    pub fn insert(&self, id: &str) -> bool {
        self.insert_at(id, Utc::now())
    }

    /// Atomically claim `id` for execution. Exactly one of any number of
    /// concurrent callers with the same id gets `true`.
    pub fn try_consume(&self, id: &str) -> bool {
        self.insert(id)
    }

    pub(crate) fn insert_at(&self, id: &str, seen: DateTime<Utc>) -> bool {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(seen);
                true
            }
        }
    }

    /// When `id` was first consumed, if it is still retained.
    pub fn first_seen(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(id).map(|entry| *entry.value())
    }

    /// Remove every entry first seen more than `age` ago. Returns how many
    /// entries were evicted.
    pub fn evict_older_than(&self, age: Duration) -> usize {
        // An age beyond the representable range means nothing is old enough.
        let Some(cutoff) = chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };
        let mut evicted = 0;
        self.entries.retain(|_, seen| {
            let keep = *seen >= cutoff;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
