//! In-memory notification store.
//!
//! Ordered collection of notification records (newest first) kept in sync
//! by both pull (HTTP fetch replaces the set) and push (realtime events
//! prepend records). Mutations are applied optimistically; the caller
//! reconciles against server acknowledgments.
//!
//! # Invariant
//!
//! The unread counter always equals `count(records where !read)`. Every
//! mutation path goes through `recount()`; nothing assigns the counter
//! directly.
//!
//! # Stale fetch guard
//!
//! A fetch response can race with a push event or a user action applied
//! while the request was in flight. The store carries a revision that every
//! mutation advances; `begin_fetch` snapshots it and `apply_fetch` discards
//! the payload if the revision moved, so a stale snapshot never overwrites
//! newer local state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A server-issued notification record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    /// Server-assigned unique identifier.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Message text.
    pub message: String,
    /// Read flag.
    pub read: bool,
    /// Server-side creation time.
    pub created_at: DateTime<Utc>,
    /// Free-form metadata attached by the backend (deep link, subject id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Snapshot token returned by [`NotificationStore::begin_fetch`].
///
/// Pass it back to [`NotificationStore::apply_fetch`] so the store can tell
/// whether local state moved while the request was in flight.
#[derive(Debug, Clone, Copy)]
pub struct FetchToken {
    revision: u64,
}

/// Ordered notification records with a derived unread counter.
#[derive(Debug, Default)]
pub struct NotificationStore {
    /// Newest first.
    records: Vec<Notification>,
    /// Always `count(records where !read)`; see module docs.
    unread: usize,
    /// Advanced by every mutation; used by the stale fetch guard.
    revision: u64,
}

impl NotificationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, newest first.
    pub fn records(&self) -> &[Notification] {
        &self.records
    }

    /// Derived unread count.
    pub fn unread(&self) -> usize {
        self.unread
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn recount(&mut self) {
        self.unread = self.records.iter().filter(|r| !r.read).count();
        self.revision += 1;
    }

    /// Snapshot the current revision before issuing an HTTP fetch.
    pub fn begin_fetch(&self) -> FetchToken {
        FetchToken {
            revision: self.revision,
        }
    }

    /// Replace the record set from a fetch response.
    ///
    /// Returns `false` (payload discarded) if any mutation advanced the
    /// store since `token` was taken; the caller should refetch if it still
    /// cares.
    pub fn apply_fetch(&mut self, token: FetchToken, records: Vec<Notification>) -> bool {
        if token.revision != self.revision {
            log::debug!(
                "Discarding stale fetch snapshot (rev {} != {})",
                token.revision,
                self.revision
            );
            return false;
        }
        self.records = records;
        self.recount();
        true
    }

    /// Prepend a record pushed over the realtime channel.
    ///
    /// A record with an id already present is ignored: the channel is
    /// best-effort and the server may redeliver after a reconnect.
    pub fn apply_incoming(&mut self, record: Notification) {
        if self.records.iter().any(|r| r.id == record.id) {
            log::debug!("Duplicate incoming notification {}, ignoring", record.id);
            return;
        }
        self.records.insert(0, record);
        self.recount();
    }

    /// Flip a record's read flag. Returns `false` if no record matched.
    ///
    /// Idempotent: marking an already-read record changes nothing and the
    /// counter never goes negative (it is recomputed, not decremented).
    pub fn set_read(&mut self, id: i64, read: bool) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        record.read = read;
        self.recount();
        true
    }

    /// Optimistically mark one record read.
    pub fn mark_read(&mut self, id: i64) -> bool {
        self.set_read(id, true)
    }

    /// Optimistically remove one record. Returns the removed record so the
    /// caller can restore it if the server rejects the delete.
    pub fn delete(&mut self, id: i64) -> Option<Notification> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        let removed = self.records.remove(pos);
        self.recount();
        Some(removed)
    }

    /// Mark every record read.
    pub fn mark_all_read(&mut self) {
        for record in &mut self.records {
            record.read = true;
        }
        self.recount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, read: bool) -> Notification {
        Notification {
            id,
            user_id: 10,
            message: format!("notification {id}"),
            read,
            created_at: Utc::now(),
            metadata: None,
        }
    }

    fn recomputed(store: &NotificationStore) -> usize {
        store.records().iter().filter(|r| !r.read).count()
    }

    #[test]
    fn test_incoming_markread_delete_scenario() {
        let mut store = NotificationStore::new();
        assert_eq!(store.unread(), 0);

        store.apply_incoming(record(1, false));
        assert_eq!(store.unread(), 1);
        assert_eq!(store.len(), 1);

        assert!(store.mark_read(1));
        assert_eq!(store.unread(), 0);
        assert!(store.records()[0].read);

        store.apply_incoming(record(2, false));
        assert_eq!(store.unread(), 1);
        assert_eq!(store.len(), 2);
        // Newest first
        assert_eq!(store.records()[0].id, 2);

        assert!(store.delete(1).is_some());
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].id, 2);
        assert_eq!(store.unread(), 1);
    }

    #[test]
    fn test_unread_always_recomputable() {
        let mut store = NotificationStore::new();
        store.apply_incoming(record(1, false));
        store.apply_incoming(record(2, true));
        store.apply_incoming(record(3, false));
        assert_eq!(store.unread(), recomputed(&store));

        store.mark_read(3);
        assert_eq!(store.unread(), recomputed(&store));

        store.delete(1);
        assert_eq!(store.unread(), recomputed(&store));

        store.mark_all_read();
        assert_eq!(store.unread(), 0);
        assert_eq!(store.unread(), recomputed(&store));
    }

    #[test]
    fn test_mark_read_idempotent() {
        let mut store = NotificationStore::new();
        store.apply_incoming(record(1, false));
        assert!(store.mark_read(1));
        assert!(store.mark_read(1));
        assert_eq!(store.unread(), 0);
    }

    #[test]
    fn test_mark_read_unknown_id() {
        let mut store = NotificationStore::new();
        store.apply_incoming(record(1, false));
        assert!(!store.mark_read(99));
        assert_eq!(store.unread(), 1);
    }

    #[test]
    fn test_delete_removes_exactly_one_preserving_order() {
        let mut store = NotificationStore::new();
        for id in 1..=4 {
            store.apply_incoming(record(id, false));
        }
        // Order is 4,3,2,1
        let removed = store.delete(3).expect("record exists");
        assert_eq!(removed.id, 3);
        let ids: Vec<i64> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 2, 1]);

        assert!(store.delete(3).is_none());
    }

    #[test]
    fn test_delete_rollback_restores_via_incoming() {
        let mut store = NotificationStore::new();
        store.apply_incoming(record(1, false));
        let removed = store.delete(1).expect("record exists");
        assert!(store.is_empty());

        // Server rejected the delete; caller puts the record back
        store.apply_incoming(removed);
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread(), 1);
    }

    #[test]
    fn test_fetch_replaces_set_and_is_idempotent() {
        let mut store = NotificationStore::new();
        store.apply_incoming(record(9, false));

        let token = store.begin_fetch();
        let payload = vec![record(2, false), record(1, true)];
        assert!(store.apply_fetch(token, payload.clone()));
        assert_eq!(store.len(), 2);
        assert_eq!(store.unread(), 1);

        // Same server state fetched again yields the same result
        let token = store.begin_fetch();
        assert!(store.apply_fetch(token, payload));
        assert_eq!(store.len(), 2);
        assert_eq!(store.unread(), 1);
    }

    #[test]
    fn test_stale_fetch_discarded_after_local_mutation() {
        let mut store = NotificationStore::new();
        store.apply_incoming(record(1, false));

        let token = store.begin_fetch();
        // Push event lands while the fetch is in flight
        store.apply_incoming(record(2, false));

        let stale = vec![record(1, false)];
        assert!(!store.apply_fetch(token, stale));
        assert_eq!(store.len(), 2);
        assert_eq!(store.unread(), 2);
    }

    #[test]
    fn test_duplicate_incoming_ignored() {
        let mut store = NotificationStore::new();
        store.apply_incoming(record(1, false));
        store.apply_incoming(record(1, false));
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread(), 1);
    }

    #[test]
    fn test_mark_all_read_zeroes_counter() {
        let mut store = NotificationStore::new();
        for id in 1..=5 {
            store.apply_incoming(record(id, id % 2 == 0));
        }
        store.mark_all_read();
        assert_eq!(store.unread(), 0);
        assert!(store.records().iter().all(|r| r.read));
    }
}
