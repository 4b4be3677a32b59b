//! In-process document collection.
//!
//! [`MemoryCollection`] stands in for the `MongoDB` collection behind a
//! [`MongoConnector`](crate::MongoConnector). It keeps one
//! [`StoredRecord`] per identity key and answers the same queries the
//! connector sends to the server. Every call is counted and the collection
//! can be switched offline, which makes the connector's guarantees (no I/O
//! for invalid documents, degraded results when unreachable) observable
//! without a server.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use worldstore_types::{RecordKey, StoredRecord, compare_saved_at};

use crate::error::DbError;

#[derive(Debug)]
struct Slot {
    record: StoredRecord,
    /// Write sequence number; breaks ties between equal timestamps.
    written: u64,
}

#[derive(Debug, Default)]
struct Records {
    slots: Vec<Slot>,
    writes: u64,
}

impl Records {
    const fn next_write(&mut self) -> u64 {
        self.writes = self.writes.saturating_add(1);
        self.writes
    }
}

/// A document collection held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    records: Mutex<Records>,
    calls: AtomicU64,
    offline: AtomicBool,
}

impl MemoryCollection {
    /// An empty, reachable collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls the collection has received, including failed ones.
    pub fn backend_calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Simulate losing (or regaining) the backend.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle acquisition: fails while offline.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] while the collection is offline.
    pub fn ping(&self) -> Result<(), DbError> {
        self.touch()
    }

    /// The record stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] while the collection is offline.
    pub fn find(&self, key: &RecordKey) -> Result<Option<StoredRecord>, DbError> {
        self.touch()?;
        Ok(self
            .lock()
            .slots
            .iter()
            .find(|slot| key.matches(&slot.record))
            .map(|slot| slot.record.clone()))
    }

    /// Store a new record.
    ///
    /// Identity is not checked here; the connector decides between insert
    /// and refresh.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] while the collection is offline.
    pub fn insert(&self, record: StoredRecord) -> Result<(), DbError> {
        self.touch()?;
        let mut records = self.lock();
        let written = records.next_write();
        records.slots.push(Slot { record, written });
        Ok(())
    }

    /// Refresh payload and metadata of the record sharing `newer`'s identity.
    ///
    /// Returns whether a record was updated.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] while the collection is offline.
    pub fn refresh(&self, newer: StoredRecord) -> Result<bool, DbError> {
        self.touch()?;
        let key = newer.key();
        let mut records = self.lock();
        let written = records.next_write();
        let Some(slot) = records.slots.iter_mut().find(|s| key.matches(&s.record)) else {
            return Ok(false);
        };
        slot.record.refresh_from(newer);
        slot.written = written;
        Ok(true)
    }

    /// The record with the greatest `saved_at` across every world.
    ///
    /// Ties go to the most recent write.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] while the collection is offline.
    pub fn latest(&self) -> Result<Option<StoredRecord>, DbError> {
        self.touch()?;
        Ok(self
            .lock()
            .slots
            .iter()
            .max_by(|a, b| {
                compare_saved_at(&a.record.saved_at, &b.record.saved_at)
                    .then(a.written.cmp(&b.written))
            })
            .map(|slot| slot.record.clone()))
    }

    /// The most recently written record of `world_name` as `data_type`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] while the collection is offline.
    pub fn newest_write(
        &self,
        world_name: &str,
        data_type: &str,
    ) -> Result<Option<StoredRecord>, DbError> {
        self.touch()?;
        Ok(self
            .lock()
            .slots
            .iter()
            .filter(|s| s.record.world_name == world_name && s.record.data_type == data_type)
            .max_by(|a, b| {
                a.record
                    .created_at
                    .cmp(&b.record.created_at)
                    .then(a.written.cmp(&b.written))
            })
            .map(|slot| slot.record.clone()))
    }

    /// Latest `saved_at` of each world, most recent first, capped at
    /// `limit` worlds.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] while the collection is offline.
    pub fn latest_per_world(&self, limit: usize) -> Result<Vec<(String, Value)>, DbError> {
        self.touch()?;
        let records = self.lock();
        let mut ordered: Vec<&Slot> = records.slots.iter().collect();
        ordered.sort_by(|a, b| {
            compare_saved_at(&b.record.saved_at, &a.record.saved_at)
                .then(b.written.cmp(&a.written))
        });

        let mut worlds: Vec<(String, Value)> = Vec::new();
        for slot in ordered {
            if worlds.len() >= limit {
                break;
            }
            if worlds.iter().all(|(name, _)| *name != slot.record.world_name) {
                worlds.push((slot.record.world_name.clone(), slot.record.saved_at.clone()));
            }
        }
        Ok(worlds)
    }

    /// Remove every record of `world_name`; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] while the collection is offline.
    pub fn delete_world(&self, world_name: &str) -> Result<u64, DbError> {
        self.touch()?;
        let mut records = self.lock();
        let before = records.slots.len();
        records.slots.retain(|s| s.record.world_name != world_name);
        let removed = before.saturating_sub(records.slots.len());
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    fn touch(&self) -> Result<(), DbError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.offline.load(Ordering::Relaxed) {
            return Err(DbError::Unavailable(String::from(
                "in-memory collection is offline",
            )));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn record(world: &str, saved_at: Value, data_type: &str, x: i64) -> StoredRecord {
        StoredRecord {
            id: Uuid::now_v7(),
            world_name: world.to_owned(),
            saved_at: saved_at.clone(),
            data_type: data_type.to_owned(),
            world_data_json: json!({"world_name": world, "saved_at": saved_at, "x": x})
                .to_string(),
            created_at: Utc::now(),
            connector_info: String::from("{}"),
        }
    }

    #[test]
    fn find_matches_full_identity() {
        let coll = MemoryCollection::new();
        coll.insert(record("w1", json!("t1"), "complete", 1)).unwrap();

        assert!(coll
            .find(&RecordKey::new("w1", json!("t1"), "complete"))
            .unwrap()
            .is_some());
        assert!(coll
            .find(&RecordKey::new("w1", json!("t1"), "partial"))
            .unwrap()
            .is_none());
        assert!(coll
            .find(&RecordKey::new("w1", json!("t2"), "complete"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn refresh_keeps_identity_and_id() {
        let coll = MemoryCollection::new();
        let original = record("w1", json!("t1"), "complete", 1);
        let id = original.id;
        coll.insert(original).unwrap();

        assert!(coll.refresh(record("w1", json!("t1"), "complete", 2)).unwrap());
        let stored = coll
            .find(&RecordKey::new("w1", json!("t1"), "complete"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.payload().unwrap()["x"], json!(2));
        assert_eq!(coll.len(), 1);

        assert!(!coll.refresh(record("w9", json!("t1"), "complete", 2)).unwrap());
    }

    #[test]
    fn latest_prefers_greatest_saved_at_then_newest_write() {
        let coll = MemoryCollection::new();
        coll.insert(record("a", json!("2024-01-02"), "complete", 1)).unwrap();
        coll.insert(record("b", json!("2024-01-01"), "complete", 2)).unwrap();
        assert_eq!(coll.latest().unwrap().unwrap().world_name, "a");

        coll.insert(record("c", json!("2024-01-02"), "complete", 3)).unwrap();
        assert_eq!(coll.latest().unwrap().unwrap().world_name, "c");
    }

    #[test]
    fn newest_write_ignores_saved_at_order() {
        let coll = MemoryCollection::new();
        coll.insert(record("w1", json!(5), "complete", 1)).unwrap();
        coll.insert(record("w1", json!(1), "complete", 2)).unwrap();
        coll.insert(record("w1", json!(9), "partial", 3)).unwrap();

        let newest = coll.newest_write("w1", "complete").unwrap().unwrap();
        assert_eq!(newest.saved_at, json!(1));
    }

    #[test]
    fn latest_per_world_deduplicates_and_limits() {
        let coll = MemoryCollection::new();
        coll.insert(record("a", json!(1), "complete", 0)).unwrap();
        coll.insert(record("a", json!(4), "complete", 0)).unwrap();
        coll.insert(record("b", json!(3), "complete", 0)).unwrap();
        coll.insert(record("c", json!(2), "complete", 0)).unwrap();

        let worlds = coll.latest_per_world(2).unwrap();
        assert_eq!(
            worlds,
            vec![
                (String::from("a"), json!(4)),
                (String::from("b"), json!(3)),
            ]
        );
        assert!(coll.latest_per_world(0).unwrap().is_empty());
    }

    #[test]
    fn delete_world_removes_every_variant() {
        let coll = MemoryCollection::new();
        coll.insert(record("w1", json!(1), "complete", 0)).unwrap();
        coll.insert(record("w1", json!(2), "partial", 0)).unwrap();
        coll.insert(record("w2", json!(1), "complete", 0)).unwrap();

        assert_eq!(coll.delete_world("w1").unwrap(), 2);
        assert_eq!(coll.delete_world("w1").unwrap(), 0);
        assert_eq!(coll.len(), 1);
    }

    #[test]
    fn offline_collection_counts_and_refuses_calls() {
        let coll = MemoryCollection::new();
        coll.set_offline(true);
        assert!(matches!(coll.ping(), Err(DbError::Unavailable(_))));
        assert!(coll.latest().is_err());
        assert_eq!(coll.backend_calls(), 2);

        coll.set_offline(false);
        assert!(coll.ping().is_ok());
        assert_eq!(coll.backend_calls(), 3);
    }
}
