//! Snapshot ordering for backends that sort in process.

use std::cmp::Ordering;

use serde_json::Value;
use worldstore_types::{StoredRecord, compare_saved_at};

/// Order two snapshots by `saved_at`, then by write time.
pub(crate) fn by_saved_at(a: &StoredRecord, b: &StoredRecord) -> Ordering {
    compare_saved_at(&a.saved_at, &b.saved_at).then_with(|| by_write_time(a, b))
}

/// Order two snapshots by write time. Ids are time-ordered and break ties.
pub(crate) fn by_write_time(a: &StoredRecord, b: &StoredRecord) -> Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

/// Latest `saved_at` of each world, most recent first, capped at `limit`.
pub(crate) fn latest_per_world(
    mut records: Vec<StoredRecord>,
    limit: usize,
) -> Vec<(String, Value)> {
    records.sort_by(|a, b| by_saved_at(b, a));
    let mut worlds: Vec<(String, Value)> = Vec::new();
    for record in records {
        if worlds.len() >= limit {
            break;
        }
        if worlds.iter().all(|(name, _)| *name != record.world_name) {
            worlds.push((record.world_name, record.saved_at));
        }
    }
    worlds
}

/// Listing label for one world.
pub(crate) fn world_label(world_name: &str, saved_at: &Value) -> String {
    format!(
        "{world_name} (latest: {})",
        worldstore_types::saved_at_label(saved_at)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn record(world: &str, saved_at: Value, age_secs: i64) -> StoredRecord {
        StoredRecord {
            id: Uuid::now_v7(),
            world_name: world.to_owned(),
            saved_at,
            data_type: String::from("complete"),
            world_data_json: String::from("{}"),
            created_at: Utc::now() - Duration::seconds(age_secs),
            connector_info: String::from("{}"),
        }
    }

    #[test]
    fn saved_at_wins_over_write_time() {
        let older_write = record("a", json!(2), 60);
        let newer_write = record("b", json!(1), 0);
        assert_eq!(by_saved_at(&older_write, &newer_write), Ordering::Greater);
        assert_eq!(by_write_time(&older_write, &newer_write), Ordering::Less);
    }

    #[test]
    fn equal_saved_at_falls_back_to_write_time() {
        let first = record("a", json!("t1"), 10);
        let second = record("b", json!("t1"), 0);
        assert_eq!(by_saved_at(&first, &second), Ordering::Less);
    }

    #[test]
    fn one_entry_per_world() {
        let worlds = latest_per_world(
            vec![
                record("a", json!(1), 0),
                record("b", json!(5), 0),
                record("a", json!(9), 0),
            ],
            20,
        );
        assert_eq!(
            worlds,
            vec![(String::from("a"), json!(9)), (String::from("b"), json!(5))]
        );
        assert_eq!(world_label("a", &json!(9)), "a (latest: 9)");
    }
}
