//! First-seen deduplication of query results.
//!
//! Joins that fan out (one parent row per matching child) return the same
//! entity several times. These helpers collapse repeats while keeping the
//! order in which each item was first seen.

use std::collections::HashSet;
use std::hash::Hash;

use serde_json::Value;
use unitas_types::entity::{Entity, Record};

/// Keep the first item for every distinct key, preserving order.
pub fn unique_by<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

/// Deduplicate entities by primary key. Entities without a key are all kept.
pub fn unique_entities<E: Entity>(entities: impl IntoIterator<Item = E>) -> Vec<E> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter(|entity| match entity.id() {
            Some(id) => seen.insert(id),
            None => true,
        })
        .collect()
}

/// Deduplicate generic rows on full-row equality.
pub fn unique_records(records: impl IntoIterator<Item = Record>) -> Vec<Record> {
    unique_by(records, |record| Value::Object(record.clone()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use unitas_types::entity::{EntityId, KeyStrategy};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Invoice {
        id: Option<i64>,
        total: i64,
    }

    impl Entity for Invoice {
        const TYPE_NAME: &'static str = "Invoice";
        const PRIMARY_KEY: KeyStrategy = KeyStrategy::AutoIncrement;
        const FIELDS: &'static [&'static str] = &["total"];

        fn id(&self) -> Option<EntityId> {
            self.id.map(EntityId::Int)
        }
    }

    fn invoice(id: Option<i64>, total: i64) -> Invoice {
        Invoice { id, total }
    }

    #[test]
    fn test_unique_entities_keeps_first_seen_order() {
        let rows = vec![
            invoice(Some(1), 10),
            invoice(Some(2), 20),
            invoice(Some(1), 10),
            invoice(Some(3), 30),
            invoice(Some(2), 20),
            invoice(Some(1), 10),
        ];
        let unique = unique_entities(rows);
        let ids: Vec<_> = unique.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_unique_entities_keeps_unkeyed() {
        let unique = unique_entities(vec![invoice(None, 1), invoice(None, 1)]);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn test_unique_records_full_row() {
        let a = json!({"id": 1, "team": "red"});
        let b = json!({"id": 1, "team": "blue"});
        let records: Vec<Record> = [a.clone(), b.clone(), a.clone()]
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        let unique = unique_records(records);
        assert_eq!(unique.len(), 2);
        assert_eq!(Value::Object(unique[0].clone()), a);
        assert_eq!(Value::Object(unique[1].clone()), b);
    }

    #[test]
    fn test_unique_by_custom_key() {
        let words = unique_by(["apple", "avocado", "banana", "blueberry", "cherry"], |w| {
            w.chars().next()
        });
        assert_eq!(words, vec!["apple", "banana", "cherry"]);
    }
}
