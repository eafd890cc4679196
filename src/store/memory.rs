// An in-memory backend: the reference implementation of the store
// collaborator, used by the test suite. Enforces the unique indexes derived
// for a registry the way a real store would after index creation, and
// answers reverse lookups on both reference wire shapes.

use super::{Backend, PersistOutcome};
use crate::error::Result;
use crate::schema::SchemaRegistry;
use crate::value::{Id, RawRecord};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RefCell<IndexMap<String, IndexMap<String, RawRecord>>>,
    unique_indexes: Vec<(String, Vec<String>)>,
    find_by_ids_calls: Cell<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// A backend enforcing every unique index derived for the registry's
    /// schemas.
    pub fn with_indexes(registry: &SchemaRegistry) -> Self {
        let mut unique_indexes = Vec::new();
        for schema in registry.iter() {
            if let Some(collection) = &schema.storage_collection {
                for spec in &schema.indexes {
                    if spec.unique {
                        unique_indexes.push((
                            collection.clone(),
                            spec.keys.iter().map(|(path, _)| path.clone()).collect(),
                        ));
                    }
                }
            }
        }
        MemoryBackend {
            collections: RefCell::new(IndexMap::new()),
            unique_indexes,
            find_by_ids_calls: Cell::new(0),
        }
    }

    /// How many batched lookups have been issued. One reference-container
    /// access should cost one call per target collection.
    pub fn find_by_ids_calls(&self) -> usize {
        self.find_by_ids_calls.get()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .borrow()
            .get(collection)
            .map_or(0, IndexMap::len)
    }

    pub fn record(&self, collection: &str, id: &Id) -> Option<RawRecord> {
        self.collections
            .borrow()
            .get(collection)
            .and_then(|records| records.get(&id.to_string()))
            .cloned()
    }
}

impl Backend for MemoryBackend {
    fn find_by_ids(&self, collection: &str, ids: &[Id]) -> Result<Vec<RawRecord>> {
        self.find_by_ids_calls.set(self.find_by_ids_calls.get() + 1);
        let wanted: Vec<String> = ids.iter().map(Id::to_string).collect();
        let collections = self.collections.borrow();
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(records
            .iter()
            .filter(|(id, _)| wanted.iter().any(|w| w == *id))
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn find_referencing(
        &self,
        collection: &str,
        storage_path: &str,
        id: &Id,
    ) -> Result<Vec<RawRecord>> {
        let target = id.to_string();
        let collections = self.collections.borrow();
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(records
            .values()
            .filter(|record| {
                lookup_path(record, storage_path)
                    .is_some_and(|value| matches_reference(value, &target))
            })
            .cloned()
            .collect())
    }

    fn persist(
        &self,
        collection: &str,
        id: &Id,
        set: &RawRecord,
        unset: &[String],
    ) -> Result<PersistOutcome> {
        let mut collections = self.collections.borrow_mut();
        let records = collections.entry(collection.to_string()).or_default();

        let key = id.to_string();
        let mut record = records.get(&key).cloned().unwrap_or_default();
        record.insert("_id".to_string(), serde_json::Value::String(key.clone()));
        for (field, value) in set {
            record.insert(field.clone(), value.clone());
        }
        for path in unset {
            remove_path(&mut record, path);
        }

        for (indexed_collection, paths) in &self.unique_indexes {
            if indexed_collection != collection {
                continue;
            }
            let Some(tuple) = key_tuple(&record, paths) else {
                // A record missing part of the key does not participate in
                // the index (sparse-style semantics).
                continue;
            };
            let duplicate = records
                .iter()
                .any(|(other_id, other)| *other_id != key && key_tuple(other, paths) == Some(tuple.clone()));
            if duplicate {
                return Ok(PersistOutcome::Conflict(format!(
                    "E11000 duplicate key: {}",
                    paths.join(", ")
                )));
            }
        }

        records.insert(key, record);
        Ok(PersistOutcome::Ok)
    }

    fn delete(&self, collection: &str, id: &Id) -> Result<()> {
        let mut collections = self.collections.borrow_mut();
        if let Some(records) = collections.get_mut(collection) {
            records.shift_remove(&id.to_string());
        }
        Ok(())
    }

    fn iter_collection(&self, collection: &str) -> Result<Vec<RawRecord>> {
        Ok(self
            .collections
            .borrow()
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Walk a dotted path into a record.
fn lookup_path<'a>(record: &'a RawRecord, path: &str) -> Option<&'a serde_json::Value> {
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn remove_path(record: &mut RawRecord, path: &str) {
    match path.split_once('.') {
        None => {
            record.remove(path);
        }
        Some((head, rest)) => {
            if let Some(serde_json::Value::Object(inner)) = record.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Whether a stored value references the given identifier: either wire
/// shape, directly or anywhere inside a container.
fn matches_reference(value: &serde_json::Value, id: &str) -> bool {
    match value {
        serde_json::Value::Object(obj) => {
            obj.get("$id").and_then(|v| v.as_str()) == Some(id)
                || obj
                    .get("_ref")
                    .and_then(|v| v.as_object())
                    .and_then(|r| r.get("$id"))
                    .and_then(|v| v.as_str())
                    == Some(id)
        }
        serde_json::Value::Array(items) => items.iter().any(|item| matches_reference(item, id)),
        _ => false,
    }
}

/// The record's value tuple for a unique index, or `None` when any part of
/// the key is missing.
fn key_tuple(record: &RawRecord, paths: &[String]) -> Option<Vec<serde_json::Value>> {
    paths
        .iter()
        .map(|path| lookup_path(record, path).cloned())
        .collect()
}
