// Lazy, batched resolution of stored references into live instances.
//
// One `find_by_ids` call per target collection per access, regardless of how
// many references the field holds, never one round trip per reference.
// Resolution splices decoded documents back into their original positions
// and caches in place; identifiers with no matching record are dropped.

use crate::codec;
use crate::document::DocumentInstance;
use crate::error::{DocMapError, Result};
use crate::field::FieldDescriptor;
use crate::schema::SchemaRegistry;
use crate::store::Backend;
use crate::value::{Id, RawRecord, Reference, Value};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Resolve a reference-typed (or container-of-references) field in place.
/// A no-op when the field is already resolved or absent. Does not mark the
/// field dirty: resolution is a cache fill, not a mutation.
pub fn resolve_field<B: Backend>(
    doc: &mut DocumentInstance,
    field: &str,
    registry: &SchemaRegistry,
    backend: &B,
) -> Result<()> {
    if doc.is_resolved(field) {
        return Ok(());
    }
    let schema = doc.schema().clone();
    let descriptor = schema.fields.get(field).ok_or_else(|| {
        DocMapError::Validation(format!(
            "Schema '{}' has no field '{field}'",
            schema.qualified_name
        ))
    })?;

    let Some(value) = doc.take_value(field) else {
        doc.mark_resolved(field);
        return Ok(());
    };

    let resolved = match value {
        Value::Ref(reference) => {
            let mut fetched = fetch_batch(&[reference], descriptor, registry, backend)?;
            fetched.remove(0).map(Value::Document)
        }
        Value::List(items) => {
            let references: Vec<Reference> = items
                .iter()
                .filter_map(|v| v.as_reference().cloned())
                .collect();
            let fetched = fetch_batch(&references, descriptor, registry, backend)?;
            let mut fetched = fetched.into_iter();
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Ref(_) => {
                        if let Some(Some(resolved)) = fetched.next() {
                            out.push(Value::Document(resolved));
                        }
                    }
                    other => out.push(other),
                }
            }
            Some(Value::List(out))
        }
        Value::Map(entries) => {
            let references: Vec<Reference> = entries
                .values()
                .filter_map(|v| v.as_reference().cloned())
                .collect();
            let fetched = fetch_batch(&references, descriptor, registry, backend)?;
            let mut fetched = fetched.into_iter();
            let mut out = IndexMap::with_capacity(entries.len());
            for (key, item) in entries {
                match item {
                    Value::Ref(_) => {
                        if let Some(Some(resolved)) = fetched.next() {
                            out.insert(key, Value::Document(resolved));
                        }
                    }
                    other => {
                        out.insert(key, other);
                    }
                }
            }
            Some(Value::Map(out))
        }
        other => Some(other),
    };

    if let Some(value) = resolved {
        doc.put_value(field, value);
    }
    doc.mark_resolved(field);
    Ok(())
}

/// Fetch the documents behind a batch of references: partitioned by target
/// collection, one store lookup per collection. The result is positionally
/// aligned with the input; unresolvable entries come back as `None`.
fn fetch_batch<B: Backend>(
    references: &[Reference],
    descriptor: &FieldDescriptor,
    registry: &SchemaRegistry,
    backend: &B,
) -> Result<Vec<Option<DocumentInstance>>> {
    let mut by_collection: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (i, reference) in references.iter().enumerate() {
        by_collection
            .entry(reference.collection().to_string())
            .or_default()
            .push(i);
    }

    let mut out: Vec<Option<DocumentInstance>> = vec![None; references.len()];
    for (collection, slots) in by_collection {
        let mut ids: Vec<Id> = Vec::new();
        for &slot in &slots {
            let id = references[slot].id().clone();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let records = backend.find_by_ids(&collection, &ids)?;
        let mut by_id: HashMap<String, &RawRecord> = HashMap::with_capacity(records.len());
        for record in &records {
            if let Some(id) = record.get("_id").and_then(|v| v.as_str()) {
                by_id.insert(id.to_string(), record);
            }
        }

        for &slot in &slots {
            let reference = &references[slot];
            let Some(record) = by_id.get(&reference.id().to_string()) else {
                log::warn!(
                    "dropping unresolvable reference {collection}/{}",
                    reference.id()
                );
                continue;
            };

            // A generic reference carries its own discriminator; a direct
            // one relies on the field's statically-known target, falling
            // back to the record's discriminator for untyped containers.
            let requested = match reference.discriminator() {
                Some(discriminator) => registry.get(discriminator)?,
                None => match descriptor.reference_target() {
                    Some(target) => registry.get(target)?,
                    None => match record.get("_cls").and_then(|v| v.as_str()) {
                        Some(discriminator) => registry.get(discriminator)?,
                        None => {
                            log::warn!(
                                "dropping reference {collection}/{}: no schema to decode with",
                                reference.id()
                            );
                            continue;
                        }
                    },
                },
            };

            match codec::decode(record, &requested, registry)? {
                Some(decoded) => out[slot] = Some(decoded),
                None => log::warn!(
                    "dropping reference {collection}/{}: stored type is unknown here",
                    reference.id()
                ),
            }
        }
    }
    Ok(out)
}
