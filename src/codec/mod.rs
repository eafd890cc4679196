// Conversion between document instances and raw storage records.
//
// Encoding writes every present field under its storage key, plus the
// discriminator metadata (`_cls`, `_types`) when the schema is polymorphic.
// Decoding dispatches on the stored discriminator through the registry's
// descendants index, falling back to the requested schema.

use crate::document::DocumentInstance;
use crate::error::{DocMapError, Result};
use crate::schema::{SchemaDefinition, SchemaRegistry};
use crate::value::{RawRecord, Reference, Value};
use indexmap::IndexMap;
use std::sync::Arc;

/// Reserved key: the instance's qualified name.
pub const DISCRIMINATOR_KEY: &str = "_cls";
/// Reserved key: every ancestor qualified name plus the instance's own,
/// root to leaf. Lets the store match any subclass of a given ancestor.
pub const TYPE_CHAIN_KEY: &str = "_types";

/// Encode an instance as a raw record. Absent fields are omitted, never
/// written as null; the identifier in particular is simply left out until
/// the document is saved.
pub fn encode(doc: &DocumentInstance, registry: &SchemaRegistry) -> Result<RawRecord> {
    let schema = doc.schema();
    let mut raw = RawRecord::new();
    for (name, descriptor) in &schema.fields {
        if let Some(value) = doc.get(name) {
            raw.insert(
                descriptor.storage_key().to_string(),
                descriptor.coerce_out(value, registry)?,
            );
        }
    }
    if schema.allow_polymorphism {
        raw.insert(
            DISCRIMINATOR_KEY.to_string(),
            serde_json::Value::String(schema.qualified_name.clone()),
        );
        raw.insert(
            TYPE_CHAIN_KEY.to_string(),
            serde_json::Value::Array(
                schema
                    .type_chain()
                    .into_iter()
                    .map(serde_json::Value::String)
                    .collect(),
            ),
        );
    }
    Ok(raw)
}

/// Decode a raw record against a requested schema.
///
/// Returns `None` when the stored discriminator names a type that is neither
/// the requested schema nor a registered descendant of it; a collection may
/// legitimately hold subclasses more specific than the caller knows about.
pub fn decode(
    raw: &RawRecord,
    requested: &Arc<SchemaDefinition>,
    registry: &SchemaRegistry,
) -> Result<Option<DocumentInstance>> {
    let discriminator = raw
        .get(DISCRIMINATOR_KEY)
        .and_then(|v| v.as_str())
        .unwrap_or(&requested.qualified_name);

    let schema = if discriminator == requested.qualified_name {
        requested.clone()
    } else {
        match registry.resolve_descendant(&requested.qualified_name, discriminator) {
            Some(schema) => schema,
            None => return Ok(None),
        }
    };

    let present_fields: Vec<String> = raw.keys().cloned().collect();

    let mut values = IndexMap::new();
    for (name, descriptor) in &schema.fields {
        match raw.get(descriptor.storage_key()) {
            Some(serde_json::Value::Null) | None => {}
            Some(raw_value) => {
                values.insert(name.clone(), descriptor.coerce_in(raw_value, registry)?);
            }
        }
    }

    Ok(Some(DocumentInstance::from_decoded(
        schema,
        values,
        present_fields,
    )))
}

/// Build the stored reference for a document. Generic when the document's
/// schema permits polymorphism (the discriminator is then needed to decode
/// the right subclass later), or when the caller forces it.
pub(crate) fn reference_to(doc: &DocumentInstance, force_generic: bool) -> Result<Reference> {
    let schema = doc.schema();
    let collection = schema.storage_collection.clone().ok_or_else(|| {
        DocMapError::Validation(format!(
            "Documents of schema '{}' have no collection and cannot be referenced",
            schema.qualified_name
        ))
    })?;
    let id = doc.id().and_then(Value::as_id).cloned().ok_or_else(|| {
        DocMapError::Validation(
            "You can only reference documents once they have been saved".to_string(),
        )
    })?;
    if force_generic || schema.allow_polymorphism {
        Ok(Reference::generic(collection, id, schema.qualified_name.clone()))
    } else {
        Ok(Reference::direct(collection, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDescriptor;
    use crate::schema::{Schema, SchemaRegistry};
    use crate::value::Id;
    use pretty_assertions::assert_eq;

    fn registry() -> SchemaRegistry {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::embedded("Address").field("city", FieldDescriptor::string()))
            .unwrap();
        builder
            .register(
                Schema::new("Person")
                    .field("name", FieldDescriptor::string().required())
                    .field("address", FieldDescriptor::embedded("Address"))
                    .field("tags", FieldDescriptor::list(FieldDescriptor::string())),
            )
            .unwrap();
        builder
            .register(
                Schema::new("Employee")
                    .extends("Person")
                    .field("salary", FieldDescriptor::int()),
            )
            .unwrap();
        builder
            .register(
                Schema::new("Counter")
                    .disallow_polymorphism()
                    .field("count", FieldDescriptor::int()),
            )
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_round_trip_field_for_field() {
        let registry = registry();
        let mut address = DocumentInstance::new(&registry, "Address").unwrap();
        address.set("city", "Zurich").unwrap();

        let mut doc = DocumentInstance::new(&registry, "Person").unwrap();
        doc.set("name", "Ada").unwrap();
        doc.set("address", address).unwrap();
        doc.set(
            "tags",
            vec![Value::from("pioneer"), Value::from("mathematician")],
        )
        .unwrap();

        let raw = encode(&doc, &registry).unwrap();
        let schema = registry.get("Person").unwrap();
        let decoded = decode(&raw, &schema, &registry).unwrap().unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_polymorphic_metadata_written() {
        let registry = registry();
        let mut doc = DocumentInstance::new(&registry, "Person.Employee").unwrap();
        doc.set("name", "Ada").unwrap();
        let raw = encode(&doc, &registry).unwrap();
        assert_eq!(raw["_cls"], "Person.Employee");
        assert_eq!(raw["_types"], serde_json::json!(["Person", "Person.Employee"]));
    }

    #[test]
    fn test_non_polymorphic_schema_omits_metadata() {
        let registry = registry();
        let mut doc = DocumentInstance::new(&registry, "Counter").unwrap();
        doc.set("count", 1).unwrap();
        let raw = encode(&doc, &registry).unwrap();
        assert!(!raw.contains_key("_cls"));
        assert!(!raw.contains_key("_types"));
    }

    #[test]
    fn test_identifier_omitted_when_unset() {
        let registry = registry();
        let mut doc = DocumentInstance::new(&registry, "Person").unwrap();
        doc.set("name", "Ada").unwrap();
        let raw = encode(&doc, &registry).unwrap();
        assert!(!raw.contains_key("_id"));
    }

    #[test]
    fn test_decode_dispatches_to_subclass() {
        let registry = registry();
        let mut employee = DocumentInstance::new(&registry, "Person.Employee").unwrap();
        employee.set("name", "Ada").unwrap();
        employee.set("salary", 100_000).unwrap();

        let raw = encode(&employee, &registry).unwrap();
        let person = registry.get("Person").unwrap();
        let decoded = decode(&raw, &person, &registry).unwrap().unwrap();
        assert_eq!(decoded.qualified_name(), "Person.Employee");
        assert_eq!(decoded.get("salary"), Some(&Value::Int(100_000)));
    }

    #[test]
    fn test_decode_unknown_discriminator_returns_none() {
        let registry = registry();
        let mut raw = RawRecord::new();
        raw.insert("_cls".into(), serde_json::json!("Person.Contractor"));
        raw.insert("name".into(), serde_json::json!("Ada"));
        let person = registry.get("Person").unwrap();
        assert!(decode(&raw, &person, &registry).unwrap().is_none());
    }

    #[test]
    fn test_present_fields_recorded_before_stripping() {
        let registry = registry();
        let mut doc = DocumentInstance::new(&registry, "Person").unwrap();
        doc.set("name", "Ada").unwrap();
        let raw = encode(&doc, &registry).unwrap();
        let schema = registry.get("Person").unwrap();
        let decoded = decode(&raw, &schema, &registry).unwrap().unwrap();
        assert!(decoded.present_fields().contains(&"name".to_string()));
        assert!(decoded.present_fields().contains(&"_cls".to_string()));
        assert!(!decoded.present_fields().contains(&"address".to_string()));
    }

    #[test]
    fn test_explicit_null_decodes_as_absent() {
        let registry = registry();
        let mut raw = RawRecord::new();
        raw.insert("name".into(), serde_json::json!("Ada"));
        raw.insert("tags".into(), serde_json::Value::Null);
        let schema = registry.get("Person").unwrap();
        let decoded = decode(&raw, &schema, &registry).unwrap().unwrap();
        assert!(!decoded.contains("tags"));
    }

    #[test]
    fn test_referencing_unsaved_document_fails() {
        let registry = registry();
        let doc = DocumentInstance::new(&registry, "Person").unwrap();
        let err = reference_to(&doc, false);
        assert!(matches!(err, Err(DocMapError::Validation(_))));
    }

    #[test]
    fn test_reference_shape_follows_polymorphism() {
        let registry = registry();

        let mut person = DocumentInstance::new(&registry, "Person").unwrap();
        person.set_id(Id::new()).unwrap();
        assert!(matches!(
            reference_to(&person, false).unwrap(),
            Reference::Generic { .. }
        ));

        let mut counter = DocumentInstance::new(&registry, "Counter").unwrap();
        counter.set_id(Id::new()).unwrap();
        assert!(matches!(
            reference_to(&counter, false).unwrap(),
            Reference::Direct { .. }
        ));
        // Forcing generic keeps the discriminator even without polymorphism.
        assert!(matches!(
            reference_to(&counter, true).unwrap(),
            Reference::Generic { .. }
        ));
    }
}
