// Document instances: typed field values plus the mutation bookkeeping that
// makes minimal-delta persistence possible.

use crate::error::{DocMapError, Result};
use crate::schema::{SchemaDefinition, SchemaRegistry};
use crate::value::{Id, RawRecord, Value};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// One document: a set of field values owned by a schema.
///
/// Instances are either fresh (constructed directly, defaults applied, every
/// populated field dirty) or loaded (produced by the codec, clean, with
/// `present_fields` recording what the stored record actually contained).
/// Assignment marks the field dirty and clears any matching unset entry;
/// unsetting records the path for the next delta and drops the value.
#[derive(Debug, Clone)]
pub struct DocumentInstance {
    schema: Arc<SchemaDefinition>,
    values: IndexMap<String, Value>,
    dirty_fields: IndexSet<String>,
    unset_fields: IndexSet<String>,
    present_fields: Vec<String>,
    resolved_fields: IndexSet<String>,
    stored: bool,
}

impl DocumentInstance {
    /// Construct a fresh instance of the named schema, with defaults applied.
    pub fn new(registry: &SchemaRegistry, qualified_name: &str) -> Result<Self> {
        let schema = registry.get(qualified_name)?;
        if schema.is_abstract {
            return Err(DocMapError::Definition(format!(
                "Cannot instantiate abstract schema '{qualified_name}'"
            )));
        }

        let mut doc = DocumentInstance {
            schema,
            values: IndexMap::new(),
            dirty_fields: IndexSet::new(),
            unset_fields: IndexSet::new(),
            present_fields: Vec::new(),
            resolved_fields: IndexSet::new(),
            stored: false,
        };
        let defaults: Vec<(String, Value)> = doc
            .schema
            .fields
            .iter()
            .filter_map(|(name, fd)| fd.default().map(|d| (name.clone(), d.materialize())))
            .collect();
        for (name, value) in defaults {
            doc.dirty_fields.insert(name.clone());
            doc.values.insert(name, value);
        }
        Ok(doc)
    }

    /// Build a loaded instance. Used by the codec; dirty state starts empty.
    pub(crate) fn from_decoded(
        schema: Arc<SchemaDefinition>,
        values: IndexMap<String, Value>,
        present_fields: Vec<String>,
    ) -> Self {
        DocumentInstance {
            schema,
            values,
            dirty_fields: IndexSet::new(),
            unset_fields: IndexSet::new(),
            present_fields,
            resolved_fields: IndexSet::new(),
            stored: true,
        }
    }

    pub fn schema(&self) -> &Arc<SchemaDefinition> {
        &self.schema
    }

    pub fn qualified_name(&self) -> &str {
        &self.schema.qualified_name
    }

    // ── Field access ───────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Assign a field value. Marks the field dirty, clears any unset entry
    /// under it, and invalidates its resolver cache flag.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        if !self.schema.fields.contains_key(name) {
            return Err(DocMapError::Validation(format!(
                "Schema '{}' has no field '{name}'",
                self.schema.qualified_name
            )));
        }
        self.values.insert(name.to_string(), value.into());
        self.dirty_fields.insert(name.to_string());
        let prefix = format!("{name}.");
        self.unset_fields
            .retain(|path| path.as_str() != name && !path.starts_with(&prefix));
        self.resolved_fields.shift_remove(name);
        Ok(())
    }

    /// Clear a field (or a dotted path into an embedded document) to absent,
    /// recording the path for the next delta.
    pub fn unset(&mut self, path: &str) -> Result<()> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        if !self.schema.fields.contains_key(head) {
            return Err(DocMapError::Validation(format!(
                "Schema '{}' has no field '{head}'",
                self.schema.qualified_name
            )));
        }
        match rest {
            None => {
                self.values.shift_remove(head);
                self.dirty_fields.shift_remove(head);
                self.resolved_fields.shift_remove(head);
            }
            Some(rest) => {
                if let Some(Value::Document(doc)) = self.values.get_mut(head) {
                    doc.unset(rest)?;
                }
            }
        }
        self.unset_fields.insert(path.to_string());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names of the schema's fields, declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.schema.fields.keys().map(String::as_str)
    }

    // ── Primary key alias ──────────────────────────────────────────

    /// The primary key value, if assigned.
    pub fn id(&self) -> Option<&Value> {
        self.schema
            .primary_key_field
            .as_deref()
            .and_then(|name| self.values.get(name))
    }

    pub fn set_id(&mut self, id: Id) -> Result<()> {
        let pk = self.schema.primary_key_field.clone().ok_or_else(|| {
            DocMapError::Operation(format!(
                "Schema '{}' has no identifier field",
                self.schema.qualified_name
            ))
        })?;
        self.set(&pk, Value::Id(id))
    }

    // ── Mutation state ─────────────────────────────────────────────

    pub fn is_dirty(&self) -> bool {
        !self.dirty_fields.is_empty() || !self.unset_fields.is_empty()
    }

    pub fn dirty_fields(&self) -> impl Iterator<Item = &str> {
        self.dirty_fields.iter().map(String::as_str)
    }

    pub fn unset_paths(&self) -> impl Iterator<Item = &str> {
        self.unset_fields.iter().map(String::as_str)
    }

    /// Field names that existed in the record this instance was loaded from.
    /// Empty for fresh instances.
    pub fn present_fields(&self) -> &[String] {
        &self.present_fields
    }

    /// The minimal change since the last persist: fields to set (under their
    /// storage keys) and dotted storage paths to unset.
    pub fn delta(&self, registry: &SchemaRegistry) -> Result<(RawRecord, Vec<String>)> {
        let mut set = RawRecord::new();
        for name in &self.dirty_fields {
            let Some(value) = self.values.get(name) else {
                continue;
            };
            let descriptor = self.schema.fields.get(name).ok_or_else(|| {
                DocMapError::Validation(format!(
                    "Schema '{}' has no field '{name}'",
                    self.schema.qualified_name
                ))
            })?;
            set.insert(
                descriptor.storage_key().to_string(),
                descriptor.coerce_out(value, registry)?,
            );
        }
        let unset = self
            .unset_fields
            .iter()
            .map(|path| registry.storage_path(&self.schema, path))
            .collect();
        Ok((set, unset))
    }

    /// Whether this instance has a stored counterpart (loaded from the
    /// store, or saved at least once).
    pub fn is_stored(&self) -> bool {
        self.stored
    }

    /// Forget all mutation state. Called after a successful persist.
    pub(crate) fn mark_clean(&mut self) {
        self.dirty_fields.clear();
        self.unset_fields.clear();
        self.stored = true;
    }

    // ── Validation ─────────────────────────────────────────────────

    /// Check required fields and validate every present value, recursing
    /// into embedded documents. Fails closed: a save never proceeds past a
    /// validation error.
    pub fn validate(&self, registry: &SchemaRegistry) -> Result<()> {
        for (name, descriptor) in &self.schema.fields {
            match self.values.get(name) {
                Some(value) => descriptor.validate(value, registry)?,
                None => {
                    if descriptor.required {
                        return Err(DocMapError::Validation(format!(
                            "Field '{name}' is required",
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    // ── Resolver cache bookkeeping ─────────────────────────────────

    pub(crate) fn is_resolved(&self, name: &str) -> bool {
        self.resolved_fields.contains(name)
    }

    pub(crate) fn mark_resolved(&mut self, name: &str) {
        self.resolved_fields.insert(name.to_string());
    }

    pub(crate) fn take_value(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    /// Re-insert a value without touching dirty state (resolver splicing).
    pub(crate) fn put_value(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }
}

// Field-for-field equality on the same schema; mutation bookkeeping and
// resolver caches are not part of a document's identity.
impl PartialEq for DocumentInstance {
    fn eq(&self, other: &Self) -> bool {
        self.schema.qualified_name == other.schema.qualified_name && self.values == other.values
    }
}
