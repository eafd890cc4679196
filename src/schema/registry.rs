// The schema registry: write-once at definition time, read-only and
// lock-free afterward. Descendant lookup is a map traversal built at
// registration, never a runtime hierarchy scan.

use super::{DeleteRule, Schema, SchemaDefinition};
use crate::error::{DocMapError, Result};
use crate::field::{FieldDescriptor, FieldKind};
use crate::index;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// A delete rule registered at definition time: deleting a document of the
/// `referenced` schema triggers `rule` for `dependent` documents whose
/// `field` points at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRuleEntry {
    pub referenced: String,
    pub dependent: String,
    pub field: String,
    pub rule: DeleteRule,
}

/// Accumulates schema declarations, validating each against what is already
/// registered, then freezes into a [`SchemaRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    schemas: IndexMap<String, SchemaDefinition>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        RegistryBuilder::default()
    }

    /// Register one schema. Inheritance is resolved immediately, so parents
    /// must be registered before their subclasses. Definition-time rule
    /// violations fail here, not at runtime.
    pub fn register(&mut self, schema: Schema) -> Result<&mut Self> {
        let definition = self.resolve(schema)?;
        self.schemas
            .insert(definition.qualified_name.clone(), definition);
        Ok(self)
    }

    fn resolve(&self, schema: Schema) -> Result<SchemaDefinition> {
        if schema.name.is_empty() || schema.name.contains('.') {
            return Err(DocMapError::Definition(format!(
                "'{}' is not a valid schema name",
                schema.name
            )));
        }
        if (schema.is_abstract || schema.is_embedded) && schema.collection.is_some() {
            return Err(DocMapError::Definition(format!(
                "Schema '{}' cannot declare a storage collection",
                schema.name
            )));
        }

        let parent = match &schema.extends {
            Some(parent_name) => Some(self.schemas.get(parent_name).ok_or_else(|| {
                DocMapError::Definition(format!(
                    "Schema '{}' extends unregistered schema '{parent_name}'",
                    schema.name
                ))
            })?),
            None => None,
        };

        if let Some(parent) = parent {
            if !parent.allow_polymorphism {
                return Err(DocMapError::Definition(format!(
                    "Schema '{}' may not be subclassed",
                    parent.qualified_name
                )));
            }
            if parent.is_embedded != schema.is_embedded {
                return Err(DocMapError::Definition(format!(
                    "Schema '{}' cannot extend '{}' across the embedded boundary",
                    schema.name, parent.qualified_name
                )));
            }
            if schema.is_abstract && !parent.is_abstract {
                return Err(DocMapError::Definition(format!(
                    "Abstract schema '{}' cannot have non-abstract base '{}'",
                    schema.name, parent.qualified_name
                )));
            }
        }

        // Polymorphism may only be disabled where no concrete ancestor exists.
        let allow_polymorphism = match schema.allow_polymorphism {
            Some(false) => {
                if parent.is_some_and(|p| !p.is_abstract) {
                    return Err(DocMapError::Definition(format!(
                        "Schema '{}' cannot disable polymorphism below a concrete superclass",
                        schema.name
                    )));
                }
                false
            }
            Some(true) => true,
            None => parent.map_or(true, |p| p.allow_polymorphism),
        };

        let qualified_name = match parent {
            Some(p) => format!("{}.{}", p.qualified_name, schema.name),
            None => schema.name.clone(),
        };
        if self.schemas.contains_key(&qualified_name) {
            return Err(DocMapError::Definition(format!(
                "Schema '{qualified_name}' is already registered"
            )));
        }

        // Merge inherited fields; the subclass wins on name collision except
        // for the primary key, which is immutable once an ancestor set it.
        let mut fields: IndexMap<String, FieldDescriptor> = parent
            .map(|p| p.fields.clone())
            .unwrap_or_default();
        let inherited_pk = parent.and_then(|p| p.primary_key_field.clone());

        let mut own_pk: Option<String> = None;
        let mut declared_fields = Vec::with_capacity(schema.fields.len());
        for (name, mut descriptor) in schema.fields {
            descriptor.bind(&name);
            if descriptor.primary_key {
                if schema.is_embedded {
                    return Err(DocMapError::Definition(format!(
                        "Embedded schema '{}' cannot declare a primary key",
                        schema.name
                    )));
                }
                if inherited_pk.is_some() {
                    return Err(DocMapError::Definition(format!(
                        "Schema '{}' cannot override the primary key field",
                        schema.name
                    )));
                }
                if own_pk.is_some() {
                    return Err(DocMapError::Definition(format!(
                        "Schema '{}' declares more than one primary key",
                        schema.name
                    )));
                }
                if !matches!(descriptor.kind, FieldKind::Id) {
                    return Err(DocMapError::Definition(format!(
                        "Primary key '{name}' of schema '{}' must be an identifier field",
                        schema.name
                    )));
                }
                own_pk = Some(name.clone());
            }
            declared_fields.push(name.clone());
            fields.insert(name, descriptor);
        }

        let mut primary_key_field = inherited_pk.or(own_pk);

        // Resolve the storage collection: inherited from the nearest concrete
        // ancestor, overridable only at a simple (direct, non-abstract)
        // subclass boundary, defaulting to the lower-cased class name.
        let storage_collection = if schema.is_abstract || schema.is_embedded {
            None
        } else {
            let inherited = parent.and_then(|p| p.storage_collection.clone());
            if schema.collection.is_some() && inherited.is_some() {
                return Err(DocMapError::Definition(format!(
                    "Schema '{}' is stored in its superclass collection and cannot override it",
                    schema.name
                )));
            }
            let collection = schema
                .collection
                .clone()
                .or(inherited)
                .unwrap_or_else(|| schema.name.to_lowercase());

            // A concrete schema without a primary key gets an implicit
            // identifier field stored under `_id`.
            if primary_key_field.is_none() {
                let mut id_field = FieldDescriptor::id();
                id_field.bind("id");
                id_field.primary_key = true;
                fields.insert("id".to_string(), id_field);
                primary_key_field = Some("id".to_string());
            }
            Some(collection)
        };

        let superclasses = match parent {
            Some(p) => p.type_chain(),
            None => Vec::new(),
        };

        let mut declared_indexes = parent
            .map(|p| p.declared_indexes.clone())
            .unwrap_or_default();
        declared_indexes.extend(schema.indexes);

        Ok(SchemaDefinition {
            qualified_name,
            name: schema.name,
            is_abstract: schema.is_abstract,
            is_embedded: schema.is_embedded,
            allow_polymorphism,
            storage_collection,
            superclasses,
            fields,
            primary_key_field,
            declared_indexes,
            indexes: Vec::new(),
            declared_fields,
        })
    }

    /// Freeze the registry: validate cross-schema field targets, resolve
    /// `unique_with` storage paths, derive uniqueness indexes, build the
    /// descendants index, and collect delete rules.
    pub fn build(mut self) -> Result<SchemaRegistry> {
        self.validate_field_targets()?;
        self.resolve_unique_constraints()?;

        let names: Vec<String> = self.schemas.keys().cloned().collect();

        // Index plans are per schema but may look into embedded schemas.
        let plans: Vec<(String, Vec<index::IndexSpec>)> = names
            .iter()
            .map(|q| (q.clone(), index::plan(&self.schemas[q], &self.schemas)))
            .collect();
        for (q, plan) in plans {
            self.schemas[&q].indexes = plan;
        }

        let mut descendants: HashMap<String, Vec<String>> = HashMap::new();
        for (qualified, schema) in &self.schemas {
            for ancestor in &schema.superclasses {
                descendants
                    .entry(ancestor.clone())
                    .or_default()
                    .push(qualified.clone());
            }
        }

        let mut delete_rules = Vec::new();
        for schema in self.schemas.values() {
            for name in &schema.declared_fields {
                let descriptor = &schema.fields[name];
                if let FieldKind::Reference { target, on_delete } = &descriptor.kind {
                    if *on_delete != DeleteRule::DoNothing {
                        delete_rules.push(DeleteRuleEntry {
                            referenced: target.clone(),
                            dependent: schema.qualified_name.clone(),
                            field: name.clone(),
                            rule: *on_delete,
                        });
                    }
                }
            }
        }

        log::debug!(
            "schema registry frozen: {} schemas, {} delete rules",
            self.schemas.len(),
            delete_rules.len()
        );

        Ok(SchemaRegistry {
            schemas: self
                .schemas
                .into_iter()
                .map(|(q, s)| (q, Arc::new(s)))
                .collect(),
            descendants,
            delete_rules,
        })
    }

    fn validate_field_targets(&self) -> Result<()> {
        for schema in self.schemas.values() {
            for descriptor in schema.fields.values() {
                self.validate_kind(&schema.qualified_name, &descriptor.kind)?;
            }
        }
        Ok(())
    }

    fn validate_kind(&self, owner: &str, kind: &FieldKind) -> Result<()> {
        match kind {
            FieldKind::Embedded(target) => match self.schemas.get(target) {
                Some(t) if t.is_embedded => Ok(()),
                Some(_) => Err(DocMapError::Definition(format!(
                    "Schema '{owner}' embeds '{target}', which is not an embedded schema"
                ))),
                None => Err(DocMapError::Definition(format!(
                    "Schema '{owner}' embeds unregistered schema '{target}'"
                ))),
            },
            FieldKind::Reference { target, .. } => match self.schemas.get(target) {
                Some(t) if t.storage_collection.is_some() => Ok(()),
                Some(_) => Err(DocMapError::Definition(format!(
                    "Schema '{owner}' references '{target}', which has no storage collection"
                ))),
                None => Err(DocMapError::Definition(format!(
                    "Schema '{owner}' references unregistered schema '{target}'"
                ))),
            },
            FieldKind::List(inner) | FieldKind::Map(inner) => {
                self.validate_kind(owner, &inner.kind)
            }
            _ => Ok(()),
        }
    }

    /// Resolve `unique_with` entries to real storage paths and promote every
    /// involved field to required.
    fn resolve_unique_constraints(&mut self) -> Result<()> {
        let names: Vec<String> = self.schemas.keys().cloned().collect();
        let mut promotions: Vec<(String, String)> = Vec::new();
        let mut resolutions: Vec<(String, String, Vec<String>)> = Vec::new();

        for q in &names {
            let schema = &self.schemas[q];
            for (field_name, descriptor) in &schema.fields {
                if !descriptor.unique {
                    continue;
                }
                promotions.push((q.clone(), field_name.clone()));
                let mut resolved = Vec::with_capacity(descriptor.unique_with.len());
                for path in &descriptor.unique_with {
                    let (storage_path, owner, leaf) = self.resolve_field_path(schema, path)?;
                    resolved.push(storage_path);
                    promotions.push((owner, leaf));
                }
                if !resolved.is_empty() {
                    resolutions.push((q.clone(), field_name.clone(), resolved));
                }
            }
        }

        for (q, field_name, resolved) in resolutions {
            self.schemas[&q].fields[&field_name].resolved_unique_with = resolved;
        }
        for (q, field_name) in promotions {
            self.schemas[&q].fields[&field_name].required = true;
        }
        Ok(())
    }

    /// Walk a dotted field path through embedded schemas. Returns the dotted
    /// storage path plus the qualified name and field name owning the leaf.
    fn resolve_field_path(
        &self,
        schema: &SchemaDefinition,
        path: &str,
    ) -> Result<(String, String, String)> {
        let mut current = schema;
        let mut storage_parts = Vec::new();
        let parts: Vec<&str> = path.split('.').collect();

        for (i, part) in parts.iter().enumerate() {
            let descriptor = current.fields.get(*part).ok_or_else(|| {
                DocMapError::Definition(format!(
                    "unique_with path '{path}' names unknown field '{part}' on '{}'",
                    current.qualified_name
                ))
            })?;
            storage_parts.push(descriptor.storage_key().to_string());
            if i + 1 == parts.len() {
                return Ok((
                    storage_parts.join("."),
                    current.qualified_name.clone(),
                    (*part).to_string(),
                ));
            }
            match &descriptor.kind {
                FieldKind::Embedded(target) => {
                    current = self.schemas.get(target).ok_or_else(|| {
                        DocMapError::Definition(format!(
                            "unique_with path '{path}' walks into unregistered schema '{target}'"
                        ))
                    })?;
                }
                _ => {
                    return Err(DocMapError::Definition(format!(
                        "unique_with path '{path}' walks through non-embedded field '{part}'"
                    )))
                }
            }
        }
        unreachable!("split('.') yields at least one part")
    }
}

/// The frozen registry. Immutable once built; share it as
/// `Arc<SchemaRegistry>`; concurrent readers need no locking.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, Arc<SchemaDefinition>>,
    descendants: HashMap<String, Vec<String>>,
    delete_rules: Vec<DeleteRuleEntry>,
}

impl SchemaRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, qualified_name: &str) -> Result<Arc<SchemaDefinition>> {
        self.schemas
            .get(qualified_name)
            .cloned()
            .ok_or_else(|| DocMapError::NotRegistered(qualified_name.to_string()))
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.schemas.contains_key(qualified_name)
    }

    /// Resolve a discriminator read from a stored record against a requested
    /// schema: the schema itself or any registered descendant. `None` when
    /// the discriminator names something else: the record belongs to a type
    /// the caller did not ask for and cannot represent.
    pub fn resolve_descendant(
        &self,
        requested: &str,
        discriminator: &str,
    ) -> Option<Arc<SchemaDefinition>> {
        if discriminator == requested {
            return self.schemas.get(requested).cloned();
        }
        let known = self
            .descendants
            .get(requested)
            .is_some_and(|d| d.iter().any(|q| q == discriminator));
        if known {
            self.schemas.get(discriminator).cloned()
        } else {
            None
        }
    }

    /// Qualified names of every registered descendant, registration order.
    pub fn descendants_of(&self, qualified_name: &str) -> &[String] {
        self.descendants
            .get(qualified_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Delete rules applying to documents of the given schema: rules
    /// registered against it or any superclass (subclass documents live in
    /// the superclass collection, so superclass rules cover them).
    pub fn delete_rules_for(&self, schema: &SchemaDefinition) -> Vec<&DeleteRuleEntry> {
        self.delete_rules
            .iter()
            .filter(|entry| {
                entry.referenced == schema.qualified_name
                    || schema.superclasses.contains(&entry.referenced)
            })
            .collect()
    }

    /// Translate a dotted field path on the given schema to its dotted
    /// storage path, walking embedded schemas. Unknown segments pass through
    /// unchanged.
    pub fn storage_path(&self, schema: &SchemaDefinition, path: &str) -> String {
        let mut current: Option<&SchemaDefinition> = Some(schema);
        let mut out = Vec::new();
        for part in path.split('.') {
            match current.and_then(|s| s.fields.get(part)) {
                Some(descriptor) => {
                    out.push(descriptor.storage_key().to_string());
                    current = match &descriptor.kind {
                        FieldKind::Embedded(target) => {
                            self.schemas.get(target).map(|s| s.as_ref())
                        }
                        _ => None,
                    };
                }
                None => {
                    out.push(part.to_string());
                    current = None;
                }
            }
        }
        out.join(".")
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SchemaDefinition>> {
        self.schemas.values()
    }
}
