// The store façade and the delete-rule engine.
//
// The store itself is an external collaborator reached through the `Backend`
// trait; the façade wires validation, encoding, delta extraction, reference
// resolution, and referential integrity on top of its four primitives.

pub mod memory;

pub use memory::MemoryBackend;

use crate::codec;
use crate::document::DocumentInstance;
use crate::error::{DocMapError, Result};
use crate::resolver;
use crate::schema::{DeleteRule, DeleteRuleEntry, SchemaDefinition, SchemaRegistry};
use crate::value::{Id, RawRecord, Value};
use std::sync::Arc;

/// Result of a persist call: the store enforces uniqueness, we only surface
/// the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Ok,
    Conflict(String),
}

/// The external store collaborator. Synchronous; `persist` is atomic per
/// document; uniqueness conflicts are detected store-side.
pub trait Backend {
    /// Batch lookup by identifier.
    fn find_by_ids(&self, collection: &str, ids: &[Id]) -> Result<Vec<RawRecord>>;

    /// Reverse lookup: all records in `collection` whose field at
    /// `storage_path` references the given identifier.
    fn find_referencing(
        &self,
        collection: &str,
        storage_path: &str,
        id: &Id,
    ) -> Result<Vec<RawRecord>>;

    /// Upsert: apply `set` under the given identifier, then remove the
    /// dotted `unset` paths.
    fn persist(
        &self,
        collection: &str,
        id: &Id,
        set: &RawRecord,
        unset: &[String],
    ) -> Result<PersistOutcome>;

    fn delete(&self, collection: &str, id: &Id) -> Result<()>;

    /// All records of a collection in store iteration order.
    fn iter_collection(&self, collection: &str) -> Result<Vec<RawRecord>>;
}

/// Ties a frozen registry to a backend and exposes the document operations.
pub struct Store<B: Backend> {
    registry: Arc<SchemaRegistry>,
    backend: B,
}

impl<B: Backend> Store<B> {
    pub fn new(registry: Arc<SchemaRegistry>, backend: B) -> Self {
        Store { registry, backend }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Construct a fresh instance of the named schema.
    pub fn instance(&self, qualified_name: &str) -> Result<DocumentInstance> {
        DocumentInstance::new(&self.registry, qualified_name)
    }

    /// Validate and persist. The first save writes the full record (assigning
    /// a fresh identifier when none is set); subsequent saves persist only
    /// the delta. A store-side uniqueness conflict surfaces as an
    /// `OperationError` and leaves the instance dirty.
    pub fn save(&self, doc: &mut DocumentInstance) -> Result<()> {
        doc.validate(&self.registry)?;
        let collection = self.collection_of(doc.schema())?;

        let created = !doc.is_stored();
        if doc.id().is_none() {
            doc.set_id(Id::new())?;
        }
        let id = self.id_of(doc)?;

        let outcome = if created {
            let mut record = codec::encode(doc, &self.registry)?;
            record.remove("_id");
            self.backend.persist(&collection, &id, &record, &[])?
        } else {
            let (mut set, unset) = doc.delta(&self.registry)?;
            if set.is_empty() && unset.is_empty() {
                return Ok(());
            }
            set.remove("_id");
            self.backend.persist(&collection, &id, &set, &unset)?
        };

        match outcome {
            PersistOutcome::Ok => {
                doc.mark_clean();
                Ok(())
            }
            PersistOutcome::Conflict(message) => Err(DocMapError::Operation(format!(
                "Tried to save duplicate unique keys ({message})"
            ))),
        }
    }

    /// Load one document by identifier. `None` when no record exists or the
    /// stored type is not the requested schema or a descendant of it.
    pub fn get(&self, qualified_name: &str, id: &Id) -> Result<Option<DocumentInstance>> {
        let schema = self.registry.get(qualified_name)?;
        let collection = self.collection_of(&schema)?;
        let records = self
            .backend
            .find_by_ids(&collection, std::slice::from_ref(id))?;
        match records.first() {
            Some(record) => codec::decode(record, &schema, &self.registry),
            None => Ok(None),
        }
    }

    /// Load every document of the schema's collection, in store iteration
    /// order, each dispatched to its concrete subclass. Records of types
    /// unknown to this registry are skipped.
    pub fn load_all(&self, qualified_name: &str) -> Result<Vec<DocumentInstance>> {
        let schema = self.registry.get(qualified_name)?;
        let collection = self.collection_of(&schema)?;
        let mut out = Vec::new();
        for record in self.backend.iter_collection(&collection)? {
            if let Some(doc) = codec::decode(&record, &schema, &self.registry)? {
                out.push(doc);
            }
        }
        Ok(out)
    }

    /// Re-fetch and re-decode in place, discarding dirty state and resolver
    /// caches.
    pub fn reload(&self, doc: &mut DocumentInstance) -> Result<()> {
        let id = self.id_of(doc)?;
        let fresh = self.get(doc.qualified_name(), &id)?.ok_or_else(|| {
            DocMapError::Operation(format!(
                "Could not reload {}/{id}: the document no longer exists",
                doc.qualified_name()
            ))
        })?;
        *doc = fresh;
        Ok(())
    }

    /// Resolve a reference field in place (batched, cached; see the
    /// resolver module).
    pub fn resolve(&self, doc: &mut DocumentInstance, field: &str) -> Result<()> {
        resolver::resolve_field(doc, field, &self.registry, &self.backend)
    }

    /// Delete a document, applying every registered delete rule.
    ///
    /// DENY rules are evaluated as a pre-flight across all rules for this
    /// deletion event: if any denies, nothing is touched, the document
    /// itself included. CASCADE recurses depth-first so transitive
    /// dependents are removed before this call returns; NULLIFY persists an
    /// unset of the reference field on each dependent.
    pub fn delete(&self, doc: &DocumentInstance) -> Result<()> {
        let id = self.id_of(doc)?;
        self.delete_event(doc.schema(), &id, &mut Vec::new())
    }

    fn delete_event(
        &self,
        schema: &Arc<SchemaDefinition>,
        id: &Id,
        in_progress: &mut Vec<(String, Id)>,
    ) -> Result<()> {
        let collection = self.collection_of(schema)?;

        // Reference cycles: a document already being deleted in this event
        // must not re-enter the cascade.
        let key = (collection.clone(), id.clone());
        if in_progress.contains(&key) {
            return Ok(());
        }
        in_progress.push(key);

        let rules = self.registry.delete_rules_for(schema);

        for entry in rules.iter().filter(|e| e.rule == DeleteRule::Deny) {
            if !self.dependents_of(entry, id)?.is_empty() {
                return Err(DocMapError::Operation(format!(
                    "Could not delete {collection}/{id}: '{}' documents still reference it",
                    entry.dependent
                )));
            }
        }

        for entry in &rules {
            match entry.rule {
                DeleteRule::Cascade => {
                    let dependent_schema = self.registry.get(&entry.dependent)?;
                    for record in self.dependents_of(entry, id)? {
                        let Some(dependent) =
                            codec::decode(&record, &dependent_schema, &self.registry)?
                        else {
                            continue;
                        };
                        let dependent_id =
                            dependent.id().and_then(Value::as_id).cloned().ok_or_else(|| {
                                DocMapError::Operation(format!(
                                    "Cascade from {collection}/{id} hit a '{}' record without an identifier",
                                    entry.dependent
                                ))
                            })?;
                        log::debug!(
                            "cascade delete {collection}/{id} -> {}/{dependent_id}",
                            entry.dependent
                        );
                        self.delete_event(dependent.schema(), &dependent_id, in_progress)?;
                    }
                }
                DeleteRule::Nullify => {
                    let dependent_schema = self.registry.get(&entry.dependent)?;
                    let dependent_collection = self.collection_of(&dependent_schema)?;
                    let path = self.registry.storage_path(&dependent_schema, &entry.field);
                    for record in self.dependents_of(entry, id)? {
                        let Some(dependent_id) = record.get("_id").and_then(|v| v.as_str()) else {
                            continue;
                        };
                        let dependent_id = Id::parse(dependent_id)?;
                        let outcome = self.backend.persist(
                            &dependent_collection,
                            &dependent_id,
                            &RawRecord::new(),
                            std::slice::from_ref(&path),
                        )?;
                        if let PersistOutcome::Conflict(message) = outcome {
                            return Err(DocMapError::Operation(format!(
                                "Could not nullify {dependent_collection}/{dependent_id} ({message})"
                            )));
                        }
                    }
                }
                DeleteRule::Deny | DeleteRule::DoNothing => {}
            }
        }

        self.backend.delete(&collection, id)
    }

    fn dependents_of(&self, entry: &DeleteRuleEntry, id: &Id) -> Result<Vec<RawRecord>> {
        let dependent_schema = self.registry.get(&entry.dependent)?;
        let dependent_collection = self.collection_of(&dependent_schema)?;
        let path = self.registry.storage_path(&dependent_schema, &entry.field);
        self.backend
            .find_referencing(&dependent_collection, &path, id)
    }

    fn collection_of(&self, schema: &SchemaDefinition) -> Result<String> {
        schema.storage_collection.clone().ok_or_else(|| {
            DocMapError::Operation(format!(
                "Schema '{}' has no storage collection",
                schema.qualified_name
            ))
        })
    }

    fn id_of(&self, doc: &DocumentInstance) -> Result<Id> {
        doc.id()
            .and_then(Value::as_id)
            .cloned()
            .ok_or_else(|| {
                DocMapError::Operation(format!(
                    "Document of schema '{}' has not been saved",
                    doc.qualified_name()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDescriptor;
    use crate::schema::{DeleteRule, Schema, SchemaRegistry};
    use crate::value::Reference;
    use pretty_assertions::assert_eq;

    fn blog_registry() -> Arc<SchemaRegistry> {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::new("Author").field("name", FieldDescriptor::string().required()))
            .unwrap();
        builder
            .register(
                Schema::new("BlogPost")
                    .field("title", FieldDescriptor::string().required())
                    .field(
                        "author",
                        FieldDescriptor::reference("Author").on_delete(DeleteRule::Cascade),
                    ),
            )
            .unwrap();
        Arc::new(builder.build().unwrap())
    }

    fn blog_store() -> Store<MemoryBackend> {
        let registry = blog_registry();
        let backend = MemoryBackend::with_indexes(&registry);
        Store::new(registry, backend)
    }

    fn saved_author(store: &Store<MemoryBackend>, name: &str) -> DocumentInstance {
        let mut author = store.instance("Author").unwrap();
        author.set("name", name).unwrap();
        store.save(&mut author).unwrap();
        author
    }

    #[test]
    fn test_save_assigns_identifier_and_round_trips() {
        let store = blog_store();
        let author = saved_author(&store, "Ada");
        let id = author.id().and_then(Value::as_id).unwrap().clone();

        let loaded = store.get("Author", &id).unwrap().unwrap();
        assert_eq!(loaded, author);
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn test_save_rejects_invalid_document() {
        let store = blog_store();
        let mut author = store.instance("Author").unwrap();
        // Required name missing: nothing may be persisted.
        assert!(store.save(&mut author).is_err());
        assert_eq!(store.backend().count("author"), 0);
    }

    #[test]
    fn test_delta_idempotence_around_save() {
        let store = blog_store();
        let registry = store.registry().clone();
        let mut author = saved_author(&store, "Ada");

        // Immediately after a successful persist the delta is empty.
        let (set, unset) = author.delta(&registry).unwrap();
        assert!(set.is_empty());
        assert!(unset.is_empty());

        // Mutating one field yields exactly that field.
        author.set("name", "Grace").unwrap();
        let (set, unset) = author.delta(&registry).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set["name"], serde_json::json!("Grace"));
        assert!(unset.is_empty());

        store.save(&mut author).unwrap();
        let id = author.id().and_then(Value::as_id).unwrap().clone();
        let record = store.backend().record("author", &id).unwrap();
        assert_eq!(record["name"], "Grace");
    }

    #[test]
    fn test_unset_persists_field_removal() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(
                Schema::new("Profile")
                    .field("name", FieldDescriptor::string().required())
                    .field("bio", FieldDescriptor::string()),
            )
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let store = Store::new(registry.clone(), MemoryBackend::new());

        let mut profile = store.instance("Profile").unwrap();
        profile.set("name", "Ada").unwrap();
        profile.set("bio", "pioneer").unwrap();
        store.save(&mut profile).unwrap();

        profile.unset("bio").unwrap();
        let (set, unset) = profile.delta(&registry).unwrap();
        assert!(set.is_empty());
        assert_eq!(unset, vec!["bio".to_string()]);

        store.save(&mut profile).unwrap();
        let id = profile.id().and_then(Value::as_id).unwrap().clone();
        let record = store.backend().record("profile", &id).unwrap();
        assert!(!record.contains_key("bio"));
    }

    #[test]
    fn test_polymorphic_load_returns_concrete_subclasses() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::new("Animal").field("name", FieldDescriptor::string().required()))
            .unwrap();
        builder.register(Schema::new("Mammal").extends("Animal")).unwrap();
        builder
            .register(Schema::new("Human").extends("Animal.Mammal"))
            .unwrap();
        builder
            .register(Schema::new("Dog").extends("Animal.Mammal"))
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let store = Store::new(registry, MemoryBackend::new());

        for (schema, name) in [
            ("Animal.Mammal.Human", "Alice"),
            ("Animal.Mammal.Dog", "Rex"),
            ("Animal.Mammal", "Generic"),
        ] {
            let mut doc = store.instance(schema).unwrap();
            doc.set("name", name).unwrap();
            store.save(&mut doc).unwrap();
        }

        let animals = store.load_all("Animal").unwrap();
        let types: Vec<&str> = animals.iter().map(DocumentInstance::qualified_name).collect();
        // Store iteration order, each record as its concrete subclass.
        assert_eq!(
            types,
            vec!["Animal.Mammal.Human", "Animal.Mammal.Dog", "Animal.Mammal"]
        );
    }

    #[test]
    fn test_unique_with_conflict_surfaces_as_operation_error() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::embedded("Sub").field("year", FieldDescriptor::int()))
            .unwrap();
        builder
            .register(
                Schema::new("BlogPost")
                    .field("title", FieldDescriptor::string().unique_with(["sub.year"]))
                    .field("sub", FieldDescriptor::embedded("Sub")),
            )
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let backend = MemoryBackend::with_indexes(&registry);
        let store = Store::new(registry.clone(), backend);

        let save_post = |title: &str, year: i64| -> Result<()> {
            let mut sub = DocumentInstance::new(&registry, "Sub")?;
            sub.set("year", year)?;
            let mut post = store.instance("BlogPost")?;
            post.set("title", title)?;
            post.set("sub", sub)?;
            store.save(&mut post)
        };

        save_post("A", 2009).unwrap();
        let err = save_post("A", 2009);
        assert!(matches!(err, Err(DocMapError::Operation(_))));
        save_post("A", 2010).unwrap();
        assert_eq!(store.backend().count("blogpost"), 2);
    }

    #[test]
    fn test_cascade_deletes_dependents() {
        let store = blog_store();
        let author = saved_author(&store, "Ada");

        let mut post = store.instance("BlogPost").unwrap();
        post.set("title", "Hello").unwrap();
        post.set("author", author.clone()).unwrap();
        store.save(&mut post).unwrap();
        assert_eq!(store.backend().count("blogpost"), 1);

        store.delete(&author).unwrap();
        assert_eq!(store.backend().count("author"), 0);
        assert_eq!(store.backend().count("blogpost"), 0);
    }

    #[test]
    fn test_deny_aborts_whole_deletion() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::new("Author").field("name", FieldDescriptor::string().required()))
            .unwrap();
        builder
            .register(
                Schema::new("BlogPost")
                    .field("title", FieldDescriptor::string().required())
                    .field(
                        "author",
                        FieldDescriptor::reference("Author").on_delete(DeleteRule::Deny),
                    ),
            )
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let store = Store::new(registry, MemoryBackend::new());

        let referenced = saved_author(&store, "Ada");
        let unreferenced = saved_author(&store, "Grace");

        let mut post = store.instance("BlogPost").unwrap();
        post.set("title", "Hello").unwrap();
        post.set("author", referenced.clone()).unwrap();
        store.save(&mut post).unwrap();

        let err = store.delete(&referenced);
        assert!(matches!(err, Err(DocMapError::Operation(_))));
        // Nothing was touched, the document itself included.
        assert_eq!(store.backend().count("author"), 2);
        assert_eq!(store.backend().count("blogpost"), 1);

        // An author nobody references deletes fine.
        store.delete(&unreferenced).unwrap();
        assert_eq!(store.backend().count("author"), 1);
    }

    #[test]
    fn test_nullify_unsets_reference_on_dependents() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::new("Author").field("name", FieldDescriptor::string().required()))
            .unwrap();
        builder
            .register(
                Schema::new("BlogPost")
                    .field("title", FieldDescriptor::string().required())
                    .field(
                        "author",
                        FieldDescriptor::reference("Author").on_delete(DeleteRule::Nullify),
                    ),
            )
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let store = Store::new(registry, MemoryBackend::new());

        let author = saved_author(&store, "Ada");
        let mut post = store.instance("BlogPost").unwrap();
        post.set("title", "Hello").unwrap();
        post.set("author", author.clone()).unwrap();
        store.save(&mut post).unwrap();

        store.delete(&author).unwrap();
        assert_eq!(store.backend().count("author"), 0);
        assert_eq!(store.backend().count("blogpost"), 1);

        let post_id = post.id().and_then(Value::as_id).unwrap().clone();
        let record = store.backend().record("blogpost", &post_id).unwrap();
        assert!(!record.contains_key("author"));
    }

    #[test]
    fn test_cascade_is_transitive() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::new("Author").field("name", FieldDescriptor::string().required()))
            .unwrap();
        builder
            .register(
                Schema::new("BlogPost")
                    .field("title", FieldDescriptor::string().required())
                    .field(
                        "author",
                        FieldDescriptor::reference("Author").on_delete(DeleteRule::Cascade),
                    ),
            )
            .unwrap();
        builder
            .register(Schema::new("Comment").field(
                "post",
                FieldDescriptor::reference("BlogPost").on_delete(DeleteRule::Cascade),
            ))
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let store = Store::new(registry, MemoryBackend::new());

        let author = saved_author(&store, "Ada");
        let mut post = store.instance("BlogPost").unwrap();
        post.set("title", "Hello").unwrap();
        post.set("author", author.clone()).unwrap();
        store.save(&mut post).unwrap();
        let mut comment = store.instance("Comment").unwrap();
        comment.set("post", post).unwrap();
        store.save(&mut comment).unwrap();

        store.delete(&author).unwrap();
        assert_eq!(store.backend().count("author"), 0);
        assert_eq!(store.backend().count("blogpost"), 0);
        assert_eq!(store.backend().count("comment"), 0);
    }

    #[test]
    fn test_cyclic_cascade_terminates() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::new("Alpha").field(
                "peer",
                FieldDescriptor::reference("Beta").on_delete(DeleteRule::Cascade),
            ))
            .unwrap();
        builder
            .register(Schema::new("Beta").field(
                "peer",
                FieldDescriptor::reference("Alpha").on_delete(DeleteRule::Cascade),
            ))
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let store = Store::new(registry, MemoryBackend::new());

        let mut alpha = store.instance("Alpha").unwrap();
        store.save(&mut alpha).unwrap();
        let mut beta = store.instance("Beta").unwrap();
        beta.set("peer", alpha.clone()).unwrap();
        store.save(&mut beta).unwrap();
        alpha.set("peer", beta.clone()).unwrap();
        store.save(&mut alpha).unwrap();

        store.delete(&alpha).unwrap();
        assert_eq!(store.backend().count("alpha"), 0);
        assert_eq!(store.backend().count("beta"), 0);
    }

    #[test]
    fn test_reference_container_resolves_with_one_lookup() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::new("Author").field("name", FieldDescriptor::string().required()))
            .unwrap();
        builder
            .register(Schema::new("Anthology").field(
                "contributors",
                FieldDescriptor::list(FieldDescriptor::reference("Author")),
            ))
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let store = Store::new(registry, MemoryBackend::new());

        let names = ["A", "B", "C", "D", "E"];
        let mut references = Vec::new();
        for name in names {
            let author = saved_author(&store, name);
            references.push(Value::Ref(Reference::generic(
                "author",
                author.id().and_then(Value::as_id).unwrap().clone(),
                "Author",
            )));
        }

        let mut anthology = store.instance("Anthology").unwrap();
        anthology.set("contributors", references).unwrap();
        store.save(&mut anthology).unwrap();

        let id = anthology.id().and_then(Value::as_id).unwrap().clone();
        let mut loaded = store.get("Anthology", &id).unwrap().unwrap();

        let calls_before = store.backend().find_by_ids_calls();
        store.resolve(&mut loaded, "contributors").unwrap();
        assert_eq!(store.backend().find_by_ids_calls(), calls_before + 1);

        let contributors = loaded.get("contributors").unwrap().as_list().unwrap();
        let resolved: Vec<&str> = contributors
            .iter()
            .map(|v| v.as_document().unwrap().get("name").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(resolved, names);

        // Cached: a second access issues no further lookups.
        store.resolve(&mut loaded, "contributors").unwrap();
        assert_eq!(store.backend().find_by_ids_calls(), calls_before + 1);
    }

    #[test]
    fn test_unresolvable_references_are_dropped() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::new("Author").field("name", FieldDescriptor::string().required()))
            .unwrap();
        builder
            .register(Schema::new("Anthology").field(
                "contributors",
                FieldDescriptor::list(FieldDescriptor::reference("Author")),
            ))
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let store = Store::new(registry, MemoryBackend::new());

        let author = saved_author(&store, "Ada");
        let mut anthology = store.instance("Anthology").unwrap();
        anthology
            .set(
                "contributors",
                vec![
                    Value::Ref(Reference::direct(
                        "author",
                        author.id().and_then(Value::as_id).unwrap().clone(),
                    )),
                    Value::Ref(Reference::direct("author", Id::new())),
                ],
            )
            .unwrap();

        store.resolve(&mut anthology, "contributors").unwrap();
        let contributors = anthology.get("contributors").unwrap().as_list().unwrap();
        assert_eq!(contributors.len(), 1);
        assert_eq!(
            contributors[0].as_document().unwrap().get("name"),
            Some(&Value::from("Ada"))
        );
    }

    #[test]
    fn test_reload_discards_mutations_and_caches() {
        let store = blog_store();
        let mut author = saved_author(&store, "Ada");
        author.set("name", "Grace").unwrap();

        store.reload(&mut author).unwrap();
        assert_eq!(author.get("name"), Some(&Value::from("Ada")));
        assert!(!author.is_dirty());
    }

    #[test]
    fn test_reload_of_deleted_document_fails() {
        let store = blog_store();
        let mut author = saved_author(&store, "Ada");
        store.delete(&author).unwrap();
        assert!(matches!(
            store.reload(&mut author),
            Err(DocMapError::Operation(_))
        ));
    }

    #[test]
    fn test_delete_rule_inherited_by_subclass_documents() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::new("Author").field("name", FieldDescriptor::string().required()))
            .unwrap();
        builder
            .register(Schema::new("Editor").extends("Author"))
            .unwrap();
        builder
            .register(
                Schema::new("BlogPost")
                    .field("title", FieldDescriptor::string().required())
                    .field(
                        "author",
                        FieldDescriptor::reference("Author").on_delete(DeleteRule::Cascade),
                    ),
            )
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let store = Store::new(registry, MemoryBackend::new());

        let mut editor = store.instance("Author.Editor").unwrap();
        editor.set("name", "Ada").unwrap();
        store.save(&mut editor).unwrap();

        let mut post = store.instance("BlogPost").unwrap();
        post.set("title", "Hello").unwrap();
        post.set("author", editor.clone()).unwrap();
        store.save(&mut post).unwrap();

        // The rule was registered against Author; deleting an Editor stored
        // in the same collection still cascades.
        store.delete(&editor).unwrap();
        assert_eq!(store.backend().count("blogpost"), 0);
    }

    #[test]
    fn test_generic_reference_resolution() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(Schema::new("Animal").field("name", FieldDescriptor::string().required()))
            .unwrap();
        builder
            .register(Schema::new("Dog").extends("Animal"))
            .unwrap();
        builder
            .register(Schema::new("Bookmark").field("favorite", FieldDescriptor::generic_reference()))
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());
        let store = Store::new(registry, MemoryBackend::new());

        let mut dog = store.instance("Animal.Dog").unwrap();
        dog.set("name", "Rex").unwrap();
        store.save(&mut dog).unwrap();

        let mut bookmark = store.instance("Bookmark").unwrap();
        bookmark.set("favorite", dog.clone()).unwrap();
        store.save(&mut bookmark).unwrap();

        let id = bookmark.id().and_then(Value::as_id).unwrap().clone();
        let mut loaded = store.get("Bookmark", &id).unwrap().unwrap();
        // Stored as a generic reference carrying the discriminator.
        assert_eq!(
            loaded
                .get("favorite")
                .and_then(Value::as_reference)
                .and_then(Reference::discriminator),
            Some("Animal.Dog")
        );

        store.resolve(&mut loaded, "favorite").unwrap();
        let favorite = loaded.get("favorite").unwrap().as_document().unwrap();
        assert_eq!(favorite.qualified_name(), "Animal.Dog");
        assert_eq!(favorite.get("name"), Some(&Value::from("Rex")));
    }
}

