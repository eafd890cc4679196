// Schema declarations and their frozen, inheritance-resolved definitions.

pub mod registry;

pub use registry::{DeleteRuleEntry, RegistryBuilder, SchemaRegistry};

use crate::field::FieldDescriptor;
use crate::index::{DeclaredIndex, IndexSpec};
use indexmap::IndexMap;

/// Referential-integrity policy applied to documents holding a reference to
/// a document being deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteRule {
    /// Leave referencing documents untouched.
    #[default]
    DoNothing,
    /// Unset the reference field on referencing documents.
    Nullify,
    /// Delete referencing documents, transitively.
    Cascade,
    /// Refuse the deletion while referencing documents exist.
    Deny,
}

/// A schema as declared by the user: one class in a document hierarchy.
///
/// Declarations are handed to a [`RegistryBuilder`], which merges inherited
/// fields and freezes the result into a [`SchemaDefinition`].
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) name: String,
    pub(crate) extends: Option<String>,
    pub(crate) is_abstract: bool,
    pub(crate) is_embedded: bool,
    pub(crate) allow_polymorphism: Option<bool>,
    pub(crate) collection: Option<String>,
    pub(crate) fields: IndexMap<String, FieldDescriptor>,
    pub(crate) indexes: Vec<DeclaredIndex>,
}

impl Schema {
    /// Declare a top-level schema: its documents live in a storage collection.
    pub fn new(name: &str) -> Self {
        Schema {
            name: name.to_string(),
            extends: None,
            is_abstract: false,
            is_embedded: false,
            allow_polymorphism: None,
            collection: None,
            fields: IndexMap::new(),
            indexes: Vec::new(),
        }
    }

    /// Declare an embedded schema: inlined into owning documents, no
    /// collection or identifier of its own.
    pub fn embedded(name: &str) -> Self {
        let mut schema = Schema::new(name);
        schema.is_embedded = true;
        schema
    }

    /// Inherit from the named (qualified) schema.
    pub fn extends(mut self, parent: &str) -> Self {
        self.extends = Some(parent.to_string());
        self
    }

    /// Mark the schema abstract: never assigned a storage collection, only
    /// useful as a base for concrete subclasses.
    pub fn abstract_schema(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Store records without discriminator metadata and forbid subclassing.
    pub fn disallow_polymorphism(mut self) -> Self {
        self.allow_polymorphism = Some(false);
        self
    }

    /// Explicitly name the storage collection. Only valid on a schema with
    /// no concrete ancestor; subclasses share their superclass's collection.
    pub fn collection(mut self, name: &str) -> Self {
        self.collection = Some(name.to_string());
        self
    }

    pub fn field(mut self, name: &str, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name.to_string(), descriptor);
        self
    }

    /// Declare an index beyond the unique-derived set.
    pub fn index(mut self, spec: DeclaredIndex) -> Self {
        self.indexes.push(spec);
        self
    }
}

/// A frozen schema: inherited fields merged, qualified name computed,
/// collection resolved, uniqueness indexes derived.
#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    /// Dot-joined ancestor chain; doubles as the polymorphic discriminator.
    pub qualified_name: String,
    /// The leaf class name.
    pub name: String,
    pub is_abstract: bool,
    pub is_embedded: bool,
    pub allow_polymorphism: bool,
    /// `None` for abstract and embedded schemas.
    pub storage_collection: Option<String>,
    /// Ancestor qualified names, root first.
    pub superclasses: Vec<String>,
    /// All fields, inherited merged with own; insertion order is ancestors
    /// first, then this schema's declarations.
    pub fields: IndexMap<String, FieldDescriptor>,
    pub primary_key_field: Option<String>,
    pub declared_indexes: Vec<DeclaredIndex>,
    /// Derived at registry build time (see the index planner).
    pub indexes: Vec<IndexSpec>,
    /// Names of the fields this schema declared itself (not inherited).
    pub(crate) declared_fields: Vec<String>,
}

impl SchemaDefinition {
    /// Every ancestor qualified name followed by this schema's own, root to
    /// leaf: the `_types` ancestor list written on polymorphic records.
    pub fn type_chain(&self) -> Vec<String> {
        let mut chain = self.superclasses.clone();
        chain.push(self.qualified_name.clone());
        chain
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    /// The descriptor of the primary key field, if the schema has one
    /// (embedded schemas do not).
    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.primary_key_field
            .as_deref()
            .and_then(|name| self.fields.get(name))
    }
}
