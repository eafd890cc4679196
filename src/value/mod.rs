// In-memory values and reference placeholders.

use crate::document::DocumentInstance;
use crate::error::{DocMapError, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ulid::Ulid;

/// A raw storage record: what the store collaborator hands us and what we
/// hand back. Key order is preserved so deltas compare deterministically.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A store-native document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(Ulid);

impl Id {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Id(Ulid::new())
    }

    /// Parse an identifier from its string form. Fails with a
    /// `ValidationError` when the string is not a valid identifier.
    pub fn parse(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Id)
            .map_err(|_| DocMapError::Validation(format!("Invalid identifier: '{s}'")))
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Id {
    type Err = DocMapError;

    fn from_str(s: &str) -> Result<Self> {
        Id::parse(s)
    }
}

/// A stored pointer at another document.
///
/// A direct reference carries only the target collection and identifier; a
/// generic reference additionally carries the target's discriminator, for
/// targets whose concrete schema cannot be known statically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Direct {
        collection: String,
        id: Id,
    },
    Generic {
        collection: String,
        id: Id,
        discriminator: String,
    },
}

impl Reference {
    pub fn direct(collection: impl Into<String>, id: Id) -> Self {
        Reference::Direct {
            collection: collection.into(),
            id,
        }
    }

    pub fn generic(collection: impl Into<String>, id: Id, discriminator: impl Into<String>) -> Self {
        Reference::Generic {
            collection: collection.into(),
            id,
            discriminator: discriminator.into(),
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Reference::Direct { collection, .. } | Reference::Generic { collection, .. } => {
                collection
            }
        }
    }

    pub fn id(&self) -> &Id {
        match self {
            Reference::Direct { id, .. } | Reference::Generic { id, .. } => id,
        }
    }

    pub fn discriminator(&self) -> Option<&str> {
        match self {
            Reference::Direct { .. } => None,
            Reference::Generic { discriminator, .. } => Some(discriminator),
        }
    }

    /// The wire shape: `{"$ref": <collection>, "$id": <id>}` for a direct
    /// reference, `{"_cls": <discriminator>, "_ref": {...}}` for a generic one.
    pub fn to_raw(&self) -> serde_json::Value {
        match self {
            Reference::Direct { collection, id } => serde_json::json!({
                "$ref": collection,
                "$id": id.to_string(),
            }),
            Reference::Generic {
                collection,
                id,
                discriminator,
            } => serde_json::json!({
                "_cls": discriminator,
                "_ref": { "$ref": collection, "$id": id.to_string() },
            }),
        }
    }

    /// Parse either wire shape. Returns `None` when the value is not a
    /// reference (e.g. an inlined embedded sub-record).
    pub fn from_raw(raw: &serde_json::Value) -> Option<Reference> {
        let obj = raw.as_object()?;
        if let (Some(collection), Some(id)) = (
            obj.get("$ref").and_then(|v| v.as_str()),
            obj.get("$id").and_then(|v| v.as_str()),
        ) {
            return Some(Reference::Direct {
                collection: collection.to_string(),
                id: Id::parse(id).ok()?,
            });
        }
        if let (Some(discriminator), Some(inner)) = (
            obj.get("_cls").and_then(|v| v.as_str()),
            obj.get("_ref").and_then(|v| v.as_object()),
        ) {
            let collection = inner.get("$ref").and_then(|v| v.as_str())?;
            let id = inner.get("$id").and_then(|v| v.as_str())?;
            return Some(Reference::Generic {
                collection: collection.to_string(),
                id: Id::parse(id).ok()?,
                discriminator: discriminator.to_string(),
            });
        }
        None
    }
}

/// An in-memory field value.
///
/// Absence is expressed by a field not being present in the instance at all;
/// there is no null variant. Containers preserve insertion order end to end.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Id(Id),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// An embedded document, or a reference that has been resolved in place.
    Document(DocumentInstance),
    /// An unresolved reference placeholder.
    Ref(Reference),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<&Id> {
        match self {
            Value::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&DocumentInstance> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Short tag for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::DateTime(_) => "datetime",
            Value::Id(_) => "id",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Document(_) => "document",
            Value::Ref(_) => "reference",
        }
    }
}

// Equality treats an unresolved reference and the document it points at as
// the same value, so round trips compare field-for-field regardless of
// resolver cache state.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Id(a), Value::Id(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.collection() == b.collection() && a.id() == b.id(),
            (Value::Ref(r), Value::Document(d)) | (Value::Document(d), Value::Ref(r)) => {
                d.schema().storage_collection.as_deref() == Some(r.collection())
                    && d.id().and_then(Value::as_id) == Some(r.id())
            }
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Value::Id(id)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Ref(r)
    }
}

impl From<DocumentInstance> for Value {
    fn from(d: DocumentInstance) -> Self {
        Value::Document(d)
    }
}
