// Field descriptors: the typed leaf unit of a schema. Coercion between the
// raw storage shape and in-memory values, per-value validation, defaults.

use crate::codec;
use crate::error::{DocMapError, Result};
use crate::schema::{DeleteRule, SchemaRegistry};
use crate::value::{Id, Reference, Value};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::Arc;

type Producer = Arc<dyn Fn() -> Value + Send + Sync>;
type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A field default: a fixed value or a zero-argument producer evaluated at
/// instance construction.
#[derive(Clone)]
pub enum DefaultValue {
    Fixed(Value),
    Producer(Producer),
}

impl DefaultValue {
    pub fn materialize(&self) -> Value {
        match self {
            DefaultValue::Fixed(v) => v.clone(),
            DefaultValue::Producer(f) => f(),
        }
    }
}

impl std::fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefaultValue::Fixed(v) => write!(f, "Fixed({v:?})"),
            DefaultValue::Producer(_) => write!(f, "Producer(..)"),
        }
    }
}

/// The shape of a field's values.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// A store-native identifier.
    Id,
    String,
    Int,
    Float,
    Bool,
    DateTime,
    /// Ordered sequence of an inner field type.
    List(Box<FieldDescriptor>),
    /// Keyed container of an inner field type; key order is preserved.
    Map(Box<FieldDescriptor>),
    /// An inline sub-document of the named embedded schema.
    Embedded(String),
    /// A reference to a document of the named schema (or a subclass of it).
    Reference { target: String, on_delete: DeleteRule },
    /// A reference whose target schema is not statically known; always
    /// stored with a discriminator.
    GenericReference { on_delete: DeleteRule },
}

/// Declares a single field of a schema: its value shape, storage key,
/// requiredness, uniqueness constraints, default, and validation.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
    pub(crate) name: String,
    pub(crate) storage_key: Option<String>,
    pub required: bool,
    pub unique: bool,
    pub unique_with: Vec<String>,
    /// `unique_with` entries resolved to real storage paths at registry build.
    pub(crate) resolved_unique_with: Vec<String>,
    pub primary_key: bool,
    pub choices: Option<Vec<Value>>,
    pub(crate) default: Option<DefaultValue>,
    pub(crate) validator: Option<Validator>,
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("storage_key", &self.storage_key)
            .field("required", &self.required)
            .field("unique", &self.unique)
            .field("unique_with", &self.unique_with)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}

impl FieldDescriptor {
    pub fn new(kind: FieldKind) -> Self {
        FieldDescriptor {
            kind,
            name: String::new(),
            storage_key: None,
            required: false,
            unique: false,
            unique_with: Vec::new(),
            resolved_unique_with: Vec::new(),
            primary_key: false,
            choices: None,
            default: None,
            validator: None,
        }
    }

    pub fn id() -> Self {
        FieldDescriptor::new(FieldKind::Id)
    }

    pub fn string() -> Self {
        FieldDescriptor::new(FieldKind::String)
    }

    pub fn int() -> Self {
        FieldDescriptor::new(FieldKind::Int)
    }

    pub fn float() -> Self {
        FieldDescriptor::new(FieldKind::Float)
    }

    pub fn boolean() -> Self {
        FieldDescriptor::new(FieldKind::Bool)
    }

    pub fn datetime() -> Self {
        FieldDescriptor::new(FieldKind::DateTime)
    }

    pub fn list(inner: FieldDescriptor) -> Self {
        FieldDescriptor::new(FieldKind::List(Box::new(inner)))
    }

    pub fn map(inner: FieldDescriptor) -> Self {
        FieldDescriptor::new(FieldKind::Map(Box::new(inner)))
    }

    pub fn embedded(schema: &str) -> Self {
        FieldDescriptor::new(FieldKind::Embedded(schema.to_string()))
    }

    pub fn reference(target: &str) -> Self {
        FieldDescriptor::new(FieldKind::Reference {
            target: target.to_string(),
            on_delete: DeleteRule::DoNothing,
        })
    }

    pub fn generic_reference() -> Self {
        FieldDescriptor::new(FieldKind::GenericReference {
            on_delete: DeleteRule::DoNothing,
        })
    }

    // ── Builder options ────────────────────────────────────────────

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Compound uniqueness: this field is unique together with the given
    /// dotted field paths. Implies `unique`.
    pub fn unique_with<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_with = paths.into_iter().map(Into::into).collect();
        self.unique = true;
        self
    }

    /// Mark this field as the primary key. A primary key is always stored
    /// under `_id` and must be set before saving, so it is also required.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.required = true;
        self
    }

    /// Override the storage key. Ignored for primary keys, which always map
    /// to `_id`.
    pub fn stored_as(mut self, key: &str) -> Self {
        self.storage_key = Some(key.to_string());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Fixed(value.into()));
        self
    }

    pub fn default_with(mut self, producer: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    pub fn choices<I, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate_with(mut self, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(predicate));
        self
    }

    /// Set the delete rule for a reference field. No effect on other kinds.
    pub fn on_delete(mut self, rule: DeleteRule) -> Self {
        match &mut self.kind {
            FieldKind::Reference { on_delete, .. } | FieldKind::GenericReference { on_delete } => {
                *on_delete = rule;
            }
            _ => {}
        }
        self
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The key this field is stored under. Primary keys always map to `_id`;
    /// otherwise the explicit override or the field name.
    pub fn storage_key(&self) -> &str {
        if self.primary_key {
            "_id"
        } else {
            self.storage_key.as_deref().unwrap_or(&self.name)
        }
    }

    pub fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn resolved_unique_with(&self) -> &[String] {
        &self.resolved_unique_with
    }

    pub fn delete_rule(&self) -> Option<DeleteRule> {
        match &self.kind {
            FieldKind::Reference { on_delete, .. } | FieldKind::GenericReference { on_delete } => {
                Some(*on_delete)
            }
            _ => None,
        }
    }

    /// The statically-known reference target, looking through containers.
    pub(crate) fn reference_target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Reference { target, .. } => Some(target),
            FieldKind::List(inner) | FieldKind::Map(inner) => inner.reference_target(),
            _ => None,
        }
    }

    pub(crate) fn bind(&mut self, name: &str) {
        self.name = name.to_string();
    }

    // ── Coercion ───────────────────────────────────────────────────

    /// Raw storage value → in-memory value.
    pub fn coerce_in(&self, raw: &serde_json::Value, registry: &SchemaRegistry) -> Result<Value> {
        match &self.kind {
            FieldKind::Id => {
                let s = raw.as_str().ok_or_else(|| self.type_error(raw))?;
                Ok(Value::Id(Id::parse(s)?))
            }
            FieldKind::String => raw
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| self.type_error(raw)),
            FieldKind::Int => raw
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| self.type_error(raw)),
            FieldKind::Float => raw
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| self.type_error(raw)),
            FieldKind::Bool => raw
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| self.type_error(raw)),
            FieldKind::DateTime => {
                let s = raw.as_str().ok_or_else(|| self.type_error(raw))?;
                let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
                    DocMapError::Validation(format!(
                        "Field '{}' has an unparseable datetime '{s}': {e}",
                        self.name
                    ))
                })?;
                Ok(Value::DateTime(dt.with_timezone(&Utc)))
            }
            FieldKind::List(inner) => {
                let items = raw.as_array().ok_or_else(|| self.type_error(raw))?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(inner.coerce_in(item, registry)?);
                }
                Ok(Value::List(out))
            }
            FieldKind::Map(inner) => {
                let obj = raw.as_object().ok_or_else(|| self.type_error(raw))?;
                let mut out = IndexMap::with_capacity(obj.len());
                for (key, item) in obj {
                    out.insert(key.clone(), inner.coerce_in(item, registry)?);
                }
                Ok(Value::Map(out))
            }
            FieldKind::Embedded(schema_name) => {
                let obj = raw.as_object().ok_or_else(|| self.type_error(raw))?;
                let schema = registry.get(schema_name)?;
                codec::decode(obj, &schema, registry)?.map(Value::Document).ok_or_else(|| {
                    DocMapError::Validation(format!(
                        "Field '{}' holds an embedded record of an unknown subclass of '{schema_name}'",
                        self.name
                    ))
                })
            }
            FieldKind::Reference { .. } | FieldKind::GenericReference { .. } => {
                if let Some(reference) = Reference::from_raw(raw) {
                    return Ok(Value::Ref(reference));
                }
                // A container entry may also be an inlined sub-record
                // carrying its own discriminator.
                if let Some(obj) = raw.as_object() {
                    if let Some(discriminator) = obj.get("_cls").and_then(|v| v.as_str()) {
                        let schema = registry.get(discriminator)?;
                        if let Some(doc) = codec::decode(obj, &schema, registry)? {
                            return Ok(Value::Document(doc));
                        }
                    }
                }
                Err(self.type_error(raw))
            }
        }
    }

    /// In-memory value → raw storage value.
    pub fn coerce_out(&self, value: &Value, registry: &SchemaRegistry) -> Result<serde_json::Value> {
        match (&self.kind, value) {
            (FieldKind::Id, Value::Id(id)) => Ok(serde_json::Value::String(id.to_string())),
            (FieldKind::String, Value::String(s)) => Ok(serde_json::Value::String(s.clone())),
            (FieldKind::Int, Value::Int(i)) => Ok(serde_json::json!(i)),
            (FieldKind::Float, Value::Float(f)) => Ok(serde_json::json!(f)),
            (FieldKind::Float, Value::Int(i)) => Ok(serde_json::json!(*i as f64)),
            (FieldKind::Bool, Value::Bool(b)) => Ok(serde_json::Value::Bool(*b)),
            (FieldKind::DateTime, Value::DateTime(dt)) => {
                Ok(serde_json::Value::String(dt.to_rfc3339()))
            }
            (FieldKind::List(inner), Value::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(inner.coerce_out(item, registry)?);
                }
                Ok(serde_json::Value::Array(out))
            }
            (FieldKind::Map(inner), Value::Map(m)) => {
                let mut out = serde_json::Map::with_capacity(m.len());
                for (key, item) in m {
                    out.insert(key.clone(), inner.coerce_out(item, registry)?);
                }
                Ok(serde_json::Value::Object(out))
            }
            (FieldKind::Embedded(_), Value::Document(doc)) => {
                Ok(serde_json::Value::Object(codec::encode(doc, registry)?))
            }
            (FieldKind::Reference { .. } | FieldKind::GenericReference { .. }, Value::Ref(r)) => {
                Ok(r.to_raw())
            }
            (FieldKind::Reference { .. }, Value::Document(doc)) => {
                Ok(codec::reference_to(doc, false)?.to_raw())
            }
            (FieldKind::GenericReference { .. }, Value::Document(doc)) => {
                Ok(codec::reference_to(doc, true)?.to_raw())
            }
            (_, value) => Err(self.type_error_value(value)),
        }
    }

    // ── Validation ─────────────────────────────────────────────────

    /// Validate a present value. Required-but-absent is the document's
    /// concern, not the field's.
    pub fn validate(&self, value: &Value, registry: &SchemaRegistry) -> Result<()> {
        if let Some(choices) = &self.choices {
            if !choices.contains(value) {
                return Err(DocMapError::Validation(format!(
                    "Field '{}' value is not one of the allowed choices",
                    self.name
                )));
            }
        }
        if let Some(validator) = &self.validator {
            if !validator(value) {
                return Err(DocMapError::Validation(format!(
                    "Field '{}' value does not match its custom validation",
                    self.name
                )));
            }
        }

        match (&self.kind, value) {
            (FieldKind::Id, Value::Id(_)) => Ok(()),
            (FieldKind::Id, Value::String(s)) => Id::parse(s).map(|_| ()),
            (FieldKind::String, Value::String(_))
            | (FieldKind::Int, Value::Int(_))
            | (FieldKind::Float, Value::Float(_) | Value::Int(_))
            | (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::DateTime, Value::DateTime(_)) => Ok(()),
            (FieldKind::List(inner), Value::List(items)) => {
                for item in items {
                    inner.validate(item, registry)?;
                }
                Ok(())
            }
            (FieldKind::Map(inner), Value::Map(m)) => {
                for item in m.values() {
                    inner.validate(item, registry)?;
                }
                Ok(())
            }
            (FieldKind::Embedded(_), Value::Document(doc)) => doc.validate(registry),
            (
                FieldKind::Reference { .. } | FieldKind::GenericReference { .. },
                Value::Ref(_) | Value::Document(_),
            ) => Ok(()),
            (_, value) => Err(self.type_error_value(value)),
        }
    }

    fn type_error(&self, raw: &serde_json::Value) -> DocMapError {
        DocMapError::Validation(format!(
            "Field '{}' cannot hold raw value of type {}",
            self.name,
            json_type_name(raw)
        ))
    }

    fn type_error_value(&self, value: &Value) -> DocMapError {
        DocMapError::Validation(format!(
            "Field '{}' expected a {:?}-shaped value, got {}",
            self.name,
            self.kind,
            value.kind_name()
        ))
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
