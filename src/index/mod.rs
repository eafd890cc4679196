// Index derivation: uniqueness constraints (including those living inside
// embedded sub-schemas) and declared index specs, normalized into one
// compound shape. Duplicate collapsing is the store's concern, not ours.

use crate::field::FieldKind;
use crate::schema::SchemaDefinition;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascending,
    Descending,
}

/// A compound index over dotted storage paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<(String, Direction)>,
    pub unique: bool,
    pub sparse: bool,
}

impl Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .keys
            .iter()
            .map(|(path, direction)| match direction {
                Direction::Ascending => path.clone(),
                Direction::Descending => format!("-{path}"),
            })
            .collect();
        if self.unique {
            write!(f, "UNIQUE ({})", keys.join(", "))
        } else {
            write!(f, "({})", keys.join(", "))
        }
    }
}

/// An index declared in schema metadata, in any of the accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredIndex {
    /// Plain field names, with an optional `+`/`-` direction prefix.
    Fields(Vec<String>),
    /// Explicit `(path, direction)` pairs.
    Keys(Vec<(String, Direction)>),
    /// Fully-specified record with uniqueness options.
    Options {
        keys: Vec<(String, Direction)>,
        unique: bool,
        sparse: bool,
    },
}

/// Derive the full index set for a schema: unique-constraint indexes first
/// (recursing into embedded sub-schemas, namespaced by field name), then the
/// declared specs normalized into the same shape. Duplicates are kept.
pub fn plan(
    schema: &SchemaDefinition,
    schemas: &IndexMap<String, SchemaDefinition>,
) -> Vec<IndexSpec> {
    let mut specs = unique_indexes(schema, "", schemas);
    specs.extend(schema.declared_indexes.iter().map(normalize));
    specs
}

fn unique_indexes(
    schema: &SchemaDefinition,
    namespace: &str,
    schemas: &IndexMap<String, SchemaDefinition>,
) -> Vec<IndexSpec> {
    let mut specs = Vec::new();
    for (name, descriptor) in &schema.fields {
        if descriptor.unique {
            let mut keys = vec![(
                format!("{namespace}{}", descriptor.storage_key()),
                Direction::Ascending,
            )];
            for path in descriptor.resolved_unique_with() {
                keys.push((format!("{namespace}{path}"), Direction::Ascending));
            }
            specs.push(IndexSpec {
                keys,
                unique: true,
                sparse: false,
            });
        }

        // A unique field inside an embedded sub-schema indexes the owning
        // collection under a dotted path; embedded documents have no
        // collection of their own.
        if let FieldKind::Embedded(target) = &descriptor.kind {
            if let Some(embedded) = schemas.get(target) {
                specs.extend(unique_indexes(
                    embedded,
                    &format!("{namespace}{name}."),
                    schemas,
                ));
            }
        }
    }
    specs
}

/// Normalize any declared shape into a compound [`IndexSpec`].
pub fn normalize(declared: &DeclaredIndex) -> IndexSpec {
    match declared {
        DeclaredIndex::Fields(names) => IndexSpec {
            keys: names.iter().map(|name| parse_signed(name)).collect(),
            unique: false,
            sparse: false,
        },
        DeclaredIndex::Keys(keys) => IndexSpec {
            keys: keys.clone(),
            unique: false,
            sparse: false,
        },
        DeclaredIndex::Options {
            keys,
            unique,
            sparse,
        } => IndexSpec {
            keys: keys.clone(),
            unique: *unique,
            sparse: *sparse,
        },
    }
}

fn parse_signed(name: &str) -> (String, Direction) {
    if let Some(rest) = name.strip_prefix('-') {
        (rest.to_string(), Direction::Descending)
    } else if let Some(rest) = name.strip_prefix('+') {
        (rest.to_string(), Direction::Ascending)
    } else {
        (name.to_string(), Direction::Ascending)
    }
}
