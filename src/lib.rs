pub mod codec;
pub mod document;
pub mod error;
pub mod field;
pub mod index;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod value;

pub use document::DocumentInstance;
pub use error::{DocMapError, Result};
pub use field::{FieldDescriptor, FieldKind};
pub use index::{DeclaredIndex, Direction, IndexSpec};
pub use schema::{DeleteRule, RegistryBuilder, Schema, SchemaDefinition, SchemaRegistry};
pub use store::{Backend, MemoryBackend, PersistOutcome, Store};
pub use value::{Id, RawRecord, Reference, Value};
