pub mod entity;
pub mod error;
pub mod record;
pub mod schema_loader;

pub use entity::{EntityDefinition, EntityModel};
pub use error::{EntitiesError, Result};
pub use record::{GenericRecord, Record};
pub use schema_loader::SchemaLoader;

// Re-export field types from the fields crate
pub use fields::{Field, FieldMask, FieldType};
