use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// A single record of some entity type, as seen by code that inspects field
/// values without knowing the concrete record type.
pub trait Record: Send + Sync {
    /// The entity type id this record belongs to
    fn entity_type(&self) -> &str;

    /// Current value of a field, if set
    fn get(&self, field: &str) -> Option<&JsonValue>;

    /// Primary key of the record, if it has one
    fn id(&self) -> Option<&JsonValue> {
        self.get("id")
    }
}

/// A record backed by a JSON object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericRecord {
    pub entity_type: String,
    #[serde(default)]
    pub values: Map<String, JsonValue>,
}

impl GenericRecord {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            values: Map::new(),
        }
    }

    /// Set a field value
    pub fn with(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<JsonValue>) {
        self.values.insert(field.into(), value.into());
    }
}

impl Record for GenericRecord {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn get(&self, field: &str) -> Option<&JsonValue> {
        self.values.get(field)
    }
}
