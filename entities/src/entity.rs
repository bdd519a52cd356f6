use crate::{EntitiesError, Result};
use fields::{mask_for_names, system_mask, Field, FieldMask, FieldsError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<Field>,
    /// Always-visible field positions, derived from `fields`.
    #[serde(skip)]
    system_fields: FieldMask,
}

impl EntityDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, fields: Vec<Field>) -> Self {
        let system_fields = system_mask(&fields);
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            fields,
            system_fields,
        }
    }

    /// Position of a field within this entity
    pub fn field_index(&self, field_id: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.id == field_id)
    }

    /// Get a field by id
    pub fn field(&self, field_id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == field_id)
    }

    /// Check whether the field at `index` is always visible
    pub fn is_system_field(&self, index: usize) -> bool {
        self.system_fields.contains(index)
    }

    /// Build a field mask from field names
    pub fn field_mask<S: AsRef<str>>(&self, names: &[S]) -> Result<FieldMask> {
        mask_for_names(&self.fields, names).map_err(|e| match e {
            FieldsError::NotFound(field) => EntitiesError::FieldNotFound {
                entity: self.id.clone(),
                field,
            },
            other => EntitiesError::Validation(other.to_string()),
        })
    }

    /// Validate the definition and refresh derived data
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(EntitiesError::Validation(
                "Entity ID cannot be empty".to_string(),
            ));
        }

        if self.name.is_empty() {
            return Err(EntitiesError::Validation(format!(
                "Entity '{}' name cannot be empty",
                self.id
            )));
        }

        for (i, field) in self.fields.iter().enumerate() {
            field
                .validate()
                .map_err(|e| EntitiesError::Validation(e.to_string()))?;
            if self.fields[..i].iter().any(|f| f.id == field.id) {
                return Err(EntitiesError::Validation(format!(
                    "Entity '{}' declares field '{}' more than once",
                    self.id, field.id
                )));
            }
        }

        Ok(())
    }

    /// Recompute derived data after deserialization
    pub(crate) fn finish(mut self) -> Self {
        self.system_fields = system_mask(&self.fields);
        self
    }
}

/// The registry of entity types known to the application.
#[derive(Debug, Clone, Default)]
pub struct EntityModel {
    entities: BTreeMap<String, EntityDefinition>,
}

impl EntityModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from a list of definitions
    pub fn from_definitions(definitions: Vec<EntityDefinition>) -> Result<Self> {
        let mut model = Self::new();
        for definition in definitions {
            model.add(definition)?;
        }
        Ok(model)
    }

    /// Register an entity definition
    pub fn add(&mut self, definition: EntityDefinition) -> Result<()> {
        definition.validate()?;
        if self.entities.contains_key(&definition.id) {
            return Err(EntitiesError::DuplicateEntity(definition.id));
        }
        let definition = definition.finish();
        self.entities.insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Look up an entity type by id
    pub fn get(&self, entity_type: &str) -> Option<&EntityDefinition> {
        self.entities.get(entity_type)
    }

    /// Look up an entity type, failing if the model does not contain it
    pub fn require(&self, entity_type: &str) -> Result<&EntityDefinition> {
        self.get(entity_type)
            .ok_or_else(|| EntitiesError::EntityNotFound(entity_type.to_string()))
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.entities.contains_key(entity_type)
    }

    /// Build a field mask for an entity type from field names
    pub fn field_mask<S: AsRef<str>>(&self, entity_type: &str, names: &[S]) -> Result<FieldMask> {
        self.require(entity_type)?.field_mask(names)
    }

    /// Entity type ids, sorted
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
