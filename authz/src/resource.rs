//! Entity resources: an entity type, optionally narrowed to some of its fields.

use crate::error::{AuthzError, Result};
use entities::{EntitiesError, EntityModel, FieldMask};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::debug;

/// One entity type, optionally restricted to a subset of its fields.
#[derive(Debug)]
pub struct EntityResource {
    entity_type: String,
    field_names: Option<Vec<String>>,
    mask: OnceCell<Option<FieldMask>>,
}

impl EntityResource {
    /// All fields of an entity type
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            field_names: None,
            mask: OnceCell::new(),
        }
    }

    /// A subset of an entity type's fields
    pub fn with_fields<S: Into<String>>(
        entity_type: impl Into<String>,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            field_names: Some(fields.into_iter().map(Into::into).collect()),
            mask: OnceCell::new(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn field_names(&self) -> Option<&[String]> {
        self.field_names.as_deref()
    }

    /// Resolve the field mask against the model. Runs once; later calls are no-ops.
    pub fn init(&self, model: &EntityModel) -> Result<()> {
        self.mask
            .get_or_try_init(|| -> Result<Option<FieldMask>> {
                let definition = model
                    .get(&self.entity_type)
                    .ok_or_else(|| AuthzError::UnknownEntityType(self.entity_type.clone()))?;
                let Some(names) = &self.field_names else {
                    return Ok(None);
                };
                let mask = definition.field_mask(names).map_err(|e| match e {
                    EntitiesError::FieldNotFound { entity, field } => {
                        AuthzError::UnknownField { entity, field }
                    }
                    other => AuthzError::Entities(other),
                })?;
                debug!(entity = %self.entity_type, %mask, "resolved resource field mask");
                Ok(Some(mask))
            })
            .map(|_| ())
    }

    /// The resolved field mask; `None` means every field.
    ///
    /// Before `init` this also returns `None`, so callers must initialize
    /// the owning permission graph first.
    pub fn mask(&self) -> Option<&FieldMask> {
        self.mask.get().and_then(Option::as_ref)
    }

    pub fn is_initialized(&self) -> bool {
        self.mask.get().is_some()
    }
}

/// A named group of entity resources, typically one application area.
#[derive(Debug)]
pub struct EntityGroupResource {
    name: String,
    resources: Vec<Arc<EntityResource>>,
}

impl EntityGroupResource {
    pub fn new(name: impl Into<String>, resources: Vec<Arc<EntityResource>>) -> Self {
        Self {
            name: name.into(),
            resources,
        }
    }

    /// A group made of whole entity types
    pub fn of_entities<S: Into<String>>(
        name: impl Into<String>,
        entity_types: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            entity_types
                .into_iter()
                .map(|t| Arc::new(EntityResource::new(t)))
                .collect(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resources(&self) -> &[Arc<EntityResource>] {
        &self.resources
    }

    pub fn init(&self, model: &EntityModel) -> Result<()> {
        self.resources.iter().try_for_each(|r| r.init(model))
    }
}
