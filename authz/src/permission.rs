//! Permissions: the leaves of the policy graph.
//!
//! Permissions are immutable once built and compared by identity: two
//! separately constructed permissions with identical contents are distinct.

use crate::access::AccessType;
use crate::error::{AuthzError, Result};
use crate::resource::EntityGroupResource;
use entities::EntityModel;
use once_cell::sync::OnceCell;
use serde_json::Value as JsonValue;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Access to the records of one or more entity resources.
#[derive(Debug)]
pub struct EntityGroupPermission {
    name: String,
    access: AccessType,
    resources: Vec<Arc<EntityGroupResource>>,
    initialized: OnceCell<()>,
}

impl EntityGroupPermission {
    pub fn new(
        name: impl Into<String>,
        access: AccessType,
        resources: Vec<Arc<EntityGroupResource>>,
    ) -> Self {
        Self {
            name: name.into(),
            access,
            resources,
            initialized: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> AccessType {
        self.access
    }

    pub fn resources(&self) -> &[Arc<EntityGroupResource>] {
        &self.resources
    }

    /// Access this permission grants on `entity_type`, if it targets it at all.
    pub fn access_for(&self, entity_type: &str) -> Option<AccessType> {
        self.resources
            .iter()
            .flat_map(|g| g.resources())
            .any(|r| r.entity_type() == entity_type)
            .then_some(self.access)
    }

    pub fn init(&self, model: &EntityModel) -> Result<()> {
        self.initialized
            .get_or_try_init(|| -> Result<()> {
                if self.resources.iter().all(|g| g.resources().is_empty()) {
                    return Err(AuthzError::EmptyPermission(self.name.clone()));
                }
                self.resources.iter().try_for_each(|g| g.init(model))
            })
            .map(|_| ())
    }
}

/// Access to arbitrary application objects identified by a type key.
#[derive(Debug)]
pub struct ObjectAccessPermission {
    name: String,
    access: AccessType,
    types: Vec<String>,
}

impl ObjectAccessPermission {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        access: AccessType,
        types: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            access,
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Permission over a single Rust type, keyed by [`type_key`].
    pub fn for_type<T: ?Sized + 'static>(name: impl Into<String>, access: AccessType) -> Self {
        Self::new(name, access, [type_key::<T>()])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> AccessType {
        self.access
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }
}

/// Key under which object permissions for a Rust type are stored.
pub fn type_key<T: ?Sized + 'static>() -> String {
    std::any::type_name::<T>().to_string()
}

/// An application-defined permission the engine carries without interpreting.
#[derive(Debug)]
pub struct CustomPermission {
    name: String,
    data: JsonValue,
}

impl CustomPermission {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_data(name, JsonValue::Null)
    }

    pub fn with_data(name: impl Into<String>, data: JsonValue) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &JsonValue {
        &self.data
    }
}

/// Any permission an activity can hold.
#[derive(Debug, Clone)]
pub enum Permission {
    EntityGroup(Arc<EntityGroupPermission>),
    ObjectAccess(Arc<ObjectAccessPermission>),
    Custom(Arc<CustomPermission>),
}

impl Permission {
    pub fn name(&self) -> &str {
        match self {
            Permission::EntityGroup(p) => p.name(),
            Permission::ObjectAccess(p) => p.name(),
            Permission::Custom(p) => p.name(),
        }
    }

    pub fn init(&self, model: &EntityModel) -> Result<()> {
        match self {
            Permission::EntityGroup(p) => p.init(model),
            Permission::ObjectAccess(p) if p.types().is_empty() => {
                Err(AuthzError::EmptyPermission(p.name().to_string()))
            }
            Permission::ObjectAccess(_) | Permission::Custom(_) => Ok(()),
        }
    }

    /// Address of the shared permission, used as its identity.
    pub(crate) fn identity(&self) -> usize {
        match self {
            Permission::EntityGroup(p) => Arc::as_ptr(p) as *const () as usize,
            Permission::ObjectAccess(p) => Arc::as_ptr(p) as *const () as usize,
            Permission::Custom(p) => Arc::as_ptr(p) as *const () as usize,
        }
    }
}

impl PartialEq for Permission {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Permission {}

impl Hash for Permission {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl From<EntityGroupPermission> for Permission {
    fn from(p: EntityGroupPermission) -> Self {
        Permission::EntityGroup(Arc::new(p))
    }
}

impl From<ObjectAccessPermission> for Permission {
    fn from(p: ObjectAccessPermission) -> Self {
        Permission::ObjectAccess(Arc::new(p))
    }
}

impl From<CustomPermission> for Permission {
    fn from(p: CustomPermission) -> Self {
        Permission::Custom(Arc::new(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::EntityResource;
    use entities::{EntityDefinition, Field, FieldType};

    fn model() -> EntityModel {
        EntityModel::from_definitions(vec![EntityDefinition::new(
            "document",
            "Document",
            vec![Field::new("title", FieldType::Text, "Title")],
        )])
        .unwrap()
    }

    fn docs() -> Arc<EntityGroupResource> {
        Arc::new(EntityGroupResource::of_entities("docs", ["document"]))
    }

    #[test]
    fn test_identity_not_structure() {
        let a: Permission = EntityGroupPermission::new("p", AccessType::READ, vec![docs()]).into();
        let b: Permission = EntityGroupPermission::new("p", AccessType::READ, vec![docs()]).into();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_entity_permission_init() {
        let model = model();
        let p = EntityGroupPermission::new("read_docs", AccessType::READ, vec![docs()]);
        p.init(&model).unwrap();
        assert_eq!(p.access_for("document"), Some(AccessType::READ));
        assert_eq!(p.access_for("invoice"), None);

        let empty = EntityGroupPermission::new("nothing", AccessType::READ, vec![]);
        assert!(matches!(
            empty.init(&model),
            Err(AuthzError::EmptyPermission(name)) if name == "nothing"
        ));

        let bad = EntityGroupPermission::new(
            "bad",
            AccessType::READ,
            vec![Arc::new(EntityGroupResource::new(
                "bad",
                vec![Arc::new(EntityResource::new("invoice"))],
            ))],
        );
        assert!(bad.init(&model).is_err());
    }

    #[test]
    fn test_object_permission() {
        struct Report;
        let p = ObjectAccessPermission::for_type::<Report>("reports", AccessType::API_GET);
        assert_eq!(p.types(), &[type_key::<Report>()]);

        let empty: Permission =
            ObjectAccessPermission::new("none", AccessType::READ, Vec::<String>::new()).into();
        assert!(empty.init(&model()).is_err());
    }

    #[test]
    fn test_custom_permission_passes_through() {
        let p: Permission =
            CustomPermission::with_data("export", serde_json::json!({"format": "csv"})).into();
        assert_eq!(p.name(), "export");
        assert!(p.init(&model()).is_ok());
    }
}
