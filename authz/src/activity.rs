//! Activities: named, composable bundles of permissions.

use crate::access::AccessType;
use crate::error::{AuthzError, Result};
use crate::permission::Permission;
use entities::EntityModel;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A named bundle of permissions and child activities.
///
/// Activities are assembled during application configuration and frozen by
/// [`Activity::init`]. Children added after initialization are ignored by
/// the cached closure.
pub struct Activity {
    name: String,
    permissions: RwLock<Vec<Permission>>,
    children: RwLock<Vec<Arc<Activity>>>,
    closure: OnceCell<ActivityClosure>,
}

/// Transitive expansion of an activity, computed once by `init`.
#[derive(Debug, Default)]
pub struct ActivityClosure {
    /// Every activity reachable through child links, excluding the activity itself
    pub descendants: Vec<Arc<Activity>>,
    /// Permissions held by the activity or any descendant, each once
    pub permissions: Vec<Permission>,
}

impl Activity {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            permissions: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
            closure: OnceCell::new(),
        })
    }

    /// An activity holding `permissions`
    pub fn with_permissions(
        name: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Arc<Self> {
        let activity = Self::new(name);
        activity.add_permissions(permissions);
        activity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_permissions(&self, permissions: impl IntoIterator<Item = Permission>) -> &Self {
        self.permissions.write().extend(permissions);
        self
    }

    pub fn add_activities(&self, children: impl IntoIterator<Item = Arc<Activity>>) -> &Self {
        self.children.write().extend(children);
        self
    }

    /// Permissions held directly by this activity
    pub fn permissions(&self) -> Vec<Permission> {
        self.permissions.read().clone()
    }

    /// Direct child activities
    pub fn children(&self) -> Vec<Arc<Activity>> {
        self.children.read().clone()
    }

    /// Compute and cache the transitive closure, initializing every reachable
    /// permission. Fails if this activity is its own descendant.
    pub fn init(&self, model: &EntityModel) -> Result<()> {
        self.closure
            .get_or_try_init(|| self.build_closure(model))
            .map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.closure.get().is_some()
    }

    /// The cached closure; `None` until `init` succeeds.
    pub fn closure(&self) -> Option<&ActivityClosure> {
        self.closure.get()
    }

    /// Every descendant activity. Empty before `init`.
    pub fn descendants(&self) -> &[Arc<Activity>] {
        self.closure().map_or(&[], |c| c.descendants.as_slice())
    }

    /// Union of the access this activity and its descendants grant on an entity type.
    pub fn access_for(&self, entity_type: &str) -> AccessType {
        let fold = |permissions: &[Permission]| {
            permissions
                .iter()
                .filter_map(|p| match p {
                    Permission::EntityGroup(p) => p.access_for(entity_type),
                    _ => None,
                })
                .fold(AccessType::empty(), |acc, a| acc | a)
        };
        match self.closure() {
            Some(closure) => fold(&closure.permissions),
            None => fold(&self.permissions()),
        }
    }

    fn build_closure(&self, model: &EntityModel) -> Result<ActivityClosure> {
        let me = self as *const Activity as usize;
        let mut seen = HashSet::new();
        let mut descendants = Vec::new();
        let mut stack = self.children();
        while let Some(activity) = stack.pop() {
            let id = Arc::as_ptr(&activity) as usize;
            if id == me {
                return Err(AuthzError::ActivityCycle(self.name.clone()));
            }
            if seen.insert(id) {
                stack.extend(activity.children());
                descendants.push(activity);
            }
        }

        // The graph below is acyclic as seen from here; children re-check
        // their own subgraphs, which catches cycles not passing through self.
        for child in self.children() {
            child.init(model)?;
        }

        let mut seen_permissions = HashSet::new();
        let mut permissions = Vec::new();
        let mut candidates = self.permissions();
        for activity in &descendants {
            candidates.extend(activity.permissions());
        }
        for permission in candidates {
            if seen_permissions.insert(permission.identity()) {
                permission.init(model)?;
                permissions.push(permission);
            }
        }

        debug!(
            activity = %self.name,
            descendants = descendants.len(),
            permissions = permissions.len(),
            "initialized activity"
        );
        Ok(ActivityClosure {
            descendants,
            permissions,
        })
    }
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children: Vec<String> = self.children.read().iter().map(|c| c.name.clone()).collect();
        f.debug_struct("Activity")
            .field("name", &self.name)
            .field("permissions", &self.permissions.read().len())
            .field("children", &children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{CustomPermission, EntityGroupPermission};
    use crate::resource::EntityGroupResource;
    use entities::{EntityDefinition, Field, FieldType};

    fn model() -> EntityModel {
        EntityModel::from_definitions(vec![EntityDefinition::new(
            "document",
            "Document",
            vec![Field::new("title", FieldType::Text, "Title")],
        )])
        .unwrap()
    }

    fn read_docs() -> Permission {
        EntityGroupPermission::new(
            "read_docs",
            AccessType::READ,
            vec![Arc::new(EntityGroupResource::of_entities("docs", ["document"]))],
        )
        .into()
    }

    #[test]
    fn test_closure_collects_descendants_and_permissions() {
        let shared = read_docs();
        let leaf = Activity::with_permissions("leaf", [shared.clone()]);
        let middle = Activity::with_permissions("middle", [CustomPermission::new("export").into()]);
        middle.add_activities([leaf.clone()]);
        let root = Activity::with_permissions("root", [shared]);
        root.add_activities([middle.clone(), leaf.clone()]);

        root.init(&model()).unwrap();
        let names: HashSet<&str> = root.descendants().iter().map(|a| a.name()).collect();
        assert_eq!(names, HashSet::from(["middle", "leaf"]));
        // the shared permission is listed once
        assert_eq!(root.closure().unwrap().permissions.len(), 2);
        assert!(leaf.is_initialized());
        assert_eq!(root.access_for("document"), AccessType::READ);
        assert_eq!(middle.access_for("document"), AccessType::READ);
    }

    #[test]
    fn test_self_cycle_is_rejected() {
        let activity = Activity::new("loop");
        activity.add_activities([activity.clone()]);
        let err = activity.init(&model()).unwrap_err();
        assert!(matches!(err, AuthzError::ActivityCycle(name) if name == "loop"));
        assert!(!activity.is_initialized());
    }

    #[test]
    fn test_cycle_below_is_reported_by_its_member() {
        let a = Activity::new("a");
        let b = Activity::new("b");
        let top = Activity::new("top");
        a.add_activities([b.clone()]);
        b.add_activities([a.clone()]);
        top.add_activities([a.clone()]);

        let err = top.init(&model()).unwrap_err();
        assert!(matches!(err, AuthzError::ActivityCycle(name) if name == "a"));
    }

    #[test]
    fn test_init_is_idempotent() {
        let activity = Activity::with_permissions("docs", [read_docs()]);
        let model = model();
        activity.init(&model).unwrap();
        activity.add_activities([Activity::new("late")]);
        activity.init(&model).unwrap();
        assert!(activity.descendants().is_empty());
    }
}
