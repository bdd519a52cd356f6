//! Role closure: flattening a role's hierarchy into (permission, grant) pairs.

use crate::error::Result;
use crate::grant::{ActivityGrant, GrantId};
use crate::permission::Permission;
use crate::role::Role;
use entities::EntityModel;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A permission together with the grant that made it available.
#[derive(Debug, Clone)]
pub struct GrantedPermission {
    pub permission: Permission,
    pub grant: Arc<ActivityGrant>,
}

/// Everything a role holds once its hierarchy is expanded.
#[derive(Debug, Default)]
pub struct RuntimeRoleData {
    descendant_roles: Vec<Arc<Role>>,
    granted_activities: BTreeMap<GrantId, Arc<ActivityGrant>>,
    granted_permissions: Vec<GrantedPermission>,
}

impl RuntimeRoleData {
    /// Every role reachable through child links
    pub fn descendant_roles(&self) -> &[Arc<Role>] {
        &self.descendant_roles
    }

    /// Own grants, inherited grants, and clones of own grants for the
    /// descendant activities of each granted activity
    pub fn granted_activities(&self) -> impl Iterator<Item = &Arc<ActivityGrant>> {
        self.granted_activities.values()
    }

    pub fn granted_permissions(&self) -> &[GrantedPermission] {
        &self.granted_permissions
    }

    pub fn has_descendant(&self, role: &Role) -> bool {
        self.descendant_roles
            .iter()
            .any(|r| std::ptr::eq(Arc::as_ptr(r), role))
    }
}

/// Expand `role`. `in_progress` carries the roles being expanded above it.
pub(crate) fn build(
    role: &Role,
    model: &EntityModel,
    in_progress: &mut Vec<usize>,
) -> Result<RuntimeRoleData> {
    let mut granted: BTreeMap<GrantId, Arc<ActivityGrant>> = role
        .grants()
        .into_iter()
        .map(|g| (g.id(), g))
        .collect();

    let mut seen = HashSet::new();
    let mut descendant_roles = Vec::new();
    for child in role.children() {
        if !seen.insert(Arc::as_ptr(&child) as usize) {
            continue;
        }
        let data = child.runtime_data_within(model, in_progress)?;
        for role in data.descendant_roles() {
            if seen.insert(Arc::as_ptr(role) as usize) {
                descendant_roles.push(role.clone());
            }
        }
        granted.extend(data.granted_activities.iter().map(|(id, g)| (*id, g.clone())));
        descendant_roles.push(child);
    }

    for grant in role.grants() {
        for activity in grant.activity().descendants() {
            let cloned = grant.clone_for(activity.clone());
            granted.insert(cloned.id(), cloned);
        }
    }

    let mut pairs = HashSet::new();
    let mut granted_permissions = Vec::new();
    for grant in granted.values() {
        for permission in grant.activity().permissions() {
            if pairs.insert((permission.identity(), grant.id())) {
                granted_permissions.push(GrantedPermission {
                    permission,
                    grant: grant.clone(),
                });
            }
        }
    }

    debug!(
        role = %role.name(),
        descendant_roles = descendant_roles.len(),
        grants = granted.len(),
        permissions = granted_permissions.len(),
        "built role closure"
    );
    Ok(RuntimeRoleData {
        descendant_roles,
        granted_activities: granted,
        granted_permissions,
    })
}
