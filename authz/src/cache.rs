//! Authority cache: one compiled [`Authority`] per distinct role set.

use crate::authority::Authority;
use crate::error::Result;
use crate::role::Role;
use entities::EntityModel;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

struct CacheEntry {
    roles: Vec<Arc<Role>>,
    authority: Arc<Authority>,
}

impl CacheEntry {
    /// Built from exactly these role instances? A role redefined under the
    /// same name is a different instance.
    fn built_from(&self, roles: &[Arc<Role>]) -> bool {
        self.roles.len() == roles.len()
            && roles
                .iter()
                .all(|role| self.roles.iter().any(|r| Arc::ptr_eq(r, role)))
    }
}

/// Shares authorities between principals holding the same roles
pub struct AuthorityCache {
    model: Arc<EntityModel>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    build_lock: Mutex<()>,
}

impl AuthorityCache {
    pub fn new(model: Arc<EntityModel>) -> Self {
        Self {
            model,
            entries: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
        }
    }

    pub fn model(&self) -> &EntityModel {
        &self.model
    }

    /// Order-independent key of a role set: sorted, deduplicated names.
    pub fn cache_key(roles: &[Arc<Role>]) -> String {
        let mut names: Vec<&str> = roles.iter().map(|r| r.name()).collect();
        names.sort_unstable();
        names.dedup();
        names.join(",")
    }

    /// The authority for `roles`, building it if the set was never seen or
    /// one of its roles has been redefined since.
    pub fn get_or_build(&self, roles: &[Arc<Role>]) -> Result<Arc<Authority>> {
        let roles = unique_roles(roles);
        let key = Self::cache_key(&roles);

        if let Some(authority) = self.lookup(&key, &roles) {
            return Ok(authority);
        }

        let _guard = self.build_lock.lock();
        if let Some(authority) = self.lookup(&key, &roles) {
            return Ok(authority);
        }

        let authority = Arc::new(Authority::build(&roles, &self.model)?);
        info!(key = %key, "cached authority");
        self.entries.write().insert(
            key,
            CacheEntry {
                roles,
                authority: authority.clone(),
            },
        );
        Ok(authority)
    }

    /// Drop every cached authority involving the named role
    pub fn invalidate_role(&self, name: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.roles.iter().all(|r| r.name() != name));
        let removed = before - entries.len();
        debug!(role = %name, removed, "invalidated cached authorities");
        removed
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn lookup(&self, key: &str, roles: &[Arc<Role>]) -> Option<Arc<Authority>> {
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.built_from(roles))
            .map(|entry| entry.authority.clone())
    }
}

/// Roles in name order without repeated instances
fn unique_roles(roles: &[Arc<Role>]) -> Vec<Arc<Role>> {
    let mut unique: Vec<Arc<Role>> = Vec::with_capacity(roles.len());
    for role in roles {
        if !unique.iter().any(|r| Arc::ptr_eq(r, role)) {
            unique.push(role.clone());
        }
    }
    unique.sort_by(|a, b| a.name().cmp(b.name()));
    unique
}
