//! The compiled, immutable decision structure for one set of roles.

use crate::access::AccessType;
use crate::closure::GrantedPermission;
use crate::context::OperationContext;
use crate::dynamic::DynamicGrant;
use crate::entity_permission::{QueryAccess, TypeAccess, UserEntityPermissionSet};
use crate::error::Result;
use crate::permission::{type_key, CustomPermission, Permission};
use crate::record_permission::UserRecordPermission;
use crate::role::Role;
use entities::{EntityModel, Record};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Build the authority for a set of roles.
pub fn build_authority(roles: &[Arc<Role>], model: &EntityModel) -> Result<Authority> {
    Authority::build(roles, model)
}

/// Everything a principal holding a specific set of roles may do.
///
/// Built once per role set, then read without locking from any number of
/// threads. Dynamic grants are the only state consulted at evaluation time,
/// and they live in the [`OperationContext`].
#[derive(Debug)]
pub struct Authority {
    roles: Vec<String>,
    entity_permissions: BTreeMap<String, UserEntityPermissionSet>,
    object_permissions: BTreeMap<String, AccessType>,
    custom_permissions: Vec<Arc<CustomPermission>>,
    dynamic_grants: Vec<Arc<DynamicGrant>>,
}

impl Authority {
    pub fn build(roles: &[Arc<Role>], model: &EntityModel) -> Result<Self> {
        let mut granted: Vec<GrantedPermission> = Vec::new();
        let mut seen = HashSet::new();
        for role in roles {
            for pair in role.runtime_data(model)?.granted_permissions() {
                if seen.insert((pair.permission.identity(), pair.grant.id())) {
                    granted.push(pair.clone());
                }
            }
        }

        let mut authority = Authority {
            roles: roles.iter().map(|r| r.name().to_string()).collect(),
            entity_permissions: BTreeMap::new(),
            object_permissions: BTreeMap::new(),
            custom_permissions: Vec::new(),
            dynamic_grants: Vec::new(),
        };

        for GrantedPermission { permission, grant } in &granted {
            match permission {
                Permission::EntityGroup(group_permission) => {
                    for resource in group_permission.resources().iter().flat_map(|g| g.resources()) {
                        let bundle =
                            UserRecordPermission::from_access(group_permission.access(), resource.mask());
                        let set = match authority.entity_permissions.entry(resource.entity_type().to_string()) {
                            Entry::Occupied(entry) => entry.into_mut(),
                            Entry::Vacant(entry) => {
                                let definition = model.require(resource.entity_type())?;
                                entry.insert(UserEntityPermissionSet::new(definition.clone()))
                            }
                        };
                        set.add(grant, bundle);
                    }
                }
                Permission::ObjectAccess(object_permission) => {
                    for object_type in object_permission.types() {
                        *authority
                            .object_permissions
                            .entry(object_type.clone())
                            .or_default() |= object_permission.access();
                    }
                }
                Permission::Custom(custom) => {
                    if !authority.custom_permissions.iter().any(|c| Arc::ptr_eq(c, custom)) {
                        authority.custom_permissions.push(custom.clone());
                    }
                }
            }

            if let Some(dynamic) = grant.dynamic() {
                if !authority.dynamic_grants.iter().any(|d| d.key() == dynamic.key()) {
                    authority.dynamic_grants.push(dynamic.clone());
                }
            }
        }

        for set in authority.entity_permissions.values_mut() {
            set.finalize();
        }

        info!(
            roles = %authority.roles.join(","),
            entity_types = authority.entity_permissions.len(),
            object_types = authority.object_permissions.len(),
            custom = authority.custom_permissions.len(),
            dynamic = authority.dynamic_grants.len(),
            "built authority"
        );
        Ok(authority)
    }

    /// Names of the roles this authority was built from
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn entity_permissions(&self, entity_type: &str) -> Option<&UserEntityPermissionSet> {
        self.entity_permissions.get(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entity_permissions.keys().map(String::as_str)
    }

    /// Type-level answer. Types no grant mentions are denied.
    pub fn check_type(&self, entity_type: &str, access: AccessType) -> TypeAccess {
        self.entity_permissions
            .get(entity_type)
            .map_or(TypeAccess::Denied, |set| set.check_type(access))
    }

    pub fn record_permission(&self, record: &dyn Record, ctx: &OperationContext) -> UserRecordPermission {
        self.entity_permissions
            .get(record.entity_type())
            .map_or_else(UserRecordPermission::denied, |set| set.record_permission(record, ctx))
    }

    pub fn check_record(&self, record: &dyn Record, access: AccessType, ctx: &OperationContext) -> bool {
        self.record_permission(record, ctx).allows(access)
    }

    /// Field-level answer. Unknown fields are never accessible.
    pub fn check_field(
        &self,
        record: &dyn Record,
        field: &str,
        access: AccessType,
        ctx: &OperationContext,
    ) -> bool {
        let Some(set) = self.entity_permissions.get(record.entity_type()) else {
            return false;
        };
        let definition = set.definition();
        let Some(index) = definition.field_index(field) else {
            return false;
        };
        set.record_permission(record, ctx)
            .allows_field(access, index, definition.is_system_field(index))
    }

    /// Access granted on an object type key; empty when nothing is granted.
    pub fn object_permission(&self, type_key: &str) -> AccessType {
        self.object_permissions
            .get(type_key)
            .copied()
            .unwrap_or_else(AccessType::empty)
    }

    pub fn object_permission_for<T: ?Sized + 'static>(&self) -> AccessType {
        self.object_permission(&type_key::<T>())
    }

    pub fn object_permissions(&self) -> impl Iterator<Item = (&str, AccessType)> {
        self.object_permissions.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn has_custom_permission(&self, name: &str) -> bool {
        self.custom_permissions.iter().any(|c| c.name() == name)
    }

    pub fn custom_permissions(&self) -> &[Arc<CustomPermission>] {
        &self.custom_permissions
    }

    /// Dynamic grants that can widen this authority when activated
    pub fn dynamic_grants(&self) -> &[Arc<DynamicGrant>] {
        &self.dynamic_grants
    }

    /// How a read query over `entity_type` must be restricted in `ctx`.
    pub fn read_query_filter(&self, entity_type: &str, ctx: &OperationContext) -> QueryAccess {
        self.entity_permissions
            .get(entity_type)
            .map_or(QueryAccess::Denied, |set| set.query_access(ctx))
    }
}
