//! Roles: named sets of grants, composable through child roles.

use crate::activity::Activity;
use crate::closure::{self, RuntimeRoleData};
use crate::dynamic::DynamicGrant;
use crate::error::{AuthzError, Result};
use crate::filter::AuthorizationFilter;
use crate::grant::ActivityGrant;
use entities::EntityModel;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A role: grants of its own plus everything its child roles hold.
pub struct Role {
    name: String,
    grants: RwLock<Vec<Arc<ActivityGrant>>>,
    children: RwLock<Vec<Arc<Role>>>,
    initialized: OnceCell<()>,
    runtime: OnceCell<RuntimeRoleData>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            grants: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
            initialized: OnceCell::new(),
            runtime: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grant an activity unconditionally
    pub fn grant(&self, activity: Arc<Activity>) -> Arc<ActivityGrant> {
        self.push_grant(ActivityGrant::new(activity, None, None))
    }

    /// Grant an activity on the records `filter` accepts
    pub fn grant_filtered(
        &self,
        activity: Arc<Activity>,
        filter: Arc<AuthorizationFilter>,
    ) -> Arc<ActivityGrant> {
        self.push_grant(ActivityGrant::new(activity, Some(filter), None))
    }

    /// Grant an activity that only applies while the returned dynamic grant
    /// is activated in the evaluating context.
    pub fn grant_dynamic(
        &self,
        activity: Arc<Activity>,
        filter: Option<Arc<AuthorizationFilter>>,
        document_key: Option<String>,
        check_filter: Option<Arc<AuthorizationFilter>>,
    ) -> Arc<DynamicGrant> {
        let dynamic = DynamicGrant::new(activity.clone(), document_key, check_filter);
        self.push_grant(ActivityGrant::new(activity, filter, Some(dynamic.clone())));
        dynamic
    }

    pub fn add_child_roles(&self, roles: impl IntoIterator<Item = Arc<Role>>) -> &Self {
        self.children.write().extend(roles);
        self
    }

    /// Grants configured directly on this role
    pub fn grants(&self) -> Vec<Arc<ActivityGrant>> {
        self.grants.read().clone()
    }

    pub fn children(&self) -> Vec<Arc<Role>> {
        self.children.read().clone()
    }

    /// Validate the role graph below this role and initialize every granted
    /// activity. Runs once; fails if the role is its own descendant.
    pub fn init(&self, model: &EntityModel) -> Result<()> {
        self.initialized
            .get_or_try_init(|| -> Result<()> {
                let me = self as *const Role as usize;
                let mut seen = HashSet::new();
                let mut stack = self.children();
                while let Some(role) = stack.pop() {
                    let id = Arc::as_ptr(&role) as usize;
                    if id == me {
                        return Err(AuthzError::RoleCycle(self.name.clone()));
                    }
                    if seen.insert(id) {
                        stack.extend(role.children());
                    }
                }

                for child in self.children() {
                    child.init(model)?;
                }
                for grant in self.grants() {
                    grant.activity().init(model)?;
                }
                debug!(role = %self.name, descendants = seen.len(), "initialized role");
                Ok(())
            })
            .map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.get().is_some()
    }

    /// The expanded grants and permissions of this role, built on first use.
    ///
    /// Child roles linked after `init` are still checked: re-entering a role
    /// whose expansion is under way fails with `RoleCycle`.
    pub fn runtime_data(&self, model: &EntityModel) -> Result<&RuntimeRoleData> {
        self.runtime_data_within(model, &mut Vec::new())
    }

    /// `in_progress` holds the roles whose expansion is on the current call path.
    pub(crate) fn runtime_data_within(
        &self,
        model: &EntityModel,
        in_progress: &mut Vec<usize>,
    ) -> Result<&RuntimeRoleData> {
        if let Some(data) = self.runtime.get() {
            return Ok(data);
        }
        let me = self as *const Role as usize;
        if in_progress.contains(&me) {
            return Err(AuthzError::RoleCycle(self.name.clone()));
        }
        self.init(model)?;

        in_progress.push(me);
        let data = self
            .runtime
            .get_or_try_init(|| closure::build(self, model, in_progress));
        in_progress.pop();
        data
    }

    fn push_grant(&self, grant: Arc<ActivityGrant>) -> Arc<ActivityGrant> {
        self.grants.write().push(grant.clone());
        grant
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children: Vec<String> = self.children.read().iter().map(|c| c.name.clone()).collect();
        f.debug_struct("Role")
            .field("name", &self.name)
            .field("grants", &*self.grants.read())
            .field("children", &children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entities::EntityModel;

    #[test]
    fn test_two_cycle() {
        let a = Role::new("a");
        let b = Role::new("b");
        a.add_child_roles([b.clone()]);
        b.add_child_roles([a.clone()]);
        let err = a.init(&EntityModel::new()).unwrap_err();
        assert!(matches!(err, AuthzError::RoleCycle(name) if name == "a"));
    }

    #[test]
    fn test_three_cycle() {
        let a = Role::new("a");
        let b = Role::new("b");
        let c = Role::new("c");
        a.add_child_roles([b.clone()]);
        b.add_child_roles([c.clone()]);
        c.add_child_roles([a.clone()]);
        let model = EntityModel::new();
        for role in [&a, &b, &c] {
            let err = role.init(&model).unwrap_err();
            assert!(matches!(err, AuthzError::RoleCycle(ref name) if name == role.name()));
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn test_cycle_linked_after_init() {
        let model = EntityModel::new();
        let a = Role::new("a");
        let b = Role::new("b");
        a.init(&model).unwrap();
        b.init(&model).unwrap();
        a.add_child_roles([b.clone()]);
        b.add_child_roles([a.clone()]);
        let err = a.runtime_data(&model).unwrap_err();
        assert!(matches!(err, AuthzError::RoleCycle(name) if name == "a"));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let base = Role::new("base");
        let left = Role::new("left");
        let right = Role::new("right");
        let top = Role::new("top");
        left.add_child_roles([base.clone()]);
        right.add_child_roles([base.clone()]);
        top.add_child_roles([left, right]);
        top.init(&EntityModel::new()).unwrap();
        assert!(base.is_initialized());
    }

    #[test]
    fn test_grant_dynamic_registers_grant() {
        let role = Role::new("reviewer");
        let activity = Activity::new("review");
        let dynamic = role.grant_dynamic(activity, None, Some("LoanId".into()), None);
        let grants = role.grants();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].dynamic().map(|d| d.key()), Some(dynamic.key()));
    }
}
