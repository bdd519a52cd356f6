//! Grants: an activity given to a role, optionally restricted by a filter
//! and optionally gated by a dynamic activation.

use crate::activity::Activity;
use crate::dynamic::DynamicGrant;
use crate::filter::{AuthorizationFilter, EntityFilter};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_GRANT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GrantId(u64);

impl GrantId {
    fn next() -> Self {
        GrantId(NEXT_GRANT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// An activity granted to a role.
///
/// Static when `dynamic` is `None`; otherwise inert until its
/// [`DynamicGrant`] is activated in the evaluating context.
pub struct ActivityGrant {
    id: GrantId,
    activity: Arc<Activity>,
    filter: Option<Arc<AuthorizationFilter>>,
    dynamic: Option<Arc<DynamicGrant>>,
    cloned_from: Option<GrantId>,
}

impl ActivityGrant {
    pub(crate) fn new(
        activity: Arc<Activity>,
        filter: Option<Arc<AuthorizationFilter>>,
        dynamic: Option<Arc<DynamicGrant>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: GrantId::next(),
            activity,
            filter,
            dynamic,
            cloned_from: None,
        })
    }

    /// The same grant applied to another (descendant) activity: same filter,
    /// same dynamic binding, new identity.
    pub(crate) fn clone_for(&self, activity: Arc<Activity>) -> Arc<Self> {
        Arc::new(Self {
            id: GrantId::next(),
            activity,
            filter: self.filter.clone(),
            dynamic: self.dynamic.clone(),
            cloned_from: Some(self.cloned_from.unwrap_or(self.id)),
        })
    }

    pub fn id(&self) -> GrantId {
        self.id
    }

    pub fn activity(&self) -> &Arc<Activity> {
        &self.activity
    }

    pub fn filter(&self) -> Option<&Arc<AuthorizationFilter>> {
        self.filter.as_ref()
    }

    pub fn dynamic(&self) -> Option<&Arc<DynamicGrant>> {
        self.dynamic.as_ref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic.is_some()
    }

    /// The directly configured grant this one was derived from, if any
    pub fn cloned_from(&self) -> Option<GrantId> {
        self.cloned_from
    }

    /// The grant's filter as it applies to one entity type.
    ///
    /// `None` when the grant is unfiltered or its filter does not mention
    /// the type; in both cases the grant is unconditional for that type.
    pub fn entity_filter(&self, entity_type: &str) -> Option<EntityFilter> {
        self.filter.as_ref()?.for_entity(entity_type)
    }
}

impl fmt::Debug for ActivityGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityGrant")
            .field("id", &self.id)
            .field("activity", &self.activity.name())
            .field("filter", &self.filter.as_ref().map(|f| f.name().to_string()))
            .field("dynamic", &self.dynamic.as_ref().map(|d| d.key()))
            .field("cloned_from", &self.cloned_from)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::QueryPredicate;

    #[test]
    fn test_clone_keeps_filter_and_binding() {
        let filter = Arc::new(
            AuthorizationFilter::new("own").with_query_filter("document", QueryPredicate::expr("x")),
        );
        let parent = Activity::new("parent");
        let child = Activity::new("child");
        let dynamic = DynamicGrant::new(parent.clone(), None, None);
        let grant = ActivityGrant::new(parent, Some(filter.clone()), Some(dynamic.clone()));

        let cloned = grant.clone_for(child);
        assert_ne!(cloned.id(), grant.id());
        assert_eq!(cloned.cloned_from(), Some(grant.id()));
        assert_eq!(cloned.activity().name(), "child");
        assert!(Arc::ptr_eq(cloned.filter().unwrap(), &filter));
        assert_eq!(cloned.dynamic().unwrap().key(), dynamic.key());

        // a clone of a clone still points at the configured grant
        let again = cloned.clone_for(Activity::new("grandchild"));
        assert_eq!(again.cloned_from(), Some(grant.id()));
    }

    #[test]
    fn test_entity_filter_only_for_mentioned_types() {
        let filter = Arc::new(
            AuthorizationFilter::new("own").with_query_filter("document", QueryPredicate::expr("x")),
        );
        let grant = ActivityGrant::new(Activity::new("a"), Some(filter), None);
        assert!(grant.entity_filter("document").is_some());
        assert!(grant.entity_filter("invoice").is_none());
        assert!(!grant.is_dynamic());
    }
}
