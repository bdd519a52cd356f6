//! Per-entity-type permission rules inside an [`Authority`](crate::Authority).

use crate::access::AccessType;
use crate::context::OperationContext;
use crate::dynamic::DynamicGrant;
use crate::filter::{EntityFilter, QueryPredicate};
use crate::grant::{ActivityGrant, GrantId};
use crate::record_permission::UserRecordPermission;
use entities::{EntityDefinition, Record};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Answer of a type-level check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeAccess {
    /// Allowed on every record of the type.
    Allowed,
    /// Allowed on some records; check each record.
    AllowedWithFilter,
    Denied,
    /// Depends on dynamic grants active at evaluation time; check each record.
    Unknown,
}

impl TypeAccess {
    /// Could the access succeed for at least some record?
    pub fn is_possible(self) -> bool {
        !matches!(self, TypeAccess::Denied)
    }
}

/// How a read query over an entity type has to be restricted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "access", content = "predicate")]
pub enum QueryAccess {
    Unrestricted,
    Filtered(QueryPredicate),
    Denied,
}

/// Type-level summary, present only when no rule is dynamically gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FixedTypePermission {
    access: AccessType,
    has_filter: bool,
}

impl FixedTypePermission {
    pub fn access(&self) -> AccessType {
        self.access
    }

    /// Some of the access only holds for records a filter accepts.
    pub fn has_filter(&self) -> bool {
        self.has_filter
    }
}

/// Grants that share a filter and dynamic gating, merged into one rule.
#[derive(Debug, Clone)]
pub struct CumulativeRecordPermission {
    permission: UserRecordPermission,
    filter: Option<EntityFilter>,
    dynamic_grants: Vec<Arc<DynamicGrant>>,
    source_grants: BTreeSet<GrantId>,
}

impl CumulativeRecordPermission {
    fn seeded(grant: &ActivityGrant, filter: Option<EntityFilter>, permission: UserRecordPermission) -> Self {
        Self {
            permission,
            filter,
            dynamic_grants: grant.dynamic().cloned().into_iter().collect(),
            source_grants: BTreeSet::from([grant.id()]),
        }
    }

    pub fn permission(&self) -> &UserRecordPermission {
        &self.permission
    }

    pub fn filter(&self) -> Option<&EntityFilter> {
        self.filter.as_ref()
    }

    /// Dynamic grants gating this rule; empty for a static rule.
    pub fn dynamic_grants(&self) -> &[Arc<DynamicGrant>] {
        &self.dynamic_grants
    }

    pub fn source_grants(&self) -> impl Iterator<Item = GrantId> + '_ {
        self.source_grants.iter().copied()
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn is_dynamic(&self) -> bool {
        !self.dynamic_grants.is_empty()
    }

    /// Static rules are always active; gated rules while any gate is enabled.
    pub fn is_active(&self, ctx: &OperationContext) -> bool {
        self.dynamic_grants.is_empty() || self.dynamic_grants.iter().any(|g| g.is_enabled(ctx))
    }

    pub fn applies_to(&self, record: &dyn Record, ctx: &OperationContext) -> bool {
        self.is_active(ctx)
            && self
                .filter
                .as_ref()
                .map_or(true, |filter| filter.matches(record, ctx))
    }

    fn is_compatible(&self, grant: &ActivityGrant, filter: Option<&EntityFilter>) -> bool {
        if self.source_grants.contains(&grant.id()) {
            return true;
        }
        let same_filter = match (&self.filter, filter) {
            (None, None) => true,
            (Some(mine), Some(theirs)) => mine.same_as(theirs),
            _ => false,
        };
        if !same_filter {
            return false;
        }
        match grant.dynamic() {
            None => self.dynamic_grants.is_empty(),
            Some(dynamic) => self.dynamic_grants.iter().any(|g| g.key() == dynamic.key()),
        }
    }

    fn absorb(&mut self, grant: &ActivityGrant, permission: &UserRecordPermission) {
        self.permission.merge_in(permission);
        self.source_grants.insert(grant.id());
    }
}

/// All rules an authority holds for one entity type.
#[derive(Debug, Clone)]
pub struct UserEntityPermissionSet {
    definition: EntityDefinition,
    has_filter: bool,
    has_dynamic_permissions: bool,
    fixed_record_permissions: Option<UserRecordPermission>,
    fixed_type_permissions: Option<FixedTypePermission>,
    conditional_permissions: Vec<CumulativeRecordPermission>,
    read_query_filter: QueryAccess,
}

impl UserEntityPermissionSet {
    pub(crate) fn new(definition: EntityDefinition) -> Self {
        Self {
            definition,
            has_filter: false,
            has_dynamic_permissions: false,
            fixed_record_permissions: None,
            fixed_type_permissions: None,
            conditional_permissions: Vec::new(),
            read_query_filter: QueryAccess::Denied,
        }
    }

    /// Merge one grant's permission into the compatible rule, or start a new
    /// rule for it.
    pub(crate) fn add(&mut self, grant: &ActivityGrant, permission: UserRecordPermission) {
        let filter = grant.entity_filter(self.entity_type());
        match self
            .conditional_permissions
            .iter_mut()
            .find(|rule| rule.is_compatible(grant, filter.as_ref()))
        {
            Some(rule) => rule.absorb(grant, &permission),
            None => {
                self.conditional_permissions
                    .push(CumulativeRecordPermission::seeded(grant, filter, permission));
            }
        }
        debug!(
            entity_type = %self.entity_type(),
            grant = %grant.id(),
            rules = self.conditional_permissions.len(),
            "merged grant into entity permissions"
        );
    }

    /// Derive the shortcut fields once every grant has been added.
    pub(crate) fn finalize(&mut self) {
        self.has_filter = self.conditional_permissions.iter().any(|r| r.has_filter());
        self.has_dynamic_permissions = self.conditional_permissions.iter().any(|r| r.is_dynamic());

        let merged = self
            .conditional_permissions
            .iter()
            .fold(UserRecordPermission::denied(), |acc, rule| acc.merge(&rule.permission));

        self.fixed_type_permissions = (!self.has_dynamic_permissions).then(|| FixedTypePermission {
            access: merged.access(),
            has_filter: self.has_filter,
        });
        self.fixed_record_permissions =
            (!self.has_filter && !self.has_dynamic_permissions).then_some(merged);
        self.read_query_filter =
            read_predicate(self.conditional_permissions.iter().filter(|r| !r.is_dynamic()))
                .unwrap_or(QueryAccess::Denied);
    }

    pub fn entity_type(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    pub fn has_filter(&self) -> bool {
        self.has_filter
    }

    pub fn has_dynamic_permissions(&self) -> bool {
        self.has_dynamic_permissions
    }

    /// Record permission valid for every record, when no rule is filtered or gated.
    pub fn fixed_record_permissions(&self) -> Option<&UserRecordPermission> {
        self.fixed_record_permissions.as_ref()
    }

    pub fn fixed_type_permissions(&self) -> Option<&FixedTypePermission> {
        self.fixed_type_permissions.as_ref()
    }

    pub fn conditional_permissions(&self) -> &[CumulativeRecordPermission] {
        &self.conditional_permissions
    }

    /// Query restriction for reads from the static rules alone: unrestricted
    /// when one read-capable rule is unfiltered, otherwise the OR of their
    /// query predicates. Denied when nothing is readable or no rule has a
    /// query form.
    pub fn read_query_filter(&self) -> &QueryAccess {
        &self.read_query_filter
    }

    pub fn check_type(&self, requested: AccessType) -> TypeAccess {
        match &self.fixed_type_permissions {
            None => TypeAccess::Unknown,
            Some(fixed) if !fixed.access.allows(requested) => TypeAccess::Denied,
            Some(fixed) if fixed.has_filter => TypeAccess::AllowedWithFilter,
            Some(_) => TypeAccess::Allowed,
        }
    }

    pub fn record_permission(&self, record: &dyn Record, ctx: &OperationContext) -> UserRecordPermission {
        if let Some(fixed) = &self.fixed_record_permissions {
            return fixed.clone();
        }
        self.conditional_permissions
            .iter()
            .filter(|rule| rule.applies_to(record, ctx))
            .fold(UserRecordPermission::denied(), |acc, rule| acc.merge(&rule.permission))
    }

    /// Query restriction for reads, accounting for dynamic rules enabled in `ctx`.
    pub fn query_access(&self, ctx: &OperationContext) -> QueryAccess {
        read_predicate(self.conditional_permissions.iter().filter(|r| r.is_active(ctx)))
            .unwrap_or(QueryAccess::Denied)
    }
}

/// Combine the read-capable rules among `rules`. `None` when none of them
/// grants peek or read.
fn read_predicate<'a>(
    rules: impl Iterator<Item = &'a CumulativeRecordPermission>,
) -> Option<QueryAccess> {
    let mut readable = false;
    let mut predicates = Vec::new();
    for rule in rules.filter(|r| r.permission.access().can_peek_or_read()) {
        readable = true;
        match &rule.filter {
            None => return Some(QueryAccess::Unrestricted),
            Some(filter) => predicates.extend(filter.query().cloned()),
        }
    }
    if !readable {
        return None;
    }
    Some(QueryPredicate::any_of(predicates).map_or(QueryAccess::Denied, QueryAccess::Filtered))
}
