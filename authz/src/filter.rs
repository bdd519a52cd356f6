//! Authorization filters: row-level restrictions attached to grants.
//!
//! A filter is a pair of tables keyed by entity type. The record table holds
//! predicates evaluated in memory against a loaded record; the query table
//! holds predicates a data layer folds into its queries. The engine never
//! looks inside either form: record predicates are called, query predicates
//! are OR-combined and compared for equality.

use crate::context::OperationContext;
use bitflags::bitflags;
use entities::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Which forms of a filter exist for an entity type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FilterUse: u8 {
        /// In-memory check against loaded records
        const ENTITIES = 1 << 0;
        /// Predicate injected into queries
        const QUERY    = 1 << 1;
        const ALL = Self::ENTITIES.bits() | Self::QUERY.bits();
    }
}

/// In-memory record predicate.
pub type RecordPredicate = Arc<dyn Fn(&dyn Record, &OperationContext) -> bool + Send + Sync>;

/// Query-side predicate, opaque to the engine beyond OR and equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryPredicate {
    /// An expression in the data layer's own predicate language
    Expr(String),
    Or(Vec<QueryPredicate>),
}

impl QueryPredicate {
    pub fn expr(text: impl Into<String>) -> Self {
        QueryPredicate::Expr(text.into())
    }

    /// Logical OR, flattening nested disjunctions and skipping duplicates.
    pub fn or(self, other: QueryPredicate) -> QueryPredicate {
        let mut terms = match self {
            QueryPredicate::Or(terms) => terms,
            single => vec![single],
        };
        let others = match other {
            QueryPredicate::Or(terms) => terms,
            single => vec![single],
        };
        for term in others {
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        if terms.len() == 1 {
            terms.pop().unwrap_or(QueryPredicate::Or(Vec::new()))
        } else {
            QueryPredicate::Or(terms)
        }
    }

    /// OR together any number of predicates; `None` when there are none.
    pub fn any_of(predicates: impl IntoIterator<Item = QueryPredicate>) -> Option<QueryPredicate> {
        predicates.into_iter().reduce(QueryPredicate::or)
    }
}

impl fmt::Display for QueryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPredicate::Expr(text) => write!(f, "{}", text),
            QueryPredicate::Or(terms) => {
                let parts: Vec<String> = terms.iter().map(|t| format!("({})", t)).collect();
                write!(f, "{}", parts.join(" OR "))
            }
        }
    }
}

/// A named filter with per-entity-type predicates.
pub struct AuthorizationFilter {
    name: String,
    record_filters: HashMap<String, RecordPredicate>,
    query_filters: HashMap<String, QueryPredicate>,
}

impl AuthorizationFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record_filters: HashMap::new(),
            query_filters: HashMap::new(),
        }
    }

    /// Add an in-memory predicate for an entity type
    pub fn with_record_filter<F>(mut self, entity_type: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&dyn Record, &OperationContext) -> bool + Send + Sync + 'static,
    {
        self.record_filters
            .insert(entity_type.into(), Arc::new(predicate));
        self
    }

    /// Add a query predicate for an entity type
    pub fn with_query_filter(
        mut self,
        entity_type: impl Into<String>,
        predicate: QueryPredicate,
    ) -> Self {
        self.query_filters.insert(entity_type.into(), predicate);
        self
    }

    /// Add both forms for an entity type at once
    pub fn with_filter<F>(
        self,
        entity_type: impl Into<String>,
        predicate: F,
        query: QueryPredicate,
    ) -> Self
    where
        F: Fn(&dyn Record, &OperationContext) -> bool + Send + Sync + 'static,
    {
        let entity_type = entity_type.into();
        self.with_record_filter(entity_type.clone(), predicate)
            .with_query_filter(entity_type, query)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Which forms this filter provides for an entity type
    pub fn uses_for(&self, entity_type: &str) -> FilterUse {
        let mut uses = FilterUse::empty();
        if self.record_filters.contains_key(entity_type) {
            uses |= FilterUse::ENTITIES;
        }
        if self.query_filters.contains_key(entity_type) {
            uses |= FilterUse::QUERY;
        }
        uses
    }

    /// Does this filter restrict `entity_type` at all?
    pub fn applies_to(&self, entity_type: &str) -> bool {
        !self.uses_for(entity_type).is_empty()
    }

    /// The filter's predicates for one entity type, if it restricts that type.
    pub fn for_entity(&self, entity_type: &str) -> Option<EntityFilter> {
        if !self.applies_to(entity_type) {
            return None;
        }
        Some(EntityFilter {
            filter_name: self.name.clone(),
            entity_type: entity_type.to_string(),
            record: self.record_filters.get(entity_type).cloned(),
            query: self.query_filters.get(entity_type).cloned(),
        })
    }

    /// Evaluate the filter against a record.
    ///
    /// A filter without a record predicate for the record's type cannot
    /// vouch for it and does not match.
    pub fn matches_record(&self, record: &dyn Record, ctx: &OperationContext) -> bool {
        self.record_filters
            .get(record.entity_type())
            .map_or(false, |predicate| predicate(record, ctx))
    }
}

impl fmt::Debug for AuthorizationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut record_types: Vec<&String> = self.record_filters.keys().collect();
        record_types.sort();
        f.debug_struct("AuthorizationFilter")
            .field("name", &self.name)
            .field("record_filters", &record_types)
            .field("query_filters", &self.query_filters)
            .finish()
    }
}

/// The slice of an [`AuthorizationFilter`] that applies to one entity type.
#[derive(Clone)]
pub struct EntityFilter {
    filter_name: String,
    entity_type: String,
    record: Option<RecordPredicate>,
    query: Option<QueryPredicate>,
}

impl EntityFilter {
    pub fn filter_name(&self) -> &str {
        &self.filter_name
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn query(&self) -> Option<&QueryPredicate> {
        self.query.as_ref()
    }

    pub fn uses(&self) -> FilterUse {
        let mut uses = FilterUse::empty();
        if self.record.is_some() {
            uses |= FilterUse::ENTITIES;
        }
        if self.query.is_some() {
            uses |= FilterUse::QUERY;
        }
        uses
    }

    /// Evaluate against a record; without a record form nothing matches.
    pub fn matches(&self, record: &dyn Record, ctx: &OperationContext) -> bool {
        self.record
            .as_ref()
            .map_or(false, |predicate| predicate(record, ctx))
    }

    /// Identity comparison: the same record predicate instance and an equal
    /// query predicate. Behaviourally equivalent predicates built separately
    /// are different filters.
    pub fn same_as(&self, other: &EntityFilter) -> bool {
        let same_record = match (&self.record, &other.record) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_record && self.query == other.query
    }
}

impl fmt::Debug for EntityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityFilter")
            .field("filter", &self.filter_name)
            .field("entity_type", &self.entity_type)
            .field("uses", &self.uses())
            .field("query", &self.query)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entities::GenericRecord;
    use serde_json::json;

    fn own_documents() -> AuthorizationFilter {
        AuthorizationFilter::new("own_documents").with_filter(
            "document",
            |record, ctx| ctx.user_id().as_ref() == record.get("owner"),
            QueryPredicate::expr("owner = @user_id"),
        )
    }

    #[test]
    fn test_record_matching() {
        let filter = own_documents();
        let ctx = OperationContext::for_user("req", "alice");
        let mine = GenericRecord::new("document").with("owner", "alice");
        let theirs = GenericRecord::new("document").with("owner", "bob");
        let other_type = GenericRecord::new("invoice").with("owner", "alice");

        assert!(filter.matches_record(&mine, &ctx));
        assert!(!filter.matches_record(&theirs, &ctx));
        assert!(!filter.matches_record(&other_type, &ctx));
    }

    #[test]
    fn test_uses_and_applies_to() {
        let filter = own_documents()
            .with_query_filter("invoice", QueryPredicate::expr("tenant = @tenant"));
        assert_eq!(filter.uses_for("document"), FilterUse::ALL);
        assert_eq!(filter.uses_for("invoice"), FilterUse::QUERY);
        assert!(!filter.applies_to("loan"));
        assert!(filter.for_entity("loan").is_none());
        assert_eq!(
            filter.for_entity("invoice").map(|f| f.uses()),
            Some(FilterUse::QUERY)
        );
    }

    #[test]
    fn test_entity_filter_identity() {
        let filter = own_documents();
        let a = filter.for_entity("document").unwrap();
        let b = filter.for_entity("document").unwrap();
        assert!(a.same_as(&b));

        // same behaviour, separately built: not the same filter
        let twin = own_documents().for_entity("document").unwrap();
        assert!(!a.same_as(&twin));

        let ctx = OperationContext::new("req");
        ctx.set_value(crate::context::USER_ID_KEY, json!("alice"));
        assert!(a.matches(&GenericRecord::new("document").with("owner", "alice"), &ctx));
    }

    #[test]
    fn test_query_predicate_or() {
        let a = QueryPredicate::expr("a");
        let b = QueryPredicate::expr("b");
        let c = QueryPredicate::expr("c");

        let ab = a.clone().or(b.clone());
        assert_eq!(ab, QueryPredicate::Or(vec![a.clone(), b.clone()]));
        assert_eq!(ab.clone().or(c.clone()).to_string(), "(a) OR (b) OR (c)");
        assert_eq!(a.clone().or(a.clone()), a);
        assert_eq!(QueryPredicate::any_of(Vec::new()), None);
        assert_eq!(QueryPredicate::any_of(vec![b.clone()]), Some(b));
    }
}
