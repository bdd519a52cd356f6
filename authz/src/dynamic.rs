//! Dynamic grants: permissions that only apply while explicitly activated
//! within an operation context.
//!
//! Activation is counted per context, so nested activations of the same
//! grant stack and the grant stays enabled until the outermost scope ends.

use crate::activity::Activity;
use crate::context::OperationContext;
use crate::error::{AuthzError, Result};
use crate::filter::AuthorizationFilter;
use entities::Record;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static NEXT_ACTIVATION_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique key of a dynamic grant's activation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActivationKey(u64);

impl ActivationKey {
    pub(crate) fn next() -> Self {
        ActivationKey(NEXT_ACTIVATION_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ActivationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dyn{}", self.0)
    }
}

/// The activation side of a dynamically granted activity.
pub struct DynamicGrant {
    key: ActivationKey,
    activity: Arc<Activity>,
    document_key: Option<String>,
    check_filter: Option<Arc<AuthorizationFilter>>,
}

impl DynamicGrant {
    /// `document_key` names the context value that holds the root record id
    /// while active; `check_filter` must accept the root record for
    /// activation to succeed.
    pub fn new(
        activity: Arc<Activity>,
        document_key: Option<String>,
        check_filter: Option<Arc<AuthorizationFilter>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            key: ActivationKey::next(),
            activity,
            document_key,
            check_filter,
        })
    }

    pub fn key(&self) -> ActivationKey {
        self.key
    }

    pub fn activity(&self) -> &Arc<Activity> {
        &self.activity
    }

    pub fn document_key(&self) -> Option<&str> {
        self.document_key.as_deref()
    }

    pub fn check_filter(&self) -> Option<&Arc<AuthorizationFilter>> {
        self.check_filter.as_ref()
    }

    /// Activate the grant in `ctx`.
    ///
    /// With a check filter, `root` is required and must match it; a rejected
    /// activation leaves the context unchanged. The document key receives
    /// `root_id`, or the root record's own id when `root_id` is `None`.
    pub fn begin(
        &self,
        ctx: &OperationContext,
        root: Option<&dyn Record>,
        root_id: Option<JsonValue>,
    ) -> Result<()> {
        self.activate(ctx, root, root_id).map(|_| ())
    }

    fn activate(
        &self,
        ctx: &OperationContext,
        root: Option<&dyn Record>,
        root_id: Option<JsonValue>,
    ) -> Result<Option<DocumentBinding>> {
        if let Some(filter) = &self.check_filter {
            let root = root.ok_or_else(|| AuthzError::RootRecordRequired {
                activity: self.activity.name().to_string(),
                context: ctx.name().to_string(),
            })?;
            if !filter.matches_record(root, ctx) {
                let entity_type = root.entity_type().to_string();
                let record = root
                    .id()
                    .map_or_else(|| "<no id>".to_string(), display_id);
                warn!(
                    activity = %self.activity.name(),
                    entity = %entity_type,
                    %record,
                    context = %ctx.name(),
                    "dynamic grant activation rejected"
                );
                return Err(AuthzError::AccessDenied {
                    access: self.activity.access_for(&entity_type),
                    entity_type,
                    record,
                    context: ctx.name().to_string(),
                });
            }
        }

        let mut binding = None;
        if let Some(document_key) = &self.document_key {
            let id = root_id.or_else(|| root.and_then(|r| r.id().cloned()));
            if let Some(id) = id {
                binding = Some(DocumentBinding {
                    previous: ctx.get_value(document_key),
                    value: id.clone(),
                });
                ctx.set_value(document_key.clone(), id);
            }
        }

        let count = ctx.increment_activation(self.key);
        debug!(activity = %self.activity.name(), key = %self.key, count, "dynamic grant activated");
        Ok(binding)
    }

    /// Close one activation. The document key is cleared when the last
    /// activation in the context ends.
    pub fn end(&self, ctx: &OperationContext) {
        self.release(ctx, None);
    }

    fn release(&self, ctx: &OperationContext, binding: Option<&DocumentBinding>) {
        let remaining = ctx.decrement_activation(self.key);
        if let Some(document_key) = &self.document_key {
            if remaining == 0 {
                ctx.remove_value(document_key);
            } else if let Some(binding) = binding {
                // only undo our own value; a newer open scope may own the key now
                if ctx.get_value(document_key).as_ref() == Some(&binding.value) {
                    match &binding.previous {
                        Some(previous) => ctx.set_value(document_key.clone(), previous.clone()),
                        None => {
                            ctx.remove_value(document_key);
                        }
                    }
                }
            }
        }
        debug!(activity = %self.activity.name(), key = %self.key, remaining, "dynamic grant released");
    }

    pub fn is_enabled(&self, ctx: &OperationContext) -> bool {
        ctx.activation_count(self.key) > 0
    }

    /// Activate for the lifetime of the returned scope.
    ///
    /// Scopes nest: when an inner scope ends while an outer one is still
    /// open, the document key goes back to the value it held before the
    /// inner scope began. The key is removed once the last activation in the
    /// context ends, whatever order the scopes close in.
    pub fn execute<'a>(
        &'a self,
        ctx: &'a OperationContext,
        root: Option<&dyn Record>,
        root_id: Option<JsonValue>,
    ) -> Result<ActivationScope<'a>> {
        let binding = self.activate(ctx, root, root_id)?;
        Ok(ActivationScope {
            grant: self,
            ctx,
            binding,
            open: true,
        })
    }
}

/// The document key value one activation wrote, and what it replaced.
#[derive(Debug)]
struct DocumentBinding {
    value: JsonValue,
    previous: Option<JsonValue>,
}

fn display_id(id: &JsonValue) -> String {
    id.as_str().map_or_else(|| id.to_string(), str::to_string)
}

impl fmt::Debug for DynamicGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicGrant")
            .field("key", &self.key)
            .field("activity", &self.activity.name())
            .field("document_key", &self.document_key)
            .field("check_filter", &self.check_filter.as_ref().map(|f| f.name().to_string()))
            .finish()
    }
}

/// An open activation; ends exactly once, on `close` or on drop.
#[derive(Debug)]
#[must_use = "the grant is deactivated as soon as the scope is dropped"]
pub struct ActivationScope<'a> {
    grant: &'a DynamicGrant,
    ctx: &'a OperationContext,
    binding: Option<DocumentBinding>,
    open: bool,
}

impl ActivationScope<'_> {
    pub fn grant(&self) -> &DynamicGrant {
        self.grant
    }

    /// End the activation now
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if std::mem::replace(&mut self.open, false) {
            self.grant.release(self.ctx, self.binding.as_ref());
        }
    }
}

impl Drop for ActivationScope<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entities::GenericRecord;
    use serde_json::json;

    fn pending_only() -> Arc<AuthorizationFilter> {
        Arc::new(AuthorizationFilter::new("pending").with_record_filter("loan", |r, _| {
            r.get("status") == Some(&json!("Pending"))
        }))
    }

    fn review_grant() -> Arc<DynamicGrant> {
        DynamicGrant::new(
            Activity::new("review_loan"),
            Some("LoanId".to_string()),
            Some(pending_only()),
        )
    }

    #[test]
    fn test_nested_scopes_count() {
        let grant = DynamicGrant::new(Activity::new("a"), None, None);
        let ctx = OperationContext::new("req");
        assert!(!grant.is_enabled(&ctx));
        {
            let _outer = grant.execute(&ctx, None, None).unwrap();
            {
                let _inner = grant.execute(&ctx, None, None).unwrap();
                assert!(grant.is_enabled(&ctx));
            }
            assert!(grant.is_enabled(&ctx));
        }
        assert!(!grant.is_enabled(&ctx));
    }

    #[test]
    fn test_close_ends_once() {
        let grant = DynamicGrant::new(Activity::new("a"), None, None);
        let ctx = OperationContext::new("req");
        grant.begin(&ctx, None, None).unwrap();
        let scope = grant.execute(&ctx, None, None).unwrap();
        scope.close();
        // closing did not also run a second end on drop
        assert!(grant.is_enabled(&ctx));
        grant.end(&ctx);
        assert!(!grant.is_enabled(&ctx));
    }

    #[test]
    fn test_document_key_set_while_active() {
        let grant = review_grant();
        let ctx = OperationContext::new("req");
        let loan = GenericRecord::new("loan").with("id", 7).with("status", "Pending");
        {
            let _scope = grant.execute(&ctx, Some(&loan), None).unwrap();
            assert_eq!(ctx.get_value("LoanId"), Some(json!(7)));
        }
        assert_eq!(ctx.get_value("LoanId"), None);
    }

    #[test]
    fn test_inner_scope_restores_document_key() {
        let grant = review_grant();
        let ctx = OperationContext::new("req");
        let first = GenericRecord::new("loan").with("id", 1).with("status", "Pending");
        let second = GenericRecord::new("loan").with("id", 2).with("status", "Pending");

        let outer = grant.execute(&ctx, Some(&first), None).unwrap();
        {
            let _inner = grant.execute(&ctx, Some(&second), None).unwrap();
            assert_eq!(ctx.get_value("LoanId"), Some(json!(2)));
        }
        assert_eq!(ctx.get_value("LoanId"), Some(json!(1)));
        outer.close();
        assert_eq!(ctx.get_value("LoanId"), None);
    }

    #[test]
    fn test_rejected_activation_leaves_context_untouched() {
        let grant = review_grant();
        let ctx = OperationContext::new("req-9");
        ctx.set_value("LoanId", "previous");
        let loan = GenericRecord::new("loan").with("id", 8).with("status", "Approved");

        let err = grant.begin(&ctx, Some(&loan), Some(json!(8))).unwrap_err();
        match err {
            AuthzError::AccessDenied {
                entity_type,
                context,
                record,
                ..
            } => {
                assert_eq!(entity_type, "loan");
                assert_eq!(context, "req-9");
                assert_eq!(record, "8");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!grant.is_enabled(&ctx));
        assert_eq!(ctx.get_value("LoanId"), Some(json!("previous")));
        assert_eq!(ctx.active_grant_count(), 0);
    }

    #[test]
    fn test_check_filter_requires_root() {
        let grant = review_grant();
        let ctx = OperationContext::new("req");
        let err = grant.execute(&ctx, None, Some(json!(1))).err().unwrap();
        assert!(matches!(err, AuthzError::RootRecordRequired { .. }));
        assert!(err.is_authorization());
        assert!(!grant.is_enabled(&ctx));
    }
}
