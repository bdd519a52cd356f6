//! Entity authorization engine.
//!
//! Answers, cheaply and repeatedly, whether a principal holding a set of
//! roles may peek, read, create, update or delete an entity type, a single
//! record, or a single field of a record, and whether it holds object-level
//! or custom permissions.
//!
//! # Architecture Overview
//!
//! 1. **Permission model**: [`AccessType`] flags, entity resources with
//!    optional field masks, and the closed [`Permission`] enum.
//! 2. **Policy graph**: [`Activity`] bundles permissions, [`Role`] grants
//!    activities, optionally restricted by an [`AuthorizationFilter`] or
//!    gated by a [`DynamicGrant`]. Both hierarchies are cycle-checked DAGs.
//! 3. **Closure builder**: each role expands once into the (permission,
//!    grant) pairs it holds through child roles and child activities.
//! 4. **Assembler**: [`build_authority`] merges the pairs of a role set into
//!    per-entity-type rules and precomputes type-level and record-level
//!    shortcuts.
//! 5. **Evaluator**: [`Authority`] answers type, record, field, object,
//!    custom and query-filter questions without locking.
//! 6. **Dynamic grants**: [`DynamicGrant::execute`] activates a grant for the
//!    lifetime of an [`ActivationScope`] within one [`OperationContext`].
//!
//! Authorities are shared per role set through an [`AuthorityCache`], and
//! policy graphs can be declared in YAML with a [`PolicyLoader`].
//!
//! # Example
//!
//! ```
//! use authz::{build_authority, AccessType, Activity, EntityGroupPermission,
//!     EntityGroupResource, OperationContext, Role, TypeAccess};
//! use entities::{EntityDefinition, EntityModel, Field, FieldType, GenericRecord};
//! use std::sync::Arc;
//!
//! let model = EntityModel::from_definitions(vec![EntityDefinition::new(
//!     "document",
//!     "Document",
//!     vec![Field::new("title", FieldType::Text, "Title")],
//! )])
//! .unwrap();
//!
//! let read_docs = EntityGroupPermission::new(
//!     "read_docs",
//!     AccessType::READ,
//!     vec![Arc::new(EntityGroupResource::of_entities("docs", ["document"]))],
//! );
//! let viewer = Role::new("viewer");
//! viewer.grant(Activity::with_permissions("view", [read_docs.into()]));
//!
//! let authority = build_authority(&[viewer], &model).unwrap();
//! assert_eq!(authority.check_type("document", AccessType::READ), TypeAccess::Allowed);
//!
//! let ctx = OperationContext::for_user("request", "alice");
//! let record = GenericRecord::new("document").with("title", "Hello");
//! assert!(authority.check_field(&record, "title", AccessType::READ, &ctx));
//! assert!(!authority.check_record(&record, AccessType::UPDATE, &ctx));
//! ```

pub mod access;
pub mod activity;
pub mod authority;
pub mod cache;
pub mod closure;
pub mod config;
pub mod context;
pub mod dynamic;
pub mod entity_permission;
pub mod error;
pub mod filter;
pub mod grant;
pub mod permission;
pub mod record_permission;
pub mod resource;
pub mod role;

pub use access::AccessType;
pub use activity::{Activity, ActivityClosure};
pub use authority::{build_authority, Authority};
pub use cache::AuthorityCache;
pub use closure::{GrantedPermission, RuntimeRoleData};
pub use config::{PolicyLoader, PolicySet};
pub use context::{OperationContext, USER_ID_KEY};
pub use dynamic::{ActivationKey, ActivationScope, DynamicGrant};
pub use entity_permission::{
    CumulativeRecordPermission, FixedTypePermission, QueryAccess, TypeAccess,
    UserEntityPermissionSet,
};
pub use error::{AuthzError, Result};
pub use filter::{AuthorizationFilter, EntityFilter, FilterUse, QueryPredicate, RecordPredicate};
pub use grant::{ActivityGrant, GrantId};
pub use permission::{
    type_key, CustomPermission, EntityGroupPermission, ObjectAccessPermission, Permission,
};
pub use record_permission::{OperationPermission, UserRecordPermission};
pub use resource::{EntityGroupResource, EntityResource};
pub use role::Role;
