//! Error types for the authorization engine.
//!
//! Two families live here. Configuration errors come out of `init` and
//! policy loading and mean the permission graph is unusable; callers should
//! abort startup. Authorization errors come out of dynamic grant activation
//! and are ordinary, recoverable denials addressed to the caller.
//!
//! Plain evaluation denials are not errors: record and type checks return
//! `false` / `Denied` values instead.

use crate::access::AccessType;
use thiserror::Error;

/// Errors that can occur while configuring or using the authorization engine.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// An activity is its own descendant.
    #[error("Activity '{0}' is its own descendant")]
    ActivityCycle(String),

    /// A role is its own descendant.
    #[error("Role '{0}' is its own descendant")]
    RoleCycle(String),

    /// A resource references an entity type the model does not contain.
    #[error("Resource references unknown entity type '{0}'")]
    UnknownEntityType(String),

    /// A resource references a field its entity type does not declare.
    #[error("Resource references unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    /// A permission that requires targets was declared without any.
    #[error("Permission '{0}' has no resources")]
    EmptyPermission(String),

    /// A policy document references a name that was never declared.
    #[error("Unknown {kind} '{name}'")]
    UnknownReference { kind: &'static str, name: String },

    /// A name was declared twice in a policy document.
    #[error("Duplicate {kind} '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    /// A policy document could not be parsed.
    #[error("Policy parsing failed: {0}")]
    PolicyParse(String),

    /// The entity model rejected a lookup during initialization.
    #[error("Entity model error: {0}")]
    Entities(#[from] entities::EntitiesError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A dynamic grant's activation check rejected the root record.
    #[error("Access denied: {access} on '{entity_type}' (record {record}, context '{context}')")]
    AccessDenied {
        entity_type: String,
        access: AccessType,
        record: String,
        context: String,
    },

    /// A dynamic grant with an activation check was started without a root record.
    #[error("Activation of '{activity}' requires a root record (context '{context}')")]
    RootRecordRequired { activity: String, context: String },
}

impl AuthzError {
    /// True for errors that indicate a broken permission graph or policy file.
    pub fn is_configuration(&self) -> bool {
        !self.is_authorization()
    }

    /// True for runtime denials raised while activating dynamic grants.
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            AuthzError::AccessDenied { .. } | AuthzError::RootRecordRequired { .. }
        )
    }
}

/// A specialized Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthzError::RoleCycle("editor".to_string());
        assert_eq!(err.to_string(), "Role 'editor' is its own descendant");

        let err = AuthzError::UnknownReference {
            kind: "activity",
            name: "edit_docs".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown activity 'edit_docs'");

        let err = AuthzError::AccessDenied {
            entity_type: "loan".to_string(),
            access: AccessType::UPDATE,
            record: "L-1".to_string(),
            context: "request-7".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("loan"));
        assert!(text.contains("request-7"));
    }

    #[test]
    fn test_error_classification() {
        assert!(AuthzError::ActivityCycle("a".into()).is_configuration());
        assert!(AuthzError::EmptyPermission("p".into()).is_configuration());
        assert!(AuthzError::RootRecordRequired {
            activity: "review".into(),
            context: "ctx".into(),
        }
        .is_authorization());
    }
}
