//! Effective permissions on a single record.
//!
//! Three operations are tracked with field precision: peek, read and
//! update. Each is `Denied`, `AllowAll`, or `AllowMasked` with the set of
//! visible fields. Combining two grants never takes anything away:
//!
//! * `Denied ⊕ x = x`
//! * `AllowAll ⊕ x = AllowAll`
//! * `AllowMasked(a) ⊕ AllowMasked(b) = AllowMasked(a ∪ b)`

use crate::access::AccessType;
use fields::FieldMask;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "fields")]
pub enum OperationPermission {
    #[default]
    Denied,
    AllowAll,
    AllowMasked(FieldMask),
}

impl OperationPermission {
    /// The state a single grant produces: allowed on the masked fields, or on
    /// every field when there is no mask.
    pub fn granted(mask: Option<&FieldMask>) -> Self {
        match mask {
            Some(mask) => OperationPermission::AllowMasked(mask.clone()),
            None => OperationPermission::AllowAll,
        }
    }

    pub fn is_allowed(&self) -> bool {
        !matches!(self, OperationPermission::Denied)
    }

    pub fn merge(&self, other: &OperationPermission) -> OperationPermission {
        let mut merged = self.clone();
        merged.merge_in(other);
        merged
    }

    pub fn merge_in(&mut self, other: &OperationPermission) {
        match other {
            OperationPermission::Denied => {}
            OperationPermission::AllowAll => *self = OperationPermission::AllowAll,
            OperationPermission::AllowMasked(theirs) => match self {
                OperationPermission::AllowAll => {}
                OperationPermission::AllowMasked(mine) => mine.union_with(theirs),
                OperationPermission::Denied => *self = other.clone(),
            },
        }
    }

    /// Field visibility under this state. System fields are visible whenever
    /// the operation is allowed at all.
    pub fn allows_field(&self, index: usize, system_field: bool) -> bool {
        match self {
            OperationPermission::Denied => false,
            OperationPermission::AllowAll => true,
            OperationPermission::AllowMasked(mask) => system_field || mask.contains(index),
        }
    }
}

/// Access to one record: the raw access union plus per-operation state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UserRecordPermission {
    access: AccessType,
    peek: OperationPermission,
    read: OperationPermission,
    update: OperationPermission,
}

impl UserRecordPermission {
    pub fn denied() -> Self {
        Self::default()
    }

    /// The permission one grant of `access` on `mask` yields.
    pub fn from_access(access: AccessType, mask: Option<&FieldMask>) -> Self {
        let state = |flag: AccessType| {
            if access.contains(flag) {
                OperationPermission::granted(mask)
            } else {
                OperationPermission::Denied
            }
        };
        Self {
            access,
            peek: state(AccessType::PEEK),
            read: state(AccessType::READ_STRICT),
            update: state(AccessType::UPDATE_STRICT),
        }
    }

    pub fn access(&self) -> AccessType {
        self.access
    }

    pub fn peek(&self) -> &OperationPermission {
        &self.peek
    }

    pub fn read(&self) -> &OperationPermission {
        &self.read
    }

    pub fn update(&self) -> &OperationPermission {
        &self.update
    }

    pub fn is_denied(&self) -> bool {
        self.access.is_empty()
    }

    pub fn merge_in(&mut self, other: &UserRecordPermission) {
        self.access |= other.access;
        self.peek.merge_in(&other.peek);
        self.read.merge_in(&other.read);
        self.update.merge_in(&other.update);
    }

    pub fn merge(&self, other: &UserRecordPermission) -> UserRecordPermission {
        let mut merged = self.clone();
        merged.merge_in(other);
        merged
    }

    /// The tracked operation a request is judged by: update for anything
    /// writing, then read, then peek. `None` for requests touching none of
    /// the tracked operations.
    pub fn operation(&self, requested: AccessType) -> Option<&OperationPermission> {
        if requested.contains(AccessType::UPDATE_STRICT) {
            Some(&self.update)
        } else if requested.contains(AccessType::READ_STRICT) {
            Some(&self.read)
        } else if requested.contains(AccessType::PEEK) {
            Some(&self.peek)
        } else {
            None
        }
    }

    pub fn allows(&self, requested: AccessType) -> bool {
        self.access.allows(requested)
            && self.operation(requested).map_or(true, OperationPermission::is_allowed)
    }

    pub fn allows_field(&self, requested: AccessType, index: usize, system_field: bool) -> bool {
        if !self.access.allows(requested) {
            return false;
        }
        self.operation(requested)
            .map_or(true, |op| op.allows_field(index, system_field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn mask(bits: &[usize]) -> FieldMask {
        bits.iter().copied().collect()
    }

    #[rstest]
    #[case(OperationPermission::Denied, OperationPermission::Denied, OperationPermission::Denied)]
    #[case(OperationPermission::Denied, OperationPermission::AllowAll, OperationPermission::AllowAll)]
    #[case(OperationPermission::AllowAll, OperationPermission::Denied, OperationPermission::AllowAll)]
    #[case(
        OperationPermission::AllowMasked(mask(&[1])),
        OperationPermission::Denied,
        OperationPermission::AllowMasked(mask(&[1]))
    )]
    #[case(
        OperationPermission::AllowMasked(mask(&[1])),
        OperationPermission::AllowAll,
        OperationPermission::AllowAll
    )]
    #[case(
        OperationPermission::AllowMasked(mask(&[1])),
        OperationPermission::AllowMasked(mask(&[3, 70])),
        OperationPermission::AllowMasked(mask(&[1, 3, 70]))
    )]
    fn test_merge_rule(
        #[case] left: OperationPermission,
        #[case] right: OperationPermission,
        #[case] expected: OperationPermission,
    ) {
        assert_eq!(left.merge(&right), expected);
        assert_eq!(right.merge(&left), expected);
    }

    #[test]
    fn test_from_access_tracks_operations() {
        let fields = mask(&[0, 1]);
        let permission = UserRecordPermission::from_access(AccessType::UPDATE, Some(&fields));
        assert_eq!(permission.peek(), &OperationPermission::AllowMasked(fields.clone()));
        assert_eq!(permission.read(), &OperationPermission::AllowMasked(fields.clone()));
        assert_eq!(permission.update(), &OperationPermission::AllowMasked(fields));

        let peek_only = UserRecordPermission::from_access(AccessType::PEEK, None);
        assert_eq!(peek_only.peek(), &OperationPermission::AllowAll);
        assert_eq!(peek_only.read(), &OperationPermission::Denied);
        assert!(!peek_only.allows(AccessType::READ));
        assert!(peek_only.allows(AccessType::PEEK));
    }

    #[test]
    fn test_field_visibility() {
        let permission = UserRecordPermission::from_access(AccessType::READ, Some(&mask(&[2])));
        assert!(permission.allows_field(AccessType::READ, 2, false));
        assert!(!permission.allows_field(AccessType::READ, 3, false));
        // system fields ride along with any allowed operation
        assert!(permission.allows_field(AccessType::READ, 0, true));
        assert!(!permission.allows_field(AccessType::UPDATE, 2, false));
    }

    #[test]
    fn test_denied_allows_nothing() {
        let denied = UserRecordPermission::denied();
        assert!(denied.is_denied());
        assert!(!denied.allows(AccessType::PEEK));
        assert!(!denied.allows_field(AccessType::READ, 0, true));
    }

    #[test]
    fn test_untracked_access_uses_raw_union() {
        let permission = UserRecordPermission::from_access(AccessType::API_GET | AccessType::CUSTOM_1, None);
        assert!(permission.allows(AccessType::API_GET));
        assert!(!permission.allows(AccessType::API_POST));
        assert!(permission.allows_field(AccessType::CUSTOM_1, 5, false));
    }
}
