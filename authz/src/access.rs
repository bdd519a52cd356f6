//! Access type flags.
//!
//! Base bits are the strict operations; everything else is a named union of
//! base bits computed once in the flag table. Checks are bitwise containment.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Operations that a permission grants or a caller requests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AccessType: u32 {
        /// See that a record exists and use it in lookups.
        const PEEK          = 1 << 0;
        /// Read field values.
        const READ_STRICT   = 1 << 1;
        const CREATE_STRICT = 1 << 2;
        const UPDATE_STRICT = 1 << 3;
        const DELETE_STRICT = 1 << 4;

        /// Transport-level verbs.
        const API_GET    = 1 << 8;
        const API_POST   = 1 << 9;
        const API_PUT    = 1 << 10;
        const API_DELETE = 1 << 11;

        /// Reserved for application-defined meanings.
        const CUSTOM_1 = 1 << 16;
        const CUSTOM_2 = 1 << 17;
        const CUSTOM_3 = 1 << 18;
        const CUSTOM_4 = 1 << 19;
        const CUSTOM_5 = 1 << 20;
        const CUSTOM_6 = 1 << 21;
        const CUSTOM_7 = 1 << 22;
        const CUSTOM_8 = 1 << 23;

        const READ   = Self::PEEK.bits() | Self::READ_STRICT.bits();
        const CREATE = Self::CREATE_STRICT.bits() | Self::READ.bits();
        const UPDATE = Self::UPDATE_STRICT.bits() | Self::READ.bits();
        const DELETE = Self::DELETE_STRICT.bits() | Self::READ.bits();
        const CREATE_UPDATE = Self::CREATE.bits() | Self::UPDATE.bits();
        const CRUD   = Self::CREATE.bits() | Self::UPDATE.bits() | Self::DELETE.bits();

        const API_ALL = Self::API_GET.bits()
            | Self::API_POST.bits()
            | Self::API_PUT.bits()
            | Self::API_DELETE.bits();
    }
}

impl AccessType {
    /// Check that every requested bit is granted. An empty request is never allowed.
    pub fn allows(self, requested: AccessType) -> bool {
        !requested.is_empty() && self.contains(requested)
    }

    /// True if the set grants peek or strict read.
    pub fn can_peek_or_read(self) -> bool {
        self.intersects(AccessType::READ)
    }

    /// Parse a `|`-separated list of flag names, case-insensitive
    /// (`"read"`, `"update_strict|api_get"`). `"none"` and the empty string
    /// parse to the empty set.
    pub fn parse(text: &str) -> Option<AccessType> {
        let mut access = AccessType::empty();
        for part in text.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            let upper = part.to_ascii_uppercase();
            if upper == "NONE" {
                continue;
            }
            access |= AccessType::from_name(&upper)?;
        }
        Some(access)
    }

    /// Parse and OR together a list of flag expressions.
    pub fn parse_all<S: AsRef<str>>(parts: &[S]) -> Option<AccessType> {
        parts
            .iter()
            .try_fold(AccessType::empty(), |acc, p| Some(acc | Self::parse(p.as_ref())?))
    }
}

impl Default for AccessType {
    fn default() -> Self {
        AccessType::empty()
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<String> = self
            .iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_derived_unions_are_base_bits() {
        assert_eq!(AccessType::READ, AccessType::PEEK | AccessType::READ_STRICT);
        assert!(AccessType::UPDATE.contains(AccessType::READ));
        assert!(AccessType::CRUD.contains(AccessType::DELETE_STRICT));
        assert!(!AccessType::CRUD.intersects(AccessType::API_ALL));
    }

    #[test]
    fn test_allows() {
        let granted = AccessType::READ | AccessType::UPDATE_STRICT;
        assert!(granted.allows(AccessType::PEEK));
        assert!(granted.allows(AccessType::UPDATE));
        assert!(!granted.allows(AccessType::DELETE));
        assert!(!granted.allows(AccessType::empty()));
        assert!(AccessType::PEEK.can_peek_or_read());
        assert!(!AccessType::CREATE_STRICT.can_peek_or_read());
    }

    #[rstest]
    #[case("read", AccessType::READ)]
    #[case("Update_Strict", AccessType::UPDATE_STRICT)]
    #[case("peek | api_get", AccessType::PEEK | AccessType::API_GET)]
    #[case("none", AccessType::empty())]
    #[case("custom_3", AccessType::CUSTOM_3)]
    fn test_parse(#[case] text: &str, #[case] expected: AccessType) {
        assert_eq!(AccessType::parse(text), Some(expected));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(AccessType::parse("read|fly"), None);
        assert_eq!(
            AccessType::parse_all(&["peek", "delete_strict"]),
            Some(AccessType::PEEK | AccessType::DELETE_STRICT)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(AccessType::empty().to_string(), "none");
        assert_eq!(AccessType::READ.to_string(), "peek|read_strict");
    }
}
