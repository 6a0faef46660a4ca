//! # Identifier Newtypes
//!
//! Newtype wrappers for every identifier namespace in the audit domain.
//! A `UserId` cannot be passed where an `AggregateId` is expected.

use serde::{Deserialize, Serialize};
use uuid::{Uuid, Variant, Version};

use crate::error::CmateError;

macro_rules! uuid_newtype {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_newtype!(
    /// A CredentialMate user account.
    UserId,
    "user"
);
uuid_newtype!(
    /// A healthcare provider profile (the subject of licenses and CME).
    ProviderId,
    "provider"
);
uuid_newtype!(
    /// An organization that providers and admins belong to.
    OrgId,
    "org"
);
uuid_newtype!(
    /// An authenticated client session.
    SessionId,
    "session"
);
uuid_newtype!(
    /// Primary key of a sealed audit-store row.
    EventId,
    "event"
);
uuid_newtype!(
    /// The entity whose history a sequence of change events describes.
    AggregateId,
    "aggregate"
);

/// Identity of an issue in the triage log.
///
/// Only the canonical lowercase, hyphenated rendering of a version-4 UUID is
/// accepted: parsing then re-rendering must reproduce the input exactly.
/// Braced, URN, uppercase and simple forms are rejected so that two lines
/// can never refer to the same issue through different spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueId(Uuid);

impl IssueId {
    /// Generate a fresh UUID4 issue id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a canonical UUID4 string.
    pub fn parse(s: &str) -> Result<Self, CmateError> {
        let id = Uuid::parse_str(s)
            .map_err(|e| CmateError::identifier(s, e))?;
        if id.get_version() != Some(Version::Random) || id.get_variant() != Variant::RFC4122 {
            return Err(CmateError::identifier(s, "not a version 4 UUID"));
        }
        if id.hyphenated().to_string() != s {
            return Err(CmateError::identifier(
                s,
                "not in canonical lowercase hyphenated form",
            ));
        }
        Ok(Self(id))
    }

    /// Whether `s` is a canonical UUID4 string.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for IssueId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for IssueId {
    type Error = CmateError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<IssueId> for String {
    fn from(id: IssueId) -> Self {
        id.0.hyphenated().to_string()
    }
}

impl std::fmt::Display for IssueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for IssueId {
    type Err = CmateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_issue_id_is_valid() {
        let id = IssueId::new();
        assert!(IssueId::is_valid(&id.to_string()));
    }

    #[test]
    fn test_issue_id_accepts_canonical_v4() {
        let id = IssueId::parse("a16d7f13-4586-4fb8-ad91-24facc03042d").unwrap();
        assert_eq!(id.to_string(), "a16d7f13-4586-4fb8-ad91-24facc03042d");
    }

    #[test]
    fn test_issue_id_rejects_uppercase() {
        assert!(IssueId::parse("A16D7F13-4586-4FB8-AD91-24FACC03042D").is_err());
    }

    #[test]
    fn test_issue_id_rejects_simple_and_braced_forms() {
        assert!(IssueId::parse("a16d7f1345864fb8ad9124facc03042d").is_err());
        assert!(IssueId::parse("{a16d7f13-4586-4fb8-ad91-24facc03042d}").is_err());
    }

    #[test]
    fn test_issue_id_rejects_other_versions() {
        // Version 1 (time-based).
        assert!(IssueId::parse("c232ab00-9414-11ec-b3c8-9f6bdeced846").is_err());
        // Nil UUID.
        assert!(IssueId::parse("00000000-0000-0000-0000-000000000000").is_err());
    }

    #[test]
    fn test_issue_id_rejects_garbage() {
        assert!(IssueId::parse("not-a-uuid").is_err());
        assert!(IssueId::parse("").is_err());
    }

    #[test]
    fn test_issue_id_serde_is_string() {
        let id = IssueId::parse("a16d7f13-4586-4fb8-ad91-24facc03042d").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"a16d7f13-4586-4fb8-ad91-24facc03042d\"");
        assert!(serde_json::from_str::<IssueId>("\"nope\"").is_err());
    }

    #[test]
    fn test_newtype_display_prefix() {
        let id = UserId(Uuid::nil());
        assert_eq!(id.to_string(), "user:00000000-0000-0000-0000-000000000000");
        let agg = AggregateId(Uuid::nil());
        assert!(agg.to_string().starts_with("aggregate:"));
    }

    #[test]
    fn test_newtype_serde_transparent() {
        let id = UserId(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
    }
}
