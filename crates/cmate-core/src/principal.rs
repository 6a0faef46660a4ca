//! # Request Principal
//!
//! The acting user behind an audit query or an audited action, as a typed
//! record rather than a loosely keyed map.
//!
//! Roles follow the platform's user model: superadmins and admins manage an
//! organization, providers own their credentials, delegates act on behalf of
//! a provider. `System` marks background jobs, which carry no user id.

use serde::{Deserialize, Serialize};

use crate::identity::{OrgId, ProviderId, UserId};

/// Platform role of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Cross-organization administrator.
    Superadmin,
    /// Organization administrator.
    Admin,
    /// Healthcare provider.
    Provider,
    /// Staff member acting for a provider.
    Delegate,
    /// Background job or migration.
    System,
}

impl Role {
    /// Returns the role identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Superadmin => "superadmin",
            Self::Admin => "admin",
            Self::Provider => "provider",
            Self::Delegate => "delegate",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated (or system) actor of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User account, `None` for system actions.
    pub user_id: Option<UserId>,
    /// Email at the time of the action.
    pub email: Option<String>,
    /// Role at the time of the action.
    pub role: Role,
    /// Organization scope.
    pub org_id: Option<OrgId>,
    /// Provider profile scope, for providers and delegates.
    pub provider_id: Option<ProviderId>,
}

impl Principal {
    /// A principal for system-initiated actions.
    pub fn system() -> Self {
        Self {
            user_id: None,
            email: None,
            role: Role::System,
            org_id: None,
            provider_id: None,
        }
    }

    /// A user principal with the given role and no org/provider scope.
    pub fn user(user_id: UserId, role: Role) -> Self {
        Self {
            user_id: Some(user_id),
            email: None,
            role,
            org_id: None,
            provider_id: None,
        }
    }

    /// Attach an email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Attach an organization scope.
    pub fn with_org(mut self, org_id: OrgId) -> Self {
        self.org_id = Some(org_id);
        self
    }

    /// Attach a provider scope.
    pub fn with_provider(mut self, provider_id: ProviderId) -> Self {
        self.provider_id = Some(provider_id);
        self
    }

    /// Whether the principal may read the audit trail.
    ///
    /// System principals qualify so that verification and snapshot jobs can
    /// scan the store.
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Superadmin | Role::Admin | Role::System)
    }
}
