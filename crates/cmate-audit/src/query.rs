//! # Query Filters
//!
//! Plain indexed lookups over the three tables. Every filter field is
//! optional; an empty filter matches everything. Results come back in
//! chain order (`seq` ascending).

use cmate_core::{AggregateId, SessionId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use crate::chain::Sealed;
use crate::error::AuditError;
use crate::record::{AuditRecord, ChangeEvent, KeystrokeLog};

/// Default page size for audit queries.
pub const DEFAULT_LIMIT: usize = 100;

/// Largest page an audit query may request.
pub const MAX_LIMIT: usize = 1000;

/// Filter over `audit_logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Acting user.
    pub user_id: Option<UserId>,
    /// Exact action verb.
    pub action_type: Option<String>,
    /// Exact resource kind.
    pub resource_type: Option<String>,
    /// Exact resource id.
    pub resource_id: Option<String>,
    /// Exact request trace id.
    pub request_id: Option<String>,
    /// Only records that accessed PHI.
    #[serde(default)]
    pub phi_only: bool,
    /// Inclusive lower time bound.
    pub start: Option<Timestamp>,
    /// Inclusive upper time bound.
    pub end: Option<Timestamp>,
    /// Page size; defaults to [`DEFAULT_LIMIT`], capped at [`MAX_LIMIT`].
    pub limit: Option<usize>,
    /// Rows to skip.
    #[serde(default)]
    pub offset: usize,
}

impl AuditQuery {
    /// Reject inverted time ranges.
    pub fn validate(&self) -> Result<(), AuditError> {
        check_range(self.start, self.end)
    }

    /// Effective page size.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }

    /// Whether an entry passes every filter except paging.
    pub fn matches(&self, entry: &Sealed<AuditRecord>) -> bool {
        let r = entry.record();
        eq_opt(&self.user_id, &r.user_id)
            && eq_str(&self.action_type, &r.action_type)
            && eq_str(&self.resource_type, &r.resource_type)
            && eq_opt_str(&self.resource_id, &r.resource_id)
            && eq_opt_str(&self.request_id, &r.request_id)
            && (!self.phi_only || r.phi_accessed)
            && in_range(entry.recorded_at(), self.start, self.end)
    }
}

/// Filter over `change_events`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeQuery {
    /// Aggregate kind.
    pub aggregate_type: Option<String>,
    /// Aggregate identity.
    pub aggregate_id: Option<AggregateId>,
    /// Acting user.
    pub actor_id: Option<UserId>,
    /// Inclusive lower time bound.
    pub start: Option<Timestamp>,
    /// Inclusive upper time bound.
    pub end: Option<Timestamp>,
}

impl ChangeQuery {
    /// All events of one aggregate.
    pub fn for_aggregate(aggregate_type: impl Into<String>, aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_type: Some(aggregate_type.into()),
            aggregate_id: Some(aggregate_id),
            ..Self::default()
        }
    }

    /// Reject inverted time ranges.
    pub fn validate(&self) -> Result<(), AuditError> {
        check_range(self.start, self.end)
    }

    /// Whether an entry passes every filter.
    pub fn matches(&self, entry: &Sealed<ChangeEvent>) -> bool {
        let e = entry.record();
        eq_str(&self.aggregate_type, &e.aggregate_type)
            && self.aggregate_id.map_or(true, |id| id == e.aggregate_id)
            && eq_opt(&self.actor_id, &e.actor_id)
            && in_range(entry.recorded_at(), self.start, self.end)
    }
}

/// Filter over `keystroke_logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystrokeQuery {
    /// Editing user.
    pub user_id: Option<UserId>,
    /// Client session.
    pub session_id: Option<SessionId>,
    /// Inclusive lower time bound.
    pub start: Option<Timestamp>,
    /// Inclusive upper time bound.
    pub end: Option<Timestamp>,
}

impl KeystrokeQuery {
    /// Reject inverted time ranges.
    pub fn validate(&self) -> Result<(), AuditError> {
        check_range(self.start, self.end)
    }

    /// Whether an entry passes every filter.
    pub fn matches(&self, entry: &Sealed<KeystrokeLog>) -> bool {
        let k = entry.record();
        self.user_id.map_or(true, |id| id == k.user_id)
            && eq_opt(&self.session_id, &k.session_id)
            && in_range(entry.recorded_at(), self.start, self.end)
    }
}

fn check_range(start: Option<Timestamp>, end: Option<Timestamp>) -> Result<(), AuditError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(AuditError::InvalidRange { start, end }),
        _ => Ok(()),
    }
}

fn in_range(at: Option<Timestamp>, start: Option<Timestamp>, end: Option<Timestamp>) -> bool {
    if start.is_none() && end.is_none() {
        return true;
    }
    let Some(at) = at else {
        return false;
    };
    start.map_or(true, |s| at >= s) && end.map_or(true, |e| at <= e)
}

fn eq_opt<T: PartialEq>(filter: &Option<T>, value: &Option<T>) -> bool {
    match filter {
        Some(f) => value.as_ref() == Some(f),
        None => true,
    }
}

fn eq_str(filter: &Option<String>, value: &str) -> bool {
    filter.as_deref().map_or(true, |f| f == value)
}

fn eq_opt_str(filter: &Option<String>, value: &Option<String>) -> bool {
    match filter {
        Some(f) => value.as_deref() == Some(f.as_str()),
        None => true,
    }
}
