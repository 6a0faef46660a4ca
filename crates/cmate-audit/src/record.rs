//! # Audit Records
//!
//! The three kinds of row the store accepts. Each record type knows which
//! table it belongs to and validates its own required fields before it is
//! sealed into that table's chain.
//!
//! - [`AuditRecord`]: one HIPAA access/action record (`audit_logs`).
//! - [`ChangeEvent`]: one state change of an aggregate (`change_events`).
//! - [`KeystrokeLog`]: one encrypted field-level edit (`keystroke_logs`).

use cmate_core::{AggregateId, SessionId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuditError;

/// The append-only tables of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditTable {
    /// HIPAA access and action log.
    AuditLogs,
    /// Per-aggregate event history.
    ChangeEvents,
    /// Field-level edit capture.
    KeystrokeLogs,
}

impl AuditTable {
    /// All tables, in snapshot leaf order.
    pub const ALL: [AuditTable; 3] = [
        AuditTable::AuditLogs,
        AuditTable::ChangeEvents,
        AuditTable::KeystrokeLogs,
    ];

    /// SQL table name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuditLogs => "audit_logs",
            Self::ChangeEvents => "change_events",
            Self::KeystrokeLogs => "keystroke_logs",
        }
    }

    /// Key for the per-table advisory lock that serializes chain appends.
    pub fn lock_key(&self) -> i64 {
        match self {
            Self::AuditLogs => 0x636d_6174_0001,
            Self::ChangeEvents => 0x636d_6174_0002,
            Self::KeystrokeLogs => 0x636d_6174_0003,
        }
    }
}

impl std::fmt::Display for AuditTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// The action completed.
    #[default]
    Success,
    /// The action failed.
    Failure,
    /// The action was refused by authorization.
    Denied,
}

impl AuditStatus {
    /// Column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Denied => "denied",
        }
    }
}

impl std::str::FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "denied" => Ok(Self::Denied),
            other => Err(format!("unknown audit status {other:?}")),
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const HTTP_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// A HIPAA audit record: who did what to which resource, and whether PHI
/// was touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Acting user, `None` for system actions.
    pub user_id: Option<UserId>,
    /// Email at the time of the action.
    pub user_email: Option<String>,
    /// Role at the time of the action.
    pub user_role: Option<String>,
    /// Action verb, e.g. `view`, `update`, `export`.
    pub action_type: String,
    /// Kind of resource acted on, e.g. `license`.
    pub resource_type: String,
    /// Identifier of the resource.
    pub resource_id: Option<String>,
    /// Before/after diff or other structured detail.
    pub changes_made: Option<Value>,
    /// Whether protected health information was accessed.
    pub phi_accessed: bool,
    /// Which PHI fields were accessed.
    pub phi_fields: Option<Vec<String>>,
    /// Request path.
    pub endpoint: Option<String>,
    /// Request method.
    pub http_method: Option<String>,
    /// Trace id correlating the record with application logs.
    pub request_id: Option<String>,
    /// Client address.
    pub ip_address: Option<String>,
    /// Outcome.
    #[serde(default)]
    pub status: AuditStatus,
    /// Failure detail, only for non-success outcomes.
    pub error_message: Option<String>,
    /// When the action happened; assigned on append if absent.
    pub timestamp: Option<Timestamp>,
}

impl AuditRecord {
    /// A successful, non-PHI record with every optional field empty.
    pub fn new(action_type: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            user_id: None,
            user_email: None,
            user_role: None,
            action_type: action_type.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            changes_made: None,
            phi_accessed: false,
            phi_fields: None,
            endpoint: None,
            http_method: None,
            request_id: None,
            ip_address: None,
            status: AuditStatus::Success,
            error_message: None,
            timestamp: None,
        }
    }

    /// Attribute the record to a user.
    pub fn by_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set the resource id.
    pub fn on_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Mark PHI access and name the fields read.
    pub fn with_phi(mut self, fields: &[&str]) -> Self {
        self.phi_accessed = true;
        self.phi_fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Set the request trace id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set the structured diff.
    pub fn with_changes(mut self, changes: Value) -> Self {
        self.changes_made = Some(changes);
        self
    }

    /// Record a failed or denied outcome.
    pub fn with_outcome(mut self, status: AuditStatus, error_message: Option<String>) -> Self {
        self.status = status;
        self.error_message = error_message;
        self
    }

    /// Set the action time explicitly.
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Check required fields and cross-field rules.
    pub fn validate(&self) -> Result<(), AuditError> {
        let table = AuditTable::AuditLogs;
        require_text(table, "action_type", &self.action_type, 50)?;
        require_text(table, "resource_type", &self.resource_type, 100)?;
        optional_text(table, "resource_id", self.resource_id.as_deref(), 255)?;
        optional_text(table, "user_email", self.user_email.as_deref(), 255)?;
        optional_text(table, "user_role", self.user_role.as_deref(), 50)?;
        optional_text(table, "endpoint", self.endpoint.as_deref(), 255)?;
        optional_text(table, "request_id", self.request_id.as_deref(), 100)?;
        optional_text(table, "ip_address", self.ip_address.as_deref(), 45)?;

        if let Some(method) = self.http_method.as_deref() {
            if !HTTP_METHODS.contains(&method) {
                return Err(AuditError::InvalidField {
                    table,
                    field: "http_method",
                    reason: format!("unsupported method {method:?}"),
                });
            }
        }

        let names_phi = self.phi_fields.as_ref().is_some_and(|f| !f.is_empty());
        if names_phi && !self.phi_accessed {
            return Err(AuditError::InvalidField {
                table,
                field: "phi_fields",
                reason: "PHI fields listed but phi_accessed is false".to_string(),
            });
        }

        if self.error_message.is_some() && self.status == AuditStatus::Success {
            return Err(AuditError::InvalidField {
                table,
                field: "error_message",
                reason: "error_message requires status failure or denied".to_string(),
            });
        }
        Ok(())
    }
}

/// Kind of state change captured by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEventType {
    /// Aggregate created.
    Created,
    /// Aggregate updated.
    Updated,
    /// Aggregate soft-deleted.
    Deleted,
}

impl ChangeEventType {
    /// Column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        }
    }
}

impl std::str::FromStr for ChangeEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "UPDATED" => Ok(Self::Updated),
            "DELETED" => Ok(Self::Deleted),
            other => Err(format!("unknown change event type {other:?}")),
        }
    }
}

impl std::fmt::Display for ChangeEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change in the history of an aggregate.
///
/// Replaying an aggregate's events in `event_seq` order reconstructs its
/// state at any point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Aggregate kind, e.g. `license`.
    pub aggregate_type: String,
    /// Aggregate identity.
    pub aggregate_id: AggregateId,
    /// Per-aggregate sequence number, starting at 1.
    pub event_seq: i64,
    /// Kind of change.
    pub event_type: ChangeEventType,
    /// Minimal diff.
    pub event_payload: Value,
    /// Acting user, `None` for system changes.
    pub actor_id: Option<UserId>,
    /// Assigned on append if absent.
    pub created_at: Option<Timestamp>,
}

impl ChangeEvent {
    /// An event with no actor and no explicit time.
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: AggregateId,
        event_seq: i64,
        event_type: ChangeEventType,
        event_payload: Value,
    ) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            event_seq,
            event_type,
            event_payload,
            actor_id: None,
            created_at: None,
        }
    }

    /// Attribute the change to a user.
    pub fn by_actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<(), AuditError> {
        let table = AuditTable::ChangeEvents;
        require_text(table, "aggregate_type", &self.aggregate_type, 100)?;
        if self.event_seq < 1 {
            return Err(AuditError::InvalidField {
                table,
                field: "event_seq",
                reason: format!("must be >= 1, got {}", self.event_seq),
            });
        }
        Ok(())
    }
}

/// One captured field edit. The payload is ciphertext produced upstream;
/// the store never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystrokeLog {
    /// Editing user.
    pub user_id: UserId,
    /// Username at the time of the edit.
    pub username: Option<String>,
    /// Client session.
    pub session_id: Option<SessionId>,
    /// Client-side event time; assigned on append if absent.
    pub timestamp: Option<Timestamp>,
    /// Table the edit targets.
    pub target_table: Option<String>,
    /// Row the edit targets.
    pub target_id: Option<String>,
    /// Edit kind, e.g. `input`, `paste`.
    pub action_type: Option<String>,
    /// Field being edited.
    pub field_name: Option<String>,
    /// Encrypted payload.
    pub payload_encrypted: Vec<u8>,
    /// Client address.
    pub client_ip: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
}

impl KeystrokeLog {
    /// A capture with only the required fields set.
    pub fn new(user_id: UserId, payload_encrypted: Vec<u8>) -> Self {
        Self {
            user_id,
            username: None,
            session_id: None,
            timestamp: None,
            target_table: None,
            target_id: None,
            action_type: None,
            field_name: None,
            payload_encrypted,
            client_ip: None,
            user_agent: None,
        }
    }

    /// Set the client session.
    pub fn in_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<(), AuditError> {
        let table = AuditTable::KeystrokeLogs;
        if self.payload_encrypted.is_empty() {
            return Err(AuditError::MissingField {
                table,
                field: "payload_encrypted",
            });
        }
        optional_text(table, "username", self.username.as_deref(), 255)?;
        optional_text(table, "target_table", self.target_table.as_deref(), 100)?;
        optional_text(table, "target_id", self.target_id.as_deref(), 100)?;
        optional_text(table, "action_type", self.action_type.as_deref(), 30)?;
        optional_text(table, "field_name", self.field_name.as_deref(), 100)?;
        optional_text(table, "client_ip", self.client_ip.as_deref(), 45)?;
        Ok(())
    }
}

fn require_text(
    table: AuditTable,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), AuditError> {
    if value.trim().is_empty() {
        return Err(AuditError::MissingField { table, field });
    }
    optional_text(table, field, Some(value), max)
}

fn optional_text(
    table: AuditTable,
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<(), AuditError> {
    match value {
        Some(v) if v.chars().count() > max => Err(AuditError::InvalidField {
            table,
            field,
            reason: format!("longer than {max} characters"),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_audit_record_is_valid() {
        AuditRecord::new("view", "license").validate().unwrap();
    }

    #[test]
    fn test_missing_action_type_rejected() {
        let err = AuditRecord::new("  ", "license").validate().unwrap_err();
        assert!(matches!(
            err,
            AuditError::MissingField { field: "action_type", .. }
        ));
    }

    #[test]
    fn test_overlong_action_type_rejected() {
        let err = AuditRecord::new("x".repeat(51), "license")
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            AuditError::InvalidField { field: "action_type", .. }
        ));
    }

    #[test]
    fn test_phi_fields_require_phi_flag() {
        let mut record = AuditRecord::new("view", "provider").with_phi(&["ssn"]);
        record.validate().unwrap();
        record.phi_accessed = false;
        assert!(matches!(
            record.validate().unwrap_err(),
            AuditError::InvalidField { field: "phi_fields", .. }
        ));
    }

    #[test]
    fn test_error_message_requires_failure_status() {
        let mut record = AuditRecord::new("update", "license")
            .with_outcome(AuditStatus::Denied, Some("not owner".into()));
        record.validate().unwrap();
        record.status = AuditStatus::Success;
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_http_method_must_be_known() {
        let mut record = AuditRecord::new("view", "license");
        record.http_method = Some("GET".into());
        record.validate().unwrap();
        record.http_method = Some("get".into());
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_audit_status_serde() {
        assert_eq!(serde_json::to_value(AuditStatus::Denied).unwrap(), json!("denied"));
        assert_eq!("failure".parse::<AuditStatus>().unwrap(), AuditStatus::Failure);
        assert!("ok".parse::<AuditStatus>().is_err());
    }

    #[test]
    fn test_change_event_seq_must_be_positive() {
        let event = ChangeEvent::new(
            "license",
            AggregateId::new(),
            0,
            ChangeEventType::Created,
            json!({}),
        );
        assert!(matches!(
            event.validate().unwrap_err(),
            AuditError::InvalidField { field: "event_seq", .. }
        ));
    }

    #[test]
    fn test_change_event_type_wire_format() {
        assert_eq!(
            serde_json::to_value(ChangeEventType::Updated).unwrap(),
            json!("UPDATED")
        );
        assert_eq!("DELETED".parse::<ChangeEventType>().unwrap(), ChangeEventType::Deleted);
    }

    #[test]
    fn test_keystroke_payload_required() {
        let err = KeystrokeLog::new(UserId::new(), Vec::new())
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            AuditError::MissingField { field: "payload_encrypted", .. }
        ));
        KeystrokeLog::new(UserId::new(), vec![0xde, 0xad])
            .validate()
            .unwrap();
    }

    #[test]
    fn test_table_names() {
        assert_eq!(AuditTable::AuditLogs.to_string(), "audit_logs");
        assert_eq!(AuditTable::ALL.len(), 3);
        assert_ne!(
            AuditTable::ChangeEvents.lock_key(),
            AuditTable::KeystrokeLogs.lock_key()
        );
    }
}
