//! # Postgres Engine
//!
//! Persists the three chains and the snapshot index via SQLx. The schema
//! lives in `migrations/` and is applied by [`init_pool`].
//!
//! The database enforces immutability independently of this code: the
//! `prevent_audit_modification()` trigger rejects every UPDATE and DELETE on
//! the audit tables. Such rejections surface as [`AuditError::Immutable`];
//! every other database error propagates unchanged as
//! [`AuditError::Database`].
//!
//! Chain appends take a per-table `pg_advisory_xact_lock` before reading the
//! chain head, so concurrent writers are serialized and each row links to
//! the one committed before it.

use chrono::{DateTime, Utc};
use cmate_core::{AggregateId, EventId, Principal, SessionId, Timestamp, UserId};
use serde_json::Value;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::chain::{ChainRecord, Sealed, GENESIS_HASH};
use crate::config::DatabaseConfig;
use crate::error::AuditError;
use crate::query::{AuditQuery, ChangeQuery, KeystrokeQuery};
use crate::record::{AuditRecord, AuditTable, ChangeEvent, KeystrokeLog};
use crate::snapshot::{ChainSet, IntegritySnapshot, StoreReport};
use crate::store::require_admin;

/// Message raised by the immutability trigger.
pub const IMMUTABLE_MESSAGE: &str = "Cannot modify audit logs (HIPAA 45 CFR 164.312(b) requirement)";

const UNIQUE_EVENT_SEQ: &str = "uq_change_events_aggregate_seq";

const AUDIT_COLUMNS: &str = "seq, id, user_id, user_email, user_role, action_type, resource_type, \
     resource_id, changes_made, phi_accessed, phi_fields, endpoint, http_method, request_id, \
     ip_address, status, error_message, \"timestamp\", previous_hash, integrity_hash";

const CHANGE_COLUMNS: &str = "seq, event_id, aggregate_type, aggregate_id, event_seq, event_type, \
     event_payload, actor_id, created_at, previous_hash, integrity_hash";

const KEYSTROKE_COLUMNS: &str = "seq, event_id, user_id, username, session_id, \"timestamp\", \
     target_table, target_id, action_type, field_name, payload_encrypted, client_ip, user_agent, \
     previous_hash, integrity_hash";

/// Connect to Postgres and apply the embedded migrations.
pub async fn init_pool(config: &DatabaseConfig) -> Result<PgPool, AuditError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(url = %crate::config::redact_url(&config.url), "connected to PostgreSQL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(sqlx::Error::from)?;
    tracing::info!("audit store migrations applied");

    Ok(pool)
}

/// Map a database error raised while touching `table`.
///
/// Trigger rejections become [`AuditError::Immutable`]; everything else is
/// returned as [`AuditError::Database`].
pub fn classify_db_error(err: sqlx::Error, table: AuditTable) -> AuditError {
    if let sqlx::Error::Database(db) = &err {
        if db.message().contains(IMMUTABLE_MESSAGE) {
            tracing::warn!(%table, "mutation of immutable audit table rejected");
            return AuditError::Immutable {
                table,
                detail: db.message().to_string(),
            };
        }
    }
    AuditError::Database(err)
}

/// Audit store backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    /// Wrap an already-migrated pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, migrate and wrap.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AuditError> {
        Ok(Self::new(init_pool(config).await?))
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Seal and insert one audit record.
    pub async fn append_audit(
        &self,
        mut record: AuditRecord,
    ) -> Result<Sealed<AuditRecord>, AuditError> {
        let table = AuditTable::AuditLogs;
        record.validate()?;
        record.stamp(Timestamp::now());

        let mut tx = self.pool.begin().await?;
        let (seq, previous_hash) = chain_head(&mut tx, table).await?;
        let sealed = Sealed::seal(seq, EventId::new(), record, previous_hash)?;
        insert_audit(&mut tx, &sealed)
            .await
            .map_err(|e| classify_db_error(e, table))?;
        tx.commit().await?;

        tracing::debug!(
            seq = sealed.seq(),
            action_type = %sealed.record().action_type,
            phi_accessed = sealed.record().phi_accessed,
            "audit record appended"
        );
        Ok(sealed)
    }

    /// Seal and insert one change event.
    pub async fn append_change(
        &self,
        mut event: ChangeEvent,
    ) -> Result<Sealed<ChangeEvent>, AuditError> {
        let table = AuditTable::ChangeEvents;
        event.validate()?;
        event.stamp(Timestamp::now());

        let mut tx = self.pool.begin().await?;
        let (seq, previous_hash) = chain_head(&mut tx, table).await?;
        check_event_seq(&mut tx, &event).await?;
        let sealed = Sealed::seal(seq, EventId::new(), event, previous_hash)?;
        insert_change(&mut tx, &sealed).await.map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.constraint() == Some(UNIQUE_EVENT_SEQ) {
                    return AuditError::DuplicateSequence {
                        aggregate_type: sealed.record().aggregate_type.clone(),
                        aggregate_id: sealed.record().aggregate_id.to_string(),
                        event_seq: sealed.record().event_seq,
                    };
                }
            }
            classify_db_error(e, table)
        })?;
        tx.commit().await?;

        tracing::debug!(
            seq = sealed.seq(),
            aggregate_type = %sealed.record().aggregate_type,
            event_seq = sealed.record().event_seq,
            "change event appended"
        );
        Ok(sealed)
    }

    /// Seal and insert one keystroke capture.
    pub async fn append_keystroke(
        &self,
        mut log: KeystrokeLog,
    ) -> Result<Sealed<KeystrokeLog>, AuditError> {
        let table = AuditTable::KeystrokeLogs;
        log.validate()?;
        log.stamp(Timestamp::now());

        let mut tx = self.pool.begin().await?;
        let (seq, previous_hash) = chain_head(&mut tx, table).await?;
        let sealed = Sealed::seal(seq, EventId::new(), log, previous_hash)?;
        insert_keystroke(&mut tx, &sealed)
            .await
            .map_err(|e| classify_db_error(e, table))?;
        tx.commit().await?;

        tracing::debug!(seq = sealed.seq(), "keystroke log appended");
        Ok(sealed)
    }

    /// Audit records matching `query`. Admin principals only.
    pub async fn query_audit(
        &self,
        principal: &Principal,
        query: &AuditQuery,
    ) -> Result<Vec<Sealed<AuditRecord>>, AuditError> {
        require_admin(principal)?;
        query.validate()?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE TRUE"
        ));
        if let Some(user_id) = query.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.0);
        }
        if let Some(action_type) = &query.action_type {
            qb.push(" AND action_type = ").push_bind(action_type.clone());
        }
        if let Some(resource_type) = &query.resource_type {
            qb.push(" AND resource_type = ").push_bind(resource_type.clone());
        }
        if let Some(resource_id) = &query.resource_id {
            qb.push(" AND resource_id = ").push_bind(resource_id.clone());
        }
        if let Some(request_id) = &query.request_id {
            qb.push(" AND request_id = ").push_bind(request_id.clone());
        }
        if query.phi_only {
            qb.push(" AND phi_accessed");
        }
        push_range(&mut qb, "\"timestamp\"", query.start, query.end);
        qb.push(" ORDER BY seq ASC LIMIT ")
            .push_bind(query.effective_limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let rows = qb
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AuditRow::into_sealed).collect()
    }

    /// Change events matching `query`, in chain order.
    pub async fn query_changes(
        &self,
        query: &ChangeQuery,
    ) -> Result<Vec<Sealed<ChangeEvent>>, AuditError> {
        query.validate()?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CHANGE_COLUMNS} FROM change_events WHERE TRUE"
        ));
        if let Some(aggregate_type) = &query.aggregate_type {
            qb.push(" AND aggregate_type = ").push_bind(aggregate_type.clone());
        }
        if let Some(aggregate_id) = query.aggregate_id {
            qb.push(" AND aggregate_id = ").push_bind(aggregate_id.0);
        }
        if let Some(actor_id) = query.actor_id {
            qb.push(" AND actor_id = ").push_bind(actor_id.0);
        }
        push_range(&mut qb, "created_at", query.start, query.end);
        qb.push(" ORDER BY seq ASC");

        let rows = qb
            .build_query_as::<ChangeRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ChangeRow::into_sealed).collect()
    }

    /// Keystroke captures matching `query`, in chain order.
    pub async fn query_keystrokes(
        &self,
        query: &KeystrokeQuery,
    ) -> Result<Vec<Sealed<KeystrokeLog>>, AuditError> {
        query.validate()?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {KEYSTROKE_COLUMNS} FROM keystroke_logs WHERE TRUE"
        ));
        if let Some(user_id) = query.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.0);
        }
        if let Some(session_id) = query.session_id {
            qb.push(" AND session_id = ").push_bind(session_id.0);
        }
        push_range(&mut qb, "\"timestamp\"", query.start, query.end);
        qb.push(" ORDER BY seq ASC");

        let rows = qb
            .build_query_as::<KeystrokeRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(KeystrokeRow::into_sealed).collect()
    }

    /// Events of one aggregate in `event_seq` order.
    pub async fn replay(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<Sealed<ChangeEvent>>, AuditError> {
        let sql = format!(
            "SELECT {CHANGE_COLUMNS} FROM change_events
             WHERE aggregate_type = $1 AND aggregate_id = $2 ORDER BY event_seq ASC"
        );
        let rows = sqlx::query_as::<_, ChangeRow>(&sql)
            .bind(aggregate_type)
            .bind(aggregate_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ChangeRow::into_sealed).collect()
    }

    /// Sequence number the next event of an aggregate must use.
    pub async fn next_event_seq(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<i64, AuditError> {
        let last: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(event_seq) FROM change_events WHERE aggregate_type = $1 AND aggregate_id = $2",
        )
        .bind(aggregate_type)
        .bind(aggregate_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(last.unwrap_or(0) + 1)
    }

    /// Full `audit_logs` chain.
    pub async fn audit_chain(&self) -> Result<Vec<Sealed<AuditRecord>>, AuditError> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_logs ORDER BY seq ASC");
        let rows = sqlx::query_as::<_, AuditRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AuditRow::into_sealed).collect()
    }

    /// Full `change_events` chain.
    pub async fn change_chain(&self) -> Result<Vec<Sealed<ChangeEvent>>, AuditError> {
        let sql = format!("SELECT {CHANGE_COLUMNS} FROM change_events ORDER BY seq ASC");
        let rows = sqlx::query_as::<_, ChangeRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ChangeRow::into_sealed).collect()
    }

    /// Full `keystroke_logs` chain.
    pub async fn keystroke_chain(&self) -> Result<Vec<Sealed<KeystrokeLog>>, AuditError> {
        let sql = format!("SELECT {KEYSTROKE_COLUMNS} FROM keystroke_logs ORDER BY seq ASC");
        let rows = sqlx::query_as::<_, KeystrokeRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(KeystrokeRow::into_sealed).collect()
    }

    /// Read all three chains.
    pub async fn chains(&self) -> Result<ChainSet, AuditError> {
        Ok(ChainSet {
            audit: self.audit_chain().await?,
            changes: self.change_chain().await?,
            keystrokes: self.keystroke_chain().await?,
        })
    }

    /// Verify all three chains from genesis.
    pub async fn verify(&self) -> Result<StoreReport, AuditError> {
        self.chains().await?.verify()
    }

    /// Verify, commit to the current rows, and insert into
    /// `audit_immutable_index`.
    pub async fn take_snapshot(
        &self,
        storage_pointer: Option<String>,
    ) -> Result<IntegritySnapshot, AuditError> {
        let snapshot = self
            .chains()
            .await?
            .snapshot(Timestamp::now(), storage_pointer)?;
        let counts = serde_json::to_value(&snapshot.aggregate_counts)?;

        sqlx::query(
            "INSERT INTO audit_immutable_index (id, snapshot_time, aggregate_counts, merkle_root, storage_pointer)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(snapshot.id)
        .bind(*snapshot.snapshot_time.as_datetime())
        .bind(counts)
        .bind(&snapshot.merkle_root)
        .bind(&snapshot.storage_pointer)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            snapshot_id = %snapshot.id,
            merkle_root = %snapshot.merkle_root,
            rows = snapshot.total_rows(),
            "integrity snapshot recorded"
        );
        Ok(snapshot)
    }

    /// All snapshots, oldest first.
    pub async fn snapshots(&self) -> Result<Vec<IntegritySnapshot>, AuditError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT id, snapshot_time, aggregate_counts, merkle_root, storage_pointer
             FROM audit_immutable_index ORDER BY snapshot_time ASC, created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    /// Check a snapshot against the current rows.
    pub async fn verify_snapshot(&self, snapshot: &IntegritySnapshot) -> Result<(), AuditError> {
        self.chains().await?.verify_snapshot(snapshot)
    }
}

/// Lock `table`'s chain for this transaction and return the next seq and
/// the hash it must link to.
async fn chain_head(
    conn: &mut PgConnection,
    table: AuditTable,
) -> Result<(u64, String), AuditError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(table.lock_key())
        .execute(&mut *conn)
        .await?;

    let sql = format!(
        "SELECT seq, integrity_hash FROM {} ORDER BY seq DESC LIMIT 1",
        table.as_str()
    );
    let head: Option<(i64, String)> = sqlx::query_as(&sql).fetch_optional(&mut *conn).await?;
    match head {
        Some((seq, hash)) => Ok((to_seq(seq, table)? + 1, hash)),
        None => Ok((1, GENESIS_HASH.to_string())),
    }
}

async fn check_event_seq(conn: &mut PgConnection, event: &ChangeEvent) -> Result<(), AuditError> {
    let last: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(event_seq) FROM change_events WHERE aggregate_type = $1 AND aggregate_id = $2",
    )
    .bind(&event.aggregate_type)
    .bind(event.aggregate_id.0)
    .fetch_one(&mut *conn)
    .await?;

    let Some(last_seq) = last else {
        return Ok(());
    };
    if event.event_seq > last_seq {
        return Ok(());
    }

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM change_events
         WHERE aggregate_type = $1 AND aggregate_id = $2 AND event_seq = $3)",
    )
    .bind(&event.aggregate_type)
    .bind(event.aggregate_id.0)
    .bind(event.event_seq)
    .fetch_one(&mut *conn)
    .await?;

    tracing::warn!(
        aggregate_type = %event.aggregate_type,
        aggregate_id = %event.aggregate_id,
        event_seq = event.event_seq,
        last_seq,
        "change event sequence rejected"
    );
    if exists {
        Err(AuditError::DuplicateSequence {
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id.to_string(),
            event_seq: event.event_seq,
        })
    } else {
        Err(AuditError::SequenceRegression {
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id.to_string(),
            last_seq,
            attempted: event.event_seq,
        })
    }
}

async fn insert_audit(
    conn: &mut PgConnection,
    sealed: &Sealed<AuditRecord>,
) -> Result<(), sqlx::Error> {
    let r = sealed.record();
    let phi_fields = r.phi_fields.clone().map(Value::from);
    sqlx::query(
        "INSERT INTO audit_logs (seq, id, user_id, user_email, user_role, action_type, resource_type,
             resource_id, changes_made, phi_accessed, phi_fields, endpoint, http_method, request_id,
             ip_address, status, error_message, \"timestamp\", previous_hash, integrity_hash)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
    )
    .bind(sealed.seq() as i64)
    .bind(sealed.entry_id().0)
    .bind(r.user_id.map(|u| u.0))
    .bind(&r.user_email)
    .bind(&r.user_role)
    .bind(&r.action_type)
    .bind(&r.resource_type)
    .bind(&r.resource_id)
    .bind(r.changes_made.clone())
    .bind(r.phi_accessed)
    .bind(phi_fields)
    .bind(&r.endpoint)
    .bind(&r.http_method)
    .bind(&r.request_id)
    .bind(&r.ip_address)
    .bind(r.status.as_str())
    .bind(&r.error_message)
    .bind(sealed.recorded_at().map(|t| *t.as_datetime()))
    .bind(sealed.previous_hash())
    .bind(sealed.integrity_hash())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_change(
    conn: &mut PgConnection,
    sealed: &Sealed<ChangeEvent>,
) -> Result<(), sqlx::Error> {
    let e = sealed.record();
    sqlx::query(
        "INSERT INTO change_events (seq, event_id, aggregate_type, aggregate_id, event_seq, event_type,
             event_payload, actor_id, created_at, previous_hash, integrity_hash)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(sealed.seq() as i64)
    .bind(sealed.entry_id().0)
    .bind(&e.aggregate_type)
    .bind(e.aggregate_id.0)
    .bind(e.event_seq)
    .bind(e.event_type.as_str())
    .bind(e.event_payload.clone())
    .bind(e.actor_id.map(|u| u.0))
    .bind(sealed.recorded_at().map(|t| *t.as_datetime()))
    .bind(sealed.previous_hash())
    .bind(sealed.integrity_hash())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_keystroke(
    conn: &mut PgConnection,
    sealed: &Sealed<KeystrokeLog>,
) -> Result<(), sqlx::Error> {
    let k = sealed.record();
    sqlx::query(
        "INSERT INTO keystroke_logs (seq, event_id, user_id, username, session_id, \"timestamp\",
             target_table, target_id, action_type, field_name, payload_encrypted, client_ip,
             user_agent, previous_hash, integrity_hash)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(sealed.seq() as i64)
    .bind(sealed.entry_id().0)
    .bind(k.user_id.0)
    .bind(&k.username)
    .bind(k.session_id.map(|s| s.0))
    .bind(sealed.recorded_at().map(|t| *t.as_datetime()))
    .bind(&k.target_table)
    .bind(&k.target_id)
    .bind(&k.action_type)
    .bind(&k.field_name)
    .bind(&k.payload_encrypted)
    .bind(&k.client_ip)
    .bind(&k.user_agent)
    .bind(sealed.previous_hash())
    .bind(sealed.integrity_hash())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn push_range(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
) {
    if let Some(start) = start {
        qb.push(format!(" AND {column} >= ")).push_bind(*start.as_datetime());
    }
    if let Some(end) = end {
        qb.push(format!(" AND {column} <= ")).push_bind(*end.as_datetime());
    }
}

fn to_seq(seq: i64, table: AuditTable) -> Result<u64, AuditError> {
    u64::try_from(seq).map_err(|_| AuditError::RowDecode {
        table,
        reason: format!("negative seq {seq}"),
    })
}

fn decode_err(table: AuditTable, field: &str, err: impl std::fmt::Display) -> AuditError {
    AuditError::RowDecode {
        table,
        reason: format!("{field}: {err}"),
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct AuditRow {
    seq: i64,
    id: Uuid,
    user_id: Option<Uuid>,
    user_email: Option<String>,
    user_role: Option<String>,
    action_type: String,
    resource_type: String,
    resource_id: Option<String>,
    changes_made: Option<Value>,
    phi_accessed: bool,
    phi_fields: Option<Value>,
    endpoint: Option<String>,
    http_method: Option<String>,
    request_id: Option<String>,
    ip_address: Option<String>,
    status: String,
    error_message: Option<String>,
    timestamp: DateTime<Utc>,
    previous_hash: String,
    integrity_hash: String,
}

impl AuditRow {
    fn into_sealed(self) -> Result<Sealed<AuditRecord>, AuditError> {
        let table = AuditTable::AuditLogs;
        let status = self
            .status
            .parse()
            .map_err(|e: String| decode_err(table, "status", e))?;
        let phi_fields = self
            .phi_fields
            .map(serde_json::from_value::<Vec<String>>)
            .transpose()
            .map_err(|e| decode_err(table, "phi_fields", e))?;
        let record = AuditRecord {
            user_id: self.user_id.map(UserId),
            user_email: self.user_email,
            user_role: self.user_role,
            action_type: self.action_type,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            changes_made: self.changes_made,
            phi_accessed: self.phi_accessed,
            phi_fields,
            endpoint: self.endpoint,
            http_method: self.http_method,
            request_id: self.request_id,
            ip_address: self.ip_address,
            status,
            error_message: self.error_message,
            timestamp: Some(Timestamp::from_utc(self.timestamp)),
        };
        Ok(Sealed::from_parts(
            to_seq(self.seq, table)?,
            EventId(self.id),
            record,
            self.previous_hash,
            self.integrity_hash,
        ))
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct ChangeRow {
    seq: i64,
    event_id: Uuid,
    aggregate_type: String,
    aggregate_id: Uuid,
    event_seq: i64,
    event_type: String,
    event_payload: Value,
    actor_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    previous_hash: String,
    integrity_hash: String,
}

impl ChangeRow {
    fn into_sealed(self) -> Result<Sealed<ChangeEvent>, AuditError> {
        let table = AuditTable::ChangeEvents;
        let event_type = self
            .event_type
            .parse()
            .map_err(|e: String| decode_err(table, "event_type", e))?;
        let event = ChangeEvent {
            aggregate_type: self.aggregate_type,
            aggregate_id: AggregateId(self.aggregate_id),
            event_seq: self.event_seq,
            event_type,
            event_payload: self.event_payload,
            actor_id: self.actor_id.map(UserId),
            created_at: Some(Timestamp::from_utc(self.created_at)),
        };
        Ok(Sealed::from_parts(
            to_seq(self.seq, table)?,
            EventId(self.event_id),
            event,
            self.previous_hash,
            self.integrity_hash,
        ))
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct KeystrokeRow {
    seq: i64,
    event_id: Uuid,
    user_id: Uuid,
    username: Option<String>,
    session_id: Option<Uuid>,
    timestamp: DateTime<Utc>,
    target_table: Option<String>,
    target_id: Option<String>,
    action_type: Option<String>,
    field_name: Option<String>,
    payload_encrypted: Vec<u8>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    previous_hash: String,
    integrity_hash: String,
}

impl KeystrokeRow {
    fn into_sealed(self) -> Result<Sealed<KeystrokeLog>, AuditError> {
        let log = KeystrokeLog {
            user_id: UserId(self.user_id),
            username: self.username,
            session_id: self.session_id.map(SessionId),
            timestamp: Some(Timestamp::from_utc(self.timestamp)),
            target_table: self.target_table,
            target_id: self.target_id,
            action_type: self.action_type,
            field_name: self.field_name,
            payload_encrypted: self.payload_encrypted,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
        };
        Ok(Sealed::from_parts(
            to_seq(self.seq, AuditTable::KeystrokeLogs)?,
            EventId(self.event_id),
            log,
            self.previous_hash,
            self.integrity_hash,
        ))
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    snapshot_time: DateTime<Utc>,
    aggregate_counts: Value,
    merkle_root: String,
    storage_pointer: Option<String>,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<IntegritySnapshot, AuditError> {
        Ok(IntegritySnapshot {
            id: self.id,
            snapshot_time: Timestamp::from_utc(self.snapshot_time),
            aggregate_counts: serde_json::from_value(self.aggregate_counts)?,
            merkle_root: self.merkle_root,
            storage_pointer: self.storage_pointer,
        })
    }
}
