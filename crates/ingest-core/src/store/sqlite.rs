//! # SQLite record store
//!
//! `sqlx` over a `SqlitePool`. The schema is created on connect, so pointing
//! the store at a fresh file (`sqlite://calls.db?mode=rwc`) is enough.
//!
//! Timestamps are stored as RFC 3339 text, which keeps the provider's UTC
//! offset on `start_time`/`end_time`. `start_epoch_ms` duplicates the start
//! instant as an integer so the callback window can be queried and ordered
//! without parsing text.
//!
//! Upserts are a single `INSERT ... ON CONFLICT(call_id) DO UPDATE`, and a
//! missed call is claimed with `UPDATE ... WHERE contacted_at IS NULL`, so both
//! stay atomic without an explicit transaction.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::{CallStore, UpsertResult};
use crate::callback::PhoneMatch;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    CallDirection, CallFields, CallRecord, CallStatus, CustomerDetails, Disposition, DispositionCategory,
    DispositionDefaults, DispositionOrigin,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS call_records (
        id TEXT PRIMARY KEY,
        call_id TEXT NOT NULL UNIQUE,
        provider_session_id TEXT,
        caller_number TEXT NOT NULL,
        caller_name TEXT,
        start_time TEXT NOT NULL,
        start_epoch_ms INTEGER NOT NULL,
        end_time TEXT,
        duration_seconds INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        direction TEXT NOT NULL,
        is_callback INTEGER NOT NULL DEFAULT 0,
        callback_of TEXT,
        contacted_at TEXT,
        staff_name TEXT,
        staff_id TEXT,
        recording_url TEXT,
        disposition_code TEXT,
        disposition_notes TEXT,
        customer TEXT NOT NULL DEFAULT '{}',
        raw_payload TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_call_records_inbound
        ON call_records (direction, start_epoch_ms)",
    "CREATE TABLE IF NOT EXISTS dispositions (
        code TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        category TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        requires_followup INTEGER NOT NULL DEFAULT 0,
        origin TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
];

const UPSERT_CALL: &str = "INSERT INTO call_records (
        id, call_id, provider_session_id, caller_number, caller_name,
        start_time, start_epoch_ms, end_time, duration_seconds, status, direction,
        is_callback, callback_of, contacted_at, staff_name, staff_id, recording_url,
        disposition_code, disposition_notes, customer, raw_payload, created_at, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(call_id) DO UPDATE SET
        provider_session_id = excluded.provider_session_id,
        caller_number = excluded.caller_number,
        caller_name = excluded.caller_name,
        start_time = excluded.start_time,
        start_epoch_ms = excluded.start_epoch_ms,
        end_time = excluded.end_time,
        duration_seconds = excluded.duration_seconds,
        status = excluded.status,
        direction = excluded.direction,
        is_callback = excluded.is_callback,
        callback_of = excluded.callback_of,
        contacted_at = COALESCE(excluded.contacted_at, call_records.contacted_at),
        staff_name = excluded.staff_name,
        staff_id = excluded.staff_id,
        recording_url = excluded.recording_url,
        disposition_code = excluded.disposition_code,
        disposition_notes = excluded.disposition_notes,
        customer = excluded.customer,
        raw_payload = excluded.raw_payload,
        updated_at = excluded.updated_at";

const INSERT_DISPOSITION: &str = "INSERT OR IGNORE INTO dispositions (
        code, name, description, category, is_active, requires_followup, origin, created_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

/// [`CallStore`] backed by SQLite
#[derive(Debug, Clone)]
pub struct SqliteCallStore {
    pool: SqlitePool,
}

impl SqliteCallStore {
    /// Connect to `database_url` and create the schema if missing
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        Self::from_pool(pool).await
    }

    /// A private in-memory database. A single connection is used because
    /// every `:memory:` connection would otherwise see its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("SQLite call store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_call(&self, column: &str, value: &str) -> StoreResult<Option<CallRecord>> {
        // `column` is one of our own constants, never caller input
        let sql = format!("SELECT * FROM call_records WHERE {} = ?", column);
        let row = sqlx::query(&sql).bind(value).fetch_optional(&self.pool).await?;
        row.as_ref().map(record_from_row).transpose()
    }
}

#[async_trait]
impl CallStore for SqliteCallStore {
    async fn get_call(&self, id: &str) -> StoreResult<Option<CallRecord>> {
        self.fetch_call("id", id).await
    }

    async fn get_call_by_call_id(&self, call_id: &str) -> StoreResult<Option<CallRecord>> {
        self.fetch_call("call_id", call_id).await
    }

    async fn upsert_call(&self, call_id: &str, fields: CallFields) -> StoreResult<UpsertResult> {
        let new_id = CallRecord::new_id();
        let now = Utc::now().to_rfc3339();
        let customer = serde_json::to_string(&fields.customer)?;
        let raw_payload = serde_json::to_string(&fields.raw_payload)?;

        sqlx::query(UPSERT_CALL)
            .bind(&new_id)
            .bind(call_id)
            .bind(&fields.provider_session_id)
            .bind(&fields.caller_number)
            .bind(&fields.caller_name)
            .bind(fields.start_time.to_rfc3339())
            .bind(fields.start_time.timestamp_millis())
            .bind(fields.end_time.map(|t| t.to_rfc3339()))
            .bind(i64::from(fields.duration_seconds))
            .bind(fields.status.as_str())
            .bind(fields.direction.as_str())
            .bind(fields.is_callback)
            .bind(&fields.callback_of)
            .bind(fields.contacted_at.map(|t| t.to_rfc3339()))
            .bind(&fields.staff_name)
            .bind(&fields.staff_id)
            .bind(&fields.recording_url)
            .bind(&fields.disposition_code)
            .bind(&fields.disposition_notes)
            .bind(customer)
            .bind(raw_payload)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        let record = self
            .fetch_call("call_id", call_id)
            .await?
            .ok_or_else(|| StoreError::corrupt(call_id, "record missing after upsert"))?;
        let created = record.id == new_id;

        debug!(call_id, id = %record.id, created, "Upserted call record");
        Ok(UpsertResult { record, created })
    }

    async fn find_recent_inbound(
        &self,
        phone: &PhoneMatch,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<CallRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM call_records
             WHERE direction = ? AND start_epoch_ms >= ?
             ORDER BY start_epoch_ms DESC",
        )
        .bind(CallDirection::Inbound.as_str())
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            let caller_number: String = row.try_get("caller_number")?;
            if phone.matches(&caller_number) {
                return record_from_row(row).map(Some);
            }
        }
        Ok(None)
    }

    async fn mark_contacted(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE call_records
             SET contacted_at = ?, updated_at = ?
             WHERE id = ? AND contacted_at IS NULL",
        )
        .bind(at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_disposition(&self, code: &str) -> StoreResult<Option<Disposition>> {
        let row = sqlx::query("SELECT * FROM dispositions WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(disposition_from_row).transpose()
    }

    async fn get_or_create_disposition(
        &self,
        code: &str,
        defaults: DispositionDefaults,
    ) -> StoreResult<(Disposition, bool)> {
        let created = insert_disposition(&self.pool, code, defaults).await?;
        let disposition = self
            .get_disposition(code)
            .await?
            .ok_or_else(|| StoreError::corrupt(code, "disposition missing after insert"))?;
        Ok((disposition, created))
    }

    async fn create_disposition(&self, code: &str, defaults: DispositionDefaults) -> StoreResult<Disposition> {
        if !insert_disposition(&self.pool, code, defaults).await? {
            return Err(StoreError::DispositionExists(code.to_string()));
        }
        self.get_disposition(code)
            .await?
            .ok_or_else(|| StoreError::corrupt(code, "disposition missing after insert"))
    }

    async fn count_calls(&self) -> StoreResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM call_records")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }
}

/// Returns `true` when a row was inserted
async fn insert_disposition(pool: &SqlitePool, code: &str, defaults: DispositionDefaults) -> StoreResult<bool> {
    let disposition = defaults.into_disposition(code, Utc::now());
    let result = sqlx::query(INSERT_DISPOSITION)
        .bind(&disposition.code)
        .bind(&disposition.name)
        .bind(&disposition.description)
        .bind(disposition.category.as_str())
        .bind(disposition.is_active)
        .bind(disposition.requires_followup)
        .bind(disposition.origin.as_str())
        .bind(disposition.created_at.to_rfc3339())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn record_from_row(row: &SqliteRow) -> StoreResult<CallRecord> {
    let id: String = row.try_get("id")?;

    let start_time: String = row.try_get("start_time")?;
    let end_time: Option<String> = row.try_get("end_time")?;
    let contacted_at: Option<String> = row.try_get("contacted_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let duration: i64 = row.try_get("duration_seconds")?;
    let status: String = row.try_get("status")?;
    let direction: String = row.try_get("direction")?;
    let customer: String = row.try_get("customer")?;
    let raw_payload: String = row.try_get("raw_payload")?;

    let customer: CustomerDetails = serde_json::from_str(&customer)?;

    let fields = CallFields {
        provider_session_id: row.try_get("provider_session_id")?,
        caller_number: row.try_get("caller_number")?,
        caller_name: row.try_get("caller_name")?,
        start_time: parse_fixed(&id, &start_time)?,
        end_time: end_time.as_deref().map(|t| parse_fixed(&id, t)).transpose()?,
        duration_seconds: u32::try_from(duration)
            .map_err(|_| StoreError::corrupt(&id, format!("duration out of range: {}", duration)))?,
        status: CallStatus::from_str(&status).map_err(|e| StoreError::corrupt(&id, e))?,
        direction: CallDirection::from_str(&direction).map_err(|e| StoreError::corrupt(&id, e))?,
        is_callback: row.try_get("is_callback")?,
        callback_of: row.try_get("callback_of")?,
        contacted_at: contacted_at.as_deref().map(|t| parse_utc(&id, t)).transpose()?,
        staff_name: row.try_get("staff_name")?,
        staff_id: row.try_get("staff_id")?,
        recording_url: row.try_get("recording_url")?,
        disposition_code: row.try_get("disposition_code")?,
        disposition_notes: row.try_get("disposition_notes")?,
        customer,
        raw_payload: serde_json::from_str(&raw_payload)?,
    };

    Ok(CallRecord {
        call_id: row.try_get("call_id")?,
        fields,
        created_at: parse_utc(&id, &created_at)?,
        updated_at: parse_utc(&id, &updated_at)?,
        id,
    })
}

fn disposition_from_row(row: &SqliteRow) -> StoreResult<Disposition> {
    let code: String = row.try_get("code")?;
    let category: String = row.try_get("category")?;
    let origin: String = row.try_get("origin")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Disposition {
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: DispositionCategory::from_str(&category).map_err(|e| StoreError::corrupt(&code, e))?,
        is_active: row.try_get("is_active")?,
        requires_followup: row.try_get("requires_followup")?,
        origin: DispositionOrigin::from_str(&origin).map_err(|e| StoreError::corrupt(&code, e))?,
        created_at: parse_utc(&code, &created_at)?,
        code,
    })
}

fn parse_fixed(id: &str, value: &str) -> StoreResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| StoreError::corrupt(id, format!("bad timestamp '{}': {}", value, e)))
}

fn parse_utc(id: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    parse_fixed(id, value).map(|t| t.with_timezone(&Utc))
}
