//! # Record store
//!
//! The narrow persistence interface the engine needs. Querying, listing and
//! any administrative CRUD live outside this crate; here a store only has to
//! look records up, upsert them atomically by `call_id`, find the latest
//! inbound call for a customer, and claim a missed call with a
//! compare-and-set.
//!
//! Two implementations ship with the crate:
//!
//! - [`InMemoryCallStore`]: `DashMap`-backed, for tests and single-process use
//! - [`SqliteCallStore`]: `sqlx` over SQLite, schema created on connect
//!
//! Both keep `contacted_at` monotonic: an upsert never clears a value that is
//! already set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::callback::PhoneMatch;
use crate::error::StoreResult;
use crate::types::{default_dispositions, CallFields, CallRecord, Disposition, DispositionDefaults};

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryCallStore;
pub use sqlite::SqliteCallStore;

/// Result of an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertResult {
    pub record: CallRecord,
    /// `true` when no record with this `call_id` existed before
    pub created: bool,
}

/// Persistence operations required by the ingestion engine
#[async_trait]
pub trait CallStore: Send + Sync {
    /// Look a record up by its store id
    async fn get_call(&self, id: &str) -> StoreResult<Option<CallRecord>>;

    /// Look a record up by the provider's call id
    async fn get_call_by_call_id(&self, call_id: &str) -> StoreResult<Option<CallRecord>>;

    /// Atomically create or replace the record for `call_id`.
    ///
    /// Replacing keeps `id` and `created_at`, and keeps an existing
    /// `contacted_at` when `fields.contacted_at` is `None`.
    async fn upsert_call(&self, call_id: &str, fields: CallFields) -> StoreResult<UpsertResult>;

    /// Most recent inbound record (by start time) since `since` whose number matches
    async fn find_recent_inbound(
        &self,
        phone: &PhoneMatch,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<CallRecord>>;

    /// Set `contacted_at` only if it is still unset. Returns `false` when the
    /// record was already contacted or does not exist.
    async fn mark_contacted(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool>;

    async fn get_disposition(&self, code: &str) -> StoreResult<Option<Disposition>>;

    /// Resolve `code`, creating it from `defaults` when unknown.
    /// The flag is `true` when the disposition was created by this call.
    async fn get_or_create_disposition(
        &self,
        code: &str,
        defaults: DispositionDefaults,
    ) -> StoreResult<(Disposition, bool)>;

    /// Administrative create; fails if the code exists
    async fn create_disposition(&self, code: &str, defaults: DispositionDefaults) -> StoreResult<Disposition>;

    async fn count_calls(&self) -> StoreResult<u64>;
}

/// Install the standard disposition catalog, leaving existing codes untouched.
/// Returns how many entries were created.
pub async fn seed_default_dispositions(store: &dyn CallStore) -> StoreResult<usize> {
    let mut created = 0;
    for (code, defaults) in default_dispositions() {
        let (_, was_created) = store.get_or_create_disposition(code, defaults).await?;
        if was_created {
            created += 1;
        }
    }
    tracing::info!(created, "Seeded default dispositions");
    Ok(created)
}
