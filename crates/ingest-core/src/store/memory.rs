//! In-memory record store

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{CallStore, UpsertResult};
use crate::callback::PhoneMatch;
use crate::error::{StoreError, StoreResult};
use crate::types::{CallDirection, CallFields, CallRecord, Disposition, DispositionDefaults};

/// `DashMap`-backed [`CallStore`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryCallStore {
    /// call_id -> record
    calls: Arc<DashMap<String, CallRecord>>,
    /// id -> call_id
    ids: Arc<DashMap<String, String>>,
    dispositions: Arc<DashMap<String, Disposition>>,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn call_id_for(&self, id: &str) -> Option<String> {
        self.ids.get(id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn get_call(&self, id: &str) -> StoreResult<Option<CallRecord>> {
        let Some(call_id) = self.call_id_for(id) else {
            return Ok(None);
        };
        Ok(self.calls.get(&call_id).map(|entry| entry.value().clone()))
    }

    async fn get_call_by_call_id(&self, call_id: &str) -> StoreResult<Option<CallRecord>> {
        Ok(self.calls.get(call_id).map(|entry| entry.value().clone()))
    }

    async fn upsert_call(&self, call_id: &str, mut fields: CallFields) -> StoreResult<UpsertResult> {
        let now = Utc::now();

        match self.calls.entry(call_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if fields.contacted_at.is_none() {
                    fields.contacted_at = record.fields.contacted_at;
                }
                record.fields = fields;
                record.updated_at = now;
                Ok(UpsertResult {
                    record: record.clone(),
                    created: false,
                })
            }
            Entry::Vacant(entry) => {
                let record = CallRecord {
                    id: CallRecord::new_id(),
                    call_id: call_id.to_string(),
                    fields,
                    created_at: now,
                    updated_at: now,
                };
                self.ids.insert(record.id.clone(), call_id.to_string());
                entry.insert(record.clone());
                Ok(UpsertResult { record, created: true })
            }
        }
    }

    async fn find_recent_inbound(
        &self,
        phone: &PhoneMatch,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<CallRecord>> {
        let latest = self
            .calls
            .iter()
            .filter(|entry| {
                let fields = &entry.value().fields;
                fields.direction == CallDirection::Inbound
                    && fields.start_time.with_timezone(&Utc) >= since
                    && phone.matches(&fields.caller_number)
            })
            .max_by_key(|entry| entry.value().fields.start_time)
            .map(|entry| entry.value().clone());
        Ok(latest)
    }

    async fn mark_contacted(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let Some(call_id) = self.call_id_for(id) else {
            return Ok(false);
        };
        // The shard write lock makes check-and-set atomic
        let Some(mut record) = self.calls.get_mut(&call_id) else {
            return Ok(false);
        };
        if record.fields.contacted_at.is_some() {
            return Ok(false);
        }
        record.fields.contacted_at = Some(at);
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn get_disposition(&self, code: &str) -> StoreResult<Option<Disposition>> {
        Ok(self.dispositions.get(code).map(|entry| entry.value().clone()))
    }

    async fn get_or_create_disposition(
        &self,
        code: &str,
        defaults: DispositionDefaults,
    ) -> StoreResult<(Disposition, bool)> {
        match self.dispositions.entry(code.to_string()) {
            Entry::Occupied(entry) => Ok((entry.get().clone(), false)),
            Entry::Vacant(entry) => {
                let disposition = defaults.into_disposition(code, Utc::now());
                entry.insert(disposition.clone());
                Ok((disposition, true))
            }
        }
    }

    async fn create_disposition(&self, code: &str, defaults: DispositionDefaults) -> StoreResult<Disposition> {
        match self.dispositions.entry(code.to_string()) {
            Entry::Occupied(_) => Err(StoreError::DispositionExists(code.to_string())),
            Entry::Vacant(entry) => {
                let disposition = defaults.into_disposition(code, Utc::now());
                entry.insert(disposition.clone());
                Ok(disposition)
            }
        }
    }

    async fn count_calls(&self) -> StoreResult<u64> {
        Ok(self.calls.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::seed_default_dispositions;
    use crate::types::{CallStatus, DispositionCategory, DispositionOrigin};
    use chrono::Duration;

    fn inbound(number: &str, started: DateTime<Utc>) -> CallFields {
        let mut fields = CallFields::new(number, started.into());
        fields.status = CallStatus::Missed;
        fields
    }

    #[tokio::test]
    async fn test_upsert_keeps_identity() {
        let store = InMemoryCallStore::new();
        let now = Utc::now();

        let first = store.upsert_call("CALL-1", inbound("+919876543210", now)).await.unwrap();
        assert!(first.created);

        let mut update = inbound("+919876543210", now);
        update.status = CallStatus::Completed;
        let second = store.upsert_call("CALL-1", update).await.unwrap();

        assert!(!second.created);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(second.record.created_at, first.record.created_at);
        assert_eq!(second.record.fields.status, CallStatus::Completed);
        assert_eq!(store.count_calls().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_does_not_clear_contacted_at() {
        let store = InMemoryCallStore::new();
        let now = Utc::now();
        let id = store.upsert_call("CALL-1", inbound("+919876543210", now)).await.unwrap().record.id;

        assert!(store.mark_contacted(&id, now).await.unwrap());
        assert!(!store.mark_contacted(&id, now).await.unwrap());

        let replayed = store.upsert_call("CALL-1", inbound("+919876543210", now)).await.unwrap();
        assert_eq!(replayed.record.fields.contacted_at, Some(now));
    }

    #[tokio::test]
    async fn test_mark_contacted_unknown_id() {
        let store = InMemoryCallStore::new();
        assert!(!store.mark_contacted("missing", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_recent_inbound_picks_latest_match() {
        let store = InMemoryCallStore::new();
        let now = Utc::now();
        store.upsert_call("OLD", inbound("+919876543210", now - Duration::hours(3))).await.unwrap();
        store.upsert_call("NEW", inbound("9876543210", now - Duration::hours(1))).await.unwrap();
        store.upsert_call("OTHER", inbound("+911111111111", now)).await.unwrap();

        let mut outbound = inbound("+919876543210", now);
        outbound.direction = CallDirection::Outbound;
        store.upsert_call("OUT", outbound).await.unwrap();

        let found = store
            .find_recent_inbound(&PhoneMatch::new("9876543210"), now - Duration::hours(24))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.call_id, "NEW");

        let none = store
            .find_recent_inbound(&PhoneMatch::new("9876543210"), now - Duration::minutes(30))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_dispositions() {
        let store = InMemoryCallStore::new();

        let (created, was_created) = store
            .get_or_create_disposition("HOT", DispositionDefaults::auto_provisioned("Hot lead"))
            .await
            .unwrap();
        assert!(was_created);
        assert_eq!(created.origin, DispositionOrigin::Webhook);

        let (again, was_created) = store
            .get_or_create_disposition("HOT", DispositionDefaults::auto_provisioned("Other name"))
            .await
            .unwrap();
        assert!(!was_created);
        assert_eq!(again.name, "Hot lead");

        let err = store
            .create_disposition(
                "HOT",
                DispositionDefaults::admin("Hot", "Hot lead", DispositionCategory::Sales, true),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DispositionExists(code) if code == "HOT"));
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = InMemoryCallStore::new();
        let created = seed_default_dispositions(&store).await.unwrap();
        assert_eq!(created, 10);
        assert_eq!(seed_default_dispositions(&store).await.unwrap(), 0);
    }
}
