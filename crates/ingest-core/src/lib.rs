//! # Callbridge Ingest Core
//!
//! Webhook normalization and callback correlation for telephony provider
//! call events.
//!
//! This crate provides:
//! - Payload extraction from JSON, JSON smuggled in as a form key, or form pairs
//! - Field normalization onto one canonical call record (aliases, timestamp
//!   repair, status mapping, staff and disposition details)
//! - Inbound/outbound classification
//! - Callback matching: outbound calls are only recorded when they return a
//!   pending missed call, which is claimed atomically
//! - Idempotent upsert by provider `call_id` into a [`CallStore`]
//!
//! ## Architecture
//!
//! [`WebhookEngine`] owns the pipeline and talks to persistence only through
//! the [`CallStore`] trait. [`SqliteCallStore`] is the production store;
//! [`InMemoryCallStore`] serves tests and single-process use.

pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;
pub mod webhook;

pub use callback::{CallbackMatch, CallbackMatcher, PhoneMatch};
pub use crate::config::{CallbridgeConfig, EngineConfig};
pub use engine::{IngestOutcome, WebhookEngine, WebhookReply};
pub use error::{Error, RejectionReason, Result, StoreError, ValidationErrors};
pub use logging::{setup_logging, LoggingConfig};
pub use store::{seed_default_dispositions, CallStore, InMemoryCallStore, SqliteCallStore, UpsertResult};
pub use types::{
    CallDirection, CallFields, CallRecord, CallStatus, CustomerDetails, Disposition, DispositionCategory,
    DispositionDefaults, DispositionOrigin, LeadQuality,
};

/// Connect the configured SQLite store and build an engine over it
pub async fn init(config: &CallbridgeConfig) -> Result<WebhookEngine> {
    let store = SqliteCallStore::new(&config.database_url).await?;
    WebhookEngine::new(std::sync::Arc::new(store), &config.engine)
}
