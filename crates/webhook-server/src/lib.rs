//! # Callbridge Webhook Server
//!
//! axum front end for [`callbridge_ingest_core`]: one endpoint receives
//! provider deliveries in whatever encoding they arrive in and hands the raw
//! body to the [`WebhookEngine`](callbridge_ingest_core::WebhookEngine).

pub mod api;

pub use api::{create_router, AppState};
