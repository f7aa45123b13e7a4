//! # Webhook decoding
//!
//! The first three pipeline stages, all pure functions of the delivery:
//!
//! ```text
//! body bytes ──▶ extract ──▶ fields ──▶ normalize ──▶ direction
//!               (Payload)   (RawFields) (NormalizedCall) (CallDirection)
//! ```
//!
//! - [`extract`] recovers a key/value map from plain JSON, JSON smuggled in
//!   as a form key, or ordinary form pairs.
//! - [`fields`] declares every accepted field-name alias in one place.
//! - [`normalize`] resolves the customer number, repairs timestamps, maps
//!   statuses and pulls out staff and disposition details.
//! - [`direction`] decides inbound vs. outbound.

pub mod direction;
pub mod extract;
pub mod fields;
pub mod normalize;

pub use direction::{classify_direction, explicit_direction, DirectionSource};
pub use extract::{extract_payload, try_extract_payload, ExtractionPath, Payload};
pub use fields::{RawAgent, RawDisposition, RawFields};
pub use normalize::{map_status, repair_offset, FieldNormalizer, NormalizedCall};
