//! Direction classification
//!
//! Most deliveries carry no direction at all. Agent presence is the only
//! reliable implicit signal (staff are attached to calls they place), so it
//! decides by default; an explicit `direction` or `call_direction` field
//! overrides it when it holds a recognized value.

use tracing::{debug, info};

use super::fields::RawFields;
use super::normalize::NormalizedCall;
use crate::types::CallDirection;

/// What decided the direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionSource {
    /// Agent present → outbound, absent → inbound
    AgentPresence,
    /// The `direction` field
    DirectionField,
    /// The `call_direction` field, consulted only when `direction` is absent
    CallDirectionField,
}

/// The explicit direction carried by the payload, if any.
///
/// `call_direction` is only consulted when `direction` is absent; a present
/// but unrecognized `direction` value does not fall through to it.
pub fn explicit_direction(raw: &RawFields) -> Option<(CallDirection, DirectionSource)> {
    match (&raw.direction, &raw.call_direction) {
        (Some(value), _) => CallDirection::parse_explicit(value).map(|d| (d, DirectionSource::DirectionField)),
        (None, Some(value)) => {
            CallDirection::parse_explicit(value).map(|d| (d, DirectionSource::CallDirectionField))
        }
        (None, None) => None,
    }
}

/// Decide inbound vs. outbound for a normalized call
pub fn classify_direction(call: &NormalizedCall, raw: &RawFields) -> (CallDirection, DirectionSource) {
    let implicit = if call.has_agent() {
        CallDirection::Outbound
    } else {
        CallDirection::Inbound
    };

    match explicit_direction(raw) {
        Some((explicit, source)) => {
            if explicit != implicit {
                info!(
                    call_id = %call.call_id,
                    implicit = %implicit,
                    explicit = %explicit,
                    ?source,
                    "Direction overridden by webhook field"
                );
            }
            (explicit, source)
        }
        None => {
            debug!(
                call_id = %call.call_id,
                direction = %implicit,
                has_agent = call.has_agent(),
                "Direction inferred from agent presence"
            );
            (implicit, DirectionSource::AgentPresence)
        }
    }
}
