//! # Callback matching
//!
//! An outbound call is only recorded when it returns a customer's missed
//! call. The matcher looks up the customer's latest inbound call inside the
//! lookback window and either claims it or rejects the outbound event:
//!
//! ```text
//!  outbound event (customer number, now)
//!            │
//!            ▼
//!  latest inbound in [now - window, ∞) matching the number
//!            │
//!    ┌───────┼──────────────────┬──────────────────────┐
//!    │ none  │ answered         │ contacted_at set     │ pending
//!    ▼       ▼                  ▼                      ▼
//!  Reject  Reject             Reject            mark_contacted (CAS)
//!  "no pending missed  "latest call is   "already         │
//!   incoming call      not missed"        contacted"   ┌──┴───┐
//!   found"                                              lost  won
//!                                                        │     │
//!                                         "already contacted"  Accept
//! ```
//!
//! Only the customer's *latest* inbound call counts: if they called again
//! and got through, the earlier missed call no longer needs returning.
//!
//! The claim is a compare-and-set on the inbound record's `contacted_at`, so
//! two concurrent outbound events for the same customer cannot both consume
//! one missed call. The claim is persisted before the outbound record is
//! written and is not rolled back if that write fails.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::{Error, RejectionReason, Result};
use crate::store::CallStore;

/// Phone number variants tolerated when correlating the two legs.
///
/// The provider and the dealer's systems disagree on country-code prefixes,
/// so a stored number matches when it is equal, when its digits end with
/// the last ten digits of the customer number, or when it contains the
/// customer number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneMatch {
    exact: String,
    last_ten: Option<String>,
}

impl PhoneMatch {
    pub fn new(customer_number: &str) -> Self {
        let exact = customer_number.trim().to_string();
        let digits: String = exact.chars().filter(|c| c.is_ascii_digit()).collect();
        let last_ten = if digits.len() >= 10 {
            Some(digits[digits.len() - 10..].to_string())
        } else {
            None
        };
        Self { exact, last_ten }
    }

    pub fn number(&self) -> &str {
        &self.exact
    }

    pub fn last_ten_digits(&self) -> Option<&str> {
        self.last_ten.as_deref()
    }

    pub fn matches(&self, stored: &str) -> bool {
        if self.exact.is_empty() {
            return false;
        }
        if stored == self.exact {
            return true;
        }
        if let Some(last_ten) = &self.last_ten {
            let stored_digits: String = stored.chars().filter(|c| c.is_ascii_digit()).collect();
            if stored_digits.ends_with(last_ten.as_str()) {
                return true;
            }
        }
        stored.contains(self.exact.as_str())
    }
}

/// A missed call successfully claimed by an outbound callback
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackMatch {
    /// Store id of the inbound record
    pub inbound_id: String,
    /// Provider call id of the inbound record
    pub inbound_call_id: String,
    /// When the claim was made; also the callback's `contacted_at`
    pub contacted_at: DateTime<Utc>,
}

/// Links outbound calls to the missed inbound calls they return
#[derive(Debug, Clone)]
pub struct CallbackMatcher {
    window: Duration,
}

impl CallbackMatcher {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Find and claim the customer's pending missed call, or reject.
    ///
    /// Returns [`Error::CallbackRejected`] for the three expected rejections
    /// and [`Error::Store`] when the store itself fails.
    pub async fn claim(
        &self,
        store: &dyn CallStore,
        customer_number: &str,
        now: DateTime<Utc>,
    ) -> Result<CallbackMatch> {
        let phone = PhoneMatch::new(customer_number);
        let since = now - self.window;

        debug!(
            customer = phone.number(),
            last_ten = ?phone.last_ten_digits(),
            %since,
            "Looking for pending missed call"
        );

        let latest = store.find_recent_inbound(&phone, since).await?;

        let Some(inbound) = latest else {
            return Err(reject(customer_number, RejectionReason::NoPendingMissedCall));
        };

        if !inbound.fields.status.is_pending_callback() {
            debug!(inbound_call_id = %inbound.call_id, status = %inbound.fields.status, "Latest inbound call was answered");
            return Err(reject(customer_number, RejectionReason::LatestCallNotMissed));
        }

        if let Some(contacted_at) = inbound.fields.contacted_at {
            debug!(inbound_call_id = %inbound.call_id, %contacted_at, "Latest missed call already returned");
            return Err(reject(customer_number, RejectionReason::AlreadyContacted));
        }

        if !store.mark_contacted(&inbound.id, now).await? {
            // Another callback claimed it between our read and write
            debug!(inbound_call_id = %inbound.call_id, "Lost claim on missed call");
            return Err(reject(customer_number, RejectionReason::AlreadyContacted));
        }

        info!(
            customer = customer_number,
            inbound_call_id = %inbound.call_id,
            "Outbound call matched missed call, marked contacted"
        );

        Ok(CallbackMatch {
            inbound_id: inbound.id,
            inbound_call_id: inbound.call_id,
            contacted_at: now,
        })
    }
}

impl Default for CallbackMatcher {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

fn reject(customer_number: &str, reason: RejectionReason) -> Error {
    info!(customer = customer_number, %reason, "Outbound call ignored");
    Error::CallbackRejected(reason)
}
