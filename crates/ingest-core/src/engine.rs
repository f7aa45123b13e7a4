//! # Webhook engine
//!
//! Runs one delivery through the whole pipeline:
//!
//! ```text
//! body ─▶ extract ─▶ RawFields ─▶ normalize ─▶ classify ─┬─ inbound ──────────────┐
//!                                                        └─ outbound ─▶ claim ────┤
//!                                                                                 ▼
//!                                         resolve disposition ─▶ upsert by call_id
//! ```
//!
//! Validation failures and callback rejections come back as errors the
//! caller reports to the provider; only store failures are faults.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::callback::CallbackMatcher;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::store::CallStore;
use crate::types::{CallDirection, CallFields, CallRecord, DispositionDefaults};
use crate::webhook::{classify_direction, extract_payload, FieldNormalizer, NormalizedCall, RawFields};

/// A stored delivery
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub record: CallRecord,
    /// `false` when an existing record with the same `call_id` was replaced
    pub created: bool,
}

/// Normalizes provider webhooks and persists them as canonical call records
#[derive(Clone)]
pub struct WebhookEngine {
    store: Arc<dyn CallStore>,
    normalizer: FieldNormalizer,
    matcher: CallbackMatcher,
}

impl WebhookEngine {
    pub fn new(store: Arc<dyn CallStore>, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            normalizer: FieldNormalizer::new(config.default_offset()?),
            matcher: CallbackMatcher::new(config.callback_window()),
        })
    }

    /// Engine with a 24 hour callback window and a +05:30 default offset
    pub fn with_defaults(store: Arc<dyn CallStore>) -> Self {
        Self {
            store,
            normalizer: FieldNormalizer::default(),
            matcher: CallbackMatcher::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CallStore> {
        &self.store
    }

    /// Process one delivery at the current time
    pub async fn ingest(&self, body: &[u8], content_type: Option<&str>) -> Result<IngestOutcome> {
        self.ingest_at(body, content_type, Utc::now()).await
    }

    /// Process one delivery as if received at `now`
    pub async fn ingest_at(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        let result = self.run(body, content_type, now).await;

        match &result {
            Ok(outcome) => info!(
                call_id = %outcome.record.call_id,
                direction = %outcome.record.fields.direction,
                status = %outcome.record.fields.status,
                created = outcome.created,
                "Webhook stored"
            ),
            Err(Error::Validation(errors)) => warn!(%errors, "Webhook failed validation"),
            Err(Error::MalformedPayload(msg)) => warn!(%msg, "Webhook payload malformed"),
            // Logged by the matcher
            Err(Error::CallbackRejected(_)) => {}
            Err(e) => error!(error = %e, "Webhook processing failed"),
        }

        result
    }

    async fn run(&self, body: &[u8], content_type: Option<&str>, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let payload = extract_payload(body, content_type);
        let raw = RawFields::from_payload(&payload);
        let call = self.normalizer.normalize(&raw, now)?;
        let (direction, source) = classify_direction(&call, &raw);

        debug!(call_id = %call.call_id, %direction, ?source, "Classified webhook");

        let call_id = call.call_id.clone();
        let mut fields = to_fields(call, direction, Value::Object(payload));

        if direction == CallDirection::Outbound {
            let matched = self
                .matcher
                .claim(self.store.as_ref(), &fields.caller_number, now)
                .await?;
            fields.is_callback = true;
            fields.contacted_at = Some(matched.contacted_at);
            fields.callback_of = Some(matched.inbound_id);
        }

        if let Some(code) = fields.disposition_code.clone() {
            let name = fields.disposition_notes.clone().unwrap_or_else(|| code.clone());
            let (disposition, created) = self
                .store
                .get_or_create_disposition(&code, DispositionDefaults::auto_provisioned(name))
                .await?;
            if created {
                info!(
                    target: "callbridge::disposition",
                    code = %disposition.code,
                    name = %disposition.name,
                    origin = disposition.origin.as_str(),
                    "Auto-created disposition from webhook"
                );
            }
        }

        let result = self.store.upsert_call(&call_id, fields).await?;

        Ok(IngestOutcome {
            record: result.record,
            created: result.created,
        })
    }
}

impl std::fmt::Debug for WebhookEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookEngine")
            .field("normalizer", &self.normalizer)
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

fn to_fields(call: NormalizedCall, direction: CallDirection, raw_payload: Value) -> CallFields {
    // The stored number is always the customer's: for outbound calls the
    // dialled number, for inbound calls the caller.
    let caller_number = match direction {
        CallDirection::Outbound => call.customer_number,
        CallDirection::Inbound => call.caller_number,
    };

    CallFields {
        provider_session_id: call.provider_session_id,
        caller_number,
        caller_name: call.caller_name,
        start_time: call.start_time,
        end_time: call.end_time,
        duration_seconds: call.duration_seconds,
        status: call.status,
        direction,
        is_callback: false,
        callback_of: None,
        contacted_at: None,
        staff_name: call.staff_name,
        staff_id: call.staff_id,
        recording_url: call.recording_url,
        disposition_code: call.disposition_code,
        disposition_notes: call.disposition_notes,
        customer: call.customer,
        raw_payload,
    }
}

/// Provider reply for one delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookReply {
    /// `"success"` or `"error"`
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl WebhookReply {
    pub fn success(outcome: &IngestOutcome) -> Self {
        Self {
            status: "success".to_string(),
            message: "Call data received successfully".to_string(),
            call_id: Some(outcome.record.call_id.clone()),
            created: Some(outcome.created),
            errors: None,
        }
    }

    pub fn failure(error: &Error) -> Self {
        let message = match error.field_errors() {
            Some(_) => "Invalid data received",
            None => "Failed to process call data",
        };
        Self {
            status: "error".to_string(),
            message: message.to_string(),
            call_id: None,
            created: None,
            errors: error.field_errors(),
        }
    }

    pub fn from_result(result: &Result<IngestOutcome>) -> Self {
        match result {
            Ok(outcome) => Self::success(outcome),
            Err(e) => Self::failure(e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
