//! Field normalization
//!
//! Maps [`RawFields`] onto the canonical call schema: resolves which number
//! belongs to the customer, repairs the provider's timestamps, maps free-text
//! statuses, and picks staff and disposition details out of whichever shape
//! they arrived in. Only a missing call id or caller number rejects a
//! payload; everything else degrades to a default.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::direction::explicit_direction;
use super::fields::RawFields;
use crate::error::ValidationErrors;
use crate::types::{CallDirection, CallStatus, CustomerDetails, LeadQuality};

const STAFF_NAME_MAX: usize = 200;
const STAFF_ID_MAX: usize = 50;
const DISPOSITION_CODE_MAX: usize = 50;

/// `<date+time> HH:MM` where the `+` of the offset was lost to form decoding
static SPACED_OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<stamp>.*\d:\d{2}(?:\.\d+)?) (?P<offset>\d{2}:?\d{2})$").unwrap());

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A payload mapped onto canonical fields, before direction is known
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCall {
    pub call_id: String,
    pub provider_session_id: Option<String>,
    /// Resolved per the caller-number tie-break
    pub caller_number: String,
    /// Number the matcher correlates on: call-to when present, else the caller number
    pub customer_number: String,
    pub caller_name: Option<String>,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub duration_seconds: u32,
    pub status: CallStatus,
    pub staff_name: Option<String>,
    pub staff_id: Option<String>,
    pub disposition_code: Option<String>,
    pub disposition_notes: Option<String>,
    pub recording_url: Option<String>,
    pub customer: CustomerDetails,
}

impl NormalizedCall {
    /// Whether staff/agent information was found in the payload
    pub fn has_agent(&self) -> bool {
        self.staff_name.is_some()
    }
}

/// Maps raw webhook fields onto the canonical schema
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    default_offset: FixedOffset,
}

impl FieldNormalizer {
    /// `default_offset` is applied to timestamps that carry none
    pub fn new(default_offset: FixedOffset) -> Self {
        Self { default_offset }
    }

    pub fn normalize(&self, raw: &RawFields, now: DateTime<Utc>) -> Result<NormalizedCall, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if raw.call_id.is_none() {
            errors.add("call_id", "This field is required.");
        }
        let caller_number = resolve_caller_number(raw);
        if caller_number.is_none() {
            errors.add(
                "caller_number",
                "This field is required (caller_number or caller_id_number).",
            );
        }

        let (Some(call_id), Some(caller_number)) = (raw.call_id.clone(), caller_number) else {
            return Err(errors);
        };

        let customer_number = raw
            .call_to_number
            .clone()
            .unwrap_or_else(|| caller_number.clone());

        let start_time = self
            .resolve_timestamp(
                "start",
                [raw.start_stamp.as_deref(), raw.call_start_time.as_deref()],
                raw.start_date.as_deref(),
                raw.start_time.as_deref(),
            )
            .unwrap_or_else(|| {
                info!(call_id = %call_id, "No usable start time, using processing time");
                now.with_timezone(&self.default_offset)
            });

        let mut end_time = self.resolve_timestamp(
            "end",
            [raw.end_stamp.as_deref(), raw.call_end_time.as_deref()],
            raw.end_date.as_deref(),
            raw.end_time.as_deref(),
        );
        if let Some(end) = end_time {
            if end < start_time {
                warn!(call_id = %call_id, %start_time, %end, "End time precedes start time, dropping it");
                end_time = None;
            }
        }

        let duration_seconds = resolve_duration(raw.duration.as_ref(), raw.call_duration.as_ref());

        let status = match raw.call_status.as_deref() {
            Some(text) => map_status(text),
            None => CallStatus::Ringing,
        };

        let (staff_name, staff_id) = resolve_staff(raw);
        let (disposition_code, disposition_notes) = resolve_disposition(raw);

        let recording_url = raw.recording_url.as_deref().and_then(|value| match url::Url::parse(value) {
            Ok(_) => Some(value.to_string()),
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "Ignoring invalid recording URL");
                None
            }
        });

        let customer = CustomerDetails {
            name: raw.customer_name.clone(),
            email: raw.customer_email.as_deref().and_then(|email| {
                if looks_like_email(email) {
                    Some(email.to_string())
                } else {
                    warn!(call_id = %call_id, "Ignoring invalid customer email");
                    None
                }
            }),
            address: raw.customer_address.clone(),
            vehicle_model: raw.vehicle_model.clone(),
            vehicle_variant: raw.vehicle_variant.clone(),
            is_lead: raw.is_lead.unwrap_or(false),
            lead_quality: raw.lead_quality.as_deref().and_then(|value| {
                value
                    .parse::<LeadQuality>()
                    .map_err(|e| warn!(call_id = %call_id, error = %e, "Ignoring lead quality"))
                    .ok()
            }),
        };

        Ok(NormalizedCall {
            call_id,
            provider_session_id: raw.session_id.clone(),
            caller_number,
            customer_number,
            caller_name: raw.caller_name.clone(),
            start_time,
            end_time,
            duration_seconds,
            status,
            staff_name,
            staff_id,
            disposition_code,
            disposition_notes,
            recording_url,
            customer,
        })
    }

    /// First parseable stamp wins; otherwise rebuild from date + time
    fn resolve_timestamp(
        &self,
        label: &str,
        stamps: [Option<&str>; 2],
        date: Option<&str>,
        time: Option<&str>,
    ) -> Option<DateTime<FixedOffset>> {
        for stamp in stamps.into_iter().flatten() {
            if is_placeholder(stamp) {
                debug!(label, stamp, "Timestamp is a placeholder");
                continue;
            }
            match self.parse_timestamp(stamp) {
                Some(parsed) => return Some(parsed),
                None => warn!(label, stamp, "Unparseable timestamp"),
            }
        }

        let (date, time) = (date?, time?);
        let rebuilt = self.reconstruct(date, time);
        match rebuilt {
            Some(ts) => info!(label, date, time, rebuilt = %ts, "Rebuilt timestamp from date and time fields"),
            None => warn!(label, date, time, "Could not rebuild timestamp"),
        }
        rebuilt
    }

    /// Parse a provider timestamp, repairing a space-separated offset first
    pub fn parse_timestamp(&self, value: &str) -> Option<DateTime<FixedOffset>> {
        let value = value.trim();
        let repaired = repair_offset(value);
        if repaired != value {
            debug!(original = value, repaired = %repaired, "Repaired timestamp offset");
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(&repaired) {
            return Some(ts);
        }
        for format in OFFSET_FORMATS {
            if let Ok(ts) = DateTime::parse_from_str(&repaired, format) {
                return Some(ts);
            }
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(&repaired, format) {
                return self.default_offset.from_local_datetime(&naive).single();
            }
        }
        None
    }

    /// Combine `YYYY-MM-DD` and `HH:MM:SS`, folding an hour of 24 or more back into the day
    pub fn reconstruct(&self, date: &str, time: &str) -> Option<DateTime<FixedOffset>> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;

        let parts: Vec<&str> = time.trim().split(':').collect();
        let [hour, minute, second] = parts.as_slice() else {
            return None;
        };
        let hour = hour.parse::<u32>().ok()? % 24;
        let minute = minute.parse::<u32>().ok()?;
        let second = second.parse::<u32>().ok()?;
        let time = NaiveTime::from_hms_opt(hour, minute, second)?;

        self.default_offset
            .from_local_datetime(&date.and_time(time))
            .single()
    }
}

impl Default for FieldNormalizer {
    fn default() -> Self {
        Self::new(FixedOffset::east_opt(19_800).expect("+05:30 is a valid offset"))
    }
}

/// `"2025-11-07T12:42:23 05:30"` becomes `"2025-11-07T12:42:23+05:30"`
pub fn repair_offset(value: &str) -> String {
    match SPACED_OFFSET.captures(value) {
        Some(caps) => format!("{}+{}", &caps["stamp"], &caps["offset"]),
        None => value.to_string(),
    }
}

/// Map the provider's free-text status onto the canonical set
pub fn map_status(value: &str) -> CallStatus {
    match value.trim().to_lowercase().as_str() {
        "answered" | "completed" | "hangup" | "disconnected" => CallStatus::Completed,
        "ringing" => CallStatus::Ringing,
        "busy" => CallStatus::Busy,
        "no-answer" | "noanswer" | "no answer" => CallStatus::NoAnswer,
        "missed" | "missed call" | "not answered" | "unanswered" => CallStatus::Missed,
        "failed" => CallStatus::Failed,
        _ => CallStatus::Completed,
    }
}

/// Outbound with a call-to number: the call-to number. Otherwise the caller id,
/// then whichever number is present.
fn resolve_caller_number(raw: &RawFields) -> Option<String> {
    let explicit_outbound = matches!(
        explicit_direction(raw),
        Some((CallDirection::Outbound, _))
    );

    if explicit_outbound {
        if let Some(to) = &raw.call_to_number {
            return Some(to.clone());
        }
    }

    raw.caller_id_number
        .clone()
        .or_else(|| raw.call_to_number.clone())
        .or_else(|| raw.caller_number.clone())
}

fn resolve_duration(provider: Option<&Value>, standard: Option<&Value>) -> u32 {
    [provider, standard]
        .into_iter()
        .flatten()
        .find_map(|value| {
            let parsed = parse_duration(value);
            if parsed.is_none() {
                debug!(%value, "Ignoring unparseable duration");
            }
            parsed
        })
        .unwrap_or(0)
}

fn parse_duration(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f.trunc() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn resolve_staff(raw: &RawFields) -> (Option<String>, Option<String>) {
    if let Some(agent) = &raw.agent {
        return (
            agent.name.as_deref().map(|n| truncate(n, STAFF_NAME_MAX)),
            agent.id.as_deref().map(|id| truncate(id, STAFF_ID_MAX)),
        );
    }
    if let Some(name) = &raw.agent_name {
        return (
            Some(truncate(name, STAFF_NAME_MAX)),
            raw.staff_id.as_deref().map(|id| truncate(id, STAFF_ID_MAX)),
        );
    }
    (
        raw.staff_name.as_deref().map(|n| truncate(n, STAFF_NAME_MAX)),
        raw.staff_id.as_deref().map(|id| truncate(id, STAFF_ID_MAX)),
    )
}

/// Code and notes; the note wins over the name
fn resolve_disposition(raw: &RawFields) -> (Option<String>, Option<String>) {
    match &raw.disposition {
        Some(disp) => (
            disp.code.as_deref().map(|c| truncate(c, DISPOSITION_CODE_MAX)),
            disp.note.clone().or_else(|| disp.name.clone()),
        ),
        None => (
            raw.disposition_code.as_deref().map(|c| truncate(c, DISPOSITION_CODE_MAX)),
            raw.disposition_notes.clone(),
        ),
    }
}

fn is_placeholder(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    lowered.is_empty() || lowered == "invalid date" || lowered == "none"
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !value.contains(char::is_whitespace),
        None => false,
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::fields::{RawAgent, RawDisposition};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn ist(value: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(value).unwrap()
    }

    fn base_raw() -> RawFields {
        RawFields {
            call_id: Some("CALL-1".to_string()),
            caller_id_number: Some("+919876543210".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_repair_space_separated_offset() {
        assert_eq!(repair_offset("2025-11-07T12:42:23 05:30"), "2025-11-07T12:42:23+05:30");
        assert_eq!(repair_offset("2025-11-07 12:42:23 05:30"), "2025-11-07 12:42:23+05:30");
        // Date and time separated by a space is not an offset
        assert_eq!(repair_offset("2025-11-07 12:42:23"), "2025-11-07 12:42:23");
        assert_eq!(repair_offset("2025-11-07T12:42:23+05:30"), "2025-11-07T12:42:23+05:30");
    }

    #[test]
    fn test_parse_repaired_timestamp() {
        let normalizer = FieldNormalizer::default();
        assert_eq!(
            normalizer.parse_timestamp("2025-11-07T12:42:23 05:30"),
            Some(ist("2025-11-07T12:42:23+05:30"))
        );
    }

    #[test]
    fn test_naive_timestamp_uses_default_offset() {
        let normalizer = FieldNormalizer::default();
        assert_eq!(
            normalizer.parse_timestamp("2025-11-07T10:00:00.123"),
            Some(ist("2025-11-07T10:00:00.123+05:30"))
        );
    }

    #[test]
    fn test_reconstruct_folds_hour_24() {
        let normalizer = FieldNormalizer::default();
        assert_eq!(
            normalizer.reconstruct("2025-11-13", "24:51:54"),
            Some(ist("2025-11-13T00:51:54+05:30"))
        );
        assert_eq!(normalizer.reconstruct("2025-11-13", "24:51"), None);
        assert_eq!(normalizer.reconstruct("13/11/2025", "10:00:00"), None);
    }

    #[test]
    fn test_invalid_stamp_falls_back_to_date_and_time() {
        let raw = RawFields {
            start_stamp: Some("Invalid date".to_string()),
            start_date: Some("2025-11-13".to_string()),
            start_time: Some("24:51:54".to_string()),
            ..base_raw()
        };
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.start_time, ist("2025-11-13T00:51:54+05:30"));
    }

    #[test]
    fn test_missing_start_uses_processing_time() {
        let now = Utc::now();
        let call = FieldNormalizer::default().normalize(&base_raw(), now).unwrap();
        assert_eq!(call.start_time.with_timezone(&Utc), now);
        assert_eq!(call.end_time, None);
    }

    #[test]
    fn test_end_before_start_is_dropped() {
        let raw = RawFields {
            start_stamp: Some("2025-11-07T12:42:23+05:30".to_string()),
            end_stamp: Some("2025-11-07T12:40:00+05:30".to_string()),
            ..base_raw()
        };
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.end_time, None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status("Answered"), CallStatus::Completed);
        assert_eq!(map_status("HANGUP"), CallStatus::Completed);
        assert_eq!(map_status("Disconnected"), CallStatus::Completed);
        assert_eq!(map_status(" No Answer "), CallStatus::NoAnswer);
        assert_eq!(map_status("noanswer"), CallStatus::NoAnswer);
        assert_eq!(map_status("Not Answered"), CallStatus::Missed);
        assert_eq!(map_status("unanswered"), CallStatus::Missed);
        assert_eq!(map_status("Missed Call"), CallStatus::Missed);
        assert_eq!(map_status("busy"), CallStatus::Busy);
        assert_eq!(map_status("something else"), CallStatus::Completed);
    }

    #[test]
    fn test_absent_status_stays_ringing() {
        let call = FieldNormalizer::default().normalize(&base_raw(), Utc::now()).unwrap();
        assert_eq!(call.status, CallStatus::Ringing);
    }

    #[test]
    fn test_duration_keeps_default_on_bad_input() {
        let mut raw = base_raw();
        raw.duration = Some(Value::String("sixty".to_string()));
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.duration_seconds, 0);

        raw.duration = Some(Value::String("sixty".to_string()));
        raw.call_duration = Some(serde_json::json!(300));
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.duration_seconds, 300);

        raw.duration = Some(Value::String(" 60 ".to_string()));
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.duration_seconds, 60);

        raw.duration = Some(serde_json::json!(-5));
        raw.call_duration = None;
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.duration_seconds, 0);
    }

    #[test]
    fn test_outbound_caller_number_is_the_customer() {
        let raw = RawFields {
            direction: Some("Outbound".to_string()),
            caller_id_number: Some("+911140001000".to_string()),
            call_to_number: Some("9876543210".to_string()),
            ..base_raw()
        };
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.caller_number, "9876543210");
        assert_eq!(call.customer_number, "9876543210");
    }

    #[test]
    fn test_caller_number_fallbacks() {
        let raw = RawFields {
            caller_id_number: None,
            call_to_number: Some("9876543210".to_string()),
            ..base_raw()
        };
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.caller_number, "9876543210");

        let raw = RawFields {
            caller_id_number: None,
            caller_number: Some("+919876543211".to_string()),
            ..base_raw()
        };
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.caller_number, "+919876543211");
        assert_eq!(call.customer_number, "+919876543211");
    }

    #[test]
    fn test_every_missing_required_field_is_reported() {
        let errors = FieldNormalizer::default()
            .normalize(&RawFields::default(), Utc::now())
            .unwrap_err();
        assert!(errors.has_field("call_id"));
        assert!(errors.has_field("caller_number"));
        assert_eq!(errors.errors().len(), 2);
    }

    #[test]
    fn test_agent_object_beats_flat_name() {
        let raw = RawFields {
            agent: Some(RawAgent {
                name: Some("Amit".to_string()),
                id: Some("EMP001".to_string()),
            }),
            agent_name: Some("Someone Else".to_string()),
            ..base_raw()
        };
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.staff_name.as_deref(), Some("Amit"));
        assert_eq!(call.staff_id.as_deref(), Some("EMP001"));
        assert!(call.has_agent());

        let call = FieldNormalizer::default().normalize(&base_raw(), Utc::now()).unwrap();
        assert_eq!((call.staff_name, call.staff_id), (None, None));
    }

    #[test]
    fn test_staff_name_is_truncated() {
        let raw = RawFields {
            agent_name: Some("x".repeat(250)),
            ..base_raw()
        };
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.staff_name.unwrap().chars().count(), 200);
    }

    #[test]
    fn test_disposition_note_preferred_over_name() {
        let raw = RawFields {
            disposition: Some(RawDisposition {
                code: Some("D99".to_string()),
                note: Some("Testing disposition save".to_string()),
                name: Some("Customer Follow Up".to_string()),
            }),
            ..base_raw()
        };
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.disposition_code.as_deref(), Some("D99"));
        assert_eq!(call.disposition_notes.as_deref(), Some("Testing disposition save"));

        let raw = RawFields {
            disposition: Some(RawDisposition {
                code: Some("D98".to_string()),
                note: None,
                name: Some("Customer Follow Up".to_string()),
            }),
            ..base_raw()
        };
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.disposition_notes.as_deref(), Some("Customer Follow Up"));
    }

    #[test]
    fn test_invalid_optional_values_are_dropped() {
        let raw = RawFields {
            recording_url: Some("not a url".to_string()),
            customer_email: Some("raj.kumar".to_string()),
            lead_quality: Some("lukewarm".to_string()),
            ..base_raw()
        };
        let call = FieldNormalizer::default().normalize(&raw, Utc::now()).unwrap();
        assert_eq!(call.recording_url, None);
        assert_eq!(call.customer.email, None);
        assert_eq!(call.customer.lead_quality, None);
    }

    proptest! {
        #[test]
        fn status_mapping_is_total(text in ".*") {
            let _ = map_status(&text);
        }

        #[test]
        fn reconstructed_hour_is_always_in_range(hour in 0u32..100, minute in 0u32..60, second in 0u32..60) {
            let normalizer = FieldNormalizer::default();
            let time = format!("{:02}:{:02}:{:02}", hour, minute, second);
            let ts = normalizer.reconstruct("2025-11-13", &time).unwrap();
            prop_assert_eq!(chrono::Timelike::hour(&ts), hour % 24);
            prop_assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2025, 11, 13).unwrap());
        }
    }
}
