//! Typed view over an extracted payload
//!
//! Every field name the engine accepts, provider-specific or standard, is
//! declared here and read in one pass by [`RawFields::from_payload`]. Nothing
//! else in the crate probes the payload map by key.

use serde_json::Value;

use super::extract::Payload;

/// Agent object as sent by the provider: `{"name": ..., "id": ...}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAgent {
    pub name: Option<String>,
    pub id: Option<String>,
}

/// Disposition object as sent by the provider: `{"code": ..., "note": ..., "name": ...}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDisposition {
    pub code: Option<String>,
    pub note: Option<String>,
    pub name: Option<String>,
}

/// All recognized webhook fields. Blank strings are read as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    pub call_id: Option<String>,
    /// `call_sid`
    pub session_id: Option<String>,

    /// Provider `caller_id_number`
    pub caller_id_number: Option<String>,
    /// Provider `call_to_number`
    pub call_to_number: Option<String>,
    /// Standard `caller_number`
    pub caller_number: Option<String>,
    pub caller_name: Option<String>,

    /// Provider `start_stamp`
    pub start_stamp: Option<String>,
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    /// Standard `call_start_time`
    pub call_start_time: Option<String>,
    /// Provider `end_stamp`
    pub end_stamp: Option<String>,
    pub end_date: Option<String>,
    pub end_time: Option<String>,
    /// Standard `call_end_time`
    pub call_end_time: Option<String>,

    /// Provider `duration` (kept raw so a bad value can be ignored)
    pub duration: Option<Value>,
    /// Standard `call_duration`
    pub call_duration: Option<Value>,

    pub call_status: Option<String>,

    /// Explicit `direction`
    pub direction: Option<String>,
    /// Explicit `call_direction`
    pub call_direction: Option<String>,

    /// Structured `agent` object
    pub agent: Option<RawAgent>,
    /// Flat `agent_name`
    pub agent_name: Option<String>,
    /// Standard `staff_name`
    pub staff_name: Option<String>,
    /// Standard `staff_id`
    pub staff_id: Option<String>,

    /// Structured `disposition` object
    pub disposition: Option<RawDisposition>,
    /// Standard `disposition_code`
    pub disposition_code: Option<String>,
    /// Standard `disposition_notes`
    pub disposition_notes: Option<String>,

    pub recording_url: Option<String>,

    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_variant: Option<String>,
    pub is_lead: Option<bool>,
    pub lead_quality: Option<String>,
}

impl RawFields {
    pub fn from_payload(payload: &Payload) -> Self {
        let text = |key: &str| payload.get(key).and_then(scalar_text);
        let raw = |key: &str| payload.get(key).filter(|v| !v.is_null()).cloned();

        Self {
            call_id: text("call_id"),
            session_id: text("call_sid"),

            caller_id_number: text("caller_id_number"),
            call_to_number: text("call_to_number"),
            caller_number: text("caller_number"),
            caller_name: text("caller_name"),

            start_stamp: text("start_stamp"),
            start_date: text("start_date"),
            start_time: text("start_time"),
            call_start_time: text("call_start_time"),
            end_stamp: text("end_stamp"),
            end_date: text("end_date"),
            end_time: text("end_time"),
            call_end_time: text("call_end_time"),

            duration: raw("duration"),
            call_duration: raw("call_duration"),

            call_status: text("call_status"),

            direction: text("direction"),
            call_direction: text("call_direction"),

            agent: payload.get("agent").and_then(Value::as_object).map(|obj| RawAgent {
                name: obj.get("name").and_then(scalar_text),
                id: obj.get("id").and_then(scalar_text),
            }),
            agent_name: text("agent_name"),
            staff_name: text("staff_name"),
            staff_id: text("staff_id"),

            disposition: payload
                .get("disposition")
                .and_then(Value::as_object)
                .map(|obj| RawDisposition {
                    code: obj.get("code").and_then(scalar_text),
                    note: obj.get("note").and_then(scalar_text),
                    name: obj.get("name").and_then(scalar_text),
                }),
            disposition_code: text("disposition_code"),
            disposition_notes: text("disposition_notes"),

            recording_url: text("recording_url"),

            customer_name: text("customer_name"),
            customer_email: text("customer_email"),
            customer_address: text("customer_address"),
            vehicle_model: text("vehicle_model"),
            vehicle_variant: text("vehicle_variant"),
            is_lead: payload.get("is_lead").and_then(scalar_bool),
            lead_quality: text("lead_quality"),
        }
    }
}

/// Strings and numbers as text; blank, null and structured values as `None`
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn scalar_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_provider_fields() {
        let fields = RawFields::from_payload(&payload(json!({
            "call_id": "TEST-DISPOSITION-123",
            "caller_id_number": "+919999888777",
            "start_stamp": "2025-11-07T22:30:00+05:30",
            "duration": "60",
            "agent": {"name": "Test Agent", "id": "TEST001"},
            "disposition": {"name": "Customer Follow Up", "code": "D99", "note": "Testing"},
            "call_status": "Answered"
        })));

        assert_eq!(fields.call_id.as_deref(), Some("TEST-DISPOSITION-123"));
        assert_eq!(fields.caller_id_number.as_deref(), Some("+919999888777"));
        assert_eq!(fields.duration, Some(json!("60")));
        assert_eq!(
            fields.agent,
            Some(RawAgent {
                name: Some("Test Agent".to_string()),
                id: Some("TEST001".to_string())
            })
        );
        assert_eq!(fields.disposition.unwrap().code.as_deref(), Some("D99"));
    }

    #[test]
    fn test_numbers_become_text_and_blanks_vanish() {
        let fields = RawFields::from_payload(&payload(json!({
            "call_id": 98765,
            "caller_number": "   ",
            "agent": {"id": 42, "name": ""},
            "is_lead": "true"
        })));

        assert_eq!(fields.call_id.as_deref(), Some("98765"));
        assert_eq!(fields.caller_number, None);
        let agent = fields.agent.unwrap();
        assert_eq!(agent.id.as_deref(), Some("42"));
        assert_eq!(agent.name, None);
        assert_eq!(fields.is_lead, Some(true));
    }

    #[test]
    fn test_non_object_agent_is_ignored() {
        let fields = RawFields::from_payload(&payload(json!({"agent": "Amit"})));
        assert_eq!(fields.agent, None);
    }
}
