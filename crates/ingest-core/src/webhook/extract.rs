//! Payload extraction from the provider's transport body
//!
//! The provider posts its JSON document *as a form key*: the body is the
//! percent-encoded JSON followed by `=`. Recording URLs inside the document
//! carry their own `?`, `&` and `=`, so ordinary form parsing splits the
//! document apart. Extraction therefore works on the decoded text and cuts
//! the JSON back out at the last closing brace that precedes an `=`.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Extracted webhook fields, keyed by provider field name
pub type Payload = Map<String, Value>;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Which decoding path produced the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPath {
    /// Body was a plain JSON object
    Json,
    /// Body was a JSON document smuggled in as a form key
    EmbeddedFormKey,
    /// Body was ordinary `key=value` form data
    FormPairs,
}

/// Extract a payload, recovering every failure into an empty map.
///
/// An empty map is rejected downstream for its missing required fields, so
/// a garbled delivery still yields a field-level error rather than a fault.
pub fn extract_payload(body: &[u8], content_type: Option<&str>) -> Payload {
    match try_extract_payload(body, content_type) {
        Ok((payload, path)) => {
            debug!(?path, keys = payload.len(), "Extracted webhook payload");
            payload
        }
        Err(e) => {
            warn!(error = %e, body_len = body.len(), "Could not extract webhook payload, treating as empty");
            Map::new()
        }
    }
}

/// Extract a payload, reporting which path was used
pub fn try_extract_payload(body: &[u8], content_type: Option<&str>) -> Result<(Payload, ExtractionPath)> {
    // Standard path first: decoding a real JSON body would turn `+` in phone numbers into spaces
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        return Ok((map, ExtractionPath::Json));
    }

    let decoded = decode_form_text(body);
    let trimmed = decoded.trim_start();

    if trimmed.starts_with('{') {
        let document = embedded_json(trimmed);
        debug!(len = document.len(), "Parsing JSON embedded as form key");
        return match serde_json::from_str::<Value>(document) {
            Ok(Value::Object(map)) => Ok((map, ExtractionPath::EmbeddedFormKey)),
            Ok(other) => Err(Error::MalformedPayload(format!(
                "embedded document is {} not an object",
                json_kind(&other)
            ))),
            Err(e) => Err(Error::MalformedPayload(format!("embedded JSON: {}", e))),
        };
    }

    if is_form_content_type(content_type) {
        let map: Payload = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();
        if !map.is_empty() {
            return Ok((map, ExtractionPath::FormPairs));
        }
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(other) => Err(Error::MalformedPayload(format!(
            "body is {} not an object",
            json_kind(&other)
        ))),
        Err(e) => Err(Error::MalformedPayload(e.to_string())),
    }
}

/// Percent-decode with `+` read as a space
fn decode_form_text(body: &[u8]) -> String {
    let plus_as_space: Vec<u8> = body
        .iter()
        .map(|b| if *b == b'+' { b' ' } else { *b })
        .collect();
    String::from_utf8_lossy(&urlencoding::decode_binary(&plus_as_space)).into_owned()
}

/// Cut the JSON document out of decoded `{...}=` text.
///
/// Prefers the last `}"=`, then the last `}=`; keeps everything through the
/// brace. Without either marker the whole text is returned.
fn embedded_json(decoded: &str) -> &str {
    if let Some(pos) = decoded.rfind("}\"=") {
        return &decoded[..=pos];
    }
    if let Some(pos) = decoded.rfind("}=") {
        return &decoded[..=pos];
    }
    decoded
}

fn is_form_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
        .unwrap_or(false)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
