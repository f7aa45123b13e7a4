//! Error types for webhook ingestion

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for record store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while turning a webhook delivery into a call record
#[derive(Debug, Error)]
pub enum Error {
    /// The transport body could not be read as a key/value map
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// One or more required canonical fields are missing or invalid
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// An outbound event is not a legitimate callback. Expected outcome, not a fault.
    #[error("Outbound call ignored - {0}")]
    CallbackRejected(RejectionReason),

    /// The record store itself failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Field-level error map suitable for the webhook response body.
    ///
    /// Returns `None` for faults (store, config) that have no field detail.
    pub fn field_errors(&self) -> Option<BTreeMap<String, String>> {
        match self {
            Error::Validation(errors) => Some(errors.to_map()),
            Error::CallbackRejected(_) => {
                let mut map = BTreeMap::new();
                map.insert("call_direction".to_string(), self.to_string());
                Some(map)
            }
            Error::MalformedPayload(msg) => {
                let mut map = BTreeMap::new();
                map.insert("payload".to_string(), msg.clone());
                Some(map)
            }
            Error::Store(_) | Error::Config(_) => None,
        }
    }

    /// Whether this error is a rejection of the input rather than a system failure
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::CallbackRejected(_) | Error::MalformedPayload(_)
        )
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

/// Every missing or invalid required field found in one payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`
    pub fn add(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            reason: reason.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Whether a failure was recorded for `field`
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.errors
            .iter()
            .map(|e| (e.field.clone(), e.reason.clone()))
            .collect()
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", error.field, error.reason)?;
            first = false;
        }
        Ok(())
    }
}

/// Why an outbound event was not accepted as a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// No inbound call from the customer inside the lookback window
    NoPendingMissedCall,
    /// The customer's latest inbound call was answered
    LatestCallNotMissed,
    /// The customer's latest missed call was already returned
    AlreadyContacted,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::NoPendingMissedCall => "no pending missed incoming call found",
            RejectionReason::LatestCallNotMissed => "latest call is not missed",
            RejectionReason::AlreadyContacted => "already contacted",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by record store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be mapped back to a domain value
    #[error("Corrupt record {id}: {details}")]
    Corrupt { id: String, details: String },

    #[error("Disposition already exists: {0}")]
    DispositionExists(String),
}

impl StoreError {
    pub fn corrupt(id: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Corrupt {
            id: id.into(),
            details: details.into(),
        }
    }
}
