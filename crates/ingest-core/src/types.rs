//! Core types for callbridge-ingest-core

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Ringing,
    Answered,
    Busy,
    NoAnswer,
    Missed,
    Failed,
    Completed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::Busy => "busy",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Missed => "missed",
            CallStatus::Failed => "failed",
            CallStatus::Completed => "completed",
        }
    }

    /// Statuses that leave an inbound call waiting for a callback
    pub fn is_pending_callback(&self) -> bool {
        matches!(self, CallStatus::Missed | CallStatus::NoAnswer | CallStatus::Busy)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ringing" => Ok(CallStatus::Ringing),
            "answered" => Ok(CallStatus::Answered),
            "busy" => Ok(CallStatus::Busy),
            "no-answer" => Ok(CallStatus::NoAnswer),
            "missed" => Ok(CallStatus::Missed),
            "failed" => Ok(CallStatus::Failed),
            "completed" => Ok(CallStatus::Completed),
            other => Err(format!("unknown call status '{}'", other)),
        }
    }
}

/// Who placed the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Customer calling in
    Inbound,
    /// Staff calling out
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }

    /// Case-insensitive parse of an explicit direction value
    pub fn parse_explicit(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inbound" => Some(CallDirection::Inbound),
            "outbound" => Some(CallDirection::Outbound),
            _ => None,
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_explicit(s).ok_or_else(|| format!("unknown call direction '{}'", s))
    }
}

/// Lead temperature captured by the dealer's agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadQuality {
    Hot,
    Warm,
    Cold,
}

impl LeadQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadQuality::Hot => "hot",
            LeadQuality::Warm => "warm",
            LeadQuality::Cold => "cold",
        }
    }
}

impl FromStr for LeadQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(LeadQuality::Hot),
            "warm" => Ok(LeadQuality::Warm),
            "cold" => Ok(LeadQuality::Cold),
            other => Err(format!("unknown lead quality '{}'", other)),
        }
    }
}

/// Customer and lead details carried by the standard field set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_variant: Option<String>,
    pub is_lead: bool,
    pub lead_quality: Option<LeadQuality>,
}

/// Everything about a call that a webhook delivery can set.
///
/// This is the replaceable part of a [`CallRecord`]; the store owns the
/// identity and bookkeeping columns around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFields {
    pub provider_session_id: Option<String>,
    /// The customer's number, for both directions
    pub caller_number: String,
    pub caller_name: Option<String>,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub duration_seconds: u32,
    pub status: CallStatus,
    pub direction: CallDirection,
    pub is_callback: bool,
    /// Record id of the inbound call this callback answers
    pub callback_of: Option<String>,
    pub contacted_at: Option<DateTime<Utc>>,
    pub staff_name: Option<String>,
    pub staff_id: Option<String>,
    pub recording_url: Option<String>,
    pub disposition_code: Option<String>,
    pub disposition_notes: Option<String>,
    pub customer: CustomerDetails,
    /// Verbatim extracted payload, kept for audit
    pub raw_payload: serde_json::Value,
}

impl CallFields {
    /// A ringing inbound call with no optional data, starting at `start_time`
    pub fn new(caller_number: impl Into<String>, start_time: DateTime<FixedOffset>) -> Self {
        Self {
            provider_session_id: None,
            caller_number: caller_number.into(),
            caller_name: None,
            start_time,
            end_time: None,
            duration_seconds: 0,
            status: CallStatus::Ringing,
            direction: CallDirection::Inbound,
            is_callback: false,
            callback_of: None,
            contacted_at: None,
            staff_name: None,
            staff_id: None,
            recording_url: None,
            disposition_code: None,
            disposition_notes: None,
            customer: CustomerDetails::default(),
            raw_payload: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// One logical phone call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub call_id: String,
    #[serde(flatten)]
    pub fields: CallFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRecord {
    /// Create a new record ID
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Duration as "Xm Ys"
    pub fn duration_formatted(&self) -> String {
        let minutes = self.fields.duration_seconds / 60;
        let seconds = self.fields.duration_seconds % 60;
        format!("{}m {}s", minutes, seconds)
    }

    /// Inbound, in a missed state, and not yet returned
    pub fn is_pending_missed_call(&self) -> bool {
        self.fields.direction == CallDirection::Inbound
            && self.fields.status.is_pending_callback()
            && self.fields.contacted_at.is_none()
    }
}

/// Disposition categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionCategory {
    Inquiry,
    Service,
    Sales,
    Complaint,
    Followup,
    TestDrive,
    Booking,
    Finance,
    Other,
}

impl DispositionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispositionCategory::Inquiry => "inquiry",
            DispositionCategory::Service => "service",
            DispositionCategory::Sales => "sales",
            DispositionCategory::Complaint => "complaint",
            DispositionCategory::Followup => "followup",
            DispositionCategory::TestDrive => "test_drive",
            DispositionCategory::Booking => "booking",
            DispositionCategory::Finance => "finance",
            DispositionCategory::Other => "other",
        }
    }
}

impl FromStr for DispositionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inquiry" => Ok(DispositionCategory::Inquiry),
            "service" => Ok(DispositionCategory::Service),
            "sales" => Ok(DispositionCategory::Sales),
            "complaint" => Ok(DispositionCategory::Complaint),
            "followup" => Ok(DispositionCategory::Followup),
            "test_drive" => Ok(DispositionCategory::TestDrive),
            "booking" => Ok(DispositionCategory::Booking),
            "finance" => Ok(DispositionCategory::Finance),
            "other" => Ok(DispositionCategory::Other),
            other => Err(format!("unknown disposition category '{}'", other)),
        }
    }
}

/// Where a disposition entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispositionOrigin {
    /// Created by an administrator or the seed catalog
    Admin,
    /// Auto-provisioned from an unknown code in a webhook
    Webhook,
}

impl DispositionOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispositionOrigin::Admin => "admin",
            DispositionOrigin::Webhook => "webhook",
        }
    }
}

impl FromStr for DispositionOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(DispositionOrigin::Admin),
            "webhook" => Ok(DispositionOrigin::Webhook),
            other => Err(format!("unknown disposition origin '{}'", other)),
        }
    }
}

/// Classification of a call's outcome or intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disposition {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: DispositionCategory,
    pub is_active: bool,
    pub requires_followup: bool,
    pub origin: DispositionOrigin,
    pub created_at: DateTime<Utc>,
}

/// Attributes used when a disposition has to be created
#[derive(Debug, Clone, PartialEq)]
pub struct DispositionDefaults {
    pub name: String,
    pub description: Option<String>,
    pub category: DispositionCategory,
    pub is_active: bool,
    pub requires_followup: bool,
    pub origin: DispositionOrigin,
}

impl DispositionDefaults {
    /// Defaults for a code first seen in a webhook
    pub fn auto_provisioned(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: Some(format!("Auto-created from webhook: {}", name)),
            name,
            category: DispositionCategory::Other,
            is_active: true,
            requires_followup: false,
            origin: DispositionOrigin::Webhook,
        }
    }

    /// An administrator-defined entry
    pub fn admin(
        name: impl Into<String>,
        description: impl Into<String>,
        category: DispositionCategory,
        requires_followup: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            category,
            is_active: true,
            requires_followup,
            origin: DispositionOrigin::Admin,
        }
    }

    pub fn into_disposition(self, code: impl Into<String>, created_at: DateTime<Utc>) -> Disposition {
        Disposition {
            code: code.into(),
            name: self.name,
            description: self.description,
            category: self.category,
            is_active: self.is_active,
            requires_followup: self.requires_followup,
            origin: self.origin,
            created_at,
        }
    }
}

/// The standard disposition catalog seeded for a new installation
pub fn default_dispositions() -> Vec<(&'static str, DispositionDefaults)> {
    use DispositionCategory::*;

    vec![
        ("GEN_INQ", DispositionDefaults::admin("General Inquiry", "Call for general information", Inquiry, false)),
        ("SALES_INQ", DispositionDefaults::admin("Sales Inquiry", "Information about buying a vehicle", Sales, true)),
        ("TEST_DRIVE", DispositionDefaults::admin("Test Drive Request", "Test drive booking", TestDrive, true)),
        ("BOOKING", DispositionDefaults::admin("Vehicle Booking", "Vehicle booking", Booking, true)),
        ("SERVICE", DispositionDefaults::admin("Service Request", "Call about servicing", Service, true)),
        ("FINANCE", DispositionDefaults::admin("Finance Inquiry", "Loan and finance information", Finance, true)),
        ("COMPLAINT", DispositionDefaults::admin("Complaint", "Complaint", Complaint, true)),
        ("FOLLOWUP", DispositionDefaults::admin("Follow-up Call", "Follow-up call", Followup, false)),
        ("EXCHANGE", DispositionDefaults::admin("Exchange Inquiry", "Vehicle exchange information", Sales, true)),
        ("PRICE", DispositionDefaults::admin("Price Inquiry", "Price information", Inquiry, false)),
    ]
}
