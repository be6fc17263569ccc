//! Appointment records as stored in the category tables.
//!
//! Raw rows are decoded into [`AppointmentRecord`]; the aggregator tags each
//! one with the [`Category`] it was read from to form an [`Appointment`].
//!
//! ## Wire format
//! - `date` is `YYYY-MM-DD`.
//! - `time` is `HH:MM` or `HH:MM:SS` in 24-hour form; null or blank means no
//!   time has been set.
//! - `id` may arrive as a string or a number and is kept as its string form.

use std::fmt;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{Category, UserId};

/// Appointment status as written by staff and end users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppointmentStatus {
    Scheduled,
    Approved,
    Completed,
    Rescheduled,
    DidNotShowUp,
    /// Any value outside the known set, kept verbatim.
    Other(String),
}

impl AppointmentStatus {
    /// Statuses that may appear in today's aggregate.
    pub const ELIGIBLE: [Self; 5] = [
        Self::Scheduled,
        Self::Approved,
        Self::Completed,
        Self::Rescheduled,
        Self::DidNotShowUp,
    ];

    /// Wire spelling of the status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Rescheduled => "re-scheduled",
            Self::DidNotShowUp => "did-not-show-up",
            Self::Other(raw) => raw.as_str(),
        }
    }

    /// Label shown in tables; unknown values collapse to "Unknown".
    pub fn label(&self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Approved => "Approved",
            Self::Completed => "Completed",
            Self::Rescheduled => "Rescheduled",
            Self::DidNotShowUp => "Did Not Show Up",
            Self::Other(_) => "Unknown",
        }
    }

    /// Whether the status belongs to the eligible set.
    pub fn is_eligible(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Whether a staff member may still move the appointment on.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Approved)
    }
}

impl From<String> for AppointmentStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "scheduled" => Self::Scheduled,
            "approved" => Self::Approved,
            "completed" => Self::Completed,
            "re-scheduled" => Self::Rescheduled,
            "did-not-show-up" => Self::DidNotShowUp,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for AppointmentStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<AppointmentStatus> for String {
    fn from(value: AppointmentStatus) -> Self {
        match value {
            AppointmentStatus::Other(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-of-day component of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

/// Raised when a time literal is not `HH:MM` or `HH:MM:SS`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day: {0}")]
pub struct InvalidTimeOfDay(pub String);

impl TimeOfDay {
    /// Parse `HH:MM` or `HH:MM:SS` (24-hour).
    pub fn parse(value: &str) -> Result<Self, InvalidTimeOfDay> {
        let trimmed = value.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .map(Self)
            .map_err(|_| InvalidTimeOfDay(value.to_owned()))
    }

    /// Build a time from hour and minute.
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    /// Underlying chrono time.
    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }

    /// Wire form; seconds are only written when non-zero.
    pub fn to_wire(&self) -> String {
        if self.0.second() == 0 {
            self.0.format("%H:%M").to_string()
        } else {
            self.0.format("%H:%M:%S").to_string()
        }
    }

    /// 12-hour form used in notification text, e.g. `2:30 PM`.
    pub fn to_display(&self) -> String {
        self.0.format("%-I:%M %p").to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = InvalidTimeOfDay;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_wire()
    }
}

/// Row of a category table, before it is tagged with its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    #[serde(deserialize_with = "deserialize_record_id")]
    pub id: String,
    pub date: NaiveDate,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<TimeOfDay>,
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(
        default,
        rename = "user_id",
        deserialize_with = "deserialize_lenient_user_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub owning_user_id: Option<UserId>,
}

impl AppointmentRecord {
    /// Minimal record with only the required columns populated.
    pub fn new(id: impl Into<String>, date: NaiveDate, status: AppointmentStatus) -> Self {
        Self {
            id: id.into(),
            date,
            time: None,
            status,
            first_name: None,
            middle_name: None,
            last_name: None,
            phone: None,
            email: None,
            service: None,
            notes: None,
            owning_user_id: None,
        }
    }

    /// Whether the record belongs in the aggregate built for `today`.
    pub fn is_eligible_for(&self, today: NaiveDate) -> bool {
        self.date == today && self.status.is_eligible()
    }

    /// Encode the record as a JSON row.
    ///
    /// # Errors
    ///
    /// Returns the serialiser's error when the record cannot be encoded.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Error raised when a gateway row cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {category} record: {message}")]
pub struct RecordDecodeError {
    pub category: Category,
    pub message: String,
}

/// Composite key of an appointment across all category tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppointmentKey {
    pub category: Category,
    pub id: String,
}

impl AppointmentKey {
    /// Build a key from its parts.
    pub fn new(category: Category, id: impl Into<String>) -> Self {
        Self {
            category,
            id: id.into(),
        }
    }
}

impl fmt::Display for AppointmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.id)
    }
}

/// Appointment tagged with the category table it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appointment {
    pub category: Category,
    #[serde(flatten)]
    pub record: AppointmentRecord,
}

impl Appointment {
    /// Tag a record with its category.
    pub fn new(category: Category, record: AppointmentRecord) -> Self {
        Self { category, record }
    }

    /// Decode a raw gateway row read from `category`.
    pub fn decode(category: Category, row: Value) -> Result<Self, RecordDecodeError> {
        serde_json::from_value::<AppointmentRecord>(row)
            .map(|record| Self::new(category, record))
            .map_err(|error| RecordDecodeError {
                category,
                message: error.to_string(),
            })
    }

    /// Composite `(category, id)` key.
    pub fn key(&self) -> AppointmentKey {
        AppointmentKey::new(self.category, self.record.id.clone())
    }

    /// Whether this appointment matches `key` without allocating.
    pub fn has_key(&self, key: &AppointmentKey) -> bool {
        self.category == key.category && self.record.id == key.id
    }

    pub fn status(&self) -> &AppointmentStatus {
        &self.record.status
    }

    pub fn time(&self) -> Option<TimeOfDay> {
        self.record.time
    }

    /// Full display name, skipping blank parts.
    pub fn full_name(&self) -> String {
        [
            self.record.first_name.as_deref(),
            self.record.middle_name.as_deref(),
            self.record.last_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Extract the primary key from a row that may carry nothing else.
///
/// Delete events often only include the key columns of the removed row.
pub fn record_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn deserialize_record_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Text(text) if text.is_empty() => Err(D::Error::custom("id must not be empty")),
        RawId::Text(text) => Ok(text),
        RawId::Number(number) => Ok(number.to_string()),
    }
}

fn deserialize_optional_time<'de, D>(deserializer: D) -> Result<Option<TimeOfDay>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => TimeOfDay::parse(value).map(Some).map_err(D::Error::custom),
    }
}

fn deserialize_lenient_user_id<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| UserId::new(value).ok()))
}
