//! Domain-level error types for the status workflow.
//!
//! These errors are transport agnostic. Gateway failures arrive as
//! [`GatewayError`]; everything the workflow rejects on its own is a
//! [`ValidationError`].

use super::ports::GatewayError;
use super::{AppointmentKey, AppointmentStatus};

/// A requested transition or reschedule breaks the state machine or is
/// missing input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Only scheduled or approved appointments may move on.
    #[error("appointment is {status}; only scheduled or approved appointments can change status")]
    IneligibleSource { status: AppointmentStatus },
    /// The target is not one of the statuses the workflow sets.
    #[error("status {status} cannot be set by the status workflow")]
    UnsupportedTarget { status: AppointmentStatus },
    /// Rescheduling needs a concrete slot and goes through `reschedule`.
    #[error("re-scheduled needs a new date and time; reschedule the appointment instead")]
    RescheduleRequiresSchedule,
    /// A required input was not supplied.
    #[error("{field} is required")]
    MissingField { field: &'static str },
    /// A date input was not `YYYY-MM-DD`.
    #[error("invalid date {value}; expected YYYY-MM-DD")]
    InvalidDate { value: String },
    /// A time input was not `HH:MM` or `HH:MM:SS`.
    #[error("invalid time {value}; expected HH:MM")]
    InvalidTime { value: String },
    /// The key does not name an entry of today's list.
    #[error("appointment {key} is not in today's list")]
    UnknownAppointment { key: AppointmentKey },
}

/// Failure of `apply_status` or `reschedule`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The status write itself failed; no notification was attempted.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// The notification that follows a committed status write failed.
///
/// Never rolls the status write back; surfaced through logs and the
/// transition receipt only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("appointment {key} has no owning user to notify")]
    MissingRecipient { key: AppointmentKey },
    #[error("notification for appointment {key} could not be encoded: {message}")]
    Encode { key: AppointmentKey, message: String },
    #[error("notification for appointment {key} was not stored: {source}")]
    Write {
        key: AppointmentKey,
        source: GatewayError,
    },
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;
    use crate::domain::Category;

    #[rstest]
    fn ineligible_source_names_the_status() {
        let err = ValidationError::IneligibleSource {
            status: AppointmentStatus::Completed,
        };
        assert!(err.to_string().starts_with("appointment is completed"));
    }

    #[rstest]
    fn workflow_error_is_transparent_over_gateway_errors() {
        let err = WorkflowError::from(GatewayError::transport("connection reset"));
        assert_eq!(err.to_string(), "gateway transport failed: connection reset");
    }

    #[rstest]
    fn notification_write_error_keeps_its_source() {
        let err = NotificationError::Write {
            key: AppointmentKey::new(Category::Pwd, "42"),
            source: GatewayError::rejected(503_u16, "unavailable"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("pwd/42"));
    }

    #[rstest]
    fn notification_encode_error_names_the_appointment() {
        let err = NotificationError::Encode {
            key: AppointmentKey::new(Category::Youth, "9"),
            message: "key must be a string".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "notification for appointment youth/9 could not be encoded: key must be a string"
        );
        assert!(std::error::Error::source(&err).is_none());
    }
}
