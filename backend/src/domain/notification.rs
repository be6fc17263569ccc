//! Notifications written to end users after a status change.
//!
//! Notifications are write-only from the desk's point of view: one row is
//! inserted into the notifications collection per successful transition.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AppointmentKey, AppointmentStatus, TimeOfDay, UserId};

/// Name of the backend collection that receives notifications.
pub const NOTIFICATIONS_TABLE: &str = "notifications";

/// Visual tone of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Warning,
    Info,
}

/// Title, message, and tone of a notification before it is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTemplate {
    pub title: &'static str,
    pub message: String,
    pub kind: NotificationKind,
}

impl NotificationTemplate {
    /// Fixed template for a status reached through the status workflow.
    ///
    /// Returns `None` for statuses that never produce a notification.
    pub fn for_status(status: &AppointmentStatus) -> Option<Self> {
        let template = match status {
            AppointmentStatus::Completed => Self {
                title: "Appointment Completed",
                message: "Your appointment has been marked as completed. Thank you for visiting us!"
                    .to_owned(),
                kind: NotificationKind::Success,
            },
            AppointmentStatus::Rescheduled => Self {
                title: "Appointment Rescheduled",
                message: "Your appointment has been rescheduled. We apologise for the inconvenience; please check your appointments for the new schedule."
                    .to_owned(),
                kind: NotificationKind::Warning,
            },
            AppointmentStatus::DidNotShowUp => Self {
                title: "Missed Appointment",
                message: "You missed your scheduled appointment. Please book a new appointment at your earliest convenience."
                    .to_owned(),
                kind: NotificationKind::Warning,
            },
            _ => return None,
        };
        Some(template)
    }

    /// Template used by the reschedule engine, naming the new slot.
    pub fn for_reschedule(date: NaiveDate, time: TimeOfDay) -> Self {
        Self {
            title: "Appointment Rescheduled",
            message: format!(
                "Your appointment has been rescheduled to {} at {}.",
                date.format("%A, %B %-d, %Y"),
                time.to_display()
            ),
            kind: NotificationKind::Info,
        }
    }

    /// Address the template to a user and appointment.
    pub fn into_notification(
        self,
        user_id: UserId,
        appointment: AppointmentKey,
        created_at: DateTime<Utc>,
    ) -> Notification {
        Notification {
            user_id,
            title: self.title.to_owned(),
            message: self.message,
            kind: self.kind,
            appointment_id: appointment.id,
            appointment_category: appointment.category.table_name().to_owned(),
            created_at,
            read: false,
        }
    }
}

/// Notification row as inserted into [`NOTIFICATIONS_TABLE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub appointment_id: String,
    pub appointment_category: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    /// JSON row for the gateway.
    ///
    /// # Errors
    ///
    /// Returns the serialiser's error when the notification cannot be encoded.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
