//! Status workflow for today's appointments.
//!
//! Planning is pure: [`plan_status_change`] and [`plan_reschedule`] validate
//! a request against the state machine and turn it into a [`StatusChange`]
//! write intent. [`StatusWorkflowService`] executes an intent by writing the
//! patch through the gateway and then inserting one notification.
//!
//! The service never touches the aggregate; the change feed echoes the write
//! back to the merger.
//!
//! ```text
//! scheduled ─┐        ┌─> completed
//!            ├────────┼─> did-not-show-up
//! approved ──┘        └─> re-scheduled   (reschedule only)
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use mockable::Clock;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use super::ports::RecordGateway;
use super::{
    Appointment, AppointmentKey, AppointmentStatus, NOTIFICATIONS_TABLE, NotificationError,
    NotificationTemplate, TimeOfDay, UserId, ValidationError, WorkflowError,
};

/// Validated write intent produced by the planners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// Appointment being changed.
    pub key: AppointmentKey,
    /// Status after the write.
    pub status: AppointmentStatus,
    /// Partial row written to the category table.
    pub patch: Map<String, Value>,
    /// Notification sent once the write succeeds.
    pub template: NotificationTemplate,
    /// Owner of the appointment, if known.
    pub recipient: Option<UserId>,
}

impl StatusChange {
    /// Project the change onto a local copy of the appointment.
    ///
    /// Used for optimistic display; the echoed row replaces the projection.
    pub fn project(&self, appointment: &Appointment) -> Appointment {
        let mut projected = appointment.clone();
        projected.record.status = self.status.clone();
        if let Some(Value::String(notes)) = self.patch.get("notes") {
            projected.record.notes = Some(notes.clone());
        }
        if let Some(date) = self
            .patch
            .get("date")
            .and_then(Value::as_str)
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        {
            projected.record.date = date;
        }
        if let Some(time) = self
            .patch
            .get("time")
            .and_then(Value::as_str)
            .and_then(|raw| TimeOfDay::parse(raw).ok())
        {
            projected.record.time = Some(time);
        }
        projected
    }
}

/// Outcome of an executed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReceipt {
    pub key: AppointmentKey,
    pub status: AppointmentStatus,
    /// Why the follow-up notification was not stored, if it was not.
    pub notification_error: Option<NotificationError>,
}

impl TransitionReceipt {
    pub fn notification_sent(&self) -> bool {
        self.notification_error.is_none()
    }
}

/// Validate a direct status transition.
///
/// `re-scheduled` is refused here: it needs a new slot, so callers go through
/// [`plan_reschedule`].
///
/// # Errors
/// Returns [`ValidationError`] when the appointment is not open or the target
/// is not `completed` or `did-not-show-up`.
pub fn plan_status_change(
    appointment: &Appointment,
    target: &AppointmentStatus,
    note: Option<&str>,
) -> Result<StatusChange, ValidationError> {
    ensure_open(appointment)?;
    match target {
        AppointmentStatus::Completed | AppointmentStatus::DidNotShowUp => {}
        AppointmentStatus::Rescheduled => return Err(ValidationError::RescheduleRequiresSchedule),
        other => {
            return Err(ValidationError::UnsupportedTarget {
                status: other.clone(),
            });
        }
    }
    let template = NotificationTemplate::for_status(target).ok_or_else(|| {
        ValidationError::UnsupportedTarget {
            status: target.clone(),
        }
    })?;

    let mut patch = Map::new();
    patch.insert("status".to_owned(), json!(target.as_str()));
    patch.insert("notes".to_owned(), notes_value(appointment, note));

    Ok(StatusChange {
        key: appointment.key(),
        status: target.clone(),
        patch,
        template,
        recipient: appointment.record.owning_user_id.clone(),
    })
}

/// Validate a reschedule to a new date and time.
///
/// # Errors
/// Returns [`ValidationError::MissingField`] when either the date or the time
/// is absent, and [`ValidationError::IneligibleSource`] when the appointment
/// is no longer open.
pub fn plan_reschedule(
    appointment: &Appointment,
    new_date: Option<NaiveDate>,
    new_time: Option<TimeOfDay>,
    note: Option<&str>,
) -> Result<StatusChange, ValidationError> {
    let date = new_date.ok_or(ValidationError::MissingField { field: "new date" })?;
    let time = new_time.ok_or(ValidationError::MissingField { field: "new time" })?;
    ensure_open(appointment)?;

    let status = AppointmentStatus::Rescheduled;
    let mut patch = Map::new();
    patch.insert("date".to_owned(), json!(date.format("%Y-%m-%d").to_string()));
    patch.insert("time".to_owned(), json!(time.to_wire()));
    patch.insert("status".to_owned(), json!(status.as_str()));
    patch.insert("notes".to_owned(), notes_value(appointment, note));

    Ok(StatusChange {
        key: appointment.key(),
        status,
        patch,
        template: NotificationTemplate::for_reschedule(date, time),
        recipient: appointment.record.owning_user_id.clone(),
    })
}

/// Parse raw form input for a reschedule; blank inputs count as missing.
///
/// # Errors
/// Returns [`ValidationError::InvalidDate`] or
/// [`ValidationError::InvalidTime`] for non-blank malformed input.
pub fn parse_schedule_input(
    date: Option<&str>,
    time: Option<&str>,
) -> Result<(Option<NaiveDate>, Option<TimeOfDay>), ValidationError> {
    let date = non_blank(date)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate {
                value: raw.to_owned(),
            })
        })
        .transpose()?;
    let time = non_blank(time)
        .map(|raw| {
            TimeOfDay::parse(raw).map_err(|_| ValidationError::InvalidTime {
                value: raw.to_owned(),
            })
        })
        .transpose()?;
    Ok((date, time))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|raw| !raw.is_empty())
}

fn ensure_open(appointment: &Appointment) -> Result<(), ValidationError> {
    if appointment.status().is_open() {
        Ok(())
    } else {
        Err(ValidationError::IneligibleSource {
            status: appointment.status().clone(),
        })
    }
}

fn notes_value(appointment: &Appointment, note: Option<&str>) -> Value {
    non_blank(note)
        .map(str::to_owned)
        .or_else(|| appointment.record.notes.clone())
        .map_or(Value::Null, Value::String)
}

/// Executes status changes through the record gateway.
#[derive(Clone)]
pub struct StatusWorkflowService {
    gateway: Arc<dyn RecordGateway>,
    clock: Arc<dyn Clock>,
}

impl StatusWorkflowService {
    /// Create a workflow service writing through `gateway`.
    pub fn new(gateway: Arc<dyn RecordGateway>, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }

    /// Move an open appointment to `completed` or `did-not-show-up`.
    ///
    /// # Errors
    /// Returns [`WorkflowError::Validation`] for transitions the state machine
    /// refuses and [`WorkflowError::Gateway`] when the status write fails.
    pub async fn apply_status(
        &self,
        appointment: &Appointment,
        target: &AppointmentStatus,
        note: Option<&str>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        let change = plan_status_change(appointment, target, note)?;
        self.execute(change).await
    }

    /// Reschedule an open appointment to a new date and time.
    ///
    /// # Errors
    /// Returns [`WorkflowError::Validation`] when the date or time is missing
    /// or the appointment is no longer open, and [`WorkflowError::Gateway`]
    /// when the write fails.
    pub async fn reschedule(
        &self,
        appointment: &Appointment,
        new_date: Option<NaiveDate>,
        new_time: Option<TimeOfDay>,
        note: Option<&str>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        let change = plan_reschedule(appointment, new_date, new_time, note)?;
        self.execute(change).await
    }

    /// Write a planned change, then notify the owner.
    ///
    /// # Errors
    /// Returns [`WorkflowError::Gateway`] when the status write fails.
    pub async fn execute(&self, change: StatusChange) -> Result<TransitionReceipt, WorkflowError> {
        let table = change.key.category.table_name();
        if let Err(error) = self.gateway.update(table, &change.key.id, &change.patch).await {
            warn!(appointment = %change.key, status = %change.status, error = %error, "status write failed");
            return Err(error.into());
        }
        info!(appointment = %change.key, status = %change.status, "status written");

        let notification_error = self.notify(&change).await.err();
        if let Some(error) = &notification_error {
            warn!(appointment = %change.key, error = %error, "status saved but notification was not sent");
        }

        Ok(TransitionReceipt {
            key: change.key,
            status: change.status,
            notification_error,
        })
    }

    async fn notify(&self, change: &StatusChange) -> Result<(), NotificationError> {
        let recipient =
            change
                .recipient
                .clone()
                .ok_or_else(|| NotificationError::MissingRecipient {
                    key: change.key.clone(),
                })?;
        let notification = change.template.clone().into_notification(
            recipient,
            change.key.clone(),
            self.clock.utc(),
        );
        let row = notification
            .to_value()
            .map_err(|error| NotificationError::Encode {
                key: change.key.clone(),
                message: error.to_string(),
            })?;
        self.gateway
            .insert(NOTIFICATIONS_TABLE, &row)
            .await
            .map_err(|source| NotificationError::Write {
                key: change.key.clone(),
                source,
            })
    }
}

#[cfg(test)]
#[path = "status_workflow_tests.rs"]
mod tests;
