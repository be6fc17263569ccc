//! Test utilities for the appointment desk crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`, via
//! the `test-support` feature).

use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use mockable::Clock;
use serde_json::Value;

use crate::domain::{
    Appointment, AppointmentRecord, AppointmentStatus, Category, TimeOfDay, UserId,
};

/// Owner used by every fixture appointment.
pub const FIXTURE_USER_ID: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

/// Calendar date every fixture treats as "today".
pub fn fixture_today() -> NaiveDate {
    match NaiveDate::from_ymd_opt(2026, 10, 19) {
        Some(date) => date,
        None => panic!("fixture date must be valid"),
    }
}

/// Parse an `HH:MM` literal, panicking on malformed fixtures.
pub fn time(literal: &str) -> TimeOfDay {
    match TimeOfDay::parse(literal) {
        Ok(time) => time,
        Err(error) => panic!("fixture time must be valid: {error}"),
    }
}

/// Eligible record dated today with a subject and owner filled in.
pub fn record(id: &str, status: AppointmentStatus, at: Option<&str>) -> AppointmentRecord {
    let mut record = AppointmentRecord::new(id, fixture_today(), status);
    record.time = at.map(time);
    record.first_name = Some("Maria".to_owned());
    record.last_name = Some(format!("Santos-{id}"));
    record.phone = Some(format!("0917555{id:0>4}"));
    record.service = Some("Assistive device request".to_owned());
    record.owning_user_id = UserId::new(FIXTURE_USER_ID).ok();
    record
}

/// Tagged fixture appointment.
pub fn appointment(
    category: Category,
    id: &str,
    status: AppointmentStatus,
    at: Option<&str>,
) -> Appointment {
    Appointment::new(category, record(id, status, at))
}

/// Fixture appointment encoded as a gateway row.
pub fn row(id: &str, status: AppointmentStatus, at: Option<&str>) -> Value {
    record(id, status, at)
        .to_value()
        .expect("fixture record encodes")
}

/// Clock pinned to a local wall-clock time that tests can move.
pub struct FixtureClock(Mutex<NaiveDateTime>);

impl FixtureClock {
    /// Clock reading `date` at `hour:minute` local time.
    pub fn at(date: NaiveDate, hour: u32, minute: u32) -> Self {
        match date.and_hms_opt(hour, minute, 0) {
            Some(now) => Self(Mutex::new(now)),
            None => panic!("fixture clock time must be valid"),
        }
    }

    /// Clock reading mid-morning of [`fixture_today`].
    pub fn today() -> Self {
        Self::at(fixture_today(), 9, 30)
    }

    /// Move the clock to a new local wall-clock time.
    pub fn set(&self, date: NaiveDate, hour: u32, minute: u32) {
        let Some(now) = date.and_hms_opt(hour, minute, 0) else {
            panic!("fixture clock time must be valid");
        };
        match self.0.lock() {
            Ok(mut guard) => *guard = now,
            Err(_) => panic!("clock mutex"),
        }
    }

    fn naive_now(&self) -> NaiveDateTime {
        match self.0.lock() {
            Ok(guard) => *guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        let naive = self.naive_now();
        match Local.from_local_datetime(&naive).earliest() {
            Some(now) => now,
            None => Local.from_utc_datetime(&naive),
        }
    }

    fn utc(&self) -> DateTime<Utc> {
        self.local().with_timezone(&Utc)
    }
}
