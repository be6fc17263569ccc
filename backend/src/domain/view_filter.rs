//! Search and status filtering for the today's-appointments table.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use super::{Appointment, AppointmentStatus};

/// Status selector of the table view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusFilter {
    /// Every status passes.
    #[default]
    All,
    /// Only entries with exactly this status pass.
    Only(AppointmentStatus),
}

impl StatusFilter {
    fn admits(&self, status: &AppointmentStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim() {
            "all" => Self::All,
            other => Self::Only(AppointmentStatus::from(other)),
        })
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(status) => fmt::Display::fmt(status, f),
        }
    }
}

/// Entries matching `search_text` and `status_filter`, in aggregate order.
///
/// The search is a case-insensitive substring match against first name, last
/// name, service, or phone; a blank search matches everything.
pub fn filter<'a>(
    appointments: &'a [Appointment],
    search_text: &str,
    status_filter: &StatusFilter,
) -> Vec<&'a Appointment> {
    let needle = search_text.trim().to_lowercase();
    appointments
        .iter()
        .filter(|appointment| status_filter.admits(appointment.status()))
        .filter(|appointment| needle.is_empty() || matches_search(appointment, &needle))
        .collect()
}

fn matches_search(appointment: &Appointment, needle: &str) -> bool {
    let record = &appointment.record;
    [
        record.first_name.as_deref(),
        record.last_name.as_deref(),
        record.service.as_deref(),
        record.phone.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}
