//! Counters for the dashboard summary cards.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{Appointment, AppointmentStatus, Category};

/// Per-status and per-category counts of today's appointments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodaySummary {
    pub total: usize,
    /// Counts keyed by wire status; every eligible status is present.
    pub by_status: BTreeMap<String, usize>,
    /// Counts keyed by category; every category is present.
    pub by_category: BTreeMap<Category, usize>,
}

impl TodaySummary {
    /// Count the entries of an aggregate.
    pub fn from_appointments(appointments: &[Appointment]) -> Self {
        let mut by_status: BTreeMap<String, usize> = AppointmentStatus::ELIGIBLE
            .iter()
            .map(|status| (status.as_str().to_owned(), 0))
            .collect();
        let mut by_category: BTreeMap<Category, usize> =
            Category::ALL.into_iter().map(|category| (category, 0)).collect();

        for appointment in appointments {
            *by_status
                .entry(appointment.status().as_str().to_owned())
                .or_default() += 1;
            *by_category.entry(appointment.category).or_default() += 1;
        }

        Self {
            total: appointments.len(),
            by_status,
            by_category,
        }
    }

    /// Count for one status, zero when absent.
    pub fn status_count(&self, status: &AppointmentStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or_default()
    }

    /// Count for one category.
    pub fn category_count(&self, category: Category) -> usize {
        self.by_category.get(&category).copied().unwrap_or_default()
    }
}
