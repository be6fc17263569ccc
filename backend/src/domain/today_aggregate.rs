//! Time-ordered aggregate of today's appointments across all categories.
//!
//! The aggregate is a pure reducer over change events: it can be driven by a
//! live feed or by a test without any connection.
//!
//! ## Invariants
//! - `(category, id)` is unique among entries.
//! - Every entry is dated `today` (fixed when the aggregate was built) and
//!   carries an eligible status.
//! - Entries are non-decreasing by time; entries without a time come first
//!   and keep their relative order.

use chrono::NaiveDate;
use tracing::debug;

use super::ports::{ChangeEvent, ChangeKind};
use super::{Appointment, AppointmentKey, Category, RecordDecodeError, record_id};

/// Effect of applying one change to the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new entry was added.
    Inserted,
    /// An existing entry was replaced in place.
    Updated,
    /// An entry was removed.
    Removed,
    /// The aggregate did not change.
    Ignored,
}

/// In-memory aggregate of today's eligible appointments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodayAggregate {
    today: NaiveDate,
    entries: Vec<Appointment>,
}

impl TodayAggregate {
    /// Empty aggregate for `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            entries: Vec::new(),
        }
    }

    /// Build an aggregate from fetched appointments.
    ///
    /// Ineligible rows are dropped and a repeated key keeps the later row, so
    /// the result honours the same invariants as a live aggregate.
    pub fn from_appointments<I>(today: NaiveDate, appointments: I) -> Self
    where
        I: IntoIterator<Item = Appointment>,
    {
        let mut aggregate = Self::new(today);
        for appointment in appointments {
            aggregate.upsert_unsorted(appointment);
        }
        aggregate.sort();
        aggregate
    }

    /// Calendar date the aggregate was built for.
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Entries in display order.
    pub fn entries(&self) -> &[Appointment] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &AppointmentKey) -> Option<&Appointment> {
        self.entries.iter().find(|entry| entry.has_key(key))
    }

    /// Insert or replace an appointment, or drop it if it no longer belongs.
    pub fn upsert(&mut self, appointment: Appointment) -> MergeOutcome {
        let outcome = self.upsert_unsorted(appointment);
        if outcome != MergeOutcome::Ignored {
            self.sort();
        }
        outcome
    }

    /// Remove the entry with `key`; absent keys are a no-op.
    pub fn remove(&mut self, key: &AppointmentKey) -> MergeOutcome {
        match self.position(key) {
            Some(index) => {
                self.entries.remove(index);
                MergeOutcome::Removed
            }
            None => MergeOutcome::Ignored,
        }
    }

    /// Apply a change event delivered for `category`.
    ///
    /// Inserts and updates share upsert semantics so a duplicate or replayed
    /// insert cannot create a second entry. Only an update may evict an entry:
    /// an insert whose row no longer qualifies for today is ignored.
    ///
    /// # Errors
    /// Returns [`RecordDecodeError`] when the event row cannot be decoded; the
    /// aggregate is left untouched.
    pub fn apply(
        &mut self,
        category: Category,
        event: &ChangeEvent,
    ) -> Result<MergeOutcome, RecordDecodeError> {
        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                let Some(row) = event.new_record.clone() else {
                    debug!(table = %category, kind = ?event.kind, "change event without a row");
                    return Ok(MergeOutcome::Ignored);
                };
                let appointment = Appointment::decode(category, row)?;
                if event.kind == ChangeKind::Insert
                    && !appointment.record.is_eligible_for(self.today)
                {
                    debug!(table = %category, id = %appointment.record.id, "ineligible insert ignored");
                    return Ok(MergeOutcome::Ignored);
                }
                Ok(self.upsert(appointment))
            }
            ChangeKind::Delete => {
                let id = event
                    .old_record
                    .as_ref()
                    .and_then(record_id)
                    .or_else(|| event.new_record.as_ref().and_then(record_id));
                match id {
                    Some(id) => Ok(self.remove(&AppointmentKey::new(category, id))),
                    None => {
                        debug!(table = %category, "delete event without a key");
                        Ok(MergeOutcome::Ignored)
                    }
                }
            }
        }
    }

    fn upsert_unsorted(&mut self, appointment: Appointment) -> MergeOutcome {
        let key = appointment.key();
        let eligible = appointment.record.is_eligible_for(self.today);
        match (self.position(&key), eligible) {
            (Some(index), true) => {
                if let Some(slot) = self.entries.get_mut(index) {
                    *slot = appointment;
                }
                MergeOutcome::Updated
            }
            (None, true) => {
                self.entries.push(appointment);
                MergeOutcome::Inserted
            }
            (Some(index), false) => {
                self.entries.remove(index);
                MergeOutcome::Removed
            }
            (None, false) => MergeOutcome::Ignored,
        }
    }

    fn position(&self, key: &AppointmentKey) -> Option<usize> {
        self.entries.iter().position(|entry| entry.has_key(key))
    }

    fn sort(&mut self) {
        sort_by_time(&mut self.entries);
    }
}

/// Stable sort by time of day; untimed entries lead in their original order.
pub fn sort_by_time(appointments: &mut [Appointment]) {
    appointments.sort_by_key(Appointment::time);
}

#[cfg(test)]
#[path = "today_aggregate_tests.rs"]
mod tests;
