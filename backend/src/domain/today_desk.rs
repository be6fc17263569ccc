//! Integration surface for the today's-appointments view.
//!
//! [`TodayDesk`] wires the fetcher, the realtime merger, and the status
//! workflow together. It is single-owner: every mutation takes `&mut self`,
//! so the aggregate needs no locking.

use std::sync::Arc;

use chrono::NaiveDate;
use mockable::Clock;
use tracing::info;

use super::ports::{ChangeFeed, GatewayError, RecordGateway};
use super::realtime::{ConnectionPolicy, ConnectionState, RealtimeMerger, SubscriptionState};
use super::status_workflow::{
    StatusChange, StatusWorkflowService, TransitionReceipt, parse_schedule_input,
    plan_reschedule, plan_status_change,
};
use super::today_fetch::{FetchPolicy, TodayFetchOutcome, TodayFetcher};
use super::view_filter::{StatusFilter, filter};
use super::{
    Appointment, AppointmentKey, AppointmentStatus, Category, MergeOutcome, TimeOfDay,
    TodayAggregate, TodaySummary, ValidationError, WorkflowError,
};

/// Behaviour switches for a desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeskOptions {
    pub fetch_policy: FetchPolicy,
    pub connection_policy: ConnectionPolicy,
    /// Show successful writes locally before their echo arrives.
    pub optimistic_updates: bool,
}

/// Live view of today's appointments plus the status workflow.
pub struct TodayDesk {
    fetcher: TodayFetcher,
    workflow: StatusWorkflowService,
    merger: RealtimeMerger,
    optimistic_updates: bool,
    failed_categories: Vec<Category>,
}

impl TodayDesk {
    /// Fetch today's appointments and subscribe to their changes.
    ///
    /// # Errors
    /// Returns [`GatewayError`] when the fetch fails under
    /// [`FetchPolicy::AllOrNothing`]. Subscription failures never fail
    /// `open`; they show up in [`Self::connection_state`].
    pub async fn open(
        gateway: Arc<dyn RecordGateway>,
        feed: Arc<dyn ChangeFeed>,
        clock: Arc<dyn Clock>,
        options: DeskOptions,
    ) -> Result<Self, GatewayError> {
        let fetcher = TodayFetcher::new(Arc::clone(&gateway), Arc::clone(&clock), options.fetch_policy);
        let outcome = fetcher.fetch_today().await?;
        let failed_categories = outcome.failed_categories.clone();
        let merger = RealtimeMerger::new(feed, options.connection_policy, outcome.into_aggregate());

        let mut desk = Self {
            fetcher,
            workflow: StatusWorkflowService::new(gateway, clock),
            merger,
            optimistic_updates: options.optimistic_updates,
            failed_categories,
        };
        desk.subscribe().await;
        info!(
            date = %desk.today(),
            count = desk.aggregate().len(),
            "today desk opened"
        );
        Ok(desk)
    }

    /// Run a fresh fetch without touching the live aggregate.
    ///
    /// # Errors
    /// See [`TodayFetcher::fetch_today`].
    pub async fn fetch_today(&self) -> Result<TodayFetchOutcome, GatewayError> {
        self.fetcher.fetch_today().await
    }

    /// Tear down every subscription, refetch, replace the aggregate, and
    /// subscribe again.
    ///
    /// The fetch runs first; if it fails the current aggregate and
    /// subscriptions are left as they were.
    ///
    /// # Errors
    /// Returns [`GatewayError`] when the fetch fails under
    /// [`FetchPolicy::AllOrNothing`].
    pub async fn handle_manual_refresh(&mut self) -> Result<(), GatewayError> {
        let outcome = self.fetcher.fetch_today().await?;
        self.merger.teardown().await;
        self.failed_categories = outcome.failed_categories.clone();
        self.merger.replace_aggregate(outcome.into_aggregate());
        self.subscribe().await;
        info!(
            date = %self.today(),
            count = self.aggregate().len(),
            "today desk refreshed"
        );
        Ok(())
    }

    /// Move the appointment with `key` to `completed` or `did-not-show-up`.
    ///
    /// # Errors
    /// Returns [`WorkflowError::Validation`] for an unknown key or a
    /// transition the state machine refuses, and [`WorkflowError::Gateway`]
    /// when the status write fails.
    pub async fn apply_status(
        &mut self,
        key: &AppointmentKey,
        target: &AppointmentStatus,
        note: Option<&str>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        let appointment = self.lookup(key)?;
        let change = plan_status_change(&appointment, target, note)?;
        self.execute(&appointment, change).await
    }

    /// Reschedule the appointment with `key`.
    ///
    /// # Errors
    /// Returns [`WorkflowError::Validation`] for an unknown key, a missing
    /// date or time, or a closed appointment, and [`WorkflowError::Gateway`]
    /// when the write fails.
    pub async fn reschedule(
        &mut self,
        key: &AppointmentKey,
        new_date: Option<NaiveDate>,
        new_time: Option<TimeOfDay>,
        note: Option<&str>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        let appointment = self.lookup(key)?;
        let change = plan_reschedule(&appointment, new_date, new_time, note)?;
        self.execute(&appointment, change).await
    }

    /// Reschedule from raw form input; blank fields count as missing.
    ///
    /// # Errors
    /// As [`Self::reschedule`], plus [`ValidationError::InvalidDate`] and
    /// [`ValidationError::InvalidTime`] for malformed input.
    pub async fn reschedule_from_input(
        &mut self,
        key: &AppointmentKey,
        new_date: Option<&str>,
        new_time: Option<&str>,
        note: Option<&str>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        let (date, time) = parse_schedule_input(new_date, new_time)?;
        self.reschedule(key, date, time, note).await
    }

    /// Entries matching the search text and status filter, in display order.
    pub fn visible(&self, search_text: &str, status_filter: &StatusFilter) -> Vec<&Appointment> {
        filter(self.aggregate().entries(), search_text, status_filter)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.merger.connection_state()
    }

    pub fn subscription_state(&self, category: Category) -> SubscriptionState {
        self.merger.subscription_state(category)
    }

    pub fn summary(&self) -> TodaySummary {
        TodaySummary::from_appointments(self.aggregate().entries())
    }

    pub fn aggregate(&self) -> &TodayAggregate {
        self.merger.aggregate()
    }

    /// Date the current aggregate was built for.
    pub fn today(&self) -> NaiveDate {
        self.aggregate().today()
    }

    /// Categories omitted from the last fetch.
    pub fn failed_categories(&self) -> &[Category] {
        &self.failed_categories
    }

    /// Wait for and apply the next change-feed message.
    ///
    /// Returns `None` when the desk is closed or the feed has hung up.
    pub async fn process_next_message(&mut self) -> Option<MergeOutcome> {
        self.merger.process_next_message().await
    }

    /// Apply every change-feed message already queued.
    pub fn process_pending(&mut self) -> usize {
        self.merger.process_pending()
    }

    /// Close every subscription. Calling it again is a no-op.
    pub async fn close(&mut self) {
        self.merger.teardown().await;
    }

    fn lookup(&self, key: &AppointmentKey) -> Result<Appointment, ValidationError> {
        self.aggregate()
            .get(key)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownAppointment { key: key.clone() })
    }

    async fn subscribe(&mut self) {
        self.merger.subscribe_all().await;
        self.merger.process_pending();
    }

    async fn execute(
        &mut self,
        appointment: &Appointment,
        change: StatusChange,
    ) -> Result<TransitionReceipt, WorkflowError> {
        let projected = self
            .optimistic_updates
            .then(|| change.project(appointment));
        let receipt = self.workflow.execute(change).await?;
        if let Some(projected) = projected {
            self.merger.apply_local(projected);
        }
        Ok(receipt)
    }
}

#[cfg(test)]
#[path = "today_desk_tests.rs"]
mod tests;
