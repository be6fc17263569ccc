//! Fetches today's eligible appointments from every category table.
//!
//! One query per category runs concurrently; results are tagged with their
//! category, concatenated in [`Category::ALL`] order, and stably sorted by
//! time so untimed rows lead in fetch order.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::future::join_all;
use mockable::Clock;
use tracing::{info, warn};

use super::ports::{Filter, GatewayError, RecordGateway, RecordQuery};
use super::{Appointment, AppointmentStatus, Category, TodayAggregate};

/// How a failing category query affects the whole fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Log the failure, omit the table, and report it in the outcome.
    #[default]
    Partial,
    /// The first failing table aborts the fetch.
    AllOrNothing,
}

/// Raised when a fetch policy name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fetch policy {0}; expected partial or all-or-nothing")]
pub struct UnknownFetchPolicy(pub String);

impl FromStr for FetchPolicy {
    type Err = UnknownFetchPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "partial" => Ok(Self::Partial),
            "all-or-nothing" | "all_or_nothing" => Ok(Self::AllOrNothing),
            other => Err(UnknownFetchPolicy(other.to_owned())),
        }
    }
}

impl fmt::Display for FetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Partial => "partial",
            Self::AllOrNothing => "all-or-nothing",
        })
    }
}

/// Result of a fetch: today's date, the sorted rows, and any tables that
/// could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodayFetchOutcome {
    pub today: NaiveDate,
    pub appointments: Vec<Appointment>,
    /// Tables omitted under [`FetchPolicy::Partial`].
    pub failed_categories: Vec<Category>,
}

impl TodayFetchOutcome {
    /// Whether every category contributed.
    pub fn is_complete(&self) -> bool {
        self.failed_categories.is_empty()
    }

    /// Build the live aggregate from the fetched rows.
    pub fn into_aggregate(self) -> TodayAggregate {
        TodayAggregate::from_appointments(self.today, self.appointments)
    }
}

/// Query that selects today's eligible rows of one category table.
pub fn today_query(category: Category, today: NaiveDate) -> RecordQuery {
    RecordQuery::table(category.table_name())
        .filter(date_filter(today))
        .filter(Filter::is_in(
            "status",
            AppointmentStatus::ELIGIBLE.iter().map(AppointmentStatus::as_str),
        ))
        .order_by("time", true)
}

/// `date = today` predicate shared by queries and subscriptions.
pub fn date_filter(today: NaiveDate) -> Filter {
    Filter::eq("date", today.format("%Y-%m-%d").to_string())
}

/// Fetches today's appointments across all categories.
#[derive(Clone)]
pub struct TodayFetcher {
    gateway: Arc<dyn RecordGateway>,
    clock: Arc<dyn Clock>,
    policy: FetchPolicy,
}

impl TodayFetcher {
    pub fn new(gateway: Arc<dyn RecordGateway>, clock: Arc<dyn Clock>, policy: FetchPolicy) -> Self {
        Self {
            gateway,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    /// Caller's local calendar date.
    pub fn today(&self) -> NaiveDate {
        self.clock.local().date_naive()
    }

    /// Fetch today's appointments, sorted by time.
    ///
    /// # Errors
    /// Under [`FetchPolicy::AllOrNothing`] the first failing table's
    /// [`GatewayError`] is returned. Under [`FetchPolicy::Partial`] this never
    /// fails; failures are listed in the outcome instead.
    pub async fn fetch_today(&self) -> Result<TodayFetchOutcome, GatewayError> {
        let today = self.today();
        let results = join_all(Category::ALL.into_iter().map(|category| async move {
            let rows = self.gateway.query(&today_query(category, today)).await;
            (category, rows)
        }))
        .await;

        let mut appointments = Vec::new();
        let mut failed_categories = Vec::new();
        for (category, rows) in results {
            match rows {
                Ok(rows) => appointments.extend(decode_rows(category, today, rows)),
                Err(error) if self.policy == FetchPolicy::AllOrNothing => {
                    warn!(table = %category, error = %error, "today fetch aborted");
                    return Err(error);
                }
                Err(error) => {
                    warn!(table = %category, error = %error, "omitting table from today fetch");
                    failed_categories.push(category);
                }
            }
        }
        super::today_aggregate::sort_by_time(&mut appointments);

        info!(
            date = %today,
            count = appointments.len(),
            failed = failed_categories.len(),
            "fetched today's appointments"
        );
        Ok(TodayFetchOutcome {
            today,
            appointments,
            failed_categories,
        })
    }
}

fn decode_rows(
    category: Category,
    today: NaiveDate,
    rows: Vec<serde_json::Value>,
) -> impl Iterator<Item = Appointment> {
    rows.into_iter().filter_map(move |row| {
        match Appointment::decode(category, row) {
            Ok(appointment) if appointment.record.is_eligible_for(today) => Some(appointment),
            Ok(appointment) => {
                warn!(table = %category, id = %appointment.record.id, "dropping row outside today's eligible set");
                None
            }
            Err(error) => {
                warn!(table = %category, error = %error, "skipping undecodable row");
                None
            }
        }
    })
}
