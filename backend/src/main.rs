//! Print today's appointments across every category table.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io::{self, Write};
use std::sync::Arc;

use appointment_desk::domain::{
    Appointment, StatusFilter, TodayFetchOutcome, TodayFetcher, TodaySummary, filter,
};
use appointment_desk::outbound::postgrest::{PostgrestCredentials, PostgrestGateway};
use appointment_desk::settings::DeskSettings;
use clap::Parser;
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

/// `appointment-desk` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "appointment-desk",
    about = "List today's appointments across all category tables",
    version
)]
struct CliArgs {
    /// Case-insensitive search over name, service, and phone.
    #[arg(long, default_value = "")]
    search: String,
    /// Status to show, or `all`.
    #[arg(long, default_value = "all")]
    status: StatusFilter,
}

fn main() -> io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| io::Error::other(format!("create Tokio runtime: {error}")))?;
    runtime.block_on(async_main())
}

async fn async_main() -> io::Result<()> {
    let args = CliArgs::try_parse().map_err(io::Error::other)?;
    let settings = DeskSettings::load_from_iter([OsString::from("appointment-desk")])
        .map_err(|error| io::Error::other(format!("load settings: {error}")))?;

    let base_url = settings.gateway_url().map_err(io::Error::other)?;
    let credentials = PostgrestCredentials {
        api_key: settings.api_key().map_err(io::Error::other)?.to_owned(),
    };
    let options = settings.desk_options().map_err(io::Error::other)?;
    let gateway = PostgrestGateway::new(base_url, &credentials, settings.request_timeout())
        .map_err(|error| io::Error::other(format!("build gateway: {error}")))?;

    let fetcher = TodayFetcher::new(
        Arc::new(gateway),
        Arc::new(DefaultClock),
        options.fetch_policy,
    );
    let outcome = fetcher
        .fetch_today()
        .await
        .map_err(|error| io::Error::other(format!("fetch today's appointments: {error}")))?;

    let mut out = io::stdout().lock();
    render(&mut out, &outcome, &args)
}

fn render(out: &mut impl Write, outcome: &TodayFetchOutcome, args: &CliArgs) -> io::Result<()> {
    writeln!(out, "Appointments for {}", outcome.today.format("%A, %B %-d, %Y"))?;
    for category in &outcome.failed_categories {
        writeln!(out, "warning: {} could not be loaded", category.label())?;
    }

    let visible = filter(&outcome.appointments, &args.search, &args.status);
    writeln!(
        out,
        "{:<8} {:<22} {:<28} {:<32} {:<16}",
        "TIME", "CATEGORY", "NAME", "SERVICE", "STATUS"
    )?;
    for appointment in &visible {
        writeln!(out, "{}", row(appointment))?;
    }
    if visible.is_empty() {
        writeln!(out, "(no appointments)")?;
    }

    let summary = TodaySummary::from_appointments(&outcome.appointments);
    writeln!(out)?;
    writeln!(out, "total={}", summary.total)?;
    for (status, count) in &summary.by_status {
        writeln!(out, "{status}={count}")?;
    }
    Ok(())
}

fn row(appointment: &Appointment) -> String {
    let time = appointment
        .time()
        .map_or_else(|| "--:--".to_owned(), |time| time.to_wire());
    format!(
        "{:<8} {:<22} {:<28} {:<32} {:<16}",
        time,
        appointment.category.label(),
        appointment.full_name(),
        appointment.record.service.as_deref().unwrap_or("-"),
        appointment.status().label(),
    )
}
