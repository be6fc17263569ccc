//! Domain primitives, aggregates, and services.
//!
//! Purpose: model today's appointments across the category tables, keep them
//! live against change feeds, and drive the status workflow. Everything here
//! talks to the outside world only through the traits in [`ports`].
//!
//! Public surface:
//! - Category, Appointment, AppointmentStatus: the data model.
//! - TodayAggregate: pure reducer over change events.
//! - TodayFetcher, RealtimeMerger, StatusWorkflowService: the moving parts.
//! - TodayDesk: the integration surface for a presentation layer.

pub mod appointment;
pub mod category;
pub mod error;
pub mod notification;
pub mod ports;
pub mod realtime;
pub mod status_workflow;
pub mod summary;
pub mod today_aggregate;
pub mod today_desk;
pub mod today_fetch;
pub mod user;
pub mod view_filter;

pub use self::appointment::{
    Appointment, AppointmentKey, AppointmentRecord, AppointmentStatus, InvalidTimeOfDay,
    RecordDecodeError, TimeOfDay, record_id,
};
pub use self::category::{Category, UnknownCategory};
pub use self::error::{NotificationError, ValidationError, WorkflowError};
pub use self::notification::{
    NOTIFICATIONS_TABLE, Notification, NotificationKind, NotificationTemplate,
};
pub use self::realtime::{
    ConnectionPolicy, ConnectionState, RealtimeMerger, SubscriptionState, UnknownConnectionPolicy,
};
pub use self::status_workflow::{
    StatusChange, StatusWorkflowService, TransitionReceipt, parse_schedule_input,
    plan_reschedule, plan_status_change,
};
pub use self::summary::TodaySummary;
pub use self::today_aggregate::{MergeOutcome, TodayAggregate};
pub use self::today_desk::{DeskOptions, TodayDesk};
pub use self::today_fetch::{FetchPolicy, TodayFetchOutcome, TodayFetcher, UnknownFetchPolicy};
pub use self::user::{UserId, UserValidationError};
pub use self::view_filter::{StatusFilter, filter};
