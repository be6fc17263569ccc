//! Behaviour tests for the today's-appointments desk.
//!
//! Scenarios run the desk against the in-memory backend so writes made by
//! "another client" travel through the same change feed the desk listens on.

use std::cell::RefCell;
use std::sync::Arc;

use appointment_desk::domain::ports::{GatewayError, RecordGateway};
use appointment_desk::domain::{
    AppointmentKey, AppointmentStatus, Category, ConnectionState, DeskOptions, NOTIFICATIONS_TABLE,
    TodayDesk, TransitionReceipt, ValidationError, WorkflowError, record_id,
};
use appointment_desk::outbound::memory::InMemoryBackend;
use appointment_desk::test_support::{FixtureClock, fixture_today, row};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Map, Value, json};
use tokio::runtime::Runtime;

struct TodayDeskWorld {
    runtime: Runtime,
    backend: Arc<InMemoryBackend>,
    clock: Arc<FixtureClock>,
    desk: RefCell<Option<TodayDesk>>,
    open_error: RefCell<Option<GatewayError>>,
    last_transition: RefCell<Option<Result<TransitionReceipt, WorkflowError>>>,
}

impl TodayDeskWorld {
    fn new() -> Self {
        Self {
            runtime: Runtime::new().expect("create runtime"),
            backend: Arc::new(InMemoryBackend::new()),
            clock: Arc::new(FixtureClock::today()),
            desk: RefCell::new(None),
            open_error: RefCell::new(None),
            last_transition: RefCell::new(None),
        }
    }

    fn open(&self) {
        let result = self.runtime.block_on(TodayDesk::open(
            self.backend.clone(),
            self.backend.clone(),
            self.clock.clone(),
            DeskOptions::default(),
        ));
        match result {
            Ok(mut desk) => {
                desk.process_pending();
                *self.desk.borrow_mut() = Some(desk);
            }
            Err(error) => *self.open_error.borrow_mut() = Some(error),
        }
    }

    fn with_desk<T>(&self, f: impl FnOnce(&mut TodayDesk, &Runtime) -> T) -> T {
        let mut desk = self.desk.borrow_mut();
        let desk = desk.as_mut().expect("desk should be open");
        f(desk, &self.runtime)
    }

    /// Deliver every change the backend has echoed so far.
    fn drain(&self) {
        self.with_desk(|desk, _| desk.process_pending());
    }

    fn record_transition(&self, result: Result<TransitionReceipt, WorkflowError>) {
        *self.last_transition.borrow_mut() = Some(result);
        self.drain();
    }

    fn listed_keys(&self) -> Vec<String> {
        self.with_desk(|desk, _| {
            desk.aggregate()
                .entries()
                .iter()
                .map(|appointment| appointment.key().to_string())
                .collect()
        })
    }

    fn notification_titles(&self) -> Vec<String> {
        self.backend
            .rows(NOTIFICATIONS_TABLE)
            .iter()
            .filter_map(|row| row.get("title").and_then(Value::as_str).map(str::to_owned))
            .collect()
    }
}

#[fixture]
fn world() -> TodayDeskWorld {
    TodayDeskWorld::new()
}

#[given("a {category} appointment {id} with status {status} at {time}")]
fn a_seeded_appointment(
    world: &TodayDeskWorld,
    category: Category,
    id: String,
    status: String,
    time: String,
) {
    let status = AppointmentStatus::from(status);
    world
        .backend
        .seed(category.table_name(), [row(&id, status, Some(&time))]);
}

#[given("the {category} table is unavailable")]
fn the_table_is_unavailable(world: &TodayDeskWorld, category: Category) {
    world.backend.fail_table(category.table_name());
}

#[given("the desk is open")]
fn the_desk_is_open(world: &TodayDeskWorld) {
    world.open();
    assert!(world.open_error.borrow().is_none(), "desk should open");
}

#[given("the clock passes midnight")]
fn the_clock_passes_midnight(world: &TodayDeskWorld) {
    let next_day = fixture_today().succ_opt().expect("next day");
    world.clock.set(next_day, 0, 5);
}

#[when("the desk opens")]
fn the_desk_opens(world: &TodayDeskWorld) {
    world.open();
}

#[when("another client sets {category} appointment {id} to {status}")]
fn another_client_sets_status(
    world: &TodayDeskWorld,
    category: Category,
    id: String,
    status: String,
) {
    let mut patch = Map::new();
    patch.insert("status".to_owned(), Value::String(status));
    world
        .runtime
        .block_on(world.backend.update(category.table_name(), &id, &patch))
        .expect("update succeeds");
    world.drain();
}

#[when("another client books {category} appointment {id} at {time}")]
fn another_client_books(world: &TodayDeskWorld, category: Category, id: String, time: String) {
    let booked = row(&id, AppointmentStatus::Scheduled, Some(&time));
    world
        .runtime
        .block_on(world.backend.insert(category.table_name(), &booked))
        .expect("insert succeeds");
    world.drain();
}

#[when("another client books {category} appointment {id} for the next day")]
fn another_client_books_for_the_next_day(world: &TodayDeskWorld, category: Category, id: String) {
    let booked = json!({ "id": id, "date": "2026-10-20", "time": "08:00", "status": "scheduled" });
    world
        .runtime
        .block_on(world.backend.insert(category.table_name(), &booked))
        .expect("insert succeeds");
    world.drain();
}

#[when("another client deletes {category} appointment {id}")]
fn another_client_deletes(world: &TodayDeskWorld, category: Category, id: String) {
    assert!(world.backend.delete(category.table_name(), &id));
    world.drain();
}

#[when("staff mark {category} appointment {id} as {status}")]
fn staff_mark_status(world: &TodayDeskWorld, category: Category, id: String, status: String) {
    let key = AppointmentKey::new(category, id);
    let target = AppointmentStatus::from(status);
    let result = world.with_desk(|desk, runtime| {
        runtime.block_on(desk.apply_status(&key, &target, None))
    });
    world.record_transition(result);
}

#[when("staff reschedule {category} appointment {id} to {date} without a time")]
fn staff_reschedule_without_time(
    world: &TodayDeskWorld,
    category: Category,
    id: String,
    date: String,
) {
    let key = AppointmentKey::new(category, id);
    let result = world.with_desk(|desk, runtime| {
        runtime.block_on(desk.reschedule_from_input(&key, Some(&date), None, None))
    });
    world.record_transition(result);
}

#[when("staff reschedule {category} appointment {id} to {date} at {time}")]
fn staff_reschedule(
    world: &TodayDeskWorld,
    category: Category,
    id: String,
    date: String,
    time: String,
) {
    let key = AppointmentKey::new(category, id);
    let result = world.with_desk(|desk, runtime| {
        runtime.block_on(desk.reschedule_from_input(&key, Some(&date), Some(&time), None))
    });
    world.record_transition(result);
}

#[when("the {category} channel reports an error")]
fn the_channel_reports_an_error(world: &TodayDeskWorld, category: Category) {
    world.backend.break_channel(category, "socket closed");
    world.drain();
}

#[when("staff refresh the desk")]
fn staff_refresh_the_desk(world: &TodayDeskWorld) {
    world
        .with_desk(|desk, runtime| runtime.block_on(desk.handle_manual_refresh()))
        .expect("refresh succeeds");
    world.drain();
}

#[then("the desk lists {keys}")]
fn the_desk_lists(world: &TodayDeskWorld, keys: String) {
    let expected: Vec<String> = keys.split(',').map(|key| key.trim().to_owned()).collect();
    assert_eq!(world.listed_keys(), expected);
}

#[then("the desk is connected")]
fn the_desk_is_connected(world: &TodayDeskWorld) {
    let state = world.with_desk(|desk, _| desk.connection_state());
    assert_eq!(state, ConnectionState::Connected);
}

#[then("the desk is disconnected")]
fn the_desk_is_disconnected(world: &TodayDeskWorld) {
    let state = world.with_desk(|desk, _| desk.connection_state());
    assert_eq!(state, ConnectionState::Disconnected);
}

#[then("the summary counts {count} appointments")]
fn the_summary_counts(world: &TodayDeskWorld, count: usize) {
    let summary = world.with_desk(|desk, _| desk.summary());
    assert_eq!(summary.total, count);
}

#[then("{category} appointment {id} shows status {status}")]
fn appointment_shows_status(
    world: &TodayDeskWorld,
    category: Category,
    id: String,
    status: String,
) {
    let key = AppointmentKey::new(category, id);
    let shown = world.with_desk(|desk, _| {
        desk.aggregate()
            .get(&key)
            .map(|appointment| appointment.status().clone())
    });
    assert_eq!(shown, Some(AppointmentStatus::from(status)));
}

#[then("the transition succeeds with a notification")]
fn the_transition_succeeds(world: &TodayDeskWorld) {
    let outcome = world.last_transition.borrow();
    let receipt = outcome
        .as_ref()
        .expect("a transition was attempted")
        .as_ref()
        .expect("transition should succeed");
    assert!(receipt.notification_sent());
}

#[then("the transition is refused because the new time is missing")]
fn the_transition_is_refused(world: &TodayDeskWorld) {
    let outcome = world.last_transition.borrow();
    let error = outcome
        .as_ref()
        .expect("a transition was attempted")
        .as_ref()
        .expect_err("transition should be refused");
    assert_eq!(
        error,
        &WorkflowError::Validation(ValidationError::MissingField { field: "new time" })
    );
}

#[then("the stored {category} appointment {id} still has status {status}")]
fn the_stored_appointment_has_status(
    world: &TodayDeskWorld,
    category: Category,
    id: String,
    status: String,
) {
    let stored = world
        .backend
        .rows(category.table_name())
        .into_iter()
        .find(|row| record_id(row).as_deref() == Some(id.as_str()))
        .expect("row is stored");
    assert_eq!(stored.get("status"), Some(&json!(status)));
    assert!(world.backend.rows(NOTIFICATIONS_TABLE).is_empty());
}

#[then("the owner has a notification titled {title}")]
fn the_owner_has_a_notification(world: &TodayDeskWorld, title: String) {
    assert_eq!(world.notification_titles(), [title]);
}

#[then("{category} is reported as not loaded")]
fn the_category_is_not_loaded(world: &TodayDeskWorld, category: Category) {
    let failed = world.with_desk(|desk, _| desk.failed_categories().to_vec());
    assert_eq!(failed, [category]);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "Opening the desk merges every category in time order"
)]
fn opening_the_desk_merges_every_category(world: TodayDeskWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "Another client's update replaces the entry in place"
)]
fn another_clients_update_replaces_in_place(world: TodayDeskWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "Another client's booking is placed by time"
)]
fn another_clients_booking_is_placed_by_time(world: TodayDeskWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "Deleting an appointment the desk never listed changes nothing"
)]
fn deleting_an_unlisted_appointment_changes_nothing(world: TodayDeskWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "Another client's delete removes the entry"
)]
fn another_clients_delete_removes_the_entry(world: TodayDeskWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "Completing an appointment notifies its owner"
)]
fn completing_an_appointment_notifies_its_owner(world: TodayDeskWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "Rescheduling without a time is refused before any write"
)]
fn rescheduling_without_a_time_is_refused(world: TodayDeskWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "Rescheduling to another day moves the entry off today's list"
)]
fn rescheduling_to_another_day_moves_the_entry(world: TodayDeskWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "A channel error disconnects until a manual refresh"
)]
fn a_channel_error_disconnects_until_refresh(world: TodayDeskWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "An unavailable table is reported and skipped"
)]
fn an_unavailable_table_is_reported_and_skipped(world: TodayDeskWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/today_desk.feature",
    name = "Listed appointments survive midnight until a refresh"
)]
fn listed_appointments_survive_midnight(world: TodayDeskWorld) {
    drop(world);
}
