//! Tests for the today desk facade.

use std::sync::{Arc, Mutex};

use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::domain::ports::{
    ChangeEvent, FeedMessage, FeedSink, FixtureChangeFeed, MockChangeFeed, MockRecordGateway,
    RecordQuery, SubscriptionHandle,
};
use crate::test_support::{FixtureClock, fixture_today, row};

fn seeded_gateway() -> MockRecordGateway {
    let mut gateway = MockRecordGateway::new();
    gateway.expect_query().returning(|query: &RecordQuery| {
        Ok(match query.table.as_str() {
            "pwd" => vec![
                row("1", AppointmentStatus::Scheduled, Some("14:00")),
                row("42", AppointmentStatus::Scheduled, Some("09:00")),
            ],
            "senior_citizens" => vec![row("2", AppointmentStatus::Approved, Some("09:00"))],
            _ => Vec::<Value>::new(),
        })
    });
    gateway
}

async fn open_desk(gateway: MockRecordGateway, options: DeskOptions) -> TodayDesk {
    TodayDesk::open(
        Arc::new(gateway),
        Arc::new(FixtureChangeFeed),
        Arc::new(FixtureClock::today()),
        options,
    )
    .await
    .expect("desk opens")
}

fn pwd_42() -> AppointmentKey {
    AppointmentKey::new(Category::Pwd, "42")
}

#[rstest]
#[tokio::test]
async fn open_fetches_and_connects() {
    let desk = open_desk(seeded_gateway(), DeskOptions::default()).await;

    assert_eq!(desk.connection_state(), ConnectionState::Connected);
    assert!(desk.failed_categories().is_empty());
    let visible: Vec<_> = desk
        .visible("", &StatusFilter::All)
        .into_iter()
        .map(|entry| entry.key().to_string())
        .collect();
    assert_eq!(visible, ["pwd/42", "senior_citizens/2", "pwd/1"]);
    assert_eq!(desk.summary().status_count(&AppointmentStatus::Scheduled), 2);
}

#[rstest]
#[tokio::test]
async fn open_fails_under_all_or_nothing() {
    let mut gateway = MockRecordGateway::new();
    gateway
        .expect_query()
        .returning(|_| Err(GatewayError::transport("dns failure")));

    let result = TodayDesk::open(
        Arc::new(gateway),
        Arc::new(FixtureChangeFeed),
        Arc::new(FixtureClock::today()),
        DeskOptions {
            fetch_policy: FetchPolicy::AllOrNothing,
            ..DeskOptions::default()
        },
    )
    .await;

    assert!(matches!(result, Err(GatewayError::Transport { .. })));
}

#[rstest]
#[tokio::test]
async fn unknown_keys_are_validation_errors() {
    let mut desk = open_desk(seeded_gateway(), DeskOptions::default()).await;
    let key = AppointmentKey::new(Category::Youth, "42");

    let err = desk
        .apply_status(&key, &AppointmentStatus::Completed, None)
        .await
        .expect_err("not in today's list");

    assert_eq!(
        err,
        WorkflowError::Validation(ValidationError::UnknownAppointment { key })
    );
}

#[rstest]
#[case(false, AppointmentStatus::Scheduled)]
#[case(true, AppointmentStatus::Completed)]
#[tokio::test]
async fn local_view_waits_for_echo_unless_optimistic(
    #[case] optimistic_updates: bool,
    #[case] shown: AppointmentStatus,
) {
    let mut gateway = seeded_gateway();
    gateway.expect_update().times(1).returning(|_, _, _| Ok(()));
    gateway.expect_insert().times(1).returning(|_, _| Ok(()));
    let mut desk = open_desk(
        gateway,
        DeskOptions {
            optimistic_updates,
            ..DeskOptions::default()
        },
    )
    .await;

    let receipt = desk
        .apply_status(&pwd_42(), &AppointmentStatus::Completed, Some("done"))
        .await
        .expect("transition succeeds");

    assert!(receipt.notification_sent());
    assert_eq!(
        desk.aggregate().get(&pwd_42()).map(Appointment::status),
        Some(&shown)
    );
}

#[rstest]
#[tokio::test]
async fn raw_reschedule_input_is_validated_before_writing() {
    let mut gateway = seeded_gateway();
    gateway.expect_update().never();
    let mut desk = open_desk(gateway, DeskOptions::default()).await;

    let err = desk
        .reschedule_from_input(&pwd_42(), Some("2026-10-20"), Some("  "), None)
        .await
        .expect_err("time missing");

    assert_eq!(
        err,
        WorkflowError::Validation(ValidationError::MissingField { field: "new time" })
    );
}

#[rstest]
#[tokio::test]
async fn optimistic_reschedule_moves_entry_out_of_today() {
    let mut gateway = seeded_gateway();
    gateway.expect_update().times(1).returning(|_, _, _| Ok(()));
    gateway.expect_insert().times(1).returning(|_, _| Ok(()));
    let mut desk = open_desk(
        gateway,
        DeskOptions {
            optimistic_updates: true,
            ..DeskOptions::default()
        },
    )
    .await;

    desk.reschedule_from_input(&pwd_42(), Some("2026-10-21"), Some("10:30"), None)
        .await
        .expect("reschedule succeeds");

    assert!(desk.aggregate().get(&pwd_42()).is_none());
    assert_eq!(desk.aggregate().len(), 2);
}

#[rstest]
#[tokio::test]
async fn refresh_and_close_pair_every_subscription_with_a_teardown() {
    let mut feed = MockChangeFeed::new();
    feed.expect_subscribe()
        .times(14)
        .returning(|category, _, _| Ok(SubscriptionHandle::new(category)));
    feed.expect_unsubscribe().times(14).returning(|_| Ok(()));

    let mut desk = TodayDesk::open(
        Arc::new(seeded_gateway()),
        Arc::new(feed),
        Arc::new(FixtureClock::today()),
        DeskOptions::default(),
    )
    .await
    .expect("desk opens");

    desk.handle_manual_refresh().await.expect("refresh succeeds");
    desk.close().await;
    desk.close().await;

    assert_eq!(desk.connection_state(), ConnectionState::Disconnected);
    assert_eq!(desk.process_next_message().await, None);
}

#[rstest]
#[tokio::test]
async fn failed_refresh_keeps_the_live_view() {
    let mut gateway = MockRecordGateway::new();
    let mut first_round = true;
    gateway.expect_query().times(14).returning(move |query| {
        if query.table == "womens_sector" {
            let failing = !first_round;
            first_round = false;
            if failing {
                return Err(GatewayError::rejected(503_u16, "maintenance"));
            }
        }
        Ok(if query.table == "pwd" {
            vec![row("42", AppointmentStatus::Scheduled, Some("09:00"))]
        } else {
            Vec::new()
        })
    });
    let mut desk = open_desk(
        gateway,
        DeskOptions {
            fetch_policy: FetchPolicy::AllOrNothing,
            ..DeskOptions::default()
        },
    )
    .await;

    let err = desk.handle_manual_refresh().await.expect_err("refresh fails");

    assert_eq!(err, GatewayError::rejected(503_u16, "maintenance"));
    assert_eq!(desk.aggregate().len(), 1);
    assert_eq!(desk.connection_state(), ConnectionState::Connected);
}

#[rstest]
#[tokio::test]
async fn desk_keeps_its_day_across_midnight_until_refreshed() {
    let sinks: Arc<Mutex<Vec<(Category, FeedSink)>>> = Arc::default();
    let captured = Arc::clone(&sinks);
    let mut feed = MockChangeFeed::new();
    feed.expect_subscribe().returning(move |category, _, sink| {
        captured.lock().expect("sink list").push((category, sink));
        Ok(SubscriptionHandle::new(category))
    });
    feed.expect_unsubscribe().returning(|_| Ok(()));
    let clock = Arc::new(FixtureClock::today());
    let mut desk = TodayDesk::open(
        Arc::new(seeded_gateway()),
        Arc::new(feed),
        clock.clone(),
        DeskOptions::default(),
    )
    .await
    .expect("desk opens");
    let pwd_sink = sinks
        .lock()
        .expect("sink list")
        .iter()
        .find(|(category, _)| *category == Category::Pwd)
        .map(|(_, sink)| sink.clone())
        .expect("pwd subscribed");

    let tomorrow = fixture_today().succ_opt().expect("next day");
    clock.set(tomorrow, 0, 5);
    let echoed = row("42", AppointmentStatus::Approved, Some("09:00"));
    let booked = json!({ "id": "77", "date": "2026-10-20", "time": "08:00", "status": "scheduled" });
    for event in [ChangeEvent::update(echoed), ChangeEvent::insert(booked)] {
        pwd_sink
            .send(FeedMessage::change(Category::Pwd, event))
            .expect("desk is listening");
    }
    desk.process_pending();

    assert_eq!(desk.today(), fixture_today());
    assert_eq!(
        desk.aggregate().get(&pwd_42()).map(Appointment::status),
        Some(&AppointmentStatus::Approved)
    );
    assert!(desk.aggregate().get(&AppointmentKey::new(Category::Pwd, "77")).is_none());
    assert_eq!(desk.aggregate().len(), 3);

    desk.handle_manual_refresh().await.expect("refresh succeeds");

    assert_eq!(desk.today(), tomorrow);
    assert!(desk.aggregate().is_empty());
}
