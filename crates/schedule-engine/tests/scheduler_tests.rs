//! Tests for finding a mutual slot and booking it.

mod common;

use chrono_tz::Tz;
use common::{utc, FakeProvider};
use schedule_engine::error::{ProviderFailure, ScheduleError};
use schedule_engine::event::{EventDraft, ProviderError};
use schedule_engine::provider::{BusyPeriod, CalendarBusy, FreeBusyResponse};
use schedule_engine::scheduler::{schedule_mutual, ScheduleOutcome, ScheduleRequest};
use schedule_engine::slot::{SearchStrategy, WorkingHours};

fn calendar(periods: &[(&str, &str)]) -> CalendarBusy {
    CalendarBusy {
        busy: periods
            .iter()
            .map(|(start, end)| BusyPeriod {
                start: start.to_string(),
                end: end.to_string(),
            })
            .collect(),
        errors: vec![],
    }
}

fn busy_provider() -> FakeProvider {
    let mut data = FreeBusyResponse::new();
    data.insert(
        "alice@example.com".to_string(),
        calendar(&[("2026-03-02T09:00:00Z", "2026-03-02T10:00:00Z")]),
    );
    data.insert(
        "bob@example.com".to_string(),
        calendar(&[("2026-03-02T09:30:00Z", "2026-03-02T11:00:00Z")]),
    );
    FakeProvider::with_free_busy(data)
}

fn request(attendees: &[&str], duration_minutes: i64) -> ScheduleRequest {
    ScheduleRequest {
        attendee_calendar_ids: attendees.iter().map(|s| s.to_string()).collect(),
        time_min: utc("2026-03-02T09:00:00Z"),
        time_max: utc("2026-03-02T17:00:00Z"),
        duration_minutes,
        event: EventDraft {
            summary: "Planning".to_string(),
            description: Some("Quarterly planning".to_string()),
            ..EventDraft::default()
        },
        organizer_calendar_id: "primary".to_string(),
        working_hours: None,
        strategy: SearchStrategy::Stepped,
        send_notifications: true,
        event_timezone: None,
        now: utc("2026-03-01T00:00:00Z"),
    }
}

fn booked(outcome: ScheduleOutcome) -> (schedule_engine::slot::FreeSlot, schedule_engine::event::RawEvent) {
    match outcome {
        ScheduleOutcome::Booked { slot, event } => (slot, event),
        ScheduleOutcome::NoSlot => panic!("expected a booking"),
    }
}

// ---------------------------------------------------------------------------
// Successful booking
// ---------------------------------------------------------------------------

#[test]
fn books_first_mutual_slot() {
    let provider = busy_provider();

    let outcome = schedule_mutual(&provider, &request(&["alice@example.com", "bob@example.com"], 30))
        .expect("scheduling should succeed");

    let (slot, event) = booked(outcome);
    assert_eq!(slot.start, utc("2026-03-02T11:00:00Z"));
    assert_eq!(slot.end, utc("2026-03-02T11:30:00Z"));
    assert_eq!(event.id, "created-1");

    let created = provider.created.borrow();
    assert_eq!(created.len(), 1);
    let call = &created[0];
    assert_eq!(call.calendar_id, "primary");
    assert!(call.notify);
    assert_eq!(call.body.summary.as_deref(), Some("Planning"));
    assert_eq!(call.body.description.as_deref(), Some("Quarterly planning"));
    let emails: Vec<_> = call.body.attendees.iter().map(|a| a.email.as_str()).collect();
    assert_eq!(emails, vec!["alice@example.com", "bob@example.com"]);

    let start = call.body.start.as_ref().unwrap().resolve().unwrap();
    assert_eq!(start.instant(), Some(utc("2026-03-02T11:00:00Z")));
}

#[test]
fn primary_is_queried_but_not_invited() {
    let provider = busy_provider();

    let outcome = schedule_mutual(&provider, &request(&["primary", "alice@example.com"], 30)).unwrap();

    booked(outcome);
    assert_eq!(
        provider.free_busy_calls.borrow()[0],
        vec!["primary".to_string(), "alice@example.com".to_string()]
    );
    let created = provider.created.borrow();
    let emails: Vec<_> = created[0].body.attendees.iter().map(|a| a.email.as_str()).collect();
    assert_eq!(emails, vec!["alice@example.com"]);
}

#[test]
fn existing_attendees_are_not_duplicated() {
    let provider = busy_provider();
    let mut req = request(&["alice@example.com"], 30);
    req.event.attendees = vec!["alice@example.com".to_string(), "dave@example.com".to_string()];

    schedule_mutual(&provider, &req).unwrap();

    let created = provider.created.borrow();
    let emails: Vec<_> = created[0].body.attendees.iter().map(|a| a.email.as_str()).collect();
    assert_eq!(emails, vec!["alice@example.com", "dave@example.com"]);
}

#[test]
fn event_times_written_in_requested_zone() {
    let provider = busy_provider();
    let mut req = request(&["alice@example.com"], 60);
    req.event_timezone = Some(chrono_tz::America::New_York);

    schedule_mutual(&provider, &req).unwrap();

    let created = provider.created.borrow();
    let start = created[0].body.start.as_ref().unwrap();
    assert_eq!(start.time_zone.as_deref(), Some("America/New_York"));
    assert_eq!(start.date_time.as_deref(), Some("2026-03-02T05:00:00-05:00"));
}

#[test]
fn working_hours_constrain_booking() {
    let provider = busy_provider();
    let mut req = request(&["alice@example.com", "bob@example.com"], 60);
    req.working_hours = Some(WorkingHours::parse("13:00", "17:00", Tz::UTC).unwrap());

    let (slot, _) = booked(schedule_mutual(&provider, &req).unwrap());

    assert_eq!(slot.start, utc("2026-03-02T13:00:00Z"));
}

#[test]
fn calendar_errors_do_not_block_booking() {
    let mut data = FreeBusyResponse::new();
    data.insert(
        "ghost@example.com".to_string(),
        CalendarBusy {
            busy: vec![],
            errors: vec![ProviderError {
                domain: "global".to_string(),
                reason: "notFound".to_string(),
            }],
        },
    );
    let provider = FakeProvider::with_free_busy(data);

    let (slot, _) = booked(schedule_mutual(&provider, &request(&["ghost@example.com"], 30)).unwrap());

    assert_eq!(slot.start, utc("2026-03-02T09:00:00Z"));
}

// ---------------------------------------------------------------------------
// No slot and failures
// ---------------------------------------------------------------------------

#[test]
fn no_slot_creates_nothing() {
    let provider = busy_provider();

    let outcome = schedule_mutual(&provider, &request(&["alice@example.com"], 600)).unwrap();

    assert_eq!(outcome, ScheduleOutcome::NoSlot);
    assert!(provider.created.borrow().is_empty());
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        serde_json::json!({ "status": "no_slot" })
    );
}

#[test]
fn free_busy_failure_stops_before_booking() {
    let provider = FakeProvider {
        fail_free_busy: Some(ProviderFailure::Transport("timeout".to_string())),
        ..FakeProvider::default()
    };

    let result = schedule_mutual(&provider, &request(&["alice@example.com"], 30));

    assert!(matches!(result, Err(ScheduleError::Provider(ProviderFailure::Transport(_)))));
    assert!(provider.created.borrow().is_empty());
}

#[test]
fn create_failure_is_reported() {
    let provider = FakeProvider {
        fail_create: Some(ProviderFailure::UnexpectedResponse {
            status: 403,
            body: "forbidden".to_string(),
        }),
        ..busy_provider()
    };

    let result = schedule_mutual(&provider, &request(&["alice@example.com"], 30));

    assert!(matches!(
        result,
        Err(ScheduleError::Provider(ProviderFailure::UnexpectedResponse { status: 403, .. }))
    ));
}

#[test]
fn non_positive_duration_is_rejected() {
    let provider = busy_provider();

    for minutes in [0, -15] {
        let result = schedule_mutual(&provider, &request(&["alice@example.com"], minutes));
        assert!(matches!(result, Err(ScheduleError::InvalidWindow(_))));
    }
    assert!(provider.free_busy_calls.borrow().is_empty());
}

#[test]
fn out_of_range_duration_is_rejected() {
    let provider = busy_provider();

    let result = schedule_mutual(&provider, &request(&["alice@example.com"], i64::MAX));

    assert!(matches!(result, Err(ScheduleError::InvalidWindow(_))));
    assert!(provider.free_busy_calls.borrow().is_empty());
}

#[test]
fn duration_beyond_the_calendar_range_finds_no_slot() {
    let provider = busy_provider();

    let outcome = schedule_mutual(&provider, &request(&["alice@example.com"], 200_000_000_000)).unwrap();

    assert_eq!(outcome, ScheduleOutcome::NoSlot);
    assert!(provider.created.borrow().is_empty());
}
