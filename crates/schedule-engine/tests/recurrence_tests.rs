//! Tests for recurring event projection.

mod common;

use chrono::Duration;
use common::{all_day, master, single, timed, utc, zoned, FakeProvider};
use schedule_engine::error::{ProviderFailure, ScheduleError};
use schedule_engine::event::EventDateTime;
use schedule_engine::recurrence::{
    project_events, project_recurring_events, ProjectionRequest, RecurrenceDefinition,
};

fn request(time_min: &str, time_max: &str) -> ProjectionRequest {
    ProjectionRequest {
        calendar_id: "primary".to_string(),
        time_min: utc(time_min),
        time_max: utc(time_max),
        query: None,
        timezone: None,
    }
}

// ---------------------------------------------------------------------------
// Basic expansion
// ---------------------------------------------------------------------------

#[test]
fn weekly_count_three_in_four_week_window() {
    // 2026-03-02 is a Monday.
    let provider = FakeProvider::with_events(vec![master(
        "weekly",
        timed("2026-03-02T10:00:00Z"),
        Some(timed("2026-03-02T11:00:00Z")),
        &["RRULE:FREQ=WEEKLY;COUNT=3"],
    )]);

    let result = project_recurring_events(
        &provider,
        &request("2026-02-23T00:00:00Z", "2026-03-23T00:00:00Z"),
    )
    .expect("projection should succeed");

    assert_eq!(result.len(), 3, "COUNT=3 should produce exactly 3 occurrences");
    let starts: Vec<_> = result.iter().map(|o| o.occurrence_start).collect();
    assert_eq!(
        starts,
        vec![
            utc("2026-03-02T10:00:00Z"),
            utc("2026-03-09T10:00:00Z"),
            utc("2026-03-16T10:00:00Z"),
        ]
    );
    for occurrence in &result {
        assert_eq!(occurrence.occurrence_end - occurrence.occurrence_start, Duration::hours(1));
        assert_eq!(occurrence.source_event_id, "weekly");
        assert_eq!(occurrence.title, "event weekly");
        assert!(occurrence.occurrence_start >= utc("2026-03-02T10:00:00Z"));
    }
}

#[test]
fn series_started_before_window_still_projects() {
    let events = vec![master(
        "daily",
        timed("2025-01-01T10:00:00Z"),
        Some(timed("2025-01-01T10:30:00Z")),
        &["RRULE:FREQ=DAILY"],
    )];

    let result = project_events(&events, utc("2026-03-02T00:00:00Z"), utc("2026-03-04T00:00:00Z"), None);

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].occurrence_start, utc("2026-03-02T10:00:00Z"));
    assert_eq!(result[1].occurrence_start, utc("2026-03-03T10:00:00Z"));
}

#[test]
fn window_bounds_are_inclusive() {
    let events = vec![master(
        "daily",
        timed("2026-03-01T10:00:00Z"),
        Some(timed("2026-03-01T11:00:00Z")),
        &["RRULE:FREQ=DAILY"],
    )];

    let result = project_events(&events, utc("2026-03-02T10:00:00Z"), utc("2026-03-04T10:00:00Z"), None);

    let starts: Vec<_> = result.iter().map(|o| o.occurrence_start).collect();
    assert_eq!(
        starts,
        vec![
            utc("2026-03-02T10:00:00Z"),
            utc("2026-03-03T10:00:00Z"),
            utc("2026-03-04T10:00:00Z"),
        ]
    );
}

#[test]
fn occurrences_from_several_masters_are_sorted() {
    let events = vec![
        master(
            "late",
            timed("2026-03-02T15:00:00Z"),
            Some(timed("2026-03-02T16:00:00Z")),
            &["RRULE:FREQ=DAILY;COUNT=2"],
        ),
        master(
            "early",
            timed("2026-03-02T08:00:00Z"),
            Some(timed("2026-03-02T09:00:00Z")),
            &["RRULE:FREQ=DAILY;COUNT=2"],
        ),
    ];

    let result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-03-10T00:00:00Z"), None);

    let ids: Vec<_> = result.iter().map(|o| o.source_event_id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late", "early", "late"]);
    for pair in result.windows(2) {
        assert!(pair[0].occurrence_start <= pair[1].occurrence_start);
    }
}

// ---------------------------------------------------------------------------
// Exceptions and extra dates
// ---------------------------------------------------------------------------

#[test]
fn utc_exdate_removes_occurrence() {
    let events = vec![master(
        "weekly",
        timed("2026-03-02T10:00:00Z"),
        Some(timed("2026-03-02T11:00:00Z")),
        &["RRULE:FREQ=WEEKLY;COUNT=4", "EXDATE:20260309T100000Z"],
    )];

    let result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-04-01T00:00:00Z"), None);

    let starts: Vec<_> = result.iter().map(|o| o.occurrence_start).collect();
    assert_eq!(
        starts,
        vec![
            utc("2026-03-02T10:00:00Z"),
            utc("2026-03-16T10:00:00Z"),
            utc("2026-03-23T10:00:00Z"),
        ]
    );
}

#[test]
fn tzid_exdate_matches_local_occurrence() {
    let events = vec![master(
        "standup",
        zoned("2026-03-02T09:00:00-05:00", "America/New_York"),
        Some(zoned("2026-03-02T09:15:00-05:00", "America/New_York")),
        &[
            "RRULE:FREQ=DAILY;COUNT=3",
            "EXDATE;TZID=America/New_York:20260303T090000",
        ],
    )];

    let result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-03-10T00:00:00Z"), None);

    let starts: Vec<_> = result.iter().map(|o| o.occurrence_start).collect();
    assert_eq!(
        starts,
        vec![utc("2026-03-02T14:00:00Z"), utc("2026-03-04T14:00:00Z")]
    );
}

#[test]
fn malformed_exdate_skipped_individually() {
    let events = vec![master(
        "weekly",
        timed("2026-03-02T10:00:00Z"),
        Some(timed("2026-03-02T11:00:00Z")),
        &["RRULE:FREQ=WEEKLY;COUNT=3", "EXDATE:garbage,20260309T100000Z"],
    )];

    let result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-04-01T00:00:00Z"), None);

    assert_eq!(result.len(), 2, "valid EXDATE still applies");
    assert_eq!(result[1].occurrence_start, utc("2026-03-16T10:00:00Z"));
}

#[test]
fn rdate_adds_occurrence() {
    let events = vec![master(
        "once",
        timed("2026-03-02T10:00:00Z"),
        Some(timed("2026-03-02T10:45:00Z")),
        &["RRULE:FREQ=WEEKLY;COUNT=1", "RDATE:20260305T150000Z"],
    )];

    let result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-03-10T00:00:00Z"), None);

    assert_eq!(result.len(), 2);
    assert_eq!(result[1].occurrence_start, utc("2026-03-05T15:00:00Z"));
    assert_eq!(result[1].occurrence_end, utc("2026-03-05T15:45:00Z"));
}

// ---------------------------------------------------------------------------
// Timezones
// ---------------------------------------------------------------------------

#[test]
fn zoned_series_keeps_wall_clock_across_dst() {
    // US DST starts 2026-03-08: 09:00 EST is 14:00Z, 09:00 EDT is 13:00Z.
    let events = vec![master(
        "weekly-ny",
        zoned("2026-03-02T09:00:00-05:00", "America/New_York"),
        Some(zoned("2026-03-02T10:00:00-05:00", "America/New_York")),
        &["RRULE:FREQ=WEEKLY;COUNT=3"],
    )];

    let result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-03-31T00:00:00Z"), None);

    let starts: Vec<_> = result.iter().map(|o| o.occurrence_start).collect();
    assert_eq!(
        starts,
        vec![
            utc("2026-03-02T14:00:00Z"),
            utc("2026-03-09T13:00:00Z"),
            utc("2026-03-16T13:00:00Z"),
        ]
    );
}

#[test]
fn utc_until_on_zoned_series_is_inclusive() {
    let events = vec![master(
        "until",
        zoned("2026-03-02T09:00:00-05:00", "America/New_York"),
        Some(zoned("2026-03-02T09:30:00-05:00", "America/New_York")),
        &["RRULE:FREQ=DAILY;UNTIL=20260304T140000Z"],
    )];

    let result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-03-31T00:00:00Z"), None);

    assert_eq!(result.len(), 3, "UNTIL equal to the third start keeps it");
}

#[test]
fn local_until_on_zoned_series_is_read_in_series_zone() {
    let events = vec![master(
        "until-local",
        zoned("2026-03-02T09:00:00-05:00", "America/New_York"),
        Some(zoned("2026-03-02T09:30:00-05:00", "America/New_York")),
        &["RRULE:FREQ=DAILY;UNTIL=20260304T090000"],
    )];

    let result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-03-31T00:00:00Z"), None);

    assert_eq!(result.len(), 3, "zoned series with a local UNTIL must still expand");
    assert_eq!(result[2].occurrence_start, utc("2026-03-04T14:00:00Z"));
}

#[test]
fn date_until_on_zoned_series_covers_the_whole_local_day() {
    // 20:00 in Los Angeles on Mar 4 is already Mar 5 in UTC.
    let events = vec![master(
        "until-date",
        zoned("2026-03-02T20:00:00-08:00", "America/Los_Angeles"),
        None,
        &["RRULE:FREQ=DAILY;UNTIL=20260304"],
    )];

    let result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-03-31T00:00:00Z"), None);

    assert_eq!(
        result.iter().map(|o| o.occurrence_start).collect::<Vec<_>>(),
        vec![
            utc("2026-03-03T04:00:00Z"),
            utc("2026-03-04T04:00:00Z"),
            utc("2026-03-05T04:00:00Z"),
        ]
    );
}

#[test]
fn all_day_series_starts_at_window_zone_midnight() {
    let events = vec![master(
        "holiday",
        all_day("2026-03-02"),
        Some(all_day("2026-03-03")),
        &["RRULE:FREQ=DAILY;COUNT=2"],
    )];

    let utc_result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-03-10T00:00:00Z"), None);
    assert_eq!(utc_result.len(), 2);
    assert_eq!(utc_result[0].occurrence_start, utc("2026-03-02T00:00:00Z"));
    assert_eq!(utc_result[0].occurrence_end, utc("2026-03-03T00:00:00Z"));

    let berlin = project_events(
        &events,
        utc("2026-03-01T00:00:00Z"),
        utc("2026-03-10T00:00:00Z"),
        Some(chrono_tz::Europe::Berlin),
    );
    assert_eq!(berlin[0].occurrence_start, utc("2026-03-01T23:00:00Z"));
}

#[test]
fn all_day_without_end_lasts_one_day() {
    let event = master("bday", all_day("2026-03-02"), None, &["RRULE:FREQ=YEARLY"]);
    let definition = RecurrenceDefinition::from_master(&event, None)
        .unwrap()
        .expect("recurring master");
    assert_eq!(definition.duration, Duration::days(1));
}

// ---------------------------------------------------------------------------
// Degraded input
// ---------------------------------------------------------------------------

#[test]
fn missing_end_defaults_to_one_hour() {
    let event = master(
        "no-end",
        timed("2026-03-02T10:00:00Z"),
        None,
        &["RRULE:FREQ=DAILY;COUNT=1"],
    );
    let definition = RecurrenceDefinition::from_master(&event, None)
        .unwrap()
        .expect("recurring master");
    assert_eq!(definition.duration, Duration::hours(1));
}

#[test]
fn non_recurring_event_is_not_a_definition() {
    let event = single("plain", timed("2026-03-02T10:00:00Z"), None);
    assert_eq!(RecurrenceDefinition::from_master(&event, None).unwrap(), None);

    let empty = master("empty", timed("2026-03-02T10:00:00Z"), None, &[]);
    assert_eq!(RecurrenceDefinition::from_master(&empty, None).unwrap(), None);
}

#[test]
fn recurrence_without_rrule_is_an_error() {
    let event = master("exdate-only", timed("2026-03-02T10:00:00Z"), None, &["EXDATE:20260303T100000Z"]);
    assert!(matches!(
        RecurrenceDefinition::from_master(&event, None),
        Err(ScheduleError::InvalidRule(_))
    ));
}

#[test]
fn broken_events_do_not_abort_projection() {
    let events = vec![
        master("no-rrule", timed("2026-03-02T10:00:00Z"), None, &["EXDATE:20260303T100000Z"]),
        master("bad-rule", timed("2026-03-02T10:00:00Z"), None, &["RRULE:FREQ=SOMETIMES"]),
        master("no-start", EventDateTime::default(), None, &["RRULE:FREQ=DAILY"]),
        master(
            "good",
            timed("2026-03-02T12:00:00Z"),
            Some(timed("2026-03-02T12:30:00Z")),
            &["RRULE:FREQ=DAILY;COUNT=2"],
        ),
    ];

    let result = project_events(&events, utc("2026-03-01T00:00:00Z"), utc("2026-03-10T00:00:00Z"), None);

    assert_eq!(result.len(), 2);
    assert!(result.iter().all(|o| o.source_event_id == "good"));
}

// ---------------------------------------------------------------------------
// Provider interaction
// ---------------------------------------------------------------------------

#[test]
fn masters_are_fetched_without_time_bound() {
    let provider = FakeProvider::default();
    let mut req = request("2026-03-01T00:00:00Z", "2026-03-10T00:00:00Z");
    req.query = Some("Birthday".to_string());

    let result = project_recurring_events(&provider, &req).unwrap();

    assert!(result.is_empty());
    let queries = provider.queries.borrow();
    assert_eq!(queries.len(), 1);
    assert!(!queries[0].single_events, "masters, not instances");
    assert!(queries[0].time_min.is_none() && queries[0].time_max.is_none());
    assert_eq!(queries[0].query.as_deref(), Some("Birthday"));
    assert_eq!(queries[0].max_results, 2500);
}

#[test]
fn provider_failure_is_fatal() {
    let provider = FakeProvider {
        fail_find: Some(ProviderFailure::Transport("connection reset".to_string())),
        ..FakeProvider::default()
    };

    let result = project_recurring_events(&provider, &request("2026-03-01T00:00:00Z", "2026-03-10T00:00:00Z"));

    assert!(matches!(
        result,
        Err(ScheduleError::Provider(ProviderFailure::Transport(_)))
    ));
}

#[test]
fn inverted_window_is_rejected() {
    let provider = FakeProvider::default();
    let result = project_recurring_events(&provider, &request("2026-03-10T00:00:00Z", "2026-03-01T00:00:00Z"));
    assert!(matches!(result, Err(ScheduleError::InvalidWindow(_))));
}
