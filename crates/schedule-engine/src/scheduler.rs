//! Find a mutual free slot for a set of attendees and book it.
//!
//! # Concurrency
//!
//! Finding and booking are two separate provider calls with no hold or lock in
//! between. Two concurrent calls over overlapping attendees can both see the
//! same slot as free and both book it.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::availability::{find_availability, merge_busy};
use crate::error::{Result, ScheduleError};
use crate::event::{EventDateTime, EventDraft, RawEvent};
use crate::provider::CalendarProvider;
use crate::slot::{find_first_available_slot, FreeSlot, SearchStrategy, SlotSearch, WorkingHours};

/// Calendar id that stands for the caller's own calendar and is never invited.
pub const PRIMARY_CALENDAR: &str = "primary";

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    pub attendee_calendar_ids: Vec<String>,
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    pub duration_minutes: i64,
    /// Event details; start and end are overwritten with the found slot.
    pub event: EventDraft,
    pub organizer_calendar_id: String,
    pub working_hours: Option<WorkingHours>,
    pub strategy: SearchStrategy,
    pub send_notifications: bool,
    /// Zone the booked start/end are written in. UTC when unset.
    pub event_timezone: Option<Tz>,
    pub now: DateTime<Utc>,
}

/// Result of a scheduling attempt that reached the provider without failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    Booked { slot: FreeSlot, event: RawEvent },
    NoSlot,
}

/// Check availability of every attendee, pick the first mutual slot and create
/// the event on the organizer's calendar.
///
/// # Errors
/// Returns `InvalidWindow` for a non-positive duration or inverted window and
/// `Provider` when availability cannot be fetched or the event cannot be
/// created after a slot was found.
pub fn schedule_mutual<P>(provider: &P, request: &ScheduleRequest) -> Result<ScheduleOutcome>
where
    P: CalendarProvider + ?Sized,
{
    if request.duration_minutes <= 0 {
        return Err(ScheduleError::InvalidWindow(format!(
            "duration must be positive, got {} minutes",
            request.duration_minutes
        )));
    }
    let duration = Duration::try_minutes(request.duration_minutes).ok_or_else(|| {
        ScheduleError::InvalidWindow(format!(
            "duration of {} minutes is out of range",
            request.duration_minutes
        ))
    })?;

    info!(
        attendees = ?request.attendee_calendar_ids,
        time_min = %request.time_min,
        time_max = %request.time_max,
        duration_minutes = request.duration_minutes,
        "scheduling mutual event"
    );

    let availability = find_availability(
        provider,
        &request.attendee_calendar_ids,
        request.time_min,
        request.time_max,
    )
    .inspect_err(|e| error!(error = %e, "failed to retrieve availability data"))?;

    let merged = merge_busy(&availability);

    let search = SlotSearch {
        time_min: request.time_min,
        time_max: request.time_max,
        duration,
        busy: &merged,
        working_hours: request.working_hours,
        now: request.now,
        strategy: request.strategy,
    };
    let Some(slot) = find_first_available_slot(&search) else {
        warn!("no mutually available slot found");
        return Ok(ScheduleOutcome::NoSlot);
    };

    let mut draft = request.event.clone();
    draft.start = Some(EventDateTime::timed(slot.start, request.event_timezone));
    draft.end = Some(EventDateTime::timed(slot.end, request.event_timezone));
    for calendar_id in &request.attendee_calendar_ids {
        if calendar_id != PRIMARY_CALENDAR {
            draft.ensure_attendee(calendar_id);
        }
    }

    let body = draft.to_event_body()?;
    let created = provider
        .create(&request.organizer_calendar_id, &body, request.send_notifications)
        .inspect_err(|e| error!(error = %e, "failed to create event after finding a slot"))?;

    info!(
        event_id = %created.id,
        summary = created.title(),
        start = %slot.start,
        "scheduled event"
    );
    Ok(ScheduleOutcome::Booked {
        slot,
        event: created,
    })
}
