//! Daily busyness: event count and total timed duration per calendar date.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, ScheduleError};
use crate::event::{EventTime, RawEvent};
use crate::provider::{CalendarProvider, EventQuery};

/// Stats for one calendar date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BusynessBucket {
    pub event_count: u32,
    /// Sum of timed event durations. All-day events add nothing here.
    pub total_duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusynessRequest {
    pub calendar_id: String,
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    /// Zone the window bounds are turned into dates in. UTC when unset.
    pub timezone: Option<Tz>,
}

impl BusynessRequest {
    /// Dates `[first, end)` an event must start on to be counted.
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        let tz = self.timezone.unwrap_or(Tz::UTC);
        (
            self.time_min.with_timezone(&tz).date_naive(),
            self.time_max.with_timezone(&tz).date_naive(),
        )
    }
}

/// Fold event instances into per-date buckets.
///
/// Each event is dated by its own start (local to its zone or offset) and
/// counted only if that date lies in `[first_day, end_day)`. Events whose start
/// cannot be read are skipped with a warning.
pub fn aggregate(
    events: &[RawEvent],
    first_day: NaiveDate,
    end_day: NaiveDate,
) -> BTreeMap<NaiveDate, BusynessBucket> {
    let mut buckets: BTreeMap<NaiveDate, BusynessBucket> = BTreeMap::new();

    for event in events {
        if event.is_recurring_master() {
            debug!(event_id = %event.id, "ignoring recurring master in busyness input");
            continue;
        }

        let start = match event.start.as_ref().map(|s| s.resolve()) {
            Some(Ok(start)) => start,
            Some(Err(e)) => {
                warn!(event_id = %event.id, error = %e, "could not parse event start, skipping");
                continue;
            }
            None => {
                warn!(event_id = %event.id, summary = event.title(), "event has no start, skipping");
                continue;
            }
        };

        let event_date = start.local_date();
        if event_date < first_day || event_date >= end_day {
            continue;
        }

        let bucket = buckets.entry(event_date).or_default();
        bucket.event_count += 1;

        if let EventTime::Timed { at: start_at, .. } = start {
            match event.end.as_ref().map(|e| e.resolve()) {
                Some(Ok(EventTime::Timed { at: end_at, .. })) => {
                    let minutes = (end_at - start_at).num_seconds() as f64 / 60.0;
                    bucket.total_duration_minutes += minutes.max(0.0);
                }
                Some(Err(e)) => {
                    warn!(event_id = %event.id, error = %e, "could not parse event end, duration not counted");
                }
                _ => {}
            }
        }
    }

    buckets
}

/// Fetch the calendar's instances in the window and bucket them by date.
///
/// # Errors
/// Returns `InvalidWindow` when `time_min > time_max` and `Provider` when the
/// provider cannot be queried.
pub fn analyze_busyness<P>(
    provider: &P,
    request: &BusynessRequest,
) -> Result<BTreeMap<NaiveDate, BusynessBucket>>
where
    P: CalendarProvider + ?Sized,
{
    if request.time_min > request.time_max {
        return Err(ScheduleError::InvalidWindow(
            "busyness window starts after it ends".to_string(),
        ));
    }

    info!(
        calendar_id = %request.calendar_id,
        time_min = %request.time_min,
        time_max = %request.time_max,
        "analyzing busyness"
    );

    let events = provider.find(
        &request.calendar_id,
        &EventQuery::instances(request.time_min, request.time_max),
    )?;
    if events.is_empty() {
        info!("no events in range for busyness analysis");
        return Ok(BTreeMap::new());
    }

    let (first_day, end_day) = request.date_range();
    let buckets = aggregate(&events, first_day, end_day);
    info!(days = buckets.len(), "finished busyness analysis");
    Ok(buckets)
}
