//! First-fit slot search over merged busy intervals.
//!
//! A cursor walks the window left to right. A candidate that overlaps a busy
//! interval sends the cursor to that interval's end; a busy-free candidate
//! outside working hours moves the cursor according to [`SearchStrategy`].

use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ScheduleError};
use crate::interval::{localize, TimeInterval};

/// Cursor step after a busy-free candidate falls outside working hours.
pub const WORKING_HOURS_STEP_MINUTES: i64 = 15;

/// A bookable slot of exactly the requested duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FreeSlot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl From<FreeSlot> for TimeInterval {
    fn from(slot: FreeSlot) -> Self {
        TimeInterval {
            start: slot.start,
            end: slot.end,
        }
    }
}

/// How the cursor moves past a busy-free slot outside working hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchStrategy {
    /// Advance by [`WORKING_HOURS_STEP_MINUTES`] and retry.
    #[default]
    Stepped,
    /// Jump straight to the next working-hours opening.
    NextBoundary,
}

/// A daily time-of-day window slots must fit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Zone the daily bounds are read in.
    pub timezone: Tz,
}

impl WorkingHours {
    /// # Errors
    /// Returns `InvalidWorkingHours` unless `start < end`.
    pub fn new(start: NaiveTime, end: NaiveTime, timezone: Tz) -> Result<Self> {
        if start >= end {
            return Err(ScheduleError::InvalidWorkingHours(format!(
                "start {} must be before end {}",
                start, end
            )));
        }
        Ok(Self {
            start,
            end,
            timezone,
        })
    }

    /// Parse `HH:MM` bounds.
    pub fn parse(start: &str, end: &str, timezone: Tz) -> Result<Self> {
        Self::new(parse_hhmm(start)?, parse_hhmm(end)?, timezone)
    }

    /// Working hours apply only when both bounds are configured.
    pub fn from_bounds(
        start: Option<&str>,
        end: Option<&str>,
        timezone: Tz,
    ) -> Result<Option<Self>> {
        match (start, end) {
            (Some(start), Some(end)) => Self::parse(start, end, timezone).map(Some),
            _ => Ok(None),
        }
    }

    /// Whether `slot` starts at or after the daily start, ends at or before the
    /// daily end, and stays on one local calendar day.
    pub fn contains(&self, slot: &TimeInterval) -> bool {
        let start = slot.start.with_timezone(&self.timezone);
        let end = slot.end.with_timezone(&self.timezone);
        self.start <= start.time() && end.time() <= self.end && start.date_naive() == end.date_naive()
    }

    /// Earliest working-hours opening strictly after `after`.
    fn next_opening(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        let mut date = local.date_naive();
        if local.time() >= self.start {
            date = date.succ_opt().unwrap_or(date);
        }
        localize(date.and_time(self.start), self.timezone)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .filter(|opening| *opening > after)
            .or_else(|| after.checked_add_signed(Duration::minutes(WORKING_HOURS_STEP_MINUTES)))
    }
}

fn parse_hhmm(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
        .map_err(|e| ScheduleError::InvalidWorkingHours(format!("'{}': {}", raw, e)))
}

/// Inputs of one slot search. All instants are UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSearch<'a> {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    pub duration: Duration,
    /// Busy intervals, ideally merged; sorted here regardless.
    pub busy: &'a [TimeInterval],
    pub working_hours: Option<WorkingHours>,
    /// The search never starts before this instant.
    pub now: DateTime<Utc>,
    pub strategy: SearchStrategy,
}

/// Find the earliest slot of exactly `search.duration` inside the window.
///
/// Returns `None` when the window is exhausted, which is an answer rather than
/// an error.
pub fn find_first_available_slot(search: &SlotSearch<'_>) -> Option<FreeSlot> {
    let effective_start = search.time_min.max(search.now);
    info!(
        time_min = %search.time_min,
        time_max = %search.time_max,
        now = %search.now,
        effective_start = %effective_start,
        "searching for available slot"
    );

    let mut busy = search.busy.to_vec();
    busy.sort_by_key(|b| b.start);

    let step = Duration::minutes(WORKING_HOURS_STEP_MINUTES);
    let mut cursor = effective_start;

    while cursor < search.time_max {
        let end = match cursor.checked_add_signed(search.duration) {
            Some(end) if end <= search.time_max => end,
            end => {
                debug!(candidate_end = ?end, "candidate exceeds window, search finished");
                break;
            }
        };
        let candidate = TimeInterval { start: cursor, end };

        if let Some(blocking) = busy.iter().find(|b| b.overlaps(&candidate)) {
            debug!(
                candidate_start = %candidate.start,
                busy_start = %blocking.start,
                busy_end = %blocking.end,
                "candidate overlaps busy interval, jumping"
            );
            cursor = blocking.end;
            continue;
        }

        match search.working_hours {
            Some(hours) if !hours.contains(&candidate) => {
                let next = match search.strategy {
                    SearchStrategy::Stepped => cursor.checked_add_signed(step),
                    SearchStrategy::NextBoundary => hours.next_opening(cursor),
                };
                let Some(next) = next else { break };
                cursor = next;
            }
            _ => {
                info!(start = %candidate.start, end = %candidate.end, "found available slot");
                return Some(FreeSlot {
                    start: candidate.start,
                    end: candidate.end,
                });
            }
        }
    }

    info!("no suitable slot found within the window");
    None
}
