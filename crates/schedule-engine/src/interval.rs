//! Time intervals and the merge/overlap primitives everything else builds on.
//!
//! All intervals are half-open `[start, end)` and carried in UTC. Boundary input
//! with another offset or zone is normalized on entry via [`normalize_to_utc`].

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

/// Naive datetime layouts accepted when an instant carries no offset.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// A span of time `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// Build an interval, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(ScheduleError::InvalidWindow(format!(
                "interval start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse both endpoints with [`normalize_to_utc`].
    pub fn parse(start: &str, end: &str, zone: Option<Tz>) -> Result<Self> {
        Self::new(normalize_to_utc(start, zone)?, normalize_to_utc(end, zone)?)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Half-open overlap: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// Free function form of [`TimeInterval::overlaps`].
pub fn overlaps(a: &TimeInterval, b: &TimeInterval) -> bool {
    a.overlaps(b)
}

/// Normalize a boundary instant string to UTC.
///
/// Strings carrying an offset (RFC 3339) are converted to UTC. Strings without
/// one are interpreted in `zone` when given, otherwise as UTC. Sub-second
/// precision is kept.
///
/// # Errors
/// Returns `ScheduleError::InvalidDateTime` if the string matches no accepted
/// layout or names a local time that does not exist in `zone` (DST gap).
pub fn normalize_to_utc(instant: &str, zone: Option<Tz>) -> Result<DateTime<Utc>> {
    parse_instant(instant, zone).map(|dt| dt.with_timezone(&Utc))
}

/// Like [`normalize_to_utc`] but keeps the offset the instant was written in.
pub fn parse_instant(instant: &str, zone: Option<Tz>) -> Result<DateTime<FixedOffset>> {
    let trimmed = instant.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt);
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ScheduleError::InvalidDateTime {
            value: instant.to_string(),
            reason: "expected RFC 3339 or YYYY-MM-DDTHH:MM[:SS]".to_string(),
        })?;

    match zone {
        Some(tz) => Ok(localize(naive, tz)?.fixed_offset()),
        None => Ok(naive.and_utc().fixed_offset()),
    }
}

/// Attach `tz` to a naive local time.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant.
pub(crate) fn localize(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(ScheduleError::InvalidDateTime {
            value: naive.to_string(),
            reason: format!("local time does not exist in {}", tz.name()),
        }),
    }
}

/// Merge overlapping or adjacent intervals into a minimal covering list.
///
/// Sorted by start, then folded left to right: an interval whose start is at or
/// before the previous end extends that interval.
pub fn merge_intervals(mut intervals: Vec<TimeInterval>) -> Vec<TimeInterval> {
    if intervals.is_empty() {
        return Vec::new();
    }

    intervals.sort_by_key(|i| (i.start, i.end));

    let mut merged: Vec<TimeInterval> = Vec::with_capacity(intervals.len());
    for current in intervals {
        if let Some(last) = merged.last_mut() {
            if current.start <= last.end {
                last.end = last.end.max(current.end);
                continue;
            }
        }
        merged.push(current);
    }

    merged
}

/// Free gaps between merged busy intervals inside `window`.
///
/// `busy` need not be clipped to the window but must be sorted and
/// non-overlapping, as returned by [`merge_intervals`].
pub fn free_gaps(busy: &[TimeInterval], window: TimeInterval) -> Vec<TimeInterval> {
    let mut gaps = Vec::new();
    let mut cursor = window.start;

    for interval in busy.iter().filter(|b| b.overlaps(&window)) {
        if cursor < interval.start {
            gaps.push(TimeInterval {
                start: cursor,
                end: interval.start,
            });
        }
        cursor = cursor.max(interval.end);
    }

    if cursor < window.end {
        gaps.push(TimeInterval {
            start: cursor,
            end: window.end,
        });
    }

    gaps
}
