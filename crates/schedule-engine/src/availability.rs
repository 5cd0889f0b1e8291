//! Multi-calendar free/busy aggregation.
//!
//! Queries the provider for N calendars, parses each calendar's busy entries
//! into [`TimeInterval`]s and merges them into one busy timeline. Calendars are
//! anonymous after the merge: only the covered time survives.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ScheduleError};
use crate::event::ProviderError;
use crate::interval::{free_gaps, merge_intervals, TimeInterval};
use crate::provider::{CalendarBusy, CalendarProvider};

/// Parsed free/busy data for one calendar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityResult {
    pub busy: Vec<TimeInterval>,
    pub errors: Vec<ProviderError>,
}

/// Merged view over several calendars within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAvailability {
    pub calendars: BTreeMap<String, AvailabilityResult>,
    /// Merged busy blocks (sorted, non-overlapping).
    pub busy: Vec<TimeInterval>,
    /// Gaps between busy blocks, clipped to the window.
    pub free: Vec<TimeInterval>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

fn parse_calendar(calendar_id: &str, data: CalendarBusy) -> AvailabilityResult {
    let busy = data
        .busy
        .into_iter()
        .filter_map(|period| match TimeInterval::parse(&period.start, &period.end, None) {
            Ok(interval) => Some(interval),
            Err(e) => {
                warn!(
                    calendar_id,
                    start = %period.start,
                    end = %period.end,
                    error = %e,
                    "could not parse busy interval, dropping it"
                );
                None
            }
        })
        .collect();

    AvailabilityResult {
        busy,
        errors: data.errors,
    }
}

/// Busy intervals per calendar over `[time_min, time_max)`.
///
/// Calendar-level errors reported by the provider are carried in the result
/// rather than failing the call. An empty id list returns an empty map without
/// contacting the provider.
///
/// # Errors
/// Returns `InvalidWindow` when `time_min > time_max` and `Provider` on a total
/// provider failure.
pub fn find_availability<P>(
    provider: &P,
    calendar_ids: &[String],
    time_min: DateTime<Utc>,
    time_max: DateTime<Utc>,
) -> Result<BTreeMap<String, AvailabilityResult>>
where
    P: CalendarProvider + ?Sized,
{
    if time_min > time_max {
        return Err(ScheduleError::InvalidWindow(
            "availability window starts after it ends".to_string(),
        ));
    }
    if calendar_ids.is_empty() {
        warn!("availability requested for an empty calendar list");
        return Ok(BTreeMap::new());
    }

    info!(
        calendars = ?calendar_ids,
        time_min = %time_min,
        time_max = %time_max,
        "querying free/busy"
    );

    let response = provider.query_free_busy(calendar_ids, time_min, time_max)?;
    let results: BTreeMap<String, AvailabilityResult> = response
        .into_iter()
        .map(|(calendar_id, data)| {
            let parsed = parse_calendar(&calendar_id, data);
            (calendar_id, parsed)
        })
        .collect();

    info!(calendars = results.len(), "retrieved free/busy information");
    Ok(results)
}

/// Concatenate every calendar's busy intervals and merge them.
///
/// Calendars with errors are logged; whatever busy data they did carry is
/// still used.
pub fn merge_busy(results: &BTreeMap<String, AvailabilityResult>) -> Vec<TimeInterval> {
    let mut all_busy = Vec::new();
    for (calendar_id, result) in results {
        if !result.errors.is_empty() {
            warn!(
                calendar_id = %calendar_id,
                errors = ?result.errors,
                "calendar reported free/busy errors, its busy time may be incomplete"
            );
        }
        all_busy.extend(result.busy.iter().copied());
    }
    merge_intervals(all_busy)
}

/// Merge `results` and list the free gaps inside `window`.
pub fn unify(
    results: BTreeMap<String, AvailabilityResult>,
    window: TimeInterval,
) -> UnifiedAvailability {
    let busy = merge_busy(&results);
    let free = free_gaps(&busy, window);
    UnifiedAvailability {
        calendars: results,
        busy,
        free,
        window_start: window.start,
        window_end: window.end,
    }
}
