//! Recurrence projection. Expands recurring master events into the concrete
//! occurrences that start inside a window.
//!
//! Expansion goes through the `rrule` crate with DTSTART expressed in the
//! series' own IANA zone, so wall-clock times survive DST transitions. EXDATE
//! and RDATE lines are resolved by [`crate::ical`] and applied here.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, ScheduleError};
use crate::event::{EventTime, RawEvent};
use crate::ical::{self, DateValue};
use crate::interval::localize;
use crate::provider::{CalendarProvider, EventQuery};

/// Raw instances the `rrule` crate may produce per series per call.
const EXPANSION_CAP: u16 = 10_000;

/// One concrete instance of a recurring series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedOccurrence {
    #[serde(rename = "original_event_id")]
    pub source_event_id: String,
    #[serde(rename = "original_summary")]
    pub title: String,
    pub occurrence_start: DateTime<Utc>,
    pub occurrence_end: DateTime<Utc>,
}

/// A recurring master event reduced to what expansion needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceDefinition {
    pub owner_event_id: String,
    pub title: String,
    /// Series start in the zone the series recurs in.
    pub dtstart: DateTime<Tz>,
    pub duration: Duration,
    /// RRULE body, UNTIL already aligned with `dtstart`.
    pub rule: String,
    pub exceptions: BTreeSet<DateTime<Utc>>,
    /// Extra starts from RDATE lines.
    pub additions: BTreeSet<DateTime<Utc>>,
}

/// What to project and where.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionRequest {
    pub calendar_id: String,
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    /// Free-text filter on master events (e.g. "Birthday").
    pub query: Option<String>,
    /// Zone all-day series start their midnight in. UTC when unset.
    pub timezone: Option<Tz>,
}

impl RecurrenceDefinition {
    /// Build a definition from a master event.
    ///
    /// Returns `Ok(None)` for events without recurrence lines. A timed master
    /// without an end gets a one-hour duration; an all-day one gets one day.
    ///
    /// # Errors
    /// Returns `InvalidDateTime`/`InvalidTimezone` when the start cannot be
    /// resolved and `InvalidRule` when no RRULE line is present.
    pub fn from_master(event: &RawEvent, window_zone: Option<Tz>) -> Result<Option<Self>> {
        let Some(lines) = event.recurrence.as_ref().filter(|r| !r.is_empty()) else {
            return Ok(None);
        };

        let start = event
            .start
            .as_ref()
            .ok_or_else(|| ScheduleError::InvalidDateTime {
                value: String::new(),
                reason: "recurring event has no start".to_string(),
            })?
            .resolve()?;
        let end = event.end.as_ref().map(|e| e.resolve()).transpose()?;

        let (dtstart, duration) = match start {
            EventTime::Timed { at, zone } => {
                let series_zone = zone.unwrap_or(Tz::UTC);
                let duration = match end {
                    Some(EventTime::Timed { at: end_at, .. }) => end_at - at,
                    _ => {
                        warn!(
                            event_id = %event.id,
                            summary = event.title(),
                            "recurring event has no end dateTime, assuming 1 hour"
                        );
                        Duration::hours(1)
                    }
                };
                (at.with_timezone(&series_zone), duration)
            }
            EventTime::AllDay { date } => {
                let series_zone = window_zone.unwrap_or(Tz::UTC);
                let duration = match end {
                    Some(EventTime::AllDay { date: end_date }) => end_date - date,
                    _ => Duration::days(1),
                };
                (localize(date.and_time(NaiveTime::MIN), series_zone)?, duration)
            }
        };

        let parsed = ical::parse_recurrence(lines);
        for rejected in &parsed.rejected {
            warn!(
                event_id = %event.id,
                property = %rejected.property,
                value = %rejected.value,
                reason = %rejected.reason,
                "skipping unparseable recurrence value"
            );
        }

        let rrule = parsed.rrule.ok_or_else(|| {
            ScheduleError::InvalidRule(format!("event '{}' has no RRULE line", event.id))
        })?;
        let series_zone = dtstart.timezone();
        let rule = ical::align_until(&rrule, series_zone)?;

        Ok(Some(Self {
            owner_event_id: event.id.clone(),
            title: event.title().to_string(),
            dtstart,
            duration,
            rule,
            exceptions: resolve_dates(&event.id, "EXDATE", &parsed.exdates, series_zone),
            additions: resolve_dates(&event.id, "RDATE", &parsed.rdates, series_zone),
        }))
    }

    /// Every occurrence whose start lies in `[window_start, window_end]`.
    ///
    /// Both bounds are inclusive, so adjacent windows share occurrences that
    /// start exactly on the common boundary. Output is sorted by start.
    ///
    /// # Errors
    /// Returns `ScheduleError::InvalidRule` if the `rrule` crate rejects the rule.
    pub fn occurrences_between(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<ProjectedOccurrence>> {
        if window_start > window_end {
            return Ok(Vec::new());
        }

        let rrule_text = format!(
            "DTSTART;TZID={}:{}\nRRULE:{}",
            self.dtstart.timezone().name(),
            self.dtstart.format("%Y%m%dT%H%M%S"),
            self.rule
        );
        let rrule_set: RRuleSet = rrule_text
            .parse()
            .map_err(|e| ScheduleError::InvalidRule(format!("{}", e)))?;

        // Widen by a second on both sides so the crate's own boundary
        // semantics never matter; the window is applied exactly below.
        let tz: rrule::Tz = Utc.into();
        let after = (window_start - Duration::seconds(1)).with_timezone(&tz);
        let before = (window_end + Duration::seconds(1)).with_timezone(&tz);
        let result = rrule_set.after(after).before(before).all(EXPANSION_CAP);

        if result.limited {
            warn!(
                event_id = %self.owner_event_id,
                cap = EXPANSION_CAP,
                "recurrence expansion hit the instance cap, later occurrences dropped"
            );
        }

        let in_window = |dt: &DateTime<Utc>| *dt >= window_start && *dt <= window_end;

        let starts: BTreeSet<DateTime<Utc>> = result
            .dates
            .iter()
            .map(|dt| dt.with_timezone(&Utc))
            .chain(self.additions.iter().copied())
            .filter(in_window)
            .filter(|dt| !self.exceptions.contains(dt))
            .collect();

        Ok(starts
            .into_iter()
            .map(|start| ProjectedOccurrence {
                source_event_id: self.owner_event_id.clone(),
                title: self.title.clone(),
                occurrence_start: start,
                occurrence_end: start + self.duration,
            })
            .collect())
    }
}

fn resolve_dates(
    event_id: &str,
    property: &str,
    values: &[DateValue],
    series_zone: Tz,
) -> BTreeSet<DateTime<Utc>> {
    values
        .iter()
        .filter_map(|value| match value.to_utc(series_zone) {
            Ok(dt) => Some(dt),
            Err(e) => {
                warn!(event_id, property, error = %e, "skipping unresolvable recurrence date");
                None
            }
        })
        .collect()
}

/// Expand every recurring master in `events` over `[time_min, time_max]`.
///
/// Failures are isolated per event: a master that cannot be resolved or
/// expanded is logged and skipped. The result is sorted by occurrence start.
pub fn project_events(
    events: &[RawEvent],
    time_min: DateTime<Utc>,
    time_max: DateTime<Utc>,
    window_zone: Option<Tz>,
) -> Vec<ProjectedOccurrence> {
    let mut occurrences = Vec::new();

    for event in events {
        let definition = match RecurrenceDefinition::from_master(event, window_zone) {
            Ok(Some(definition)) => definition,
            Ok(None) => continue,
            Err(e) => {
                warn!(event_id = %event.id, summary = event.title(), error = %e, "skipping recurring event");
                continue;
            }
        };

        match definition.occurrences_between(time_min, time_max) {
            Ok(found) => {
                debug!(event_id = %event.id, count = found.len(), "expanded recurring event");
                occurrences.extend(found);
            }
            Err(e) => {
                warn!(event_id = %event.id, summary = event.title(), error = %e, "failed to expand recurring event");
            }
        }
    }

    occurrences.sort_by_key(|o| o.occurrence_start);
    occurrences
}

/// Fetch recurring masters from `provider` and project them onto the window.
///
/// Masters are fetched without a time bound so series that began before the
/// window still contribute.
///
/// # Errors
/// Returns `InvalidWindow` when `time_min > time_max` and `Provider` when the
/// provider cannot be queried. Per-event problems never fail the call.
pub fn project_recurring_events<P>(
    provider: &P,
    request: &ProjectionRequest,
) -> Result<Vec<ProjectedOccurrence>>
where
    P: CalendarProvider + ?Sized,
{
    if request.time_min > request.time_max {
        return Err(ScheduleError::InvalidWindow(
            "projection window starts after it ends".to_string(),
        ));
    }

    info!(
        calendar_id = %request.calendar_id,
        time_min = %request.time_min,
        time_max = %request.time_max,
        query = request.query.as_deref().unwrap_or("None"),
        "projecting recurring events"
    );

    let masters = provider.find(&request.calendar_id, &EventQuery::masters(request.query.clone()))?;
    if masters.is_empty() {
        info!("no master recurring events found");
        return Ok(Vec::new());
    }

    let occurrences = project_events(&masters, request.time_min, request.time_max, request.timezone);
    info!(count = occurrences.len(), "finished projection");
    Ok(occurrences)
}
