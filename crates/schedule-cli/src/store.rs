//! File-backed calendar provider.
//!
//! The store is one JSON document:
//!
//! ```json
//! { "calendars": { "primary": { "events": [ ... ], "unavailable": false } } }
//! ```
//!
//! Events use the provider payload shape ([`RawEvent`]). Recurring masters are
//! expanded on read when instances are requested, and free/busy is derived
//! from timed events plus projected occurrences. Every write goes to disk
//! before the in-memory copy changes.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use schedule_engine::error::ProviderFailure;
use schedule_engine::event::{EventDateTime, EventPatch, EventTime, ProviderError, RawEvent};
use schedule_engine::interval::TimeInterval;
use schedule_engine::provider::{
    AccessRole, BusyPeriod, CalendarBusy, CalendarEntry, CalendarProvider, EventQuery, FreeBusyResponse,
};
use schedule_engine::recurrence::{project_events, RecurrenceDefinition};
use schedule_engine::scheduler::PRIMARY_CALENDAR;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreFile {
    #[serde(default)]
    pub calendars: BTreeMap<String, StoredCalendar>,
}

/// Instances are expanded this far past a single given bound.
const OPEN_BOUND_HORIZON_DAYS: i64 = 366;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCalendar {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub access_role: AccessRole,
    #[serde(default)]
    pub events: Vec<RawEvent>,
    /// Simulates a calendar the caller may not read.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unavailable: bool,
}

pub struct JsonStore {
    path: PathBuf,
    data: RefCell<StoreFile>,
}

impl JsonStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read store file: {}", path.display()))?;
        let data: StoreFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store file: {}", path.display()))?;
        debug!(path = %path.display(), calendars = data.calendars.len(), "opened calendar store");
        Ok(Self {
            path: path.to_path_buf(),
            data: RefCell::new(data),
        })
    }

    /// A stored event by id, searched across all calendars.
    pub fn event(&self, event_id: &str) -> Option<RawEvent> {
        self.data
            .borrow()
            .calendars
            .values()
            .flat_map(|c| c.events.iter())
            .find(|e| e.id == event_id)
            .cloned()
    }

    fn readable(&self, calendar_id: &str) -> Result<StoredCalendar, ProviderFailure> {
        match self.data.borrow().calendars.get(calendar_id) {
            Some(calendar) if !calendar.unavailable => Ok(calendar.clone()),
            _ => Err(ProviderFailure::CalendarNotFound(calendar_id.to_string())),
        }
    }

    /// Apply `change` to a copy of the store and keep the copy only once it
    /// is on disk.
    fn commit<T>(
        &self,
        change: impl FnOnce(&mut StoreFile) -> Result<T, ProviderFailure>,
    ) -> Result<T, ProviderFailure> {
        let mut next = self.data.borrow().clone();
        let value = change(&mut next)?;
        self.write(&next)?;
        *self.data.borrow_mut() = next;
        Ok(value)
    }

    fn write(&self, data: &StoreFile) -> Result<(), ProviderFailure> {
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| ProviderFailure::Transport(format!("failed to serialize store: {}", e)))?;
        std::fs::write(&self.path, content).map_err(|e| {
            ProviderFailure::Transport(format!("failed to write {}: {}", self.path.display(), e))
        })
    }
}

fn writable<'a>(data: &'a mut StoreFile, calendar_id: &str) -> Result<&'a mut StoredCalendar, ProviderFailure> {
    match data.calendars.get_mut(calendar_id) {
        Some(calendar) if calendar.unavailable => Err(ProviderFailure::CalendarNotFound(calendar_id.to_string())),
        Some(calendar) if !calendar.access_role.can_write() => {
            Err(ProviderFailure::Forbidden(calendar_id.to_string()))
        }
        Some(calendar) => Ok(calendar),
        None => Err(ProviderFailure::CalendarNotFound(calendar_id.to_string())),
    }
}

fn stored_event<'a>(
    calendar: &'a mut StoredCalendar,
    calendar_id: &str,
    event_id: &str,
) -> Result<&'a mut RawEvent, ProviderFailure> {
    calendar
        .events
        .iter_mut()
        .find(|e| e.id == event_id && !e.is_cancelled())
        .ok_or_else(|| ProviderFailure::EventNotFound {
            calendar_id: calendar_id.to_string(),
            event_id: event_id.to_string(),
        })
}

/// Longest occurrence among `masters`; how far before a window a series
/// occurrence may start and still reach into it.
fn longest_duration(masters: &[RawEvent]) -> Duration {
    masters
        .iter()
        .filter_map(|m| RecurrenceDefinition::from_master(m, None).ok().flatten())
        .map(|d| d.duration)
        .max()
        .unwrap_or_else(Duration::zero)
        .max(Duration::zero())
}

/// Time an event occupies. All-day values span whole UTC days; a missing end
/// gives a zero-length span for timed events and one day for all-day events.
fn event_span(event: &RawEvent) -> Option<TimeInterval> {
    let start = event.start.as_ref()?.resolve().ok()?;
    let end = event.end.as_ref().and_then(|e| e.resolve().ok());
    let start_at = boundary_instant(&start);
    let end_at = match end {
        Some(end) => boundary_instant(&end),
        None if start.is_all_day() => start_at + Duration::days(1),
        None => start_at,
    };
    TimeInterval::new(start_at, end_at.max(start_at)).ok()
}

fn boundary_instant(value: &EventTime) -> DateTime<Utc> {
    match value {
        EventTime::Timed { at, .. } => at.with_timezone(&Utc),
        EventTime::AllDay { date } => date.and_time(NaiveTime::MIN).and_utc(),
    }
}

fn in_window(span: &TimeInterval, query: &EventQuery) -> bool {
    let after_min = query
        .time_min
        .is_none_or(|min| span.end > min || (span.start == span.end && span.start >= min));
    let before_max = query.time_max.is_none_or(|max| span.start < max);
    after_min && before_max
}

fn matches_text(event: &RawEvent, text: &str) -> bool {
    let needle = text.to_lowercase();
    [&event.summary, &event.description, &event.location]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Concrete instances of `master` in the query window, shaped like the
/// provider's expanded instances.
fn instances_of(master: &RawEvent, time_min: DateTime<Utc>, time_max: DateTime<Utc>) -> Vec<RawEvent> {
    let all_day = master
        .start
        .as_ref()
        .and_then(|s| s.resolve().ok())
        .is_some_and(|s| s.is_all_day());

    project_events(std::slice::from_ref(master), time_min, time_max, None)
        .into_iter()
        .filter(|o| o.occurrence_start < time_max)
        .map(|o| {
            let (start, end) = if all_day {
                (
                    EventDateTime::all_day(o.occurrence_start.date_naive()),
                    EventDateTime::all_day(o.occurrence_end.date_naive()),
                )
            } else {
                (
                    EventDateTime::timed(o.occurrence_start, None),
                    EventDateTime::timed(o.occurrence_end, None),
                )
            };
            RawEvent {
                id: format!("{}_{}", master.id, o.occurrence_start.format("%Y%m%dT%H%M%SZ")),
                recurrence: None,
                recurring_event_id: Some(master.id.clone()),
                start: Some(start),
                end: Some(end),
                ..master.clone()
            }
        })
        .collect()
}

impl CalendarProvider for JsonStore {
    fn find(&self, calendar_id: &str, query: &EventQuery) -> Result<Vec<RawEvent>, ProviderFailure> {
        let calendar = self.readable(calendar_id)?;

        let mut found: Vec<(Option<TimeInterval>, RawEvent)> = Vec::new();
        for event in calendar.events {
            if event.is_cancelled() && !query.show_deleted {
                continue;
            }
            if let Some(text) = query.query.as_deref() {
                if !matches_text(&event, text) {
                    continue;
                }
            }

            if event.is_recurring_master() && query.single_events {
                let horizon = Duration::days(OPEN_BOUND_HORIZON_DAYS);
                let bounds = match (query.time_min, query.time_max) {
                    (Some(min), Some(max)) => Some((min, max)),
                    (Some(min), None) => min.checked_add_signed(horizon).map(|max| (min, max)),
                    (None, Some(max)) => max.checked_sub_signed(horizon).map(|min| (min, max)),
                    (None, None) => None,
                };
                match bounds {
                    Some((min, max)) => {
                        for instance in instances_of(&event, min, max) {
                            found.push((event_span(&instance), instance));
                        }
                    }
                    None => warn!(
                        event_id = %event.id,
                        "instance listing without timeMin or timeMax, recurring series left out"
                    ),
                }
                continue;
            }

            let span = event_span(&event);
            let keep = match &span {
                Some(span) => in_window(span, query),
                None => query.time_min.is_none() && query.time_max.is_none(),
            };
            if keep {
                found.push((span, event));
            }
        }

        found.sort_by_key(|(span, _)| span.map(|s| s.start));
        let events: Vec<RawEvent> = found
            .into_iter()
            .map(|(_, event)| event)
            .take(query.max_results as usize)
            .collect();
        debug!(calendar_id, count = events.len(), "listed events");
        Ok(events)
    }

    fn query_free_busy(
        &self,
        calendar_ids: &[String],
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<FreeBusyResponse, ProviderFailure> {
        let window = TimeInterval {
            start: time_min,
            end: time_max,
        };
        let mut response = FreeBusyResponse::new();

        for calendar_id in calendar_ids {
            let Ok(calendar) = self.readable(calendar_id) else {
                response.insert(
                    calendar_id.clone(),
                    CalendarBusy {
                        busy: Vec::new(),
                        errors: vec![ProviderError {
                            domain: "global".to_string(),
                            reason: "notFound".to_string(),
                        }],
                    },
                );
                continue;
            };

            let active: Vec<&RawEvent> = calendar
                .events
                .iter()
                .filter(|e| !e.is_cancelled())
                .filter(|e| {
                    e.start
                        .as_ref()
                        .and_then(|s| s.resolve().ok())
                        .is_some_and(|s| !s.is_all_day())
                })
                .collect();

            let mut spans: Vec<TimeInterval> = active
                .iter()
                .filter(|e| !e.is_recurring_master())
                .filter_map(|e| event_span(e))
                .collect();

            // An occurrence that starts before the window can still run into
            // it, so look back by the longest series duration.
            let masters: Vec<RawEvent> = active
                .iter()
                .filter(|e| e.is_recurring_master())
                .map(|e| (*e).clone())
                .collect();
            let look_back_from = time_min
                .checked_sub_signed(longest_duration(&masters))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            spans.extend(
                project_events(&masters, look_back_from, time_max, None)
                    .into_iter()
                    .map(|o| TimeInterval {
                        start: o.occurrence_start,
                        end: o.occurrence_end,
                    }),
            );

            let busy = spans
                .into_iter()
                .filter(|span| span.overlaps(&window))
                .map(|span| BusyPeriod {
                    start: span.start.max(time_min).to_rfc3339(),
                    end: span.end.min(time_max).to_rfc3339(),
                })
                .collect();

            response.insert(
                calendar_id.clone(),
                CalendarBusy {
                    busy,
                    errors: Vec::new(),
                },
            );
        }

        Ok(response)
    }

    fn create(&self, calendar_id: &str, body: &RawEvent, notify: bool) -> Result<RawEvent, ProviderFailure> {
        let created = self
            .commit(|data| {
                let total: usize = data.calendars.values().map(|c| c.events.len()).sum();
                let calendar = writable(data, calendar_id)?;

                let mut n = total + 1;
                let mut id = format!("evt-{:04}", n);
                while calendar.events.iter().any(|e| e.id == id) {
                    n += 1;
                    id = format!("evt-{:04}", n);
                }

                let created = RawEvent {
                    id,
                    status: Some("confirmed".to_string()),
                    ..body.clone()
                };
                calendar.events.push(created.clone());
                Ok(created)
            })
            .inspect_err(|e| warn!(calendar_id, error = %e, "event not created"))?;

        info!(calendar_id, event_id = %created.id, notify, "event created");
        Ok(created)
    }

    fn get(&self, calendar_id: &str, event_id: &str) -> Result<RawEvent, ProviderFailure> {
        self.readable(calendar_id)?
            .events
            .into_iter()
            .find(|e| e.id == event_id)
            .ok_or_else(|| ProviderFailure::EventNotFound {
                calendar_id: calendar_id.to_string(),
                event_id: event_id.to_string(),
            })
    }

    fn patch(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
        notify: bool,
    ) -> Result<RawEvent, ProviderFailure> {
        let updated = self.commit(|data| {
            let event = stored_event(writable(data, calendar_id)?, calendar_id, event_id)?;
            patch.apply_to(event);
            Ok(event.clone())
        })?;
        info!(calendar_id, event_id, notify, "event updated");
        Ok(updated)
    }

    /// Deleted events stay in the store as cancelled, like the provider keeps
    /// them for `showDeleted` listings.
    fn delete(&self, calendar_id: &str, event_id: &str, notify: bool) -> Result<(), ProviderFailure> {
        self.commit(|data| {
            let event = stored_event(writable(data, calendar_id)?, calendar_id, event_id)?;
            event.status = Some("cancelled".to_string());
            Ok(())
        })?;
        info!(calendar_id, event_id, notify, "event deleted");
        Ok(())
    }

    fn list_calendars(&self) -> Result<Vec<CalendarEntry>, ProviderFailure> {
        Ok(self
            .data
            .borrow()
            .calendars
            .iter()
            .filter(|(_, calendar)| !calendar.unavailable)
            .map(|(id, calendar)| CalendarEntry {
                id: id.clone(),
                summary: calendar.summary.clone(),
                access_role: calendar.access_role,
                primary: id == PRIMARY_CALENDAR,
            })
            .collect())
    }
}
