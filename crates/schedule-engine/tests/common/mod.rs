//! In-memory provider and builders shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use schedule_engine::error::ProviderFailure;
use schedule_engine::event::{EventDateTime, EventPatch, RawEvent};
use schedule_engine::provider::{CalendarEntry, CalendarProvider, EventQuery, FreeBusyResponse};

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCall {
    pub calendar_id: String,
    pub body: RawEvent,
    pub notify: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchCall {
    pub calendar_id: String,
    pub event_id: String,
    pub patch: EventPatch,
    pub notify: bool,
}

/// Canned provider. `find` serves `events`, dropping recurring masters when
/// instances are requested; `query_free_busy` serves `free_busy` as is;
/// `get` looks events up by id. Writes are recorded, not applied.
#[derive(Default)]
pub struct FakeProvider {
    pub events: Vec<RawEvent>,
    pub free_busy: FreeBusyResponse,
    pub calendars: Vec<CalendarEntry>,
    pub fail_find: Option<ProviderFailure>,
    pub fail_free_busy: Option<ProviderFailure>,
    pub fail_create: Option<ProviderFailure>,
    pub fail_patch: Option<ProviderFailure>,
    pub queries: RefCell<Vec<EventQuery>>,
    pub free_busy_calls: RefCell<Vec<Vec<String>>>,
    pub created: RefCell<Vec<CreateCall>>,
    pub patched: RefCell<Vec<PatchCall>>,
    pub deleted: RefCell<Vec<(String, String, bool)>>,
}

impl FakeProvider {
    pub fn with_events(events: Vec<RawEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn with_free_busy(free_busy: FreeBusyResponse) -> Self {
        Self {
            free_busy,
            ..Self::default()
        }
    }
}

impl CalendarProvider for FakeProvider {
    fn find(&self, _calendar_id: &str, query: &EventQuery) -> Result<Vec<RawEvent>, ProviderFailure> {
        self.queries.borrow_mut().push(query.clone());
        if let Some(failure) = &self.fail_find {
            return Err(failure.clone());
        }
        Ok(self
            .events
            .iter()
            .filter(|e| !query.single_events || !e.is_recurring_master())
            .cloned()
            .collect())
    }

    fn query_free_busy(
        &self,
        calendar_ids: &[String],
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> Result<FreeBusyResponse, ProviderFailure> {
        self.free_busy_calls.borrow_mut().push(calendar_ids.to_vec());
        if let Some(failure) = &self.fail_free_busy {
            return Err(failure.clone());
        }
        Ok(self.free_busy.clone())
    }

    fn create(
        &self,
        calendar_id: &str,
        body: &RawEvent,
        notify: bool,
    ) -> Result<RawEvent, ProviderFailure> {
        if let Some(failure) = &self.fail_create {
            return Err(failure.clone());
        }
        self.created.borrow_mut().push(CreateCall {
            calendar_id: calendar_id.to_string(),
            body: body.clone(),
            notify,
        });
        Ok(RawEvent {
            id: format!("created-{}", self.created.borrow().len()),
            ..body.clone()
        })
    }

    fn get(&self, calendar_id: &str, event_id: &str) -> Result<RawEvent, ProviderFailure> {
        self.events
            .iter()
            .find(|e| e.id == event_id)
            .cloned()
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
        if let Some(failure) = &self.fail_patch {
            return Err(failure.clone());
        }
        let mut event = self.get(calendar_id, event_id)?;
        patch.apply_to(&mut event);
        self.patched.borrow_mut().push(PatchCall {
            calendar_id: calendar_id.to_string(),
            event_id: event_id.to_string(),
            patch: patch.clone(),
            notify,
        });
        Ok(event)
    }

    fn delete(&self, calendar_id: &str, event_id: &str, notify: bool) -> Result<(), ProviderFailure> {
        self.get(calendar_id, event_id)?;
        self.deleted
            .borrow_mut()
            .push((calendar_id.to_string(), event_id.to_string(), notify));
        Ok(())
    }

    fn list_calendars(&self) -> Result<Vec<CalendarEntry>, ProviderFailure> {
        Ok(self.calendars.clone())
    }
}

pub fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn timed(date_time: &str) -> EventDateTime {
    EventDateTime {
        date_time: Some(date_time.to_string()),
        ..EventDateTime::default()
    }
}

pub fn zoned(date_time: &str, zone: &str) -> EventDateTime {
    EventDateTime {
        date_time: Some(date_time.to_string()),
        time_zone: Some(zone.to_string()),
        ..EventDateTime::default()
    }
}

pub fn all_day(date: &str) -> EventDateTime {
    EventDateTime {
        date: Some(date.to_string()),
        ..EventDateTime::default()
    }
}

pub fn single(id: &str, start: EventDateTime, end: Option<EventDateTime>) -> RawEvent {
    RawEvent {
        id: id.to_string(),
        summary: Some(format!("event {}", id)),
        start: Some(start),
        end,
        ..RawEvent::default()
    }
}

pub fn master(
    id: &str,
    start: EventDateTime,
    end: Option<EventDateTime>,
    recurrence: &[&str],
) -> RawEvent {
    RawEvent {
        recurrence: Some(recurrence.iter().map(|s| s.to_string()).collect()),
        ..single(id, start, end)
    }
}
