//! The calendar provider contract the engine is written against.
//!
//! Every operation takes its provider as an explicit argument, so a session or
//! credential handle lives inside the implementation and tests inject a fake.
//! Calls are synchronous and return a definitive success or
//! [`ProviderFailure`]; retries are the implementation's business.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderFailure;
use crate::event::{EventPatch, ProviderError, RawEvent};

/// Upper bound the provider API accepts for a single listing.
pub const MAX_RESULTS_LIMIT: u32 = 2500;

/// Parameters of an event listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQuery {
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
    /// Free-text filter.
    pub query: Option<String>,
    /// `true` expands series into concrete instances, `false` returns
    /// recurring masters with their `recurrence` lines.
    pub single_events: bool,
    pub show_deleted: bool,
    pub max_results: u32,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            time_min: None,
            time_max: None,
            query: None,
            single_events: true,
            show_deleted: false,
            max_results: 50,
        }
    }
}

impl EventQuery {
    /// Recurring masters with no time bound, so series that started before a
    /// window still show up.
    pub fn masters(query: Option<String>) -> Self {
        Self {
            query,
            single_events: false,
            max_results: MAX_RESULTS_LIMIT,
            ..Self::default()
        }
    }

    /// Concrete instances inside `[time_min, time_max)`.
    pub fn instances(time_min: DateTime<Utc>, time_max: DateTime<Utc>) -> Self {
        Self {
            time_min: Some(time_min),
            time_max: Some(time_max),
            single_events: true,
            max_results: MAX_RESULTS_LIMIT,
            ..Self::default()
        }
    }
}

/// One busy entry exactly as the provider sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyPeriod {
    pub start: String,
    pub end: String,
}

/// Free/busy data for one calendar in a free/busy response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarBusy {
    #[serde(default)]
    pub busy: Vec<BusyPeriod>,
    #[serde(default)]
    pub errors: Vec<ProviderError>,
}

pub type FreeBusyResponse = BTreeMap<String, CalendarBusy>;

/// What the caller may do on a calendar, weakest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessRole {
    FreeBusyReader,
    Reader,
    Writer,
    #[default]
    Owner,
}

impl AccessRole {
    pub fn can_write(self) -> bool {
        self >= AccessRole::Writer
    }
}

/// One entry of the caller's calendar list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub access_role: AccessRole,
    #[serde(default)]
    pub primary: bool,
}

/// External calendar backend.
pub trait CalendarProvider {
    /// List events of one calendar.
    fn find(&self, calendar_id: &str, query: &EventQuery) -> Result<Vec<RawEvent>, ProviderFailure>;

    /// Busy periods for several calendars over `[time_min, time_max)`.
    fn query_free_busy(
        &self,
        calendar_ids: &[String],
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<FreeBusyResponse, ProviderFailure>;

    /// Create an event and return it as stored by the provider.
    fn create(
        &self,
        calendar_id: &str,
        body: &RawEvent,
        notify: bool,
    ) -> Result<RawEvent, ProviderFailure>;

    /// One event by id.
    fn get(&self, calendar_id: &str, event_id: &str) -> Result<RawEvent, ProviderFailure>;

    /// Apply a partial update and return the event as stored afterwards.
    fn patch(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
        notify: bool,
    ) -> Result<RawEvent, ProviderFailure>;

    fn delete(&self, calendar_id: &str, event_id: &str, notify: bool) -> Result<(), ProviderFailure>;

    /// Every calendar on the caller's calendar list.
    fn list_calendars(&self) -> Result<Vec<CalendarEntry>, ProviderFailure>;
}

impl<P: CalendarProvider + ?Sized> CalendarProvider for &P {
    fn find(&self, calendar_id: &str, query: &EventQuery) -> Result<Vec<RawEvent>, ProviderFailure> {
        (**self).find(calendar_id, query)
    }

    fn query_free_busy(
        &self,
        calendar_ids: &[String],
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<FreeBusyResponse, ProviderFailure> {
        (**self).query_free_busy(calendar_ids, time_min, time_max)
    }

    fn create(
        &self,
        calendar_id: &str,
        body: &RawEvent,
        notify: bool,
    ) -> Result<RawEvent, ProviderFailure> {
        (**self).create(calendar_id, body, notify)
    }

    fn get(&self, calendar_id: &str, event_id: &str) -> Result<RawEvent, ProviderFailure> {
        (**self).get(calendar_id, event_id)
    }

    fn patch(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
        notify: bool,
    ) -> Result<RawEvent, ProviderFailure> {
        (**self).patch(calendar_id, event_id, patch, notify)
    }

    fn delete(&self, calendar_id: &str, event_id: &str, notify: bool) -> Result<(), ProviderFailure> {
        (**self).delete(calendar_id, event_id, notify)
    }

    fn list_calendars(&self) -> Result<Vec<CalendarEntry>, ProviderFailure> {
        (**self).list_calendars()
    }
}
