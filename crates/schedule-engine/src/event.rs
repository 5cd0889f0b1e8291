//! Provider event payloads and their typed views.
//!
//! [`RawEvent`] mirrors the JSON a calendar provider returns, with every field
//! optional so one malformed event never fails a whole response. Callers turn
//! the loosely-typed start/end into an [`EventTime`] with
//! [`EventDateTime::resolve`] and decide themselves whether a failure skips the
//! event or aborts.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};
use crate::interval::parse_instant;

/// Start or end of an event as the provider sends it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// A resolved event boundary: either a concrete instant or a whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    Timed {
        /// The instant, in the offset it was written with.
        at: DateTime<FixedOffset>,
        /// The IANA zone the provider attached, if any.
        zone: Option<Tz>,
    },
    AllDay {
        date: NaiveDate,
    },
}

impl EventTime {
    /// UTC instant for timed values, `None` for all-day ones.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            EventTime::Timed { at, .. } => Some(at.with_timezone(&Utc)),
            EventTime::AllDay { .. } => None,
        }
    }

    /// Calendar date the value falls on, in its own zone or offset.
    pub fn local_date(&self) -> NaiveDate {
        match self {
            EventTime::Timed { at, zone: Some(tz) } => at.with_timezone(tz).date_naive(),
            EventTime::Timed { at, zone: None } => at.date_naive(),
            EventTime::AllDay { date } => *date,
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::AllDay { .. })
    }
}

impl EventDateTime {
    pub fn timed(at: DateTime<Utc>, zone: Option<Tz>) -> Self {
        let date_time = match zone {
            Some(tz) => at.with_timezone(&tz).to_rfc3339(),
            None => at.to_rfc3339(),
        };
        Self {
            date: None,
            date_time: Some(date_time),
            time_zone: zone.map(|tz| tz.name().to_string()),
        }
    }

    pub fn all_day(date: NaiveDate) -> Self {
        Self {
            date: Some(date.format("%Y-%m-%d").to_string()),
            date_time: None,
            time_zone: None,
        }
    }

    /// The attached IANA zone, parsed.
    ///
    /// # Errors
    /// Returns `ScheduleError::InvalidTimezone` for an unknown zone name.
    pub fn zone(&self) -> Result<Option<Tz>> {
        self.time_zone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
            })
            .transpose()
    }

    /// Resolve into an [`EventTime`]. `dateTime` wins when both fields are set.
    ///
    /// # Errors
    /// Returns `InvalidDateTime` when neither field is set or the set one does
    /// not parse, `InvalidTimezone` when `timeZone` names no IANA zone.
    pub fn resolve(&self) -> Result<EventTime> {
        if let Some(raw) = self.date_time.as_deref() {
            let zone = self.zone()?;
            let at = parse_instant(raw, zone)?;
            return Ok(EventTime::Timed { at, zone });
        }
        if let Some(raw) = self.date.as_deref() {
            let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
                ScheduleError::InvalidDateTime {
                    value: raw.to_string(),
                    reason: e.to_string(),
                }
            })?;
            return Ok(EventTime::AllDay { date });
        }
        Err(ScheduleError::InvalidDateTime {
            value: String::new(),
            reason: "neither date nor dateTime is set".to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

impl Attendee {
    pub fn invite(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }
}

/// A calendar event as returned by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    /// RRULE, EXDATE and RDATE property lines on a master event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Vec<String>>,
    /// Set on instances of a recurring series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
}

impl RawEvent {
    pub fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or("No Summary")
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    /// Whether this is a recurring master with at least one recurrence line.
    pub fn is_recurring_master(&self) -> bool {
        self.recurrence.as_ref().is_some_and(|r| !r.is_empty())
    }
}

/// A per-calendar error embedded in a successful free/busy response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub domain: String,
    pub reason: String,
}

/// Event details for creation. Start and end may be left unset when the
/// scheduler is expected to fill them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: Option<EventDateTime>,
    #[serde(default)]
    pub end: Option<EventDateTime>,
    /// Attendee email addresses to invite.
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub recurrence: Option<Vec<String>>,
}

impl EventDraft {
    /// Add `email` unless it is already invited.
    pub fn ensure_attendee(&mut self, email: &str) -> bool {
        if self.attendees.iter().any(|a| a == email) {
            return false;
        }
        self.attendees.push(email.to_string());
        true
    }

    /// Build the provider event body.
    ///
    /// Start and end keep whichever representation the draft used, date-only
    /// or date-time plus zone.
    ///
    /// # Errors
    /// Returns `InvalidDateTime` when start or end is missing or carries
    /// neither a date nor a dateTime.
    pub fn to_event_body(&self) -> Result<RawEvent> {
        let start = Self::checked_boundary(self.start.as_ref(), "start")?;
        let end = Self::checked_boundary(self.end.as_ref(), "end")?;

        Ok(RawEvent {
            summary: Some(self.summary.clone()),
            description: self.description.clone(),
            location: self.location.clone(),
            start: Some(start),
            end: Some(end),
            recurrence: self.recurrence.clone(),
            attendees: self.attendees.iter().map(Attendee::invite).collect(),
            ..RawEvent::default()
        })
    }

    fn checked_boundary(value: Option<&EventDateTime>, which: &str) -> Result<EventDateTime> {
        match value {
            Some(v) if v.date_time.is_some() || v.date.is_some() => Ok(v.clone()),
            _ => Err(ScheduleError::InvalidDateTime {
                value: which.to_string(),
                reason: "event creation requires either date or dateTime".to_string(),
            }),
        }
    }
}

/// Partial update of an existing event. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    /// Replaces the whole attendee list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite the fields this patch sets.
    pub fn apply_to(&self, event: &mut RawEvent) {
        if let Some(summary) = &self.summary {
            event.summary = Some(summary.clone());
        }
        if let Some(description) = &self.description {
            event.description = Some(description.clone());
        }
        if let Some(location) = &self.location {
            event.location = Some(location.clone());
        }
        if let Some(start) = &self.start {
            event.start = Some(start.clone());
        }
        if let Some(end) = &self.end {
            event.end = Some(end.clone());
        }
        if let Some(attendees) = &self.attendees {
            event.attendees = attendees.clone();
        }
    }

    /// # Errors
    /// Returns `InvalidDateTime` when a start or end is set but carries
    /// neither a date nor a dateTime.
    pub fn validate(&self) -> Result<()> {
        for (which, value) in [("start", &self.start), ("end", &self.end)] {
            if let Some(value) = value {
                EventDraft::checked_boundary(Some(value), which)?;
            }
        }
        Ok(())
    }
}

/// Map attendee email to response status.
///
/// Attendees missing an email or a status are left out. When `only` is given
/// the map is restricted to those addresses.
pub fn attendee_statuses(event: &RawEvent, only: Option<&[String]>) -> BTreeMap<String, String> {
    let wanted: Option<HashSet<&str>> = only.map(|emails| emails.iter().map(String::as_str).collect());

    event
        .attendees
        .iter()
        .filter(|a| !a.email.is_empty())
        .filter(|a| wanted.as_ref().is_none_or(|w| w.contains(a.email.as_str())))
        .filter_map(|a| {
            a.response_status
                .as_ref()
                .map(|status| (a.email.clone(), status.clone()))
        })
        .collect()
}
