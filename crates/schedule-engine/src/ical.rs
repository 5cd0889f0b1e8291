//! Parsing of RFC 5545 recurrence property lines.
//!
//! Providers hand recurrence data over as a list of property lines such as
//! `RRULE:FREQ=WEEKLY;UNTIL=20110701T170000Z`,
//! `EXDATE;TZID=Europe/Zurich:20110426T080000,20110428T080000` or
//! `EXDATE;VALUE=DATE:20240101`. This module splits them into the rule and
//! typed date lists without touching the `rrule` crate, so the grammar is
//! testable on its own.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::error::{Result, ScheduleError};
use crate::interval::localize;

/// One value of an EXDATE or RDATE property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    /// `VALUE=DATE` or a bare `YYYYMMDD`.
    Date(NaiveDate),
    /// Local time with no zone; takes the series zone.
    Floating(NaiveDateTime),
    /// Trailing `Z` or an explicit offset.
    Utc(DateTime<Utc>),
    /// Local time under a `TZID` parameter.
    Zoned(NaiveDateTime, Tz),
}

impl DateValue {
    /// Resolve to a UTC instant. Dates become local midnight in `series_zone`.
    pub fn to_utc(&self, series_zone: Tz) -> Result<DateTime<Utc>> {
        match *self {
            DateValue::Date(date) => {
                Ok(localize(date.and_time(NaiveTime::MIN), series_zone)?.with_timezone(&Utc))
            }
            DateValue::Floating(naive) => Ok(localize(naive, series_zone)?.with_timezone(&Utc)),
            DateValue::Utc(dt) => Ok(dt),
            DateValue::Zoned(naive, tz) => Ok(localize(naive, tz)?.with_timezone(&Utc)),
        }
    }
}

/// A value that could not be parsed; reported so callers can log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedValue {
    pub property: String,
    pub value: String,
    pub reason: String,
}

/// The recurrence lines of one master event, split by property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecurrenceLines {
    /// Rule body without the `RRULE:` prefix. A later RRULE line replaces an
    /// earlier one.
    pub rrule: Option<String>,
    pub exdates: Vec<DateValue>,
    pub rdates: Vec<DateValue>,
    pub rejected: Vec<RejectedValue>,
}

/// Split recurrence property lines. Unknown properties (EXRULE included) are
/// ignored; malformed date values land in `rejected` one by one.
pub fn parse_recurrence(lines: &[String]) -> RecurrenceLines {
    let mut parsed = RecurrenceLines::default();

    for line in lines {
        let line = line.trim();
        let Some((head, body)) = line.split_once(':') else {
            parsed.rejected.push(RejectedValue {
                property: line.to_string(),
                value: String::new(),
                reason: "missing ':' separator".to_string(),
            });
            continue;
        };

        let mut params = head.split(';');
        let name = params.next().unwrap_or_default().to_ascii_uppercase();

        match name.as_str() {
            "RRULE" => parsed.rrule = Some(body.to_string()),
            "EXDATE" | "RDATE" => {
                let target = if name == "EXDATE" {
                    &mut parsed.exdates
                } else {
                    &mut parsed.rdates
                };
                parse_date_list(&name, params, body, target, &mut parsed.rejected);
            }
            _ => {}
        }
    }

    parsed
}

fn parse_date_list<'a>(
    property: &str,
    params: impl Iterator<Item = &'a str>,
    body: &str,
    out: &mut Vec<DateValue>,
    rejected: &mut Vec<RejectedValue>,
) {
    let mut all_day = false;
    let mut tzid: Option<&str> = None;
    for param in params {
        if let Some((key, value)) = param.split_once('=') {
            match key.to_ascii_uppercase().as_str() {
                "VALUE" => all_day = value.eq_ignore_ascii_case("DATE"),
                "TZID" => tzid = Some(value),
                _ => {}
            }
        }
    }

    let zone = match tzid.map(|name| name.parse::<Tz>()) {
        Some(Ok(tz)) => Some(tz),
        Some(Err(_)) => {
            rejected.push(RejectedValue {
                property: property.to_string(),
                value: body.to_string(),
                reason: format!("unknown TZID '{}'", tzid.unwrap_or_default()),
            });
            return;
        }
        None => None,
    };

    for raw in body.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match parse_date_value(raw, all_day, zone) {
            Ok(value) => out.push(value),
            Err(e) => rejected.push(RejectedValue {
                property: property.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Parse one EXDATE/RDATE value in basic (`20240101T100000Z`) or extended
/// (`2024-01-01T10:00:00Z`) form.
pub fn parse_date_value(raw: &str, all_day: bool, zone: Option<Tz>) -> Result<DateValue> {
    let invalid = |reason: &str| ScheduleError::InvalidDateTime {
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(DateValue::Utc(dt.with_timezone(&Utc)));
    }

    let compact: String = raw.chars().filter(|c| *c != '-' && *c != ':').collect();

    if all_day || compact.len() == 8 {
        let date_part = compact.get(..8).ok_or_else(|| invalid("too short for a date"))?;
        return NaiveDate::parse_from_str(date_part, "%Y%m%d")
            .map(DateValue::Date)
            .map_err(|e| invalid(&e.to_string()));
    }

    let (local, is_utc) = match compact.strip_suffix(['Z', 'z']) {
        Some(rest) => (rest, true),
        None => (compact.as_str(), false),
    };
    let naive = NaiveDateTime::parse_from_str(local, "%Y%m%dT%H%M%S")
        .map_err(|e| invalid(&e.to_string()))?;

    Ok(match (is_utc, zone) {
        (true, _) => DateValue::Utc(naive.and_utc()),
        (false, Some(tz)) => DateValue::Zoned(naive, tz),
        (false, None) => DateValue::Floating(naive),
    })
}

/// Rewrite `UNTIL` as a UTC instant for a DTSTART expressed in `zone`.
///
/// The `rrule` crate only accepts a `Z` UNTIL next to a zoned DTSTART. Local
/// values are read in `zone`; date-only values become the last second of that
/// local day.
///
/// # Errors
/// Returns `ScheduleError::InvalidRule` when the UNTIL value does not parse or
/// names a local time that does not exist in `zone`.
pub fn align_until(rule: &str, zone: Tz) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();

    for part in rule.split(';').filter(|p| !p.is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            parts.push(part.to_string());
            continue;
        };
        if !key.eq_ignore_ascii_case("UNTIL") {
            parts.push(part.to_string());
            continue;
        }

        let bad_until = |e: ScheduleError| ScheduleError::InvalidRule(format!("bad UNTIL '{}': {}", value, e));
        let until = match parse_date_value(value, false, None).map_err(bad_until)? {
            DateValue::Date(date) => {
                let last_second = date.and_hms_opt(23, 59, 59).unwrap_or(date.and_time(NaiveTime::MIN));
                localize(last_second, zone).map_err(bad_until)?.with_timezone(&Utc)
            }
            other => other.to_utc(zone).map_err(bad_until)?,
        };

        parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")));
    }

    Ok(parts.join(";"))
}
