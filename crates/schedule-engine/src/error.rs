//! Error types for schedule-engine operations.
//!
//! Only failures with no narrower isolation boundary end up here. A bad EXDATE,
//! an unparseable busy entry or a calendar-level provider error are logged and
//! skipped by the component that met them; a provider that cannot be reached at
//! all surfaces as [`ScheduleError::Provider`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid datetime '{value}': {reason}")]
    InvalidDateTime { value: String, reason: String },

    #[error("Invalid working hours: {0}")]
    InvalidWorkingHours(String),

    #[error("Invalid time window: {0}")]
    InvalidWindow(String),

    #[error("Provider failure: {0}")]
    Provider(#[from] ProviderFailure),
}

/// A total failure reported by a calendar provider.
///
/// Distinct from the per-calendar [`ProviderError`](crate::event::ProviderError)
/// list embedded in a successful free/busy response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("event '{event_id}' not found in calendar '{calendar_id}'")]
    EventNotFound { calendar_id: String, event_id: String },

    #[error("no write access to calendar: {0}")]
    Forbidden(String),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
