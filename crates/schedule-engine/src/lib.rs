//! # schedule-engine
//!
//! Scheduling and availability core for a calendar backend.
//!
//! Raw provider data comes in through the [`provider::CalendarProvider`] trait;
//! everything downstream is pure, synchronous computation over UTC intervals.
//!
//! ## Modules
//!
//! - [`interval`]: UTC time intervals, normalization, merge and overlap
//! - [`event`]: provider event payloads and the timed/all-day sum type
//! - [`ical`]: RRULE / EXDATE / RDATE property-line parsing
//! - [`provider`]: the calendar provider contract
//! - [`recurrence`]: recurring master → concrete occurrences in a window
//! - [`busyness`]: per-date event count and duration
//! - [`availability`]: multi-calendar free/busy merge
//! - [`slot`]: first-fit slot search with working hours
//! - [`scheduler`]: find a mutual slot and book it
//! - [`manage`]: update, delete and invite on existing events; calendar list
//! - [`error`]: Error types

pub mod availability;
pub mod busyness;
pub mod error;
pub mod event;
pub mod ical;
pub mod interval;
pub mod manage;
pub mod provider;
pub mod recurrence;
pub mod scheduler;
pub mod slot;

pub use availability::{find_availability, merge_busy, AvailabilityResult, UnifiedAvailability};
pub use busyness::{analyze_busyness, BusynessBucket, BusynessRequest};
pub use error::{ProviderFailure, ScheduleError};
pub use event::{EventDateTime, EventDraft, EventPatch, EventTime, ProviderError, RawEvent};
pub use interval::{merge_intervals, normalize_to_utc, overlaps, TimeInterval};
pub use manage::{add_attendees, delete_event, find_calendars, update_event};
pub use provider::{AccessRole, CalendarEntry, CalendarProvider, EventQuery};
pub use recurrence::{project_recurring_events, ProjectedOccurrence, ProjectionRequest, RecurrenceDefinition};
pub use scheduler::{schedule_mutual, ScheduleOutcome, ScheduleRequest};
pub use slot::{find_first_available_slot, FreeSlot, SearchStrategy, SlotSearch, WorkingHours};
