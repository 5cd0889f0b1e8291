//! Event management on top of the provider: partial updates, deletion,
//! attendee additions and the calendar list.

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::event::{Attendee, EventPatch, RawEvent};
use crate::provider::{AccessRole, CalendarEntry, CalendarProvider};

/// Apply `patch` to an existing event.
///
/// An empty patch changes nothing and returns the event as stored.
///
/// # Errors
/// Returns `InvalidDateTime` for a start or end with neither date nor
/// dateTime, and `Provider` when the event cannot be read or patched.
pub fn update_event<P>(
    provider: &P,
    calendar_id: &str,
    event_id: &str,
    patch: &EventPatch,
    notify: bool,
) -> Result<RawEvent>
where
    P: CalendarProvider + ?Sized,
{
    patch.validate()?;

    if patch.is_empty() {
        warn!(calendar_id, event_id, "update has no fields to change, returning the stored event");
        return Ok(provider.get(calendar_id, event_id)?);
    }

    info!(calendar_id, event_id, notify, "updating event");
    debug!(?patch, "patch body");
    let updated = provider
        .patch(calendar_id, event_id, patch, notify)
        .inspect_err(|e| error!(calendar_id, event_id, error = %e, "failed to update event"))?;
    info!(event_id = %updated.id, "updated event");
    Ok(updated)
}

/// # Errors
/// Returns `Provider` when the event is missing, already deleted or the
/// calendar is not writable.
pub fn delete_event<P>(provider: &P, calendar_id: &str, event_id: &str, notify: bool) -> Result<()>
where
    P: CalendarProvider + ?Sized,
{
    info!(calendar_id, event_id, notify, "deleting event");
    provider
        .delete(calendar_id, event_id, notify)
        .inspect_err(|e| error!(calendar_id, event_id, error = %e, "failed to delete event"))?;
    info!(event_id, "deleted event");
    Ok(())
}

/// Invite `emails` to an existing event, keeping everyone already on it.
///
/// Addresses that are already attendees are skipped. When nothing is left to
/// add the event is returned untouched and the provider is not patched.
///
/// # Errors
/// Returns `Provider` when the event cannot be read or patched.
pub fn add_attendees<P>(
    provider: &P,
    calendar_id: &str,
    event_id: &str,
    emails: &[String],
    notify: bool,
) -> Result<RawEvent>
where
    P: CalendarProvider + ?Sized,
{
    info!(calendar_id, event_id, ?emails, "adding attendees");
    let event = provider
        .get(calendar_id, event_id)
        .inspect_err(|e| error!(calendar_id, event_id, error = %e, "cannot read event to add attendees"))?;

    let mut attendees = event.attendees.clone();
    let mut added = 0usize;
    for email in emails.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
        if !attendees.iter().any(|a| a.email == email) {
            attendees.push(Attendee::invite(email));
            added += 1;
        }
    }

    if added == 0 {
        warn!(event_id, ?emails, "all attendees are already on the event, nothing to update");
        return Ok(event);
    }

    let patch = EventPatch {
        attendees: Some(attendees),
        ..EventPatch::default()
    };
    let updated = provider
        .patch(calendar_id, event_id, &patch, notify)
        .inspect_err(|e| error!(calendar_id, event_id, error = %e, "failed to add attendees"))?;
    info!(event_id, added, "added attendees");
    Ok(updated)
}

/// The caller's calendars, primary first, limited to at least
/// `min_access_role` when given.
///
/// # Errors
/// Returns `Provider` when the calendar list cannot be fetched.
pub fn find_calendars<P>(provider: &P, min_access_role: Option<AccessRole>) -> Result<Vec<CalendarEntry>>
where
    P: CalendarProvider + ?Sized,
{
    let mut calendars: Vec<CalendarEntry> = provider
        .list_calendars()?
        .into_iter()
        .filter(|c| min_access_role.is_none_or(|min| c.access_role >= min))
        .collect();
    calendars.sort_by_key(|c| !c.primary);
    info!(count = calendars.len(), min_access_role = ?min_access_role, "listed calendars");
    Ok(calendars)
}
