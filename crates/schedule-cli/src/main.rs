//! `schedule` CLI: query a JSON calendar store and book mutual meetings.
//!
//! ## Usage
//!
//! ```sh
//! # List events in a window
//! schedule --store cal.json events --from 2026-03-02T00:00:00Z --to 2026-03-09T00:00:00Z
//!
//! # Project recurring series onto a window
//! schedule --store cal.json project --from 2026-03-01T00:00:00Z --to 2026-04-01T00:00:00Z --query Birthday
//!
//! # Per-day event count and duration
//! schedule --store cal.json busyness --from 2026-03-01T00:00:00 --to 2026-03-08T00:00:00
//!
//! # Merged free/busy for several calendars
//! schedule --store cal.json availability --calendars primary,alice@example.com \
//!     --from 2026-03-02T08:00:00Z --to 2026-03-02T18:00:00Z
//!
//! # First mutual slot, then book it
//! schedule --store cal.json find-slot --calendars primary,alice@example.com \
//!     --from 2026-03-02T08:00:00Z --to 2026-03-02T18:00:00Z --duration 30
//! schedule --store cal.json book --summary "Planning" --calendars primary,alice@example.com \
//!     --from 2026-03-02T08:00:00Z --to 2026-03-02T18:00:00Z --duration 30
//!
//! # Change, extend or delete an existing event
//! schedule --store cal.json update --event-id review --summary "Final review" --start 2026-03-02T15:00:00Z
//! schedule --store cal.json add-attendee --event-id review --email dave@example.com
//! schedule --store cal.json delete --event-id review
//!
//! # Calendars you can write to
//! schedule --store cal.json calendars --min-access-role writer
//! ```

mod config;
mod store;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};
use schedule_engine::availability::{find_availability, merge_busy, unify};
use schedule_engine::busyness::{analyze_busyness, BusynessRequest};
use schedule_engine::event::{attendee_statuses, Attendee, EventDateTime, EventDraft, EventPatch};
use schedule_engine::interval::{normalize_to_utc, TimeInterval};
use schedule_engine::manage::{add_attendees, delete_event, find_calendars, update_event};
use schedule_engine::provider::{AccessRole, CalendarProvider, EventQuery};
use schedule_engine::recurrence::{project_recurring_events, ProjectionRequest};
use schedule_engine::scheduler::{schedule_mutual, ScheduleOutcome, ScheduleRequest, PRIMARY_CALENDAR};
use schedule_engine::slot::{find_first_available_slot, SearchStrategy, SlotSearch};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::store::JsonStore;

#[derive(Parser)]
#[command(
    name = "schedule",
    version,
    about = "Recurrence, busyness, availability and mutual scheduling over a calendar store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON calendar store (overrides `store` in the config file)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// TOML config file (defaults to ./schedule.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Calendar to operate on (overrides `default_calendar`)
    #[arg(long, global = true)]
    calendar: Option<String>,

    /// IANA zone for naive times and busyness dates (default UTC)
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Args)]
struct Window {
    /// Window start (RFC 3339, or naive local time)
    #[arg(long)]
    from: String,
    /// Window end (RFC 3339, or naive local time)
    #[arg(long)]
    to: String,
}

#[derive(Args)]
struct SlotArgs {
    /// Comma-separated calendar ids whose busy time must be avoided
    #[arg(long, value_delimiter = ',', required = true)]
    calendars: Vec<String>,
    #[command(flatten)]
    window: Window,
    /// Meeting length in minutes
    #[arg(long)]
    duration: i64,
    /// Daily working-hours start, HH:MM
    #[arg(long)]
    working_start: Option<String>,
    /// Daily working-hours end, HH:MM
    #[arg(long)]
    working_end: Option<String>,
    /// How to move past a free candidate outside working hours
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
    /// Search no earlier than this instant (default: the current time)
    #[arg(long)]
    now: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Stepped,
    NextBoundary,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    FreeBusyReader,
    Reader,
    Writer,
    Owner,
}

impl From<RoleArg> for AccessRole {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::FreeBusyReader => AccessRole::FreeBusyReader,
            RoleArg::Reader => AccessRole::Reader,
            RoleArg::Writer => AccessRole::Writer,
            RoleArg::Owner => AccessRole::Owner,
        }
    }
}

impl From<StrategyArg> for SearchStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Stepped => SearchStrategy::Stepped,
            StrategyArg::NextBoundary => SearchStrategy::NextBoundary,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List events of the calendar
    Events {
        /// Window start
        #[arg(long)]
        from: Option<String>,
        /// Window end
        #[arg(long)]
        to: Option<String>,
        /// Free-text filter on summary, description and location
        #[arg(long)]
        query: Option<String>,
        /// Return recurring masters instead of expanded instances
        #[arg(long)]
        masters: bool,
        /// Include cancelled events
        #[arg(long)]
        show_deleted: bool,
        #[arg(long, default_value_t = 50)]
        max_results: u32,
    },
    /// Expand recurring events into occurrences inside a window
    Project {
        #[command(flatten)]
        window: Window,
        /// Free-text filter on the recurring masters
        #[arg(long)]
        query: Option<String>,
    },
    /// Event count and timed minutes per day
    Busyness {
        #[command(flatten)]
        window: Window,
    },
    /// Merged free/busy for several calendars
    Availability {
        /// Comma-separated calendar ids
        #[arg(long, value_delimiter = ',', required = true)]
        calendars: Vec<String>,
        #[command(flatten)]
        window: Window,
    },
    /// Find the first slot every calendar is free
    FindSlot {
        #[command(flatten)]
        slot: SlotArgs,
    },
    /// Find the first mutual slot and create the event
    Book {
        #[command(flatten)]
        slot: SlotArgs,
        #[arg(long)]
        summary: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Extra attendee emails, comma-separated
        #[arg(long, value_delimiter = ',')]
        attendees: Vec<String>,
        /// Calendar the event is created on (default: --calendar)
        #[arg(long)]
        organizer: Option<String>,
        /// Do not notify attendees
        #[arg(long)]
        no_notify: bool,
    },
    /// Response status of each attendee of a stored event
    Attendees {
        #[arg(long)]
        event_id: String,
        /// Only report these emails
        #[arg(long, value_delimiter = ',')]
        email: Vec<String>,
    },
    /// Change fields of an existing event; unset flags are left alone
    Update {
        #[arg(long)]
        event_id: String,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// New start: YYYY-MM-DD for all-day, otherwise a date-time
        #[arg(long)]
        start: Option<String>,
        /// New end: YYYY-MM-DD for all-day, otherwise a date-time
        #[arg(long)]
        end: Option<String>,
        /// Replace the attendee list, comma-separated
        #[arg(long, value_delimiter = ',')]
        attendees: Option<Vec<String>>,
        /// Do not notify attendees
        #[arg(long)]
        no_notify: bool,
    },
    /// Delete an event
    Delete {
        #[arg(long)]
        event_id: String,
        /// Do not notify attendees
        #[arg(long)]
        no_notify: bool,
    },
    /// Invite more attendees to an existing event
    AddAttendee {
        #[arg(long)]
        event_id: String,
        /// Emails to invite, comma-separated
        #[arg(long, value_delimiter = ',', required = true)]
        email: Vec<String>,
        /// Do not notify attendees
        #[arg(long)]
        no_notify: bool,
    },
    /// List the calendars in the store
    Calendars {
        /// Only calendars with at least this access
        #[arg(long, value_enum)]
        min_access_role: Option<RoleArg>,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = Config::load(cli.config.as_deref())?;
    let zone = parse_zone(cli.timezone.as_deref())?;
    let calendar = cli
        .calendar
        .clone()
        .or_else(|| config.default_calendar.clone())
        .unwrap_or_else(|| PRIMARY_CALENDAR.to_string());
    let store_path = cli
        .store
        .clone()
        .or_else(|| config.store.clone())
        .context("No calendar store given; pass --store or set `store` in schedule.toml")?;
    let store = JsonStore::open(&store_path)?;

    match cli.command {
        Commands::Events {
            from,
            to,
            query,
            masters,
            show_deleted,
            max_results,
        } => {
            let query = EventQuery {
                time_min: from.as_deref().map(|s| parse_time(s, zone)).transpose()?,
                time_max: to.as_deref().map(|s| parse_time(s, zone)).transpose()?,
                query,
                single_events: !masters,
                show_deleted,
                max_results,
            };
            let events = store
                .find(&calendar, &query)
                .with_context(|| format!("Failed to list events of '{}'", calendar))?;
            print_json(&events)?;
        }
        Commands::Project { window, query } => {
            let (time_min, time_max) = parse_window(&window, zone)?;
            let request = ProjectionRequest {
                calendar_id: calendar,
                time_min,
                time_max,
                query,
                timezone: Some(zone),
            };
            let occurrences =
                project_recurring_events(&store, &request).context("Failed to project recurring events")?;
            print_json(&occurrences)?;
        }
        Commands::Busyness { window } => {
            let (time_min, time_max) = parse_window(&window, zone)?;
            let request = BusynessRequest {
                calendar_id: calendar,
                time_min,
                time_max,
                timezone: Some(zone),
            };
            let buckets = analyze_busyness(&store, &request).context("Failed to analyze busyness")?;
            print_json(&buckets)?;
        }
        Commands::Availability { calendars, window } => {
            let (time_min, time_max) = parse_window(&window, zone)?;
            let results = find_availability(&store, &calendars, time_min, time_max)
                .context("Failed to retrieve availability")?;
            let window = TimeInterval::new(time_min, time_max)?;
            print_json(&unify(results, window))?;
        }
        Commands::FindSlot { slot } => {
            let (time_min, time_max) = parse_window(&slot.window, zone)?;
            if slot.duration <= 0 {
                anyhow::bail!("--duration must be positive, got {}", slot.duration);
            }
            let duration = Duration::try_minutes(slot.duration)
                .with_context(|| format!("--duration of {} minutes is out of range", slot.duration))?;
            let working_hours =
                config.working_hours(slot.working_start.as_deref(), slot.working_end.as_deref(), zone)?;
            let results = find_availability(&store, &slot.calendars, time_min, time_max)
                .context("Failed to retrieve availability")?;
            let busy = merge_busy(&results);
            let search = SlotSearch {
                time_min,
                time_max,
                duration,
                busy: &busy,
                working_hours,
                now: parse_now(slot.now.as_deref(), zone)?,
                strategy: slot.strategy.map(Into::into).unwrap_or(config.search_strategy),
            };
            match find_first_available_slot(&search) {
                Some(found) => print_json(&found)?,
                None => print_json(&ScheduleOutcome::NoSlot)?,
            }
        }
        Commands::Book {
            slot,
            summary,
            description,
            location,
            attendees,
            organizer,
            no_notify,
        } => {
            let (time_min, time_max) = parse_window(&slot.window, zone)?;
            let working_hours =
                config.working_hours(slot.working_start.as_deref(), slot.working_end.as_deref(), zone)?;
            let request = ScheduleRequest {
                attendee_calendar_ids: slot.calendars,
                time_min,
                time_max,
                duration_minutes: slot.duration,
                event: EventDraft {
                    summary,
                    description,
                    location,
                    attendees,
                    ..EventDraft::default()
                },
                organizer_calendar_id: organizer.unwrap_or(calendar),
                working_hours,
                strategy: slot.strategy.map(Into::into).unwrap_or(config.search_strategy),
                send_notifications: config.send_notifications && !no_notify,
                event_timezone: cli.timezone.is_some().then_some(zone),
                now: parse_now(slot.now.as_deref(), zone)?,
            };
            let outcome = schedule_mutual(&store, &request).context("Failed to schedule event")?;
            print_json(&outcome)?;
        }
        Commands::Attendees { event_id, email } => {
            let event = store
                .event(&event_id)
                .with_context(|| format!("No event with id '{}' in the store", event_id))?;
            let only = (!email.is_empty()).then_some(email.as_slice());
            print_json(&attendee_statuses(&event, only))?;
        }
        Commands::Update {
            event_id,
            summary,
            description,
            location,
            start,
            end,
            attendees,
            no_notify,
        } => {
            let event_zone = cli.timezone.is_some().then_some(zone);
            let patch = EventPatch {
                summary,
                description,
                location,
                start: start.as_deref().map(|s| parse_boundary(s, zone, event_zone)).transpose()?,
                end: end.as_deref().map(|s| parse_boundary(s, zone, event_zone)).transpose()?,
                attendees: attendees.map(|emails| emails.into_iter().map(Attendee::invite).collect()),
            };
            let notify = config.send_notifications && !no_notify;
            let updated = update_event(&store, &calendar, &event_id, &patch, notify)
                .with_context(|| format!("Failed to update event '{}'", event_id))?;
            print_json(&updated)?;
        }
        Commands::Delete { event_id, no_notify } => {
            let notify = config.send_notifications && !no_notify;
            delete_event(&store, &calendar, &event_id, notify)
                .with_context(|| format!("Failed to delete event '{}'", event_id))?;
            print_json(&serde_json::json!({ "deleted": event_id }))?;
        }
        Commands::AddAttendee {
            event_id,
            email,
            no_notify,
        } => {
            let notify = config.send_notifications && !no_notify;
            let updated = add_attendees(&store, &calendar, &event_id, &email, notify)
                .with_context(|| format!("Failed to add attendees to '{}'", event_id))?;
            print_json(&updated)?;
        }
        Commands::Calendars { min_access_role } => {
            let calendars = find_calendars(&store, min_access_role.map(Into::into))
                .context("Failed to list calendars")?;
            print_json(&calendars)?;
        }
    }

    Ok(())
}

fn parse_zone(name: Option<&str>) -> Result<Tz> {
    match name {
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| anyhow::anyhow!("Unknown timezone: '{}'", name)),
        None => Ok(Tz::UTC),
    }
}

fn parse_time(raw: &str, zone: Tz) -> Result<DateTime<Utc>> {
    normalize_to_utc(raw, Some(zone)).with_context(|| format!("Invalid time: '{}'", raw))
}

/// A date-only value is an all-day boundary; anything else is a timed one.
fn parse_boundary(raw: &str, zone: Tz, event_zone: Option<Tz>) -> Result<EventDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return Ok(EventDateTime::all_day(date));
    }
    Ok(EventDateTime::timed(parse_time(raw, zone)?, event_zone))
}

fn parse_window(window: &Window, zone: Tz) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    Ok((parse_time(&window.from, zone)?, parse_time(&window.to, zone)?))
}

fn parse_now(raw: Option<&str>, zone: Tz) -> Result<DateTime<Utc>> {
    raw.map(|s| parse_time(s, zone)).unwrap_or_else(|| Ok(Utc::now()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let pretty = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", pretty);
    Ok(())
}
