use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Dispatch category of an event record.
///
/// The legacy store kept one parallel collection per category; here a category
/// is a tag row next to the single event record. An event may carry several
/// tags at once, each driving a different sweep:
/// - `Plain`: listed, no sweep action.
/// - `Report`: re-reminded by the report sweep until closed by a chat report.
/// - `Reminder`: one-shot reminder at the warning instant, then untagged.
/// - `Periodic`: fires daily when the warning minute-of-day comes around.
/// - `ReportPeriodic`: report-gated, re-reminded only on the matching date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Plain,
    Report,
    Reminder,
    Periodic,
    ReportPeriodic,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Plain => "plain",
            Category::Report => "report",
            Category::Reminder => "reminder",
            Category::Periodic => "periodic",
            Category::ReportPeriodic => "report-periodic",
        }
    }
}

/// A row of the umbrella `events` table. Presence here is the source of truth
/// for listings; category tags only steer the sweeps.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventRecord {
    pub studio_name: String,

    pub name: String,

    /// Canonical instant text (see `timefmt`).
    pub time: String,

    /// Canonical instant of the pre-event reminder, when one was requested.
    pub warning_time: Option<String>,

    pub description: String,

    /// Channel captured at creation; studio edits do not retarget reminders.
    pub chat_id: String,

    /// Recurring events render with the current year/month in listings.
    pub periodic: bool,

    pub created_at: NaiveDateTime,
}

/// Data required to store an event record.
#[derive(Debug, Clone)]
pub struct NewEventRecord {
    pub studio_name: String,
    pub name: String,
    pub time: String,
    pub warning_time: Option<String>,
    pub description: String,
    pub chat_id: String,
    pub periodic: bool,
}

/// An event joined with one of its category tags, as the sweeps consume it.
#[derive(Debug, Clone, FromRow)]
pub struct CategorizedEvent {
    pub studio_name: String,
    pub name: String,
    pub time: String,
    pub warning_time: Option<String>,
    pub description: String,
    pub chat_id: String,
    pub periodic: bool,

    /// Date (YYYY-MM-DD) the periodic sweep last fired for this tag.
    pub last_fired_on: Option<String>,
}
