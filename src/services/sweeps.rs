//! The four scheduled sweeps over the event store.
//!
//! Each sweep is split into a pure planning step
//! `(now, records) -> SweepPlan` and an executor that sends the planned
//! notifications and applies the planned mutations. The planners carry all of
//! the due-time logic and run without a scheduler, a store or a transport;
//! the executor contains the best-effort batch semantics (every per-item
//! failure is logged and the rest of the batch proceeds).

use std::sync::Arc;

use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::{CategorizedEvent, Category, EventRepository};
use crate::error::AppResult;
use crate::i18n;
use crate::services::telegram::{self, Notifier};
use crate::timefmt;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    /// Every open report-gated event, re-reminded each pass until a chat
    /// report closes it. Never deletes.
    Report,
    /// Report-gated recurring events, re-reminded only on their calendar date.
    ReportPeriodic,
    /// One-shot reminders, fired once the warning instant has passed, then
    /// untagged.
    Reminder,
    /// Recurring reminders, fired when the warning minute-of-day comes around,
    /// at most once per day.
    Periodic,
}

impl SweepKind {
    pub fn category(&self) -> Category {
        match self {
            SweepKind::Report => Category::Report,
            SweepKind::ReportPeriodic => Category::ReportPeriodic,
            SweepKind::Reminder => Category::Reminder,
            SweepKind::Periodic => Category::Periodic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::Report => "report",
            SweepKind::ReportPeriodic => "report-periodic",
            SweepKind::Reminder => "reminder",
            SweepKind::Periodic => "periodic",
        }
    }

    fn notification_kind(&self) -> &'static str {
        match self {
            SweepKind::Report => "report-reminder",
            SweepKind::ReportPeriodic => "report-periodic-reminder",
            SweepKind::Reminder => "reminder",
            SweepKind::Periodic => "periodic-reminder",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub chat_id: String,
    pub kind: &'static str,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TagDeletion {
    pub studio_name: String,
    pub event_name: String,
    pub category: Category,
}

#[derive(Debug, Clone)]
pub struct PeriodicMark {
    pub studio_name: String,
    pub event_name: String,
    pub fired_on: String,
}

/// Everything one sweep pass decided to do.
#[derive(Debug, Default)]
pub struct SweepPlan {
    pub notifications: Vec<Notification>,
    pub deletions: Vec<TagDeletion>,
    pub marks: Vec<PeriodicMark>,
}

/// Decide what a sweep pass should do, without doing any of it.
pub fn plan_sweep(
    kind: SweepKind,
    now_home: NaiveDateTime,
    records: &[CategorizedEvent],
    lang: &str,
) -> SweepPlan {
    match kind {
        SweepKind::Report => plan_report(kind, records, lang),
        SweepKind::ReportPeriodic => plan_report_periodic(kind, now_home, records, lang),
        SweepKind::Reminder => plan_reminder(kind, now_home, records, lang),
        SweepKind::Periodic => plan_periodic(kind, now_home, records, lang),
    }
}

/// Reminder text for a stored event; report-gated variants carry the
/// "close with a report" suffix.
fn reminder_text(lang: &str, record: &CategorizedEvent, with_report_suffix: bool) -> String {
    let time = timefmt::message_time(&record.time);
    let mut text = i18n::tr(
        Some(lang),
        "messages.reminder",
        Some(&[
            ("name", record.name.as_str()),
            ("time", time.as_str()),
            ("description", record.description.as_str()),
        ]),
    );
    if with_report_suffix {
        text.push_str(&i18n::tr(Some(lang), "messages.report_suffix", None));
    }
    text
}

fn periodic_text(lang: &str, record: &CategorizedEvent) -> String {
    i18n::tr(
        Some(lang),
        "messages.periodic_reminder",
        Some(&[
            ("name", record.name.as_str()),
            ("description", record.description.as_str()),
        ]),
    )
}

/// Open reports are re-reminded unconditionally: firing is periodic by sweep
/// interval, not by due time. Cleanup happens only through the report-closing
/// protocol.
fn plan_report(kind: SweepKind, records: &[CategorizedEvent], lang: &str) -> SweepPlan {
    let mut plan = SweepPlan::default();
    for record in records {
        plan.notifications.push(Notification {
            chat_id: record.chat_id.clone(),
            kind: kind.notification_kind(),
            text: reminder_text(lang, record, true),
        });
    }
    plan
}

fn plan_report_periodic(
    kind: SweepKind,
    now_home: NaiveDateTime,
    records: &[CategorizedEvent],
    lang: &str,
) -> SweepPlan {
    let mut plan = SweepPlan::default();
    let today = now_home.date();
    for record in records {
        let stored = match timefmt::parse_canonical(&record.time) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(
                    "Skipping report-periodic event {}/{}: {}",
                    record.studio_name,
                    record.name,
                    e
                );
                continue;
            }
        };
        if stored.date() == today {
            plan.notifications.push(Notification {
                chat_id: record.chat_id.clone(),
                kind: kind.notification_kind(),
                text: reminder_text(lang, record, true),
            });
        }
    }
    plan
}

fn plan_reminder(
    kind: SweepKind,
    now_home: NaiveDateTime,
    records: &[CategorizedEvent],
    lang: &str,
) -> SweepPlan {
    let mut plan = SweepPlan::default();
    for record in records {
        let Some(warning_text) = record.warning_time.as_deref() else {
            tracing::debug!(
                "Reminder event {}/{} has no warning time",
                record.studio_name,
                record.name
            );
            continue;
        };
        let warning = match timefmt::parse_canonical(warning_text) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(
                    "Skipping reminder event {}/{}: {}",
                    record.studio_name,
                    record.name,
                    e
                );
                continue;
            }
        };
        if now_home >= warning {
            plan.notifications.push(Notification {
                chat_id: record.chat_id.clone(),
                kind: kind.notification_kind(),
                text: reminder_text(lang, record, false),
            });
            plan.deletions.push(TagDeletion {
                studio_name: record.studio_name.clone(),
                event_name: record.name.clone(),
                category: Category::Reminder,
            });
        }
    }
    plan
}

/// A periodic reminder fires when the warning minute-of-day comes around,
/// whatever the stored date. `last_fired_on` keeps a restart inside the
/// matching minute from sending twice the same day.
fn plan_periodic(
    kind: SweepKind,
    now_home: NaiveDateTime,
    records: &[CategorizedEvent],
    lang: &str,
) -> SweepPlan {
    let mut plan = SweepPlan::default();
    let minute = now_home.format("%H:%M").to_string();
    let today = now_home.format("%Y-%m-%d").to_string();
    for record in records {
        let Some(warning_text) = record.warning_time.as_deref() else {
            tracing::debug!(
                "Periodic event {}/{} has no warning time",
                record.studio_name,
                record.name
            );
            continue;
        };
        let warning = match timefmt::parse_canonical(warning_text) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(
                    "Skipping periodic event {}/{}: {}",
                    record.studio_name,
                    record.name,
                    e
                );
                continue;
            }
        };
        if warning.format("%H:%M").to_string() != minute {
            continue;
        }
        if record.last_fired_on.as_deref() == Some(today.as_str()) {
            continue;
        }
        plan.notifications.push(Notification {
            chat_id: record.chat_id.clone(),
            kind: kind.notification_kind(),
            text: periodic_text(lang, record),
        });
        plan.marks.push(PeriodicMark {
            studio_name: record.studio_name.clone(),
            event_name: record.name.clone(),
            fired_on: today.clone(),
        });
    }
    plan
}

pub struct SweepService {
    pool: SqlitePool,
    notifier: Option<Arc<dyn Notifier>>,
    home_offset_hours: i64,
    lang: String,
}

impl SweepService {
    pub async fn from_state(state: &AppState) -> Self {
        let notifier = state
            .telegram
            .read()
            .await
            .clone()
            .map(|t| Arc::new(t) as Arc<dyn Notifier>);
        Self {
            pool: state.db.clone(),
            notifier,
            home_offset_hours: state.config.time.home_offset_hours,
            lang: state.config.telegram.language.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_notifier(pool: SqlitePool, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            pool,
            notifier,
            home_offset_hours: 3,
            lang: "ru".to_string(),
        }
    }

    /// One full pass of the given sweep at the current home time.
    pub async fn run(&self, kind: SweepKind) -> AppResult<()> {
        let now = timefmt::now_home(self.home_offset_hours);
        self.run_at(kind, now).await
    }

    pub(crate) async fn run_at(&self, kind: SweepKind, now_home: NaiveDateTime) -> AppResult<()> {
        let category = kind.category();
        let studios = EventRepository::studios_with_category(&self.pool, category).await?;

        let mut records = Vec::new();
        for studio in &studios {
            match EventRepository::list_for_studio_category(&self.pool, studio, category).await {
                Ok(mut batch) => records.append(&mut batch),
                Err(e) => {
                    tracing::warn!(
                        "Failed to list {} events for studio {}: {:?}",
                        category.as_str(),
                        studio,
                        e
                    );
                }
            }
        }

        let plan = plan_sweep(kind, now_home, &records, &self.lang);
        if !plan.notifications.is_empty() {
            tracing::info!(
                "{} sweep: {} notification(s) due",
                kind.as_str(),
                plan.notifications.len()
            );
        }
        self.apply(plan).await;
        Ok(())
    }

    async fn apply(&self, plan: SweepPlan) {
        let sends = plan.notifications.iter().map(|n| {
            telegram::deliver(&self.pool, self.notifier.as_ref(), n.kind, &n.chat_id, &n.text)
        });
        futures::future::join_all(sends).await;

        for deletion in &plan.deletions {
            match EventRepository::delete(
                &self.pool,
                &deletion.studio_name,
                deletion.category,
                &deletion.event_name,
            )
            .await
            {
                // A tag already gone means another actor got there first.
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "Failed to delete {} tag for {}/{}: {:?}",
                        deletion.category.as_str(),
                        deletion.studio_name,
                        deletion.event_name,
                        e
                    );
                }
            }
        }

        for mark in &plan.marks {
            if let Err(e) = EventRepository::mark_periodic_fired(
                &self.pool,
                &mark.studio_name,
                &mark.event_name,
                &mark.fired_on,
            )
            .await
            {
                tracing::warn!(
                    "Failed to mark periodic event {}/{} as fired: {:?}",
                    mark.studio_name,
                    mark.event_name,
                    e
                );
            }
        }
    }
}
