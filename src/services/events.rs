use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{Category, EventRepository, NewEventRecord, StudioRepository};
use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::services::telegram::{self, Notifier};
use crate::timefmt;
use crate::AppState;

/// One studio a new event is addressed to. The chat id comes from the request
/// and is stored on the record, so later studio edits do not move reminders.
#[derive(Debug, Clone)]
pub struct EventTarget {
    pub studio_name: String,
    pub chat_id: String,
}

/// A new-event request as the orchestrator consumes it.
#[derive(Debug, Clone)]
pub struct NewEventInput {
    pub name: String,
    /// `DD.MM.YYYY HH:mm:ss` wall-clock text.
    pub time: String,
    pub description: String,
    pub warning_time: Option<String>,
    pub report: bool,
    pub periodic: bool,
    pub add_reminder: bool,
    pub targets: Vec<EventTarget>,
}

/// Which category tags a new event receives, by its three flags.
///
/// Every combination includes `Plain` so the event is listed. Periodic without
/// a reminder is not reachable from the admin panel; it degrades to a plain
/// listing-only event.
pub fn categories_for_flags(report: bool, periodic: bool, reminder: bool) -> &'static [Category] {
    match (report, periodic, reminder) {
        (true, true, true) => &[Category::ReportPeriodic, Category::Plain],
        (true, false, true) => &[Category::Report, Category::Plain, Category::Reminder],
        (true, false, false) => &[Category::Report, Category::Plain],
        (false, true, true) => &[Category::Periodic, Category::Plain],
        (false, false, true) => &[Category::Reminder, Category::Plain],
        _ => &[Category::Plain],
    }
}

/// Initial announcement text for one studio.
pub fn announcement_text(
    lang: &str,
    name: &str,
    canonical_time: &str,
    description: &str,
    report: bool,
) -> String {
    let time = timefmt::message_time(canonical_time);
    let mut text = i18n::tr(
        Some(lang),
        "messages.new_event",
        Some(&[("name", name), ("time", &time), ("description", description)]),
    );
    if report {
        text.push_str(&i18n::tr(Some(lang), "messages.report_suffix", None));
    }
    text
}

/// An event as listings return it: display-formatted per the studio's offset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub studio_name: String,
    pub name: String,
    pub description: String,
    pub time: String,
}

struct PreparedTarget {
    studio_name: String,
    chat_id: String,
    canonical_time: String,
    canonical_warning: Option<String>,
}

pub struct EventService {
    pool: SqlitePool,
    notifier: Option<Arc<dyn Notifier>>,
    home_offset_hours: i64,
    lang: String,
}

impl EventService {
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

    /// Create an event for every target studio and announce it.
    ///
    /// Validation (unknown studio, bad offset, bad time text) happens before
    /// any write. The writes and announcements themselves are best-effort:
    /// individual failures are logged and the rest of the batch proceeds.
    pub async fn create_event(&self, input: NewEventInput) -> AppResult<()> {
        if input.name.trim().is_empty()
            || input.time.trim().is_empty()
            || input.description.trim().is_empty()
        {
            return Err(AppError::BadRequest(
                "name, time and description are required".to_string(),
            ));
        }
        if input.targets.is_empty() {
            return Err(AppError::BadRequest(
                "at least one target studio is required".to_string(),
            ));
        }

        let mut prepared = Vec::with_capacity(input.targets.len());
        for target in &input.targets {
            let studio = StudioRepository::find_by_name(&self.pool, &target.studio_name)
                .await?
                .ok_or_else(|| {
                    AppError::BadRequest(format!("unknown studio: {}", target.studio_name))
                })?;
            let offset = timefmt::parse_offset_hours(&studio.utc_offset_hours)?;

            let canonical_time = timefmt::local_to_canonical(&input.time, offset)?;
            let canonical_warning = input
                .warning_time
                .as_deref()
                .map(|w| timefmt::local_to_canonical(w, offset))
                .transpose()?;

            prepared.push(PreparedTarget {
                studio_name: target.studio_name.clone(),
                chat_id: target.chat_id.clone(),
                canonical_time,
                canonical_warning,
            });
        }

        let categories = categories_for_flags(input.report, input.periodic, input.add_reminder);
        let recurring_display = input.periodic && input.add_reminder;

        for target in &prepared {
            let record = NewEventRecord {
                studio_name: target.studio_name.clone(),
                name: input.name.trim().to_string(),
                time: target.canonical_time.clone(),
                warning_time: target.canonical_warning.clone(),
                description: input.description.clone(),
                chat_id: target.chat_id.clone(),
                periodic: recurring_display,
            };
            for &category in categories {
                if let Err(e) = EventRepository::put(&self.pool, &record, category).await {
                    tracing::warn!(
                        "Failed to write {} record for studio {}: {:?}",
                        category.as_str(),
                        target.studio_name,
                        e
                    );
                }
            }
        }

        // A periodic event with a reminder is announced by the periodic sweep
        // from then on; the initial announcement is suppressed.
        if recurring_display {
            tracing::debug!(
                "Skipping initial announcement for periodic reminder event {}",
                input.name
            );
            return Ok(());
        }

        let sends = prepared.iter().map(|target| {
            let text = announcement_text(
                &self.lang,
                input.name.trim(),
                &target.canonical_time,
                &input.description,
                input.report,
            );
            async move {
                telegram::deliver(
                    &self.pool,
                    self.notifier.as_ref(),
                    "announcement",
                    &target.chat_id,
                    &text,
                )
                .await;
            }
        });
        futures::future::join_all(sends).await;

        Ok(())
    }

    /// Remove an event from every category it appears in.
    pub async fn delete_event(&self, studio_name: &str, event_name: &str) -> AppResult<()> {
        let found =
            EventRepository::delete_everywhere(&self.pool, studio_name, event_name).await?;
        if found {
            Ok(())
        } else {
            Err(AppError::NotFound(i18n::tr(
                Some(&self.lang),
                "not_found.event",
                None,
            )))
        }
    }

    /// One studio's events, display-formatted and sorted ascending.
    pub async fn list_events(&self, studio_name: &str) -> AppResult<Vec<EventView>> {
        let studio = StudioRepository::find_by_name(&self.pool, studio_name)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(i18n::tr(Some(&self.lang), "not_found.studio", None))
            })?;
        let offset = self.offset_or_zero(&studio.utc_offset_hours, studio_name);

        let records = EventRepository::list_events(&self.pool, studio_name).await?;
        let now = timefmt::now_home(self.home_offset_hours);
        Ok(self.render_sorted(records.into_iter().map(|r| (r, offset)).collect(), now))
    }

    /// Every studio's events in one listing, same formatting and sort.
    pub async fn list_all_events(&self) -> AppResult<Vec<EventView>> {
        let offsets: std::collections::HashMap<String, f64> =
            StudioRepository::list_all(&self.pool)
                .await?
                .into_iter()
                .map(|s| {
                    let offset = self.offset_or_zero(&s.utc_offset_hours, &s.name);
                    (s.name, offset)
                })
                .collect();

        let records = EventRepository::list_all_events(&self.pool).await?;
        let now = timefmt::now_home(self.home_offset_hours);
        let paired = records
            .into_iter()
            .map(|r| {
                let offset = offsets.get(&r.studio_name).copied().unwrap_or(0.0);
                (r, offset)
            })
            .collect();
        Ok(self.render_sorted(paired, now))
    }

    /// Legacy records may carry an unparsable offset; listings fall back to 0
    /// rather than failing the whole page.
    fn offset_or_zero(&self, offset_text: &str, studio_name: &str) -> f64 {
        match timefmt::parse_offset_hours(offset_text) {
            Ok(offset) => offset,
            Err(_) => {
                tracing::warn!(
                    "Studio {} has unparsable UTC offset {:?}; using 0",
                    studio_name,
                    offset_text
                );
                0.0
            }
        }
    }

    fn render_sorted(
        &self,
        records: Vec<(crate::db::EventRecord, f64)>,
        now: NaiveDateTime,
    ) -> Vec<EventView> {
        let mut rendered: Vec<(NaiveDateTime, EventView)> = records
            .into_iter()
            .map(|(record, offset)| {
                let sort_key = timefmt::shifted_instant(&record.time, offset, self.home_offset_hours)
                    .unwrap_or(NaiveDateTime::MAX);
                let time = timefmt::canonical_to_display(
                    &record.time,
                    offset,
                    record.periodic,
                    self.home_offset_hours,
                    now,
                )
                .unwrap_or_else(|_| record.time.clone());
                (
                    sort_key,
                    EventView {
                        studio_name: record.studio_name,
                        name: record.name,
                        description: record.description,
                        time,
                    },
                )
            })
            .collect();
        rendered.sort_by_key(|(key, _)| *key);
        rendered.into_iter().map(|(_, view)| view).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{seed_studio, test_pool, EventRepository};
    use crate::services::telegram::testing::RecordingNotifier;

    fn input(targets: Vec<EventTarget>) -> NewEventInput {
        NewEventInput {
            name: "Inventory".to_string(),
            time: "01.05.2025 10:00:00".to_string(),
            description: "Monthly stocktake".to_string(),
            warning_time: Some("01.05.2025 09:00:00".to_string()),
            report: false,
            periodic: false,
            add_reminder: false,
            targets,
        }
    }

    fn target(studio: &str, chat: &str) -> EventTarget {
        EventTarget {
            studio_name: studio.to_string(),
            chat_id: chat.to_string(),
        }
    }

    #[test]
    fn category_selection_table() {
        assert_eq!(
            categories_for_flags(true, true, true),
            &[Category::ReportPeriodic, Category::Plain]
        );
        assert_eq!(
            categories_for_flags(true, false, true),
            &[Category::Report, Category::Plain, Category::Reminder]
        );
        assert_eq!(
            categories_for_flags(true, false, false),
            &[Category::Report, Category::Plain]
        );
        assert_eq!(
            categories_for_flags(false, true, true),
            &[Category::Periodic, Category::Plain]
        );
        assert_eq!(
            categories_for_flags(false, false, true),
            &[Category::Reminder, Category::Plain]
        );
        // Unreachable combinations degrade to a listing-only event.
        assert_eq!(categories_for_flags(false, false, false), &[Category::Plain]);
        assert_eq!(categories_for_flags(false, true, false), &[Category::Plain]);
        assert_eq!(categories_for_flags(true, true, false), &[Category::Plain]);
    }

    #[tokio::test]
    async fn plain_event_writes_one_record_and_announces() {
        let pool = test_pool().await;
        seed_studio(&pool, "downtown", "-100200", "5").await;
        let notifier = RecordingNotifier::arc();
        let service =
            EventService::with_notifier(pool.clone(), Some(notifier.clone() as Arc<dyn Notifier>));

        service
            .create_event(input(vec![target("downtown", "-100200")]))
            .await
            .unwrap();

        let events = EventRepository::list_events(&pool, "downtown").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, "2025-05-01T15:00:00Z");
        assert!(EventRepository::get(&pool, "downtown", Category::Plain, "Inventory")
            .await
            .unwrap()
            .is_some());
        for category in [Category::Report, Category::Reminder, Category::Periodic] {
            assert!(EventRepository::get(&pool, "downtown", category, "Inventory")
                .await
                .unwrap()
                .is_none());
        }

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "-100200");
        assert!(sent[0].1.contains("Название: Inventory."));
        assert!(!sent[0].1.contains("отчетом"));
    }

    #[tokio::test]
    async fn report_reminder_event_tags_three_categories() {
        let pool = test_pool().await;
        seed_studio(&pool, "downtown", "-100200", "3").await;
        let notifier = RecordingNotifier::arc();
        let service =
            EventService::with_notifier(pool.clone(), Some(notifier.clone() as Arc<dyn Notifier>));

        let mut req = input(vec![target("downtown", "-100200")]);
        req.report = true;
        req.add_reminder = true;
        service.create_event(req).await.unwrap();

        for category in [Category::Report, Category::Plain, Category::Reminder] {
            assert!(EventRepository::get(&pool, "downtown", category, "Inventory")
                .await
                .unwrap()
                .is_some());
        }

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("закрыть отчетом"));
    }

    #[tokio::test]
    async fn periodic_reminder_event_suppresses_announcement() {
        let pool = test_pool().await;
        seed_studio(&pool, "downtown", "-100200", "3").await;
        let notifier = RecordingNotifier::arc();
        let service =
            EventService::with_notifier(pool.clone(), Some(notifier.clone() as Arc<dyn Notifier>));

        let mut req = input(vec![target("downtown", "-100200")]);
        req.periodic = true;
        req.add_reminder = true;
        service.create_event(req).await.unwrap();

        assert!(notifier.sent().is_empty());
        let record = EventRepository::get(&pool, "downtown", Category::Periodic, "Inventory")
            .await
            .unwrap()
            .expect("tagged periodic");
        assert!(record.periodic);
    }

    #[tokio::test]
    async fn unknown_studio_rejects_without_writes() {
        let pool = test_pool().await;
        seed_studio(&pool, "downtown", "-100200", "3").await;
        let service = EventService::with_notifier(pool.clone(), None);

        let err = service
            .create_event(input(vec![
                target("downtown", "-100200"),
                target("nowhere", "-100999"),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        assert!(EventRepository::list_events(&pool, "downtown")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn multiple_studios_each_get_their_own_instant() {
        let pool = test_pool().await;
        seed_studio(&pool, "downtown", "-100200", "3").await;
        seed_studio(&pool, "airport", "-100300", "5.5").await;
        let service = EventService::with_notifier(pool.clone(), None);

        service
            .create_event(input(vec![
                target("downtown", "-100200"),
                target("airport", "-100300"),
            ]))
            .await
            .unwrap();

        let downtown = EventRepository::list_events(&pool, "downtown").await.unwrap();
        let airport = EventRepository::list_events(&pool, "airport").await.unwrap();
        assert_eq!(downtown[0].time, "2025-05-01T13:00:00Z");
        assert_eq!(airport[0].time, "2025-05-01T15:30:00Z");
        assert_eq!(airport[0].chat_id, "-100300");
    }

    #[tokio::test]
    async fn delete_event_not_found_and_listing_sort() {
        let pool = test_pool().await;
        seed_studio(&pool, "downtown", "-100200", "3").await;
        let service = EventService::with_notifier(pool.clone(), None);

        let err = service.delete_event("downtown", "Ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let mut early = input(vec![target("downtown", "-100200")]);
        early.name = "Early".to_string();
        early.time = "01.05.2025 08:00:00".to_string();
        service.create_event(early).await.unwrap();

        let mut late = input(vec![target("downtown", "-100200")]);
        late.name = "Late".to_string();
        late.time = "02.05.2025 08:00:00".to_string();
        service.create_event(late).await.unwrap();

        let listed = service.list_events("downtown").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Early");
        // Canonical 11:00 (+3 offset), displayed back at home offset 3.
        assert_eq!(listed[0].time, "2025-05-01T11:00:00");

        service.delete_event("downtown", "Early").await.unwrap();
        assert_eq!(service.list_events("downtown").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listing_unknown_studio_is_not_found() {
        let pool = test_pool().await;
        let service = EventService::with_notifier(pool, None);
        let err = service.list_events("nowhere").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
