use sqlx::SqlitePool;

use crate::db::models::{CategorizedEvent, Category, EventRecord, NewEventRecord};
use crate::error::{AppError, AppResult};

/// Accessor over the event store: the umbrella `events` table plus the
/// `event_categories` tag table.
///
/// Implementation notes:
/// - There is deliberately no multi-category transaction; the creation path
///   sequences writes itself and tolerates partial failure, matching the
///   best-effort semantics of the rest of the system.
/// - Removing the last category tag prunes the event row, so "deleted from
///   every collection" and "gone from listings" stay equivalent.
pub struct EventRepository;

impl EventRepository {
    /// Upsert the event record and tag it with `category`.
    pub async fn put(
        pool: &SqlitePool,
        record: &NewEventRecord,
        category: Category,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events (studio_name, name, time, warning_time, description, chat_id, periodic)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (studio_name, name) DO UPDATE SET
                time = excluded.time,
                warning_time = excluded.warning_time,
                description = excluded.description,
                chat_id = excluded.chat_id,
                periodic = excluded.periodic
            "#,
        )
        .bind(&record.studio_name)
        .bind(&record.name)
        .bind(&record.time)
        .bind(&record.warning_time)
        .bind(&record.description)
        .bind(&record.chat_id)
        .bind(record.periodic)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO event_categories (studio_name, event_name, category)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&record.studio_name)
        .bind(&record.name)
        .bind(category.as_str())
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Fetch an event by name if it carries the given category tag.
    pub async fn get(
        pool: &SqlitePool,
        studio_name: &str,
        category: Category,
        event_name: &str,
    ) -> AppResult<Option<CategorizedEvent>> {
        let row = sqlx::query_as::<_, CategorizedEvent>(
            r#"
            SELECT
                e.studio_name,
                e.name,
                e.time,
                e.warning_time,
                e.description,
                e.chat_id,
                e.periodic,
                c.last_fired_on
            FROM event_categories c
            JOIN events e
              ON e.studio_name = c.studio_name AND e.name = c.event_name
            WHERE c.studio_name = ? AND c.category = ? AND c.event_name = ?
            "#,
        )
        .bind(studio_name)
        .bind(category.as_str())
        .bind(event_name)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Remove one category tag. Returns whether the tag existed; a missing tag
    /// is benign (another actor already achieved the desired end state). The
    /// event row is pruned once no tags remain.
    pub async fn delete(
        pool: &SqlitePool,
        studio_name: &str,
        category: Category,
        event_name: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM event_categories
            WHERE studio_name = ? AND event_name = ? AND category = ?
            "#,
        )
        .bind(studio_name)
        .bind(event_name)
        .bind(category.as_str())
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::prune_untagged(pool, studio_name, event_name).await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove the event from every category it was inserted into, and the
    /// record itself. Returns false when nothing referenced the event.
    pub async fn delete_everywhere(
        pool: &SqlitePool,
        studio_name: &str,
        event_name: &str,
    ) -> AppResult<bool> {
        let tags = sqlx::query(
            r#"
            DELETE FROM event_categories
            WHERE studio_name = ? AND event_name = ?
            "#,
        )
        .bind(studio_name)
        .bind(event_name)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        let record = sqlx::query(
            r#"
            DELETE FROM events
            WHERE studio_name = ? AND name = ?
            "#,
        )
        .bind(studio_name)
        .bind(event_name)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(tags.rows_affected() > 0 || record.rows_affected() > 0)
    }

    /// Studios that currently have at least one record in `category`.
    pub async fn studios_with_category(
        pool: &SqlitePool,
        category: Category,
    ) -> AppResult<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT studio_name
            FROM event_categories
            WHERE category = ?
            ORDER BY studio_name
            "#,
        )
        .bind(category.as_str())
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// All of one studio's records carrying the given category tag.
    pub async fn list_for_studio_category(
        pool: &SqlitePool,
        studio_name: &str,
        category: Category,
    ) -> AppResult<Vec<CategorizedEvent>> {
        let rows = sqlx::query_as::<_, CategorizedEvent>(
            r#"
            SELECT
                e.studio_name,
                e.name,
                e.time,
                e.warning_time,
                e.description,
                e.chat_id,
                e.periodic,
                c.last_fired_on
            FROM event_categories c
            JOIN events e
              ON e.studio_name = c.studio_name AND e.name = c.event_name
            WHERE c.studio_name = ? AND c.category = ?
            ORDER BY e.name
            "#,
        )
        .bind(studio_name)
        .bind(category.as_str())
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// One studio's umbrella listing.
    pub async fn list_events(pool: &SqlitePool, studio_name: &str) -> AppResult<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT studio_name, name, time, warning_time, description, chat_id, periodic, created_at
            FROM events
            WHERE studio_name = ?
            "#,
        )
        .bind(studio_name)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Umbrella listing across every studio.
    pub async fn list_all_events(pool: &SqlitePool) -> AppResult<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT studio_name, name, time, warning_time, description, chat_id, periodic, created_at
            FROM events
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Record that the periodic sweep fired for this event on `fired_on`
    /// (YYYY-MM-DD), so it does not fire again the same day.
    pub async fn mark_periodic_fired(
        pool: &SqlitePool,
        studio_name: &str,
        event_name: &str,
        fired_on: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE event_categories
            SET last_fired_on = ?
            WHERE studio_name = ? AND event_name = ? AND category = ?
            "#,
        )
        .bind(fired_on)
        .bind(studio_name)
        .bind(event_name)
        .bind(Category::Periodic.as_str())
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    async fn prune_untagged(
        pool: &SqlitePool,
        studio_name: &str,
        event_name: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM events
            WHERE studio_name = ? AND name = ?
              AND NOT EXISTS (
                  SELECT 1 FROM event_categories c
                  WHERE c.studio_name = events.studio_name
                    AND c.event_name = events.name
              )
            "#,
        )
        .bind(studio_name)
        .bind(event_name)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn record(studio: &str, name: &str) -> NewEventRecord {
        NewEventRecord {
            studio_name: studio.to_string(),
            name: name.to_string(),
            time: "2025-05-01T15:00:00Z".to_string(),
            warning_time: Some("2025-05-01T14:00:00Z".to_string()),
            description: "stocktake".to_string(),
            chat_id: "-100200".to_string(),
            periodic: false,
        }
    }

    #[tokio::test]
    async fn put_tags_and_get() {
        let pool = test_pool().await;
        let rec = record("downtown", "Inventory");

        EventRepository::put(&pool, &rec, Category::Plain).await.unwrap();
        EventRepository::put(&pool, &rec, Category::Report).await.unwrap();

        let got = EventRepository::get(&pool, "downtown", Category::Report, "Inventory")
            .await
            .unwrap()
            .expect("tagged as report");
        assert_eq!(got.chat_id, "-100200");

        assert!(
            EventRepository::get(&pool, "downtown", Category::Reminder, "Inventory")
                .await
                .unwrap()
                .is_none()
        );

        // Re-tagging is idempotent; the record is upserted, not duplicated.
        EventRepository::put(&pool, &rec, Category::Report).await.unwrap();
        assert_eq!(
            EventRepository::list_events(&pool, "downtown").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn delete_prunes_untagged_record() {
        let pool = test_pool().await;
        let rec = record("downtown", "Inventory");
        EventRepository::put(&pool, &rec, Category::Plain).await.unwrap();
        EventRepository::put(&pool, &rec, Category::Reminder).await.unwrap();

        // Dropping the reminder tag keeps the listed event.
        assert!(EventRepository::delete(&pool, "downtown", Category::Reminder, "Inventory")
            .await
            .unwrap());
        assert_eq!(
            EventRepository::list_events(&pool, "downtown").await.unwrap().len(),
            1
        );

        // A missing tag is benign, not an error.
        assert!(!EventRepository::delete(&pool, "downtown", Category::Reminder, "Inventory")
            .await
            .unwrap());

        // Dropping the last tag removes the record from listings too.
        assert!(EventRepository::delete(&pool, "downtown", Category::Plain, "Inventory")
            .await
            .unwrap());
        assert!(EventRepository::list_events(&pool, "downtown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_everywhere_reports_presence() {
        let pool = test_pool().await;

        assert!(!EventRepository::delete_everywhere(&pool, "downtown", "Ghost")
            .await
            .unwrap());

        let rec = record("downtown", "Inventory");
        EventRepository::put(&pool, &rec, Category::Plain).await.unwrap();
        EventRepository::put(&pool, &rec, Category::Report).await.unwrap();
        EventRepository::put(&pool, &rec, Category::Reminder).await.unwrap();

        assert!(EventRepository::delete_everywhere(&pool, "downtown", "Inventory")
            .await
            .unwrap());
        assert!(EventRepository::list_events(&pool, "downtown").await.unwrap().is_empty());
        for category in [
            Category::Plain,
            Category::Report,
            Category::Reminder,
            Category::Periodic,
            Category::ReportPeriodic,
        ] {
            assert!(EventRepository::get(&pool, "downtown", category, "Inventory")
                .await
                .unwrap()
                .is_none());
        }
    }

    #[tokio::test]
    async fn category_scans_are_studio_scoped() {
        let pool = test_pool().await;
        EventRepository::put(&pool, &record("downtown", "Inventory"), Category::Report)
            .await
            .unwrap();
        EventRepository::put(&pool, &record("airport", "Inventory"), Category::Report)
            .await
            .unwrap();
        EventRepository::put(&pool, &record("airport", "Cleanup"), Category::Reminder)
            .await
            .unwrap();

        let studios = EventRepository::studios_with_category(&pool, Category::Report)
            .await
            .unwrap();
        assert_eq!(studios, vec!["airport".to_string(), "downtown".to_string()]);

        let airport_reports =
            EventRepository::list_for_studio_category(&pool, "airport", Category::Report)
                .await
                .unwrap();
        assert_eq!(airport_reports.len(), 1);
        assert_eq!(airport_reports[0].name, "Inventory");
    }

    #[tokio::test]
    async fn periodic_fired_mark_round_trips() {
        let pool = test_pool().await;
        let mut rec = record("downtown", "Rent");
        rec.periodic = true;
        EventRepository::put(&pool, &rec, Category::Periodic).await.unwrap();

        EventRepository::mark_periodic_fired(&pool, "downtown", "Rent", "2025-05-01")
            .await
            .unwrap();

        let got = EventRepository::get(&pool, "downtown", Category::Periodic, "Rent")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.last_fired_on.as_deref(), Some("2025-05-01"));
    }
}
