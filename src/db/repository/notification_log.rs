use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateNotificationLog, NotificationLogEntry};
use crate::error::{AppError, AppResult};

/// Append-only log of outbound notification attempts.
pub struct NotificationLogRepository;

impl NotificationLogRepository {
    pub async fn create(
        pool: &SqlitePool,
        entry: CreateNotificationLog,
    ) -> AppResult<NotificationLogEntry> {
        let id = Uuid::new_v4().to_string();

        let row = sqlx::query_as::<_, NotificationLogEntry>(
            r#"
            INSERT INTO notification_log (id, kind, chat_id, message, status, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, kind, chat_id, message, status, error_message, created_at
            "#,
        )
        .bind(id)
        .bind(entry.kind)
        .bind(entry.chat_id)
        .bind(entry.message)
        .bind(entry.status)
        .bind(entry.error_message)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
