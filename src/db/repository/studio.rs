use sqlx::SqlitePool;

use crate::db::models::Studio;
use crate::error::{AppError, AppResult};

pub struct StudioRepository;

impl StudioRepository {
    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> AppResult<Option<Studio>> {
        let row = sqlx::query_as::<_, Studio>(
            r#"
            SELECT name, chat_id, description, utc_offset_hours, created_at
            FROM studios
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<Studio>> {
        let rows = sqlx::query_as::<_, Studio>(
            r#"
            SELECT name, chat_id, description, utc_offset_hours, created_at
            FROM studios
            ORDER BY name
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
