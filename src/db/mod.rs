pub mod models;
pub mod repository;

pub use models::*;
pub use repository::{EventRepository, NotificationLogRepository, StudioRepository};

/// In-memory pool with migrations applied, for repository and service tests.
/// One connection only: each SQLite `:memory:` connection is its own database.
#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

#[cfg(test)]
pub(crate) async fn seed_studio(
    pool: &sqlx::SqlitePool,
    name: &str,
    chat_id: &str,
    utc_offset_hours: &str,
) {
    sqlx::query(
        "INSERT INTO studios (name, chat_id, description, utc_offset_hours) VALUES (?, ?, '', ?)",
    )
    .bind(name)
    .bind(chat_id)
    .bind(utc_offset_hours)
    .execute(pool)
    .await
    .expect("seed studio");
}
