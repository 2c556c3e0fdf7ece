use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One outbound notification attempt, recorded best-effort. Send failures are
/// never surfaced to HTTP callers; this log is where they remain visible.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationLogEntry {
    /// Primary key (UUID)
    pub id: String,

    /// What produced the message: 'announcement', 'report-reminder',
    /// 'report-periodic-reminder', 'reminder', 'periodic-reminder'.
    pub kind: String,

    pub chat_id: String,

    pub message: String,

    /// 'sent' or 'failed'
    pub status: String,

    pub error_message: Option<String>,

    pub created_at: NaiveDateTime,
}

/// Data required to record a notification attempt.
#[derive(Debug, Clone)]
pub struct CreateNotificationLog {
    pub kind: String,
    pub chat_id: String,
    pub message: String,
    pub status: String,
    pub error_message: Option<String>,
}
