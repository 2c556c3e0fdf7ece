use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A studio: the unit events belong to and reminders are addressed by.
///
/// `utc_offset_hours` is kept as text because the legacy data stores it that
/// way (signed, possibly fractional, e.g. "5.5"); it is parsed on use. The
/// offset is treated as immutable once events reference the studio.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Studio {
    pub name: String,

    /// Notification channel (Telegram chat id) for this studio.
    pub chat_id: String,

    pub description: String,

    pub utc_offset_hours: String,

    pub created_at: NaiveDateTime,
}
