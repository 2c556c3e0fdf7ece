//! Closing report-gated events from chat replies.
//!
//! A studio closes a report by replying to the bot's reminder with a message
//! containing a report keyword. The event name is read back out of the
//! reminder text via its name label, then the matching report-gated record is
//! removed — but only when the replying chat is the channel the record was
//! created for, so a name collision in another studio's chat cannot close
//! someone else's report.

use std::sync::OnceLock;

use regex::Regex;
use sqlx::SqlitePool;

use crate::db::{Category, EventRepository};
use crate::error::AppResult;

/// Keywords (lowercase) that mark a reply as a report acknowledgment.
const REPORT_KEYWORDS: [&str; 2] = ["отчет", "report"];

static EVENT_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn event_name_re() -> &'static Regex {
    EVENT_NAME_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:Название|Name):\s*([^.]+)").expect("valid event name pattern")
    })
}

/// True when a reply text acknowledges a report.
pub fn is_report_acknowledgment(text: &str) -> bool {
    let lower = text.to_lowercase();
    REPORT_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Pull the event name out of a reminder message: the text after the name
/// label up to the first period.
pub fn extract_event_name(text: &str) -> Option<String> {
    event_name_re()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

pub struct ReportService {
    pool: SqlitePool,
}

impl ReportService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Close the named report for the replying chat.
    ///
    /// Report-gated records are scanned across all studios first; the first
    /// one whose stored channel matches the replying chat is removed from the
    /// report, plain and reminder categories. Failing that, report-periodic
    /// records are scanned the same way and removed from the plain and
    /// report-periodic categories. Returns whether anything was closed.
    pub async fn close_report(&self, event_name: &str, chat_id: &str) -> AppResult<bool> {
        for studio in
            EventRepository::studios_with_category(&self.pool, Category::Report).await?
        {
            let Some(record) =
                EventRepository::get(&self.pool, &studio, Category::Report, event_name).await?
            else {
                continue;
            };
            if record.chat_id != chat_id {
                tracing::info!(
                    "Report reply from chat {} does not match the channel of {}/{}",
                    chat_id,
                    studio,
                    event_name
                );
                continue;
            }
            self.remove_tags(
                &studio,
                event_name,
                &[Category::Report, Category::Plain, Category::Reminder],
            )
            .await;
            return Ok(true);
        }

        for studio in
            EventRepository::studios_with_category(&self.pool, Category::ReportPeriodic).await?
        {
            let Some(record) =
                EventRepository::get(&self.pool, &studio, Category::ReportPeriodic, event_name)
                    .await?
            else {
                continue;
            };
            if record.chat_id != chat_id {
                continue;
            }
            self.remove_tags(
                &studio,
                event_name,
                &[Category::Plain, Category::ReportPeriodic],
            )
            .await;
            return Ok(true);
        }

        Ok(false)
    }

    async fn remove_tags(&self, studio: &str, event_name: &str, categories: &[Category]) {
        for &category in categories {
            match EventRepository::delete(&self.pool, studio, category, event_name).await {
                // Missing tags are benign; not every closed event carried one.
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "Failed to delete {} tag for {}/{}: {:?}",
                        category.as_str(),
                        studio,
                        event_name,
                        e
                    );
                }
            }
        }
    }
}
