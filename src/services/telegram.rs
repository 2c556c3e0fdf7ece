use async_trait::async_trait;
use sqlx::SqlitePool;
use teloxide::prelude::*;
use teloxide::types::ChatId;

use crate::db::{CreateNotificationLog, NotificationLogRepository};
use crate::error::{AppError, AppResult};

/// The outbound messaging seam. Everything that sends a chat message goes
/// through this trait so the sweeps and the orchestrator can be exercised
/// against a test double.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str) -> AppResult<()>;
}

#[derive(Clone)]
pub struct TelegramService {
    bot: Bot,
}

impl TelegramService {
    pub async fn new(token: String) -> AppResult<Self> {
        let bot = Bot::new(token);

        // Verify the bot token by getting bot info
        match bot.get_me().await {
            Ok(me) => {
                tracing::info!("Telegram bot initialized: @{}", me.username());
                Ok(Self { bot })
            }
            Err(e) => {
                tracing::error!("Failed to initialize Telegram bot: {}", e);
                Err(AppError::Telegram(format!(
                    "Failed to initialize bot: {}",
                    e
                )))
            }
        }
    }

    pub async fn send_text(&self, chat_id: &str, text: &str) -> AppResult<i32> {
        let chat_id: i64 = chat_id
            .parse()
            .map_err(|_| AppError::Telegram("Invalid chat_id".to_string()))?;

        match self.bot.send_message(ChatId(chat_id), text).await {
            Ok(sent_message) => {
                tracing::debug!(
                    "Telegram message sent to {}: message_id={}",
                    chat_id,
                    sent_message.id
                );
                Ok(sent_message.id.0)
            }
            Err(e) => {
                tracing::error!("Failed to send Telegram message: {}", e);
                Err(AppError::Telegram(format!("Failed to send message: {}", e)))
            }
        }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

#[async_trait]
impl Notifier for TelegramService {
    async fn send(&self, chat_id: &str, text: &str) -> AppResult<()> {
        self.send_text(chat_id, text).await.map(|_| ())
    }
}

/// Send one notification and record the attempt in the notification log.
///
/// Failures (including an unconfigured bot) are logged and recorded, never
/// returned: a lost chat message must not fail the batch that produced it.
pub async fn deliver(
    pool: &SqlitePool,
    notifier: Option<&std::sync::Arc<dyn Notifier>>,
    kind: &'static str,
    chat_id: &str,
    text: &str,
) {
    let outcome = match notifier {
        Some(notifier) => notifier.send(chat_id, text).await,
        None => Err(AppError::Telegram(
            "Telegram bot is not configured".to_string(),
        )),
    };

    let (status, error_message) = match &outcome {
        Ok(()) => ("sent", None),
        Err(e) => {
            tracing::warn!("Failed to send {} to chat {}: {}", kind, chat_id, e);
            ("failed", Some(e.to_string()))
        }
    };

    if let Err(e) = NotificationLogRepository::create(
        pool,
        CreateNotificationLog {
            kind: kind.to_string(),
            chat_id: chat_id.to_string(),
            message: text.to_string(),
            status: status.to_string(),
            error_message,
        },
    )
    .await
    {
        tracing::warn!("Failed to record notification log entry: {:?}", e);
    }
}
