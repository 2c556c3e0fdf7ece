//! Inbound side of the messaging transport: a teloxide dispatcher that
//! watches studio chats for report acknowledgments.

use std::sync::Arc;

use teloxide::{prelude::*, types::Update};

use crate::services::reports::{self, ReportService};
use crate::{i18n, AppState};

/// Spawn the long-polling dispatcher. It stops cleanly when the shutdown
/// channel fires.
pub fn spawn_dispatcher(
    state: Arc<AppState>,
    bot: Bot,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let handler = Update::filter_message().endpoint(handle_message);

        let mut dispatcher = Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![state])
            .default_handler(|_| async {})
            .enable_ctrlc_handler()
            .build();

        let token = dispatcher.shutdown_token();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = shutdown_rx.recv().await;
            if let Ok(stopped) = token.shutdown() {
                stopped.await;
            }
        });

        tracing::info!("Telegram dispatcher started");
        dispatcher.dispatch().await;
        tracing::info!("Telegram dispatcher stopped");
    })
}

/// A report acknowledgment is a reply to one of the bot's reminders whose text
/// contains a report keyword. Everything else in the chat is ignored.
async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(replied) = msg.reply_to_message() else {
        return Ok(());
    };
    if !reports::is_report_acknowledgment(text) {
        return Ok(());
    }

    let chat_id = msg.chat.id;
    let lang = state.config.telegram.language.clone();
    let lang = Some(lang.as_str());

    let Some(original_text) = replied.text() else {
        return Ok(());
    };
    let Some(event_name) = reports::extract_event_name(original_text) else {
        bot.send_message(chat_id, i18n::tr(lang, "report.unnamed", None))
            .await?;
        return Ok(());
    };

    let service = ReportService::new(state.db.clone());
    let reply = match service
        .close_report(&event_name, &chat_id.0.to_string())
        .await
    {
        Ok(true) => i18n::tr(lang, "report.saved", Some(&[("name", event_name.as_str())])),
        Ok(false) => i18n::tr(
            lang,
            "report.not_saved",
            Some(&[("name", event_name.as_str())]),
        ),
        Err(e) => {
            tracing::error!("Failed to close report for {}: {:?}", event_name, e);
            i18n::tr(lang, "report.error", None)
        }
    };
    bot.send_message(chat_id, reply).await?;

    Ok(())
}
