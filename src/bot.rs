//! Telegram transport.
//!
//! Turns Telegram updates into [`IncomingMessage`]s, runs them through the
//! shared [`ConversationHandler`] and delivers the single reply.

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile};
use tracing::{debug, error, info, warn};

use crate::pipeline::{AnswerMessage, ConversationHandler, IncomingMessage};
use crate::Result;

/// Telegram rejects longer text messages.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

pub const DOWNLOAD_FAILURE_REPLY: &str = "Sorry, I couldn't download the voice message.";

pub const GREETING: &str = "Hi! I'm an agronomy assistant. Ask me about crops, soil, \
    irrigation or pests by text or with a voice message.";

/// What a text message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextIntent<'a> {
    Greeting,
    Question(&'a str),
    /// Unknown command
    Ignore,
}

/// Classify a text message. Commands other than `/start` and `/help` are ignored.
pub fn classify_text(text: &str) -> TextIntent<'_> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return TextIntent::Question(trimmed);
    }

    let command = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    match command.as_str() {
        "/start" | "/help" => TextIntent::Greeting,
        _ => TextIntent::Ignore,
    }
}

/// Split `text` into parts of at most `limit` chars, preferring line breaks
/// and then spaces as cut points.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        let (hard_cut, next) = rest
            .char_indices()
            .nth(limit)
            .map(|(i, c)| (i, i + c.len_utf8()))
            .unwrap_or((rest.len(), rest.len()));
        // A separator right at the limit is a valid cut point.
        let window = &rest[..next];

        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|i| *i > 0)
            .unwrap_or(hard_cut);

        parts.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }

    if !rest.is_empty() || parts.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}

/// Run the long-polling dispatcher until Ctrl+C.
pub async fn run(bot: Bot, handler: Arc<ConversationHandler>) {
    let schema = dptree::entry().branch(Update::filter_message().endpoint(
        |bot: Bot, msg: Message, handler: Arc<ConversationHandler>| async move {
            if let Err(err) = handle_message(&bot, &msg, &handler).await {
                error!(chat_id = msg.chat.id.0, "Handler error: {err}");
            }
            Ok::<_, teloxide::RequestError>(())
        },
    ));

    info!("Starting Telegram dispatcher");
    Dispatcher::builder(bot, schema)
        .dependencies(dptree::deps![handler])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(bot: &Bot, msg: &Message, handler: &ConversationHandler) -> Result<()> {
    let chat_id = msg.chat.id;
    let sender_id = msg
        .from()
        .map(|user| user.id.0 as i64)
        .unwrap_or(chat_id.0);

    let incoming = if let Some(voice) = msg.voice() {
        show_typing(bot, chat_id).await;
        match download_voice(bot, &voice.file.id).await {
            Ok(audio) => IncomingMessage::voice(sender_id, audio),
            Err(err) => {
                warn!(sender_id, "Voice download failed: {err}");
                send_text(bot, chat_id, DOWNLOAD_FAILURE_REPLY).await?;
                return Ok(());
            }
        }
    } else if let Some(text) = msg.text() {
        match classify_text(text) {
            TextIntent::Greeting => {
                send_text(bot, chat_id, GREETING).await?;
                return Ok(());
            }
            TextIntent::Ignore => {
                debug!(sender_id, "Ignoring command");
                return Ok(());
            }
            TextIntent::Question(question) => {
                show_typing(bot, chat_id).await;
                IncomingMessage::text(sender_id, question)
            }
        }
    } else {
        return Ok(());
    };

    let answer = handler.handle(incoming).await;
    deliver(bot, chat_id, answer).await
}

/// Typing indicator. Failures are logged and never end the turn.
async fn show_typing(bot: &Bot, chat_id: ChatId) {
    if let Err(err) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
        warn!(chat_id = chat_id.0, "send_chat_action failed: {err}");
    }
}

async fn download_voice(bot: &Bot, file_id: &str) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;
    let mut audio = Vec::with_capacity(file.meta.size as usize);
    bot.download_file(&file.path, &mut audio).await?;
    debug!(bytes = audio.len(), "Voice downloaded");
    Ok(audio)
}

/// Voice note when audio is present; text otherwise or when the upload fails.
async fn deliver(bot: &Bot, chat_id: ChatId, answer: AnswerMessage) -> Result<()> {
    if let Some(audio) = answer.audio {
        let voice = InputFile::memory(audio).file_name("answer.ogg");
        match bot.send_voice(chat_id, voice).await {
            Ok(_) => return Ok(()),
            Err(err) => warn!(chat_id = chat_id.0, "send_voice failed, sending text: {err}"),
        }
    }
    send_text(bot, chat_id, &answer.text).await
}

async fn send_text(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    for part in split_message(text, TELEGRAM_MESSAGE_LIMIT) {
        bot.send_message(chat_id, part).await?;
    }
    Ok(())
}
