//! Run the Telegram bot.

use std::sync::Arc;

use anyhow::Result;
use teloxide::Bot;
use tracing::info;

use crate::bot;
use crate::config::Config;
use crate::pipeline::build_handler;

pub async fn run(config: &Config) -> Result<()> {
    config.require_bot()?;

    let handler = Arc::new(build_handler(config)?);
    let bot = Bot::new(config.bot_token.clone());

    info!(collection = %config.qdrant.collection, "Bot is running, press Ctrl+C to stop");
    bot::run(bot, handler).await;
    info!("Bot stopped");
    Ok(())
}
