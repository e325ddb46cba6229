//! Answer a single question from the command line.

use anyhow::Result;

use crate::config::Config;
use crate::pipeline::{build_handler, IncomingMessage, TurnReport};

/// Sender id used for turns that do not come from Telegram.
const CLI_SENDER_ID: i64 = 0;

/// Run one text turn through the full pipeline.
pub async fn run(config: &Config, question: &str) -> Result<TurnReport> {
    let handler = build_handler(config)?;
    Ok(handler
        .handle_traced(IncomingMessage::text(CLI_SENDER_ID, question))
        .await)
}
