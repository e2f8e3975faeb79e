//! Callback Handler module for inline keyboard callback queries

use anyhow::Result;
use teloxide::prelude::*;
use tracing::debug;

/// Acknowledge a callback query so the client stops its spinner
pub async fn callback_handler(bot: Bot, q: CallbackQuery) -> Result<()> {
    debug!(
        user_id = %q.from.id,
        data = q.data.as_deref().unwrap_or(""),
        "Received callback query from user"
    );
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}
