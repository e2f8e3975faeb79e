//! Message Handler module for incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{debug, error};

// Import localization
use crate::localization::t_lang;

use super::dialogue_manager::{ChatEvent, ConversationMachine};
use super::ui_builder::{to_reply_markup, BotReply};

/// Build a transport-independent event from a Telegram text message
pub fn chat_event_from_message(msg: &Message, text: &str) -> ChatEvent {
    let mut event = ChatEvent::new(msg.chat.id, text);
    if let Some(user) = msg.from.as_ref() {
        event.sender_name = Some(user.first_name.clone());
        event.language_code = user.language_code.clone();
    }
    event
}

/// Send a reply as HTML with its keyboard attached
pub async fn send_reply(bot: &Bot, chat_id: ChatId, reply: BotReply) -> Result<()> {
    let markup = to_reply_markup(&reply.keyboard)?;
    let mut request = bot.send_message(chat_id, reply.text).parse_mode(ParseMode::Html);
    if let Some(markup) = markup {
        request = request.reply_markup(markup);
    }
    request.await?;
    Ok(())
}

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    machine: Arc<ConversationMachine>,
) -> Result<()> {
    let Some(text) = msg.text() else {
        debug!(user_id = %msg.chat.id, "Ignoring non-text message");
        return Ok(());
    };

    let event = chat_event_from_message(&msg, text);
    debug!(user_id = %msg.chat.id, message_length = text.len(), "Received text message from user");

    let reply = match machine.handle(&event).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(user_id = %msg.chat.id, error = %e, "Failed to handle message");
            BotReply::text(t_lang("error-generic", event.language()))
        }
    };

    send_reply(&bot, msg.chat.id, reply).await
}
