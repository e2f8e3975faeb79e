//! Command Handler module for slash commands
//!
//! Commands are accepted in any state. Only `/start` changes the state.

use anyhow::Result;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::dialogue::{ChatDialogue, ConversationState};

use super::dialogue_manager::{ChatEvent, ConversationMachine};
use super::ui_builder::BotReply;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "start over")]
    Start,
    #[command(description = "open the order app")]
    Run,
    #[command(description = "show help")]
    Help,
    #[command(description = "register a manager code")]
    AddManager(String),
    #[command(description = "check that the bot is alive")]
    Test,
}

/// Parse a command case-insensitively, ignoring any `@botname` suffix.
///
/// `Ok(None)` is an unknown command; `Err` carries the command name when the
/// command is known but its arguments are not.
pub fn parse_command(text: &str) -> Result<Option<Command>, String> {
    let text = text.trim();
    let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let normalized = if rest.trim().is_empty() {
        name.clone()
    } else {
        format!("{name} {}", rest.trim())
    };

    match Command::parse(&normalized, "") {
        Ok(command) => Ok(Some(command)),
        Err(_) if name == "/addmanager" => Err(name),
        Err(_) => Ok(None),
    }
}

impl ConversationMachine {
    pub(super) async fn handle_command(
        &self,
        dialogue: &ChatDialogue,
        state: &ConversationState,
        event: &ChatEvent,
    ) -> Result<BotReply> {
        let lang = event.language();

        let command = match parse_command(&event.text) {
            Ok(Some(command)) => command,
            Ok(None) => {
                info!(chat_id = %event.chat_id, text = %event.text, "Unknown command");
                return Ok(BotReply::text(t_lang("command-unknown", lang)));
            }
            Err(_) => return Ok(BotReply::text(t_lang("addmanager-usage", lang))),
        };
        info!(chat_id = %event.chat_id, command = ?command, "Received command");

        match command {
            Command::Start => {
                dialogue.update(ConversationState::Start).await?;
                Ok(self.start_menu(event))
            }
            Command::Run => Ok(self.web_app_reply(event)),
            Command::Help => {
                let key = match state {
                    state if state.is_manager() => "help-manager",
                    ConversationState::CustomerMode => "help-customer",
                    _ => "help-general",
                };
                Ok(BotReply::text(t_lang(key, lang)))
            }
            Command::AddManager(args) => self.add_manager(event, &args).await,
            Command::Test => Ok(BotReply::text(t_lang("command-test", lang))),
        }
    }

    async fn add_manager(&self, event: &ChatEvent, args: &str) -> Result<BotReply> {
        let lang = event.language();
        let Some(code) = args.split_whitespace().next() else {
            return Ok(BotReply::text(t_lang("addmanager-usage", lang)));
        };

        let mut registry = self.registry.clone().lock_owned().await;
        let owned_code = code.to_string();
        let result = tokio::task::spawn_blocking(move || registry.add(&owned_code)).await?;
        let text = match result {
            Ok(true) => t_args_lang("addmanager-added", &[("code", code)], lang),
            Ok(false) => t_args_lang("addmanager-exists", &[("code", code)], lang),
            Err(e) if e.is_user_error() => {
                warn!(chat_id = %event.chat_id, error = %e, "Rejected manager code");
                t_lang("addmanager-invalid", lang)
            }
            Err(e) => {
                error!(chat_id = %event.chat_id, error = %e, "Failed to save manager codes");
                t_lang("addmanager-failed", lang)
            }
        };
        Ok(BotReply::text(text))
    }
}
