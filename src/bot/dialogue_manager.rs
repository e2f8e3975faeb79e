//! Dialogue Manager module for handling conversation state transitions
//!
//! [`ConversationMachine`] owns the per-chat state and turns each incoming
//! text into a [`BotReply`]. It does not talk to Telegram itself, so every
//! transition can be driven directly from tests.

use anyhow::Result;
use chrono::Local;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::types::ChatId;
use teloxide::utils::html;
use tracing::{debug, error, info};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import dialogue types
use crate::dialogue::{
    parse_birth_date, validate_full_name, ChatDialogue, ConversationState, PendingInput,
};

use crate::intake_errors::IntakeError;
use crate::manager_registry::SharedManagerRegistry;
use crate::persistence::OrderStore;
use crate::users::{StoredUser, UserStore};

// Import UI builder functions
use super::ui_builder::{
    customer_keyboard, format_orders_summary, format_users_list, main_keyboard, manager_keyboard,
    role_selection_keyboard, web_app_keyboard, BotReply, KeyboardSpec, LABEL_BACK,
    LABEL_CHECK_ORDERS, LABEL_ENTER_USER, LABEL_LAUNCH_APP, LABEL_LOGIN_CUSTOMER,
    LABEL_LOGIN_MANAGER, LABEL_LOGOUT, LABEL_ORDER_INFO, LABEL_SHOW_USERS, LABEL_START,
    USERS_PAGE_SIZE,
};

/// One incoming text message, stripped of transport details
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub chat_id: ChatId,
    pub text: String,
    pub sender_name: Option<String>,
    pub language_code: Option<String>,
}

impl ChatEvent {
    pub fn new(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            sender_name: None,
            language_code: None,
        }
    }

    pub fn with_sender(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    pub fn with_language(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = Some(language_code.into());
        self
    }

    pub fn language(&self) -> Option<&str> {
        self.language_code.as_deref()
    }

    /// Sender name escaped for HTML, or the localized placeholder
    pub fn display_name(&self) -> String {
        match self.sender_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => html::escape(name),
            _ => t_lang("unknown-user", self.language()),
        }
    }
}

/// Role-based conversation state machine shared by all chats
pub struct ConversationMachine {
    storage: Arc<InMemStorage<ConversationState>>,
    pub(super) registry: SharedManagerRegistry,
    pub(super) users: Arc<UserStore>,
    pub(super) orders: Arc<OrderStore>,
    pub(super) web_app_url: String,
    chat_locks: Mutex<HashMap<ChatId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationMachine {
    pub fn new(
        registry: SharedManagerRegistry,
        users: Arc<UserStore>,
        orders: Arc<OrderStore>,
        web_app_url: impl Into<String>,
    ) -> Self {
        Self {
            storage: InMemStorage::new(),
            registry,
            users,
            orders,
            web_app_url: web_app_url.into(),
            chat_locks: Mutex::new(HashMap::new()),
        }
    }

    pub(super) fn dialogue(&self, chat_id: ChatId) -> ChatDialogue {
        ChatDialogue::new(self.storage.clone(), chat_id)
    }

    /// Current state of a chat; unknown chats are at `Start`
    pub async fn state(&self, chat_id: ChatId) -> Result<ConversationState> {
        Ok(self.dialogue(chat_id).get_or_default().await?)
    }

    fn chat_lock(&self, chat_id: ChatId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.chat_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(chat_id).or_default().clone()
    }

    /// Drop the chat's lock entry once nobody else holds or waits on it
    fn release_chat_lock(&self, chat_id: ChatId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.chat_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here
        let idle = Arc::strong_count(&lock) == 2;
        drop(lock);
        if idle {
            locks.remove(&chat_id);
        }
    }

    /// Number of chats with an event currently in flight
    pub fn active_chats(&self) -> usize {
        self.chat_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Process one text message and produce the reply.
    ///
    /// Events of the same chat are handled one at a time.
    pub async fn handle(&self, event: &ChatEvent) -> Result<BotReply> {
        let lock = self.chat_lock(event.chat_id);
        let result = {
            let _guard = lock.lock().await;
            self.handle_locked(event).await
        };
        self.release_chat_lock(event.chat_id, lock);
        result
    }

    async fn handle_locked(&self, event: &ChatEvent) -> Result<BotReply> {
        let dialogue = self.dialogue(event.chat_id);
        let state = dialogue.get_or_default().await?;
        let text = event.text.trim();
        debug!(chat_id = %event.chat_id, state = ?state, "Handling chat event");

        if text.starts_with('/') {
            return self.handle_command(&dialogue, &state, event).await;
        }

        match state {
            ConversationState::Start => self.handle_start(&dialogue, event, text).await,
            ConversationState::WaitingForManagerCode => {
                self.handle_manager_code(&dialogue, event, text).await
            }
            ConversationState::CustomerMode => self.handle_customer(&dialogue, event, text).await,
            ConversationState::ManagerAuthenticated => {
                self.handle_manager(&dialogue, event, text).await
            }
            ConversationState::WaitingForFullName => {
                self.handle_full_name(&dialogue, event, text).await
            }
            ConversationState::WaitingForBirthDate { pending } => {
                self.handle_birth_date(&dialogue, event, text, pending).await
            }
        }
    }

    /// Greeting with the "Start" button
    pub(super) fn start_menu(&self, event: &ChatEvent) -> BotReply {
        BotReply::new(
            t_args_lang(
                "start-greeting",
                &[("name", &event.display_name())],
                event.language(),
            ),
            main_keyboard(),
        )
    }

    pub(super) fn web_app_reply(&self, event: &ChatEvent) -> BotReply {
        BotReply::new(
            t_lang("launch-app", event.language()),
            web_app_keyboard(&self.web_app_url, event.language()),
        )
    }

    async fn handle_start(
        &self,
        dialogue: &ChatDialogue,
        event: &ChatEvent,
        text: &str,
    ) -> Result<BotReply> {
        let lang = event.language();
        match text {
            LABEL_START => Ok(BotReply::new(
                t_args_lang("role-selection", &[("name", &event.display_name())], lang),
                role_selection_keyboard(),
            )),
            LABEL_LOGIN_MANAGER => {
                dialogue.update(ConversationState::WaitingForManagerCode).await?;
                Ok(BotReply::new(
                    t_lang("manager-code-prompt", lang),
                    KeyboardSpec::Remove,
                ))
            }
            LABEL_LOGIN_CUSTOMER => {
                dialogue.update(ConversationState::CustomerMode).await?;
                Ok(BotReply::new(
                    t_args_lang("customer-welcome", &[("name", &event.display_name())], lang),
                    customer_keyboard(),
                ))
            }
            _ => Ok(self.start_menu(event)),
        }
    }

    async fn handle_manager_code(
        &self,
        dialogue: &ChatDialogue,
        event: &ChatEvent,
        text: &str,
    ) -> Result<BotReply> {
        let lang = event.language();
        let accepted = self.registry.lock().await.contains(text);

        if accepted {
            info!(chat_id = %event.chat_id, "Manager authenticated");
            dialogue.update(ConversationState::ManagerAuthenticated).await?;
            Ok(BotReply::new(
                t_lang("manager-code-accepted", lang),
                manager_keyboard(),
            ))
        } else {
            info!(chat_id = %event.chat_id, "Manager code rejected");
            dialogue.update(ConversationState::Start).await?;
            Ok(BotReply::new(
                t_lang("manager-code-rejected", lang),
                main_keyboard(),
            ))
        }
    }

    async fn handle_customer(
        &self,
        dialogue: &ChatDialogue,
        event: &ChatEvent,
        text: &str,
    ) -> Result<BotReply> {
        let lang = event.language();
        match text {
            LABEL_ORDER_INFO => Ok(BotReply::new(
                t_lang("customer-order-info", lang),
                customer_keyboard(),
            )),
            LABEL_LAUNCH_APP => Ok(self.web_app_reply(event)),
            LABEL_BACK => {
                dialogue.update(ConversationState::Start).await?;
                Ok(self.start_menu(event))
            }
            _ => Ok(BotReply::new(
                t_lang("customer-hint", lang),
                customer_keyboard(),
            )),
        }
    }

    async fn handle_manager(
        &self,
        dialogue: &ChatDialogue,
        event: &ChatEvent,
        text: &str,
    ) -> Result<BotReply> {
        let lang = event.language();
        match text {
            LABEL_ENTER_USER => {
                dialogue.update(ConversationState::WaitingForFullName).await?;
                Ok(BotReply::new(
                    t_lang("user-name-prompt", lang),
                    KeyboardSpec::Remove,
                ))
            }
            LABEL_SHOW_USERS => {
                let recent = self.users.recent(USERS_PAGE_SIZE);
                Ok(BotReply::new(
                    format_users_list(&recent, self.users.len(), lang),
                    manager_keyboard(),
                ))
            }
            LABEL_CHECK_ORDERS => {
                let orders = self.orders.clone();
                let text = match tokio::task::spawn_blocking(move || orders.list()).await? {
                    Ok(orders) => format_orders_summary(&orders, lang),
                    Err(e) => {
                        error!(chat_id = %event.chat_id, error = %e, "Failed to load orders");
                        t_lang("orders-load-failed", lang)
                    }
                };
                Ok(BotReply::new(text, manager_keyboard()))
            }
            LABEL_LOGOUT => {
                info!(chat_id = %event.chat_id, "Manager logged out");
                dialogue.update(ConversationState::Start).await?;
                Ok(BotReply::new(t_lang("manager-logout", lang), main_keyboard()))
            }
            _ => Ok(BotReply::new(t_lang("manager-hint", lang), manager_keyboard())),
        }
    }

    async fn handle_full_name(
        &self,
        dialogue: &ChatDialogue,
        event: &ChatEvent,
        text: &str,
    ) -> Result<BotReply> {
        let lang = event.language();
        match validate_full_name(text) {
            Ok(full_name) => {
                dialogue
                    .update(ConversationState::WaitingForBirthDate {
                        pending: PendingInput { full_name },
                    })
                    .await?;
                Ok(BotReply::text(t_lang("birth-date-prompt", lang)))
            }
            Err("too_long") => Ok(BotReply::text(t_lang("user-name-too-long", lang))),
            Err(_) => Ok(BotReply::text(t_lang("user-name-empty", lang))),
        }
    }

    async fn handle_birth_date(
        &self,
        dialogue: &ChatDialogue,
        event: &ChatEvent,
        text: &str,
        pending: PendingInput,
    ) -> Result<BotReply> {
        let lang = event.language();
        let Some(birth_date) = parse_birth_date(text) else {
            return Ok(BotReply::text(t_lang("birth-date-invalid", lang)));
        };

        let user = match StoredUser::new(&pending.full_name, birth_date, Local::now().date_naive()) {
            Ok(user) => user,
            Err(IntakeError::Validation(_)) => {
                return Ok(BotReply::text(t_lang("birth-date-future", lang)));
            }
            Err(e) => return Err(e.into()),
        };

        let users = self.users.clone();
        let record = user.clone();
        let reply_text = match tokio::task::spawn_blocking(move || users.add(record)).await? {
            Ok(()) => {
                info!(chat_id = %event.chat_id, "Stored new user");
                t_args_lang(
                    "user-saved",
                    &[
                        ("name", &html::escape(&user.full_name)),
                        ("birth_date", &user.birth_date.format("%d.%m.%Y").to_string()),
                    ],
                    lang,
                )
            }
            Err(e) => {
                error!(chat_id = %event.chat_id, error = %e, "Failed to store user");
                t_lang("user-save-failed", lang)
            }
        };

        dialogue.update(ConversationState::ManagerAuthenticated).await?;
        Ok(BotReply::new(reply_text, manager_keyboard()))
    }
}
