//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `dialogue_manager`: the conversation state machine
//! - `command_handler`: slash commands available in every state
//! - `message_handler`: turns Telegram messages into replies
//! - `callback_handler`: acknowledges inline keyboard callback queries
//! - `ui_builder`: creates keyboards and formats messages

pub mod callback_handler;
pub mod command_handler;
pub mod dialogue_manager;
pub mod message_handler;
pub mod ui_builder;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

pub use command_handler::Command;
pub use dialogue_manager::{ChatEvent, ConversationMachine};
pub use ui_builder::{BotReply, KeyboardSpec};
