//! Conversation dialogue module for handling per-chat state.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

/// Data collected while a manager enters a new user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInput {
    pub full_name: String,
}

/// Represents the conversation state of a chat
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationState {
    #[default]
    Start,
    CustomerMode,
    WaitingForManagerCode,
    ManagerAuthenticated,
    WaitingForFullName,
    WaitingForBirthDate {
        pending: PendingInput,
    },
}

impl ConversationState {
    /// Whether the chat is inside the manager branch
    pub fn is_manager(&self) -> bool {
        matches!(
            self,
            ConversationState::ManagerAuthenticated
                | ConversationState::WaitingForFullName
                | ConversationState::WaitingForBirthDate { .. }
        )
    }
}

/// Type alias for the conversation dialogue
pub type ChatDialogue = Dialogue<ConversationState, InMemStorage<ConversationState>>;

/// Validates a full name input
pub fn validate_full_name(name: &str) -> Result<String, &'static str> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err("empty");
    }

    if trimmed.chars().count() > 255 {
        return Err("too_long");
    }

    Ok(trimmed.to_string())
}

lazy_static! {
    // d.m.yy, dd.mm.yy, d.m.yyyy, dd.mm.yyyy
    static ref BIRTH_DATE_REGEX: Regex =
        Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{2}|\d{4})$").expect("Birth date pattern should be valid");
}

/// Two-digit years up to this value belong to the 2000s, the rest to the 1900s
const TWO_DIGIT_YEAR_PIVOT: i32 = 49;

/// Parse a `day.month.year` date with a two- or four-digit year
pub fn parse_birth_date(input: &str) -> Option<NaiveDate> {
    let caps = BIRTH_DATE_REGEX.captures(input.trim())?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year_text = &caps[3];
    let mut year: i32 = year_text.parse().ok()?;
    if year_text.len() == 2 {
        year += if year <= TWO_DIGIT_YEAR_PIVOT { 2000 } else { 1900 };
    }
    NaiveDate::from_ymd_opt(year, month, day)
}
