//! UI Builder module for creating keyboards and formatting messages

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, KeyboardRemove,
    ReplyMarkup, WebAppInfo,
};
use teloxide::utils::html;

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::persistence::StoredOrder;
use crate::users::StoredUser;

// Menu labels. Incoming text is matched against these verbatim.
pub const LABEL_START: &str = "🚀 Старт";
pub const LABEL_LOGIN_MANAGER: &str = "👨‍💼 Войти как менеджер";
pub const LABEL_LOGIN_CUSTOMER: &str = "👤 Войти как заказчик";
pub const LABEL_ORDER_INFO: &str = "📊 Информация о заказе";
pub const LABEL_LAUNCH_APP: &str = "📱 Запустить приложение";
pub const LABEL_BACK: &str = "🔙 Назад";
pub const LABEL_ENTER_USER: &str = "📝 Ввести данные пользователя";
pub const LABEL_SHOW_USERS: &str = "📊 Показать всех пользователей";
pub const LABEL_CHECK_ORDERS: &str = "📋 Проверить данные заказов";
pub const LABEL_LOGOUT: &str = "🚪 Выйти из режима менеджера";

/// Number of users shown by the user listing
pub const USERS_PAGE_SIZE: usize = 10;
/// Number of latest orders shown by the order summary
pub const RECENT_ORDERS: usize = 5;

/// Transport-independent description of the keyboard attached to a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardSpec {
    /// Leave the current keyboard as it is
    None,
    /// Hide the reply keyboard
    Remove,
    /// Reply keyboard made of rows of button labels
    Buttons(Vec<Vec<String>>),
    /// Single inline button opening the web app
    WebApp { url: String, label: String },
}

impl KeyboardSpec {
    /// Labels of a reply keyboard, row by row
    pub fn button_rows(&self) -> Option<&[Vec<String>]> {
        match self {
            KeyboardSpec::Buttons(rows) => Some(rows),
            _ => None,
        }
    }
}

/// A reply produced by the conversation, rendered as HTML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReply {
    pub text: String,
    pub keyboard: KeyboardSpec,
}

impl BotReply {
    pub fn new(text: impl Into<String>, keyboard: KeyboardSpec) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }

    /// Reply that keeps the current keyboard
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text, KeyboardSpec::None)
    }
}

fn rows(labels: &[&[&str]]) -> KeyboardSpec {
    KeyboardSpec::Buttons(
        labels
            .iter()
            .map(|row| row.iter().map(|label| label.to_string()).collect())
            .collect(),
    )
}

/// Keyboard with the single "Start" button
pub fn main_keyboard() -> KeyboardSpec {
    rows(&[&[LABEL_START]])
}

/// Keyboard offering the manager and customer roles
pub fn role_selection_keyboard() -> KeyboardSpec {
    rows(&[&[LABEL_LOGIN_MANAGER, LABEL_LOGIN_CUSTOMER]])
}

pub fn customer_keyboard() -> KeyboardSpec {
    rows(&[&[LABEL_ORDER_INFO, LABEL_LAUNCH_APP], &[LABEL_BACK]])
}

pub fn manager_keyboard() -> KeyboardSpec {
    rows(&[
        &[LABEL_ENTER_USER, LABEL_SHOW_USERS],
        &[LABEL_CHECK_ORDERS, LABEL_LOGOUT],
    ])
}

/// Inline button that opens the web app
pub fn web_app_keyboard(url: &str, language_code: Option<&str>) -> KeyboardSpec {
    KeyboardSpec::WebApp {
        url: url.to_string(),
        label: t_lang("web-app-button", language_code),
    }
}

/// Convert a keyboard description into Telegram reply markup
pub fn to_reply_markup(keyboard: &KeyboardSpec) -> Result<Option<ReplyMarkup>> {
    let markup = match keyboard {
        KeyboardSpec::None => return Ok(None),
        KeyboardSpec::Remove => ReplyMarkup::KeyboardRemove(KeyboardRemove::new()),
        KeyboardSpec::Buttons(rows) => {
            let buttons = rows
                .iter()
                .map(|row| row.iter().map(KeyboardButton::new).collect::<Vec<_>>());
            ReplyMarkup::Keyboard(KeyboardMarkup::new(buttons).resize_keyboard())
        }
        KeyboardSpec::WebApp { url, label } => {
            let url = url::Url::parse(url).with_context(|| format!("Invalid web app URL: {url}"))?;
            let button = InlineKeyboardButton::web_app(label.clone(), WebAppInfo { url });
            ReplyMarkup::InlineKeyboard(InlineKeyboardMarkup::new(vec![vec![button]]))
        }
    };
    Ok(Some(markup))
}

/// Format the most recent users, newest first
pub fn format_users_list(
    users: &[StoredUser],
    total: usize,
    language_code: Option<&str>,
) -> String {
    if users.is_empty() {
        return t_lang("users-empty", language_code);
    }

    let mut result = t_lang("users-title", language_code);
    result.push_str("\n\n");

    let lines: Vec<String> = users
        .iter()
        .map(|user| {
            format!(
                "👤 {} | 🎂 {} | 📅 {}",
                html::escape(&user.full_name),
                user.birth_date.format("%d.%m.%Y"),
                user.created_at.format("%d.%m.%Y")
            )
        })
        .collect();
    result.push_str(&lines.join("\n"));

    if total > users.len() {
        result.push_str("\n\n");
        result.push_str(&t_args_lang(
            "users-more",
            &[("count", &(total - users.len()).to_string())],
            language_code,
        ));
    }

    result
}

/// Summarise the stored orders: count, grand total and the latest few
pub fn format_orders_summary(orders: &[StoredOrder], language_code: Option<&str>) -> String {
    if orders.is_empty() {
        return t_lang("orders-empty", language_code);
    }

    let grand_total: Decimal = orders.iter().map(|o| o.order.total_amount).sum();
    let mut result = t_args_lang(
        "orders-summary",
        &[
            ("count", &orders.len().to_string()),
            ("total", &grand_total.to_string()),
        ],
        language_code,
    );

    result.push_str("\n\n");
    result.push_str(&t_lang("orders-recent-title", language_code));
    for stored in orders.iter().rev().take(RECENT_ORDERS) {
        let name = stored.order.customer.full_name.trim();
        let name = if name.is_empty() { "—" } else { name };
        result.push_str(&format!(
            "\n#{} · {} · {} ₽ · {}",
            stored.id,
            html::escape(name),
            stored.order.total_amount,
            stored.received_at.format("%d.%m.%Y")
        ));
    }

    result
}
