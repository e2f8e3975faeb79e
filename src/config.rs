//! Application configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TELEGRAM_BOT_TOKEN` - Bot API token
//!
//! ## Optional
//! - `MANAGERS_FILE` - Manager code registry (default: managers.json)
//! - `USERS_FILE` - Users entered by managers (default: data/users.json)
//! - `ORDER_STORE_DIR` - Persisted orders (default: data/orders)
//! - `ORDERS_INBOX_DIR` - Directory scanned for exported orders (default: Orders)
//! - `ORDER_TEMPLATE_PATH` - Sample export written on first start (default: order_template.json)
//! - `WEB_BIND_ADDR` - Order form listener (default: 127.0.0.1:8080)
//! - `WEB_PAGES_DIR` - Directory holding form.html and success.html (default: .)
//! - `WEB_APP_URL` - Web app opened from the bot (default: https://quaxww.github.io/)
//! - `ORDERS_SCAN_INTERVAL_SECS` - Inbox rescan period, 0 disables it (default: 0)
//! - `CONSOLE_ENABLED` - Read operator commands from stdin (default: true)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Order intake application configuration.
///
/// Implements `Debug` manually to redact the bot token.
#[derive(Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub managers_file: PathBuf,
    pub users_file: PathBuf,
    pub order_store_dir: PathBuf,
    pub orders_inbox_dir: PathBuf,
    pub order_template_path: PathBuf,
    pub web_bind_addr: SocketAddr,
    pub web_pages_dir: PathBuf,
    pub web_app_url: String,
    /// `None` when periodic inbox scanning is disabled
    pub scan_interval: Option<Duration>,
    pub console_enabled: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bot_token", &"[REDACTED]")
            .field("managers_file", &self.managers_file)
            .field("users_file", &self.users_file)
            .field("order_store_dir", &self.order_store_dir)
            .field("orders_inbox_dir", &self.orders_inbox_dir)
            .field("order_template_path", &self.order_template_path)
            .field("web_bind_addr", &self.web_bind_addr)
            .field("web_pages_dir", &self.web_pages_dir)
            .field("web_app_url", &self.web_app_url)
            .field("scan_interval", &self.scan_interval)
            .field("console_enabled", &self.console_enabled)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenv::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the bot token is missing or a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".to_string()))?;

        let web_bind_addr = get_or_default("WEB_BIND_ADDR", "127.0.0.1:8080")
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("WEB_BIND_ADDR".to_string(), e.to_string()))?;

        let web_app_url = get_or_default("WEB_APP_URL", "https://quaxww.github.io/");
        url::Url::parse(&web_app_url)
            .map_err(|e| ConfigError::InvalidEnvVar("WEB_APP_URL".to_string(), e.to_string()))?;

        let scan_secs = get_or_default("ORDERS_SCAN_INTERVAL_SECS", "0")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("ORDERS_SCAN_INTERVAL_SECS".to_string(), e.to_string())
            })?;

        let console_enabled = parse_bool(&get_or_default("CONSOLE_ENABLED", "true"))
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "CONSOLE_ENABLED".to_string(),
                    "expected true or false".to_string(),
                )
            })?;

        Ok(Self {
            bot_token,
            managers_file: get_or_default("MANAGERS_FILE", "managers.json").into(),
            users_file: get_or_default("USERS_FILE", "data/users.json").into(),
            order_store_dir: get_or_default("ORDER_STORE_DIR", "data/orders").into(),
            orders_inbox_dir: get_or_default("ORDERS_INBOX_DIR", "Orders").into(),
            order_template_path: get_or_default("ORDER_TEMPLATE_PATH", "order_template.json").into(),
            web_bind_addr,
            web_pages_dir: get_or_default("WEB_PAGES_DIR", ".").into(),
            web_app_url,
            scan_interval: (scan_secs > 0).then(|| Duration::from_secs(scan_secs)),
            console_enabled,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(config.managers_file, PathBuf::from("managers.json"));
        assert_eq!(config.orders_inbox_dir, PathBuf::from("Orders"));
        assert_eq!(config.web_bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.web_app_url, "https://quaxww.github.io/");
        assert!(config.scan_interval.is_none());
        assert!(config.console_enabled);
    }

    #[test]
    fn test_missing_token() {
        assert!(matches!(
            config_from(&[]),
            Err(ConfigError::MissingEnvVar(key)) if key == "TELEGRAM_BOT_TOKEN"
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[("TELEGRAM_BOT_TOKEN", "t"), ("WEB_BIND_ADDR", "localhost")]).is_err());
        assert!(config_from(&[("TELEGRAM_BOT_TOKEN", "t"), ("CONSOLE_ENABLED", "maybe")]).is_err());
        let config = config_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ORDERS_SCAN_INTERVAL_SECS", "30"),
            ("CONSOLE_ENABLED", "off"),
        ])
        .unwrap();
        assert_eq!(config.scan_interval, Some(Duration::from_secs(30)));
        assert!(!config.console_enabled);
    }

    #[test]
    fn test_token_redacted() {
        let config = config_from(&[("TELEGRAM_BOT_TOKEN", "123:secret")]).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
