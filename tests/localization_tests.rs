//! # Localization Tests
//!
//! This module contains unit tests for the localization functionality,
//! testing message retrieval, language resolution and argument formatting.

use order_intake::localization::{t_args_lang, t_lang, LocalizationManager};
use std::collections::HashMap;

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        // Create a new localization manager for each test
        LocalizationManager::new().expect("Failed to create localization manager")
    }

    fn message_keys(source: &str) -> Vec<&str> {
        source
            .lines()
            .filter(|line| !line.starts_with([' ', '#']) && line.contains(" ="))
            .filter_map(|line| line.split(" =").next())
            .collect()
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("help-general", "en", None);
        assert!(message.contains("/start"));
        assert!(message.contains("/addmanager"));
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("nonexistent-key", "en", None);
        assert!(message.starts_with("Missing translation:"));
    }

    #[test]
    fn test_unsupported_language_falls_back_to_russian() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("command-test", "de", None);
        let russian = manager.get_message_in_language("command-test", "ru", None);
        assert_eq!(message, russian);
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let mut args = HashMap::new();
        args.insert("name", "Иванов Иван");
        args.insert("birth_date", "15.05.1990");

        let message = manager.get_message_in_language("user-saved", "ru", Some(&args));
        assert!(message.contains("Иванов Иван"));
        assert!(message.contains("15.05.1990"));
        // No bidi isolation marks around placeholders
        assert!(!message.contains('\u{2068}'));
    }

    #[test]
    fn test_language_resolution() {
        let manager = setup_localization();

        assert_eq!(manager.resolve_language(Some("en")), "en");
        assert_eq!(manager.resolve_language(Some("en-US")), "en");
        assert_eq!(manager.resolve_language(Some("RU")), "ru");
        assert_eq!(manager.resolve_language(Some("fr")), "ru");
        assert_eq!(manager.resolve_language(None), "ru");
    }

    #[test]
    fn test_every_message_is_translated() {
        let manager = setup_localization();
        let russian = include_str!("../locales/ru/main.ftl");
        let english = include_str!("../locales/en/main.ftl");

        assert_eq!(message_keys(russian), message_keys(english));
        for key in message_keys(russian) {
            let message = manager.get_message_in_language(key, "en", None);
            assert!(!message.starts_with("Missing"), "{key} has no English text");
        }
    }

    #[test]
    fn test_convenience_functions() {
        let message = t_lang("command-unknown", Some("en"));
        assert!(message.contains("/help"));

        let message_with_args = t_args_lang("users-more", &[("count", "3")], Some("en"));
        assert!(message_with_args.contains('3'));
    }
}
