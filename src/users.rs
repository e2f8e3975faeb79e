//! # Stored Users Module
//!
//! Users entered by managers through the guided dialogue, persisted as a
//! JSON array.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::intake_errors::{IntakeError, IntakeResult};
use crate::persistence::{read_json, write_json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub created_at: DateTime<Local>,
}

impl StoredUser {
    /// Build a user record, rejecting birth dates after `today`
    pub fn new(full_name: &str, birth_date: NaiveDate, today: NaiveDate) -> IntakeResult<Self> {
        if birth_date > today {
            return Err(IntakeError::Validation(
                "birth date cannot be in the future".to_string(),
            ));
        }
        Ok(Self {
            full_name: full_name.trim().to_string(),
            birth_date,
            created_at: Local::now(),
        })
    }
}

#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    users: Mutex<Vec<StoredUser>>,
}

impl UserStore {
    /// Load users from `path`; a missing or unreadable file yields an empty store
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let users = match read_json::<Vec<StoredUser>>(&path) {
            Ok(users) => users.unwrap_or_default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load stored users, starting empty");
                Vec::new()
            }
        };
        info!(count = users.len(), "Loaded stored users");
        Self {
            path,
            users: Mutex::new(users),
        }
    }

    /// Append a user and persist the whole list.
    ///
    /// The in-memory list is left unchanged when the write fails.
    pub fn add(&self, user: StoredUser) -> IntakeResult<()> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.push(user);
        if let Err(e) = write_json(&self.path, users.as_slice()) {
            users.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Most recently created users first
    pub fn recent(&self, limit: usize) -> Vec<StoredUser> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sorted = users.clone();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sorted.truncate(limit);
        sorted
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_future_birth_date_rejected() {
        let today = date(2024, 1, 15);
        assert!(StoredUser::new("Иванов", date(2024, 1, 16), today).is_err());
        assert!(StoredUser::new("Иванов", date(2024, 1, 15), today).is_ok());
    }

    #[test]
    fn test_users_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");

        let store = UserStore::load(&path);
        assert!(store.is_empty());
        store
            .add(StoredUser::new(" Петров Пётр ", date(1990, 5, 15), date(2024, 1, 1)).unwrap())
            .unwrap();

        let reloaded = UserStore::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.recent(10)[0].full_name, "Петров Пётр");
    }
}
