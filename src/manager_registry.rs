//! # Manager Registry Module
//!
//! Holds the set of access codes that unlock the manager branch of the
//! conversation. The set is persisted as a JSON array of strings.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::intake_errors::{IntakeError, IntakeResult};
use crate::persistence::{read_json, write_json};

/// Length of a manager access code
pub const MANAGER_CODE_LEN: usize = 10;

/// Codes written on first start when no registry file exists
pub const SEED_CODES: [&str; 5] = [
    "1234567890",
    "0987654321",
    "1111111111",
    "2222222222",
    "3333333333",
];

/// Codes used when the registry file exists but cannot be read
pub const FALLBACK_CODES: [&str; 2] = ["1234567890", "0987654321"];

/// Registry shared between the bot handlers
pub type SharedManagerRegistry = Arc<Mutex<ManagerRegistry>>;

/// Check that a code consists of exactly ten ASCII digits
pub fn validate_manager_code(code: &str) -> IntakeResult<&str> {
    let code = code.trim();
    if code.len() == MANAGER_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(code)
    } else {
        Err(IntakeError::Validation(format!(
            "manager code must be {MANAGER_CODE_LEN} digits"
        )))
    }
}

#[derive(Debug)]
pub struct ManagerRegistry {
    path: PathBuf,
    codes: BTreeSet<String>,
}

impl ManagerRegistry {
    /// Load the registry from `path`.
    ///
    /// - missing file: seed [`SEED_CODES`] and persist them right away
    /// - unreadable file: fall back to [`FALLBACK_CODES`] without touching it
    /// - existing file: used as-is, never rewritten by loading
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        match read_json::<Vec<String>>(&path) {
            Ok(Some(codes)) => {
                let registry = Self {
                    codes: codes.into_iter().collect(),
                    path,
                };
                info!(count = registry.len(), "Loaded manager codes");
                registry
            }
            Ok(None) => {
                let registry = Self::with_codes(path, &SEED_CODES);
                if let Err(e) = registry.save() {
                    error!(error = %e, "Failed to persist seeded manager codes");
                }
                info!(count = registry.len(), "Seeded default manager codes");
                registry
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load manager codes, using fallback");
                Self::with_codes(path, &FALLBACK_CODES)
            }
        }
    }

    fn with_codes(path: PathBuf, codes: &[&str]) -> Self {
        Self {
            path,
            codes: codes.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Load the registry and wrap it for sharing across tasks
    pub fn load_shared(path: impl Into<PathBuf>) -> SharedManagerRegistry {
        Arc::new(Mutex::new(Self::load(path)))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code.trim())
    }

    /// Insert a code and persist the registry.
    ///
    /// Returns `Ok(false)` when the code was already present; nothing is
    /// written in that case. A failed write leaves the registry unchanged.
    pub fn add(&mut self, code: &str) -> IntakeResult<bool> {
        let code = validate_manager_code(code)?;
        if !self.codes.insert(code.to_string()) {
            return Ok(false);
        }
        if let Err(e) = self.save() {
            self.codes.remove(code);
            return Err(e);
        }
        info!(code = %code, "Added manager code");
        Ok(true)
    }

    pub fn save(&self) -> IntakeResult<()> {
        let codes: Vec<&String> = self.codes.iter().collect();
        write_json(&self.path, &codes)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_code_validation() {
        assert!(validate_manager_code("1234567890").is_ok());
        assert!(validate_manager_code(" 1234567890 ").is_ok());
        assert!(validate_manager_code("123456789").is_err());
        assert!(validate_manager_code("12345678901").is_err());
        assert!(validate_manager_code("12345abcde").is_err());
        assert!(validate_manager_code("-123456789").is_err());
    }
}
