//! Annotator accounts, loaded once at startup from a JSON file:
//!
//! ```json
//! [
//!   { "username": "alice", "password_hash": "$argon2id$...", "role": "annotator" },
//!   { "username": "lead", "password_hash": "$argon2id$...", "role": "admin" }
//! ]
//! ```

use std::collections::HashMap;
use std::path::Path;

use annotator_core::error::CoreError;
use serde::Deserialize;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_ANNOTATOR: &str = "annotator";

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub username: String,
    pub password_hash: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    ROLE_ANNOTATOR.to_string()
}

#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<String, UserEntry>,
}

impl UserDirectory {
    pub fn new(entries: Vec<UserEntry>) -> Result<Self, CoreError> {
        let mut users = HashMap::with_capacity(entries.len());
        for entry in entries {
            if entry.username.trim().is_empty() {
                return Err(CoreError::Validation("Username must not be empty".into()));
            }
            if entry.role != ROLE_ADMIN && entry.role != ROLE_ANNOTATOR {
                return Err(CoreError::Validation(format!(
                    "Invalid role '{}' for user '{}'. Must be one of: admin, annotator",
                    entry.role, entry.username
                )));
            }
            if users.contains_key(&entry.username) {
                return Err(CoreError::Validation(format!(
                    "Duplicate user '{}'",
                    entry.username
                )));
            }
            users.insert(entry.username.clone(), entry);
        }
        Ok(Self { users })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let entries: Vec<UserEntry> = serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid users file: {e}")))?;
        Self::new(entries)
    }

    pub async fn load(path: &Path) -> Result<Self, CoreError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            CoreError::Internal(format!("Cannot read users file {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn find(&self, username: &str) -> Option<&UserEntry> {
        self.users.get(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
