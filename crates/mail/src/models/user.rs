//! User record as kept by the credential store

use serde::{Deserialize, Serialize};

use super::credential::{Credential, is_sentinel};

/// A registered user whose mailbox is synchronized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique integer identifier (database primary key)
    pub id: i64,
    /// Gmail address the push notifications are keyed on
    pub email: String,
    /// Serialized OAuth token; `None` or the sentinel means unauthorized
    pub token: Option<String>,
    /// Last fully synchronized Gmail historyId
    pub history_id: u64,
}

impl User {
    /// Create a new, unauthorized user (id will be assigned by the store)
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: 0,
            email: email.into(),
            token: None,
            history_id: 0,
        }
    }

    /// Create a user with a known ID (loaded from storage)
    pub fn with_id(id: i64, email: impl Into<String>) -> Self {
        Self {
            id,
            ..Self::new(email)
        }
    }

    /// Set the serialized token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the starting checkpoint
    pub fn with_history_id(mut self, history_id: u64) -> Self {
        self.history_id = history_id;
        self
    }

    /// Whether the stored token is absent or the sentinel value
    pub fn is_unauthorized(&self) -> bool {
        is_sentinel(self.token.as_deref())
    }

    /// Deserialize the stored credential
    ///
    /// Returns `Ok(None)` for the sentinel, `Err` if the token is corrupt.
    pub fn credential(&self) -> Result<Option<Credential>, serde_json::Error> {
        match self.token.as_deref() {
            Some(token) if !is_sentinel(Some(token)) => Credential::parse(token).map(Some),
            _ => Ok(None),
        }
    }
}
