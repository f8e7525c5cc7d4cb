//! Storage trait definitions

use crate::models::User;
use anyhow::Result;

/// Per-user token and checkpoint persistence
///
/// Writes return `Ok(false)` when no user with the given id exists; `Err`
/// is reserved for backend failures.
pub trait CredentialStore: Send + Sync {
    /// Look up a user by primary key
    fn find_user_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Look up a user by email address (case-insensitive)
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Replace the serialized token of a user in a single write
    fn set_token(&self, id: i64, token: &str) -> Result<bool>;

    /// Replace the checkpoint (historyId) of a user
    fn set_checkpoint(&self, id: i64, history_id: u64) -> Result<bool>;

    /// Register a user, assigning an id when `user.id` is 0
    fn insert_user(&self, user: User) -> Result<User>;
}
