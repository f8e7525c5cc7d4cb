//! In-memory credential store, used by tests and short-lived tools

use anyhow::{Result, anyhow, bail};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::CredentialStore;
use crate::models::User;

#[derive(Default)]
struct Inner {
    users: HashMap<i64, User>,
    next_id: i64,
}

/// In-memory implementation of CredentialStore
pub struct InMemoryCredentialStore {
    inner: RwLock<Inner>,
}

impl InMemoryCredentialStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                users: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("credential store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("credential store lock poisoned"))
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn set_token(&self, id: i64, token: &str) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.users.get_mut(&id) {
            Some(user) => {
                user.token = Some(token.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_checkpoint(&self, id: i64, history_id: u64) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.users.get_mut(&id) {
            Some(user) => {
                user.history_id = history_id;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_user(&self, mut user: User) -> Result<User> {
        let mut inner = self.write()?;
        if inner
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            bail!("a user with email {} already exists", user.email);
        }

        if user.id == 0 {
            user.id = inner.next_id;
        } else if inner.users.contains_key(&user.id) {
            bail!("a user with id {} already exists", user.id);
        }
        inner.next_id = inner.next_id.max(user.id.saturating_add(1));
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_assigns_ids() {
        let store = InMemoryCredentialStore::new();
        let a = store.insert_user(User::new("a@example.com")).unwrap();
        let b = store.insert_user(User::new("b@example.com")).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn test_insert_keeps_explicit_id() {
        let store = InMemoryCredentialStore::new();
        store.insert_user(User::with_id(42, "a@example.com")).unwrap();
        let next = store.insert_user(User::new("b@example.com")).unwrap();
        assert_eq!(next.id, 43);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let store = InMemoryCredentialStore::new();
        store.insert_user(User::new("a@example.com")).unwrap();
        assert!(store.insert_user(User::new("A@example.com")).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = InMemoryCredentialStore::new();
        store
            .insert_user(User::with_id(7, "a@example.com").with_history_id(10))
            .unwrap();
        assert!(store.insert_user(User::with_id(7, "b@example.com")).is_err());

        let kept = store.find_user_by_id(7).unwrap().unwrap();
        assert_eq!(kept.email, "a@example.com");
        assert_eq!(kept.history_id, 10);
        assert!(store.find_user_by_email("b@example.com").unwrap().is_none());
    }

    #[test]
    fn test_find_by_email_case_insensitive() {
        let store = InMemoryCredentialStore::new();
        let user = store.insert_user(User::new("User@Example.com")).unwrap();
        let found = store.find_user_by_email("user@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[test]
    fn test_set_token_and_checkpoint() {
        let store = InMemoryCredentialStore::new();
        let user = store.insert_user(User::new("a@example.com")).unwrap();

        assert!(store.set_token(user.id, r#"{"access_token":"x"}"#).unwrap());
        assert!(store.set_checkpoint(user.id, 500).unwrap());

        let loaded = store.find_user_by_id(user.id).unwrap().unwrap();
        assert_eq!(loaded.token.as_deref(), Some(r#"{"access_token":"x"}"#));
        assert_eq!(loaded.history_id, 500);
    }

    #[test]
    fn test_writes_to_missing_user_return_false() {
        let store = InMemoryCredentialStore::new();
        assert!(!store.set_token(9, "t").unwrap());
        assert!(!store.set_checkpoint(9, 1).unwrap());
    }
}
