//! SQLite-backed credential store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::CredentialStore;
use crate::models::User;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                token TEXT,
                history_id INTEGER NOT NULL DEFAULT 0
            );
            "#,
        ),
    ])
}

/// SQLite implementation of CredentialStore
///
/// Each write is a single UPDATE, so a token or checkpoint is either fully
/// replaced or left as it was.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {:?}", parent)
            })?;
        }
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL keeps readers unblocked while a sync pass commits its checkpoint
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    fn find_user(&self, clause: &str, param: &dyn rusqlite::ToSql) -> Result<Option<User>> {
        let conn = self.conn()?;
        let sql = format!("SELECT id, email, token, history_id FROM users WHERE {clause}");
        let row = conn
            .query_row(&sql, [param], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .optional()?;

        row.map(|(id, email, token, history_id)| {
            Ok(User {
                id,
                email,
                token,
                history_id: u64::try_from(history_id)
                    .with_context(|| format!("negative history_id stored for user {}", id))?,
            })
        })
        .transpose()
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        self.find_user("id = ?1", &id)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_user("email = ?1", &email)
    }

    fn set_token(&self, id: i64, token: &str) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET token = ?1 WHERE id = ?2",
            params![token, id],
        )?;
        Ok(updated == 1)
    }

    fn set_checkpoint(&self, id: i64, history_id: u64) -> Result<bool> {
        let history_id =
            i64::try_from(history_id).context("history_id does not fit in an SQLite integer")?;
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET history_id = ?1 WHERE id = ?2",
            params![history_id, id],
        )?;
        Ok(updated == 1)
    }

    fn insert_user(&self, mut user: User) -> Result<User> {
        let history_id =
            i64::try_from(user.history_id).context("history_id does not fit in an SQLite integer")?;
        let conn = self.conn()?;
        if user.id == 0 {
            conn.execute(
                "INSERT INTO users (email, token, history_id) VALUES (?1, ?2, ?3)",
                params![user.email, user.token, history_id],
            )
            .with_context(|| format!("Failed to insert user {}", user.email))?;
            user.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "INSERT INTO users (id, email, token, history_id) VALUES (?1, ?2, ?3, ?4)",
                params![user.id, user.email, user.token, history_id],
            )
            .with_context(|| format!("Failed to insert user {}", user.email))?;
        }
        Ok(user)
    }
}
