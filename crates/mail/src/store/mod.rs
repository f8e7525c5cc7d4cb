//! Credential store adapters
//!
//! The sync engine only borrows user records: it reads the stored token and
//! checkpoint and writes them back through [`CredentialStore`]. Two backends
//! are provided, an in-memory one for tests and a SQLite one for the CLI.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryCredentialStore;
pub use sqlite::SqliteCredentialStore;
pub use traits::CredentialStore;
