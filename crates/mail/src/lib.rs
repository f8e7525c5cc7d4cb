//! Mailsync - incremental Gmail sync engine
//!
//! Given a registered user and a new checkpoint (a Gmail historyId, usually
//! taken from a push notification), a sync pass fetches every message added
//! since the user's stored checkpoint, resolves bodies and attachments, and
//! advances the checkpoint only when the whole batch succeeded.
//!
//! This crate provides:
//! - User records and OAuth2 credentials (models, store)
//! - Token lifecycle: consent URL, code exchange, refresh (gmail::TokenManager)
//! - Gmail API client behind the `MailProvider` seam
//! - History paging, message resolution and the sync orchestrator
//! - Pub/Sub push notification decoding
//!
//! All network I/O is synchronous (ureq). Async callers should run a pass on
//! a blocking thread.

pub mod config;
pub mod error;
pub mod gmail;
pub mod models;
pub mod notification;
pub mod store;
pub mod sync;

pub use config::{GmailCredentials, SyncSettings};
pub use error::{AuthError, SyncError};
pub use gmail::{
    AuthHandle, GmailClient, GmailClientFactory, GoogleTokenEndpoint, HistoryExpiredError,
    MailProvider, OAuthClient, ProviderFactory, TokenEndpoint, TokenManager, http_agent,
};
pub use models::{Attachment, Credential, MailObject, SENTINEL_TOKEN, TokenResponse, User};
pub use notification::PushNotification;
pub use store::{CredentialStore, InMemoryCredentialStore, SqliteCredentialStore};
pub use sync::{
    ResolveStats, SyncOrchestrator, SyncOutcome, SyncPhase, SyncReport, list_changes_since,
    resolve_all,
};
