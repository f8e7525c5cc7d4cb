//! Error types surfaced at component boundaries
//!
//! Adapters and the HTTP client work in `anyhow::Result` internally; the
//! token manager and the sync pass convert those into the typed failures
//! below so callers can tell "re-authorize" apart from "retry later".

use thiserror::Error;

/// Failures of the OAuth2 credential lifecycle
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no user with id {0}")]
    UserNotFound(i64),

    #[error("stored credential for user {user_id} could not be deserialized")]
    CredentialCorrupt {
        user_id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("authorization code exchange failed for user {user_id}")]
    ExchangeFailed {
        user_id: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("access token refresh failed for user {user_id}")]
    RefreshFailed {
        user_id: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("credential store error")]
    Store(#[source] anyhow::Error),
}

/// Terminal failures of a sync pass
///
/// Every variant means the stored checkpoint was left untouched, except
/// [`SyncError::CheckpointCommitFailed`] where the write itself failed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no user registered for {0}")]
    UserNotFound(String),

    #[error("{0} has not completed authorization")]
    Unauthorized(String),

    #[error("stored credential for {email} could not be deserialized")]
    CredentialCorrupt {
        email: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not refresh the access token for {email}")]
    TokenRefreshFailed {
        email: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to fetch history page starting at {start_history_id}")]
    PageFetchFailed {
        start_history_id: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to fetch message {message_id}")]
    MessageFetchFailed {
        message_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to fetch attachment {filename:?} of message {message_id}")]
    AttachmentFetchFailed {
        message_id: String,
        filename: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("message {message_id} has undecodable {what}")]
    Decode { message_id: String, what: String },

    #[error("failed to commit checkpoint {checkpoint} for user {user_id}")]
    CheckpointCommitFailed {
        user_id: i64,
        checkpoint: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("credential store error")]
    Store(#[source] anyhow::Error),
}

impl SyncError {
    /// Map a token-manager failure onto the sync taxonomy for `email`
    pub(crate) fn from_auth(email: &str, err: AuthError) -> Self {
        match err {
            AuthError::UserNotFound(_) => SyncError::UserNotFound(email.to_string()),
            AuthError::CredentialCorrupt { source, .. } => SyncError::CredentialCorrupt {
                email: email.to_string(),
                source,
            },
            AuthError::RefreshFailed { source, .. } | AuthError::ExchangeFailed { source, .. } => {
                SyncError::TokenRefreshFailed {
                    email: email.to_string(),
                    source,
                }
            }
            AuthError::Store(source) => SyncError::Store(source),
        }
    }

    /// Whether the user has to go through the authorization flow again
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            SyncError::Unauthorized(_)
                | SyncError::CredentialCorrupt { .. }
                | SyncError::TokenRefreshFailed { .. }
        )
    }
}
