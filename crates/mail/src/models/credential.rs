//! OAuth token material persisted per user

use serde::{Deserialize, Serialize};

/// Stored-token value meaning "no valid authorization yet"
pub const SENTINEL_TOKEN: &str = " ";

/// Refresh this many seconds before the access token actually expires
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Whether a stored token value denotes an unauthorized user
///
/// Absent, empty and whitespace-only values (the legacy sentinel is a single
/// space) all count as unauthorized.
pub fn is_sentinel(token: Option<&str>) -> bool {
    token.is_none_or(|t| t.trim().is_empty())
}

/// Token response from the OAuth token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

/// Deserialized OAuth credential for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) after which the access token is invalid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Milliseconds expiry written by older token serializers
    #[serde(default, skip_serializing)]
    expiry_date: Option<i64>,
}

impl Credential {
    /// Parse a serialized credential, accepting the legacy `expiry_date` field
    pub fn parse(serialized: &str) -> Result<Self, serde_json::Error> {
        let mut credential: Credential = serde_json::from_str(serialized)?;
        if credential.expires_at.is_none() {
            credential.expires_at = credential.expiry_date.map(|ms| ms / 1000);
        }
        credential.expiry_date = None;
        Ok(credential)
    }

    /// Build a credential from a token endpoint response received at `now`
    pub fn from_token_response(token: TokenResponse, now: i64) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|secs| now.saturating_add(i64::try_from(secs).unwrap_or(i64::MAX))),
            scope: token.scope,
            token_type: token.token_type,
            expiry_date: None,
        }
    }

    /// Merge a refresh response, keeping the old refresh token if none was returned
    pub fn refreshed(&self, token: TokenResponse, now: i64) -> Self {
        let mut next = Self::from_token_response(token, now);
        if next.refresh_token.is_none() {
            next.refresh_token = self.refresh_token.clone();
        }
        if next.scope.is_none() {
            next.scope = self.scope.clone();
        }
        next
    }

    /// Serialize for storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Whether the access token is expired (or about to be) at `now`
    ///
    /// Tokens without a known expiry are assumed valid.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now.saturating_add(EXPIRY_BUFFER_SECS))
    }
}
