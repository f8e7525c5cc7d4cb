//! Gmail OAuth2 credential lifecycle
//!
//! Implements the authorization code flow for Gmail API access on behalf of
//! stored users: build the consent URL, exchange the returned code, persist
//! the token through the credential store, and refresh it when it expires.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use url::Url;

use crate::config::GmailCredentials;
use crate::error::AuthError;
use crate::models::{Credential, TokenResponse, User};
use crate::store::CredentialStore;

/// Read-only Gmail access
const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// The OAuth token endpoint operations
pub trait TokenEndpoint: Send + Sync {
    /// Exchange a one-time authorization code for tokens
    fn exchange_code(&self, credentials: &GmailCredentials, code: &str) -> Result<TokenResponse>;

    /// Obtain a new access token from a refresh token
    fn refresh(&self, credentials: &GmailCredentials, refresh_token: &str)
    -> Result<TokenResponse>;
}

/// Token endpoint backed by Google's OAuth2 server
#[derive(Clone)]
pub struct GoogleTokenEndpoint {
    agent: ureq::Agent,
}

impl GoogleTokenEndpoint {
    pub fn new(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl TokenEndpoint for GoogleTokenEndpoint {
    fn exchange_code(&self, credentials: &GmailCredentials, code: &str) -> Result<TokenResponse> {
        let mut response = self
            .agent
            .post(credentials.token_uri.as_str())
            .send_form([
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", credentials.redirect_uri.as_str()),
            ])
            .context("Failed to exchange authorization code")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")
    }

    fn refresh(
        &self,
        credentials: &GmailCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let mut response = self
            .agent
            .post(credentials.token_uri.as_str())
            .send_form([
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse refresh token response")
    }
}

/// OAuth client handle: the application descriptor plus, once authorized,
/// the user's credential
#[derive(Debug, Clone)]
pub struct OAuthClient {
    credentials: GmailCredentials,
    credential: Option<Credential>,
}

impl OAuthClient {
    /// Create an unauthorized client
    pub fn new(credentials: GmailCredentials) -> Self {
        Self {
            credentials,
            credential: None,
        }
    }

    /// Attach a user credential
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn credentials(&self) -> &GmailCredentials {
        &self.credentials
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn into_credential(self) -> Option<Credential> {
        self.credential
    }

    pub fn is_authorized(&self) -> bool {
        self.credential.is_some()
    }
}

/// Result of [`TokenManager::authorize`]
#[derive(Debug, Clone)]
pub struct AuthHandle {
    pub client: OAuthClient,
    /// `false` means the caller must run the interactive authorization flow
    pub authorized: bool,
}

/// Owns OAuth client construction and the stored-token lifecycle
#[derive(Clone)]
pub struct TokenManager {
    credentials: GmailCredentials,
    store: Arc<dyn CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
}

impl TokenManager {
    pub fn new(
        credentials: GmailCredentials,
        store: Arc<dyn CredentialStore>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            credentials,
            store,
            endpoint,
        }
    }

    /// A fresh, unauthorized client handle
    pub fn client(&self) -> OAuthClient {
        OAuthClient::new(self.credentials.clone())
    }

    /// Load a user's stored credential and rehydrate it into a client handle
    ///
    /// No provider call is made. A sentinel token yields an unauthorized
    /// handle; a token that cannot be deserialized is logged and reported as
    /// [`AuthError::CredentialCorrupt`].
    pub fn authorize(&self, user_id: i64) -> Result<AuthHandle, AuthError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .map_err(AuthError::Store)?
            .ok_or(AuthError::UserNotFound(user_id))?;
        self.rehydrate(&user)
    }

    /// Client handle for sending a user through consent again
    ///
    /// The consent URL never depends on the stored token, so a corrupt
    /// credential is logged and replaced by a fresh client instead of
    /// blocking re-authorization.
    pub fn authorize_for_consent(&self, user_id: i64) -> Result<AuthHandle, AuthError> {
        match self.authorize(user_id) {
            Err(AuthError::CredentialCorrupt { user_id, source }) => {
                warn!(
                    "[AUTH] Discarding corrupt credential of user {} for re-authorization: {}",
                    user_id, source
                );
                Ok(AuthHandle {
                    client: self.client(),
                    authorized: false,
                })
            }
            other => other,
        }
    }

    /// Rehydrate an already loaded user record
    pub fn rehydrate(&self, user: &User) -> Result<AuthHandle, AuthError> {
        match user.credential() {
            Ok(Some(credential)) => Ok(AuthHandle {
                client: self.client().with_credential(credential),
                authorized: true,
            }),
            Ok(None) => {
                debug!("[AUTH] User {} has no stored credential", user.id);
                Ok(AuthHandle {
                    client: self.client(),
                    authorized: false,
                })
            }
            Err(source) => {
                error!(
                    "[AUTH] Stored credential for user {} is corrupt: {}",
                    user.id, source
                );
                Err(AuthError::CredentialCorrupt {
                    user_id: user.id,
                    source,
                })
            }
        }
    }

    /// Build the consent URL for offline, read-only mail access
    ///
    /// `prompt=consent` makes Google issue a refresh token on every grant,
    /// not only the first one.
    pub fn authorization_url(&self, client: &OAuthClient) -> Url {
        let credentials = client.credentials();
        let mut url = credentials.auth_uri.clone();
        url.query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("scope", GMAIL_READONLY_SCOPE)
            .append_pair("response_type", "code")
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", &credentials.redirect_uri);
        url
    }

    /// Exchange an authorization code and persist the resulting token
    ///
    /// Succeeds only if the token was both issued and stored. A token that
    /// was issued but could not be stored is dropped.
    pub fn exchange_code(
        &self,
        user_id: i64,
        client: OAuthClient,
        code: &str,
    ) -> Result<OAuthClient, AuthError> {
        let token = self
            .endpoint
            .exchange_code(client.credentials(), code)
            .map_err(|source| {
                error!("[AUTH] Code exchange failed for user {}: {:#}", user_id, source);
                AuthError::ExchangeFailed { user_id, source }
            })?;

        let credential = Credential::from_token_response(token, Utc::now().timestamp());
        self.persist(user_id, &credential).map_err(|source| {
            error!(
                "[AUTH] Token issued for user {} but could not be stored: {:#}",
                user_id, source
            );
            AuthError::ExchangeFailed { user_id, source }
        })?;

        info!("[AUTH] Stored new credential for user {}", user_id);
        Ok(client.with_credential(credential))
    }

    /// Refresh the access token if it is expired, persisting the new one
    pub fn refresh_if_needed(
        &self,
        user_id: i64,
        credential: Credential,
    ) -> Result<Credential, AuthError> {
        self.refresh_if_needed_at(user_id, credential, Utc::now().timestamp())
    }

    /// [`TokenManager::refresh_if_needed`] against an explicit clock
    pub fn refresh_if_needed_at(
        &self,
        user_id: i64,
        credential: Credential,
        now: i64,
    ) -> Result<Credential, AuthError> {
        if !credential.is_expired(now) {
            return Ok(credential);
        }

        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            warn!(
                "[AUTH] Access token for user {} expired and no refresh token is stored",
                user_id
            );
            return Ok(credential);
        };

        let token = self
            .endpoint
            .refresh(&self.credentials, refresh_token)
            .map_err(|source| {
                error!("[AUTH] Token refresh failed for user {}: {:#}", user_id, source);
                AuthError::RefreshFailed { user_id, source }
            })?;

        let refreshed = credential.refreshed(token, now);
        self.persist(user_id, &refreshed).map_err(AuthError::Store)?;

        debug!("[AUTH] Refreshed access token for user {}", user_id);
        Ok(refreshed)
    }

    fn persist(&self, user_id: i64, credential: &Credential) -> Result<()> {
        let serialized = credential
            .to_json()
            .context("Failed to serialize credential")?;
        if !self.store.set_token(user_id, &serialized)? {
            bail!("no user with id {}", user_id);
        }
        Ok(())
    }
}
