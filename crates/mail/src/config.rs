//! Configuration loading for the sync engine
//!
//! OAuth client credentials are loaded from (in order of priority):
//! 1. Compile-time embedded credentials (for production builds)
//! 2. JSON file (Google Cloud Console format)
//! 3. Runtime environment variables (fallback)
//!
//! The resulting [`GmailCredentials`] is built once at startup and handed to
//! each component that needs it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Credentials filename in the mailsync config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// Settings filename in the mailsync config directory
const SETTINGS_FILE: &str = "settings.json";

/// Default Google OAuth2 endpoints
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Loopback redirect for installed apps; the code is read from the
/// browser's address bar after consent
const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// OAuth application descriptor for Gmail API access
#[derive(Debug, Clone, PartialEq)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_uri: Url,
    pub token_uri: Url,
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl GmailCredentials {
    /// Build credentials against Google's default OAuth endpoints
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        Self::with_endpoints(
            client_id,
            client_secret,
            redirect_uri,
            DEFAULT_AUTH_URI,
            DEFAULT_TOKEN_URI,
        )
    }

    /// Build credentials against explicit OAuth endpoints
    pub fn with_endpoints(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        auth_uri: &str,
        token_uri: &str,
    ) -> Result<Self> {
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_uri: Url::parse(auth_uri)
                .with_context(|| format!("Invalid OAuth auth_uri: {}", auth_uri))?,
            token_uri: Url::parse(token_uri)
                .with_context(|| format!("Invalid OAuth token_uri: {}", token_uri))?,
        })
    }

    /// Load credentials using the following priority:
    /// 1. Compile-time embedded credentials (for production builds)
    /// 2. JSON file (google-credentials.json in the config directory)
    /// 3. Runtime environment variables
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_compile_time() {
            return creds;
        }

        if let Some(creds) = config::load_json_optional::<GoogleCredentialFile>(CREDENTIALS_FILE)? {
            return Self::from_credential_file(creds);
        }

        Self::from_env()
    }

    /// Load credentials embedded at compile time via environment variables.
    /// Build with: GOOGLE_CLIENT_ID=xxx GOOGLE_CLIENT_SECRET=yyy cargo build --release
    pub fn from_compile_time() -> Option<Result<Self>> {
        let client_id = option_env!("GOOGLE_CLIENT_ID")?;
        let client_secret = option_env!("GOOGLE_CLIENT_SECRET")?;

        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }

        let redirect_uri = option_env!("GOOGLE_REDIRECT_URI").unwrap_or(DEFAULT_REDIRECT_URI);
        Some(Self::new(client_id, client_secret, redirect_uri))
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    /// Parse credentials from a GoogleCredentialFile
    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Support both "installed" (desktop) and "web" credential types
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        let redirect_uri = installed
            .redirect_uris
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        Self::with_endpoints(
            installed.client_id,
            installed.client_secret,
            redirect_uri,
            installed.auth_uri.as_deref().unwrap_or(DEFAULT_AUTH_URI),
            installed.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI),
        )
    }

    /// Parse credentials from JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;
        let redirect_uri = std::env::var("GMAIL_REDIRECT_URI")
            .unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string());

        Self::new(client_id, client_secret, redirect_uri)
    }

    /// Get the default credentials file path
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }
}

/// Runtime settings for the sync engine and its adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// SQLite database holding user records; defaults to the config directory
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Overall timeout applied to every provider HTTP call
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            database_path: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl SyncSettings {
    /// Load settings.json from the config directory, or defaults if absent
    pub fn load() -> Result<Self> {
        Ok(config::load_json_optional(SETTINGS_FILE)?.unwrap_or_default())
    }

    /// Write these settings to settings.json in the config directory
    pub fn save(&self) -> Result<PathBuf> {
        config::save_json(SETTINGS_FILE, self)
    }

    /// Path of settings.json in the config directory
    pub fn default_path() -> Option<PathBuf> {
        config::config_path(SETTINGS_FILE)
    }

    /// Resolved path of the user database
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => config::config_path("users.db").context("Could not determine config directory"),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed_credentials() {
        let json = r#"{
            "installed": {
                "client_id": "test-client-id.apps.googleusercontent.com",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost:8080", "urn:ietf:wg:oauth:2.0:oob"],
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token"
            }
        }"#;

        let creds = GmailCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "test-client-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "test-secret");
        assert_eq!(creds.redirect_uri, "http://localhost:8080");
        assert_eq!(
            creds.auth_uri.as_str(),
            "https://accounts.google.com/o/oauth2/auth"
        );
    }

    #[test]
    fn test_parse_web_credentials_uses_defaults() {
        let json = r#"{
            "web": {
                "client_id": "web-client-id.apps.googleusercontent.com",
                "client_secret": "web-secret"
            }
        }"#;

        let creds = GmailCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "web-client-id.apps.googleusercontent.com");
        assert_eq!(creds.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(creds.token_uri.as_str(), DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_invalid_json() {
        let json = r#"{ "other": {} }"#;
        assert!(GmailCredentials::from_json(json).is_err());
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let result = GmailCredentials::with_endpoints("id", "secret", "uri", "not a url", DEFAULT_TOKEN_URI);
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_defaults() {
        let settings: SyncSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_settings_explicit_database_path() {
        let settings: SyncSettings =
            serde_json::from_str(r#"{"database_path": "/tmp/users.db", "http_timeout_secs": 5}"#)
                .unwrap();
        assert_eq!(settings.database_path().unwrap(), PathBuf::from("/tmp/users.db"));
        assert_eq!(settings.http_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_credentials_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{"installed": {"client_id": "file-id", "client_secret": "file-secret"}}"#,
        )
        .unwrap();

        let creds = GmailCredentials::from_file(&path).unwrap();
        assert_eq!(creds.client_id, "file-id");
        assert_eq!(creds.redirect_uri, "http://localhost");
        assert!(GmailCredentials::from_file(&dir.path().join("missing.json")).is_err());
    }
}
