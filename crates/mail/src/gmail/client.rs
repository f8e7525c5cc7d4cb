//! Gmail API HTTP client
//!
//! Provides the read-only calls the sync pass needs: history pages, full
//! messages and out-of-line attachments. Uses synchronous HTTP (ureq) to be
//! executor-agnostic.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::api::{AttachmentResponse, GmailMessage, HistoryResponse};
use crate::models::Credential;

/// Error indicating the history ID has expired
#[derive(Debug, thiserror::Error)]
#[error("History ID expired or invalid")]
pub struct HistoryExpiredError;

/// The provider calls consumed by a sync pass
///
/// Any non-success status is reported as `Err`.
pub trait MailProvider {
    /// Fetch one page of history starting after `start_history_id`
    fn list_history(
        &self,
        start_history_id: u64,
        page_token: Option<&str>,
    ) -> Result<HistoryResponse>;

    /// Fetch a full message by ID
    fn get_message(&self, id: &str) -> Result<GmailMessage>;

    /// Fetch an out-of-line attachment body
    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<AttachmentResponse>;
}

/// Builds an authorized provider from a user's credential
pub trait ProviderFactory: Send + Sync {
    fn connect(&self, credential: &Credential) -> Box<dyn MailProvider>;
}

/// Build the shared HTTP agent with an overall per-call timeout
pub fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Gmail API client bound to one access token
pub struct GmailClient {
    agent: ureq::Agent,
    access_token: String,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Create a new Gmail client
    pub fn new(agent: ureq::Agent, access_token: impl Into<String>) -> Self {
        Self {
            agent,
            access_token: access_token.into(),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let mut response = self
            .agent
            .get(url)
            .header("Authorization", &format!("Bearer {}", self.access_token))
            .call()
            .with_context(|| format!("Failed to send {} request", what))?;

        response
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse {} response", what))
    }
}

impl MailProvider for GmailClient {
    /// List history since a given historyId
    ///
    /// Only `messageAdded` changes are requested.
    ///
    /// # Errors
    /// Returns `HistoryExpiredError` if the history ID is too old (404 from Gmail)
    fn list_history(
        &self,
        start_history_id: u64,
        page_token: Option<&str>,
    ) -> Result<HistoryResponse> {
        let mut url = format!(
            "{}/users/me/history?startHistoryId={}&historyTypes=messageAdded",
            Self::BASE_URL,
            start_history_id
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let response = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", self.access_token))
            .call();

        match response {
            Ok(mut resp) => {
                let history: HistoryResponse = resp
                    .body_mut()
                    .read_json()
                    .context("Failed to parse history response")?;
                Ok(history)
            }
            Err(ureq::Error::StatusCode(404)) => Err(HistoryExpiredError.into()),
            Err(e) => Err(anyhow::anyhow!("Failed to fetch history: {}", e)),
        }
    }

    fn get_message(&self, id: &str) -> Result<GmailMessage> {
        let url = format!(
            "{}/users/me/messages/{}?format=full",
            Self::BASE_URL,
            urlencoding::encode(id)
        );
        self.get_json(&url, "get message")
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<AttachmentResponse> {
        let url = format!(
            "{}/users/me/messages/{}/attachments/{}",
            Self::BASE_URL,
            urlencoding::encode(message_id),
            urlencoding::encode(attachment_id)
        );
        self.get_json(&url, "get attachment")
    }
}

/// Production factory: one [`GmailClient`] per credential, sharing an agent
#[derive(Clone)]
pub struct GmailClientFactory {
    agent: ureq::Agent,
}

impl GmailClientFactory {
    pub fn new(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl ProviderFactory for GmailClientFactory {
    fn connect(&self, credential: &Credential) -> Box<dyn MailProvider> {
        Box::new(GmailClient::new(
            self.agent.clone(),
            credential.access_token.clone(),
        ))
    }
}
