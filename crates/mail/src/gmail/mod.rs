//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 token lifecycle (authorization URL, code exchange, refresh)
//! - Gmail API client for history, messages and attachments
//! - Base64 and body decoding of API payloads

mod auth;
mod client;
mod decode;

pub use auth::{AuthHandle, GoogleTokenEndpoint, OAuthClient, TokenEndpoint, TokenManager};
pub use client::{
    GmailClient, GmailClientFactory, HistoryExpiredError, MailProvider, ProviderFactory, http_agent,
};
pub(crate) use decode::has_filename;
pub use decode::{decode_base64, decode_base64_text, extract_body_text, render_message_text};

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// One page of `users.history.list`
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryResponse {
        pub history: Option<Vec<HistoryRecord>>,
        pub next_page_token: Option<String>,
        pub history_id: Option<String>,
    }

    /// A single change-log entry
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryRecord {
        pub id: String,
        pub messages_added: Option<Vec<MessageAdded>>,
    }

    /// "Message added" reference inside a history record
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct MessageAdded {
        pub message: MessageRef,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: Option<String>,
    }

    /// Message from `users.messages.get`
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: Option<String>,
        /// Entire RFC 2822 message, base64url encoded
        pub raw: Option<String>,
        pub payload: Option<MessagePayload>,
    }

    /// Top-level MIME part of a message
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Part body: inline `data` or a reference to fetch separately
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
        pub attachment_id: Option<String>,
    }

    /// Nested MIME part
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Body of `users.messages.attachments.get`
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AttachmentResponse {
        pub size: Option<u32>,
        pub data: String,
    }

}
