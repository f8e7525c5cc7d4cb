//! Gmail push notifications
//!
//! Gmail `users.watch` publishes to a Cloud Pub/Sub topic. A push
//! subscription delivers each change as an envelope whose `message.data`
//! is base64-encoded JSON naming the mailbox and its new historyId. That
//! historyId is the checkpoint to pass to a sync run.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::gmail::decode_base64;

/// Pub/Sub push envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushEnvelope {
    message: PubSubMessage,
    #[serde(default)]
    subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubSubMessage {
    data: String,
    #[serde(default)]
    message_id: Option<String>,
}

/// Decoded `message.data` payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationData {
    email_address: String,
    history_id: HistoryIdValue,
}

/// Gmail sends the historyId as a number; some relays stringify it
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryIdValue {
    Number(u64),
    Text(String),
}

/// A mailbox change announced by Gmail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub email_address: String,
    pub history_id: u64,
    /// Pub/Sub message id, useful for de-duplicating redeliveries
    pub message_id: Option<String>,
    pub subscription: Option<String>,
}

impl PushNotification {
    /// Decode a push request body
    pub fn from_push_body(body: &str) -> Result<Self> {
        let envelope: PushEnvelope =
            serde_json::from_str(body).context("Failed to parse Pub/Sub push envelope")?;

        let bytes = decode_base64(envelope.message.data.trim())
            .context("Pub/Sub message data is not valid base64")?;
        let data: NotificationData = serde_json::from_slice(&bytes)
            .context("Pub/Sub message data is not a Gmail notification")?;

        let history_id = match data.history_id {
            HistoryIdValue::Number(id) => id,
            HistoryIdValue::Text(text) => text
                .trim()
                .parse()
                .with_context(|| format!("Invalid historyId in notification: {:?}", text))?,
        };

        if data.email_address.trim().is_empty() {
            bail!("Notification has an empty emailAddress");
        }

        Ok(Self {
            email_address: data.email_address,
            history_id,
            message_id: envelope.message.message_id,
            subscription: envelope.subscription,
        })
    }
}
