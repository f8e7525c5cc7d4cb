//! Scripted provider doubles shared by the sync unit tests

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::gmail::api::{
    AttachmentResponse, GmailMessage, Header, HistoryRecord, HistoryResponse, MessageAdded,
    MessageBody, MessagePart, MessagePayload, MessageRef,
};
use crate::gmail::{MailProvider, ProviderFactory};
use crate::models::Credential;

pub(crate) fn encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// A history record adding the given message IDs
pub(crate) fn record(id: &str, message_ids: &[&str]) -> HistoryRecord {
    HistoryRecord {
        id: id.to_string(),
        messages_added: Some(
            message_ids
                .iter()
                .map(|m| MessageAdded {
                    message: MessageRef {
                        id: m.to_string(),
                        thread_id: None,
                    },
                })
                .collect(),
        ),
    }
}

/// A single-part text/plain message as returned by `format=full`
pub(crate) fn text_message(id: &str, body: &str) -> GmailMessage {
    GmailMessage {
        id: id.to_string(),
        payload: Some(MessagePayload {
            mime_type: Some("text/plain".to_string()),
            body: Some(MessageBody {
                data: Some(encode(body.as_bytes())),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn with_header(mut message: GmailMessage, name: &str, value: &str) -> GmailMessage {
    message
        .payload
        .get_or_insert_with(MessagePayload::default)
        .headers
        .get_or_insert_with(Vec::new)
        .push(Header {
            name: name.to_string(),
            value: value.to_string(),
        });
    message
}

pub(crate) fn inline_part(filename: &str, data: &[u8]) -> MessagePart {
    MessagePart {
        filename: Some(filename.to_string()),
        body: Some(MessageBody {
            data: Some(encode(data)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn remote_part(filename: &str, attachment_id: &str) -> MessagePart {
    MessagePart {
        filename: Some(filename.to_string()),
        body: Some(MessageBody {
            attachment_id: Some(attachment_id.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Turn a message into multipart/mixed: its text body becomes the first
/// part and `parts` follow; headers stay on the payload
pub(crate) fn with_parts(mut message: GmailMessage, parts: Vec<MessagePart>) -> GmailMessage {
    let original = message.payload.take().unwrap_or_default();
    let mut all = Vec::new();
    if original.body.is_some() {
        all.push(MessagePart {
            mime_type: original.mime_type,
            body: original.body,
            ..Default::default()
        });
    }
    all.extend(parts);
    message.payload = Some(MessagePayload {
        mime_type: Some("multipart/mixed".to_string()),
        headers: original.headers,
        parts: Some(all),
        ..Default::default()
    });
    message
}

#[derive(Default)]
struct Script {
    /// History pages keyed by the page token that requests them ("" = first)
    pages: HashMap<String, HistoryResponse>,
    messages: HashMap<String, GmailMessage>,
    attachments: HashMap<(String, String), Vec<u8>>,
    failing_pages: HashSet<String>,
    failing_messages: HashSet<String>,
    failing_attachments: HashSet<String>,
}

/// In-memory provider driven by a script; records every call it receives
#[derive(Clone, Default)]
pub(crate) struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register pages in order; every page but the last links to the next
    pub(crate) fn with_pages(self, pages: Vec<Vec<HistoryRecord>>) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            let count = pages.len();
            for (i, history) in pages.into_iter().enumerate() {
                let token = if i == 0 { String::new() } else { format!("page-{}", i) };
                let next_page_token = (i + 1 < count).then(|| format!("page-{}", i + 1));
                script.pages.insert(
                    token,
                    HistoryResponse {
                        history: Some(history),
                        next_page_token,
                        history_id: None,
                    },
                );
            }
        }
        self
    }

    pub(crate) fn with_message(self, message: GmailMessage) -> Self {
        self.script
            .lock()
            .unwrap()
            .messages
            .insert(message.id.clone(), message);
        self
    }

    pub(crate) fn with_attachment(self, message_id: &str, attachment_id: &str, data: &[u8]) -> Self {
        self.script.lock().unwrap().attachments.insert(
            (message_id.to_string(), attachment_id.to_string()),
            data.to_vec(),
        );
        self
    }

    pub(crate) fn failing_page(self, page_token: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .failing_pages
            .insert(page_token.to_string());
        self
    }

    pub(crate) fn failing_message(self, id: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .failing_messages
            .insert(id.to_string());
        self
    }

    pub(crate) fn failing_attachment(self, attachment_id: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .failing_attachments
            .insert(attachment_id.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_of(&self, kind: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(&format!("{}:", kind)))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MailProvider for ScriptedProvider {
    fn list_history(&self, start_history_id: u64, page_token: Option<&str>) -> Result<HistoryResponse> {
        let token = page_token.unwrap_or_default();
        self.record(format!("history:{}:{}", start_history_id, token));
        let script = self.script.lock().unwrap();
        if script.failing_pages.contains(token) {
            return Err(anyhow!("HTTP 500 for page {:?}", token));
        }
        Ok(script.pages.get(token).cloned().unwrap_or_default())
    }

    fn get_message(&self, id: &str) -> Result<GmailMessage> {
        self.record(format!("message:{}", id));
        let script = self.script.lock().unwrap();
        if script.failing_messages.contains(id) {
            return Err(anyhow!("HTTP 500 for message {}", id));
        }
        script
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("HTTP 404 for message {}", id))
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<AttachmentResponse> {
        self.record(format!("attachment:{}:{}", message_id, attachment_id));
        let script = self.script.lock().unwrap();
        if script.failing_attachments.contains(attachment_id) {
            return Err(anyhow!("HTTP 500 for attachment {}", attachment_id));
        }
        script
            .attachments
            .get(&(message_id.to_string(), attachment_id.to_string()))
            .map(|data| AttachmentResponse {
                size: Some(data.len() as u32),
                data: encode(data),
            })
            .ok_or_else(|| anyhow!("HTTP 404 for attachment {}", attachment_id))
    }
}

/// Factory handing out clones of one scripted provider
pub(crate) struct ScriptedFactory {
    pub(crate) provider: ScriptedProvider,
    pub(crate) tokens_seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFactory {
    pub(crate) fn new(provider: ScriptedProvider) -> Self {
        Self {
            provider,
            tokens_seen: Arc::default(),
        }
    }
}

impl ProviderFactory for ScriptedFactory {
    fn connect(&self, credential: &Credential) -> Box<dyn MailProvider> {
        self.tokens_seen
            .lock()
            .unwrap()
            .push(credential.access_token.clone());
        Box::new(self.provider.clone())
    }
}
