//! Message and attachment resolution
//!
//! Turns history records into [`MailObject`]s. Three ID namespaces meet
//! here: history records reference message IDs, messages carry parts, and
//! out-of-line parts reference attachment IDs scoped to their message.

use anyhow::anyhow;
use log::{debug, error};

use crate::error::SyncError;
use crate::gmail::api::{GmailMessage, HistoryRecord, MessageBody, MessagePart, MessagePayload};
use crate::gmail::{MailProvider, decode_base64, decode_base64_text, has_filename, render_message_text};
use crate::models::{Attachment, MailObject};

/// Counters from one resolution run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveStats {
    /// Number of messages fetched from Gmail
    pub messages_fetched: usize,
    /// Attachments decoded from inline part data
    pub attachments_inline: usize,
    /// Attachments fetched by attachment ID
    pub attachments_fetched: usize,
}

/// Flatten the "message added" references of all records, in order
///
/// Duplicates are kept: a message referenced twice is resolved twice.
pub fn message_ids(records: &[HistoryRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|record| record.messages_added.iter().flatten())
        .map(|added| added.message.id.clone())
        .collect()
}

/// Resolve every added message and its attachments
///
/// All or nothing: the first failed fetch or decode aborts the run.
pub fn resolve_all(
    provider: &dyn MailProvider,
    records: &[HistoryRecord],
) -> Result<Vec<MailObject>, SyncError> {
    resolve_all_with_stats(provider, records).map(|(mail, _)| mail)
}

/// [`resolve_all`], also returning counters for reporting
pub fn resolve_all_with_stats(
    provider: &dyn MailProvider,
    records: &[HistoryRecord],
) -> Result<(Vec<MailObject>, ResolveStats), SyncError> {
    let mut stats = ResolveStats::default();
    let ids = message_ids(records);
    debug!("[RESOLVE] Fetching {} messages", ids.len());

    let mut messages = Vec::with_capacity(ids.len());
    for id in &ids {
        let message = provider.get_message(id).map_err(|source| {
            error!("[RESOLVE] Failed to fetch message {}: {:#}", id, source);
            SyncError::MessageFetchFailed {
                message_id: id.clone(),
                source,
            }
        })?;
        stats.messages_fetched += 1;
        messages.push(message);
    }

    let mut mail = Vec::with_capacity(messages.len());
    for message in &messages {
        mail.push(resolve_message(provider, message, &mut stats)?);
    }

    Ok((mail, stats))
}

fn resolve_message(
    provider: &dyn MailProvider,
    message: &GmailMessage,
    stats: &mut ResolveStats,
) -> Result<MailObject, SyncError> {
    let text = match &message.raw {
        Some(raw) => decode_base64_text(raw).ok_or_else(|| SyncError::Decode {
            message_id: message.id.clone(),
            what: "raw payload".to_string(),
        })?,
        None => message
            .payload
            .as_ref()
            .map(render_message_text)
            .unwrap_or_default(),
    };

    let mut parts = Vec::new();
    if let Some(payload) = &message.payload {
        collect_payload_attachments(payload, &mut parts);
    }

    let mut attachments = Vec::with_capacity(parts.len());
    for part in parts {
        attachments.push(resolve_attachment(provider, &message.id, part, stats)?);
    }

    Ok(MailObject::new(&message.id, text).with_attachments(attachments))
}

/// A payload node that declares a filename
struct AttachmentPart<'a> {
    filename: &'a str,
    body: Option<&'a MessageBody>,
}

/// Depth-first walk starting at the payload itself, which is the whole
/// attachment for single-part messages
fn collect_payload_attachments<'a>(payload: &'a MessagePayload, out: &mut Vec<AttachmentPart<'a>>) {
    if let Some(filename) = payload.filename.as_deref()
        && has_filename(Some(filename))
    {
        out.push(AttachmentPart {
            filename,
            body: payload.body.as_ref(),
        });
    }
    if let Some(parts) = &payload.parts {
        collect_attachment_parts(parts, out);
    }
}

fn collect_attachment_parts<'a>(parts: &'a [MessagePart], out: &mut Vec<AttachmentPart<'a>>) {
    for part in parts {
        if let Some(filename) = part.filename.as_deref()
            && has_filename(Some(filename))
        {
            out.push(AttachmentPart {
                filename,
                body: part.body.as_ref(),
            });
        }
        if let Some(nested) = &part.parts {
            collect_attachment_parts(nested, out);
        }
    }
}

fn resolve_attachment(
    provider: &dyn MailProvider,
    message_id: &str,
    part: AttachmentPart<'_>,
    stats: &mut ResolveStats,
) -> Result<Attachment, SyncError> {
    let filename = part.filename.to_string();
    let body = part.body;
    let inline = body.and_then(|b| b.data.as_deref());

    let encoded = match (inline, body.and_then(|b| b.attachment_id.as_deref())) {
        (Some(data), _) if !data.is_empty() => {
            stats.attachments_inline += 1;
            data.to_string()
        }
        (_, Some(attachment_id)) => {
            let response = provider
                .get_attachment(message_id, attachment_id)
                .map_err(|source| {
                    error!(
                        "[RESOLVE] Failed to fetch attachment {:?} of message {}: {:#}",
                        filename, message_id, source
                    );
                    SyncError::AttachmentFetchFailed {
                        message_id: message_id.to_string(),
                        filename: filename.clone(),
                        source,
                    }
                })?;
            stats.attachments_fetched += 1;
            response.data
        }
        // Empty inline body with nothing to fetch: an empty file
        (Some(_), None) => {
            stats.attachments_inline += 1;
            String::new()
        }
        (None, None) => {
            error!(
                "[RESOLVE] Attachment {:?} of message {} has no data and no attachment id",
                filename, message_id
            );
            return Err(SyncError::AttachmentFetchFailed {
                message_id: message_id.to_string(),
                filename,
                source: anyhow!("part has neither inline data nor an attachment id"),
            });
        }
    };

    let data = decode_base64(&encoded).ok_or_else(|| SyncError::Decode {
        message_id: message_id.to_string(),
        what: format!("attachment {:?}", filename),
    })?;

    Ok(Attachment::new(filename, data))
}
