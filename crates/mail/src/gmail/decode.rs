//! Decoding of Gmail API payloads
//!
//! Gmail uses URL-safe base64 but padding can vary, and some proxies hand
//! back the standard alphabet, so every decode tries several engines.

use base64::Engine;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

use super::api::{MessagePart, MessagePayload};

const DECODERS: [&GeneralPurpose; 4] = [&URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

/// Decode base64 data in any of the alphabets/padding styles Gmail emits
pub fn decode_base64(data: &str) -> Option<Vec<u8>> {
    DECODERS.iter().find_map(|engine| engine.decode(data).ok())
}

/// Decode base64 data to text, replacing invalid UTF-8 sequences
pub fn decode_base64_text(data: &str) -> Option<String> {
    decode_base64(data).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Render a structured payload as message text: header lines, a blank
/// line, then the readable body
///
/// A payload without headers renders as the bare body.
pub fn render_message_text(payload: &MessagePayload) -> String {
    let body = extract_body_text(payload).unwrap_or_default();
    let headers = payload.headers.as_deref().unwrap_or_default();
    if headers.is_empty() {
        return body;
    }

    let mut text = String::new();
    for header in headers {
        text.push_str(&header.name);
        text.push_str(": ");
        text.push_str(&header.value);
        text.push_str("\r\n");
    }
    text.push_str("\r\n");
    text.push_str(&body);
    text
}

/// Extract the readable body of a structured payload
///
/// Prefers text/plain, then text/html, then whatever the top-level body
/// holds unless the payload itself is an attachment.
pub fn extract_body_text(payload: &MessagePayload) -> Option<String> {
    let top_level = payload
        .body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .filter(|d| !d.is_empty())
        .filter(|_| !has_filename(payload.filename.as_deref()));

    if let Some(data) = top_level
        && is_mime(payload.mime_type.as_deref(), "text/plain")
    {
        return decode_base64_text(data);
    }

    if let Some(parts) = &payload.parts {
        if let Some(text) = find_text_in_parts(parts, "text/plain") {
            return Some(text);
        }
        if let Some(html) = find_text_in_parts(parts, "text/html") {
            return Some(html);
        }
    }

    top_level.and_then(decode_base64_text)
}

/// Gmail marks attachment parts with a non-empty filename
pub(crate) fn has_filename(filename: Option<&str>) -> bool {
    filename.is_some_and(|f| !f.is_empty())
}

fn is_mime(mime_type: Option<&str>, prefix: &str) -> bool {
    mime_type.is_some_and(|m| m.starts_with(prefix))
}

/// Recursively search message parts for inline content of a MIME type
fn find_text_in_parts(parts: &[MessagePart], mime_prefix: &str) -> Option<String> {
    for part in parts {
        if !has_filename(part.filename.as_deref())
            && is_mime(part.mime_type.as_deref(), mime_prefix)
            && let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref())
            && let Some(text) = decode_base64_text(data)
        {
            return Some(text);
        }

        if let Some(nested) = &part.parts
            && let Some(text) = find_text_in_parts(nested, mime_prefix)
        {
            return Some(text);
        }
    }

    None
}
