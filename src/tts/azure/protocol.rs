//! Message framing for the Azure Speech synthesis websocket.
//!
//! Client messages are text frames: a block of `Name:value` headers, a blank
//! line, then the body. Server text frames use the same layout. Server binary
//! frames start with a big-endian `u16` header length, followed by the header
//! block and the raw audio payload.

use crate::error::{AvatarError, Result};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;

pub const PATH_SPEECH_CONFIG: &str = "speech.config";
pub const PATH_SYNTHESIS_CONTEXT: &str = "synthesis.context";
pub const PATH_SSML: &str = "ssml";
pub const PATH_AUDIO: &str = "audio";
pub const PATH_METADATA: &str = "audio.metadata";
pub const PATH_TURN_START: &str = "turn.start";
pub const PATH_TURN_END: &str = "turn.end";

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// A chunk of encoded audio (may be empty at end of stream).
    Audio(Bytes),
    /// Viseme entries as `(offset ticks, phoneme class id)`.
    Visemes(Vec<(u64, u32)>),
    TurnStart,
    TurnEnd,
    /// Any other path (`response`, word boundaries only, ...).
    Other(String),
}

/// Current time in the header format the service expects.
pub fn timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// A fresh request/connection id (32 hex digits, no dashes).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Frame a client text message.
pub fn text_message(
    path: &str,
    request_id: &str,
    content_type: &str,
    timestamp: &str,
    body: &str,
) -> String {
    format!(
        "X-Timestamp:{timestamp}\r\nX-RequestId:{request_id}\r\nContent-Type:{content_type}\r\nPath:{path}\r\n\r\n{body}"
    )
}

/// Body of the `speech.config` message.
pub fn speech_config_body() -> String {
    json!({
        "context": {
            "system": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "build": "rust",
                "lang": "rust",
            },
            "os": {
                "platform": std::env::consts::OS,
                "name": std::env::consts::FAMILY,
                "version": "",
            },
        }
    })
    .to_string()
}

/// Body of the `synthesis.context` message with viseme metadata enabled.
pub fn synthesis_context_body(output_format: &str) -> String {
    json!({
        "synthesis": {
            "audio": {
                "metadataOptions": {
                    "visemeEnabled": true,
                    "bookmarkEnabled": false,
                    "wordBoundaryEnabled": false,
                    "punctuationBoundaryEnabled": false,
                    "sentenceBoundaryEnabled": false,
                    "sessionEndEnabled": true,
                },
                "outputFormat": output_format,
            },
            "language": { "autoDetection": false },
        }
    })
    .to_string()
}

/// Escape text for inclusion in SSML element content.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// SSML document speaking `text` with `voice`.
pub fn ssml(text: &str, voice: &str, language: &str) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{}'><voice name='{}'>{}</voice></speak>",
        escape_xml(language),
        escape_xml(voice),
        escape_xml(text)
    )
}

/// Find a header value (case-insensitive name) in a header block.
fn header<'a>(block: &'a str, name: &str) -> Option<&'a str> {
    block.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

#[derive(Debug, Deserialize)]
struct MetadataEnvelope {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Deserialize)]
struct MetadataEntry {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Data", default)]
    data: serde_json::Value,
}

fn parse_metadata(body: &str) -> Result<Vec<(u64, u32)>> {
    let envelope: MetadataEnvelope = serde_json::from_str(body)
        .map_err(|e| AvatarError::Synthesis(format!("bad metadata payload: {e}")))?;
    let mut visemes = Vec::new();
    for entry in envelope.metadata {
        if entry.kind != "Viseme" {
            continue;
        }
        let offset = entry.data.get("Offset").and_then(serde_json::Value::as_u64);
        let id = entry
            .data
            .get("VisemeId")
            .and_then(serde_json::Value::as_u64)
            .and_then(|id| u32::try_from(id).ok());
        match (offset, id) {
            (Some(offset), Some(id)) => visemes.push((offset, id)),
            _ => {
                return Err(AvatarError::Synthesis(format!(
                    "viseme entry without offset or id: {}",
                    entry.data
                )));
            }
        }
    }
    Ok(visemes)
}

/// Decode a server text frame.
///
/// # Errors
///
/// Returns [`AvatarError::Synthesis`] for frames without a `Path` header or
/// with a malformed metadata body.
pub fn parse_text(frame: &str) -> Result<ServerMessage> {
    let (headers, body) = frame.split_once("\r\n\r\n").unwrap_or((frame, ""));
    let path = header(headers, "Path")
        .ok_or_else(|| AvatarError::Synthesis("server message without Path header".into()))?;
    Ok(match path {
        PATH_METADATA => ServerMessage::Visemes(parse_metadata(body)?),
        PATH_TURN_START => ServerMessage::TurnStart,
        PATH_TURN_END => ServerMessage::TurnEnd,
        other => ServerMessage::Other(other.to_owned()),
    })
}

/// Decode a server binary frame.
///
/// # Errors
///
/// Returns [`AvatarError::Synthesis`] if the header length prefix is
/// truncated or inconsistent.
pub fn parse_binary(frame: &[u8]) -> Result<ServerMessage> {
    let Some((prefix, rest)) = frame.split_first_chunk::<2>() else {
        return Err(AvatarError::Synthesis("binary frame shorter than its prefix".into()));
    };
    let header_len = usize::from(u16::from_be_bytes(*prefix));
    if rest.len() < header_len {
        return Err(AvatarError::Synthesis(format!(
            "binary frame header of {header_len} bytes exceeds frame length {}",
            rest.len()
        )));
    }
    let (headers, payload) = rest.split_at(header_len);
    let headers = String::from_utf8_lossy(headers);
    match header(&headers, "Path") {
        Some(PATH_AUDIO) => Ok(ServerMessage::Audio(Bytes::copy_from_slice(payload))),
        Some(other) => Ok(ServerMessage::Other(other.to_owned())),
        None => Err(AvatarError::Synthesis(
            "binary frame without Path header".into(),
        )),
    }
}

/// Frame a server binary message (used by tests and local fakes).
pub fn binary_message(path: &str, request_id: &str, payload: &[u8]) -> Vec<u8> {
    let headers = format!("X-RequestId:{request_id}\r\nContent-Type:audio/mpeg\r\nPath:{path}\r\n");
    let header_len = u16::try_from(headers.len()).unwrap_or(u16::MAX);
    let mut frame = Vec::with_capacity(2 + headers.len() + payload.len());
    frame.extend_from_slice(&header_len.to_be_bytes());
    frame.extend_from_slice(&headers.as_bytes()[..usize::from(header_len)]);
    frame.extend_from_slice(payload);
    frame
}
