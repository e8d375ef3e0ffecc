//! Response sanitizing
//!
//! Models asked for JSON often wrap it in a markdown fence or a sentence of
//! prose. [`sanitize_and_parse`] strips the fence, trims, and parses strictly.
//! Anything that still fails to parse comes back as [`SanitizedResponse::Raw`]
//! so callers must handle both outcomes. No repair is attempted.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SanitizedResponse {
    Parsed(serde_json::Value),
    Raw(RawFallback),
}

/// Unparseable response text, serialized as `{"parseFailed": true, "raw": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFallback {
    pub parse_failed: bool,
    pub raw: String,
}

impl SanitizedResponse {
    pub fn parse_failed(&self) -> bool {
        matches!(self, SanitizedResponse::Raw(_))
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            SanitizedResponse::Parsed(value) => Some(value),
            SanitizedResponse::Raw(_) => None,
        }
    }

    /// Decode into the workflow's expected shape.
    ///
    /// A raw fallback or a shape mismatch is a [`Error::Parse`]; missing
    /// required fields are never filled in.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            SanitizedResponse::Parsed(value) => serde_json::from_value(value)
                .map_err(|e| Error::Parse(format!("Response has unexpected shape: {}", e))),
            SanitizedResponse::Raw(fallback) => Err(Error::Parse(format!(
                "Response is not valid JSON: {}",
                preview(&fallback.raw)
            ))),
        }
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Remove a markdown code fence around `raw`, if present.
///
/// The block runs from the first opening fence to the last closing fence, so
/// fences quoted inside JSON strings stay part of the body. Prose before or
/// after the block is dropped.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find(FENCE) else {
        return trimmed;
    };

    let after_open = &trimmed[start + FENCE.len()..];
    // The rest of the opening line is the language tag (```json, ```JSON, ```).
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => after_open.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    match body.rfind(FENCE) {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Strip incidental wrapping and strictly parse `raw` as JSON.
pub fn sanitize_and_parse(raw: &str) -> SanitizedResponse {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return SanitizedResponse::Parsed(value);
    }

    match serde_json::from_str::<serde_json::Value>(strip_fences(trimmed)) {
        Ok(value) => SanitizedResponse::Parsed(value),
        Err(e) => {
            tracing::warn!("Response failed JSON parsing: {}", e);
            SanitizedResponse::Raw(RawFallback {
                parse_failed: true,
                raw: raw.to_string(),
            })
        }
    }
}

/// Sanitize and decode in one step.
pub fn parse_typed<T: DeserializeOwned>(raw: &str) -> Result<T> {
    sanitize_and_parse(raw).into_typed()
}
