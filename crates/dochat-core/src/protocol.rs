//! Wire protocol between the client and the chat WebSocket endpoint.
//!
//! Inbound payloads are loosely and inconsistently shaped; `parse_frame`
//! normalizes them into a small tagged set and fails closed (`Unrecognized`)
//! on anything unknown. The protocol grows additive fields, so unknown
//! shapes are dropped by the caller rather than treated as errors.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Search backend selector sent with every turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    #[default]
    Opensearch,
    ContextualRetrieval,
}

impl FromStr for SearchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opensearch" => Ok(SearchMethod::Opensearch),
            "contextual_retrieval" => Ok(SearchMethod::ContextualRetrieval),
            other => Err(format!(
                "unknown search method '{other}' (expected 'opensearch' or 'contextual_retrieval')"
            )),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMethod::Opensearch => write!(f, "opensearch"),
            SearchMethod::ContextualRetrieval => write!(f, "contextual_retrieval"),
        }
    }
}

/// One outbound JSON object per user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    pub query: String,
    pub model_arn: String,
    pub search_method: SearchMethod,
}

/// Inbound frames after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A partial piece of the streamed response text.
    TextFragment { content: String },
    /// An incremental citation correlating the response to a document.
    Citation { source_id: String, source_url: String },
    /// Turn completion, carrying the bulk source map.
    Complete { sources: BTreeMap<String, String> },
    /// Server-reported error aborting the current turn.
    ErrorFrame { message: String },
    /// Payload matched none of the known shapes.
    Unrecognized,
}

/// Normalizes a raw inbound payload into a `Frame`.
///
/// Text content is probed in priority order: `type == "text"` with
/// `content`, bare `text`, nested `output.text`. The first non-null match
/// wins. Only then are the tagged citation/complete/error shapes checked,
/// followed by the bare `{"error": ...}` form.
pub fn parse_frame(raw: &Value) -> Frame {
    if let Some(content) = text_content(raw) {
        return Frame::TextFragment { content };
    }

    match raw.get("type").and_then(Value::as_str) {
        Some("citation") => {
            if let Some(source_id) = raw.get("sourceId").and_then(Value::as_str)
                && let Some(source_url) = raw.get("sourceUrl").and_then(Value::as_str)
            {
                return Frame::Citation {
                    source_id: source_id.to_string(),
                    source_url: source_url.to_string(),
                };
            }
        }
        Some("complete") => {
            return Frame::Complete {
                sources: bulk_sources(raw.get("sources")),
            };
        }
        Some("error") => {
            if let Some(message) = raw.get("message").and_then(Value::as_str) {
                return Frame::ErrorFrame {
                    message: message.to_string(),
                };
            }
        }
        _ => {}
    }

    if let Some(message) = raw.get("error").and_then(Value::as_str) {
        return Frame::ErrorFrame {
            message: message.to_string(),
        };
    }

    Frame::Unrecognized
}

/// Parses a raw text payload straight off the wire.
///
/// Invalid JSON is indistinguishable from an unknown shape to the caller,
/// so it maps to `Unrecognized` as well.
pub fn parse_text(payload: &str) -> Frame {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => parse_frame(&value),
        Err(_) => Frame::Unrecognized,
    }
}

fn text_content(raw: &Value) -> Option<String> {
    if raw.get("type").and_then(Value::as_str) == Some("text")
        && let Some(content) = raw.get("content").and_then(Value::as_str)
    {
        return Some(content.to_string());
    }
    if let Some(text) = raw.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    raw.get("output")
        .and_then(|output| output.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Collects the bulk source map. `BTreeMap` fixes the apply order to
/// ascending id, matching the numeric-string ids the server assigns.
fn bulk_sources(sources: Option<&Value>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(Value::Object(entries)) = sources {
        for (id, url) in entries {
            if let Some(url) = url.as_str() {
                map.insert(id.clone(), url.to_string());
            }
        }
    }
    map
}
