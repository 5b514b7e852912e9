//! Pulling a JSON payload out of a free-text model reply.
//!
//! Replies arrive as bare JSON, JSON inside a fenced code block, JSON buried in
//! prose, or a provider envelope whose text parts hold any of those. Each shape
//! has its own named strategy; [`extract_json`] tries them in [`ParseStrategy::ORDER`]
//! and reports [`ParseError::NoJson`] when none applies.

use serde_json::Value;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Provider envelope (`candidates[].content.parts[].text` or Ollama's `response`)
    ResponseEnvelope,
    /// The whole reply is one JSON object
    Direct,
    /// A fenced code block, with or without a `json` tag
    FencedBlock,
    /// First well-formed object anywhere in the text
    FirstObject,
}

impl ParseStrategy {
    pub const ORDER: [ParseStrategy; 4] = [
        ParseStrategy::ResponseEnvelope,
        ParseStrategy::Direct,
        ParseStrategy::FencedBlock,
        ParseStrategy::FirstObject,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParseStrategy::ResponseEnvelope => "response_envelope",
            ParseStrategy::Direct => "direct",
            ParseStrategy::FencedBlock => "fenced_block",
            ParseStrategy::FirstObject => "first_object",
        }
    }

    pub fn apply(&self, raw: &str) -> Option<Value> {
        match self {
            ParseStrategy::ResponseEnvelope => unwrap_envelope(raw).and_then(|inner| {
                // One level only: the inner text is never itself an envelope.
                ParseStrategy::ORDER[1..]
                    .iter()
                    .find_map(|strategy| strategy.apply(&inner))
            }),
            ParseStrategy::Direct => parse_object(raw.trim()),
            ParseStrategy::FencedBlock => fenced_blocks(raw)
                .into_iter()
                .find_map(|block| parse_object(block.trim())),
            ParseStrategy::FirstObject => first_object(raw),
        }
    }
}

/// Run every strategy in order; the first hit wins.
///
/// A recognised envelope is never the payload itself: if its text holds no
/// JSON the reply has none.
pub fn extract_json(raw: &str) -> Result<(Value, ParseStrategy), ParseError> {
    if unwrap_envelope(raw).is_some() {
        return ParseStrategy::ResponseEnvelope
            .apply(raw)
            .map(|value| (value, ParseStrategy::ResponseEnvelope))
            .ok_or(ParseError::NoJson);
    }

    ParseStrategy::ORDER[1..]
        .iter()
        .find_map(|strategy| strategy.apply(raw).map(|value| (value, *strategy)))
        .ok_or(ParseError::NoJson)
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Text carried by a recognised provider envelope, if `raw` is one.
fn unwrap_envelope(raw: &str) -> Option<String> {
    let value = parse_object(raw.trim())?;

    if let Some(candidates) = value.get("candidates").and_then(Value::as_array) {
        let text: String = candidates
            .iter()
            .filter_map(|c| c.pointer("/content/parts"))
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        return Some(text);
    }

    // Ollama /api/generate: {"model": ..., "response": "...", "done": true}
    let looks_like_ollama = value.get("model").is_some() || value.get("done").is_some();
    if looks_like_ollama {
        return value
            .get("response")
            .and_then(Value::as_str)
            .map(str::to_string);
    }

    None
}

fn fenced_blocks(raw: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = raw;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // Skip the info string ("json", "JSON", ...) up to the end of the line
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];

        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => break,
        }
    }

    blocks
}

fn first_object(raw: &str) -> Option<Value> {
    raw.char_indices()
        .filter(|(_, c)| *c == '{')
        .find_map(|(start, _)| {
            let mut stream = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value @ Value::Object(_))) => Some(value),
                _ => None,
            }
        })
}
