// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent wire frames.
//!
//! The agent speaks newline-delimited JSON on both directions. Each inbound
//! line is one frame: an object with a required `type` discriminator and an
//! otherwise opaque payload. The core never interprets the agent's natural
//! language output; it only classifies frames and picks out the handful of
//! fields the orchestrator keys off (`subtype: "init"`, the final `result`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `type` discriminator of an agent frame.
///
/// Anything the agent emits with an unrecognized `type` is retained verbatim
/// as [`FrameType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    System,
    User,
    Assistant,
    StreamEvent,
    Result,
    Unknown,
}

impl FrameType {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "system" => Self::System,
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "stream_event" => Self::StreamEvent,
            "result" => Self::Result,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::StreamEvent => "stream_event",
            Self::Result => "result",
            Self::Unknown => "unknown",
        }
    }
}

/// One JSON object received from (or sent to) the agent, with the time it
/// was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp_ms: u64,
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub data: Value,
}

impl Frame {
    /// Classify a decoded JSON value by its `type` field.
    pub fn from_json(data: Value, timestamp_ms: u64) -> Self {
        let frame_type = data
            .get("type")
            .and_then(Value::as_str)
            .map(FrameType::from_wire)
            .unwrap_or(FrameType::Unknown);
        Self { timestamp_ms, frame_type, data }
    }

    /// Decode one stdout line into a frame. Returns `None` when the line is
    /// not valid JSON (the transport drops such lines at debug).
    pub fn parse_line(line: &str, timestamp_ms: u64) -> Option<Self> {
        let data: Value = serde_json::from_str(line.trim()).ok()?;
        Some(Self::from_json(data, timestamp_ms))
    }

    pub fn subtype(&self) -> Option<&str> {
        self.data.get("subtype").and_then(Value::as_str)
    }

    /// The once-per-spawn readiness frame: `{"type":"system","subtype":"init"}`.
    pub fn is_init(&self) -> bool {
        self.frame_type == FrameType::System && self.subtype() == Some("init")
    }

    /// A result frame closes the request that produced it.
    pub fn is_result(&self) -> bool {
        self.frame_type == FrameType::Result
    }

    /// Reply text of a result frame. The agent emits `result`; some builds
    /// use `text`.
    pub fn result_text(&self) -> Option<&str> {
        if !self.is_result() {
            return None;
        }
        self.data
            .get("result")
            .and_then(Value::as_str)
            .or_else(|| self.data.get("text").and_then(Value::as_str))
    }

    /// Build the outbound user-message envelope wrapping `text`.
    pub fn user_message(text: &str) -> Value {
        serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{ "type": "text", "text": text }],
            },
        })
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
