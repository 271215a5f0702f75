//! Wire types for the answer backend's streaming protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame pushed by the backend during one streaming session.
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    pub sender: String,
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Start,
    Stream,
    Info,
    End,
    Error,
}

/// The single request sent when the connection opens.
#[derive(Debug, Clone, Serialize)]
pub struct AskRequest {
    pub question: String,
    pub full_source: bool,
    pub history: Value,
    pub metadata: AskMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskMetadata {
    pub name: String,
}

/// Structured payload carried by an `end` frame's `message` field.
#[derive(Debug, Clone, Deserialize)]
pub struct EndPayload {
    pub history: Value,
}
