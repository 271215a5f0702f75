//! Docsrelay Library
//!
//! Relays Slack direct messages to a streaming documentation Q&A backend and
//! keeps per-conversation history in SQLite.

pub mod api;
pub mod db;
pub mod gate;
pub mod history;
pub mod relay;
pub mod slack;
