//! Inbound gate: raw Slack Events API payloads to conversation turns.
//!
//! Unwanted events are never errors. Anything that isn't a plain user DM is
//! dropped, and the drop is logged at info level for observability.

use log::info;
use serde::Deserialize;

use crate::history::ConversationId;

/// Outer Slack Events API payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    /// Present on `url_verification` payloads.
    pub challenge: Option<String>,
    pub team_id: Option<String>,
    pub event: Option<MessageEvent>,
}

/// Inner event object of an `event_callback` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: Option<String>,
    pub channel_type: Option<String>,
    pub user: Option<String>,
    pub bot_id: Option<String>,
    pub channel: Option<String>,
    pub text: Option<String>,
    pub ts: Option<String>,
}

/// One accepted user turn, normalized for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub id: ConversationId,
    pub channel: String,
    pub text: String,
}

/// Filters self-authored and non-DM events and extracts conversation identity.
#[derive(Debug, Clone)]
pub struct InboundGate {
    bot_user_id: String,
}

impl InboundGate {
    pub fn new(bot_user_id: impl Into<String>) -> Self {
        Self {
            bot_user_id: bot_user_id.into(),
        }
    }

    /// Convert an envelope into a turn, or ignore it.
    pub fn accept(&self, envelope: &EventEnvelope) -> Option<ConversationTurn> {
        let event = envelope.event.as_ref()?;

        // Never react to our own messages
        if event.bot_id.is_some() || event.user.as_deref() == Some(self.bot_user_id.as_str()) {
            return None;
        }

        if event.kind != "message"
            || event.subtype.is_some()
            || event.channel_type.as_deref() != Some("im")
        {
            info!(
                "ignoring event ts={} channel={} team={}",
                event.ts.as_deref().unwrap_or("-"),
                event.channel.as_deref().unwrap_or("-"),
                envelope.team_id.as_deref().unwrap_or("-"),
            );
            return None;
        }

        let user = event.user.clone()?;
        let team = envelope.team_id.clone()?;
        let channel = event.channel.clone()?;

        Some(ConversationTurn {
            id: ConversationId::new(user, team),
            channel,
            // Slack omits text on some edits; normalize to empty, never null
            text: event.text.clone().unwrap_or_default(),
        })
    }
}
