//! Streaming relay: one backend WebSocket session per inbound Slack turn.
//!
//! The driver in this module owns the connection for the lifetime of a turn.
//! It sends the single request frame on open, feeds inbound frames to the
//! [`TurnSession`] state machine, and applies the resulting actions (throttled
//! edits, history persist, close) against Slack and the history store.

mod error;
mod protocol;
mod session;

pub use error::{RelayError, RelayResult};
pub use protocol::{AskMetadata, AskRequest, EndPayload, Frame, FrameKind};
pub use session::{Action, FAILURE_TEXT, SessionState, TurnSession};

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::gate::ConversationTurn;
use crate::history::HistoryStore;
use crate::slack::{MessageHandle, SlackApi};

/// Placeholder reply posted before the backend is contacted.
pub const ACK_REPLY_TEXT: &str = "Looking that up for you...";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Tunables for one relay turn.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Backend streaming endpoint URL.
    pub ws_url: String,
    /// Number of streamed tokens accumulated before an intermediate edit.
    pub batch_size: usize,
    /// Force the turn to fail if no frame arrives for this long.
    pub idle_timeout: Duration,
}

/// Runs streaming sessions against the answer backend.
pub struct Relay {
    config: RelayConfig,
    slack: Arc<dyn SlackApi>,
    store: HistoryStore,
}

impl Relay {
    pub fn new(config: RelayConfig, slack: Arc<dyn SlackApi>, store: HistoryStore) -> Self {
        Self {
            config,
            slack,
            store,
        }
    }

    /// Handle one accepted conversation turn end to end: post the placeholder
    /// reply, load history, then drive the streaming session.
    pub async fn process(&self, turn: ConversationTurn) -> RelayResult<SessionState> {
        // Failure here aborts the turn before a session ever exists
        let handle = self.slack.post_message(&turn.channel, ACK_REPLY_TEXT).await?;

        let history = self
            .store
            .get_or_create(&turn.id)
            .await
            .map_err(RelayError::Store)?;

        let display_name = match self.slack.user_real_name(&turn.id.user_id).await {
            Ok(name) => name,
            Err(err) => {
                debug!("users.info failed for {}: {err}", turn.id.user_id);
                turn.id.user_id.clone()
            }
        };

        let state = match self
            .run_session(&turn, &handle, &history, &display_name)
            .await
        {
            Ok(state) => state,
            Err(err) => {
                // The placeholder is already visible; replace it so the user
                // is not left staring at the ack text
                if let Err(edit_err) = self.slack.update_message(&handle, FAILURE_TEXT).await {
                    warn!("failure edit after aborted session also failed: {edit_err}");
                }
                return Err(err);
            }
        };
        info!(
            "turn finished in {state:?} for user={} team={}",
            turn.id.user_id, turn.id.team_id
        );
        Ok(state)
    }

    /// Drive the backend protocol for one turn. The placeholder has already
    /// been posted; `handle` is the message every edit targets.
    async fn run_session(
        &self,
        turn: &ConversationTurn,
        handle: &MessageHandle,
        history: &str,
        display_name: &str,
    ) -> RelayResult<SessionState> {
        let (ws, _) = connect_async(self.config.ws_url.as_str())
            .await
            .map_err(|e| RelayError::Connect {
                url: self.config.ws_url.clone(),
                message: e.to_string(),
            })?;
        debug!("connected to answer backend at {}", self.config.ws_url);

        let (mut tx, mut rx) = ws.split();

        // The only outbound frame of the session
        let request = AskRequest {
            question: turn.text.clone(),
            full_source: false,
            history: serde_json::from_str(history).unwrap_or_else(|_| json!([])),
            metadata: AskMetadata {
                name: display_name.to_string(),
            },
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| RelayError::Protocol(format!("encoding request: {e}")))?;
        tx.send(Message::Text(body.into()))
            .await
            .map_err(|e| RelayError::Connect {
                url: self.config.ws_url.clone(),
                message: e.to_string(),
            })?;

        let mut session = TurnSession::new(self.config.batch_size);

        loop {
            let next = tokio::time::timeout(self.config.idle_timeout, rx.next()).await;
            match next {
                Err(_) => {
                    warn!("no frame within {:?}, giving up", self.config.idle_timeout);
                    let actions = session.on_idle_timeout();
                    self.apply(turn, handle, &mut tx, actions).await;
                    break;
                }
                Ok(None) => {
                    let actions = session.on_unclean_close();
                    if !actions.is_empty() {
                        warn!("backend closed before end frame");
                    }
                    self.apply(turn, handle, &mut tx, actions).await;
                    break;
                }
                Ok(Some(Err(err))) => {
                    warn!("transport error mid-stream: {err}");
                    session.on_connection_error();
                    break;
                }
                Ok(Some(Ok(message))) => match message {
                    Message::Text(text) => {
                        let frame = match serde_json::from_str::<Frame>(text.as_str()) {
                            Ok(frame) => frame,
                            Err(err) => {
                                // Trusted backend, but not guaranteed
                                // well-formed: skip the frame, keep the session
                                warn!("skipping malformed frame: {err}");
                                continue;
                            }
                        };
                        let actions = session.handle_frame(&frame);
                        let closed = self.apply(turn, handle, &mut tx, actions).await;
                        if closed {
                            break;
                        }
                    }
                    Message::Close(_) => {
                        let actions = session.on_unclean_close();
                        if !actions.is_empty() {
                            warn!("backend sent close before end frame");
                        }
                        self.apply(turn, handle, &mut tx, actions).await;
                        break;
                    }
                    // Keepalives and binary payloads are not part of the protocol
                    _ => continue,
                },
            }
        }

        Ok(session.state())
    }

    /// Apply actions in order; returns true once the connection was closed.
    async fn apply(
        &self,
        turn: &ConversationTurn,
        handle: &MessageHandle,
        tx: &mut WsSink,
        actions: Vec<Action>,
    ) -> bool {
        let mut closed = false;
        for action in actions {
            match action {
                Action::Edit(text) => {
                    // A missed intermediate edit self-heals: the next flush
                    // carries the superseding full text
                    if let Err(err) = self.slack.update_message(handle, &text).await {
                        warn!("edit failed for {}/{}: {err}", handle.channel, handle.ts);
                    }
                }
                Action::FinalEdit(text) => {
                    if let Err(err) = self.slack.update_message(handle, &text).await {
                        warn!("final edit failed, retrying once: {err}");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        if let Err(err) = self.slack.update_message(handle, &text).await {
                            error!(
                                "final edit failed after retry for {}/{}: {err}",
                                handle.channel, handle.ts
                            );
                        }
                    }
                }
                Action::Persist(blob) => {
                    // Distinct, higher-severity condition: the visible answer
                    // is correct but the next turn will start from stale
                    // history
                    if let Err(err) = self.store.put(&turn.id, &blob).await {
                        error!(
                            "history persist failed for user={} team={}: {err:?}",
                            turn.id.user_id, turn.id.team_id
                        );
                    }
                }
                Action::Close => {
                    if let Err(err) = tx.send(Message::Close(None)).await {
                        debug!("close handshake failed: {err}");
                    }
                    closed = true;
                }
            }
        }
        closed
    }
}
