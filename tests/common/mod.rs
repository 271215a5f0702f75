//! Test utilities and common setup.

use async_trait::async_trait;
use axum::Router;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use docsrelay::api::{self, AppState};
use docsrelay::db::Database;
use docsrelay::gate::InboundGate;
use docsrelay::history::HistoryStore;
use docsrelay::relay::{Relay, RelayConfig};
use docsrelay::slack::{MessageHandle, SlackApi, SlackError, SlackResult};

/// In-memory Slack double recording every outbound call.
#[derive(Debug, Default)]
pub struct StubSlack {
    /// (channel, text) of posted messages.
    pub posts: Mutex<Vec<(String, String)>>,
    /// Texts of applied edits, in order.
    pub edits: Mutex<Vec<String>>,
    /// Fail this many update calls before succeeding again.
    pub fail_next_edits: Mutex<usize>,
}

impl StubSlack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn edits(&self) -> Vec<String> {
        self.edits.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SlackApi for StubSlack {
    async fn post_message(&self, channel: &str, text: &str) -> SlackResult<MessageHandle> {
        self.posts
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(MessageHandle {
            channel: channel.to_string(),
            ts: "1700000000.000200".to_string(),
        })
    }

    async fn update_message(&self, _handle: &MessageHandle, text: &str) -> SlackResult<()> {
        {
            let mut fail = self.fail_next_edits.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(SlackError::Api {
                    method: "chat.update".to_string(),
                    error: "ratelimited".to_string(),
                });
            }
        }
        self.edits.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn user_real_name(&self, _user_id: &str) -> SlackResult<String> {
        Ok("Test User".to_string())
    }
}

/// Build a relay over an in-memory database and the given backend URL.
pub async fn test_relay(
    ws_url: &str,
    batch_size: usize,
    slack: Arc<StubSlack>,
) -> (Relay, HistoryStore) {
    let db = Database::in_memory().await.unwrap();
    let store = HistoryStore::new(db.pool().clone());
    let relay = Relay::new(
        RelayConfig {
            ws_url: ws_url.to_string(),
            batch_size,
            idle_timeout: Duration::from_secs(5),
        },
        slack,
        store.clone(),
    );
    (relay, store)
}

/// Create a test application with all services initialized.
pub async fn test_app() -> (Router, Arc<StubSlack>) {
    let slack = StubSlack::new();
    // The backend URL is never dialed by the API tests
    let (relay, _store) = test_relay("ws://127.0.0.1:1/chat", 5, slack.clone()).await;
    let gate = InboundGate::new("UBOT");

    let state = AppState::new(gate, relay);
    (api::create_router(state), slack)
}
