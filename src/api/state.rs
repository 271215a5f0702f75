//! Application state shared across handlers.

use std::sync::Arc;

use crate::gate::InboundGate;
use crate::relay::Relay;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Inbound gate for Slack events.
    pub gate: Arc<InboundGate>,
    /// Relay driving one streaming session per turn.
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(gate: InboundGate, relay: Relay) -> Self {
        Self {
            gate: Arc::new(gate),
            relay: Arc::new(relay),
        }
    }
}
