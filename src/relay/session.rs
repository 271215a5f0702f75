//! Per-turn protocol state machine.
//!
//! One `TurnSession` exists per inbound user message. It owns the accumulated
//! answer text and the pending-edit counter, and turns protocol frames into
//! ordered side-effect requests (`Action`s) for the driver to apply. The
//! transitions are free of I/O so the batching and terminal-state rules are
//! directly testable.

use log::{error, warn};

use super::protocol::{EndPayload, Frame, FrameKind};

/// Fixed user-facing text shown when a turn fails.
pub const FAILURE_TEXT: &str =
    "An error occurred while fetching the answer. Please try again later.";

/// Session lifecycle states.
///
/// `Finalized` is the only success terminal. `Errored` covers an explicit
/// `error` frame, a local connection error, and an idle timeout;
/// `ClosedUnclean` means the peer closed without `end` or `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Streaming,
    Finalized,
    Errored,
    ClosedUnclean,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finalized | Self::Errored | Self::ClosedUnclean
        )
    }
}

/// Side effect requested by a transition, applied by the driver in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Edit the placeholder reply; a failure here is superseded by the next
    /// flush.
    Edit(String),
    /// Edit with the final answer text; the driver retries this once.
    FinalEdit(String),
    /// Persist the updated history blob.
    Persist(String),
    /// Close the connection from our side.
    Close,
}

#[derive(Debug)]
pub struct TurnSession {
    state: SessionState,
    answer: String,
    pending: usize,
    batch_size: usize,
}

impl TurnSession {
    /// Create a session with the given batch threshold. A threshold of 1
    /// degenerates to one edit per token.
    pub fn new(batch_size: usize) -> Self {
        Self {
            state: SessionState::Open,
            answer: String::new(),
            pending: 0,
            batch_size: batch_size.max(1),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Apply one inbound frame. Frames from non-bot senders and frames in a
    /// terminal state are ignored.
    pub fn handle_frame(&mut self, frame: &Frame) -> Vec<Action> {
        if self.state.is_terminal() || frame.sender != "bot" {
            return Vec::new();
        }

        match frame.kind {
            FrameKind::Start => {
                self.state = SessionState::Streaming;
                Vec::new()
            }
            FrameKind::Stream => {
                self.answer.push_str(&frame.message);
                self.pending += 1;
                if self.pending >= self.batch_size {
                    self.pending = 0;
                    vec![Action::Edit(self.answer.clone())]
                } else {
                    Vec::new()
                }
            }
            // Reserved for future metadata; must not touch text or counters
            FrameKind::Info => Vec::new(),
            FrameKind::End => {
                self.pending = 0;
                self.state = SessionState::Finalized;

                // The last partial batch is never dropped: flush even at
                // counter zero.
                let mut actions = vec![Action::FinalEdit(self.answer.clone())];
                match serde_json::from_str::<EndPayload>(&frame.message) {
                    Ok(payload) => actions.push(Action::Persist(payload.history.to_string())),
                    Err(err) => {
                        warn!("malformed end payload, history not persisted: {err}");
                    }
                }
                actions.push(Action::Close);
                actions
            }
            FrameKind::Error => {
                error!("backend reported error: {}", frame.message);
                self.pending = 0;
                self.state = SessionState::Errored;
                vec![Action::Edit(FAILURE_TEXT.to_string()), Action::Close]
            }
        }
    }

    /// The connection closed without us having finished.
    ///
    /// A close after `Finalized` or `Errored` is the expected end of the
    /// session and must not trigger the failure edit.
    pub fn on_unclean_close(&mut self) -> Vec<Action> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.state = SessionState::ClosedUnclean;
        self.pending = 0;
        vec![Action::Edit(FAILURE_TEXT.to_string())]
    }

    /// No frame arrived within the idle timeout.
    pub fn on_idle_timeout(&mut self) -> Vec<Action> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.state = SessionState::Errored;
        self.pending = 0;
        vec![Action::Edit(FAILURE_TEXT.to_string()), Action::Close]
    }

    /// Local transport error. No edit is forced here: the connection cannot
    /// be used to report it distinctly from an unclean close.
    pub fn on_connection_error(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Errored;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(kind: FrameKind, message: impl Into<String>) -> Frame {
        Frame {
            sender: "bot".to_string(),
            kind,
            message: message.into(),
        }
    }

    fn stream_frame(token: &str) -> Frame {
        bot(FrameKind::Stream, token)
    }

    fn end_frame(history: &str) -> Frame {
        bot(FrameKind::End, format!(r#"{{"history":{history}}}"#))
    }

    #[test]
    fn start_and_info_are_noops() {
        let mut session = TurnSession::new(3);
        assert!(session.handle_frame(&bot(FrameKind::Start, "")).is_empty());
        assert_eq!(session.state(), SessionState::Streaming);
        assert!(session.handle_frame(&bot(FrameKind::Info, "meta")).is_empty());
        assert_eq!(session.answer(), "");
    }

    #[test]
    fn edits_are_batched_at_threshold() {
        let mut session = TurnSession::new(5);
        session.handle_frame(&bot(FrameKind::Start, ""));

        let tokens = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l"];
        let mut edits = Vec::new();
        for token in tokens {
            for action in session.handle_frame(&stream_frame(token)) {
                if let Action::Edit(text) = action {
                    edits.push(text);
                }
            }
        }

        // floor(12 / 5) intermediate edits, each with the cumulative text
        assert_eq!(edits, vec!["abcde".to_string(), "abcdefghij".to_string()]);

        let actions = session.handle_frame(&end_frame(r#"[["q","a"]]"#));
        assert_eq!(
            actions,
            vec![
                Action::FinalEdit("abcdefghijkl".to_string()),
                Action::Persist(r#"[["q","a"]]"#.to_string()),
                Action::Close,
            ]
        );
        assert_eq!(session.state(), SessionState::Finalized);
    }

    #[test]
    fn batch_size_one_edits_every_token() {
        let mut session = TurnSession::new(1);
        let actions = session.handle_frame(&stream_frame("x"));
        assert_eq!(actions, vec![Action::Edit("x".to_string())]);
    }

    #[test]
    fn batch_size_zero_is_clamped_to_one() {
        let mut session = TurnSession::new(0);
        let actions = session.handle_frame(&stream_frame("x"));
        assert_eq!(actions, vec![Action::Edit("x".to_string())]);
    }

    #[test]
    fn end_flushes_even_with_empty_counter() {
        let mut session = TurnSession::new(5);
        let actions = session.handle_frame(&end_frame("[]"));
        assert_eq!(
            actions,
            vec![
                Action::FinalEdit(String::new()),
                Action::Persist("[]".to_string()),
                Action::Close,
            ]
        );
    }

    #[test]
    fn malformed_end_payload_still_finalizes_answer() {
        let mut session = TurnSession::new(2);
        session.handle_frame(&stream_frame("hi"));
        let actions = session.handle_frame(&bot(FrameKind::End, "not json"));
        assert_eq!(
            actions,
            vec![Action::FinalEdit("hi".to_string()), Action::Close]
        );
        assert_eq!(session.state(), SessionState::Finalized);
    }

    #[test]
    fn error_frame_overrides_partial_text() {
        let mut session = TurnSession::new(2);
        session.handle_frame(&stream_frame("partial "));
        session.handle_frame(&stream_frame("answer"));

        let actions = session.handle_frame(&bot(FrameKind::Error, "boom"));
        assert_eq!(
            actions,
            vec![Action::Edit(FAILURE_TEXT.to_string()), Action::Close]
        );
        assert_eq!(session.state(), SessionState::Errored);
    }

    #[test]
    fn frames_from_other_senders_are_ignored() {
        let mut session = TurnSession::new(1);
        let frame = Frame {
            sender: "system".to_string(),
            kind: FrameKind::Stream,
            message: "x".to_string(),
        };
        assert!(session.handle_frame(&frame).is_empty());
        assert_eq!(session.answer(), "");
    }

    #[test]
    fn frames_after_terminal_state_are_ignored() {
        let mut session = TurnSession::new(1);
        session.handle_frame(&end_frame("[]"));
        assert_eq!(session.state(), SessionState::Finalized);

        assert!(session.handle_frame(&stream_frame("late")).is_empty());
        assert_eq!(session.answer(), "");
    }

    #[test]
    fn unclean_close_before_finalized_fails_once() {
        let mut session = TurnSession::new(3);
        session.handle_frame(&stream_frame("a"));

        let actions = session.on_unclean_close();
        assert_eq!(actions, vec![Action::Edit(FAILURE_TEXT.to_string())]);
        assert_eq!(session.state(), SessionState::ClosedUnclean);

        // A second close observation produces nothing
        assert!(session.on_unclean_close().is_empty());
    }

    #[test]
    fn close_after_finalized_is_clean() {
        let mut session = TurnSession::new(3);
        session.handle_frame(&end_frame("[]"));
        assert!(session.on_unclean_close().is_empty());
        assert_eq!(session.state(), SessionState::Finalized);
    }

    #[test]
    fn idle_timeout_errors_with_failure_text() {
        let mut session = TurnSession::new(3);
        let actions = session.on_idle_timeout();
        assert_eq!(
            actions,
            vec![Action::Edit(FAILURE_TEXT.to_string()), Action::Close]
        );
        assert_eq!(session.state(), SessionState::Errored);
    }

    #[test]
    fn connection_error_sets_errored_without_edit() {
        let mut session = TurnSession::new(3);
        session.on_connection_error();
        assert_eq!(session.state(), SessionState::Errored);
        // Terminal now, so a following close is quiet
        assert!(session.on_unclean_close().is_empty());
    }
}
