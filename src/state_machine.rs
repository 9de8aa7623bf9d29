//! Listening state machine: Idle ⇄ Listening with validated transitions.
//! A watch channel broadcasts changes to reactive subscribers.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

/// Detector lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ListenState {
    Idle,
    Listening,
}

impl std::fmt::Display for ListenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenState::Idle => write!(f, "Idle"),
            ListenState::Listening => write!(f, "Listening"),
        }
    }
}

impl ListenState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: ListenState) -> bool {
        matches!(
            (self, next),
            (ListenState::Idle, ListenState::Listening)
                // A re-start while listening is valid: it resets the session.
                | (ListenState::Listening, ListenState::Listening)
                | (ListenState::Listening, ListenState::Idle)
        )
    }
}

/// Thread-safe state machine with a watch channel for reactive subscribers.
pub struct StateMachine {
    state: RwLock<ListenState>,
    state_tx: watch::Sender<ListenState>,
    state_rx: watch::Receiver<ListenState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ListenState::Idle);
        Self {
            state: RwLock::new(ListenState::Idle),
            state_tx,
            state_rx,
        }
    }

    /// Current state (non-blocking read).
    pub fn current(&self) -> ListenState {
        *self.state.read()
    }

    /// Attempt a state transition. Returns Ok(new_state) or Err with reason.
    pub fn transition(&self, next: ListenState) -> Result<ListenState, String> {
        let mut state = self.state.write();
        let current = *state;
        if !current.can_transition_to(next) {
            let msg = format!("invalid transition: {} -> {}", current, next);
            warn!("{}", msg);
            return Err(msg);
        }
        *state = next;
        let _ = self.state_tx.send(next);
        info!(from = %current, to = %next, "state_transition");
        Ok(next)
    }

    /// Force transition to Idle from any state. Safe to call mid-session or
    /// when already idle.
    pub fn force_idle(&self) {
        let mut state = self.state.write();
        let prev = *state;
        *state = ListenState::Idle;
        let _ = self.state_tx.send(ListenState::Idle);
        info!(from = %prev, "force_idle");
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ListenState> {
        self.state_rx.clone()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
