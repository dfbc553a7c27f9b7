//! Pending-confirmation sessions.
//!
//! A low-confidence classification opens a session that waits for the user's
//! explicit yes/no before the action executes:
//!
//! ```text
//! Pending ──confirm(true)──► Confirmed   (action executes once)
//!    │──────confirm(false)─► Rejected    (caller prompts a fresh utterance)
//!    └──────time_out()─────► TimedOut    (deployment-defined window elapsed)
//! ```
//!
//! `confirm` is idempotent once resolved: duplicate confirms report the
//! existing resolution and never re-execute. The core runs no timers — the
//! owner decides when to sweep expired sessions.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Lifecycle state of one confirmation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Classification produced, awaiting the user's response.
    Pending,
    /// User accepted; the action is considered executed.
    Confirmed,
    /// User declined; a fresh utterance is expected.
    Rejected,
    /// No response arrived within the deployment-defined window.
    TimedOut,
}

/// What the caller should do after a `confirm` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// First accepting confirm — execute the held action now.
    Execute,
    /// Session was already resolved; nothing executes again.
    AlreadyResolved(SessionState),
    /// User rejected — ask for a new utterance.
    Retry,
    /// Session timed out (or was never known) before the response arrived.
    Expired,
}

/// One classification awaiting user confirmation.
#[derive(Debug, Clone)]
pub struct ConfirmationSession {
    id: String,
    /// Wire label of the held classification (`"YES"`, `"3"`, ...).
    label: String,
    state: SessionState,
    opened_at: Instant,
}

impl ConfirmationSession {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            state: SessionState::Pending,
            opened_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Resolve the session with the user's response.
    pub fn confirm(&mut self, accepted: bool) -> ConfirmOutcome {
        match self.state {
            SessionState::Pending => {
                if accepted {
                    self.state = SessionState::Confirmed;
                    ConfirmOutcome::Execute
                } else {
                    self.state = SessionState::Rejected;
                    ConfirmOutcome::Retry
                }
            }
            SessionState::Confirmed | SessionState::Rejected => {
                ConfirmOutcome::AlreadyResolved(self.state)
            }
            SessionState::TimedOut => ConfirmOutcome::Expired,
        }
    }

    /// Transition `Pending → TimedOut`. Returns `true` if the transition
    /// happened; resolved sessions are left untouched.
    pub fn time_out(&mut self) -> bool {
        if self.state == SessionState::Pending {
            self.state = SessionState::TimedOut;
            true
        } else {
            false
        }
    }

    /// Has this session been open longer than `window`?
    pub fn is_expired(&self, window: Duration) -> bool {
        self.state == SessionState::Pending && self.opened_at.elapsed() >= window
    }
}
