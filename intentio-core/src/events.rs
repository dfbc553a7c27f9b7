//! Transport-facing event and report types.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` with camelCase
//! field names so the HTTP layer (or any other host) can forward them to
//! clients unchanged.
//!
//! `DecisionEvent` is broadcast by the engine for every gated
//! classification. An `emergency = true` event is the alert-delivery hook:
//! the core only raises the flag — dispatching caregivers is entirely the
//! subscriber's responsibility.

use serde::{Deserialize, Serialize};

/// Broadcast for every classification that passed through the confirmation
/// gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// User the utterance was classified for, when known.
    pub user_id: Option<String>,
    /// Wire label of the winning classification (`"YES"`, `"3"`, ...).
    pub intent: String,
    /// Reported confidence in [0.0, 1.0] (after any safety clamp).
    pub confidence: f32,
    /// Whether the action is held for explicit confirmation.
    pub requires_confirmation: bool,
    /// Safety-critical classification — subscribers own alert delivery.
    pub emergency: bool,
    /// User-facing acknowledgement.
    pub message: String,
}

/// One-shot response for a processed utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentReport {
    /// Wire label of the winning classification.
    pub intent: String,
    /// Reported confidence in [0.0, 1.0] (after any safety clamp).
    pub confidence: f32,
    pub requires_confirmation: bool,
    /// Safety-critical classification flag.
    pub emergency: bool,
    /// User-facing acknowledgement.
    pub message: String,
    /// Present when a confirmation session was opened for this utterance.
    pub session_id: Option<String>,
}
