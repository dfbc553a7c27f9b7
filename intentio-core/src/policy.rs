//! Confirmation gating policy.
//!
//! Pure decision function from (label, confidence) to a confirmation
//! requirement. All side effects — alert dispatch, logging, session
//! bookkeeping — belong to callers.
//!
//! EMERGENCY is never gated behind a confirmation round-trip. Its reported
//! confidence is clamped *upward* to a safety floor when the raw score falls
//! below it (never downward): the system over-alerts rather than
//! under-alerts.

use serde::{Deserialize, Serialize};

use crate::classify::{Classification, IntentLabel};

/// Below this confidence, non-critical labels require explicit confirmation.
pub const CONFIRMATION_THRESHOLD: f32 = 0.85;

/// Reported EMERGENCY confidence never falls below this floor.
pub const EMERGENCY_CONFIDENCE_FLOOR: f32 = 0.88;

/// Below this reported confidence, the acknowledgement message asks the user
/// to confirm out loud.
const LOW_CONFIDENCE_NOTE: f32 = 0.70;

/// Outcome of the confirmation gate for one classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Execute immediately, without a confirmation round-trip.
    pub auto_execute: bool,
    /// Hold the action until the user confirms.
    pub requires_confirmation: bool,
    /// Confidence to report to the caller (may be clamped for
    /// safety-critical labels).
    pub reported_confidence: f32,
    /// Safety-critical classification — the caller owns alert delivery;
    /// the core only raises this flag.
    pub emergency: bool,
}

/// The confirmation gate. Stateless; thresholds are fixed at construction.
#[derive(Debug, Clone)]
pub struct ConfirmationPolicy {
    confirmation_threshold: f32,
    emergency_floor: f32,
}

impl ConfirmationPolicy {
    pub fn new(confirmation_threshold: f32, emergency_floor: f32) -> Self {
        Self {
            confirmation_threshold,
            emergency_floor,
        }
    }

    /// Apply the gate to one classification. Total and side-effect-free.
    ///
    /// Raw confidence outside [0, 1] is clamped into range before any rule
    /// applies — the classifier contract promises normalised scores, and the
    /// gate does not infer intent from a violation.
    pub fn decide<L: IntentLabel>(&self, classification: &Classification<L>) -> Decision {
        let raw = classification.confidence.clamp(0.0, 1.0);

        if classification.label.is_safety_critical() {
            return Decision {
                auto_execute: true,
                requires_confirmation: false,
                reported_confidence: raw.max(self.emergency_floor),
                emergency: true,
            };
        }

        let requires_confirmation = raw < self.confirmation_threshold;
        Decision {
            auto_execute: !requires_confirmation,
            requires_confirmation,
            reported_confidence: raw,
            emergency: false,
        }
    }

    /// User-facing acknowledgement for a gated classification.
    pub fn response_message<L: IntentLabel>(&self, label: &L, decision: &Decision) -> String {
        let base = label.display_message();
        if !decision.emergency && decision.reported_confidence < LOW_CONFIDENCE_NOTE {
            format!("{base} (Please confirm)")
        } else {
            base
        }
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::new(CONFIRMATION_THRESHOLD, EMERGENCY_CONFIDENCE_FLOOR)
    }
}
