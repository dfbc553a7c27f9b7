//! Per-user personalization storage.
//!
//! The `PersonalizationStore` trait is the storage-interface boundary: the
//! pipeline talks only to this contract, so the default process-local map
//! can be swapped for a durable backend without touching callers. Operations
//! return `Result` for exactly that reason — a durable backend can surface
//! storage faults, while [`MemoryStore`] never errors.
//!
//! Derived per-user onboarding lifecycle:
//!
//! ```text
//! NotStarted ──add_sample──► Collecting ──(all labels ≥ min)──► Ready
//!                                                                 │
//!                                              train() ──────────►│
//!                                                                 ▼
//!                                                              Trained
//! ```
//!
//! `train` is the only `Ready → Trained` transition; sample counts may keep
//! growing afterwards without reverting the state.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::FeatureVector;

/// Minimum samples every collected label must reach before training.
pub const MIN_SAMPLES_PER_INTENT: usize = 3;

/// A user's trained personalization model.
///
/// Installed atomically by a successful `train` call; a later train
/// overwrites the previous profile wholesale (no versioning).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizedProfile {
    pub user_id: String,
    /// Labels the profile was trained on, sorted.
    pub trained_intents: Vec<String>,
    /// Total samples across all labels at train time.
    pub total_samples: usize,
    pub trained_at: DateTime<Utc>,
    /// Per-label mean feature vectors — the nearest-centroid model state.
    pub centroids: HashMap<String, FeatureVector>,
}

/// Derived onboarding state for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnboardingState {
    /// No samples collected yet.
    NotStarted,
    /// Samples exist, but not every collected label meets the minimum.
    Collecting,
    /// Every collected label meets the minimum; training may proceed.
    Ready,
    /// A profile is installed.
    Trained,
}

/// Contract for per-user sample banks and training-readiness gating.
///
/// Implementations own all `SampleBank` and profile state; no other
/// component mutates them. Concurrency guarantees (as provided by the
/// default in-memory backend):
/// - `add_sample` calls for different users never block each other;
/// - appends for the same (user, label) are serialised, so counts are exact
///   under retried client submissions;
/// - `train` runs its readiness check and profile install in one per-user
///   critical section, atomic with respect to concurrent `add_sample` calls
///   for that user.
pub trait PersonalizationStore: Send + Sync + 'static {
    /// Append one sample to the (user, label) bank, creating the user's and
    /// label's bank on first use. Returns the bank's new sample count.
    fn add_sample(&self, user_id: &str, label: &str, features: &FeatureVector) -> Result<usize>;

    /// Samples collected for (user, label). Unknown user or label reads as 0.
    fn sample_count(&self, user_id: &str, label: &str) -> Result<usize>;

    /// Evaluate the training-readiness gate and, on success, atomically
    /// install a fresh profile (overwriting any prior one).
    ///
    /// Returns `Ok(false)` — with the store unchanged — when the user has no
    /// recorded labels or any collected label holds fewer than the minimum
    /// samples. There is no partial training.
    fn train(&self, user_id: &str) -> Result<bool>;

    /// True iff a trained profile exists for the user.
    fn is_onboarded(&self, user_id: &str) -> Result<bool>;

    /// Snapshot of the user's installed profile, if any.
    fn profile(&self, user_id: &str) -> Result<Option<PersonalizedProfile>>;

    /// Derived onboarding state (see module docs). Unknown users read as
    /// `NotStarted` — "no data yet" is a normal state, not a fault.
    fn onboarding_state(&self, user_id: &str) -> Result<OnboardingState>;
}

/// Shared gate evaluation: every collected label must hold at least
/// `min_samples` entries, and at least one label must exist.
pub(crate) fn gate_satisfied(counts: &HashMap<String, usize>, min_samples: usize) -> bool {
    !counts.is_empty() && counts.values().all(|&n| n >= min_samples)
}

/// Shared derivation of [`OnboardingState`] from bank counts and profile
/// presence.
pub(crate) fn derive_state(
    counts: &HashMap<String, usize>,
    has_profile: bool,
    min_samples: usize,
) -> OnboardingState {
    if has_profile {
        OnboardingState::Trained
    } else if counts.is_empty() {
        OnboardingState::NotStarted
    } else if gate_satisfied(counts, min_samples) {
        OnboardingState::Ready
    } else {
        OnboardingState::Collecting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, usize)]) -> HashMap<String, usize> {
        pairs.iter().map(|(l, n)| (l.to_string(), *n)).collect()
    }

    #[test]
    fn gate_requires_at_least_one_label() {
        assert!(!gate_satisfied(&HashMap::new(), 3));
    }

    #[test]
    fn gate_requires_every_collected_label_to_meet_minimum() {
        assert!(!gate_satisfied(&counts(&[("YES", 3), ("NO", 2)]), 3));
        assert!(gate_satisfied(&counts(&[("YES", 3), ("NO", 3)]), 3));
        assert!(gate_satisfied(&counts(&[("YES", 5)]), 3));
    }

    #[test]
    fn state_derivation_follows_the_lifecycle() {
        assert_eq!(
            derive_state(&HashMap::new(), false, 3),
            OnboardingState::NotStarted
        );
        assert_eq!(
            derive_state(&counts(&[("YES", 1)]), false, 3),
            OnboardingState::Collecting
        );
        assert_eq!(
            derive_state(&counts(&[("YES", 3)]), false, 3),
            OnboardingState::Ready
        );
        assert_eq!(
            derive_state(&counts(&[("YES", 3)]), true, 3),
            OnboardingState::Trained
        );
        // Counts growing after training never revert the state.
        assert_eq!(
            derive_state(&counts(&[("YES", 3), ("NO", 1)]), true, 3),
            OnboardingState::Trained
        );
    }
}
