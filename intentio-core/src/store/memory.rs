//! Process-local personalization store.
//!
//! ## Locking discipline
//!
//! One `parking_lot::Mutex` per user, held in a `RwLock`-guarded map:
//!
//! - the outer `RwLock` is held only long enough to find or insert a user's
//!   entry, so traffic for different users never serialises;
//! - the per-user mutex guards that user's banks *and* profile together, so
//!   `train`'s readiness check and profile install form one critical section
//!   with respect to concurrent `add_sample` calls for the same user.
//!
//! Memory for sample banks is unbounded across the process lifetime (no
//! eviction) — an accepted MVP constraint of this backend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::features::{centroid, FeatureVector};
use crate::store::{
    derive_state, gate_satisfied, OnboardingState, PersonalizationStore, PersonalizedProfile,
    MIN_SAMPLES_PER_INTENT,
};

#[derive(Default)]
struct UserBank {
    samples: HashMap<String, Vec<FeatureVector>>,
    profile: Option<PersonalizedProfile>,
}

impl UserBank {
    fn counts(&self) -> HashMap<String, usize> {
        self.samples
            .iter()
            .map(|(label, bank)| (label.clone(), bank.len()))
            .collect()
    }
}

/// In-memory `PersonalizationStore` with per-user locking.
pub struct MemoryStore {
    min_samples: usize,
    users: RwLock<HashMap<String, Arc<Mutex<UserBank>>>>,
}

impl MemoryStore {
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Find or create the user's entry. Write lock is taken only on first
    /// sight of a user.
    fn bank(&self, user_id: &str) -> Arc<Mutex<UserBank>> {
        if let Some(bank) = self.users.read().get(user_id) {
            return Arc::clone(bank);
        }
        Arc::clone(
            self.users
                .write()
                .entry(user_id.to_string())
                .or_default(),
        )
    }

    /// Look up without creating — read paths never materialise a user.
    fn bank_if_present(&self, user_id: &str) -> Option<Arc<Mutex<UserBank>>> {
        self.users.read().get(user_id).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MIN_SAMPLES_PER_INTENT)
    }
}

impl PersonalizationStore for MemoryStore {
    fn add_sample(&self, user_id: &str, label: &str, features: &FeatureVector) -> Result<usize> {
        let bank = self.bank(user_id);
        let mut bank = bank.lock();
        let samples = bank.samples.entry(label.to_string()).or_default();
        samples.push(features.clone());
        let count = samples.len();
        debug!(user_id, label, count, "onboarding sample added");
        Ok(count)
    }

    fn sample_count(&self, user_id: &str, label: &str) -> Result<usize> {
        Ok(self
            .bank_if_present(user_id)
            .map(|bank| bank.lock().samples.get(label).map_or(0, Vec::len))
            .unwrap_or(0))
    }

    fn train(&self, user_id: &str) -> Result<bool> {
        let Some(bank) = self.bank_if_present(user_id) else {
            warn!(user_id, "train requested for unknown user");
            return Ok(false);
        };

        // Critical section: gate check and profile install are atomic with
        // respect to add_sample for this user.
        let mut bank = bank.lock();
        let counts = bank.counts();
        if !gate_satisfied(&counts, self.min_samples) {
            warn!(
                user_id,
                min_samples = self.min_samples,
                ?counts,
                "training gate not satisfied"
            );
            return Ok(false);
        }

        let centroids: HashMap<String, FeatureVector> = bank
            .samples
            .iter()
            .map(|(label, samples)| (label.clone(), centroid(samples)))
            .collect();
        let mut trained_intents: Vec<String> = counts.keys().cloned().collect();
        trained_intents.sort();
        let total_samples = counts.values().sum();

        bank.profile = Some(PersonalizedProfile {
            user_id: user_id.to_string(),
            trained_intents,
            total_samples,
            trained_at: Utc::now(),
            centroids,
        });

        info!(user_id, total_samples, "personalized profile trained");
        Ok(true)
    }

    fn is_onboarded(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .bank_if_present(user_id)
            .map(|bank| bank.lock().profile.is_some())
            .unwrap_or(false))
    }

    fn profile(&self, user_id: &str) -> Result<Option<PersonalizedProfile>> {
        Ok(self
            .bank_if_present(user_id)
            .and_then(|bank| bank.lock().profile.clone()))
    }

    fn onboarding_state(&self, user_id: &str) -> Result<OnboardingState> {
        Ok(self
            .bank_if_present(user_id)
            .map(|bank| {
                let bank = bank.lock();
                derive_state(&bank.counts(), bank.profile.is_some(), self.min_samples)
            })
            .unwrap_or(OnboardingState::NotStarted))
    }
}
