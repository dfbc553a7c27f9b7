//! `PersonalizedClassifier` — nearest-centroid backend over a trained
//! per-user profile.
//!
//! Training (in the personalization store) reduces each labeled sample bank
//! to its mean vector. Classification ranks those centroids by cosine
//! similarity to the incoming utterance and softmaxes the similarities into
//! a confidence. Label spaces the profile never collected fall back to the
//! shared heuristic backend, so a partially-onboarded user still gets an
//! answer for every request.

use tracing::debug;

use crate::classify::{
    best_of, Classification, HelpOption, HeuristicClassifier, IntentClassifier, MainIntent,
};
use crate::features::FeatureVector;
use crate::store::PersonalizedProfile;

/// Softmax temperature over cosine similarities. Similarities live in
/// [-1, 1], so this runs hotter than the heuristic's raw-score temperature.
const SIM_SHARPNESS: f32 = 6.0;

/// Nearest-centroid backend for one onboarded user.
#[derive(Debug)]
pub struct PersonalizedClassifier {
    profile: PersonalizedProfile,
    fallback: HeuristicClassifier,
}

impl PersonalizedClassifier {
    pub fn new(profile: PersonalizedProfile) -> Self {
        Self {
            profile,
            fallback: HeuristicClassifier::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.profile.user_id
    }

    /// Centroids whose stored label parses into `L`, in `ALL` order.
    fn centroids_for<L, const N: usize>(
        &self,
        all: [L; N],
    ) -> Vec<(L, &FeatureVector)>
    where
        L: crate::classify::IntentLabel,
    {
        all.iter()
            .filter_map(|label| {
                self.profile
                    .centroids
                    .get(label.as_label())
                    .map(|c| (*label, c))
            })
            .collect()
    }

    fn rank<L: crate::classify::IntentLabel>(
        &self,
        candidates: &[(L, &FeatureVector)],
        features: &FeatureVector,
    ) -> Classification<L> {
        let sims: Vec<f32> = candidates
            .iter()
            .map(|(_, centroid)| features.cosine_similarity(centroid))
            .collect();
        let (idx, confidence) = best_of(&sims, SIM_SHARPNESS);
        let label = candidates[idx].0;
        debug!(
            user_id = %self.profile.user_id,
            label = label.as_label(),
            confidence,
            "personalized centroid match"
        );
        Classification::new(label, confidence)
    }
}

impl IntentClassifier for PersonalizedClassifier {
    fn classify_main(&mut self, features: &FeatureVector) -> Classification<MainIntent> {
        let candidates = self.centroids_for(MainIntent::ALL);
        if candidates.is_empty() {
            debug!(
                user_id = %self.profile.user_id,
                "profile has no main-intent centroids — heuristic fallback"
            );
            return self.fallback.classify_main(features);
        }
        self.rank(&candidates, features)
    }

    fn classify_help(&mut self, features: &FeatureVector) -> Classification<HelpOption> {
        let candidates = self.centroids_for(HelpOption::ALL);
        if candidates.is_empty() {
            debug!(
                user_id = %self.profile.user_id,
                "profile has no help-option centroids — heuristic fallback"
            );
            return self.fallback.classify_help(features);
        }
        self.rank(&candidates, features)
    }
}
