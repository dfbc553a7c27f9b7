//! Intent classification abstraction.
//!
//! The `IntentClassifier` trait decouples the pipeline from any specific
//! scoring backend (energy-profile heuristic, per-user nearest-centroid, a
//! future trained network, etc.). The pipeline depends only on the
//! (label, confidence) contract — never on *how* labels are scored.
//!
//! `&mut self` on the classify methods intentionally expresses that backends
//! may be stateful. All mutation is therefore serialised through
//! `ClassifierHandle`'s `parking_lot::Mutex`.

pub mod heuristic;
pub mod personalized;

pub use heuristic::HeuristicClassifier;
pub use personalized::PersonalizedClassifier;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::IntentioError;
use crate::features::FeatureVector;

/// The four top-level signals a user can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MainIntent {
    Yes,
    No,
    Help,
    Emergency,
}

impl MainIntent {
    pub const ALL: [MainIntent; 4] = [
        MainIntent::Yes,
        MainIntent::No,
        MainIntent::Help,
        MainIntent::Emergency,
    ];
}

impl FromStr for MainIntent {
    type Err = IntentioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YES" => Ok(MainIntent::Yes),
            "NO" => Ok(MainIntent::No),
            "HELP" => Ok(MainIntent::Help),
            "EMERGENCY" => Ok(MainIntent::Emergency),
            other => Err(IntentioError::UnknownLabel(other.to_string())),
        }
    }
}

/// The four sub-selections offered after HELP.
///
/// Wire labels are the digits `"1"`–`"4"`, matching what onboarding clients
/// submit; the variant names are the human meanings shown to caregivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HelpOption {
    #[serde(rename = "1")]
    Water,
    #[serde(rename = "2")]
    Food,
    #[serde(rename = "3")]
    Washroom,
    #[serde(rename = "4")]
    Pain,
}

impl HelpOption {
    pub const ALL: [HelpOption; 4] = [
        HelpOption::Water,
        HelpOption::Food,
        HelpOption::Washroom,
        HelpOption::Pain,
    ];

    /// Human-readable meaning of the option.
    pub fn display_name(&self) -> &'static str {
        match self {
            HelpOption::Water => "Water",
            HelpOption::Food => "Food",
            HelpOption::Washroom => "Washroom",
            HelpOption::Pain => "Pain",
        }
    }
}

impl FromStr for HelpOption {
    type Err = IntentioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(HelpOption::Water),
            "2" => Ok(HelpOption::Food),
            "3" => Ok(HelpOption::Washroom),
            "4" => Ok(HelpOption::Pain),
            other => Err(IntentioError::UnknownLabel(other.to_string())),
        }
    }
}

/// Common surface over both label spaces.
///
/// The confirmation policy and the event layer work against this trait so
/// they never need to know which classifier produced a label.
pub trait IntentLabel: Copy + Eq + fmt::Debug + Send + 'static {
    /// Canonical wire label (`"YES"`, `"EMERGENCY"`, `"1"`, ...).
    fn as_label(&self) -> &'static str;

    /// Safety-critical labels bypass the confirmation gate entirely.
    fn is_safety_critical(&self) -> bool {
        false
    }

    /// User-facing acknowledgement for this label.
    fn display_message(&self) -> String;
}

impl IntentLabel for MainIntent {
    fn as_label(&self) -> &'static str {
        match self {
            MainIntent::Yes => "YES",
            MainIntent::No => "NO",
            MainIntent::Help => "HELP",
            MainIntent::Emergency => "EMERGENCY",
        }
    }

    fn is_safety_critical(&self) -> bool {
        matches!(self, MainIntent::Emergency)
    }

    fn display_message(&self) -> String {
        match self {
            MainIntent::Yes => "You said: Yes".to_string(),
            MainIntent::No => "You said: No".to_string(),
            MainIntent::Help => "Opening help menu...".to_string(),
            MainIntent::Emergency => "EMERGENCY - Alerting caregivers now!".to_string(),
        }
    }
}

impl IntentLabel for HelpOption {
    fn as_label(&self) -> &'static str {
        match self {
            HelpOption::Water => "1",
            HelpOption::Food => "2",
            HelpOption::Washroom => "3",
            HelpOption::Pain => "4",
        }
    }

    fn display_message(&self) -> String {
        format!("You selected: {}", self.display_name())
    }
}

/// One classification result: the best label and its normalised confidence.
///
/// Value type — produced per call, owned by the caller, never persisted by
/// the core itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification<L> {
    pub label: L,
    /// Normalised certainty in [0.0, 1.0].
    pub confidence: f32,
}

impl<L> Classification<L> {
    pub fn new(label: L, confidence: f32) -> Self {
        Self { label, confidence }
    }
}

/// Contract for intent scoring backends.
///
/// Both methods are pure functions of the input features plus
/// backend-internal state — no I/O. Confidence must lie in [0, 1].
pub trait IntentClassifier: Send + 'static {
    /// Score a feature vector against the main intent label set.
    fn classify_main(&mut self, features: &FeatureVector) -> Classification<MainIntent>;

    /// Score a feature vector against the help submenu label set.
    fn classify_help(&mut self, features: &FeatureVector) -> Classification<HelpOption>;
}

/// Thread-safe reference-counted handle to any `IntentClassifier` implementor.
///
/// Uses `parking_lot::Mutex` for non-poisoning on panic and a faster
/// uncontended path than `std::sync::Mutex`.
#[derive(Clone)]
pub struct ClassifierHandle(pub Arc<Mutex<dyn IntentClassifier>>);

impl ClassifierHandle {
    /// Wrap any `IntentClassifier` in a `ClassifierHandle`.
    pub fn new<C: IntentClassifier>(classifier: C) -> Self {
        Self(Arc::new(Mutex::new(classifier)))
    }
}

impl fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierHandle").finish_non_exhaustive()
    }
}

/// Softmax over raw scores; returns the argmax index and its probability.
///
/// Shared by the concrete backends so confidence always lands in [0, 1].
pub(crate) fn best_of(scores: &[f32], sharpness: f32) -> (usize, f32) {
    debug_assert!(!scores.is_empty());
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| ((s - max) * sharpness).exp()).collect();
    let total: f32 = exps.iter().sum();

    let mut best_idx = 0;
    let mut best_exp = f32::NEG_INFINITY;
    for (i, &e) in exps.iter().enumerate() {
        if e > best_exp {
            best_exp = e;
            best_idx = i;
        }
    }

    let confidence = if total > 0.0 { best_exp / total } else { 0.0 };
    (best_idx, confidence.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn main_intent_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&MainIntent::Emergency).unwrap();
        assert_eq!(json, r#""EMERGENCY""#);
        let back: MainIntent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MainIntent::Emergency);
    }

    #[test]
    fn help_option_serializes_as_digit() {
        let json = serde_json::to_string(&HelpOption::Washroom).unwrap();
        assert_eq!(json, r#""3""#);
        let back: HelpOption = serde_json::from_str(&json).unwrap();
        assert_eq!(back, HelpOption::Washroom);
    }

    #[test]
    fn labels_round_trip_through_from_str() {
        for intent in MainIntent::ALL {
            assert_eq!(intent.as_label().parse::<MainIntent>().unwrap(), intent);
        }
        for option in HelpOption::ALL {
            assert_eq!(option.as_label().parse::<HelpOption>().unwrap(), option);
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!("MAYBE".parse::<MainIntent>().is_err());
        assert!("5".parse::<HelpOption>().is_err());
    }

    #[test]
    fn only_emergency_is_safety_critical() {
        assert!(MainIntent::Emergency.is_safety_critical());
        assert!(!MainIntent::Yes.is_safety_critical());
        assert!(!MainIntent::Help.is_safety_critical());
        assert!(!HelpOption::Pain.is_safety_critical());
    }

    #[test]
    fn best_of_uniform_scores_gives_uniform_confidence() {
        let (_, conf) = best_of(&[1.0, 1.0, 1.0, 1.0], 3.0);
        assert_abs_diff_eq!(conf, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn best_of_dominant_score_wins() {
        let (idx, conf) = best_of(&[0.1, 5.0, 0.2, 0.1], 3.0);
        assert_eq!(idx, 1);
        assert!(conf > 0.9);
    }
}
