//! `HeuristicClassifier` — deterministic energy-profile scorer.
//!
//! Interim backend used until a trained acoustic model ships: it scores each
//! label with a fixed linear template over the extractor's summary slots
//! (level, spread, zero-crossing rate) and the low/mid/high thirds of the
//! band-energy block, then normalises with a softmax. The exact templates
//! matter less than the contract: same vector in, same (label, confidence)
//! out, confidence always in [0, 1].

use tracing::debug;

use crate::classify::{
    best_of, Classification, HelpOption, IntentClassifier, MainIntent,
};
use crate::features::FeatureVector;

/// Softmax temperature. Higher values spread confidences further apart.
const SHARPNESS: f32 = 3.0;

/// Summary slots produced by the feature frontend.
const SLOT_STD: usize = 1;
const SLOT_RMS: usize = 2;
const SLOT_ZCR: usize = 3;
const BAND_OFFSET: usize = 4;
const N_BANDS: usize = 32;

/// Deterministic energy-profile backend.
#[derive(Debug, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }
}

/// Per-utterance shape summary the templates score against.
struct Shape {
    spread: f32,
    rms: f32,
    zcr: f32,
    low: f32,
    mid: f32,
    high: f32,
}

fn shape_of(features: &FeatureVector) -> Shape {
    let f = features.as_slice();
    let band_mean = |from: usize, to: usize| -> f32 {
        let lo = BAND_OFFSET + from;
        let hi = BAND_OFFSET + to;
        f[lo..hi].iter().sum::<f32>() / (to - from) as f32
    };

    Shape {
        spread: f[SLOT_STD],
        rms: f[SLOT_RMS],
        zcr: f[SLOT_ZCR],
        low: band_mean(0, N_BANDS / 3),
        mid: band_mean(N_BANDS / 3, 2 * N_BANDS / 3),
        high: band_mean(2 * N_BANDS / 3, N_BANDS),
    }
}

impl IntentClassifier for HeuristicClassifier {
    fn classify_main(&mut self, features: &FeatureVector) -> Classification<MainIntent> {
        let s = shape_of(features);

        // Short affirmatives sit low in the spectrum; negatives carry more
        // fricative energy (zcr); help requests run longer and more varied;
        // distress is loud across the upper bands.
        let scores = [
            0.6 * s.rms - 0.8 * s.zcr + 0.05 * s.low,
            0.5 * s.rms + 0.9 * s.zcr + 0.05 * s.mid,
            0.8 * s.spread + 0.05 * s.mid + 0.3 * s.zcr,
            1.4 * s.rms + 0.1 * s.high + 0.5 * s.spread,
        ];

        let (idx, confidence) = best_of(&scores, SHARPNESS);
        let label = MainIntent::ALL[idx];
        debug!(?label, confidence, "heuristic main-intent score");
        Classification::new(label, confidence)
    }

    fn classify_help(&mut self, features: &FeatureVector) -> Classification<HelpOption> {
        let s = shape_of(features);

        // Discriminate the four short option words by where their energy
        // concentrates and how percussive they are.
        let scores = [
            0.1 * s.low + 0.5 * s.rms - 0.2 * s.zcr,
            0.1 * s.mid + 0.4 * s.rms + 0.2 * s.zcr,
            0.1 * s.high + 0.6 * s.zcr + 0.2 * s.spread,
            0.1 * s.high + 0.6 * s.rms + 0.4 * s.spread,
        ];

        let (idx, confidence) = best_of(&scores, SHARPNESS);
        let label = HelpOption::ALL[idx];
        debug!(?label, confidence, "heuristic help-option score");
        Classification::new(label, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn vector_with(rms: f32, zcr: f32) -> FeatureVector {
        let mut values = vec![0.0f32; crate::features::FEATURE_DIM];
        values[SLOT_RMS] = rms;
        values[SLOT_ZCR] = zcr;
        FeatureVector::from_values(values)
    }

    #[test]
    fn classification_is_deterministic() {
        let mut clf = HeuristicClassifier::new();
        let v = vector_with(0.4, 0.1);
        let a = clf.classify_main(&v);
        let b = clf.classify_main(&v);
        assert_eq!(a.label, b.label);
        assert_abs_diff_eq!(a.confidence, b.confidence, epsilon = 1e-7);
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        let mut clf = HeuristicClassifier::new();
        for (rms, zcr) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (10.0, 10.0)] {
            let main = clf.classify_main(&vector_with(rms, zcr));
            assert!((0.0..=1.0).contains(&main.confidence));
            let help = clf.classify_help(&vector_with(rms, zcr));
            assert!((0.0..=1.0).contains(&help.confidence));
        }
    }

    #[test]
    fn zero_vector_scores_all_labels_evenly() {
        let mut clf = HeuristicClassifier::new();
        let main = clf.classify_main(&FeatureVector::zeroed());
        assert_abs_diff_eq!(main.confidence, 0.25, epsilon = 1e-6);
        let help = clf.classify_help(&FeatureVector::zeroed());
        assert_abs_diff_eq!(help.confidence, 0.25, epsilon = 1e-6);
    }
}
