//! Feature extraction frontend.
//!
//! Turns one complete utterance buffer into a fixed-dimension vector:
//!
//! ```text
//! bytes → decode (WAV | raw PCM) → resample to 16 kHz → summary stats
//!                                                     → FFT band energies
//! ```
//!
//! ## Vector layout (dimension 128)
//!
//! | Slot    | Content                                  |
//! |---------|------------------------------------------|
//! | 0       | sample mean                              |
//! | 1       | sample standard deviation                |
//! | 2       | RMS level                                |
//! | 3       | zero-crossing rate                       |
//! | 4..36   | 32 log band energies (256-pt FFT, Hann)  |
//! | 36..128 | zero padding                             |
//!
//! Extraction is total: when no samples can be recovered from the buffer the
//! all-zero vector is returned, because a downstream confirmation step can
//! absorb low-quality input but a hard failure cannot be recovered
//! mid-utterance.

use std::fmt;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::{self, resample::RateConverter};

/// Fixed dimension of every feature vector in the system.
pub const FEATURE_DIM: usize = 128;

/// Analysis sample rate. Everything is resampled here before analysis.
pub const ANALYSIS_SAMPLE_RATE: u32 = 16_000;

const FFT_SIZE: usize = 256;
const HOP: usize = 128;
const N_BANDS: usize = 32;
/// Slots 0..4 hold summary statistics; band energies start here.
const BAND_OFFSET: usize = 4;

/// A fixed-dimension utterance feature vector.
///
/// Produced by [`FeatureExtractor`]; immutable once produced and owned by
/// whoever received it — it has no identity beyond its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    /// Build a vector from raw values, padding or truncating to
    /// [`FEATURE_DIM`].
    pub fn from_values(mut values: Vec<f32>) -> Self {
        values.resize(FEATURE_DIM, 0.0);
        Self { values }
    }

    /// The deterministic fallback vector: all zeros.
    pub fn zeroed() -> Self {
        Self {
            values: vec![0.0; FEATURE_DIM],
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity against another vector. Returns 0.0 when either
    /// vector has zero norm.
    pub fn cosine_similarity(&self, other: &FeatureVector) -> f32 {
        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();
        let norm_a: f32 = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm_b: f32 = other.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

/// Element-wise mean of a sample bank. Returns the zero vector for an empty
/// bank so callers never divide by zero.
pub fn centroid(samples: &[FeatureVector]) -> FeatureVector {
    if samples.is_empty() {
        return FeatureVector::zeroed();
    }
    let mut sums = vec![0.0f64; FEATURE_DIM];
    for sample in samples {
        for (acc, v) in sums.iter_mut().zip(sample.as_slice()) {
            *acc += *v as f64;
        }
    }
    let n = samples.len() as f64;
    FeatureVector::from_values(sums.into_iter().map(|s| (s / n) as f32).collect())
}

/// Stateless utterance-to-vector frontend.
///
/// `Send + Sync` — the FFT plan is shared behind an `Arc` and all scratch
/// buffers are per-call, so one extractor serves concurrent requests.
pub struct FeatureExtractor {
    target_sample_rate: u32,
    min_utterance_bytes: usize,
    hann_window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl FeatureExtractor {
    pub fn new(target_sample_rate: u32, min_utterance_bytes: usize) -> Self {
        let hann_window: Vec<f32> = (0..FFT_SIZE)
            .map(|i| {
                let x = (i as f32) / (FFT_SIZE as f32);
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * x).cos()
            })
            .collect();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(FFT_SIZE);

        Self {
            target_sample_rate,
            min_utterance_bytes,
            hann_window,
            fft,
        }
    }

    /// Pre-check: is this buffer long enough to plausibly hold an utterance?
    pub fn validate(&self, bytes: &[u8]) -> bool {
        audio::validate(bytes, self.min_utterance_bytes)
    }

    /// Extract a [`FEATURE_DIM`]-dimension vector from an uploaded buffer.
    ///
    /// Total — every input, including empty and malformed buffers, yields a
    /// vector. Buffers from which no samples can be recovered map to the
    /// all-zero fallback.
    pub fn extract(&self, bytes: &[u8]) -> FeatureVector {
        let decoded = audio::decode_utterance(bytes);
        if decoded.is_empty() {
            debug!(len = bytes.len(), "no samples recovered — zero fallback");
            return FeatureVector::zeroed();
        }

        let samples = if decoded.sample_rate == self.target_sample_rate {
            decoded.samples
        } else {
            match RateConverter::new(decoded.sample_rate, self.target_sample_rate) {
                Ok(mut rc) => rc.convert(&decoded.samples),
                Err(e) => {
                    warn!(
                        source_rate = decoded.sample_rate,
                        error = %e,
                        "resampler unavailable — zero fallback"
                    );
                    return FeatureVector::zeroed();
                }
            }
        };

        if samples.is_empty() {
            return FeatureVector::zeroed();
        }

        let mut values = vec![0.0f32; FEATURE_DIM];
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        let variance =
            samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / samples.len() as f32;
        let rms =
            (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt();

        values[0] = mean;
        values[1] = variance.sqrt();
        values[2] = rms;
        values[3] = zero_crossing_rate(&samples);

        let bands = self.band_energies(&samples);
        values[BAND_OFFSET..BAND_OFFSET + N_BANDS].copy_from_slice(&bands);

        FeatureVector { values }
    }

    /// Mean log power per frequency band across Hann-windowed FFT frames.
    fn band_energies(&self, samples: &[f32]) -> [f32; N_BANDS] {
        let n_bins = FFT_SIZE / 2 + 1;
        let mut band_power = [0.0f64; N_BANDS];
        let mut fft_buf = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];
        let mut frames = 0usize;

        let mut start = 0;
        loop {
            for (i, slot) in fft_buf.iter_mut().enumerate() {
                let s = samples.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(s * self.hann_window[i], 0.0);
            }
            self.fft.process(&mut fft_buf);

            for (band, acc) in band_power.iter_mut().enumerate() {
                let lo = band * n_bins / N_BANDS;
                let hi = ((band + 1) * n_bins / N_BANDS).max(lo + 1);
                let power: f32 = fft_buf[lo..hi].iter().map(|c| c.norm_sqr()).sum();
                *acc += (power / (hi - lo) as f32) as f64;
            }
            frames += 1;

            start += HOP;
            if start + 1 >= samples.len() {
                break;
            }
        }

        let mut bands = [0.0f32; N_BANDS];
        for (out, acc) in bands.iter_mut().zip(band_power.iter()) {
            let mean_power = (*acc / frames as f64) as f32;
            *out = mean_power.max(1e-10).log10();
        }
        bands
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ANALYSIS_SAMPLE_RATE, audio::DEFAULT_MIN_UTTERANCE_BYTES)
    }
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("target_sample_rate", &self.target_sample_rate)
            .field("min_utterance_bytes", &self.min_utterance_bytes)
            .finish_non_exhaustive()
    }
}

fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}
