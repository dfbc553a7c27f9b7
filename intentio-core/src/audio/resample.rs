//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! ## Design
//!
//! Uploaded utterances carry whatever rate the client recorded at (commonly
//! 44.1 or 48 kHz in browsers). Feature analysis runs at 16 kHz mono.
//! `RateConverter` bridges that gap on the request thread, where allocation
//! is allowed.
//!
//! When source rate == target rate, `RateConverter` is a zero-copy
//! passthrough — no rubato session is created at all.
//!
//! Unlike a streaming capture path, an utterance is complete when it arrives,
//! so [`RateConverter::convert`] processes the full buffer in one call and
//! zero-pads the final partial chunk instead of holding it for later input.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{IntentioError, Result};

/// Input frame count per rubato call.
const CHUNK_SIZE: usize = 960;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a new converter.
    ///
    /// # Parameters
    /// - `source_rate`: Sample rate of the decoded utterance (Hz).
    /// - `target_rate`: Sample rate expected by the feature frontend (Hz).
    ///
    /// # Errors
    /// Returns `IntentioError::Resample` if rubato fails to initialise.
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio — no dynamic adjustment
            PolynomialDegree::Cubic,
            CHUNK_SIZE,
            1, // mono
        )
        .map_err(|e| IntentioError::Resample(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        Ok(Self {
            resampler: Some(resampler),
            output_buf,
        })
    }

    /// Convert a complete utterance, returning all resampled output.
    ///
    /// The final partial chunk is zero-padded to rubato's fixed input size,
    /// so the output length for a given input is deterministic.
    ///
    /// In passthrough mode (same rates), input is returned directly.
    pub fn convert(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            // Zero-copy passthrough
            return samples.to_vec();
        };

        let mut result = Vec::new();
        let mut padded = Vec::new();

        for chunk in samples.chunks(CHUNK_SIZE) {
            let input_slice = if chunk.len() == CHUNK_SIZE {
                chunk
            } else {
                padded.clear();
                padded.extend_from_slice(chunk);
                padded.resize(CHUNK_SIZE, 0.0);
                &padded[..]
            };

            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }
        }

        result
    }

    /// Returns `true` when source rate == target rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
