//! Utterance decoding.
//!
//! Clients submit each utterance as one complete, bounded byte buffer —
//! usually a WAV container recorded in the browser, but the decoder never
//! rejects input. Anything `hound` cannot parse is treated as raw unsigned
//! 8-bit PCM so that a garbled upload still flows through the rest of the
//! pipeline instead of dead-ending the user's one channel of communication.
//!
//! # Threading note
//!
//! Decoding is pure CPU work on the caller's thread. There is no capture
//! device and no stream lifecycle — the buffer is already complete when it
//! arrives.

pub mod resample;

use std::io::Cursor;

use tracing::debug;

/// Sample rate assumed for buffers that are not a parseable WAV container.
pub const RAW_FALLBACK_SAMPLE_RATE: u32 = 16_000;

/// Default minimum utterance length in bytes.
///
/// Derived from 0.5 s at 16 kHz, relaxed by a factor of ten so clipped
/// browser recordings still pass the pre-check.
pub const DEFAULT_MIN_UTTERANCE_BYTES: usize = 800;

/// Mono samples recovered from an uploaded buffer, at their source rate.
#[derive(Debug, Clone)]
pub struct DecodedUtterance {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz as declared by the container (or the raw fallback).
    pub sample_rate: u32,
}

impl DecodedUtterance {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Pre-check for obviously unusable uploads: empty, or shorter than the
/// configured minimum-duration-equivalent byte length.
///
/// Callers should consult this before [`decode_utterance`], but decoding
/// stays total either way.
pub fn validate(bytes: &[u8], min_bytes: usize) -> bool {
    !bytes.is_empty() && bytes.len() >= min_bytes
}

/// Decode an uploaded buffer to mono f32 samples. Total — never fails.
///
/// WAV input is parsed with `hound` and downmixed; anything else falls back
/// to a raw u8 PCM interpretation. An empty buffer yields empty samples.
pub fn decode_utterance(bytes: &[u8]) -> DecodedUtterance {
    if bytes.is_empty() {
        return DecodedUtterance {
            samples: Vec::new(),
            sample_rate: RAW_FALLBACK_SAMPLE_RATE,
        };
    }

    match decode_wav(bytes) {
        Ok(decoded) => decoded,
        Err(reason) => {
            debug!(%reason, len = bytes.len(), "not a WAV container — raw PCM fallback");
            decode_raw(bytes)
        }
    }
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedUtterance, String> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?
                .into_iter()
                .map(|s| s as f32 / scale)
                .collect()
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples = downmix(&interleaved, channels);

    Ok(DecodedUtterance {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Raw fallback: each byte becomes one centred sample in [-1.0, 1.0).
fn decode_raw(bytes: &[u8]) -> DecodedUtterance {
    let samples = bytes
        .iter()
        .map(|&b| (b as f32 - 128.0) / 128.0)
        .collect();

    DecodedUtterance {
        samples,
        sample_rate: RAW_FALLBACK_SAMPLE_RATE,
    }
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
