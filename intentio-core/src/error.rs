use thiserror::Error;

/// All errors produced by intentio-core.
#[derive(Debug, Error)]
pub enum IntentioError {
    #[error("audio decode error: {0}")]
    AudioDecode(String),

    #[error("resampler error: {0}")]
    Resample(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("unknown intent label: {0}")]
    UnknownLabel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, IntentioError>;
