//! Error types shared by every stage of the imaging pipeline.

use thiserror::Error;

/// Result type for sonar processing
pub type SonarResult<T> = Result<T, SonarError>;

/// Failures reported by an external data source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    /// The device could not be reached or did not answer in time
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    /// The device answered but the framing was not understood
    #[error("malformed acquisition: {0}")]
    Malformed(String),
}

/// Errors that abort a processing run.
///
/// Inverse-filter bins that divide to non-finite values never show up here:
/// they are zeroed where they happen.
#[derive(Error, Debug)]
pub enum SonarError {
    /// Inconsistent scalar parameters, detected before any numeric work
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The data source failed; no partial image is produced
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// Captured channel count does not match the receiver geometry
    #[error("expected {expected} receiver channels, got {actual}")]
    ChannelCount { expected: usize, actual: usize },

    /// Captured channels are not the receivers 0..n in order
    #[error("channel at position {position} belongs to receiver {receiver}")]
    ChannelOrder { position: usize, receiver: usize },

    /// A buffer does not have the length of the active axis set
    #[error("receiver {receiver}: expected {expected} samples, got {actual}")]
    BufferLength {
        receiver: usize,
        expected: usize,
        actual: usize,
    },

    /// A beamforming delay falls outside the range profile
    #[error("receiver {receiver}: delay {delay:.6}s maps to sample {index}, profile has {len}")]
    IndexOutOfRange {
        receiver: usize,
        delay: f64,
        index: usize,
        len: usize,
    },

    /// Reference or capture waveform store failure
    #[error("waveform store: {0}")]
    Store(String),

    /// Configuration document could not be parsed
    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),
}

impl SonarError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SonarError::Configuration(msg.into())
    }
}
