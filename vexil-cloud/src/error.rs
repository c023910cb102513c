//! Error types for the probability-cloud core.

use thiserror::Error;

use crate::cloud::{MAX_RING_SIZE, MIN_RING_SIZE};

/// Aggregated error type for cloud assembly and ring-signature derivation.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Requested ring size falls outside the supported bounds.
    #[error("cloud size must be between {MIN_RING_SIZE} and {MAX_RING_SIZE}, got {0}")]
    InvalidSize(usize),

    /// The anonymity set is technically valid but provides minimal cover.
    ///
    /// Non-fatal: callers should surface the warning and may proceed.
    #[error("anonymity set of size {0} provides minimal cover")]
    WeakAnonymitySet(usize),

    /// A ring entry does not decode to a usable curve point.
    #[error("ring member {index} is not a valid curve point")]
    MalformedRingMember { index: usize },

    /// The retained secret does not open the hidden ring slot.
    #[error("secret key does not match the hidden ring member")]
    SecretMismatch,

    /// Wallet capability error.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// Proof adapter packaging error.
    #[error("proof adapter error: {0}")]
    Adapter(String),

    /// Validation error in inputs.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
