//! Error types for the Solana rail.

use thiserror::Error;

/// Aggregated error type for chain interaction.
///
/// Terminal chain errors keep the underlying network message so operators
/// can tell configuration mistakes apart from transient conditions.
#[derive(Debug, Error)]
pub enum RailError {
    /// The derived cloud account already exists on chain. Retry the whole
    /// operation with a freshly minted cloud id — never overwrite.
    #[error("cloud id collision: derived account already exists ({0})")]
    CloudIdCollision(String),

    /// The transaction anchor expired before the network confirmed the
    /// operation.
    #[error("transaction anchor expired before confirmation")]
    AnchorExpired,

    /// Transient network failure; safe to retry with a fresh anchor.
    #[error("transient network error: {0}")]
    NetworkTransient(String),

    /// The fee payer cannot cover the operation.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The instruction payload was rejected as malformed.
    #[error("malformed instruction: {0}")]
    MalformedInstruction(String),

    /// The transaction was submitted and then rejected by the network.
    #[error("transaction failed on chain: {0}")]
    TransactionFailed(String),

    /// Terminal RPC failure.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Wallet capability error.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// Local store error while persisting a reconciliation outcome.
    #[error("store error: {0}")]
    Store(String),

    /// Validation error in inputs.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RailError {
    /// Whether a bounded retry with a fresh anchor is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RailError::NetworkTransient(_))
    }
}

impl From<vexil_cloud::CloudError> for RailError {
    fn from(err: vexil_cloud::CloudError) -> Self {
        RailError::Wallet(err.to_string())
    }
}
