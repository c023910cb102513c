//! Shared types for the Solana rail.

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RailError;
pub use vexil_cloud::Address;

/// A recent blockhash: the transaction anchor. Expires once the chain
/// passes its validity window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Blockhash(pub [u8; 32]);

impl Blockhash {
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl FromStr for Blockhash {
    type Err = RailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| RailError::InvalidInput(format!("invalid base58 blockhash: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RailError::InvalidInput("blockhash must decode to 32 bytes".into()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

/// A fresh anchor plus the block height at which it stops being valid.
#[derive(Clone, Copy, Debug)]
pub struct LatestBlockhash {
    pub blockhash: Blockhash,
    pub last_valid_block_height: u64,
}

/// Commitment level applied uniformly to every read and write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentLevel {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl CommitmentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentLevel::Processed => "processed",
            CommitmentLevel::Confirmed => "confirmed",
            CommitmentLevel::Finalized => "finalized",
        }
    }

    /// Whether a reported status satisfies this commitment.
    pub fn is_satisfied_by(&self, status: &str) -> bool {
        match self {
            CommitmentLevel::Processed => {
                matches!(status, "processed" | "confirmed" | "finalized")
            }
            CommitmentLevel::Confirmed => matches!(status, "confirmed" | "finalized"),
            CommitmentLevel::Finalized => status == "finalized",
        }
    }
}

/// The canonical on-chain cloud record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCloudRecord {
    pub owner: Address,
    pub cloud_id: u64,
    /// Ring order as committed on chain. Order is security-relevant: it
    /// defines the index semantics the signature scheme consumes.
    pub ring: Vec<Address>,
    pub created_at: i64,
}

/// Rail configuration.
#[derive(Clone, Debug)]
pub struct RailConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// The deployed cloud program.
    pub program_id: Address,
    /// Commitment level for all reads and writes.
    pub commitment: CommitmentLevel,
    /// Maximum submission retries on transient network errors.
    pub max_retries: u32,
    /// Confirmation poll interval, milliseconds.
    pub poll_interval_ms: u64,
}

impl RailConfig {
    pub fn new(rpc_url: impl Into<String>, program_id: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            program_id,
            commitment: CommitmentLevel::Confirmed,
            max_retries: 3,
            poll_interval_ms: 400,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, RailError> {
        let rpc_url = env::var("VEXIL_RPC_URL")
            .unwrap_or_else(|_| "https://api.devnet.solana.com".to_string());

        let program_id: Address = env::var("VEXIL_PROGRAM_ID")
            .map_err(|_| RailError::InvalidInput("VEXIL_PROGRAM_ID must be set".into()))?
            .parse()
            .map_err(|e: vexil_cloud::CloudError| {
                RailError::InvalidInput(format!("VEXIL_PROGRAM_ID: {e}"))
            })?;

        let commitment = match env::var("VEXIL_COMMITMENT").as_deref() {
            Ok("processed") => CommitmentLevel::Processed,
            Ok("finalized") => CommitmentLevel::Finalized,
            _ => CommitmentLevel::Confirmed,
        };

        let max_retries: u32 = env::var("VEXIL_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let poll_interval_ms: u64 = env::var("VEXIL_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(400);

        Ok(Self {
            rpc_url,
            program_id,
            commitment,
            max_retries,
            poll_interval_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blockhash_base58_round_trip() {
        let hash = Blockhash([7u8; 32]);
        let parsed: Blockhash = hash.to_base58().parse().unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn commitment_satisfaction_ordering() {
        assert!(CommitmentLevel::Confirmed.is_satisfied_by("finalized"));
        assert!(CommitmentLevel::Confirmed.is_satisfied_by("confirmed"));
        assert!(!CommitmentLevel::Confirmed.is_satisfied_by("processed"));
        assert!(!CommitmentLevel::Finalized.is_satisfied_by("confirmed"));
        assert!(CommitmentLevel::Processed.is_satisfied_by("processed"));
    }
}
