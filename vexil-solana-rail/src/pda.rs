//! Deterministic cloud-account derivation.
//!
//! The canonical record for `(owner, cloud_id)` lives at the program-derived
//! address seeded by `["cloud", owner, cloud_id LE]`. Derivation is pure:
//! the same inputs on the same program always land on the same account, so
//! the record is content-addressed and collision-free as long as cloud ids
//! are unique per owner.

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};

use crate::error::RailError;
use crate::types::Address;

/// Seed prefix for cloud accounts.
pub const CLOUD_SEED: &[u8] = b"cloud";

/// Domain tag fixed by the ledger's derivation scheme.
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Derive the cloud account address and its bump seed.
///
/// Walks the bump from 255 downward and returns the first candidate that
/// is not a valid curve point, so no keypair can ever sign for the derived
/// account.
pub fn derive_cloud_address(
    program_id: &Address,
    owner: &Address,
    cloud_id: u64,
) -> Result<(Address, u8), RailError> {
    let id_bytes = cloud_id.to_le_bytes();
    for bump in (0..=255u8).rev() {
        let mut hasher = Sha256::new();
        hasher.update(CLOUD_SEED);
        hasher.update(owner.as_bytes());
        hasher.update(id_bytes);
        hasher.update([bump]);
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let candidate: [u8; 32] = hasher.finalize().into();

        if !is_on_curve(&candidate) {
            return Ok((Address(candidate), bump));
        }
    }
    // Every bump landing on the curve has probability ~2^-256.
    Err(RailError::InvalidInput(format!(
        "no off-curve address for cloud {cloud_id}"
    )))
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use vexil_cloud::{LocalWallet, WalletSigner};

    fn owner() -> Address {
        LocalWallet::generate(&mut rand::rngs::OsRng).public_identity()
    }

    #[test]
    fn derivation_is_deterministic() {
        let program = Address([3u8; 32]);
        let owner = owner();
        let (a, bump_a) = derive_cloud_address(&program, &owner, 42).unwrap();
        let (b, bump_b) = derive_cloud_address(&program, &owner, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(bump_a, bump_b);
    }

    #[test]
    fn distinct_ids_yield_distinct_addresses() {
        let program = Address([3u8; 32]);
        let owner = owner();
        let mut seen = HashSet::new();
        for cloud_id in 0..64u64 {
            let (address, _) = derive_cloud_address(&program, &owner, cloud_id).unwrap();
            assert!(seen.insert(address), "collision at cloud id {cloud_id}");
        }
    }

    #[test]
    fn distinct_owners_yield_distinct_addresses() {
        let program = Address([3u8; 32]);
        let (a, _) = derive_cloud_address(&program, &owner(), 7).unwrap();
        let (b, _) = derive_cloud_address(&program, &owner(), 7).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn derived_addresses_are_off_curve() {
        let program = Address([3u8; 32]);
        let owner = owner();
        for cloud_id in 0..16u64 {
            let (address, _) = derive_cloud_address(&program, &owner, cloud_id).unwrap();
            assert!(!is_on_curve(address.as_bytes()));
        }
    }
}
