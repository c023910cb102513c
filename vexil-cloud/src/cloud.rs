//! Cloud assembly: building anonymity sets of indistinguishable addresses.
//!
//! A probability cloud is an ordered ring of `n` addresses in which exactly
//! one slot — the hidden index — is controlled by the owner. Ring order is
//! significant: it defines the index semantics consumed by the signature
//! scheme, and it must survive untouched between the local cache and the
//! on-chain record.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CloudError;
use crate::keys::{generate_members, Address, SecretSeed};

/// Minimum ring size accepted by the on-chain program.
pub const MIN_RING_SIZE: usize = 2;
/// Maximum ring size accepted by the on-chain program.
pub const MAX_RING_SIZE: usize = 20;

/// Upper bound (exclusive) of the random perturbation added to the
/// timestamp-derived cloud id. Keeps ids unique across clouds minted within
/// the same millisecond by the same owner.
pub const CLOUD_ID_JITTER: u64 = 1 << 12;

/// An assembled anonymity set.
///
/// `addresses` is the ring, in signature order. The hidden index and the
/// retained seed never leave the owning process.
pub struct AddressCloud {
    cloud_id: u64,
    addresses: Vec<Address>,
    hidden_index: usize,
    secret: SecretSeed,
    created_at: i64,
}

impl AddressCloud {
    pub fn cloud_id(&self) -> u64 {
        self.cloud_id
    }

    /// The ring, in signature order.
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Index of the owner-controlled member. Local-only.
    pub fn hidden_index(&self) -> usize {
        self.hidden_index
    }

    /// Address of the owner-controlled member.
    pub fn hidden_address(&self) -> Address {
        self.addresses[self.hidden_index]
    }

    /// Seed of the owner-controlled member. Local-only.
    pub fn secret(&self) -> &SecretSeed {
        &self.secret
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Non-fatal strength check: a two-member ring is accepted by the chain
    /// but the cover it provides is minimal.
    pub fn check_strength(&self) -> Result<(), CloudError> {
        if self.addresses.len() == MIN_RING_SIZE {
            return Err(CloudError::WeakAnonymitySet(self.addresses.len()));
        }
        Ok(())
    }

    /// Snapshot this cloud into its persistable form.
    pub fn to_record(&self) -> CloudRecord {
        CloudRecord {
            cloud_id: self.cloud_id,
            addresses: self.addresses.clone(),
            hidden_index: self.hidden_index,
            secret: self.secret.clone(),
            created_at: self.created_at,
            verified: false,
        }
    }
}

impl std::fmt::Debug for AddressCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The hidden index stays out of debug output: logs are routinely
        // shipped off-box and the index is the whole secret.
        f.debug_struct("AddressCloud")
            .field("cloud_id", &self.cloud_id)
            .field("ring_size", &self.addresses.len())
            .finish_non_exhaustive()
    }
}

/// Persisted mirror of an [`AddressCloud`], plus the reconciliation flag.
///
/// Serializes addresses as base58 strings and the hidden member's seed as
/// raw bytes; decoy secrets are never part of this record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudRecord {
    pub cloud_id: u64,
    pub addresses: Vec<Address>,
    pub hidden_index: usize,
    pub secret: SecretSeed,
    pub created_at: i64,
    #[serde(default)]
    pub verified: bool,
}

impl CloudRecord {
    /// Reopen the record as a live cloud, re-validating its invariants.
    pub fn to_cloud(&self) -> Result<AddressCloud, CloudError> {
        let n = self.addresses.len();
        if !(MIN_RING_SIZE..=MAX_RING_SIZE).contains(&n) {
            return Err(CloudError::InvalidSize(n));
        }
        if self.hidden_index >= n {
            return Err(CloudError::InvalidInput(format!(
                "hidden index {} out of range for ring of {n}",
                self.hidden_index
            )));
        }
        if self.secret.address() != self.addresses[self.hidden_index] {
            return Err(CloudError::SecretMismatch);
        }
        Ok(AddressCloud {
            cloud_id: self.cloud_id,
            addresses: self.addresses.clone(),
            hidden_index: self.hidden_index,
            secret: self.secret.clone(),
            created_at: self.created_at,
        })
    }
}

/// Builds probability clouds.
pub struct CloudAssembler;

impl CloudAssembler {
    /// Assemble a fresh cloud of `n` members using the OS entropy source.
    pub fn assemble(n: usize) -> Result<AddressCloud, CloudError> {
        Self::assemble_with_rng(n, &mut rand::rngs::OsRng)
    }

    /// Assemble with an explicit random source.
    ///
    /// Every decoy keypair is dropped — and its key material wiped — as
    /// soon as its address has been extracted. Only the hidden member's
    /// seed is retained.
    pub fn assemble_with_rng<R: RngCore + CryptoRng>(
        n: usize,
        rng: &mut R,
    ) -> Result<AddressCloud, CloudError> {
        let members = generate_members(n, rng)?;
        let hidden_index = rng.gen_range(0..n);
        let cloud_id = mint_cloud_id(rng);
        let created_at = unix_now() as i64;

        let addresses: Vec<Address> = members.iter().map(|m| m.address()).collect();
        let mut secret = None;
        for (idx, member) in members.into_iter().enumerate() {
            if idx == hidden_index {
                secret = Some(member.into_seed());
            }
            // Decoys fall out of scope here; SigningKey wipes itself on drop.
        }
        let secret = secret.ok_or_else(|| {
            CloudError::InvalidInput("hidden index not covered by generated members".into())
        })?;

        if n == MIN_RING_SIZE {
            warn!(cloud_size = n, "assembling a minimal anonymity set");
        }

        Ok(AddressCloud {
            cloud_id,
            addresses,
            hidden_index,
            secret,
            created_at,
        })
    }
}

/// Mint a cloud id: millisecond timestamp plus uniform jitter.
///
/// Collisions are still possible in principle; the chain rejects the loser
/// at submission time and the caller retries with a fresh id.
fn mint_cloud_id<R: RngCore + CryptoRng>(rng: &mut R) -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    millis.saturating_add(rng.gen_range(0..CLOUD_ID_JITTER))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
