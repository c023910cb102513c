//! Member key material for probability clouds.
//!
//! Every cloud member is an independent ed25519 keypair. Only the hidden
//! member's seed outlives assembly; decoy keypairs are dropped as soon as
//! their public address has been extracted, and the drop wipes the secret.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cloud::{MAX_RING_SIZE, MIN_RING_SIZE};
use crate::error::CloudError;

/// A 32-byte public address (an ed25519 public key, base58-rendered).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_base58())
    }
}

impl FromStr for Address {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CloudError::InvalidInput(format!("invalid base58 address: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CloudError::InvalidInput("address must decode to 32 bytes".into()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A 32-byte ed25519 seed, wiped on drop.
///
/// This is the only secret the cloud retains: the hidden member's seed.
#[derive(Clone, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretSeed([u8; 32]);

impl SecretSeed {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Rebuild the signing key for this seed.
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.0)
    }

    /// Public address for this seed.
    pub fn address(&self) -> Address {
        Address(self.signing_key().verifying_key().to_bytes())
    }
}

impl fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never expose the seed bytes in debug output.
        f.debug_struct("SecretSeed").finish_non_exhaustive()
    }
}

impl PartialEq for SecretSeed {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretSeed {}

/// One cloud member's keypair. Decoys are dropped after address extraction;
/// the drop zeroizes the underlying key material.
pub struct MemberKeypair {
    signing: SigningKey,
}

impl MemberKeypair {
    /// Generate a fresh keypair from a cryptographically secure source.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            signing: SigningKey::generate(rng),
        }
    }

    pub fn address(&self) -> Address {
        Address(self.signing.verifying_key().to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Extract the seed, consuming the keypair.
    pub fn into_seed(self) -> SecretSeed {
        SecretSeed(self.signing.to_bytes())
    }

    /// Sign a raw message with this member's key.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

impl fmt::Debug for MemberKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberKeypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Generate `n` independent member keypairs.
///
/// Fails with [`CloudError::InvalidSize`] outside `[2, 20]`. Intentionally
/// non-deterministic: key material is never reused across clouds.
pub fn generate_members<R: RngCore + CryptoRng>(
    n: usize,
    rng: &mut R,
) -> Result<Vec<MemberKeypair>, CloudError> {
    if !(MIN_RING_SIZE..=MAX_RING_SIZE).contains(&n) {
        return Err(CloudError::InvalidSize(n));
    }
    Ok((0..n).map(|_| MemberKeypair::generate(rng)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn generates_requested_count() {
        for n in [2, 5, 20] {
            let members = generate_members(n, &mut OsRng).expect("should generate");
            assert_eq!(members.len(), n);
        }
    }

    #[test]
    fn rejects_out_of_range_sizes() {
        for n in [0, 1, 21, 100] {
            assert!(matches!(
                generate_members(n, &mut OsRng),
                Err(CloudError::InvalidSize(_))
            ));
        }
    }

    #[test]
    fn members_are_independent() {
        let members = generate_members(5, &mut OsRng).unwrap();
        let mut addresses: Vec<_> = members.iter().map(|m| m.address()).collect();
        addresses.dedup();
        assert_eq!(addresses.len(), 5);
    }

    #[test]
    fn address_base58_round_trip() {
        let member = MemberKeypair::generate(&mut OsRng);
        let address = member.address();
        let parsed: Address = address.to_base58().parse().unwrap();
        assert_eq!(address, parsed);
    }

    #[test]
    fn seed_reopens_to_same_address() {
        let member = MemberKeypair::generate(&mut OsRng);
        let address = member.address();
        let seed = member.into_seed();
        assert_eq!(seed.address(), address);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let member = MemberKeypair::generate(&mut OsRng);
        let seed = member.into_seed();
        let rendered = format!("{seed:?}");
        assert!(!rendered.contains(&hex::encode(seed.as_bytes())));
    }
}
