//! The narrow wallet capability the core depends on.
//!
//! The chain client needs exactly three things from a wallet: its public
//! identity, a transaction signature, and an off-chain message signature.
//! Anything wider couples the core to a specific wallet implementation.

use ed25519_dalek::{Signer, SigningKey};
use rand::{CryptoRng, RngCore};

use crate::error::CloudError;
use crate::keys::{Address, SecretSeed};

/// Wallet capability surface.
pub trait WalletSigner: Send + Sync {
    /// The fee payer / owner identity.
    fn public_identity(&self) -> Address;

    /// Sign a serialized transaction message.
    fn sign_transaction(&self, message: &[u8]) -> Result<[u8; 64], CloudError>;

    /// Sign an off-chain message.
    fn sign_message(&self, message: &[u8]) -> Result<[u8; 64], CloudError>;
}

/// In-process ed25519 wallet.
pub struct LocalWallet {
    key: SigningKey,
}

impl LocalWallet {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            key: SigningKey::generate(rng),
        }
    }

    pub fn from_seed(seed: &SecretSeed) -> Self {
        Self {
            key: seed.signing_key(),
        }
    }
}

impl WalletSigner for LocalWallet {
    fn public_identity(&self) -> Address {
        Address(self.key.verifying_key().to_bytes())
    }

    fn sign_transaction(&self, message: &[u8]) -> Result<[u8; 64], CloudError> {
        Ok(self.key.sign(message).to_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> Result<[u8; 64], CloudError> {
        // Domain-separated so off-chain signatures can never be replayed as
        // transaction signatures.
        let mut framed = Vec::with_capacity(message.len() + 16);
        framed.extend_from_slice(b"vexil-offchain:");
        framed.extend_from_slice(message);
        Ok(self.key.sign(&framed).to_bytes())
    }
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet")
            .field("public_identity", &self.public_identity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};
    use rand::rngs::OsRng;

    #[test]
    fn transaction_signature_verifies() {
        let wallet = LocalWallet::generate(&mut OsRng);
        let message = b"serialized transaction bytes";
        let signature = wallet.sign_transaction(message).unwrap();

        let key = VerifyingKey::from_bytes(wallet.public_identity().as_bytes()).unwrap();
        assert!(key
            .verify(message, &Signature::from_bytes(&signature))
            .is_ok());
    }

    #[test]
    fn message_and_transaction_domains_differ() {
        let wallet = LocalWallet::generate(&mut OsRng);
        let tx = wallet.sign_transaction(b"payload").unwrap();
        let msg = wallet.sign_message(b"payload").unwrap();
        assert_ne!(tx, msg);
    }
}
