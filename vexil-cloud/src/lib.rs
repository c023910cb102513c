//! vexil-cloud
//!
//! Probability-cloud core: a cloud is an ordered ring of N ed25519
//! addresses, exactly one of which — the hidden index — the owner controls.
//! This crate assembles clouds, derives the inputs a ring-signature prover
//! consumes, and packages proofs for the on-chain verifier.
//!
//! # Security boundary
//!
//! Only the hidden member's seed survives assembly. Decoy key material is
//! wiped as soon as its address is extracted, the hidden index never
//! appears in anything serialized for the network, and signing inputs are
//! ephemeral — derived per operation, zeroized on drop, never persisted.
//!
//! # Signature schemes
//!
//! The ring scheme is pluggable. [`ring::Blsag`] is the real construction:
//! a linkable ring signature whose key image ties repeated spends by the
//! same member together without identifying them. [`ring::MockRing`] is the
//! deterministic stand-in for the interactive verifier used in tests; which
//! one a deployment uses is an explicit [`proof::ProofMode`] choice.

pub mod cloud;
pub mod error;
pub mod keys;
pub mod proof;
pub mod ring;
pub mod wallet;

pub use cloud::{AddressCloud, CloudAssembler, CloudRecord, MAX_RING_SIZE, MIN_RING_SIZE};
pub use error::CloudError;
pub use keys::{generate_members, Address, MemberKeypair, SecretSeed};
pub use proof::{ProofAdapter, ProofArtifacts, ProofMode};
pub use ring::{
    decode_ring, Blsag, BlsagSignature, MockRing, MockSignature, RingScheme, RingSignature,
    RingSignatureInputBuilder, RingSignatureInputs,
};
pub use wallet::{LocalWallet, WalletSigner};
