//! Ring-signature input derivation and the pluggable signature scheme.
//!
//! The prover needs four things: the ring (the cloud's addresses decoded to
//! curve points, in ring order), the hidden member's private scalar, a
//! fixed-width digest of the message, and the signature value itself. All
//! of it is derived fresh per signing operation and none of it is ever
//! persisted.
//!
//! Two schemes sit behind [`RingScheme`]:
//!
//! * [`Blsag`] — a back-linkable spontaneous anonymous group signature over
//!   the ring's ed25519 points. Verification succeeds against the ring as a
//!   whole without identifying the signer; signatures by the same member
//!   share a key image, so double-spends are detectable.
//! * [`MockRing`] — the deterministic stand-in used with the interactive
//!   verifier in tests. It has no unforgeability or anonymity properties.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use tracing::warn;
use zeroize::Zeroize;

use crate::cloud::{AddressCloud, MIN_RING_SIZE};
use crate::error::CloudError;
use crate::keys::Address;

/// Everything the proving collaborator consumes for one signing operation.
///
/// Ephemeral by construction: the private scalar is wiped on drop and the
/// struct has no serialization path.
pub struct RingSignatureInputs {
    private_scalar: Scalar,
    /// Equals the cloud's hidden index.
    pub key_index: usize,
    /// Ring points in the cloud's address order.
    pub ring: Vec<EdwardsPoint>,
    /// SHA-256 of the signed message.
    pub message_digest: [u8; 32],
    pub signature: RingSignature,
}

impl RingSignatureInputs {
    /// The prover's witness scalar.
    pub fn private_scalar(&self) -> &Scalar {
        &self.private_scalar
    }
}

impl Drop for RingSignatureInputs {
    fn drop(&mut self) {
        self.private_scalar.zeroize();
    }
}

impl std::fmt::Debug for RingSignatureInputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingSignatureInputs")
            .field("ring_size", &self.ring.len())
            .field("message_digest", &hex::encode(self.message_digest))
            .finish_non_exhaustive()
    }
}

/// A ring signature in one of the supported schemes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum RingSignature {
    Blsag(BlsagSignature),
    Mock(MockSignature),
}

/// bLSAG signature: key image, initial challenge, one response per member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsagSignature {
    pub key_image: [u8; 32],
    pub c0: [u8; 32],
    pub responses: Vec<[u8; 32]>,
}

/// Deterministic mock signature: the witness folded with the message
/// scalar. Shape-compatible with the real thing, security-free.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockSignature {
    pub value: [u8; 32],
}

/// Pluggable ring-signature strategy.
pub trait RingScheme {
    /// Sign `message_digest` as the member at `key_index`.
    fn sign(
        &self,
        ring: &[EdwardsPoint],
        witness: &Scalar,
        key_index: usize,
        message_digest: &[u8; 32],
    ) -> Result<RingSignature, CloudError>;

    /// Verify a signature against the full ring. Must not require — or
    /// reveal — the signer's index.
    fn verify(
        &self,
        ring: &[EdwardsPoint],
        message_digest: &[u8; 32],
        signature: &RingSignature,
    ) -> bool;
}

/// Back-linkable spontaneous anonymous group signatures over ed25519.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blsag;

impl Blsag {
    fn sign_with_rng<R: RngCore + CryptoRng>(
        ring: &[EdwardsPoint],
        witness: &Scalar,
        key_index: usize,
        message_digest: &[u8; 32],
        rng: &mut R,
    ) -> Result<BlsagSignature, CloudError> {
        let n = ring.len();
        if key_index >= n {
            return Err(CloudError::InvalidInput(format!(
                "key index {key_index} out of range for ring of {n}"
            )));
        }
        if EdwardsPoint::mul_base(witness) != ring[key_index] {
            return Err(CloudError::SecretMismatch);
        }

        let hp_signer = hash_to_point(ring[key_index].compress().as_bytes());
        let key_image = witness * hp_signer;
        let base = base_transcript(ring, &key_image, message_digest);

        let mut challenges = vec![Scalar::ZERO; n];
        let mut responses = vec![Scalar::ZERO; n];

        // Open the chain at the signer's slot with a fresh nonce.
        let alpha = Scalar::random(rng);
        challenges[(key_index + 1) % n] = challenge(
            &base,
            &EdwardsPoint::mul_base(&alpha),
            &(alpha * hp_signer),
        );

        // Walk the ring, closing every decoy slot with a random response.
        let mut i = (key_index + 1) % n;
        while i != key_index {
            responses[i] = Scalar::random(rng);
            let hp_i = hash_to_point(ring[i].compress().as_bytes());
            let l =
                EdwardsPoint::vartime_double_scalar_mul_basepoint(&challenges[i], &ring[i], &responses[i]);
            let r = responses[i] * hp_i + challenges[i] * key_image;
            challenges[(i + 1) % n] = challenge(&base, &l, &r);
            i = (i + 1) % n;
        }

        // Close the signer's slot so the chain wraps.
        responses[key_index] = alpha - challenges[key_index] * witness;

        Ok(BlsagSignature {
            key_image: key_image.compress().to_bytes(),
            c0: challenges[0].to_bytes(),
            responses: responses.iter().map(|s| s.to_bytes()).collect(),
        })
    }

    fn verify_inner(
        ring: &[EdwardsPoint],
        message_digest: &[u8; 32],
        signature: &BlsagSignature,
    ) -> bool {
        let n = ring.len();
        if n == 0 || signature.responses.len() != n {
            return false;
        }

        let Some(key_image) = CompressedEdwardsY(signature.key_image).decompress() else {
            return false;
        };
        // A torsioned key image would let a signer mint unlinked images.
        if key_image.is_identity() || !key_image.is_torsion_free() {
            return false;
        }
        let Some(c0) = Option::<Scalar>::from(Scalar::from_canonical_bytes(signature.c0)) else {
            return false;
        };
        let responses: Option<Vec<Scalar>> = signature
            .responses
            .iter()
            .map(|bytes| Option::<Scalar>::from(Scalar::from_canonical_bytes(*bytes)))
            .collect();
        let Some(responses) = responses else {
            return false;
        };

        let base = base_transcript(ring, &key_image, message_digest);
        let mut c = c0;
        for (point, response) in ring.iter().zip(&responses) {
            let hp = hash_to_point(point.compress().as_bytes());
            let l = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, point, response);
            let r = response * hp + c * key_image;
            c = challenge(&base, &l, &r);
        }
        c == c0
    }
}

impl RingScheme for Blsag {
    fn sign(
        &self,
        ring: &[EdwardsPoint],
        witness: &Scalar,
        key_index: usize,
        message_digest: &[u8; 32],
    ) -> Result<RingSignature, CloudError> {
        Self::sign_with_rng(ring, witness, key_index, message_digest, &mut rand::rngs::OsRng)
            .map(RingSignature::Blsag)
    }

    fn verify(
        &self,
        ring: &[EdwardsPoint],
        message_digest: &[u8; 32],
        signature: &RingSignature,
    ) -> bool {
        match signature {
            RingSignature::Blsag(sig) => Self::verify_inner(ring, message_digest, sig),
            RingSignature::Mock(_) => false,
        }
    }
}

/// Deterministic mock scheme for the interactive verifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockRing;

impl RingScheme for MockRing {
    fn sign(
        &self,
        ring: &[EdwardsPoint],
        witness: &Scalar,
        key_index: usize,
        message_digest: &[u8; 32],
    ) -> Result<RingSignature, CloudError> {
        if key_index >= ring.len() {
            return Err(CloudError::InvalidInput(format!(
                "key index {key_index} out of range for ring of {}",
                ring.len()
            )));
        }
        let folded = witness + Scalar::from_bytes_mod_order(*message_digest);
        Ok(RingSignature::Mock(MockSignature {
            value: folded.to_bytes(),
        }))
    }

    fn verify(
        &self,
        _ring: &[EdwardsPoint],
        _message_digest: &[u8; 32],
        signature: &RingSignature,
    ) -> bool {
        // The interactive verifier only checks well-formedness; without the
        // witness there is nothing else a mock value can prove.
        matches!(signature, RingSignature::Mock(sig) if sig.value != [0u8; 32])
    }
}

/// Derives [`RingSignatureInputs`] from a cloud and a message.
pub struct RingSignatureInputBuilder<S: RingScheme = Blsag> {
    scheme: S,
}

impl RingSignatureInputBuilder<Blsag> {
    pub fn new() -> Self {
        Self { scheme: Blsag }
    }
}

impl Default for RingSignatureInputBuilder<Blsag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RingScheme> RingSignatureInputBuilder<S> {
    pub fn with_scheme(scheme: S) -> Self {
        Self { scheme }
    }

    /// Derive fresh signing inputs for `message`.
    ///
    /// The message is always reduced through SHA-256 first, so signature
    /// shape carries no information about message length.
    pub fn build(
        &self,
        cloud: &AddressCloud,
        message: &[u8],
    ) -> Result<RingSignatureInputs, CloudError> {
        let message_digest: [u8; 32] = Sha256::digest(message).into();
        let ring = decode_ring(cloud.addresses())?;
        let key_index = cloud.hidden_index();

        let mut private_scalar = cloud.secret().signing_key().to_scalar();
        if EdwardsPoint::mul_base(&private_scalar) != ring[key_index] {
            private_scalar.zeroize();
            return Err(CloudError::SecretMismatch);
        }

        if cloud.len() == MIN_RING_SIZE {
            warn!(
                cloud_id = cloud.cloud_id(),
                "signing with a minimal anonymity set"
            );
        }

        let signature = self
            .scheme
            .sign(&ring, &private_scalar, key_index, &message_digest)?;

        Ok(RingSignatureInputs {
            private_scalar,
            key_index,
            ring,
            message_digest,
            signature,
        })
    }

    pub fn scheme(&self) -> &S {
        &self.scheme
    }
}

/// Decode addresses to ring points, rejecting anything that is not a
/// valid, torsion-free Edwards point.
pub fn decode_ring(addresses: &[Address]) -> Result<Vec<EdwardsPoint>, CloudError> {
    addresses
        .iter()
        .enumerate()
        .map(|(index, address)| {
            CompressedEdwardsY(*address.as_bytes())
                .decompress()
                .filter(|point| point.is_torsion_free() && !point.is_identity())
                .ok_or(CloudError::MalformedRingMember { index })
        })
        .collect()
}

fn base_transcript(
    ring: &[EdwardsPoint],
    key_image: &EdwardsPoint,
    message_digest: &[u8; 32],
) -> Transcript {
    let mut transcript = Transcript::new(b"vexil.blsag.v1");
    transcript.append_u64(b"ring-len", ring.len() as u64);
    for point in ring {
        transcript.append_message(b"ring", point.compress().as_bytes());
    }
    transcript.append_message(b"key-image", key_image.compress().as_bytes());
    transcript.append_message(b"message", message_digest);
    transcript
}

fn challenge(base: &Transcript, l: &EdwardsPoint, r: &EdwardsPoint) -> Scalar {
    let mut transcript = base.clone();
    transcript.append_message(b"L", l.compress().as_bytes());
    transcript.append_message(b"R", r.compress().as_bytes());
    let mut buf = [0u8; 64];
    transcript.challenge_bytes(b"c", &mut buf);
    Scalar::from_bytes_mod_order_wide(&buf)
}

/// Map a compressed point to a second, discrete-log-free generator.
///
/// Hash-and-retry: interpret successive SHA-512 outputs as candidate
/// y-coordinates until one decompresses, then clear the cofactor. Each
/// candidate succeeds with probability ~1/2, so the loop is short.
fn hash_to_point(input: &[u8; 32]) -> EdwardsPoint {
    let mut counter = 0u64;
    loop {
        let mut hasher = Sha512::new();
        hasher.update(b"vexil.blsag.hp");
        hasher.update(input);
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();

        let mut candidate = [0u8; 32];
        candidate.copy_from_slice(&digest[..32]);
        if let Some(point) = CompressedEdwardsY(candidate).decompress() {
            let point = point.mul_by_cofactor();
            if !point.is_identity() {
                return point;
            }
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::CloudAssembler;

    fn blsag_parts(signature: &RingSignature) -> &BlsagSignature {
        match signature {
            RingSignature::Blsag(sig) => sig,
            RingSignature::Mock(_) => panic!("expected a blsag signature"),
        }
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let cloud = CloudAssembler::assemble(5).unwrap();
        let builder = RingSignatureInputBuilder::new();
        let inputs = builder.build(&cloud, b"spend 1000 lamports").unwrap();

        assert_eq!(inputs.key_index, cloud.hidden_index());
        assert_eq!(inputs.ring.len(), 5);
        assert!(builder
            .scheme()
            .verify(&inputs.ring, &inputs.message_digest, &inputs.signature));
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let cloud = CloudAssembler::assemble(4).unwrap();
        let builder = RingSignatureInputBuilder::new();
        let inputs = builder.build(&cloud, b"original").unwrap();

        let other_digest: [u8; 32] = Sha256::digest(b"tampered").into();
        assert!(!builder
            .scheme()
            .verify(&inputs.ring, &other_digest, &inputs.signature));
    }

    #[test]
    fn verify_rejects_tampered_ring() {
        let cloud = CloudAssembler::assemble(4).unwrap();
        let builder = RingSignatureInputBuilder::new();
        let inputs = builder.build(&cloud, b"message").unwrap();

        let mut ring = inputs.ring.clone();
        ring.swap(0, 1);
        assert!(!builder
            .scheme()
            .verify(&ring, &inputs.message_digest, &inputs.signature));

        let stranger = CloudAssembler::assemble(2).unwrap();
        let mut ring = inputs.ring.clone();
        ring[0] = decode_ring(stranger.addresses()).unwrap()[0];
        assert!(!builder
            .scheme()
            .verify(&ring, &inputs.message_digest, &inputs.signature));
    }

    #[test]
    fn verify_rejects_tampered_responses() {
        let cloud = CloudAssembler::assemble(3).unwrap();
        let builder = RingSignatureInputBuilder::new();
        let inputs = builder.build(&cloud, b"message").unwrap();

        let mut sig = blsag_parts(&inputs.signature).clone();
        sig.responses[0][0] ^= 0x01;
        assert!(!builder.scheme().verify(
            &inputs.ring,
            &inputs.message_digest,
            &RingSignature::Blsag(sig)
        ));
    }

    #[test]
    fn same_signer_links_through_key_image() {
        let cloud = CloudAssembler::assemble(5).unwrap();
        let builder = RingSignatureInputBuilder::new();

        let first = builder.build(&cloud, b"first spend").unwrap();
        let second = builder.build(&cloud, b"second spend").unwrap();
        assert_eq!(
            blsag_parts(&first.signature).key_image,
            blsag_parts(&second.signature).key_image
        );

        let other_cloud = CloudAssembler::assemble(5).unwrap();
        let third = builder.build(&other_cloud, b"first spend").unwrap();
        assert_ne!(
            blsag_parts(&first.signature).key_image,
            blsag_parts(&third.signature).key_image
        );
    }

    #[test]
    fn signatures_are_randomized_per_call() {
        let cloud = CloudAssembler::assemble(4).unwrap();
        let builder = RingSignatureInputBuilder::new();
        let a = builder.build(&cloud, b"message").unwrap();
        let b = builder.build(&cloud, b"message").unwrap();
        // Same key image, fresh nonce: the responses must differ.
        assert_ne!(
            blsag_parts(&a.signature).responses,
            blsag_parts(&b.signature).responses
        );
    }

    #[test]
    fn minimal_ring_still_signs() {
        let cloud = CloudAssembler::assemble(2).unwrap();
        let builder = RingSignatureInputBuilder::new();
        let inputs = builder.build(&cloud, b"message").unwrap();
        assert!(builder
            .scheme()
            .verify(&inputs.ring, &inputs.message_digest, &inputs.signature));
    }

    #[test]
    fn mock_scheme_is_deterministic() {
        let cloud = CloudAssembler::assemble(3).unwrap();
        let builder = RingSignatureInputBuilder::with_scheme(MockRing);
        let a = builder.build(&cloud, b"message").unwrap();
        let b = builder.build(&cloud, b"message").unwrap();
        assert_eq!(a.signature, b.signature);
        assert!(builder
            .scheme()
            .verify(&a.ring, &a.message_digest, &a.signature));
    }

    #[test]
    fn decode_ring_rejects_junk() {
        let mut addresses: Vec<Address> = CloudAssembler::assemble(3)
            .unwrap()
            .addresses()
            .to_vec();
        // The identity point is a valid encoding but never a valid member.
        let mut identity = [0u8; 32];
        identity[0] = 1;
        addresses[1] = Address(identity);
        assert!(matches!(
            decode_ring(&addresses),
            Err(CloudError::MalformedRingMember { index: 1 })
        ));
    }

    #[test]
    fn hash_to_point_is_deterministic_and_distinct() {
        use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;

        let a = hash_to_point(&[1u8; 32]);
        let b = hash_to_point(&[1u8; 32]);
        let c = hash_to_point(&[2u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, ED25519_BASEPOINT_POINT);
    }
}
