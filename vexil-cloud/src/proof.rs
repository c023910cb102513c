//! Proof adapter: packaging ring-signature inputs for the on-chain verifier.
//!
//! The chain program consumes two opaque byte blobs, a proof and its public
//! inputs, and is the sole authority on their validity. Which blob format is
//! produced depends on an explicit mode flag: the interactive mock layout or
//! the ring-signature layout. The two are not interchangeable — the verifier
//! deployed on-chain decides which one it accepts.

use serde::{Deserialize, Serialize};

use crate::error::CloudError;
use crate::ring::{RingSignature, RingSignatureInputs};

/// Which verifier contract the packaged blobs target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofMode {
    /// Deterministic serialization for the interactive/mock verifier.
    MockInteractive,
    /// Linkable ring signature for the ring verifier.
    Ring,
}

/// The packaged proof and public-input blobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofArtifacts {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<u8>,
}

/// Mock-mode payload: ring, message digest, signature value. The signer
/// index is intentionally absent — it never crosses the process boundary.
#[derive(Serialize, Deserialize)]
struct MockPayload {
    ring: Vec<String>,
    message: String,
    signature: String,
}

/// Ring-mode public inputs: everything the verifier needs except the
/// responses, which live in the proof blob.
#[derive(Serialize, Deserialize)]
struct RingPublicInputs {
    ring: Vec<String>,
    message: String,
    key_image: String,
}

/// Packages [`RingSignatureInputs`] into wire blobs.
#[derive(Clone, Copy, Debug)]
pub struct ProofAdapter {
    mode: ProofMode,
}

impl ProofAdapter {
    pub fn new(mode: ProofMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ProofMode {
        self.mode
    }

    /// Serialize the inputs for the configured verifier.
    ///
    /// Deterministic for a fixed signature; the private scalar and the key
    /// index are never part of either blob.
    pub fn adapt(&self, inputs: &RingSignatureInputs) -> Result<ProofArtifacts, CloudError> {
        let ring_hex: Vec<String> = inputs
            .ring
            .iter()
            .map(|point| hex::encode(point.compress().to_bytes()))
            .collect();
        let message_hex = hex::encode(inputs.message_digest);

        match (&self.mode, &inputs.signature) {
            (ProofMode::MockInteractive, RingSignature::Mock(sig)) => {
                let payload = MockPayload {
                    ring: ring_hex,
                    message: message_hex,
                    signature: hex::encode(sig.value),
                };
                let bytes = serde_json::to_vec(&payload)
                    .map_err(|e| CloudError::Adapter(format!("mock payload encoding: {e}")))?;
                // The interactive verifier replays the same payload on both
                // sides of the instruction.
                Ok(ProofArtifacts {
                    proof: bytes.clone(),
                    public_inputs: bytes,
                })
            }
            (ProofMode::Ring, RingSignature::Blsag(sig)) => {
                let proof = serde_json::to_vec(&inputs.signature)
                    .map_err(|e| CloudError::Adapter(format!("signature encoding: {e}")))?;
                let public_inputs = serde_json::to_vec(&RingPublicInputs {
                    ring: ring_hex,
                    message: message_hex,
                    key_image: hex::encode(sig.key_image),
                })
                .map_err(|e| CloudError::Adapter(format!("public input encoding: {e}")))?;
                Ok(ProofArtifacts {
                    proof,
                    public_inputs,
                })
            }
            (mode, _) => Err(CloudError::Adapter(format!(
                "signature scheme does not match proof mode {mode:?}"
            ))),
        }
    }
}
