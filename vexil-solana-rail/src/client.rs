//! Chain-state client: the create / fetch / transfer operations.
//!
//! Each operation is an independent async task; callers serialize
//! operations that touch the same cloud id. Every network round trip is a
//! suspension point, and each one is a place the caller may cancel by
//! dropping the future. Dropping before submission means nothing was sent;
//! dropping after means the chain may still finalize the operation, so the
//! caller re-queries with [`ChainStateClient::fetch_cloud`] instead of
//! assuming failure.

use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use vexil_cloud::{AddressCloud, ProofArtifacts, WalletSigner};

use crate::error::RailError;
use crate::instruction::{
    create_cloud_instruction, decode_cloud_account, encode_message, encode_transaction,
    prove_holdings_instruction, transfer_with_ring_proof_instruction, Instruction,
};
use crate::pda::derive_cloud_address;
use crate::rpc::ChainRpc;
use crate::types::{Address, ChainCloudRecord, RailConfig};

/// Lifecycle of one chain operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationState {
    Building,
    AddressResolved,
    BlockhashFetched,
    Submitted,
    Confirmed,
    Failed,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Building => "building",
            OperationState::AddressResolved => "address_resolved",
            OperationState::BlockhashFetched => "blockhash_fetched",
            OperationState::Submitted => "submitted",
            OperationState::Confirmed => "confirmed",
            OperationState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Confirmed | OperationState::Failed)
    }
}

/// Result of a confirmed `create_cloud`.
#[derive(Clone, Debug)]
pub struct CreateCloudReceipt {
    pub signature: String,
    pub cloud_address: Address,
    pub bump: u8,
}

/// Result of a confirmed `transfer_with_ring_proof`.
#[derive(Clone, Debug)]
pub struct TransferReceipt {
    pub signature: String,
    pub cloud_address: Address,
}

/// Result of a confirmed `prove_holdings`.
#[derive(Clone, Debug)]
pub struct HoldingsProofReceipt {
    pub signature: String,
    pub cloud_address: Address,
}

/// Client for the cloud program's chain state.
pub struct ChainStateClient<R: ChainRpc> {
    rpc: R,
    config: RailConfig,
}

impl<R: ChainRpc> ChainStateClient<R> {
    pub fn new(rpc: R, config: RailConfig) -> Self {
        Self { rpc, config }
    }

    pub fn config(&self) -> &RailConfig {
        &self.config
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Anchor a cloud on chain.
    ///
    /// A rejection because the derived account already exists surfaces as
    /// [`RailError::CloudIdCollision`]; retry with a freshly assembled
    /// cloud id, never by overwriting.
    pub async fn create_cloud(
        &self,
        wallet: &dyn WalletSigner,
        cloud: &AddressCloud,
    ) -> Result<CreateCloudReceipt, RailError> {
        let owner = wallet.public_identity();
        debug!(state = OperationState::Building.as_str(), cloud_id = cloud.cloud_id(), "create_cloud");

        let (cloud_address, bump) =
            derive_cloud_address(&self.config.program_id, &owner, cloud.cloud_id())?;
        debug!(
            state = OperationState::AddressResolved.as_str(),
            %cloud_address,
            "create_cloud"
        );

        let instruction = create_cloud_instruction(
            &self.config.program_id,
            &cloud_address,
            &owner,
            cloud.addresses(),
            cloud.cloud_id(),
        )?;

        let signature = self.submit_with_retry(wallet, &owner, &[instruction]).await?;
        info!(%signature, %cloud_address, "cloud created");
        Ok(CreateCloudReceipt {
            signature,
            cloud_address,
            bump,
        })
    }

    /// Fetch the canonical record for `(owner, cloud_id)`.
    ///
    /// `Ok(None)` when no account exists at the derived address — absence
    /// is a valid negative result, not an error.
    pub async fn fetch_cloud(
        &self,
        owner: &Address,
        cloud_id: u64,
    ) -> Result<Option<ChainCloudRecord>, RailError> {
        let (cloud_address, _) =
            derive_cloud_address(&self.config.program_id, owner, cloud_id)?;
        match self.rpc.account_data(&cloud_address).await? {
            None => Ok(None),
            Some(data) => decode_cloud_account(&data).map(Some),
        }
    }

    /// Spend through the cloud with a packaged ring proof.
    ///
    /// The proof and public-input blobs are opaque here: the on-chain
    /// verifier is the sole authority on their validity.
    pub async fn transfer_with_proof(
        &self,
        wallet: &dyn WalletSigner,
        cloud_id: u64,
        sender: &Address,
        recipient: &Address,
        artifacts: &ProofArtifacts,
        amount: u64,
    ) -> Result<TransferReceipt, RailError> {
        let owner = wallet.public_identity();
        debug!(state = OperationState::Building.as_str(), cloud_id, "transfer_with_proof");

        let (cloud_address, _) =
            derive_cloud_address(&self.config.program_id, &owner, cloud_id)?;
        debug!(
            state = OperationState::AddressResolved.as_str(),
            %cloud_address,
            "transfer_with_proof"
        );

        let instruction = transfer_with_ring_proof_instruction(
            &self.config.program_id,
            &cloud_address,
            sender,
            recipient,
            &artifacts.proof,
            &artifacts.public_inputs,
            amount,
        )?;

        let signature = self.submit_with_retry(wallet, &owner, &[instruction]).await?;
        info!(%signature, amount, "transfer executed");
        Ok(TransferReceipt {
            signature,
            cloud_address,
        })
    }

    /// Attest that the ring's aggregate holdings clear `threshold`.
    ///
    /// Like the transfer proof, the blob is opaque to this client.
    pub async fn prove_holdings(
        &self,
        wallet: &dyn WalletSigner,
        cloud_id: u64,
        proof: &[u8],
        threshold: u64,
    ) -> Result<HoldingsProofReceipt, RailError> {
        let owner = wallet.public_identity();
        let (cloud_address, _) =
            derive_cloud_address(&self.config.program_id, &owner, cloud_id)?;

        let instruction = prove_holdings_instruction(
            &self.config.program_id,
            &cloud_address,
            &owner,
            proof,
            threshold,
        )?;

        let signature = self.submit_with_retry(wallet, &owner, &[instruction]).await?;
        info!(%signature, threshold, "holdings proof accepted");
        Ok(HoldingsProofReceipt {
            signature,
            cloud_address,
        })
    }

    /// Submit with bounded retries on transient dispatch failures.
    ///
    /// Each attempt refetches the anchor — an expired one always fails.
    /// Terminal rejections and post-submission failures never retry.
    async fn submit_with_retry(
        &self,
        wallet: &dyn WalletSigner,
        payer: &Address,
        instructions: &[Instruction],
    ) -> Result<String, RailError> {
        let mut attempt = 0u32;
        loop {
            match self.submit_once(wallet, payer, instructions).await {
                Ok(signature) => return Ok(signature),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "transient dispatch failure, retrying");
                }
                Err(e) => {
                    warn!(state = OperationState::Failed.as_str(), error = %e, "operation failed");
                    return Err(e);
                }
            }
        }
    }

    async fn submit_once(
        &self,
        wallet: &dyn WalletSigner,
        payer: &Address,
        instructions: &[Instruction],
    ) -> Result<String, RailError> {
        let anchor = self.rpc.latest_blockhash().await?;
        debug!(
            state = OperationState::BlockhashFetched.as_str(),
            last_valid_block_height = anchor.last_valid_block_height,
        );

        let message = encode_message(payer, instructions, &anchor.blockhash)?;
        let signature_bytes = wallet.sign_transaction(&message)?;
        let wire = encode_transaction(&[signature_bytes], &message);

        let signature = self.rpc.send_transaction(&wire).await?;
        debug!(state = OperationState::Submitted.as_str(), %signature);

        self.await_confirmation(&signature, anchor.last_valid_block_height)
            .await?;
        debug!(state = OperationState::Confirmed.as_str(), %signature);
        Ok(signature)
    }

    /// Poll until the configured commitment is reached, the transaction
    /// fails, or the anchor's validity window closes.
    async fn await_confirmation(
        &self,
        signature: &str,
        last_valid_block_height: u64,
    ) -> Result<(), RailError> {
        loop {
            let status = self
                .rpc
                .signature_status(signature)
                .await
                .map_err(Self::seal_post_submit)?;

            if let Some(status) = status {
                if let Some(err) = status.err {
                    return Err(RailError::TransactionFailed(err));
                }
                if let Some(reached) = status.confirmation_status {
                    if self.config.commitment.is_satisfied_by(&reached) {
                        return Ok(());
                    }
                }
            }

            let height = self
                .rpc
                .block_height()
                .await
                .map_err(Self::seal_post_submit)?;
            if height > last_valid_block_height {
                return Err(RailError::AnchorExpired);
            }

            sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
    }

    /// After submission the outcome is unknown; a blind resubmit could
    /// double-execute, so post-submit poll failures are made terminal.
    /// The caller re-queries chain state before trying again.
    fn seal_post_submit(err: RailError) -> RailError {
        match err {
            RailError::NetworkTransient(message) => RailError::Rpc(format!(
                "status poll failed after submission, re-query before retrying: {message}"
            )),
            other => other,
        }
    }
}

impl<R: ChainRpc> std::fmt::Debug for ChainStateClient<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStateClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
