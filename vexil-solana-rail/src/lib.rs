//! vexil-solana-rail
//!
//! Solana rail for vexil probability clouds: deterministic cloud-account
//! derivation, instruction and transaction wire encoding, the JSON-RPC
//! chain-state client, and reconciliation of the local cache against
//! canonical chain state.
//!
//! # Operation shape
//!
//! Every chain operation walks
//! `Building → AddressResolved → BlockhashFetched → Submitted →
//! Confirmed | Failed`. The transaction anchor expires after a
//! network-defined window, so a confirmation that does not arrive in time
//! fails with [`RailError::AnchorExpired`] instead of hanging. Submission
//! retries are bounded, happen only on transient network errors, and
//! refetch the anchor every attempt.
//!
//! The RPC transport sits behind [`rpc::ChainRpc`]; tests drive the full
//! client against stub chains and the `HttpRpcClient` implementation talks
//! to a real endpoint.

pub mod client;
pub mod error;
pub mod instruction;
pub mod pda;
pub mod reconcile;
pub mod rpc;
pub mod types;

pub use client::{
    ChainStateClient, CreateCloudReceipt, HoldingsProofReceipt, OperationState, TransferReceipt,
};
pub use error::RailError;
pub use instruction::{
    account_discriminator, create_cloud_data, create_cloud_instruction, decode_cloud_account,
    encode_cloud_account, encode_message, encode_transaction, instruction_discriminator,
    prove_holdings_data, prove_holdings_instruction, transfer_with_ring_proof_data,
    transfer_with_ring_proof_instruction, AccountMeta, Instruction, CLOUD_ACCOUNT_NAME,
    SYSTEM_PROGRAM,
};
pub use pda::{derive_cloud_address, CLOUD_SEED};
pub use reconcile::{reconcile, reconcile_and_mark, ReconcileStatus};
pub use rpc::{ChainRpc, HttpRpcClient, TxStatus};
pub use types::{
    Address, Blockhash, ChainCloudRecord, CommitmentLevel, LatestBlockhash, RailConfig,
};
