//! End-to-end lifecycle against an executing stub chain.
//!
//! The stub decodes submitted transaction wire bytes the way the ledger
//! would — shortvec arrays, message header, instruction data — and applies
//! `create_cloud` by materializing the account at the instruction's cloud
//! slot. That closes the loop: what the client encodes is what the fetch
//! path decodes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::OsRng;

use vexil_cloud::{
    CloudAssembler, LocalWallet, MockRing, ProofAdapter, ProofMode, RingSignatureInputBuilder,
    WalletSigner,
};
use vexil_solana_rail::{
    derive_cloud_address, instruction_discriminator, reconcile, reconcile_and_mark, Address,
    Blockhash, ChainCloudRecord, ChainRpc, ChainStateClient, CommitmentLevel, LatestBlockhash,
    RailConfig, RailError, ReconcileStatus, TxStatus,
};
use vexil_store::CloudStore;

const PROGRAM_ID: Address = Address([7u8; 32]);

/// Minimal ledger: executes `create_cloud`, acknowledges everything else.
struct StubChain {
    accounts: Mutex<HashMap<Address, Vec<u8>>>,
    sent: AtomicU64,
}

impl StubChain {
    fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            sent: AtomicU64::new(0),
        }
    }

    /// Replay a submitted transaction against the account map.
    fn execute(&self, wire: &[u8]) -> Result<(), RailError> {
        let mut cursor = Cursor { data: wire, pos: 0 };
        let signature_count = cursor.shortvec_len();
        cursor.skip(64 * signature_count);

        // Message header.
        cursor.skip(3);
        let key_count = cursor.shortvec_len();
        let mut keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            keys.push(Address(cursor.array::<32>()));
        }
        cursor.skip(32); // recent blockhash

        let instruction_count = cursor.shortvec_len();
        for _ in 0..instruction_count {
            let _program_index = cursor.byte();
            let account_count = cursor.shortvec_len();
            let account_indices: Vec<u8> = (0..account_count).map(|_| cursor.byte()).collect();
            let data_len = cursor.shortvec_len();
            let data = cursor.slice(data_len).to_vec();

            if data[..8] == instruction_discriminator("create_cloud") {
                let ring_len = u32::from_le_bytes(data[8..12].try_into().unwrap()) as usize;
                let mut ring = Vec::with_capacity(ring_len);
                for i in 0..ring_len {
                    let start = 12 + 32 * i;
                    ring.push(Address(data[start..start + 32].try_into().unwrap()));
                }
                let cloud_id =
                    u64::from_le_bytes(data[12 + 32 * ring_len..][..8].try_into().unwrap());

                let cloud_account = keys[account_indices[0] as usize];
                let authority = keys[account_indices[1] as usize];
                let mut accounts = self.accounts.lock().unwrap();
                if accounts.contains_key(&cloud_account) {
                    return Err(RailError::CloudIdCollision(format!(
                        "account {cloud_account} already in use"
                    )));
                }
                let record = ChainCloudRecord {
                    owner: authority,
                    cloud_id,
                    ring,
                    created_at: 1_700_000_000,
                };
                accounts.insert(
                    cloud_account,
                    vexil_solana_rail::encode_cloud_account(&record),
                );
            }
        }
        Ok(())
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn byte(&mut self) -> u8 {
        let b = self.data[self.pos];
        self.pos += 1;
        b
    }

    fn shortvec_len(&mut self) -> usize {
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let b = self.byte();
            len |= ((b & 0x7f) as usize) << shift;
            if b & 0x80 == 0 {
                return len;
            }
            shift += 7;
        }
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn slice(&mut self, n: usize) -> &'a [u8] {
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        s
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        self.slice(N).try_into().unwrap()
    }
}

#[async_trait]
impl ChainRpc for StubChain {
    async fn latest_blockhash(&self) -> Result<LatestBlockhash, RailError> {
        Ok(LatestBlockhash {
            blockhash: Blockhash([5u8; 32]),
            last_valid_block_height: 1_000,
        })
    }

    async fn block_height(&self) -> Result<u64, RailError> {
        Ok(1)
    }

    async fn account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, RailError> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<String, RailError> {
        self.execute(wire)?;
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(format!("stub-signature-{n}"))
    }

    async fn signature_status(&self, _signature: &str) -> Result<Option<TxStatus>, RailError> {
        Ok(Some(TxStatus {
            confirmation_status: Some("confirmed".into()),
            err: None,
        }))
    }
}

fn client() -> ChainStateClient<StubChain> {
    let mut config = RailConfig::new("stub://", PROGRAM_ID);
    config.commitment = CommitmentLevel::Confirmed;
    config.poll_interval_ms = 1;
    ChainStateClient::new(StubChain::new(), config)
}

#[tokio::test]
async fn create_persist_reload_reconcile() {
    let client = client();
    let wallet = LocalWallet::generate(&mut OsRng);
    let store = CloudStore::in_memory().unwrap();

    // Assemble and anchor a five-member cloud.
    let cloud = CloudAssembler::assemble(5).unwrap();
    assert_eq!(cloud.addresses().len(), 5);
    assert!(cloud.hidden_index() < 5);

    let receipt = client.create_cloud(&wallet, &cloud).await.unwrap();
    let (expected_address, _) = derive_cloud_address(
        &PROGRAM_ID,
        &wallet.public_identity(),
        cloud.cloud_id(),
    )
    .unwrap();
    assert_eq!(receipt.cloud_address, expected_address);

    // Persist and reload the local record.
    store.put(&cloud.to_record()).unwrap();
    let reloaded = store.get(cloud.cloud_id()).unwrap().expect("record should exist");
    assert_eq!(reloaded.addresses, cloud.addresses());
    assert_eq!(reloaded.hidden_index, cloud.hidden_index());

    // The chain executed the instruction we encoded; fetch agrees.
    let canonical = client
        .fetch_cloud(&wallet.public_identity(), cloud.cloud_id())
        .await
        .unwrap()
        .expect("account should exist");
    assert_eq!(canonical.ring, cloud.addresses());
    assert_eq!(canonical.owner, wallet.public_identity());

    // Reconcile and persist the verdict.
    let status = reconcile_and_mark(&client, &store, &wallet.public_identity(), &reloaded)
        .await
        .unwrap();
    assert_eq!(status, ReconcileStatus::Verified);
    assert!(store.get(cloud.cloud_id()).unwrap().unwrap().verified);
}

#[tokio::test]
async fn rapid_double_creation_stays_distinct() {
    let client = client();
    let wallet = LocalWallet::generate(&mut OsRng);

    let first = CloudAssembler::assemble(3).unwrap();
    let second = CloudAssembler::assemble(3).unwrap();
    assert_ne!(first.cloud_id(), second.cloud_id());

    let a = client.create_cloud(&wallet, &first).await.unwrap();
    let b = client.create_cloud(&wallet, &second).await.unwrap();
    assert_ne!(a.cloud_address, b.cloud_address);
}

#[tokio::test]
async fn recreating_the_same_cloud_collides() {
    let client = client();
    let wallet = LocalWallet::generate(&mut OsRng);
    let cloud = CloudAssembler::assemble(3).unwrap();

    client.create_cloud(&wallet, &cloud).await.unwrap();
    let err = client.create_cloud(&wallet, &cloud).await.unwrap_err();
    assert!(matches!(err, RailError::CloudIdCollision(_)));
}

#[tokio::test]
async fn reconcile_flags_foreign_ring() {
    let client = client();
    let wallet = LocalWallet::generate(&mut OsRng);

    let cloud = CloudAssembler::assemble(4).unwrap();
    client.create_cloud(&wallet, &cloud).await.unwrap();

    // A record claiming the same cloud id but a different ring.
    let mut impostor = cloud.to_record();
    impostor.addresses.swap(0, 1);
    let status = reconcile(&client, &wallet.public_identity(), &impostor)
        .await
        .unwrap();
    assert_eq!(status, ReconcileStatus::Mismatch);
}

#[tokio::test]
async fn mock_proof_transfer_round_trip() {
    let client = client();
    let wallet = LocalWallet::generate(&mut OsRng);
    let cloud = CloudAssembler::assemble(5).unwrap();
    client.create_cloud(&wallet, &cloud).await.unwrap();

    let inputs = RingSignatureInputBuilder::with_scheme(MockRing)
        .build(&cloud, b"transfer 1000 to recipient")
        .unwrap();
    let artifacts = ProofAdapter::new(ProofMode::MockInteractive)
        .adapt(&inputs)
        .unwrap();

    let receipt = client
        .transfer_with_proof(
            &wallet,
            cloud.cloud_id(),
            &cloud.addresses()[0],
            &Address([0x11; 32]),
            &artifacts,
            1_000,
        )
        .await
        .unwrap();
    assert!(receipt.signature.starts_with("stub-signature-"));
}
