//! Instruction payloads and transaction wire encoding.
//!
//! The on-chain program is Anchor-shaped: instruction data starts with the
//! 8-byte discriminator `sha256("global:<name>")[..8]`, account data with
//! `sha256("account:<name>")[..8]`, and vectors are length-prefixed with a
//! little-endian u32. Transactions use the ledger's legacy wire format
//! with compact-u16 array lengths.

use sha2::{Digest, Sha256};

use crate::error::RailError;
use crate::types::{Address, Blockhash, ChainCloudRecord};
use vexil_cloud::{MAX_RING_SIZE, MIN_RING_SIZE};

/// The system program (all-zero address).
pub const SYSTEM_PROGRAM: Address = Address([0u8; 32]);

/// First 8 bytes of `sha256("global:<name>")`.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let digest: [u8; 32] = Sha256::digest(format!("global:{name}").as_bytes()).into();
    digest[..8].try_into().expect("slice of fixed length")
}

/// First 8 bytes of `sha256("account:<name>")`.
pub fn account_discriminator(name: &str) -> [u8; 8] {
    let digest: [u8; 32] = Sha256::digest(format!("account:{name}").as_bytes()).into();
    digest[..8].try_into().expect("slice of fixed length")
}

/// `create_cloud` instruction data:
/// discriminator + u32 ring length + 32-byte entries + u64 cloud id.
pub fn create_cloud_data(ring: &[Address], cloud_id: u64) -> Result<Vec<u8>, RailError> {
    if !(MIN_RING_SIZE..=MAX_RING_SIZE).contains(&ring.len()) {
        return Err(RailError::MalformedInstruction(format!(
            "ring length {} outside [{MIN_RING_SIZE}, {MAX_RING_SIZE}]",
            ring.len()
        )));
    }
    let mut data = Vec::with_capacity(8 + 4 + 32 * ring.len() + 8);
    data.extend_from_slice(&instruction_discriminator("create_cloud"));
    data.extend_from_slice(&(ring.len() as u32).to_le_bytes());
    for address in ring {
        data.extend_from_slice(address.as_bytes());
    }
    data.extend_from_slice(&cloud_id.to_le_bytes());
    debug_assert_eq!(data.len(), 8 + 4 + 32 * ring.len() + 8);
    Ok(data)
}

/// `transfer_with_ring_proof` instruction data:
/// discriminator + length-prefixed proof + length-prefixed public inputs +
/// u64 amount.
pub fn transfer_with_ring_proof_data(
    proof: &[u8],
    public_inputs: &[u8],
    amount: u64,
) -> Result<Vec<u8>, RailError> {
    if proof.is_empty() || public_inputs.is_empty() {
        return Err(RailError::MalformedInstruction(
            "proof and public inputs must be non-empty".into(),
        ));
    }
    let mut data =
        Vec::with_capacity(8 + 4 + proof.len() + 4 + public_inputs.len() + 8);
    data.extend_from_slice(&instruction_discriminator("transfer_with_ring_proof"));
    data.extend_from_slice(&(proof.len() as u32).to_le_bytes());
    data.extend_from_slice(proof);
    data.extend_from_slice(&(public_inputs.len() as u32).to_le_bytes());
    data.extend_from_slice(public_inputs);
    data.extend_from_slice(&amount.to_le_bytes());
    Ok(data)
}

/// `prove_holdings` instruction data:
/// discriminator + length-prefixed proof + u64 threshold.
pub fn prove_holdings_data(proof: &[u8], threshold: u64) -> Result<Vec<u8>, RailError> {
    if proof.is_empty() {
        return Err(RailError::MalformedInstruction(
            "holdings proof must be non-empty".into(),
        ));
    }
    let mut data = Vec::with_capacity(8 + 4 + proof.len() + 8);
    data.extend_from_slice(&instruction_discriminator("prove_holdings"));
    data.extend_from_slice(&(proof.len() as u32).to_le_bytes());
    data.extend_from_slice(proof);
    data.extend_from_slice(&threshold.to_le_bytes());
    Ok(data)
}

/// One account an instruction touches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Address, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Address, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// An instruction ready for message compilation.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Build the `create_cloud` instruction.
pub fn create_cloud_instruction(
    program_id: &Address,
    cloud_account: &Address,
    authority: &Address,
    ring: &[Address],
    cloud_id: u64,
) -> Result<Instruction, RailError> {
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::writable(*cloud_account, false),
            AccountMeta::writable(*authority, true),
            AccountMeta::readonly(SYSTEM_PROGRAM, false),
        ],
        data: create_cloud_data(ring, cloud_id)?,
    })
}

/// Build the `transfer_with_ring_proof` instruction.
///
/// The sender slot is not a signer: the ring proof is the authorization,
/// and the verifying program is the sole authority on it.
pub fn transfer_with_ring_proof_instruction(
    program_id: &Address,
    cloud_account: &Address,
    sender: &Address,
    recipient: &Address,
    proof: &[u8],
    public_inputs: &[u8],
    amount: u64,
) -> Result<Instruction, RailError> {
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::readonly(*cloud_account, false),
            AccountMeta::writable(*sender, false),
            AccountMeta::writable(*recipient, false),
            AccountMeta::readonly(SYSTEM_PROGRAM, false),
        ],
        data: transfer_with_ring_proof_data(proof, public_inputs, amount)?,
    })
}

/// Build the `prove_holdings` instruction: attest that the ring's
/// aggregate holdings clear `threshold` without naming any member.
pub fn prove_holdings_instruction(
    program_id: &Address,
    cloud_account: &Address,
    authority: &Address,
    proof: &[u8],
    threshold: u64,
) -> Result<Instruction, RailError> {
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::readonly(*cloud_account, false),
            AccountMeta::readonly(*authority, true),
        ],
        data: prove_holdings_data(proof, threshold)?,
    })
}

/// Compact-u16 length prefix (the ledger's "shortvec" encoding).
fn append_shortvec_len(buf: &mut Vec<u8>, mut len: usize) {
    loop {
        let mut byte = (len & 0x7f) as u8;
        len >>= 7;
        if len != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if len == 0 {
            break;
        }
    }
}

#[derive(Clone)]
struct CompiledKey {
    address: Address,
    is_signer: bool,
    is_writable: bool,
}

/// Serialize a legacy message: header, static account keys, recent
/// blockhash, compiled instructions. The fee payer is always key zero.
pub fn encode_message(
    fee_payer: &Address,
    instructions: &[Instruction],
    recent_blockhash: &Blockhash,
) -> Result<Vec<u8>, RailError> {
    if instructions.is_empty() {
        return Err(RailError::InvalidInput("no instructions to encode".into()));
    }

    let mut keys: Vec<CompiledKey> = vec![CompiledKey {
        address: *fee_payer,
        is_signer: true,
        is_writable: true,
    }];
    let mut upsert = |address: Address, is_signer: bool, is_writable: bool| {
        if let Some(existing) = keys.iter_mut().find(|k| k.address == address) {
            existing.is_signer |= is_signer;
            existing.is_writable |= is_writable;
        } else {
            keys.push(CompiledKey {
                address,
                is_signer,
                is_writable,
            });
        }
    };
    for instruction in instructions {
        for meta in &instruction.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        upsert(instruction.program_id, false, false);
    }

    // Required ordering: writable signers, readonly signers, writable
    // non-signers, readonly non-signers. The payer entry already carries
    // the strongest flags, so the stable sort keeps it first.
    keys.sort_by_key(|k| match (k.is_signer, k.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    let num_required_signatures = keys.iter().filter(|k| k.is_signer).count() as u8;
    let num_readonly_signed = keys
        .iter()
        .filter(|k| k.is_signer && !k.is_writable)
        .count() as u8;
    let num_readonly_unsigned = keys
        .iter()
        .filter(|k| !k.is_signer && !k.is_writable)
        .count() as u8;

    let index_of = |address: &Address| -> Result<u8, RailError> {
        keys.iter()
            .position(|k| k.address == *address)
            .map(|i| i as u8)
            .ok_or_else(|| RailError::InvalidInput("account missing from key table".into()))
    };

    let mut message = Vec::new();
    message.push(num_required_signatures);
    message.push(num_readonly_signed);
    message.push(num_readonly_unsigned);

    append_shortvec_len(&mut message, keys.len());
    for key in &keys {
        message.extend_from_slice(key.address.as_bytes());
    }

    message.extend_from_slice(&recent_blockhash.0);

    append_shortvec_len(&mut message, instructions.len());
    for instruction in instructions {
        message.push(index_of(&instruction.program_id)?);
        append_shortvec_len(&mut message, instruction.accounts.len());
        for meta in &instruction.accounts {
            message.push(index_of(&meta.pubkey)?);
        }
        append_shortvec_len(&mut message, instruction.data.len());
        message.extend_from_slice(&instruction.data);
    }

    Ok(message)
}

/// Wrap a signed message into transaction wire bytes.
pub fn encode_transaction(signatures: &[[u8; 64]], message: &[u8]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(1 + 64 * signatures.len() + message.len());
    append_shortvec_len(&mut wire, signatures.len());
    for signature in signatures {
        wire.extend_from_slice(signature);
    }
    wire.extend_from_slice(message);
    wire
}

/// Name of the on-chain cloud account type.
pub const CLOUD_ACCOUNT_NAME: &str = "ProbabilityCloud";

/// Decode a fetched cloud account.
///
/// Layout: discriminator, owner, cloud id, ring size, length-prefixed
/// ring, creation timestamp. Trailing bytes are allowed — the program
/// allocates space for the maximum ring up front.
pub fn decode_cloud_account(data: &[u8]) -> Result<ChainCloudRecord, RailError> {
    let expected_disc = account_discriminator(CLOUD_ACCOUNT_NAME);
    if data.len() < 8 + 32 + 8 + 1 + 4 {
        return Err(RailError::InvalidInput(format!(
            "cloud account data too short: {} bytes",
            data.len()
        )));
    }
    if data[..8] != expected_disc {
        return Err(RailError::InvalidInput(
            "account discriminator mismatch: not a cloud account".into(),
        ));
    }

    let mut offset = 8;
    let owner = Address(take(data, &mut offset, 32)?.try_into().expect("fixed slice length"));
    let cloud_id =
        u64::from_le_bytes(take(data, &mut offset, 8)?.try_into().expect("fixed slice length"));
    let ring_size = take(data, &mut offset, 1)?[0] as usize;
    let ring_len =
        u32::from_le_bytes(take(data, &mut offset, 4)?.try_into().expect("fixed slice length"))
            as usize;
    if ring_len != ring_size || !(MIN_RING_SIZE..=MAX_RING_SIZE).contains(&ring_len) {
        return Err(RailError::InvalidInput(format!(
            "inconsistent ring length in cloud account: size {ring_size}, vec {ring_len}"
        )));
    }

    let mut ring = Vec::with_capacity(ring_len);
    for _ in 0..ring_len {
        ring.push(Address(
            take(data, &mut offset, 32)?.try_into().expect("fixed slice length"),
        ));
    }
    let created_at =
        i64::from_le_bytes(take(data, &mut offset, 8)?.try_into().expect("fixed slice length"));

    Ok(ChainCloudRecord {
        owner,
        cloud_id,
        ring,
        created_at,
    })
}

fn take<'a>(data: &'a [u8], offset: &mut usize, n: usize) -> Result<&'a [u8], RailError> {
    let slice = data
        .get(*offset..*offset + n)
        .ok_or_else(|| RailError::InvalidInput("cloud account data truncated".into()))?;
    *offset += n;
    Ok(slice)
}

/// Encode a cloud account image the way the program lays it out.
///
/// The inverse of [`decode_cloud_account`]; stub chains in tests use it to
/// fabricate canonical records.
pub fn encode_cloud_account(record: &ChainCloudRecord) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 32 + 8 + 1 + 4 + 32 * record.ring.len() + 8);
    data.extend_from_slice(&account_discriminator(CLOUD_ACCOUNT_NAME));
    data.extend_from_slice(record.owner.as_bytes());
    data.extend_from_slice(&record.cloud_id.to_le_bytes());
    data.push(record.ring.len() as u8);
    data.extend_from_slice(&(record.ring.len() as u32).to_le_bytes());
    for address in &record.ring {
        data.extend_from_slice(address.as_bytes());
    }
    data.extend_from_slice(&record.created_at.to_le_bytes());
    data
}
