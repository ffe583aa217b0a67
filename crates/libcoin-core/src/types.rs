//! Minimal external wire types the wallet observes and builds.
//!
//! The real transaction/block serializer, consensus validation, and P2P
//! relay live outside this crate's scope; what's here is the shape the
//! wallet needs to compile and be tested against: hashes, outpoints,
//! transactions, and a block header/locator pair for `ChainFacade`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 32-byte hash value: transaction IDs and block hashes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Double-SHA256, the hash used for block headers and txids.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second);
        Self(out)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Hash256,
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint, used for coinbase transaction inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u32::MAX
    }
}

/// A transaction input spending a previous output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub previous_output: OutPoint,
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
    pub sequence: u32,
}

/// A transaction output paying a 20-byte pubkey hash.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub pubkey_hash: [u8; 20],
}

/// A transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Total value of all outputs. Saturates rather than panics on
    /// overflow; callers that need an authoritative total should check
    /// `ChainFacade`-validated transactions instead.
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().fold(0u64, |acc, o| acc.saturating_add(o.value))
    }

    /// Approximate serialized size in bytes, used for fee calculation.
    /// Mirrors the wire format's per-field overhead without requiring the
    /// actual (out-of-scope) serializer.
    pub fn estimated_size(&self) -> usize {
        const INPUT_OVERHEAD: usize = 40;
        const OUTPUT_OVERHEAD: usize = 28;
        const HEADER: usize = 12;
        HEADER
            + self
                .inputs
                .iter()
                .map(|i| INPUT_OVERHEAD + i.signature.len() + i.public_key.len())
                .sum::<usize>()
            + self.outputs.len() * OUTPUT_OVERHEAD
    }

    /// Transaction ID: double-SHA256 over a canonical little-endian
    /// encoding of its fields (signatures and public keys included, since
    /// unlike the sighash this identifies the final signed transaction).
    pub fn txid(&self) -> Hash256 {
        let mut data = Vec::new();
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(&(self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            data.extend_from_slice(input.previous_output.txid.as_bytes());
            data.extend_from_slice(&input.previous_output.index.to_le_bytes());
            data.extend_from_slice(&(input.signature.len() as u64).to_le_bytes());
            data.extend_from_slice(&input.signature);
            data.extend_from_slice(&(input.public_key.len() as u64).to_le_bytes());
            data.extend_from_slice(&input.public_key);
            data.extend_from_slice(&input.sequence.to_le_bytes());
        }
        data.extend_from_slice(&(self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            data.extend_from_slice(&output.value.to_le_bytes());
            data.extend_from_slice(&output.pubkey_hash);
        }
        data.extend_from_slice(&self.lock_time.to_le_bytes());
        Hash256::double_sha256(&data)
    }
}

/// A point in the chain a wallet can resume scanning from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockLocator {
    pub height: u64,
    pub hash: Hash256,
}
