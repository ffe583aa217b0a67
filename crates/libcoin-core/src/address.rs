//! Address encoding.
//!
//! An address is one network-id byte followed by the 20-byte RIPEMD160
//! hash of the SHA-256 hash of a public key (`hash160`), Base58Check
//! encoded: `base58(payload || checksum)` where the checksum is the
//! first 4 bytes of `double_sha256(payload)`. This is the same
//! construction as Bitcoin's legacy P2PKH addresses, grounded on the
//! same `bs58`-with-checksum approach used elsewhere in this corpus for
//! that format.

use std::fmt;
use std::str::FromStr;

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::crypto::PublicKey;
use crate::error::AddressError;

const PAYLOAD_LEN: usize = 21; // 1 network byte + 20-byte hash160

/// Which network an address belongs to, encoded as the payload's first byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    fn id_byte(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    fn from_id_byte(byte: u8) -> Result<Self, AddressError> {
        match byte {
            0x00 => Ok(Network::Mainnet),
            0x6f => Ok(Network::Testnet),
            other => Err(AddressError::UnknownNetwork(other)),
        }
    }
}

/// RIPEMD160(SHA256(data)), the hash160 construction used to turn a
/// public key into a 20-byte address payload.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

/// A wallet address: a network id plus a 20-byte pubkey hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    network: Network,
    pubkey_hash: [u8; 20],
}

impl Address {
    pub fn from_public_key(network: Network, pubkey: &PublicKey) -> Self {
        Self {
            network,
            pubkey_hash: hash160(&pubkey.to_bytes()),
        }
    }

    pub fn from_pubkey_hash(network: Network, pubkey_hash: [u8; 20]) -> Self {
        Self { network, pubkey_hash }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn pubkey_hash(&self) -> &[u8; 20] {
        &self.pubkey_hash
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = self.network.id_byte();
        payload[1..].copy_from_slice(&self.pubkey_hash);
        write!(f, "{}", bs58::encode(payload).with_check().into_string())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|_| AddressError::InvalidEncoding)?;
        if payload.len() != PAYLOAD_LEN {
            return Err(AddressError::InvalidLength {
                expected: PAYLOAD_LEN,
                got: payload.len(),
            });
        }
        let network = Network::from_id_byte(payload[0])?;
        let mut pubkey_hash = [0u8; 20];
        pubkey_hash.copy_from_slice(&payload[1..]);
        Ok(Self { network, pubkey_hash })
    }
}
