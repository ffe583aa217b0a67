//! Component D (encryption half): AES-256-CBC with PKCS#7 padding.
//!
//! `Crypter` holds a key+IV pair in memory just long enough to encrypt or
//! decrypt a single key's bytes, and zeroizes that pair on drop so it
//! doesn't linger in a swapped-out page after the wallet locks.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::WalletError;
use crate::kdf::derive_key_iv;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// A derived key+IV pair, held only as long as needed to encrypt or
/// decrypt and wiped immediately after.
#[derive(ZeroizeOnDrop)]
pub struct Crypter {
    key: [u8; 32],
    iv: [u8; 16],
}

impl Crypter {
    /// Derive a `Crypter` from a passphrase, salt, and round count.
    pub fn from_passphrase(passphrase: &[u8], salt: &[u8; 8], rounds: u32) -> Self {
        let (key, iv) = derive_key_iv(passphrase, salt, rounds);
        Self { key, iv }
    }

    /// Construct directly from an already-derived key and IV, used to
    /// encrypt/decrypt individual wallet keys under the wallet's single
    /// master key rather than re-deriving from the passphrase each time.
    pub fn from_key_iv(key: [u8; 32], iv: [u8; 16]) -> Self {
        Self { key, iv }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes256CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, WalletError> {
        Aes256CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| WalletError::BadPassphrase)
    }

    pub fn key_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn iv_bytes(&self) -> &[u8; 16] {
        &self.iv
    }
}

impl Drop for Crypter {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}
