//! Component D (key derivation half): passphrase stretching.
//!
//! Derives a 48-byte key+IV pair from a passphrase and salt by repeated
//! double-SHA-256, matching the construction `libcoin-core::types::Hash256
//! ::double_sha256` already uses for txids and block hashes elsewhere in
//! this stack. Round count is picked once per wallet by [`calibrate_rounds`]
//! so that derivation costs roughly the same wall-clock time regardless
//! of the machine it runs on.

use std::time::{Duration, Instant};

use libcoin_core::types::Hash256;

/// Target wall-clock cost of a single passphrase derivation.
pub const TARGET_DERIVATION_TIME: Duration = Duration::from_millis(100);

/// A baseline round count cheap enough to time without annoying the user.
const CALIBRATION_BASELINE_ROUNDS: u32 = 25_000;

/// Security floor: derivation never runs fewer rounds than this,
/// regardless of how fast calibration measures the machine to be.
const MIN_DERIVE_ROUNDS: u32 = 25_000;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Derive `key_len + iv_len` bytes from `passphrase` and `salt` using
/// `rounds` applications of double-SHA-256 per output block, in the
/// style of OpenSSL's `EVP_BytesToKey`: each block folds in the previous
/// block's digest, the passphrase, and the salt, then the whole block is
/// re-hashed `rounds` times before becoming part of the output and the
/// seed for the next block.
pub fn bytes_to_key(passphrase: &[u8], salt: &[u8; 8], rounds: u32, out_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(out_len);
    let mut prev: Vec<u8> = Vec::new();
    while out.len() < out_len {
        let mut data = Vec::with_capacity(prev.len() + passphrase.len() + salt.len());
        data.extend_from_slice(&prev);
        data.extend_from_slice(passphrase);
        data.extend_from_slice(salt);

        let mut digest = Hash256::double_sha256(&data);
        for _ in 1..rounds.max(1) {
            digest = Hash256::double_sha256(digest.as_bytes());
        }

        prev = digest.as_bytes().to_vec();
        out.extend_from_slice(&prev);
    }
    out.truncate(out_len);
    out
}

/// Derive an AES-256 key and CBC IV from a passphrase.
pub fn derive_key_iv(passphrase: &[u8], salt: &[u8; 8], rounds: u32) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let bytes = bytes_to_key(passphrase, salt, rounds, KEY_LEN + IV_LEN);
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&bytes[..KEY_LEN]);
    iv.copy_from_slice(&bytes[KEY_LEN..]);
    (key, iv)
}

/// Pick a round count so that [`derive_key_iv`] costs about
/// [`TARGET_DERIVATION_TIME`] on this machine.
///
/// Three steps: time a cheap baseline run, extrapolate a candidate round
/// count from that single data point, then time the candidate and
/// average it against a second rescaled-to-target estimate (damping out
/// the noise a single measurement carries), and never drop below the
/// security floor regardless of how fast that settles.
pub fn calibrate_rounds() -> u32 {
    let salt = [0u8; 8];
    let passphrase = b"calibration";

    // Step 1: baseline timing, extrapolated to a first candidate.
    let start = Instant::now();
    derive_key_iv(passphrase, &salt, CALIBRATION_BASELINE_ROUNDS);
    let baseline_elapsed = start.elapsed();
    let candidate = scale_rounds(CALIBRATION_BASELINE_ROUNDS, baseline_elapsed, TARGET_DERIVATION_TIME);

    // Step 2: time the candidate, rescale it to the target again, and
    // average the two estimates.
    let start = Instant::now();
    derive_key_iv(passphrase, &salt, candidate);
    let candidate_elapsed = start.elapsed();
    let rescaled = scale_rounds(candidate, candidate_elapsed, TARGET_DERIVATION_TIME);
    let averaged = ((candidate as u64 + rescaled as u64) / 2) as u32;

    // Step 3: security floor.
    averaged.max(MIN_DERIVE_ROUNDS)
}

fn scale_rounds(rounds: u32, elapsed: Duration, target: Duration) -> u32 {
    if elapsed.is_zero() {
        return rounds.saturating_mul(2).max(1);
    }
    let ratio = target.as_secs_f64() / elapsed.as_secs_f64();
    ((rounds as f64) * ratio).round().max(1.0) as u32
}
