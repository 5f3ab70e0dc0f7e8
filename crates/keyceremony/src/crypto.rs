//! byte-level primitives shared by the codec and the software backend
//!
//! - xor for one-time pad masking
//! - random bytes for pads, shares and nonces

use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};

use crate::{Error, Result};

/// xor two byte slices of equal length
///
/// unequal lengths are an error, never a truncation.
pub fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>> {
    if a.len() != b.len() {
        return Err(Error::OtpLengthMismatch {
            otp: a.len(),
            encoded: b.len(),
        });
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect())
}

/// generate random bytes
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// generate a random byte vector of runtime length
pub fn random_vec(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// random alphanumeric text, used for tokens
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
