//! Cryptographic utilities for verification tokens.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of a verification token in characters.
///
/// 32 symbols over a 62-symbol alphabet gives a little over 190 bits of entropy.
pub const TOKEN_LENGTH: usize = 32;

/// Number of hex characters of the SHA-256 digest kept in a token fingerprint.
const FINGERPRINT_LENGTH: usize = 12;

/// Generates a new single-use verification token.
///
/// Symbols are drawn from `[A-Za-z0-9]` using the operating system CSPRNG.
pub fn generate_verification_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns a short, non-reversible identifier for a token, safe to log.
pub fn token_fingerprint(token: &str) -> String {
    let mut digest = sha256_hex(token);
    digest.truncate(FINGERPRINT_LENGTH);
    digest
}

/// Compares two secrets without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
