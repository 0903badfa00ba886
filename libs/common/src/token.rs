//! Random tokens and digests for CSRF, sessions and password resets

use rand::{Rng, distributions::Alphanumeric};
use sha2::{Digest, Sha256};

/// Generate a random alphanumeric token of `len` characters
pub fn generate_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Lowercase hex SHA-256 digest, used wherever a token is stored at rest
pub fn sha256_hex(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Compare two secrets without short-circuiting on the first difference
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
