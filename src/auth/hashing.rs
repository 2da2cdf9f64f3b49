//! Password hashing parameters and token fingerprinting.

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha256};

use crate::config::HashingConfig;

/// Build an Argon2id hasher from the configured work factor. Parameter
/// combinations the library rejects fall back to its defaults.
pub fn password_hasher(config: &HashingConfig) -> Argon2<'static> {
    let params = Params::new(config.memory_kib, config.iterations, config.parallelism, Some(32))
        .unwrap_or_default();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Hex-encoded SHA-256 fingerprint of a token. Sessions store fingerprints
/// rather than token material, so a leaked sessions table cannot replay
/// tokens.
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
