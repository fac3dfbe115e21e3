//! Cryptographic primitives for the content encoding.
//!
//! Provides key agreement, key derivation and single-record AEAD.

pub mod aead;
pub mod ecdh;
pub mod kdf;
pub(crate) mod keylog;

pub use aead::{decrypt_record, encrypt_record, generate_nonce, max_padding};
pub use ecdh::AgreementKeyPair;
pub use kdf::{DerivedKey, Mode, derive_key_and_nonce};

use crate::error::{EceError, Result};
use getrandom::fill;

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of a content-encryption key (AES-128).
pub const KEY_LEN: usize = 16;
/// Length of the nonce base and of every record nonce.
pub const NONCE_LEN: usize = 12;
/// Length of the AES-GCM authentication tag.
pub const TAG_LEN: usize = 16;
/// Output length of SHA-256, used for the auth secret step.
pub const SHA_256_LEN: usize = 32;
/// Record size used when `rs` is not given.
pub const DEFAULT_RECORD_SIZE: usize = 4096;
/// Padding length prefix width used when `padSize` is not given.
pub const DEFAULT_PAD_SIZE: u8 = 2;

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| EceError::KeyGeneration)
}

/// Generate a fresh salt for one message.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}
