//! Single-record AES-128-GCM with length-prefixed zero padding.
//!
//! Record plaintext layout:
//! ```text
//! PAD_LEN (padSize, big-endian) | PAD_LEN zero bytes | DATA
//! ```
//! The record on the wire is the ciphertext of that followed by the 16-byte tag.

use aes_gcm::{
    Aes128Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use zeroize::Zeroizing;

use super::keylog::keylog;
use super::kdf::DerivedKey;
use super::{NONCE_LEN, TAG_LEN};
use crate::error::{EceError, Result};

/// Largest padding length expressible in a `pad_size`-byte prefix.
pub fn max_padding(pad_size: u8) -> usize {
    1usize
        .checked_shl(8 * u32::from(pad_size))
        .map_or(usize::MAX, |limit| limit - 1)
}

/// Nonce for record `counter`: the counter is XORed into the last six bytes
/// of the nonce base, as two 24-bit halves.
pub fn generate_nonce(base: &[u8; NONCE_LEN], counter: u64) -> [u8; NONCE_LEN] {
    let mut nonce = *base;

    let mut tail = [0u8; 8];
    tail[2..].copy_from_slice(&nonce[NONCE_LEN - 6..]);
    let m = u64::from_be_bytes(tail);

    let low = (m ^ counter) & 0xff_ffff;
    let high = ((m >> 24) ^ (counter >> 24)) & 0xff_ffff;
    let x = (high << 24) | low;

    nonce[NONCE_LEN - 6..].copy_from_slice(&x.to_be_bytes()[2..]);
    keylog(&format!("nonce{counter}"), &nonce);
    nonce
}

fn check_pad_size(pad_size: u8) -> Result<usize> {
    match pad_size {
        1 | 2 => Ok(usize::from(pad_size)),
        other => Err(EceError::UnsupportedPadSize(other)),
    }
}

/// Encrypt one record holding `chunk` behind `pad` bytes of zero padding.
pub fn encrypt_record(
    key: &DerivedKey,
    counter: u64,
    chunk: &[u8],
    pad: usize,
    pad_size: u8,
) -> Result<Vec<u8>> {
    keylog("encrypt", chunk);
    let prefix_len = check_pad_size(pad_size)?;
    if pad > max_padding(pad_size) {
        return Err(EceError::PaddingOverflow);
    }

    let nonce = generate_nonce(key.nonce_base(), counter);
    let cipher = Aes128Gcm::new(key.key().into());

    let mut plaintext = Zeroizing::new(Vec::with_capacity(prefix_len + pad + chunk.len()));
    plaintext.extend_from_slice(&(pad as u64).to_be_bytes()[8 - prefix_len..]);
    plaintext.resize(prefix_len + pad, 0);
    plaintext.extend_from_slice(chunk);

    let encrypted = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| EceError::EncryptionFailure)?;

    let tag_len = encrypted.len().saturating_sub(plaintext.len());
    if tag_len != TAG_LEN {
        return Err(EceError::TagLengthMismatch(tag_len));
    }

    keylog("encrypted", &encrypted);
    Ok(encrypted)
}

/// Decrypt one record and strip its padding.
///
/// The padding is always checked to be all zero.
pub fn decrypt_record(
    key: &DerivedKey,
    counter: u64,
    block: &[u8],
    pad_size: u8,
) -> Result<Zeroizing<Vec<u8>>> {
    keylog("decrypt", block);
    let prefix_len = check_pad_size(pad_size)?;
    if block.len() < TAG_LEN {
        return Err(EceError::BlockTooSmall(counter));
    }

    let nonce = generate_nonce(key.nonce_base(), counter);
    let cipher = Aes128Gcm::new(key.key().into());

    let data = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce), block)
            .map_err(|_| EceError::AuthenticationFailure)?,
    );
    keylog("decrypted", &data);

    if data.len() < prefix_len {
        return Err(EceError::PaddingOverflow);
    }
    let mut prefix = [0u8; 8];
    prefix[8 - prefix_len..].copy_from_slice(&data[..prefix_len]);
    let pad = u64::from_be_bytes(prefix) as usize;

    if pad + prefix_len > data.len() {
        return Err(EceError::PaddingOverflow);
    }
    if data[prefix_len..prefix_len + pad].iter().any(|&b| b != 0) {
        return Err(EceError::InvalidPadding);
    }

    Ok(Zeroizing::new(data[prefix_len + pad..].to_vec()))
}
