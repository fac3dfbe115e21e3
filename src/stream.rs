//! Whole-buffer encryption and decryption as a sequence of records.

use crate::crypto::{
    Mode, TAG_LEN, decrypt_record, derive_key_and_nonce, encrypt_record, max_padding,
};
use crate::error::{EceError, Result};
use crate::params::Params;
use crate::store::KeyStore;

/// Encrypt `plaintext` into records of at most `rs + 16` bytes.
///
/// The loop runs while `start <= len`, so the output always ends with a
/// record shorter than a full one, possibly holding only padding.
pub fn encrypt(plaintext: &[u8], params: &Params, store: &KeyStore) -> Result<Vec<u8>> {
    let key = derive_key_and_nonce(params, store, Mode::Encrypt)?;
    let rs = params.record_size()?;
    let pad_size = params.pad_size();
    let prefix_len = usize::from(pad_size);
    let max_pad = max_padding(pad_size);
    let mut remaining = params.pad();

    // every record advances by at least one byte, so at most len + 1 records
    // carry padding; any budget beyond that is reported after the loop
    let per_record = max_pad.min(rs - prefix_len - 1);
    let placeable = plaintext
        .len()
        .saturating_add(1)
        .saturating_mul(per_record);
    let estimate = plaintext.len() / (rs - prefix_len) + 1;
    let mut result = Vec::with_capacity(
        plaintext
            .len()
            .saturating_add(remaining.min(placeable))
            .saturating_add(estimate.saturating_mul(prefix_len + TAG_LEN)),
    );

    let mut start = 0;
    let mut counter = 0u64;
    while start <= plaintext.len() {
        // leave room for at least one data byte per record
        let record_pad = max_pad.min((rs - prefix_len - 1).min(remaining));
        remaining -= record_pad;

        let step = rs - prefix_len - record_pad;
        let end = (start + step).min(plaintext.len());
        let record = encrypt_record(&key, counter, &plaintext[start..end], record_pad, pad_size)?;
        tracing::trace!(counter, len = record.len(), pad = record_pad, "encrypted record");
        result.extend_from_slice(&record);

        start += step;
        counter += 1;
    }

    if remaining > 0 {
        return Err(EceError::PaddingBudgetExceeded(remaining));
    }

    tracing::debug!(
        records = counter,
        rs,
        pad_size,
        len = result.len(),
        "encrypted payload"
    );
    Ok(result)
}

/// Decrypt a buffer produced by [`encrypt`]. Any bad record fails the whole
/// call and no plaintext is returned.
pub fn decrypt(ciphertext: &[u8], params: &Params, store: &KeyStore) -> Result<Vec<u8>> {
    let key = derive_key_and_nonce(params, store, Mode::Decrypt)?;
    let rs = params.record_size()?;
    let pad_size = params.pad_size();

    let mut result = Vec::with_capacity(ciphertext.len());
    let mut start = 0;
    let mut counter = 0u64;
    while start < ciphertext.len() {
        let end = start.saturating_add(rs).saturating_add(TAG_LEN);
        // a full-size record may never be the last one
        if end == ciphertext.len() {
            return Err(EceError::Truncated);
        }
        let end = end.min(ciphertext.len());
        if end - start <= TAG_LEN {
            return Err(EceError::BlockTooSmall(counter));
        }

        let chunk = decrypt_record(&key, counter, &ciphertext[start..end], pad_size)?;
        tracing::trace!(counter, len = chunk.len(), "decrypted record");
        result.extend_from_slice(&chunk);

        start = end;
        counter += 1;
    }

    tracing::debug!(records = counter, rs, pad_size, len = result.len(), "decrypted payload");
    Ok(result)
}
