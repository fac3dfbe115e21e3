//! URL-safe base64 without padding, used for every binary wire value.

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

use crate::error::{EceError, Result};

const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as base64url without trailing `=`.
pub fn encode(data: impl AsRef<[u8]>) -> String {
    ENGINE.encode(data)
}

/// Decode a base64url value. `field` names the parameter in the error.
pub fn decode(value: &str, field: &'static str) -> Result<Vec<u8>> {
    ENGINE
        .decode(value.trim_end_matches('='))
        .map_err(|_| EceError::InvalidEncoding(field))
}

/// Returns `true` if `value` only uses the base64url alphabet.
pub fn validate(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
