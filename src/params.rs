//! Per-message parameters, in their wire form.
//!
//! Binary values (`salt`, `key`, `dh`, `authSecret`) stay base64url-encoded
//! here and are decoded during key derivation.

use serde::{Deserialize, Serialize};

use crate::crypto::{DEFAULT_PAD_SIZE, DEFAULT_RECORD_SIZE};
use crate::error::{EceError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// 16-byte salt, required.
    #[serde(default)]
    pub salt: String,
    /// Explicit 16-byte key. Takes precedence over `keyid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Name of a key saved in the key store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyid: Option<String>,
    /// Peer's P-256 public share; requires `keyid` naming a local key pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad_size: Option<u8>,
    /// Total padding to spread over the records. Ignored when decrypting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad: Option<usize>,
}

impl Params {
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_keyid(mut self, keyid: impl Into<String>) -> Self {
        self.keyid = Some(keyid.into());
        self
    }

    pub fn with_dh(mut self, dh: impl Into<String>) -> Self {
        self.dh = Some(dh.into());
        self
    }

    pub fn with_auth_secret(mut self, auth_secret: impl Into<String>) -> Self {
        self.auth_secret = Some(auth_secret.into());
        self
    }

    pub fn with_rs(mut self, rs: usize) -> Self {
        self.rs = Some(rs);
        self
    }

    pub fn with_pad_size(mut self, pad_size: u8) -> Self {
        self.pad_size = Some(pad_size);
        self
    }

    pub fn with_pad(mut self, pad: usize) -> Self {
        self.pad = Some(pad);
        self
    }

    /// The same parameters with the encrypt-only padding budget removed.
    pub fn without_pad(&self) -> Self {
        Self {
            pad: None,
            ..self.clone()
        }
    }

    pub fn pad_size(&self) -> u8 {
        self.pad_size.unwrap_or(DEFAULT_PAD_SIZE)
    }

    pub fn pad(&self) -> usize {
        self.pad.unwrap_or(0)
    }

    /// Record size, checked against the padding prefix width.
    pub fn record_size(&self) -> Result<usize> {
        let Some(rs) = self.rs else {
            return Ok(DEFAULT_RECORD_SIZE);
        };
        let pad_size = self.pad_size();
        if rs <= usize::from(pad_size) {
            return Err(EceError::InvalidRecordSize { rs, pad_size });
        }
        Ok(rs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let params = Params::new("salt");
        assert_eq!(params.pad_size(), 2);
        assert_eq!(params.pad(), 0);
        assert_eq!(params.record_size().unwrap(), 4096);
    }

    #[test]
    fn record_size_must_exceed_pad_size() {
        let params = Params::new("salt").with_rs(2);
        assert_eq!(
            params.record_size().unwrap_err(),
            EceError::InvalidRecordSize { rs: 2, pad_size: 2 }
        );
        assert_eq!(Params::new("salt").with_rs(3).record_size().unwrap(), 3);

        let legacy = Params::new("salt").with_pad_size(1);
        assert!(legacy.clone().with_rs(1).record_size().is_err());
        assert_eq!(legacy.with_rs(2).record_size().unwrap(), 2);
    }

    #[test]
    fn deserializes_wire_names() {
        let params: Params = serde_json::from_str(
            r#"{"salt":"s","keyid":"k","dh":"d","authSecret":"a","rs":10,"padSize":1,"pad":3}"#,
        )
        .unwrap();

        assert_eq!(
            params,
            Params::new("s")
                .with_keyid("k")
                .with_dh("d")
                .with_auth_secret("a")
                .with_rs(10)
                .with_pad_size(1)
                .with_pad(3)
        );
    }

    #[test]
    fn serializes_only_present_fields() {
        let json = serde_json::to_string(&Params::new("s").with_key("k")).unwrap();
        assert_eq!(json, r#"{"salt":"s","key":"k"}"#);
    }

    #[test]
    fn missing_salt_reads_as_empty() {
        let params: Params = serde_json::from_str(r#"{"key":"k"}"#).unwrap();
        assert!(params.salt.is_empty());
    }

    #[test]
    fn without_pad_drops_only_pad() {
        let params = Params::new("s").with_key("k").with_pad(9);
        let stripped = params.without_pad();
        assert_eq!(stripped.pad, None);
        assert_eq!(stripped.key.as_deref(), Some("k"));
    }
}
