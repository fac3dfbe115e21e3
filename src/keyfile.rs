//! On-disk key file for the command line tool.
//!
//! A versioned JSON document mapping keyids to keys:
//! ```text
//! { "version": 1,
//!   "keys": { "<id>": { "type": "aes128", "key": "<b64url>", "created": "..." },
//!             "<id>": { "type": "p256", "private": "<b64url>", "label": "P-256", "created": "..." } } }
//! ```

use anyhow::{Context, Result, bail};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

use crate::base64url;
use crate::crypto::AgreementKeyPair;
use crate::store::{KeyStore, SymmetricKey};

/// Latest key file version
pub const CURRENT_VERSION: u8 = 1;

#[derive(Serialize, Deserialize, Debug)]
pub struct KeyFile {
    version: u8,
    #[serde(default)]
    keys: BTreeMap<String, KeyEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KeyEntry {
    Aes128 {
        key: String,
        created: String,
    },
    P256 {
        private: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        created: String,
    },
}

impl KeyEntry {
    pub fn created(&self) -> &str {
        match self {
            KeyEntry::Aes128 { created, .. } | KeyEntry::P256 { created, .. } => created,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            KeyEntry::Aes128 { .. } => "aes128",
            KeyEntry::P256 { .. } => "p256",
        }
    }
}

impl Default for KeyFile {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyFile {
    pub fn new() -> Self {
        Self {
            version: CURRENT_VERSION,
            keys: BTreeMap::new(),
        }
    }

    /// Parses a key file.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the version is unsupported.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let file: KeyFile = serde_json::from_slice(data).context("malformed key file")?;
        if file.version != CURRENT_VERSION {
            bail!("unsupported key file version: {}", file.version);
        }
        Ok(file)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&KeyEntry> {
        self.keys.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &KeyEntry)> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn insert_symmetric(&mut self, id: &str, key: &SymmetricKey) {
        self.keys.insert(
            id.to_string(),
            KeyEntry::Aes128 {
                key: base64url::encode(key.as_bytes()),
                created: Local::now().to_rfc3339(),
            },
        );
    }

    pub fn insert_agreement(&mut self, id: &str, pair: &AgreementKeyPair, label: Option<&str>) {
        self.keys.insert(
            id.to_string(),
            KeyEntry::P256 {
                private: base64url::encode(pair.private_bytes().as_slice()),
                label: label.map(str::to_string),
                created: Local::now().to_rfc3339(),
            },
        );
    }

    /// Returns whether `id` was present.
    pub fn remove(&mut self, id: &str) -> bool {
        self.keys.remove(id).is_some()
    }

    /// Saves every entry into `store`.
    pub fn load_into(&self, store: &KeyStore) -> Result<()> {
        for (id, entry) in &self.keys {
            match entry {
                KeyEntry::Aes128 { key, .. } => {
                    let bytes = Zeroizing::new(base64url::decode(key, "key")?);
                    let key = SymmetricKey::from_slice(&bytes)
                        .with_context(|| format!("invalid key '{id}'"))?;
                    store.save(id, key, None);
                }
                KeyEntry::P256 { private, label, .. } => {
                    let bytes = Zeroizing::new(base64url::decode(private, "private")?);
                    let pair = AgreementKeyPair::from_private_bytes(&bytes)
                        .with_context(|| format!("invalid key pair '{id}'"))?;
                    store.save(id, pair, label.as_deref());
                }
            }
        }
        Ok(())
    }
}
