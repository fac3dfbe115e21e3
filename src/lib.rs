//! Encrypted Content-Encoding (`aesgcm`) for whole buffers.
//!
//! A payload is split into records of at most `rs` bytes, each padded and
//! sealed with AES-128-GCM under a key and nonce base derived by HKDF from
//! the message salt and a secret: an explicit key, a key saved in a
//! [`KeyStore`], or a P-256 ECDH agreement with a peer.

pub mod base64url;
pub mod crypto;
mod error;
pub mod keyfile;
mod params;
pub mod storage;
mod store;
mod stream;

pub use crate::crypto::{AgreementKeyPair, generate_salt};
pub use crate::error::{EceError, Result};
pub use crate::keyfile::KeyFile;
pub use crate::params::Params;
pub use crate::storage::Storage;
pub use crate::store::{KeyMaterial, KeyStore, SymmetricKey};
pub use crate::stream::{decrypt, encrypt};

use anyhow::Context;
use directories::ProjectDirs;
use std::sync::Arc;

/// A codec bound to one key store.
///
/// Cloning is cheap and clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct Ece {
    keys: Arc<KeyStore>,
}

impl Ece {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn save(&self, id: &str, key: impl Into<KeyMaterial>, label: Option<&str>) {
        self.keys.save(id, key, label);
    }

    pub fn encrypt(&self, plaintext: &[u8], params: &Params) -> Result<Vec<u8>> {
        stream::encrypt(plaintext, params, &self.keys)
    }

    pub fn decrypt(&self, ciphertext: &[u8], params: &Params) -> Result<Vec<u8>> {
        stream::decrypt(ciphertext, params, &self.keys)
    }
}

/// Key file location used when none is configured.
pub fn default_storage() -> anyhow::Result<Storage> {
    let project_dirs =
        ProjectDirs::from("", "", "ecekit").context("could not determine platform directories")?;

    let path = project_dirs.data_dir().join("keys.json");

    Ok(Storage::new(path))
}
