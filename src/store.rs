use crate::crypto::{AgreementKeyPair, KEY_LEN};
use crate::error::{EceError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use zeroize::Zeroizing;

/// A raw content-encoding key, addressed by keyid.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl SymmetricKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| EceError::InvalidKeyLength(bytes.len()))?;
        Ok(Self::new(bytes))
    }

    pub fn generate() -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        crate::crypto::secure_random(&mut bytes[..])?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// What a keyid can refer to.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    Symmetric(SymmetricKey),
    Agreement(AgreementKeyPair),
}

impl From<SymmetricKey> for KeyMaterial {
    fn from(key: SymmetricKey) -> Self {
        KeyMaterial::Symmetric(key)
    }
}

impl From<AgreementKeyPair> for KeyMaterial {
    fn from(pair: AgreementKeyPair) -> Self {
        KeyMaterial::Agreement(pair)
    }
}

/// A saved key together with its NUL-terminated label (empty if none).
#[derive(Debug)]
struct Entry {
    material: Arc<KeyMaterial>,
    label: Arc<[u8]>,
}

/// Named keys and key pairs shared by every encrypt/decrypt call that
/// references them by keyid.
///
/// Reads take a shared lock and return `Arc` handles, so derivation never
/// runs while the lock is held. A key and its label are replaced together,
/// so a reader never sees one without the other.
#[derive(Debug, Default)]
pub struct KeyStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the key saved under `id`.
    ///
    /// A label is stored NUL-terminated and prefixes the ECDH derivation
    /// context. Saving without a label keeps any label saved earlier.
    pub fn save(&self, id: &str, key: impl Into<KeyMaterial>, label: Option<&str>) {
        let material = Arc::new(key.into());
        let mut entries = self.entries.write();
        let label: Arc<[u8]> = match label {
            Some(label) => {
                let mut bytes = Vec::with_capacity(label.len() + 1);
                bytes.extend_from_slice(label.as_bytes());
                bytes.push(0);
                Arc::from(bytes)
            }
            None => entries
                .get(id)
                .map(|entry| Arc::clone(&entry.label))
                .unwrap_or_else(|| Arc::from(Vec::new())),
        };
        let labelled = !label.is_empty();
        entries.insert(id.to_string(), Entry { material, label });
        tracing::debug!(keyid = id, labelled, "saved key");
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<KeyMaterial>> {
        self.lookup_labelled(id).map(|(material, _)| material)
    }

    /// The key saved under `id` and its label, read under one lock.
    pub fn lookup_labelled(&self, id: &str) -> Result<(Arc<KeyMaterial>, Arc<[u8]>)> {
        self.entries
            .read()
            .get(id)
            .map(|entry| (Arc::clone(&entry.material), Arc::clone(&entry.label)))
            .ok_or_else(|| EceError::UnknownKeyId(id.to_string()))
    }

    /// The NUL-terminated label for `id`, empty when none was saved.
    pub fn label(&self, id: &str) -> Arc<[u8]> {
        self.lookup_labelled(id)
            .map(|(_, label)| label)
            .unwrap_or_else(|_| Arc::from(Vec::new()))
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        match self.entries.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(EceError::UnknownKeyId(id.to_string())),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
