use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keylog::keylog;
use super::{KEY_LEN, NONCE_LEN, SALT_LEN, SHA_256_LEN};
use crate::base64url;
use crate::error::{EceError, Result};
use crate::params::Params;
use crate::store::{KeyMaterial, KeyStore};

/// Which side of the exchange is deriving. Only the ordering of the public
/// keys in the ECDH context depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

/// Content-encryption key and nonce base for one message.
pub struct DerivedKey {
    key: Zeroizing<[u8; KEY_LEN]>,
    nonce_base: Zeroizing<[u8; NONCE_LEN]>,
}

impl DerivedKey {
    pub fn new(key: [u8; KEY_LEN], nonce_base: [u8; NONCE_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
            nonce_base: Zeroizing::new(nonce_base),
        }
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn nonce_base(&self) -> &[u8; NONCE_LEN] {
        &self.nonce_base
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .field("nonce_base", &"[REDACTED]")
            .finish()
    }
}

/// Derive the content-encryption key and nonce base for `params`.
///
/// Keys referenced by `keyid` are resolved through `store`.
pub fn derive_key_and_nonce(params: &Params, store: &KeyStore, mode: Mode) -> Result<DerivedKey> {
    let salt = extract_salt(params)?;
    let (secret, context) = extract_secret_and_context(params, store, mode)?;

    let (key_info, nonce_info) = match params.pad_size() {
        2 => (info("aesgcm", &context), info("nonce", &context)),
        1 => (
            b"Content-Encoding: aesgcm128".to_vec(),
            b"Content-Encoding: nonce".to_vec(),
        ),
        other => return Err(EceError::UnsupportedPadSize(other)),
    };

    let hkdf = Hkdf::<Sha256>::new(Some(&salt[..]), &secret);

    let mut key = [0u8; KEY_LEN];
    hkdf.expand(&key_info, &mut key)
        .map_err(|_| EceError::KeyDerivation(KEY_LEN))?;
    let mut nonce_base = [0u8; NONCE_LEN];
    hkdf.expand(&nonce_info, &mut nonce_base)
        .map_err(|_| EceError::KeyDerivation(NONCE_LEN))?;

    let derived = DerivedKey::new(key, nonce_base);
    keylog("key", derived.key());
    keylog("nonce base", derived.nonce_base());
    Ok(derived)
}

fn extract_salt(params: &Params) -> Result<[u8; SALT_LEN]> {
    let salt = base64url::decode(&params.salt, "salt")?;
    salt.as_slice()
        .try_into()
        .map_err(|_| EceError::InvalidSalt(salt.len()))
}

fn extract_secret_and_context(
    params: &Params,
    store: &KeyStore,
    mode: Mode,
) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>)> {
    let (secret, context) = if let Some(key) = &params.key {
        let secret = Zeroizing::new(base64url::decode(key, "key")?);
        if secret.len() != KEY_LEN {
            return Err(EceError::InvalidKeyLength(secret.len()));
        }
        (secret, Vec::new())
    } else if let Some(dh) = &params.dh {
        let keyid = params.keyid.as_deref().ok_or(EceError::NoKeyMaterial)?;
        extract_dh(store, keyid, dh, mode)?
    } else if let Some(keyid) = &params.keyid {
        match &*store.lookup(keyid)? {
            KeyMaterial::Symmetric(key) => (Zeroizing::new(key.as_bytes().to_vec()), Vec::new()),
            KeyMaterial::Agreement(_) => {
                return Err(EceError::KeyTypeMismatch {
                    keyid: keyid.clone(),
                    expected: "a symmetric key",
                });
            }
        }
    } else {
        return Err(EceError::NoKeyMaterial);
    };

    keylog("secret", &secret);
    keylog("context", &context);

    let Some(auth_secret) = &params.auth_secret else {
        return Ok((secret, context));
    };

    // fold the auth secret into the key material before the main derivation
    let auth_secret = Zeroizing::new(base64url::decode(auth_secret, "authSecret")?);
    let mut folded = Zeroizing::new(vec![0u8; SHA_256_LEN]);
    Hkdf::<Sha256>::new(Some(&auth_secret[..]), &secret)
        .expand(&info("auth", &[]), &mut folded[..])
        .map_err(|_| EceError::KeyDerivation(SHA_256_LEN))?;
    keylog("authsecret", &folded);

    Ok((folded, context))
}

fn extract_dh(
    store: &KeyStore,
    keyid: &str,
    dh: &str,
    mode: Mode,
) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>)> {
    let (entry, label) = store.lookup_labelled(keyid)?;
    let KeyMaterial::Agreement(pair) = &*entry else {
        return Err(EceError::KeyTypeMismatch {
            keyid: keyid.to_string(),
            expected: "an ECDH key pair",
        });
    };

    let share = base64url::decode(dh, "dh")?;
    let secret = pair.agree(&share)?;

    let local = pair.public_key_bytes();
    let (receiver, sender) = match mode {
        Mode::Encrypt => (share.as_slice(), local),
        Mode::Decrypt => (local, share.as_slice()),
    };

    let mut context = Vec::with_capacity(label.len() + 4 + receiver.len() + sender.len());
    context.extend_from_slice(&label);
    length_prefix(&mut context, receiver);
    length_prefix(&mut context, sender);

    Ok((secret, context))
}

/// Append `data` preceded by its length as a big-endian u16.
fn length_prefix(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

fn info(base: &str, context: &[u8]) -> Vec<u8> {
    let mut info = Vec::with_capacity(19 + base.len() + context.len());
    info.extend_from_slice(b"Content-Encoding: ");
    info.extend_from_slice(base.as_bytes());
    info.push(0);
    info.extend_from_slice(context);
    keylog(&format!("info {base}"), &info);
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AgreementKeyPair;
    use crate::store::SymmetricKey;

    const ZERO_16: &str = "AAAAAAAAAAAAAAAAAAAAAA";

    fn zero_params() -> Params {
        Params::new(ZERO_16).with_key(ZERO_16)
    }

    fn hkdf(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        Hkdf::<Sha256>::new(Some(salt), ikm)
            .expand(info, &mut out)
            .unwrap();
        out
    }

    #[test]
    fn kdf_is_deterministic() {
        let store = KeyStore::new();
        let k1 = derive_key_and_nonce(&zero_params(), &store, Mode::Encrypt).unwrap();
        let k2 = derive_key_and_nonce(&zero_params(), &store, Mode::Decrypt).unwrap();

        assert_eq!(k1.key(), k2.key());
        assert_eq!(k1.nonce_base(), k2.nonce_base());
    }

    #[test]
    fn explicit_key_uses_aesgcm_labels() {
        let store = KeyStore::new();
        let derived = derive_key_and_nonce(&zero_params(), &store, Mode::Encrypt).unwrap();

        let key = hkdf(&[0u8; 16], &[0u8; 16], b"Content-Encoding: aesgcm\0", 16);
        let nonce = hkdf(&[0u8; 16], &[0u8; 16], b"Content-Encoding: nonce\0", 12);
        assert_eq!(&derived.key()[..], &key[..]);
        assert_eq!(&derived.nonce_base()[..], &nonce[..]);
    }

    #[test]
    fn pad_size_one_uses_legacy_labels() {
        let store = KeyStore::new();
        let params = zero_params().with_pad_size(1);
        let derived = derive_key_and_nonce(&params, &store, Mode::Encrypt).unwrap();

        let key = hkdf(&[0u8; 16], &[0u8; 16], b"Content-Encoding: aesgcm128", 16);
        let nonce = hkdf(&[0u8; 16], &[0u8; 16], b"Content-Encoding: nonce", 12);
        assert_eq!(&derived.key()[..], &key[..]);
        assert_eq!(&derived.nonce_base()[..], &nonce[..]);
    }

    #[test]
    fn auth_secret_is_folded_in_first() {
        let store = KeyStore::new();
        let auth = [9u8; 16];
        let params = zero_params().with_auth_secret(base64url::encode(auth));
        let derived = derive_key_and_nonce(&params, &store, Mode::Encrypt).unwrap();

        let folded = hkdf(&auth, &[0u8; 16], b"Content-Encoding: auth\0", 32);
        let key = hkdf(&[0u8; 16], &folded, b"Content-Encoding: aesgcm\0", 16);
        assert_eq!(&derived.key()[..], &key[..]);
    }

    #[test]
    fn keyid_resolves_through_store() {
        let store = KeyStore::new();
        store.save("k", SymmetricKey::new([0u8; 16]), None);
        let by_id = derive_key_and_nonce(&Params::new(ZERO_16).with_keyid("k"), &store, Mode::Encrypt)
            .unwrap();
        let explicit = derive_key_and_nonce(&zero_params(), &store, Mode::Encrypt).unwrap();
        assert_eq!(by_id.key(), explicit.key());
    }

    #[test]
    fn explicit_key_wins_over_keyid() {
        let store = KeyStore::new();
        let params = zero_params().with_keyid("missing");
        assert!(derive_key_and_nonce(&params, &store, Mode::Encrypt).is_ok());
    }

    #[test]
    fn invalid_salt_fails() {
        let store = KeyStore::new();
        let params = Params::new("AAAA").with_key(ZERO_16);
        assert_eq!(
            derive_key_and_nonce(&params, &store, Mode::Encrypt).unwrap_err(),
            EceError::InvalidSalt(3)
        );
    }

    #[test]
    fn invalid_key_length_fails() {
        let store = KeyStore::new();
        let params = Params::new(ZERO_16).with_key("AAAA");
        assert_eq!(
            derive_key_and_nonce(&params, &store, Mode::Encrypt).unwrap_err(),
            EceError::InvalidKeyLength(3)
        );
    }

    #[test]
    fn unknown_keyid_fails() {
        let store = KeyStore::new();
        let params = Params::new(ZERO_16).with_keyid("nobody");
        assert_eq!(
            derive_key_and_nonce(&params, &store, Mode::Encrypt).unwrap_err(),
            EceError::UnknownKeyId("nobody".into())
        );
    }

    #[test]
    fn no_key_material_fails() {
        let store = KeyStore::new();
        assert_eq!(
            derive_key_and_nonce(&Params::new(ZERO_16), &store, Mode::Encrypt).unwrap_err(),
            EceError::NoKeyMaterial
        );
        let dh_only = Params::new(ZERO_16).with_dh(ZERO_16);
        assert_eq!(
            derive_key_and_nonce(&dh_only, &store, Mode::Encrypt).unwrap_err(),
            EceError::NoKeyMaterial
        );
    }

    #[test]
    fn unsupported_pad_size_fails() {
        let store = KeyStore::new();
        let params = zero_params().with_pad_size(3);
        assert_eq!(
            derive_key_and_nonce(&params, &store, Mode::Encrypt).unwrap_err(),
            EceError::UnsupportedPadSize(3)
        );
    }

    #[test]
    fn keyid_of_wrong_kind_fails() {
        let store = KeyStore::new();
        store.save("sym", SymmetricKey::new([0u8; 16]), None);
        store.save("pair", AgreementKeyPair::generate().unwrap(), Some("P-256"));

        let pair_as_key = Params::new(ZERO_16).with_keyid("pair");
        assert!(matches!(
            derive_key_and_nonce(&pair_as_key, &store, Mode::Encrypt),
            Err(EceError::KeyTypeMismatch { .. })
        ));

        let peer = AgreementKeyPair::generate().unwrap();
        let sym_as_pair = Params::new(ZERO_16)
            .with_keyid("sym")
            .with_dh(base64url::encode(peer.public_key_bytes()));
        assert!(matches!(
            derive_key_and_nonce(&sym_as_pair, &store, Mode::Encrypt),
            Err(EceError::KeyTypeMismatch { .. })
        ));
    }

    #[test]
    fn dh_context_orders_receiver_then_sender() {
        let local = AgreementKeyPair::generate().unwrap();
        let peer = AgreementKeyPair::generate().unwrap();
        let store = KeyStore::new();
        store.save("local", local.clone(), Some("P-256"));

        let share = base64url::encode(peer.public_key_bytes());
        let (_, context) = extract_dh(&store, "local", &share, Mode::Encrypt).unwrap();

        let mut expected = b"P-256\0".to_vec();
        expected.extend_from_slice(&[0, 65]);
        expected.extend_from_slice(peer.public_key_bytes());
        expected.extend_from_slice(&[0, 65]);
        expected.extend_from_slice(local.public_key_bytes());
        assert_eq!(context, expected);

        let (_, context) = extract_dh(&store, "local", &share, Mode::Decrypt).unwrap();
        assert_eq!(&context[6 + 2..6 + 2 + 65], local.public_key_bytes());
    }

    #[test]
    fn both_dh_sides_derive_the_same_key() {
        let a = AgreementKeyPair::generate().unwrap();
        let b = AgreementKeyPair::generate().unwrap();
        let sender = KeyStore::new();
        sender.save("local", a.clone(), Some("P-256"));
        let receiver = KeyStore::new();
        receiver.save("remote", b.clone(), Some("P-256"));

        let enc = Params::new(ZERO_16)
            .with_keyid("local")
            .with_dh(base64url::encode(b.public_key_bytes()));
        let dec = Params::new(ZERO_16)
            .with_keyid("remote")
            .with_dh(base64url::encode(a.public_key_bytes()));

        let k1 = derive_key_and_nonce(&enc, &sender, Mode::Encrypt).unwrap();
        let k2 = derive_key_and_nonce(&dec, &receiver, Mode::Decrypt).unwrap();
        assert_eq!(k1.key(), k2.key());
        assert_eq!(k1.nonce_base(), k2.nonce_base());
    }

    #[test]
    fn dh_context_follows_the_latest_label() {
        let local = AgreementKeyPair::generate().unwrap();
        let peer = AgreementKeyPair::generate().unwrap();
        let share = base64url::encode(peer.public_key_bytes());
        let store = KeyStore::new();

        store.save("local", local.clone(), Some("first"));
        let (_, context) = extract_dh(&store, "local", &share, Mode::Encrypt).unwrap();
        assert!(context.starts_with(b"first\0"));

        store.save("local", local.clone(), Some("second"));
        let (_, context) = extract_dh(&store, "local", &share, Mode::Encrypt).unwrap();
        assert!(context.starts_with(b"second\0\0\x41"));

        let params = Params::new(ZERO_16).with_keyid("local").with_dh(share);
        let relabelled = derive_key_and_nonce(&params, &store, Mode::Encrypt).unwrap();
        store.save("local", local, Some("first"));
        let original = derive_key_and_nonce(&params, &store, Mode::Encrypt).unwrap();
        assert_ne!(relabelled.key(), original.key());
    }

    #[test]
    fn dh_without_label_uses_empty_prefix() {
        let local = AgreementKeyPair::generate().unwrap();
        let peer = AgreementKeyPair::generate().unwrap();
        let store = KeyStore::new();
        store.save("local", local.clone(), None);

        let share = base64url::encode(peer.public_key_bytes());
        let (_, context) = extract_dh(&store, "local", &share, Mode::Encrypt).unwrap();
        assert_eq!(&context[..2], &[0x00, 0x41]);
        assert_eq!(context.len(), 2 * (2 + 65));
        assert_eq!(&context[2..67], peer.public_key_bytes());

        let receiver = KeyStore::new();
        receiver.save("remote", peer, None);
        let enc = Params::new(ZERO_16).with_keyid("local").with_dh(share);
        let dec = Params::new(ZERO_16)
            .with_keyid("remote")
            .with_dh(base64url::encode(local.public_key_bytes()));
        let k1 = derive_key_and_nonce(&enc, &store, Mode::Encrypt).unwrap();
        let k2 = derive_key_and_nonce(&dec, &receiver, Mode::Decrypt).unwrap();
        assert_eq!(k1.key(), k2.key());
        assert_eq!(k1.nonce_base(), k2.nonce_base());
    }
}
