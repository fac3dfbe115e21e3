//! P-256 key pairs for the `dh` parameter.

use p256::{
    PublicKey, SecretKey, ecdh::diffie_hellman, elliptic_curve::sec1::ToEncodedPoint,
};
use zeroize::Zeroizing;

use super::secure_random;
use crate::error::{EceError, Result};

/// Length of a P-256 private scalar.
pub const PRIVATE_KEY_LEN: usize = 32;

/// A local ECDH key pair. The public half is kept in uncompressed SEC1
/// form, which is what goes into the derivation context.
#[derive(Clone)]
pub struct AgreementKeyPair {
    secret: SecretKey,
    public: Vec<u8>,
}

impl AgreementKeyPair {
    pub fn generate() -> Result<Self> {
        loop {
            let mut bytes = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
            secure_random(&mut bytes[..])?;
            // out-of-range scalars are astronomically rare; draw again
            if let Ok(pair) = Self::from_private_bytes(&bytes[..]) {
                return Ok(pair);
            }
        }
    }

    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(EceError::InvalidPrivateKey);
        }
        let secret = SecretKey::from_slice(bytes).map_err(|_| EceError::InvalidPrivateKey)?;
        let public = secret
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        Ok(Self { secret, public })
    }

    pub fn private_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.secret.to_bytes().to_vec())
    }

    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public
    }

    /// Shared secret (x coordinate) with the peer's SEC1-encoded share.
    pub fn agree(&self, peer: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let peer = PublicKey::from_sec1_bytes(peer).map_err(|_| EceError::InvalidPublicKey)?;
        let shared = diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
    }
}

impl std::fmt::Debug for AgreementKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementKeyPair")
            .field("secret", &"[REDACTED]")
            .field("public", &crate::base64url::encode(&self.public))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_is_uncompressed_point() {
        let pair = AgreementKeyPair::generate().unwrap();
        assert_eq!(pair.public_key_bytes().len(), 65);
        assert_eq!(pair.public_key_bytes()[0], 0x04);
    }

    #[test]
    fn both_sides_agree_on_secret() {
        let a = AgreementKeyPair::generate().unwrap();
        let b = AgreementKeyPair::generate().unwrap();

        let ab = a.agree(b.public_key_bytes()).unwrap();
        let ba = b.agree(a.public_key_bytes()).unwrap();

        assert_eq!(ab.len(), 32);
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn private_bytes_restore_the_pair() {
        let a = AgreementKeyPair::generate().unwrap();
        let restored = AgreementKeyPair::from_private_bytes(&a.private_bytes()).unwrap();
        assert_eq!(a.public_key_bytes(), restored.public_key_bytes());
    }

    #[test]
    fn invalid_peer_share_fails() {
        let a = AgreementKeyPair::generate().unwrap();
        assert_eq!(
            a.agree(&[4u8; 65]).unwrap_err(),
            EceError::InvalidPublicKey
        );
        assert_eq!(a.agree(&[]).unwrap_err(), EceError::InvalidPublicKey);
    }

    #[test]
    fn invalid_private_key_fails() {
        assert_eq!(
            AgreementKeyPair::from_private_bytes(&[0u8; 32]).unwrap_err(),
            EceError::InvalidPrivateKey
        );
        assert_eq!(
            AgreementKeyPair::from_private_bytes(&[1u8; 16]).unwrap_err(),
            EceError::InvalidPrivateKey
        );
    }

    #[test]
    fn debug_output_redacts_secret() {
        let a = AgreementKeyPair::generate().unwrap();
        let shown = format!("{a:?}");
        assert!(shown.contains("[REDACTED]"));
    }
}
