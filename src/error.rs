use thiserror::Error;

/// Errors produced while deriving keys or coding records.
///
/// Every failure is terminal for the call that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EceError {
    #[error("the salt parameter must be 16 bytes, got {0}")]
    InvalidSalt(usize),

    #[error("an explicit key must be 16 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("no known key for '{0}'")]
    UnknownKeyId(String),

    #[error("unable to determine key: no key, keyid or dh parameter")]
    NoKeyMaterial,

    #[error("key '{keyid}' is not {expected}")]
    KeyTypeMismatch {
        keyid: String,
        expected: &'static str,
    },

    #[error("unsupported padSize {0}, only 1 and 2 are supported")]
    UnsupportedPadSize(u8),

    #[error("the rs parameter has to be greater than {pad_size}, got {rs}")]
    InvalidRecordSize { rs: usize, pad_size: u8 },

    #[error("invalid base64url value for '{0}'")]
    InvalidEncoding(&'static str),

    #[error("invalid P-256 public key")]
    InvalidPublicKey,

    #[error("invalid P-256 private key")]
    InvalidPrivateKey,

    #[error("HKDF output of {0} bytes is too long")]
    KeyDerivation(usize),

    #[error("truncated payload")]
    Truncated,

    #[error("invalid block: too small at record {0}")]
    BlockTooSmall(u64),

    #[error("wrong key or corrupted data: authentication failed")]
    AuthenticationFailure,

    #[error("invalid padding")]
    InvalidPadding,

    #[error("padding exceeds block size")]
    PaddingOverflow,

    #[error("unable to pad by requested amount, {0} remaining")]
    PaddingBudgetExceeded(usize),

    #[error("invalid tag generated: {0} bytes")]
    TagLengthMismatch(usize),

    #[error("record encryption failed")]
    EncryptionFailure,

    #[error("OS random generator unavailable")]
    KeyGeneration,
}

impl EceError {
    /// Returns `true` for failures that indicate a modified or damaged
    /// ciphertext rather than bad parameters.
    pub fn is_tampering(&self) -> bool {
        matches!(
            self,
            EceError::AuthenticationFailure
                | EceError::InvalidPadding
                | EceError::PaddingOverflow
                | EceError::Truncated
                | EceError::BlockTooSmall(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EceError>;
