use thiserror::Error;

/// Error types for the cairn-pki crate
#[derive(Error, Debug)]
pub enum PkiError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Key error: {0}")]
    KeyError(#[from] KeyError),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Reasons a private key could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Malformed private key: {0}")]
    Malformed(String),

    #[error("Unsupported RSA private key version: {0}")]
    UnsupportedVersion(String),

    #[error("Multi-prime RSA private keys are not supported")]
    MultiPrimeUnsupported,

    #[error("Private key is encrypted but no passphrase was provided")]
    PasswordRequired,

    #[error("Unrecognized private key cipher: {0}")]
    UnknownCipher(String),

    #[error("Malformed initialization vector: {0}")]
    MalformedIv(String),

    #[error("Unable to decrypt private key: {0}")]
    DecryptionFailed(String),

    #[error("Unsupported private key format: {0}")]
    UnsupportedFormat(String),
}

impl From<openssl::error::ErrorStack> for PkiError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        PkiError::CryptoError(err.to_string())
    }
}

impl From<der::Error> for KeyError {
    fn from(err: der::Error) -> Self {
        KeyError::Malformed(err.to_string())
    }
}

impl From<base64::DecodeError> for KeyError {
    fn from(err: base64::DecodeError) -> Self {
        KeyError::Malformed(format!("Invalid base64 body: {}", err))
    }
}

/// Result type for cairn-pki operations
pub type Result<T> = std::result::Result<T, PkiError>;
