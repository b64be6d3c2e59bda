//! Security provider capability
//!
//! Every cryptographic primitive used by this crate goes through a
//! [`SecurityProvider`]. Callers never touch a concrete crypto library type;
//! keys cross the boundary as opaque [`PrivateKey`] values.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use crate::certificate::Certificate;
use crate::error::{KeyError, Result};
use crate::scheme::{KeyAlgorithm, Scheme, SignatureAlgorithm};

/// Opaque private key capability.
///
/// Holds the key as PKCS#8 DER. The material is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    algorithm: KeyAlgorithm,
    pkcs8_der: Vec<u8>,
}

impl PrivateKey {
    /// Only providers mint keys; they are responsible for validating the encoding.
    pub(crate) fn new(algorithm: KeyAlgorithm, pkcs8_der: Vec<u8>) -> Self {
        Self {
            algorithm,
            pkcs8_der,
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub(crate) fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8_der
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Symmetric ciphers accepted in a legacy `DEK-Info` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemCipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    DesEde3Cbc,
    DesCbc,
}

impl PemCipher {
    pub fn iv_len(&self) -> usize {
        match self {
            PemCipher::Aes128Cbc | PemCipher::Aes192Cbc | PemCipher::Aes256Cbc => 16,
            PemCipher::DesEde3Cbc | PemCipher::DesCbc => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PemCipher::Aes128Cbc => "AES-128-CBC",
            PemCipher::Aes192Cbc => "AES-192-CBC",
            PemCipher::Aes256Cbc => "AES-256-CBC",
            PemCipher::DesEde3Cbc => "DES-EDE3-CBC",
            PemCipher::DesCbc => "DES-CBC",
        }
    }
}

impl FromStr for PemCipher {
    type Err = KeyError;

    fn from_str(s: &str) -> std::result::Result<Self, KeyError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AES-128-CBC" => Ok(PemCipher::Aes128Cbc),
            "AES-192-CBC" => Ok(PemCipher::Aes192Cbc),
            "AES-256-CBC" => Ok(PemCipher::Aes256Cbc),
            "DES-EDE3-CBC" => Ok(PemCipher::DesEde3Cbc),
            "DES-CBC" => Ok(PemCipher::DesCbc),
            other => Err(KeyError::UnknownCipher(other.to_string())),
        }
    }
}

/// The nine integers of an RSA private key in CRT form, big-endian unsigned
#[derive(Clone, PartialEq, Eq)]
pub struct RsaPrivateComponents {
    pub modulus: Vec<u8>,
    pub public_exponent: Vec<u8>,
    pub private_exponent: Vec<u8>,
    pub prime1: Vec<u8>,
    pub prime2: Vec<u8>,
    pub exponent1: Vec<u8>,
    pub exponent2: Vec<u8>,
    pub coefficient: Vec<u8>,
}

impl fmt::Debug for RsaPrivateComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPrivateComponents")
            .field("modulus_bits", &(self.modulus.len() * 8))
            .finish_non_exhaustive()
    }
}

/// Key material handed to [`SecurityProvider::parse_key`]
pub enum KeyInfo<'a> {
    /// Unencrypted PKCS#8 `PrivateKeyInfo` DER
    Pkcs8(&'a [u8]),
    /// PKCS#8 `EncryptedPrivateKeyInfo` DER and its password
    EncryptedPkcs8 { der: &'a [u8], password: &'a [u8] },
    /// Decoded RSA private key structure
    Rsa(&'a RsaPrivateComponents),
}

/// Fields of a certificate to be issued by a scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateTemplate {
    /// Subject distinguished name as `(attribute, value)` pairs, e.g. `("CN", "example")`
    pub subject: Vec<(String, String)>,
    /// SubjectPublicKeyInfo DER of the key being certified
    pub public_key_der: Vec<u8>,
    pub serial: u64,
    pub validity_days: u32,
    pub certificate_authority: bool,
}

/// Capability interface over the underlying cryptographic library
pub trait SecurityProvider: Send + Sync {
    /// Provider name for diagnostics
    fn name(&self) -> &str;

    /// Sign everything readable from `source` with `key`
    fn sign(
        &self,
        algorithm: SignatureAlgorithm,
        key: &PrivateKey,
        source: &mut dyn Read,
    ) -> Result<Vec<u8>>;

    /// Check `signature` over `data` against the public key in `certificate`.
    /// `Ok(false)` is a definitive mismatch; `Err` means the check could not be performed.
    fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        certificate: &Certificate,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool>;

    /// Check whether `subject` carries a signature made by the key of `issuer`
    fn verify_issued(&self, subject: &Certificate, issuer: &Certificate) -> Result<bool>;

    /// Decrypt a legacy PEM body
    fn decrypt(
        &self,
        cipher: PemCipher,
        password: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> std::result::Result<Vec<u8>, KeyError>;

    /// Turn decoded key material into a provider-native private key
    fn parse_key(&self, info: KeyInfo<'_>) -> std::result::Result<PrivateKey, KeyError>;

    /// Confirm the provider can load `certificate`
    fn check_certificate(&self, certificate: &Certificate) -> Result<()>;

    /// Issue a certificate described by `template`, signed by `issuer`
    fn issue_certificate(
        &self,
        template: &CertificateTemplate,
        issuer: &Scheme,
    ) -> Result<Certificate>;
}
