//! Crypto schemes
//!
//! A scheme is an immutable, named bundle of a certificate, an optional
//! private key and the algorithms used with them. Holding a scheme with a
//! private key is what authorizes signing and certificate issuance.

use std::fmt;
use std::str::FromStr;

use crate::certificate::Certificate;
use crate::error::{PkiError, Result};
use crate::provider::PrivateKey;

/// Signature algorithms supported by the security provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    Sha256WithRsa,
    Sha384WithRsa,
    Sha512WithRsa,
    Sha256WithEcdsa,
    Sha384WithEcdsa,
    Sha512WithEcdsa,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha256WithRsa => "SHA256withRSA",
            SignatureAlgorithm::Sha384WithRsa => "SHA384withRSA",
            SignatureAlgorithm::Sha512WithRsa => "SHA512withRSA",
            SignatureAlgorithm::Sha256WithEcdsa => "SHA256withECDSA",
            SignatureAlgorithm::Sha384WithEcdsa => "SHA384withECDSA",
            SignatureAlgorithm::Sha512WithEcdsa => "SHA512withECDSA",
        }
    }

    /// The key algorithm a signing key must use with this signature algorithm
    pub fn key_algorithm(&self) -> KeyAlgorithm {
        match self {
            SignatureAlgorithm::Sha256WithRsa
            | SignatureAlgorithm::Sha384WithRsa
            | SignatureAlgorithm::Sha512WithRsa => KeyAlgorithm::Rsa,
            SignatureAlgorithm::Sha256WithEcdsa
            | SignatureAlgorithm::Sha384WithEcdsa
            | SignatureAlgorithm::Sha512WithEcdsa => KeyAlgorithm::Ec,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "");
        match normalized.as_str() {
            "sha256withrsa" => Ok(SignatureAlgorithm::Sha256WithRsa),
            "sha384withrsa" => Ok(SignatureAlgorithm::Sha384WithRsa),
            "sha512withrsa" => Ok(SignatureAlgorithm::Sha512WithRsa),
            "sha256withecdsa" => Ok(SignatureAlgorithm::Sha256WithEcdsa),
            "sha384withecdsa" => Ok(SignatureAlgorithm::Sha384WithEcdsa),
            "sha512withecdsa" => Ok(SignatureAlgorithm::Sha512WithEcdsa),
            _ => Err(PkiError::InvalidArgument(format!(
                "Unsupported signature algorithm: {}",
                s
            ))),
        }
    }
}

/// Key algorithms supported by the security provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Rsa,
    Ec,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "rsa",
            KeyAlgorithm::Ec => "ec",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rsa" => Ok(KeyAlgorithm::Rsa),
            "ec" | "ecdsa" => Ok(KeyAlgorithm::Ec),
            _ => Err(PkiError::InvalidArgument(format!(
                "Unsupported key algorithm: {}",
                s
            ))),
        }
    }
}

/// Returns true for names of the form `[A-Za-z0-9][A-Za-z0-9_-]*`
pub fn is_valid_scheme_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Named cryptographic configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    name: String,
    certificate: Certificate,
    private_key: Option<PrivateKey>,
    signature_algorithm: SignatureAlgorithm,
    key_algorithm: KeyAlgorithm,
    key_size: Option<u32>,
}

impl Scheme {
    pub fn builder() -> SchemeBuilder {
        SchemeBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    pub fn key_algorithm(&self) -> KeyAlgorithm {
        self.key_algorithm
    }

    pub fn key_size(&self) -> Option<u32> {
        self.key_size
    }

    /// A copy of this scheme with the private key removed
    pub fn without_private_key(&self) -> Self {
        Self {
            private_key: None,
            ..self.clone()
        }
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Builder for [`Scheme`]
#[derive(Debug, Default)]
pub struct SchemeBuilder {
    name: Option<String>,
    certificate: Option<Certificate>,
    private_key: Option<PrivateKey>,
    signature_algorithm: Option<SignatureAlgorithm>,
    key_algorithm: Option<KeyAlgorithm>,
    key_size: Option<u32>,
}

impl SchemeBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn certificate(mut self, certificate: Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn private_key(mut self, private_key: Option<PrivateKey>) -> Self {
        self.private_key = private_key;
        self
    }

    pub fn signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = Some(algorithm);
        self
    }

    pub fn key_algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.key_algorithm = Some(algorithm);
        self
    }

    pub fn key_size(mut self, key_size: Option<u32>) -> Self {
        self.key_size = key_size;
        self
    }

    pub fn build(self) -> Result<Scheme> {
        let name = self
            .name
            .ok_or_else(|| PkiError::InvalidArgument("Scheme name is required".to_string()))?;
        if !is_valid_scheme_name(&name) {
            return Err(PkiError::InvalidArgument(format!(
                "Invalid scheme name: {:?}",
                name
            )));
        }

        let certificate = self.certificate.ok_or_else(|| {
            PkiError::InvalidArgument(format!("Scheme {} requires a certificate", name))
        })?;
        let signature_algorithm = self.signature_algorithm.ok_or_else(|| {
            PkiError::InvalidArgument(format!("Scheme {} requires a signature algorithm", name))
        })?;
        let key_algorithm = self
            .key_algorithm
            .unwrap_or_else(|| signature_algorithm.key_algorithm());

        if signature_algorithm.key_algorithm() != key_algorithm {
            return Err(PkiError::InvalidArgument(format!(
                "Scheme {}: signature algorithm {} cannot be used with {} keys",
                name, signature_algorithm, key_algorithm
            )));
        }

        if let Some(key) = &self.private_key {
            if key.algorithm() != key_algorithm {
                return Err(PkiError::InvalidArgument(format!(
                    "Scheme {}: private key is {} but scheme declares {}",
                    name,
                    key.algorithm(),
                    key_algorithm
                )));
            }
        }

        Ok(Scheme {
            name,
            certificate,
            private_key: self.private_key,
            signature_algorithm,
            key_algorithm,
            key_size: self.key_size,
        })
    }
}
