//! X.509 certificate wrapper and certificate file reading
//!
//! Certificates are held as DER bytes. Two certificates are the same
//! certificate exactly when their encodings are byte-identical.

use sha2::{Digest, Sha256};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use x509_parser::prelude::*;

use crate::error::{PkiError, Result};

/// Standard X.509 certificate wrapper
#[derive(Debug, Clone)]
pub struct Certificate {
    /// DER-encoded certificate bytes
    der_bytes: Vec<u8>,
    /// Certificate subject
    subject: String,
    /// Certificate issuer
    issuer: String,
}

impl Certificate {
    /// Create from DER-encoded bytes
    pub fn from_der(der_bytes: Vec<u8>) -> Result<Self> {
        let (remaining, parsed_cert) =
            x509_parser::certificate::X509Certificate::from_der(&der_bytes).map_err(|e| {
                PkiError::CertificateError(format!("Failed to parse certificate: {}", e))
            })?;

        if !remaining.is_empty() {
            return Err(PkiError::CertificateError(format!(
                "Unexpected {} trailing bytes after certificate",
                remaining.len()
            )));
        }

        let subject = parsed_cert.subject().to_string();
        let issuer = parsed_cert.issuer().to_string();

        Ok(Self {
            der_bytes,
            subject,
            issuer,
        })
    }

    /// Create from a single PEM `CERTIFICATE` block
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self> {
        let (remaining, pem) = x509_parser::pem::parse_x509_pem(pem_bytes).map_err(|e| {
            PkiError::CertificateError(format!("Failed to parse certificate PEM: {}", e))
        })?;

        if pem.label != "CERTIFICATE" {
            return Err(PkiError::CertificateError(format!(
                "Unexpected PEM label: {}",
                pem.label
            )));
        }

        if contains_pem_block(remaining) {
            return Err(PkiError::CertificateError(
                "Expected exactly one certificate, found several".to_string(),
            ));
        }

        Self::from_der(pem.contents)
    }

    /// Get DER-encoded bytes
    pub fn der_bytes(&self) -> &[u8] {
        &self.der_bytes
    }

    /// Get certificate subject
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Get certificate issuer
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// True when subject and issuer names match
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// Hex SHA-256 over the DER encoding
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.der_bytes);
        hex::encode(digest)
    }

    /// Parse the certificate for inspection
    pub fn parsed(&self) -> Result<x509_parser::certificate::X509Certificate<'_>> {
        let (_, cert) = x509_parser::certificate::X509Certificate::from_der(&self.der_bytes)
            .map_err(|e| {
                PkiError::CertificateError(format!("Failed to parse certificate: {}", e))
            })?;
        Ok(cert)
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der_bytes == other.der_bytes
    }
}

impl Eq for Certificate {}

impl Hash for Certificate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.der_bytes.hash(state);
    }
}

fn contains_pem_block(data: &[u8]) -> bool {
    data.windows(b"-----BEGIN".len())
        .any(|window| window == b"-----BEGIN")
}

/// Loads a certificate from the filesystem
pub trait CertificateReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Certificate>;
}

/// Reads files holding exactly one certificate, PEM or raw DER
#[derive(Debug, Clone, Copy, Default)]
pub struct PemCertificateReader;

impl PemCertificateReader {
    pub fn new() -> Self {
        Self
    }
}

impl CertificateReader for PemCertificateReader {
    fn read(&self, path: &Path) -> Result<Certificate> {
        let data = fs::read(path).map_err(|e| {
            PkiError::CertificateError(format!(
                "Unable to read certificate file {}: {}",
                path.display(),
                e
            ))
        })?;

        let result = if contains_pem_block(&data) {
            Certificate::from_pem(&data)
        } else {
            Certificate::from_der(data)
        };

        result.map_err(|e| match e {
            PkiError::CertificateError(msg) => {
                PkiError::CertificateError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }
}
