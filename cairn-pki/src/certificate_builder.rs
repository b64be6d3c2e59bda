use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use cairn_common::{Component, Logger};

use crate::certificate::Certificate;
use crate::error::{PkiError, Result};
use crate::provider::{CertificateTemplate, SecurityProvider};
use crate::scheme::Scheme;

const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// Issues certificates signed by a scheme's private key
pub struct CertificateBuilder {
    scheme: Scheme,
    provider: Arc<dyn SecurityProvider>,
    logger: Arc<Logger>,
    subject: Option<String>,
    public_key_der: Option<Vec<u8>>,
    validity_days: u32,
    serial: Option<u64>,
    certificate_authority: bool,
}

impl CertificateBuilder {
    /// Fails with [`PkiError::InvalidArgument`] when the scheme has no private key
    pub fn new(
        scheme: Scheme,
        provider: Arc<dyn SecurityProvider>,
        logger: Arc<Logger>,
    ) -> Result<Self> {
        if !scheme.has_private_key() {
            return Err(PkiError::InvalidArgument(format!(
                "Scheme {} has no private key and cannot issue certificates",
                scheme.name()
            )));
        }
        let logger = Arc::new(
            logger
                .with_component(Component::Custom("Issuer"))
                .with_scheme(scheme.name()),
        );

        Ok(Self {
            scheme,
            provider,
            logger,
            subject: None,
            public_key_der: None,
            validity_days: DEFAULT_VALIDITY_DAYS,
            serial: None,
            certificate_authority: false,
        })
    }

    /// Subject distinguished name, e.g. `CN=consumer-1, O=Example`
    pub fn subject(mut self, dn: impl Into<String>) -> Self {
        self.subject = Some(dn.into());
        self
    }

    /// DER `SubjectPublicKeyInfo` of the key being certified
    pub fn public_key_der(mut self, spki: impl Into<Vec<u8>>) -> Self {
        self.public_key_der = Some(spki.into());
        self
    }

    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Defaults to the current time in milliseconds
    pub fn serial(mut self, serial: u64) -> Self {
        self.serial = Some(serial);
        self
    }

    pub fn certificate_authority(mut self, ca: bool) -> Self {
        self.certificate_authority = ca;
        self
    }

    pub fn build(self) -> Result<Certificate> {
        let subject = self
            .subject
            .as_deref()
            .ok_or_else(|| PkiError::InvalidArgument("Certificate subject is required".to_string()))
            .and_then(parse_distinguished_name)?;
        let public_key_der = self.public_key_der.ok_or_else(|| {
            PkiError::InvalidArgument("Certificate public key is required".to_string())
        })?;
        if self.validity_days == 0 {
            return Err(PkiError::InvalidArgument(
                "Certificate validity must be at least one day".to_string(),
            ));
        }

        let serial = match self.serial {
            Some(serial) => serial,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis() as u64)
                .map_err(|e| PkiError::InvalidState(format!("System clock error: {}", e)))?,
        };

        let template = CertificateTemplate {
            subject,
            public_key_der,
            serial,
            validity_days: self.validity_days,
            certificate_authority: self.certificate_authority,
        };

        let certificate = self.provider.issue_certificate(&template, &self.scheme)?;
        self.logger.info_args(format_args!(
            "Issued certificate {} (serial {}, fingerprint {})",
            certificate.subject(),
            serial,
            certificate.fingerprint()
        ));
        Ok(certificate)
    }
}

/// Split `CN=a, O=b` into attribute/value pairs
fn parse_distinguished_name(dn: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for part in dn.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let (attribute, value) = part
            .split_once('=')
            .map(|(attribute, value)| (attribute.trim(), value.trim()))
            .filter(|(attribute, value)| !attribute.is_empty() && !value.is_empty())
            .ok_or_else(|| {
                PkiError::InvalidArgument(format!("Malformed distinguished name: {:?}", dn))
            })?;
        entries.push((attribute.to_string(), value.to_string()));
    }

    if entries.is_empty() {
        return Err(PkiError::InvalidArgument(
            "Certificate subject is empty".to_string(),
        ));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_distinguished_name() {
        let entries = parse_distinguished_name("CN=consumer-1, O=Example ,C=US").unwrap();
        assert_eq!(
            entries,
            vec![
                ("CN".to_string(), "consumer-1".to_string()),
                ("O".to_string(), "Example".to_string()),
                ("C".to_string(), "US".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_distinguished_name_rejects_garbage() {
        assert!(parse_distinguished_name("").is_err());
        assert!(parse_distinguished_name("consumer-1").is_err());
        assert!(parse_distinguished_name("CN=").is_err());
    }
}
