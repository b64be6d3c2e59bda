//! Crypto manager: scheme registry, trust verification and the entry point
//! for signers, validators and certificate builders.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::iter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_common::{Component, Logger};

use crate::certificate::{Certificate, CertificateReader};
use crate::certificate_builder::CertificateBuilder;
use crate::config::{resolve_upstream_repository, Configuration};
use crate::error::{PkiError, Result};
use crate::provider::SecurityProvider;
use crate::scheme::Scheme;
use crate::scheme_reader::SchemeReader;
use crate::signature_validator::SignatureValidator;
use crate::signer::Signer;

const SELF_CHECK_PROBE: &[u8] = b"cairn-pki scheme self-check";

/// Owns the configured schemes and the upstream certificate repository path.
///
/// Built once at startup and immutable afterwards; share it behind an `Arc`.
/// The upstream repository is re-read on every query.
pub struct CryptoManager {
    provider: Arc<dyn SecurityProvider>,
    schemes: Vec<Scheme>,
    default_scheme: Scheme,
    certificate_reader: Arc<dyn CertificateReader>,
    upstream_repository: PathBuf,
    logger: Arc<Logger>,
    trust_logger: Logger,
}

impl CryptoManager {
    /// Build the manager from configuration.
    ///
    /// Fails with [`PkiError::ConfigurationError`] when the upstream
    /// repository is not configured, when schemes cannot be read, or when
    /// any scheme fails its self-check.
    pub fn new(
        provider: Arc<dyn SecurityProvider>,
        scheme_reader: &dyn SchemeReader,
        certificate_reader: Arc<dyn CertificateReader>,
        config: &dyn Configuration,
        logger: Arc<Logger>,
    ) -> Result<Self> {
        let upstream_repository = resolve_upstream_repository(config)?;
        let schemes = scheme_reader.read_schemes()?;
        let default_scheme = scheme_reader.read_default_scheme()?;

        Self::from_parts(
            provider,
            schemes,
            default_scheme,
            certificate_reader,
            upstream_repository,
            logger,
        )
    }

    /// Build the manager from already loaded schemes
    pub fn from_parts(
        provider: Arc<dyn SecurityProvider>,
        schemes: Vec<Scheme>,
        default_scheme: Scheme,
        certificate_reader: Arc<dyn CertificateReader>,
        upstream_repository: impl Into<PathBuf>,
        logger: Arc<Logger>,
    ) -> Result<Self> {
        let upstream_repository = upstream_repository.into();
        if upstream_repository.as_os_str().is_empty() {
            return Err(PkiError::ConfigurationError(
                "Upstream certificate repository path is empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for scheme in &schemes {
            if !names.insert(scheme.name().to_ascii_lowercase()) {
                return Err(PkiError::ConfigurationError(format!(
                    "Scheme {} is configured more than once",
                    scheme.name()
                )));
            }
        }

        let trust_logger = logger.with_component(Component::Trust);
        let manager = Self {
            provider,
            schemes,
            default_scheme,
            certificate_reader,
            upstream_repository,
            logger,
            trust_logger,
        };

        for scheme in manager
            .schemes
            .iter()
            .chain(iter::once(&manager.default_scheme))
        {
            manager.self_check(scheme)?;
        }

        manager.logger.info(format!(
            "Crypto manager initialized with {} schemes (default: {}, provider: {}, upstream: {})",
            manager.schemes.len(),
            manager.default_scheme.name(),
            manager.provider.name(),
            manager.upstream_repository.display()
        ));

        Ok(manager)
    }

    /// Confirm the certificate loads and, when a key is present, that the key
    /// signs data the certificate verifies.
    fn self_check(&self, scheme: &Scheme) -> Result<()> {
        let fail = |reason: String| {
            PkiError::ConfigurationError(format!(
                "Scheme {} failed its self-check: {}",
                scheme.name(),
                reason
            ))
        };

        self.provider
            .check_certificate(scheme.certificate())
            .map_err(|e| fail(e.to_string()))?;

        if scheme.has_private_key() {
            let signature = self
                .signer(scheme)
                .and_then(|signer| signer.sign(SELF_CHECK_PROBE))
                .map_err(|e| fail(e.to_string()))?;

            let verified = self
                .provider
                .verify(
                    scheme.signature_algorithm(),
                    scheme.certificate(),
                    &signature,
                    SELF_CHECK_PROBE,
                )
                .map_err(|e| fail(e.to_string()))?;

            if !verified {
                return Err(fail(
                    "private key does not match the scheme certificate".to_string(),
                ));
            }
        }

        self.logger
            .with_scheme(scheme.name())
            .debug("Scheme self-check passed");
        Ok(())
    }

    /// All configured schemes, in configuration order
    pub fn crypto_schemes(&self) -> &[Scheme] {
        &self.schemes
    }

    /// Look up a configured scheme by name, ignoring case
    pub fn crypto_scheme(&self, name: &str) -> Option<&Scheme> {
        self.schemes.iter().find(|scheme| scheme.is_named(name))
    }

    pub fn default_crypto_scheme(&self) -> &Scheme {
        &self.default_scheme
    }

    pub fn upstream_repository(&self) -> &Path {
        &self.upstream_repository
    }

    pub fn provider(&self) -> &Arc<dyn SecurityProvider> {
        &self.provider
    }

    /// Read every certificate in the upstream repository.
    ///
    /// A missing directory yields an empty set. A path that is not a
    /// directory, or any file that does not hold exactly one certificate,
    /// fails the whole call.
    pub fn upstream_certificates(&self) -> Result<HashSet<Certificate>> {
        let path = &self.upstream_repository;
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.trust_logger.debug(format!(
                    "Upstream certificate repository {} does not exist",
                    path.display()
                ));
                return Ok(HashSet::new());
            }
            Err(e) => {
                return Err(PkiError::CertificateError(format!(
                    "Unable to access upstream certificate repository {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if !metadata.is_dir() {
            return Err(PkiError::CertificateError(format!(
                "Upstream certificate repository {} is not a directory",
                path.display()
            )));
        }

        let entries = fs::read_dir(path).map_err(|e| {
            PkiError::CertificateError(format!(
                "Unable to list upstream certificate repository {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut certificates = HashSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                PkiError::CertificateError(format!(
                    "Unable to list upstream certificate repository {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let file = entry.path();
            if !file.is_file() {
                continue;
            }

            let certificate = self.certificate_reader.read(&file).map_err(|e| match e {
                PkiError::CertificateError(_) => e,
                other => PkiError::CertificateError(format!(
                    "Unable to read upstream certificate {}: {}",
                    file.display(),
                    other
                )),
            })?;
            certificates.insert(certificate);
        }

        self.trust_logger.debug(format!(
            "Read {} upstream certificates from {}",
            certificates.len(),
            path.display()
        ));
        Ok(certificates)
    }

    /// True when `certificate` is one of the trusted certificates or was
    /// signed by one of them.
    ///
    /// Candidates are the scheme certificates, the default scheme certificate
    /// and the upstream certificates. A candidate that cannot be used is
    /// logged and skipped.
    pub fn is_trusted_certificate(&self, certificate: &Certificate) -> Result<bool> {
        let upstream = self.upstream_certificates()?;

        let mut seen = HashSet::new();
        let candidates = self
            .schemes
            .iter()
            .chain(iter::once(&self.default_scheme))
            .map(Scheme::certificate)
            .chain(upstream.iter())
            .filter(|candidate| seen.insert(*candidate));

        for candidate in candidates {
            if candidate == certificate {
                self.trust_logger.debug(format!(
                    "Certificate {} is a trusted certificate",
                    certificate.subject()
                ));
                return Ok(true);
            }

            match self.provider.verify_issued(certificate, candidate) {
                Ok(true) => {
                    self.trust_logger.debug(format!(
                        "Certificate {} was issued by trusted certificate {}",
                        certificate.subject(),
                        candidate.subject()
                    ));
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) => {
                    self.trust_logger.warn(format!(
                        "Skipping trust candidate {} ({}): {}",
                        candidate.subject(),
                        candidate.fingerprint(),
                        e
                    ));
                }
            }
        }

        if certificate.is_self_issued() {
            self.trust_logger.debug(format!(
                "Self-issued certificate {} ({}) is not a trusted certificate",
                certificate.subject(),
                certificate.fingerprint()
            ));
        } else {
            self.trust_logger.debug(format!(
                "Certificate {} was not issued by any trusted certificate (issuer {})",
                certificate.subject(),
                certificate.issuer()
            ));
        }
        Ok(false)
    }

    /// A signer for `scheme`; the scheme must carry a private key
    pub fn signer(&self, scheme: &Scheme) -> Result<Signer> {
        Signer::new(
            scheme.clone(),
            Arc::clone(&self.provider),
            Arc::clone(&self.logger),
        )
    }

    /// A validator bound to the certificate of `scheme`
    pub fn signature_validator(&self, scheme: &Scheme) -> SignatureValidator {
        SignatureValidator::new(
            scheme.clone(),
            Arc::clone(&self.provider),
            Arc::clone(&self.logger),
        )
    }

    /// A certificate builder issuing under `scheme`; the scheme must carry a private key
    pub fn certificate_builder(&self, scheme: &Scheme) -> Result<CertificateBuilder> {
        CertificateBuilder::new(
            scheme.clone(),
            Arc::clone(&self.provider),
            Arc::clone(&self.logger),
        )
    }
}
