//! Signature validation against one or more candidate certificates

use std::fs;
use std::iter;
use std::path::Path;
use std::sync::Arc;

use cairn_common::{Component, Logger};

use crate::certificate::Certificate;
use crate::error::{PkiError, Result};
use crate::provider::SecurityProvider;
use crate::scheme::Scheme;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ValidatorState {
    Unarmed,
    Armed { signature: Vec<u8> },
}

/// Validates a signature using the scheme certificate and any additional
/// candidate certificates.
///
/// A new validator is unarmed; [`SignatureValidator::for_signature`] arms it.
/// Validating while unarmed is an [`PkiError::InvalidState`] error. A
/// validator is meant for one logical operation and is not shared between
/// threads.
pub struct SignatureValidator {
    scheme: Scheme,
    additional_certificates: Vec<Certificate>,
    state: ValidatorState,
    provider: Arc<dyn SecurityProvider>,
    logger: Arc<Logger>,
}

impl SignatureValidator {
    pub fn new(scheme: Scheme, provider: Arc<dyn SecurityProvider>, logger: Arc<Logger>) -> Self {
        let logger = Arc::new(
            logger
                .with_component(Component::Signing)
                .with_scheme(scheme.name()),
        );

        Self {
            scheme: scheme.without_private_key(),
            additional_certificates: Vec::new(),
            state: ValidatorState::Unarmed,
            provider,
            logger,
        }
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, ValidatorState::Armed { .. })
    }

    pub fn additional_certificates(&self) -> &[Certificate] {
        &self.additional_certificates
    }

    /// Attach the signature to validate, replacing any previous one
    pub fn for_signature(&mut self, signature: impl Into<Vec<u8>>) -> Result<&mut Self> {
        let signature = signature.into();
        if signature.is_empty() {
            return Err(PkiError::InvalidArgument(
                "Signature must not be empty".to_string(),
            ));
        }

        self.state = ValidatorState::Armed { signature };
        Ok(self)
    }

    /// Add candidate certificates, tried after the scheme certificate in the
    /// order given. `None` entries are skipped.
    pub fn with_additional_certificates<I, C>(&mut self, certificates: I) -> &mut Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Option<Certificate>>,
    {
        self.additional_certificates
            .extend(certificates.into_iter().filter_map(|c| c.into()));
        self
    }

    /// Validate the armed signature over `data`.
    ///
    /// Returns `Ok(false)` when no candidate certificate verifies the
    /// signature, or when `data` is `None`.
    pub fn validate<'a>(&self, data: impl Into<Option<&'a [u8]>>) -> Result<bool> {
        let signature = self.signature()?;
        let Some(data) = data.into() else {
            return Ok(false);
        };

        let algorithm = self.scheme.signature_algorithm();
        let candidates =
            iter::once(self.scheme.certificate()).chain(self.additional_certificates.iter());

        for candidate in candidates {
            match self.provider.verify(algorithm, candidate, signature, data) {
                Ok(true) => {
                    self.logger.debug_args(format_args!(
                        "Signature verified by {}",
                        candidate.subject()
                    ));
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) => {
                    self.logger.warn_args(format_args!(
                        "Skipping candidate certificate {} ({}): {}",
                        candidate.subject(),
                        candidate.fingerprint(),
                        e
                    ));
                }
            }
        }

        self.logger
            .debug("No candidate certificate verified the signature");
        Ok(false)
    }

    /// Validate the armed signature over the contents of a file
    pub fn validate_file(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(PkiError::InvalidArgument("File path is empty".to_string()));
        }
        self.signature()?;

        let data = fs::read(path)?;
        self.validate(data.as_slice())
    }

    fn signature(&self) -> Result<&[u8]> {
        match &self.state {
            ValidatorState::Armed { signature } => Ok(signature.as_slice()),
            ValidatorState::Unarmed => Err(PkiError::InvalidState(
                "No signature has been provided; call for_signature first".to_string(),
            )),
        }
    }
}
