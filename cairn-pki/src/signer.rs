use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use cairn_common::{Component, Logger};

use crate::error::{PkiError, Result};
use crate::provider::{PrivateKey, SecurityProvider};
use crate::scheme::Scheme;

/// Produces signatures with a scheme's private key.
///
/// A signer holds no per-call state and may be reused for any number of
/// independent signatures.
pub struct Signer {
    scheme: Scheme,
    key: PrivateKey,
    provider: Arc<dyn SecurityProvider>,
    logger: Arc<Logger>,
}

impl Signer {
    /// Fails with [`PkiError::InvalidArgument`] when the scheme has no private key
    pub fn new(
        scheme: Scheme,
        provider: Arc<dyn SecurityProvider>,
        logger: Arc<Logger>,
    ) -> Result<Self> {
        let key = scheme.private_key().cloned().ok_or_else(|| {
            PkiError::InvalidArgument(format!(
                "Scheme {} has no private key and cannot sign",
                scheme.name()
            ))
        })?;
        let logger = Arc::new(
            logger
                .with_component(Component::Signing)
                .with_scheme(scheme.name()),
        );

        Ok(Self {
            scheme,
            key,
            provider,
            logger,
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Sign a byte buffer
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.sign_stream(data)
    }

    /// Sign everything readable from `reader`
    pub fn sign_stream<R: Read>(&self, mut reader: R) -> Result<Vec<u8>> {
        let signature =
            self.provider
                .sign(self.scheme.signature_algorithm(), &self.key, &mut reader)?;
        self.logger.debug_args(format_args!(
            "Produced {}-byte {} signature",
            signature.len(),
            self.scheme.signature_algorithm()
        ));
        Ok(signature)
    }

    /// Sign the contents of a file
    pub fn sign_file(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(PkiError::InvalidArgument("File path is empty".to_string()));
        }

        let file = File::open(path)?;
        self.sign_stream(BufReader::new(file))
    }
}
