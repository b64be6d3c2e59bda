//! Scheme loading from configuration

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use cairn_common::{Component, Logger};

use crate::certificate::CertificateReader;
use crate::config::{
    self, Configuration, CRYPTO_SCHEMES, DEFAULT_CRYPTO_SCHEME, LEGACY_CA_CERT, LEGACY_CA_KEY,
    LEGACY_CA_KEY_PASSWORD, SCHEME_CERT, SCHEME_KEY, SCHEME_KEY_ALGORITHM, SCHEME_KEY_PASSWORD,
    SCHEME_KEY_SIZE, SCHEME_SIGNATURE_ALGORITHM,
};
use crate::error::{PkiError, Result};
use crate::private_key_reader::PrivateKeyReader;
use crate::scheme::{is_valid_scheme_name, KeyAlgorithm, Scheme, SignatureAlgorithm};

/// Name of the scheme built from the pre-scheme CA settings
pub const LEGACY_SCHEME: &str = "legacy";

const LEGACY_SIGNATURE_ALGORITHM: SignatureAlgorithm = SignatureAlgorithm::Sha256WithRsa;
const LEGACY_KEY_ALGORITHM: KeyAlgorithm = KeyAlgorithm::Rsa;
const LEGACY_RSA_KEY_SIZE: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemeSource {
    /// Listed in `pki.crypto.schemes`
    Declared,
    /// The legacy scheme, which falls back to the pre-scheme CA settings
    Legacy,
    /// Read through [`ConfigSchemeReader::read_scheme_with_keys`]
    Explicit,
}

/// Configuration keys holding each scheme setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeKeys {
    pub certificate: String,
    pub private_key: String,
    pub key_password: Option<String>,
    pub signature_algorithm: String,
    pub key_algorithm: String,
    pub key_size: Option<String>,
}

impl SchemeKeys {
    /// The `pki.crypto.scheme.<name>.*` keys of a declared scheme
    pub fn for_scheme(name: &str) -> Self {
        Self {
            certificate: config::scheme_key(name, SCHEME_CERT),
            private_key: config::scheme_key(name, SCHEME_KEY),
            key_password: Some(config::scheme_key(name, SCHEME_KEY_PASSWORD)),
            signature_algorithm: config::scheme_key(name, SCHEME_SIGNATURE_ALGORITHM),
            key_algorithm: config::scheme_key(name, SCHEME_KEY_ALGORITHM),
            key_size: Some(config::scheme_key(name, SCHEME_KEY_SIZE)),
        }
    }

    fn validate(&self) -> Result<()> {
        let settings = [
            ("certificate", Some(&self.certificate)),
            ("private key", Some(&self.private_key)),
            ("key password", self.key_password.as_ref()),
            ("signature algorithm", Some(&self.signature_algorithm)),
            ("key algorithm", Some(&self.key_algorithm)),
            ("key size", self.key_size.as_ref()),
        ];
        for (setting, key) in settings {
            if key.is_some_and(|key| key.trim().is_empty()) {
                return Err(PkiError::InvalidArgument(format!(
                    "Blank configuration key for the scheme {}",
                    setting
                )));
            }
        }
        Ok(())
    }
}

/// Supplies the schemes a [`crate::CryptoManager`] is built from
pub trait SchemeReader: Send + Sync {
    /// All configured schemes, in declaration order
    fn read_schemes(&self) -> Result<Vec<Scheme>>;

    /// The default scheme, which need not appear in [`SchemeReader::read_schemes`]
    fn read_default_scheme(&self) -> Result<Scheme>;
}

/// Reads schemes from `pki.crypto.*` configuration entries
pub struct ConfigSchemeReader {
    config: Arc<dyn Configuration>,
    certificate_reader: Arc<dyn CertificateReader>,
    key_reader: Arc<PrivateKeyReader>,
    logger: Arc<Logger>,
}

impl ConfigSchemeReader {
    pub fn new(
        config: Arc<dyn Configuration>,
        certificate_reader: Arc<dyn CertificateReader>,
        key_reader: Arc<PrivateKeyReader>,
        logger: Arc<Logger>,
    ) -> Self {
        let logger = Arc::new(logger.with_component(Component::Config));
        Self {
            config,
            certificate_reader,
            key_reader,
            logger,
        }
    }

    /// Read a scheme from an explicit set of configuration keys.
    ///
    /// Fails with [`PkiError::InvalidArgument`] when `name` is not a valid
    /// scheme name or a configuration key is blank. Unlike declared schemes,
    /// the private key, signature algorithm and key algorithm settings must
    /// all be present; a missing value is a [`PkiError::ConfigurationError`].
    pub fn read_scheme_with_keys(&self, name: &str, keys: &SchemeKeys) -> Result<Scheme> {
        if !is_valid_scheme_name(name) {
            return Err(PkiError::InvalidArgument(format!(
                "Invalid scheme name: {:?}",
                name
            )));
        }
        keys.validate()?;
        self.load_scheme(name, keys, SchemeSource::Explicit)
    }

    fn read_scheme(&self, name: &str) -> Result<Scheme> {
        let source = if name.eq_ignore_ascii_case(LEGACY_SCHEME) {
            SchemeSource::Legacy
        } else {
            SchemeSource::Declared
        };
        self.load_scheme(name, &SchemeKeys::for_scheme(name), source)
    }

    /// Setting value, falling back to a legacy CA key when one is given
    fn lookup(&self, key: &str, legacy_key: Option<&str>) -> Option<String> {
        self.config
            .get_non_blank(key)
            .or_else(|| legacy_key.and_then(|key| self.config.get_non_blank(key)))
    }

    fn load_scheme(&self, name: &str, keys: &SchemeKeys, source: SchemeSource) -> Result<Scheme> {
        let legacy = source == SchemeSource::Legacy;
        let strict = source == SchemeSource::Explicit;
        let fallback = |key: &'static str| if legacy { Some(key) } else { None };
        let missing = |key: &str, what: &str| {
            PkiError::ConfigurationError(format!(
                "Unable to read scheme {}: no {} configured ({})",
                name, what, key
            ))
        };

        self.logger
            .debug_args(format_args!("Reading crypto scheme {}", name));

        let cert_path = self
            .lookup(&keys.certificate, fallback(LEGACY_CA_CERT))
            .ok_or_else(|| missing(&keys.certificate, "certificate"))?;

        let certificate = self
            .certificate_reader
            .read(Path::new(&cert_path))
            .map_err(|e| {
                PkiError::ConfigurationError(format!(
                    "Unable to read certificate for scheme {}: {}",
                    name, e
                ))
            })?;

        let private_key = match self.lookup(&keys.private_key, fallback(LEGACY_CA_KEY)) {
            Some(key_path) => {
                let password = keys
                    .key_password
                    .as_deref()
                    .and_then(|key| self.lookup(key, fallback(LEGACY_CA_KEY_PASSWORD)));
                let key = self
                    .key_reader
                    .read_file(&key_path, password.as_deref())
                    .map_err(|e| {
                        PkiError::ConfigurationError(format!(
                            "Unable to read private key for scheme {}: {}",
                            name, e
                        ))
                    })?;
                Some(key)
            }
            None if strict => return Err(missing(&keys.private_key, "private key")),
            None => None,
        };

        let signature_algorithm = match self.lookup(&keys.signature_algorithm, None) {
            Some(value) => value.parse::<SignatureAlgorithm>().map_err(|e| {
                PkiError::ConfigurationError(format!("Unable to read scheme {}: {}", name, e))
            })?,
            None if legacy => LEGACY_SIGNATURE_ALGORITHM,
            None => return Err(missing(&keys.signature_algorithm, "signature algorithm")),
        };

        let key_algorithm = match self.lookup(&keys.key_algorithm, None) {
            Some(value) => value.parse::<KeyAlgorithm>().map_err(|e| {
                PkiError::ConfigurationError(format!("Unable to read scheme {}: {}", name, e))
            })?,
            None if legacy => LEGACY_KEY_ALGORITHM,
            None if strict => return Err(missing(&keys.key_algorithm, "key algorithm")),
            None => signature_algorithm.key_algorithm(),
        };

        let key_size = match keys.key_size.as_deref().and_then(|key| self.lookup(key, None)) {
            Some(value) => Some(value.parse::<u32>().map_err(|_| {
                PkiError::ConfigurationError(format!(
                    "Unable to read scheme {}: invalid key size {:?}",
                    name, value
                ))
            })?),
            None if legacy && key_algorithm == KeyAlgorithm::Rsa => Some(LEGACY_RSA_KEY_SIZE),
            None => None,
        };

        Scheme::builder()
            .name(name)
            .certificate(certificate)
            .private_key(private_key)
            .signature_algorithm(signature_algorithm)
            .key_algorithm(key_algorithm)
            .key_size(key_size)
            .build()
            .map_err(|e| {
                PkiError::ConfigurationError(format!("Unable to read scheme {}: {}", name, e))
            })
    }
}

impl SchemeReader for ConfigSchemeReader {
    fn read_schemes(&self) -> Result<Vec<Scheme>> {
        let declaration = self.config.get_non_blank(CRYPTO_SCHEMES).ok_or_else(|| {
            PkiError::ConfigurationError(format!(
                "No crypto schemes defined; set {}",
                CRYPTO_SCHEMES
            ))
        })?;

        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for name in declaration.split(',').map(str::trim) {
            if !is_valid_scheme_name(name) {
                return Err(PkiError::ConfigurationError(format!(
                    "Malformed crypto schemes declaration: {:?}",
                    declaration
                )));
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(PkiError::ConfigurationError(format!(
                    "Malformed crypto schemes declaration: scheme {} is declared more than once",
                    name
                )));
            }
            names.push(name);
        }

        let schemes = names
            .into_iter()
            .map(|name| self.read_scheme(name))
            .collect::<Result<Vec<_>>>()?;

        self.logger
            .debug_args(format_args!("Read {} crypto schemes", schemes.len()));
        Ok(schemes)
    }

    fn read_default_scheme(&self) -> Result<Scheme> {
        match self.config.get_non_blank(DEFAULT_CRYPTO_SCHEME) {
            Some(name) => {
                if !is_valid_scheme_name(&name) {
                    return Err(PkiError::ConfigurationError(format!(
                        "Malformed default crypto scheme declaration: {:?}",
                        name
                    )));
                }
                self.read_scheme(&name)
            }
            None => {
                self.logger.debug(format!(
                    "{} is not set; using the {} scheme",
                    DEFAULT_CRYPTO_SCHEME, LEGACY_SCHEME
                ));
                self.read_scheme(LEGACY_SCHEME)
            }
        }
    }
}
