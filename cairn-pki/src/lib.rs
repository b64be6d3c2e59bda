//! Cairn PKI – multi-scheme trust and signing

pub mod certificate;
pub mod certificate_builder;
pub mod config;
pub mod error;
pub mod manager;
pub mod openssl_provider;
pub mod private_key_reader;
pub mod provider;
pub mod scheme;
pub mod scheme_reader;
pub mod signature_validator;
pub mod signer;

pub use error::{KeyError, PkiError, Result};

pub use certificate::{Certificate, CertificateReader, PemCertificateReader};
pub use certificate_builder::CertificateBuilder;
pub use config::{resolve_upstream_repository, Configuration, MapConfiguration};
pub use manager::CryptoManager;
pub use openssl_provider::OpenSslProvider;
pub use private_key_reader::{KeyEncoding, PemBlock, PemHeaders, PrivateKeyReader};
pub use provider::{
    CertificateTemplate, KeyInfo, PemCipher, PrivateKey, RsaPrivateComponents, SecurityProvider,
};
pub use scheme::{KeyAlgorithm, Scheme, SchemeBuilder, SignatureAlgorithm};
pub use scheme_reader::{ConfigSchemeReader, SchemeKeys, SchemeReader, LEGACY_SCHEME};
pub use signature_validator::SignatureValidator;
pub use signer::Signer;
