//! Shared fixtures: key pairs, certificates and schemes generated with OpenSSL
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use cairn_common::logging::{Component, Logger};
use cairn_pki::{
    Certificate, CryptoManager, KeyInfo, OpenSslProvider, PemCertificateReader, PrivateKey,
    PrivateKeyReader, Scheme, SchemeReader, SecurityProvider, SignatureAlgorithm,
};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509Builder, X509NameBuilder, X509};

pub fn create_test_logger() -> Arc<Logger> {
    Arc::new(Logger::new_root(Component::Pki))
}

pub fn provider() -> Arc<dyn SecurityProvider> {
    Arc::new(OpenSslProvider::new())
}

pub fn key_reader() -> PrivateKeyReader {
    PrivateKeyReader::new(provider(), create_test_logger())
}

pub fn generate_rsa(bits: u32) -> Result<PKey<Private>> {
    Ok(PKey::from_rsa(Rsa::generate(bits)?)?)
}

pub fn generate_ec() -> Result<PKey<Private>> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    Ok(PKey::from_ec_key(EcKey::generate(&group)?)?)
}

pub fn generate_key(algorithm: SignatureAlgorithm) -> Result<PKey<Private>> {
    match algorithm {
        SignatureAlgorithm::Sha256WithRsa
        | SignatureAlgorithm::Sha384WithRsa
        | SignatureAlgorithm::Sha512WithRsa => generate_rsa(2048),
        _ => generate_ec(),
    }
}

/// Build a CA certificate for `subject_key`, self-signed when `issuer` is `None`
pub fn make_certificate(
    common_name: &str,
    subject_key: &PKey<Private>,
    issuer: Option<(&PKey<Private>, &X509)>,
    serial: u32,
) -> Result<X509> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Cairn Test")?;
    let name = name.build();

    let serial = BigNum::from_u32(serial)?.to_asn1_integer()?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(30)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_pubkey(subject_key)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;

    match issuer {
        Some((issuer_key, issuer_cert)) => {
            builder.set_issuer_name(issuer_cert.subject_name())?;
            builder.sign(issuer_key, MessageDigest::sha256())?;
        }
        None => {
            builder.set_issuer_name(&name)?;
            builder.sign(subject_key, MessageDigest::sha256())?;
        }
    }

    Ok(builder.build())
}

pub fn to_certificate(x509: &X509) -> Result<Certificate> {
    Ok(Certificate::from_der(x509.to_der()?)?)
}

pub fn self_signed(common_name: &str, key: &PKey<Private>) -> Result<(X509, Certificate)> {
    let x509 = make_certificate(common_name, key, None, 1)?;
    let certificate = to_certificate(&x509)?;
    Ok((x509, certificate))
}

pub fn private_key(key: &PKey<Private>) -> Result<PrivateKey> {
    let der = key.private_key_to_pkcs8()?;
    Ok(provider().parse_key(KeyInfo::Pkcs8(&der))?)
}

/// A generated scheme together with its raw key material
pub struct TestScheme {
    pub scheme: Scheme,
    pub key: PKey<Private>,
    pub x509: X509,
}

impl TestScheme {
    pub fn generate(name: &str, algorithm: SignatureAlgorithm) -> Result<Self> {
        let key = generate_key(algorithm)?;
        let (x509, certificate) = self_signed(&format!("{} CA", name), &key)?;
        let key_size = match algorithm.key_algorithm() {
            cairn_pki::KeyAlgorithm::Rsa => Some(2048),
            cairn_pki::KeyAlgorithm::Ec => Some(256),
        };

        let scheme = Scheme::builder()
            .name(name)
            .certificate(certificate)
            .private_key(Some(private_key(&key)?))
            .signature_algorithm(algorithm)
            .key_size(key_size)
            .build()?;

        Ok(Self { scheme, key, x509 })
    }

    pub fn rsa(name: &str) -> Result<Self> {
        Self::generate(name, SignatureAlgorithm::Sha256WithRsa)
    }

    pub fn ec(name: &str) -> Result<Self> {
        Self::generate(name, SignatureAlgorithm::Sha256WithEcdsa)
    }

    pub fn certificate(&self) -> &Certificate {
        self.scheme.certificate()
    }

    /// Issue a fresh certificate signed by this scheme's key
    pub fn issue(&self, common_name: &str) -> Result<Certificate> {
        let leaf_key = generate_ec()?;
        let x509 = make_certificate(common_name, &leaf_key, Some((&self.key, &self.x509)), 2)?;
        to_certificate(&x509)
    }
}

/// Scheme reader over fixed values
pub struct StaticSchemeReader {
    pub schemes: Vec<Scheme>,
    pub default_scheme: Scheme,
}

impl SchemeReader for StaticSchemeReader {
    fn read_schemes(&self) -> cairn_pki::Result<Vec<Scheme>> {
        Ok(self.schemes.clone())
    }

    fn read_default_scheme(&self) -> cairn_pki::Result<Scheme> {
        Ok(self.default_scheme.clone())
    }
}

pub fn build_manager(
    schemes: Vec<Scheme>,
    default_scheme: Scheme,
    upstream: &Path,
) -> cairn_pki::Result<CryptoManager> {
    CryptoManager::from_parts(
        provider(),
        schemes,
        default_scheme,
        Arc::new(PemCertificateReader::new()),
        upstream.to_path_buf(),
        create_test_logger(),
    )
}

pub fn write_pem_certificate(dir: &Path, file_name: &str, x509: &X509) -> Result<PathBuf> {
    let path = dir.join(file_name);
    std::fs::write(&path, x509.to_pem()?)?;
    Ok(path)
}
