//! OpenSSL implementation of [`SecurityProvider`]

use std::io;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkcs5;
use openssl::pkey::{Id, PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::{Signer as OpenSslSigner, Verifier};
use openssl::symm::{self, Cipher};
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Builder, X509NameBuilder, X509};

use crate::certificate::Certificate;
use crate::error::{KeyError, PkiError, Result};
use crate::provider::{
    CertificateTemplate, KeyInfo, PemCipher, PrivateKey, RsaPrivateComponents, SecurityProvider,
};
use crate::scheme::{KeyAlgorithm, Scheme, SignatureAlgorithm};

/// Security provider backed by the `openssl` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSslProvider;

impl OpenSslProvider {
    pub fn new() -> Self {
        Self
    }

    fn digest(algorithm: SignatureAlgorithm) -> MessageDigest {
        match algorithm {
            SignatureAlgorithm::Sha256WithRsa | SignatureAlgorithm::Sha256WithEcdsa => {
                MessageDigest::sha256()
            }
            SignatureAlgorithm::Sha384WithRsa | SignatureAlgorithm::Sha384WithEcdsa => {
                MessageDigest::sha384()
            }
            SignatureAlgorithm::Sha512WithRsa | SignatureAlgorithm::Sha512WithEcdsa => {
                MessageDigest::sha512()
            }
        }
    }

    fn cipher(cipher: PemCipher) -> Cipher {
        match cipher {
            PemCipher::Aes128Cbc => Cipher::aes_128_cbc(),
            PemCipher::Aes192Cbc => Cipher::aes_192_cbc(),
            PemCipher::Aes256Cbc => Cipher::aes_256_cbc(),
            PemCipher::DesEde3Cbc => Cipher::des_ede3_cbc(),
            PemCipher::DesCbc => Cipher::des_cbc(),
        }
    }

    fn key_algorithm_of(id: Id) -> Option<KeyAlgorithm> {
        match id {
            Id::RSA => Some(KeyAlgorithm::Rsa),
            Id::EC => Some(KeyAlgorithm::Ec),
            _ => None,
        }
    }

    fn load_private_key(key: &PrivateKey) -> Result<PKey<Private>> {
        PKey::private_key_from_pkcs8(key.pkcs8_der()).map_err(|e| {
            PkiError::CryptoError(format!("Failed to load private key: {}", e))
        })
    }

    fn load_certificate(certificate: &Certificate) -> Result<X509> {
        X509::from_der(certificate.der_bytes()).map_err(|e| {
            PkiError::CertificateError(format!(
                "Failed to load certificate {}: {}",
                certificate.subject(),
                e
            ))
        })
    }

    fn certificate_public_key(certificate: &Certificate) -> Result<PKey<Public>> {
        Self::load_certificate(certificate)?
            .public_key()
            .map_err(|e| {
                PkiError::CertificateError(format!(
                    "Failed to extract public key from {}: {}",
                    certificate.subject(),
                    e
                ))
            })
    }

    /// Reject keys whose type does not match what the signature algorithm needs
    fn check_key_type(id: Id, algorithm: SignatureAlgorithm) -> Result<()> {
        match Self::key_algorithm_of(id) {
            Some(found) if found == algorithm.key_algorithm() => Ok(()),
            Some(found) => Err(PkiError::CryptoError(format!(
                "{} cannot be used with a {} key",
                algorithm, found
            ))),
            None => Err(PkiError::CryptoError(format!(
                "{} cannot be used with key type {:?}",
                algorithm, id
            ))),
        }
    }

    fn wrap_private_key(pkey: PKey<Private>) -> std::result::Result<PrivateKey, KeyError> {
        let algorithm = Self::key_algorithm_of(pkey.id()).ok_or_else(|| {
            KeyError::UnsupportedFormat(format!("Unsupported key type {:?}", pkey.id()))
        })?;
        let der = pkey
            .private_key_to_pkcs8()
            .map_err(|e| KeyError::Malformed(format!("Failed to encode private key: {}", e)))?;
        Ok(PrivateKey::new(algorithm, der))
    }

    fn rsa_from_components(
        components: &RsaPrivateComponents,
    ) -> std::result::Result<PKey<Private>, KeyError> {
        let bn = |bytes: &[u8]| {
            BigNum::from_slice(bytes)
                .map_err(|e| KeyError::Malformed(format!("Invalid RSA integer: {}", e)))
        };

        let rsa = Rsa::from_private_components(
            bn(&components.modulus)?,
            bn(&components.public_exponent)?,
            bn(&components.private_exponent)?,
            bn(&components.prime1)?,
            bn(&components.prime2)?,
            bn(&components.exponent1)?,
            bn(&components.exponent2)?,
            bn(&components.coefficient)?,
        )
        .map_err(|e| KeyError::Malformed(format!("Invalid RSA private key: {}", e)))?;

        match rsa.check_key() {
            Ok(true) => {}
            Ok(false) => {
                return Err(KeyError::Malformed(
                    "RSA private key components are inconsistent".to_string(),
                ))
            }
            Err(e) => {
                return Err(KeyError::Malformed(format!(
                    "RSA private key check failed: {}",
                    e
                )))
            }
        }

        PKey::from_rsa(rsa).map_err(|e| KeyError::Malformed(format!("Invalid RSA key: {}", e)))
    }
}

impl SecurityProvider for OpenSslProvider {
    fn name(&self) -> &str {
        "openssl"
    }

    fn sign(
        &self,
        algorithm: SignatureAlgorithm,
        key: &PrivateKey,
        source: &mut dyn io::Read,
    ) -> Result<Vec<u8>> {
        let pkey = Self::load_private_key(key)?;
        Self::check_key_type(pkey.id(), algorithm)?;

        let mut signer = OpenSslSigner::new(Self::digest(algorithm), &pkey)?;
        io::copy(source, &mut signer)?;
        let signature = signer.sign_to_vec()?;
        Ok(signature)
    }

    fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        certificate: &Certificate,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool> {
        let pkey = Self::certificate_public_key(certificate)?;
        Self::check_key_type(pkey.id(), algorithm)?;

        let mut verifier = Verifier::new(Self::digest(algorithm), &pkey)?;
        verifier.update(data)?;
        // A signature that does not decode for this key type is a non-match
        Ok(verifier.verify(signature).unwrap_or(false))
    }

    fn verify_issued(&self, subject: &Certificate, issuer: &Certificate) -> Result<bool> {
        let subject_x509 = Self::load_certificate(subject)?;
        let issuer_key = Self::certificate_public_key(issuer)?;
        let verified = subject_x509.verify(&issuer_key)?;
        Ok(verified)
    }

    fn decrypt(
        &self,
        cipher: PemCipher,
        password: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> std::result::Result<Vec<u8>, KeyError> {
        if iv.len() != cipher.iv_len() {
            return Err(KeyError::MalformedIv(format!(
                "{} requires a {}-byte IV, got {} bytes",
                cipher.as_str(),
                cipher.iv_len(),
                iv.len()
            )));
        }

        let openssl_cipher = Self::cipher(cipher);
        // Legacy PEM key derivation: one round of MD5 salted with the first 8 IV bytes
        let derived = pkcs5::bytes_to_key(
            openssl_cipher,
            MessageDigest::md5(),
            password,
            Some(&iv[..8]),
            1,
        )
        .map_err(|e| KeyError::DecryptionFailed(format!("Key derivation failed: {}", e)))?;

        symm::decrypt(openssl_cipher, &derived.key, Some(iv), data)
            .map_err(|e| KeyError::DecryptionFailed(format!("{}: {}", cipher.as_str(), e)))
    }

    fn parse_key(&self, info: KeyInfo<'_>) -> std::result::Result<PrivateKey, KeyError> {
        let pkey = match info {
            KeyInfo::Pkcs8(der) => PKey::private_key_from_pkcs8(der)
                .map_err(|e| KeyError::Malformed(format!("Invalid PKCS#8 key: {}", e)))?,
            KeyInfo::EncryptedPkcs8 { der, password } => {
                PKey::private_key_from_pkcs8_passphrase(der, password)
                    .map_err(|e| KeyError::DecryptionFailed(e.to_string()))?
            }
            KeyInfo::Rsa(components) => Self::rsa_from_components(components)?,
        };
        Self::wrap_private_key(pkey)
    }

    fn check_certificate(&self, certificate: &Certificate) -> Result<()> {
        Self::certificate_public_key(certificate).map(|_| ())
    }

    fn issue_certificate(
        &self,
        template: &CertificateTemplate,
        issuer: &Scheme,
    ) -> Result<Certificate> {
        let issuer_key = issuer.private_key().ok_or_else(|| {
            PkiError::InvalidArgument(format!(
                "Scheme {} has no private key and cannot issue certificates",
                issuer.name()
            ))
        })?;
        let issuer_pkey = Self::load_private_key(issuer_key)?;
        Self::check_key_type(issuer_pkey.id(), issuer.signature_algorithm())?;
        let issuer_x509 = Self::load_certificate(issuer.certificate())?;

        let subject_public_key = PKey::public_key_from_der(&template.public_key_der)
            .map_err(|e| PkiError::InvalidArgument(format!("Invalid subject public key: {}", e)))?;

        let mut name_builder = X509NameBuilder::new()?;
        for (attribute, value) in &template.subject {
            name_builder.append_entry_by_text(attribute, value).map_err(|e| {
                PkiError::InvalidArgument(format!(
                    "Invalid subject attribute {}={}: {}",
                    attribute, value, e
                ))
            })?;
        }
        let subject_name = name_builder.build();

        let mut cert_builder = X509Builder::new()?;
        cert_builder.set_version(2)?;

        let serial = BigNum::from_slice(&template.serial.to_be_bytes())?.to_asn1_integer()?;
        cert_builder.set_serial_number(&serial)?;
        cert_builder.set_subject_name(&subject_name)?;
        cert_builder.set_issuer_name(issuer_x509.subject_name())?;
        cert_builder.set_pubkey(&subject_public_key)?;

        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(template.validity_days)?;
        cert_builder.set_not_before(&not_before)?;
        cert_builder.set_not_after(&not_after)?;

        if template.certificate_authority {
            cert_builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
            cert_builder.append_extension(
                KeyUsage::new()
                    .critical()
                    .digital_signature()
                    .key_cert_sign()
                    .crl_sign()
                    .build()?,
            )?;
        } else {
            cert_builder.append_extension(BasicConstraints::new().critical().build()?)?;
            cert_builder.append_extension(
                KeyUsage::new()
                    .critical()
                    .digital_signature()
                    .key_encipherment()
                    .build()?,
            )?;
        }

        cert_builder
            .sign(&issuer_pkey, Self::digest(issuer.signature_algorithm()))
            .map_err(|e| PkiError::CryptoError(format!("Failed to sign certificate: {}", e)))?;

        let cert_der = cert_builder.build().to_der().map_err(|e| {
            PkiError::CertificateError(format!("Failed to convert certificate to DER: {}", e))
        })?;

        Certificate::from_der(cert_der)
    }
}
