//! Private key decoding
//!
//! Reads PEM framed private keys in three flavours:
//!
//! - `RSA PRIVATE KEY`: the RSA specific structure, optionally encrypted with
//!   a legacy `DEK-Info` header
//! - `PRIVATE KEY`: an unencrypted PKCS#8 wrapper
//! - `ENCRYPTED PRIVATE KEY`: a password protected PKCS#8 wrapper
//!
//! Decryption and conversion to a usable key are delegated to the
//! [`SecurityProvider`].

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use cairn_common::{Component, Logger};
use der::asn1::{AnyRef, UintRef};
use der::{Decode, Header, Reader, SliceReader, Tag};

use crate::error::{KeyError, PkiError, Result};
use crate::provider::{KeyInfo, PemCipher, PrivateKey, RsaPrivateComponents, SecurityProvider};

pub const PROC_TYPE_HEADER: &str = "Proc-Type";
pub const DEK_INFO_HEADER: &str = "DEK-Info";

const PEM_BEGIN: &str = "-----BEGIN ";
const PEM_END: &str = "-----END ";
const PEM_DASHES: &str = "-----";

/// Binary encoding of a private key body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// RSA specific structure (PKCS#1)
    Pkcs1,
    /// Generic `PrivateKeyInfo` wrapper (PKCS#8)
    Pkcs8,
    /// Password protected `EncryptedPrivateKeyInfo` wrapper
    EncryptedPkcs8,
}

impl KeyEncoding {
    pub fn from_label(label: &str) -> std::result::Result<Self, KeyError> {
        match label {
            "RSA PRIVATE KEY" => Ok(KeyEncoding::Pkcs1),
            "PRIVATE KEY" => Ok(KeyEncoding::Pkcs8),
            "ENCRYPTED PRIVATE KEY" => Ok(KeyEncoding::EncryptedPkcs8),
            other => Err(KeyError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Ordered RFC 1421 style PEM headers. Names are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PemHeaders {
    entries: Vec<(String, String)>,
}

impl PemHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header; a repeated name is an error
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> std::result::Result<(), KeyError> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(KeyError::Malformed(format!("Duplicate PEM header: {}", name)));
        }
        self.entries.push((name, value.into()));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A single decoded PEM block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    pub label: String,
    pub headers: PemHeaders,
    pub body: Vec<u8>,
}

impl PemBlock {
    /// Parse the first PEM block in `data`. Text before `BEGIN` and after `END` is ignored.
    pub fn parse(data: &[u8]) -> std::result::Result<Self, KeyError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| KeyError::Malformed("PEM data is not valid UTF-8".to_string()))?;
        let mut lines = text.lines();

        let label = lines
            .by_ref()
            .find_map(|line| {
                line.trim()
                    .strip_prefix(PEM_BEGIN)
                    .and_then(|rest| rest.strip_suffix(PEM_DASHES))
            })
            .ok_or_else(|| KeyError::Malformed("No PEM BEGIN marker found".to_string()))?
            .to_string();

        let mut headers = PemHeaders::new();
        let mut body = String::new();
        let mut in_headers = true;
        let mut last_header: Option<(String, String)> = None;
        let mut end_label = None;

        for raw_line in lines {
            let line = raw_line.trim();
            if let Some(rest) = line.strip_prefix(PEM_END) {
                end_label = Some(rest.strip_suffix(PEM_DASHES).unwrap_or(rest).to_string());
                break;
            }

            if in_headers {
                if line.is_empty() {
                    in_headers = false;
                    continue;
                }
                // RFC 1421 folding: leading whitespace continues the previous header
                if raw_line.starts_with([' ', '\t']) {
                    if let Some((_, value)) = last_header.as_mut() {
                        value.push(' ');
                        value.push_str(line);
                        continue;
                    }
                }
                if let Some((name, value)) = line.split_once(':') {
                    if let Some((prev_name, prev_value)) = last_header.take() {
                        headers.insert(prev_name, prev_value)?;
                    }
                    last_header = Some((name.trim().to_string(), value.trim().to_string()));
                    continue;
                }
                in_headers = false;
            }

            body.push_str(line);
        }

        if let Some((name, value)) = last_header {
            headers.insert(name, value)?;
        }

        match end_label {
            None => {
                return Err(KeyError::Malformed(format!(
                    "No PEM END marker found for {}",
                    label
                )))
            }
            Some(end) if end != label => {
                return Err(KeyError::Malformed(format!(
                    "PEM END marker {} does not match BEGIN marker {}",
                    end, label
                )))
            }
            Some(_) => {}
        }

        if body.is_empty() {
            return Err(KeyError::Malformed(format!("Empty PEM body for {}", label)));
        }

        let body = general_purpose::STANDARD.decode(body.as_bytes())?;

        Ok(Self {
            label,
            headers,
            body,
        })
    }
}

/// Decodes private keys into provider-backed [`PrivateKey`] capabilities
pub struct PrivateKeyReader {
    provider: Arc<dyn SecurityProvider>,
    logger: Arc<Logger>,
}

impl PrivateKeyReader {
    pub fn new(provider: Arc<dyn SecurityProvider>, logger: Arc<Logger>) -> Self {
        let logger = Arc::new(logger.with_component(Component::Keys));
        Self { provider, logger }
    }

    /// Decode a key body of the given encoding.
    ///
    /// `headers` are only consulted for [`KeyEncoding::Pkcs1`], where a
    /// `DEK-Info` entry marks the body as encrypted. An empty password is the
    /// same as no password.
    pub fn decode(
        &self,
        bytes: &[u8],
        encoding: KeyEncoding,
        headers: &PemHeaders,
        password: Option<&str>,
    ) -> std::result::Result<PrivateKey, KeyError> {
        let password = password.filter(|p| !p.is_empty());
        self.logger
            .debug_args(format_args!("Decoding {:?} private key", encoding));

        match encoding {
            KeyEncoding::Pkcs1 => {
                let plain;
                let der_bytes = match legacy_encryption(headers)? {
                    Some(dek_info) => {
                        let password = password.ok_or(KeyError::PasswordRequired)?;
                        let (cipher, iv) = parse_dek_info(dek_info)?;
                        plain = self
                            .provider
                            .decrypt(cipher, password.as_bytes(), &iv, bytes)?;
                        plain.as_slice()
                    }
                    None => bytes,
                };

                let components = decode_rsa_private_key(der_bytes)?;
                self.provider.parse_key(KeyInfo::Rsa(&components))
            }
            KeyEncoding::Pkcs8 => {
                expect_sequence(bytes, "PrivateKeyInfo")?;
                self.provider.parse_key(KeyInfo::Pkcs8(bytes))
            }
            KeyEncoding::EncryptedPkcs8 => {
                let password = password.ok_or(KeyError::PasswordRequired)?;
                expect_sequence(bytes, "EncryptedPrivateKeyInfo")?;
                self.provider.parse_key(KeyInfo::EncryptedPkcs8 {
                    der: bytes,
                    password: password.as_bytes(),
                })
            }
        }
    }

    /// Read a PEM encoded private key
    pub fn read(&self, pem: &[u8], password: Option<&str>) -> Result<PrivateKey> {
        let block = PemBlock::parse(pem)?;
        let encoding = KeyEncoding::from_label(&block.label)?;
        let key = self.decode(&block.body, encoding, &block.headers, password)?;
        Ok(key)
    }

    /// Read a PEM encoded private key from a stream, consuming it to the end
    pub fn read_from<R: Read>(&self, mut reader: R, password: Option<&str>) -> Result<PrivateKey> {
        let mut pem = Vec::new();
        reader.read_to_end(&mut pem)?;
        self.read(&pem, password)
    }

    /// Read a PEM encoded private key file
    pub fn read_file(&self, path: impl AsRef<Path>, password: Option<&str>) -> Result<PrivateKey> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(PkiError::InvalidArgument(
                "Private key path is empty".to_string(),
            ));
        }

        let pem = fs::read(path)?;
        self.read(&pem, password).map_err(|e| {
            self.logger
                .warn(format!("Unable to read private key {}: {}", path.display(), e));
            e
        })
    }
}

/// Returns the `DEK-Info` value when the headers mark the body as encrypted
fn legacy_encryption(headers: &PemHeaders) -> std::result::Result<Option<&str>, KeyError> {
    let encrypted = headers
        .get(PROC_TYPE_HEADER)
        .map(|value| value.to_ascii_uppercase().contains("ENCRYPTED"))
        .unwrap_or(false);

    match headers.get(DEK_INFO_HEADER) {
        Some(dek_info) => Ok(Some(dek_info)),
        None if encrypted => Err(KeyError::Malformed(
            "Encrypted private key is missing its DEK-Info header".to_string(),
        )),
        None => Ok(None),
    }
}

/// Check that `bytes` opens with a SEQUENCE spanning the whole input.
///
/// The wrapper contents, including the encryption scheme, are left to the provider.
fn expect_sequence(bytes: &[u8], what: &str) -> std::result::Result<(), KeyError> {
    let mut reader = SliceReader::new(bytes)?;
    let header = Header::decode(&mut reader)?;
    if header.tag != Tag::Sequence {
        return Err(KeyError::Malformed(format!(
            "Expected a {} SEQUENCE, found {}",
            what, header.tag
        )));
    }
    if reader.remaining_len() != header.length {
        return Err(KeyError::Malformed(format!(
            "{} length {} does not match the {} bytes present",
            what,
            header.length,
            reader.remaining_len()
        )));
    }
    Ok(())
}

/// Parse a `cipher-name,hex-iv` header value
pub fn parse_dek_info(value: &str) -> std::result::Result<(PemCipher, Vec<u8>), KeyError> {
    let (cipher, iv) = value
        .split_once(',')
        .ok_or_else(|| KeyError::Malformed(format!("Malformed DEK-Info header: {}", value)))?;

    let cipher: PemCipher = cipher.parse()?;
    let iv = hex::decode(iv.trim()).map_err(|e| KeyError::MalformedIv(e.to_string()))?;
    if iv.len() != cipher.iv_len() {
        return Err(KeyError::MalformedIv(format!(
            "{} requires a {}-byte IV, got {} bytes",
            cipher.as_str(),
            cipher.iv_len(),
            iv.len()
        )));
    }

    Ok((cipher, iv))
}

/// Decode the fixed nine-integer RSA private key structure.
///
/// Anything after the ninth integer is a multi-prime key, which is not supported.
pub fn decode_rsa_private_key(
    der_bytes: &[u8],
) -> std::result::Result<RsaPrivateComponents, KeyError> {
    let mut reader = SliceReader::new(der_bytes)?;
    let header = Header::decode(&mut reader)?;
    if header.tag != Tag::Sequence {
        return Err(KeyError::Malformed(format!(
            "Expected an RSA private key SEQUENCE, found {}",
            header.tag
        )));
    }

    let (version, fields, has_other_primes) = reader.read_nested(header.length, |r| {
        let version = UintRef::decode(r)?.as_bytes().to_vec();
        let mut fields: [Vec<u8>; 8] = Default::default();
        for field in fields.iter_mut() {
            *field = UintRef::decode(r)?.as_bytes().to_vec();
        }

        let has_other_primes = !r.is_finished();
        while !r.is_finished() {
            AnyRef::decode(r)?;
        }
        Ok((version, fields, has_other_primes))
    })?;
    reader.finish(())?;

    match version_number(&version) {
        Some(0) | Some(1) => {}
        _ => {
            return Err(KeyError::UnsupportedVersion(format!(
                "0x{}",
                hex::encode(&version)
            )))
        }
    }

    if has_other_primes {
        return Err(KeyError::MultiPrimeUnsupported);
    }

    let [modulus, public_exponent, private_exponent, prime1, prime2, exponent1, exponent2, coefficient] =
        fields;

    Ok(RsaPrivateComponents {
        modulus,
        public_exponent,
        private_exponent,
        prime1,
        prime2,
        exponent1,
        exponent2,
        coefficient,
    })
}

fn version_number(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}
