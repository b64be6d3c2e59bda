//! ConfigSchemeReader: schemes declared through `pki.crypto.*` configuration

mod common;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use cairn_pki::config::{
    self, CRYPTO_SCHEMES, DEFAULT_CRYPTO_SCHEME, LEGACY_CA_CERT, LEGACY_CA_KEY,
    LEGACY_CA_KEY_PASSWORD, SCHEME_CERT, SCHEME_KEY, SCHEME_KEY_ALGORITHM, SCHEME_KEY_PASSWORD,
    SCHEME_KEY_SIZE, SCHEME_SIGNATURE_ALGORITHM,
};
use cairn_pki::{
    ConfigSchemeReader, KeyAlgorithm, MapConfiguration, PemCertificateReader, PkiError, Scheme,
    SchemeKeys, SchemeReader, SignatureAlgorithm, LEGACY_SCHEME,
};
use common::{create_test_logger, key_reader, write_pem_certificate, TestScheme};
use openssl::symm::Cipher;
use tempfile::TempDir;

fn reader(config: MapConfiguration) -> ConfigSchemeReader {
    ConfigSchemeReader::new(
        Arc::new(config),
        Arc::new(PemCertificateReader::new()),
        Arc::new(key_reader()),
        create_test_logger(),
    )
}

/// Write the scheme's certificate and key to `dir` and register them under `name`
fn write_scheme_config(
    config: &mut MapConfiguration,
    dir: &Path,
    scheme: &TestScheme,
    name: &str,
    password: Option<&str>,
) -> Result<()> {
    let cert_path = write_pem_certificate(dir, &format!("{}.crt", name), &scheme.x509)?;
    let key_pem = match password {
        Some(password) => scheme
            .key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), password.as_bytes())?,
        None => scheme.key.private_key_to_pem_pkcs8()?,
    };
    let key_path = dir.join(format!("{}.key", name));
    std::fs::write(&key_path, key_pem)?;

    config.set(
        config::scheme_key(name, SCHEME_CERT),
        cert_path.to_string_lossy(),
    );
    config.set(
        config::scheme_key(name, SCHEME_KEY),
        key_path.to_string_lossy(),
    );
    if let Some(password) = password {
        config.set(config::scheme_key(name, SCHEME_KEY_PASSWORD), password);
    }
    config.set(
        config::scheme_key(name, SCHEME_SIGNATURE_ALGORITHM),
        scheme.scheme.signature_algorithm().as_str(),
    );
    config.set(
        config::scheme_key(name, SCHEME_KEY_ALGORITHM),
        scheme.scheme.key_algorithm().as_str(),
    );
    if let Some(size) = scheme.scheme.key_size() {
        config.set(config::scheme_key(name, SCHEME_KEY_SIZE), size.to_string());
    }
    Ok(())
}

fn assert_same_scheme(actual: &Scheme, expected: &Scheme) {
    assert_eq!(actual.name(), expected.name());
    assert_eq!(actual.certificate(), expected.certificate());
    assert_eq!(actual.private_key(), expected.private_key());
    assert_eq!(actual.signature_algorithm(), expected.signature_algorithm());
    assert_eq!(actual.key_algorithm(), expected.key_algorithm());
    assert_eq!(actual.key_size(), expected.key_size());
}

fn configuration_error(result: cairn_pki::Result<impl std::fmt::Debug>) -> String {
    match result {
        Err(PkiError::ConfigurationError(message)) => message,
        other => panic!("expected a configuration error, got {:?}", other),
    }
}

#[test]
fn test_read_single_scheme_with_and_without_password() -> Result<()> {
    for password in [None, Some("s3cret-passphrase")] {
        let dir = TempDir::new()?;
        let scheme = TestScheme::rsa("rsa")?;
        let mut config = MapConfiguration::new();
        write_scheme_config(&mut config, dir.path(), &scheme, "rsa", password)?;
        config.set(CRYPTO_SCHEMES, "rsa");

        let schemes = reader(config).read_schemes()?;
        assert_eq!(schemes.len(), 1);
        assert_same_scheme(&schemes[0], &scheme.scheme);
        assert_eq!(schemes[0], scheme.scheme);
    }
    Ok(())
}

#[test]
fn test_read_multiple_schemes_in_declared_order() -> Result<()> {
    let dir = TempDir::new()?;
    let rsa = TestScheme::rsa("rsa")?;
    let ec = TestScheme::ec("ec_p256")?;
    let rsa512 = TestScheme::generate("rsa-sha512", SignatureAlgorithm::Sha512WithRsa)?;

    let mut config = MapConfiguration::new();
    write_scheme_config(&mut config, dir.path(), &ec, "ec_p256", None)?;
    write_scheme_config(&mut config, dir.path(), &rsa, "rsa", Some("pw"))?;
    write_scheme_config(&mut config, dir.path(), &rsa512, "rsa-sha512", None)?;
    config.set(CRYPTO_SCHEMES, " ec_p256, rsa ,rsa-sha512");

    let schemes = reader(config).read_schemes()?;
    let names: Vec<&str> = schemes.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["ec_p256", "rsa", "rsa-sha512"]);
    assert_same_scheme(&schemes[0], &ec.scheme);
    assert_same_scheme(&schemes[1], &rsa.scheme);
    assert_same_scheme(&schemes[2], &rsa512.scheme);
    Ok(())
}

#[test]
fn test_scheme_without_key_is_verification_only() -> Result<()> {
    let dir = TempDir::new()?;
    let scheme = TestScheme::ec("ec")?;
    let cert_path = write_pem_certificate(dir.path(), "ec.crt", &scheme.x509)?;

    let config = MapConfiguration::from_pairs([
        (CRYPTO_SCHEMES.to_string(), "ec".to_string()),
        (
            config::scheme_key("ec", SCHEME_CERT),
            cert_path.to_string_lossy().into_owned(),
        ),
        (
            config::scheme_key("ec", SCHEME_SIGNATURE_ALGORITHM),
            "SHA256withECDSA".to_string(),
        ),
    ]);

    let schemes = reader(config).read_schemes()?;
    assert!(!schemes[0].has_private_key());
    assert_eq!(schemes[0].key_algorithm(), KeyAlgorithm::Ec);
    assert_eq!(schemes[0].key_size(), None);
    Ok(())
}

#[test]
fn test_missing_scheme_list() {
    let message = configuration_error(reader(MapConfiguration::new()).read_schemes());
    assert!(message.contains("No crypto schemes defined"));

    let blank = MapConfiguration::from_pairs([(CRYPTO_SCHEMES, "   ")]);
    let message = configuration_error(reader(blank).read_schemes());
    assert!(message.contains("No crypto schemes defined"));
}

#[test]
fn test_malformed_scheme_list() {
    for declaration in ["rsa, abc!@#*$)", "-hyphen_first", "uni©ode", "rsa,,ec", "rsa, RSA"] {
        let config = MapConfiguration::from_pairs([(CRYPTO_SCHEMES, declaration)]);
        let message = configuration_error(reader(config).read_schemes());
        assert!(
            message.contains("Malformed crypto schemes declaration"),
            "{:?}: {}",
            declaration,
            message
        );
    }
}

#[test]
fn test_declared_scheme_without_configuration() -> Result<()> {
    let dir = TempDir::new()?;
    let scheme = TestScheme::rsa("rsa")?;
    let mut config = MapConfiguration::new();
    write_scheme_config(&mut config, dir.path(), &scheme, "rsa", None)?;
    config.set(CRYPTO_SCHEMES, "rsa, missing");

    let message = configuration_error(reader(config).read_schemes());
    assert!(message.contains("Unable to read scheme"));
    assert!(message.contains("missing"));
    Ok(())
}

#[test]
fn test_unreadable_private_key() -> Result<()> {
    let dir = TempDir::new()?;
    let scheme = TestScheme::rsa("rsa")?;

    // Key file that does not exist
    let mut config = MapConfiguration::new();
    write_scheme_config(&mut config, dir.path(), &scheme, "rsa", None)?;
    config.set(CRYPTO_SCHEMES, "rsa");
    config.set(
        config::scheme_key("rsa", SCHEME_KEY),
        dir.path().join("nope.key").to_string_lossy(),
    );
    let message = configuration_error(reader(config).read_schemes());
    assert!(message.contains("Unable to read private key"));

    // Wrong password
    let mut config = MapConfiguration::new();
    write_scheme_config(&mut config, dir.path(), &scheme, "rsa", Some("right"))?;
    config.set(CRYPTO_SCHEMES, "rsa");
    config.set(config::scheme_key("rsa", SCHEME_KEY_PASSWORD), "wrong_password");
    let message = configuration_error(reader(config).read_schemes());
    assert!(message.contains("Unable to read private key"));

    // No password
    let mut config = MapConfiguration::new();
    write_scheme_config(&mut config, dir.path(), &scheme, "rsa", Some("right"))?;
    config.set(CRYPTO_SCHEMES, "rsa");
    config.remove(&config::scheme_key("rsa", SCHEME_KEY_PASSWORD));
    let message = configuration_error(reader(config).read_schemes());
    assert!(message.contains("Unable to read private key"));
    Ok(())
}

#[test]
fn test_unreadable_certificate() -> Result<()> {
    let dir = TempDir::new()?;
    let scheme = TestScheme::rsa("rsa")?;
    let mut config = MapConfiguration::new();
    write_scheme_config(&mut config, dir.path(), &scheme, "rsa", None)?;
    config.set(CRYPTO_SCHEMES, "rsa");

    let bogus = dir.path().join("bogus.crt");
    std::fs::write(&bogus, b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n")?;
    config.set(config::scheme_key("rsa", SCHEME_CERT), bogus.to_string_lossy());

    let message = configuration_error(reader(config).read_schemes());
    assert!(message.contains("Unable to read certificate"));
    Ok(())
}

#[test]
fn test_invalid_algorithm_settings() -> Result<()> {
    let dir = TempDir::new()?;
    let scheme = TestScheme::rsa("rsa")?;

    let mut config = MapConfiguration::new();
    write_scheme_config(&mut config, dir.path(), &scheme, "rsa", None)?;
    config.set(CRYPTO_SCHEMES, "rsa");
    config.set(config::scheme_key("rsa", SCHEME_SIGNATURE_ALGORITHM), "MD5withRSA");
    assert!(configuration_error(reader(config).read_schemes()).contains("Unable to read scheme"));

    let mut config = MapConfiguration::new();
    write_scheme_config(&mut config, dir.path(), &scheme, "rsa", None)?;
    config.set(CRYPTO_SCHEMES, "rsa");
    config.set(config::scheme_key("rsa", SCHEME_KEY_SIZE), "big");
    assert!(configuration_error(reader(config).read_schemes()).contains("Unable to read scheme"));

    // An RSA key cannot back an ECDSA scheme
    let mut config = MapConfiguration::new();
    write_scheme_config(&mut config, dir.path(), &scheme, "rsa", None)?;
    config.set(CRYPTO_SCHEMES, "rsa");
    config.set(
        config::scheme_key("rsa", SCHEME_SIGNATURE_ALGORITHM),
        "SHA256withECDSA",
    );
    config.remove(&config::scheme_key("rsa", SCHEME_KEY_ALGORITHM));
    assert!(configuration_error(reader(config).read_schemes()).contains("Unable to read scheme"));
    Ok(())
}

#[test]
fn test_read_default_scheme() -> Result<()> {
    for password in [None, Some("default-pw")] {
        let dir = TempDir::new()?;
        let scheme = TestScheme::ec("primary")?;
        let mut config = MapConfiguration::new();
        write_scheme_config(&mut config, dir.path(), &scheme, "primary", password)?;
        config.set(DEFAULT_CRYPTO_SCHEME, "primary");

        // The default need not be listed among the schemes
        let default_scheme = reader(config).read_default_scheme()?;
        assert_same_scheme(&default_scheme, &scheme.scheme);
    }
    Ok(())
}

#[test]
fn test_default_scheme_falls_back_to_legacy() -> Result<()> {
    let dir = TempDir::new()?;
    let scheme = TestScheme::rsa(LEGACY_SCHEME)?;
    let mut config = MapConfiguration::new();
    write_scheme_config(&mut config, dir.path(), &scheme, LEGACY_SCHEME, None)?;

    let default_scheme = reader(config).read_default_scheme()?;
    assert_eq!(default_scheme.name(), LEGACY_SCHEME);
    assert_same_scheme(&default_scheme, &scheme.scheme);
    Ok(())
}

#[test]
fn test_legacy_scheme_from_pre_scheme_settings() -> Result<()> {
    let dir = TempDir::new()?;
    let scheme = TestScheme::rsa("ca")?;
    let cert_path = write_pem_certificate(dir.path(), "candlepin-ca.crt", &scheme.x509)?;
    let key_path = dir.path().join("candlepin-ca.key");
    std::fs::write(
        &key_path,
        scheme
            .key
            .rsa()?
            .private_key_to_pem_passphrase(Cipher::aes_256_cbc(), b"legacy-pw")?,
    )?;

    let config = MapConfiguration::from_pairs([
        (LEGACY_CA_CERT.to_string(), cert_path.to_string_lossy().into_owned()),
        (LEGACY_CA_KEY.to_string(), key_path.to_string_lossy().into_owned()),
        (LEGACY_CA_KEY_PASSWORD.to_string(), "legacy-pw".to_string()),
    ]);

    let legacy = reader(config).read_default_scheme()?;
    assert_eq!(legacy.name(), LEGACY_SCHEME);
    assert_eq!(legacy.certificate(), scheme.certificate());
    assert_eq!(legacy.private_key(), scheme.scheme.private_key());
    assert_eq!(legacy.signature_algorithm(), SignatureAlgorithm::Sha256WithRsa);
    assert_eq!(legacy.key_algorithm(), KeyAlgorithm::Rsa);
    assert_eq!(legacy.key_size(), Some(4096));
    Ok(())
}

#[test]
fn test_default_scheme_errors() {
    let config = MapConfiguration::from_pairs([(DEFAULT_CRYPTO_SCHEME, "missing_scheme")]);
    let message = configuration_error(reader(config).read_default_scheme());
    assert!(message.contains("Unable to read scheme"));

    for name in ["abc!@#*$)", "-hyphen_first", "uni©ode"] {
        let config = MapConfiguration::from_pairs([(DEFAULT_CRYPTO_SCHEME, name)]);
        let message = configuration_error(reader(config).read_default_scheme());
        assert!(message.contains("Malformed default crypto scheme declaration"));
    }

    // No default and no legacy settings
    let message = configuration_error(reader(MapConfiguration::new()).read_default_scheme());
    assert!(message.contains("Unable to read scheme legacy"));
}

const JWT_CERT: &str = "pki.jwt.scheme.cert";
const JWT_KEY: &str = "pki.jwt.scheme.key";
const JWT_KEY_PASSWORD: &str = "pki.jwt.scheme.key_password";
const JWT_SIGNATURE_ALGORITHM: &str = "pki.jwt.scheme.signature_algorithm";
const JWT_KEY_ALGORITHM: &str = "pki.jwt.scheme.key_algorithm";
const JWT_KEY_SIZE: &str = "pki.jwt.scheme.key_size";

fn jwt_keys() -> SchemeKeys {
    SchemeKeys {
        certificate: JWT_CERT.to_string(),
        private_key: JWT_KEY.to_string(),
        key_password: Some(JWT_KEY_PASSWORD.to_string()),
        signature_algorithm: JWT_SIGNATURE_ALGORITHM.to_string(),
        key_algorithm: JWT_KEY_ALGORITHM.to_string(),
        key_size: Some(JWT_KEY_SIZE.to_string()),
    }
}

/// Register the scheme's files under the `pki.jwt.scheme.*` keys
fn write_jwt_config(
    dir: &Path,
    scheme: &TestScheme,
    password: Option<&str>,
) -> Result<MapConfiguration> {
    let cert_path = write_pem_certificate(dir, "jwt.crt", &scheme.x509)?;
    let key_pem = match password {
        Some(password) => scheme
            .key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), password.as_bytes())?,
        None => scheme.key.private_key_to_pem_pkcs8()?,
    };
    let key_path = dir.join("jwt.key");
    std::fs::write(&key_path, key_pem)?;

    let mut config = MapConfiguration::new();
    config
        .set(JWT_CERT, cert_path.to_string_lossy())
        .set(JWT_KEY, key_path.to_string_lossy())
        .set(
            JWT_SIGNATURE_ALGORITHM,
            scheme.scheme.signature_algorithm().as_str(),
        )
        .set(JWT_KEY_ALGORITHM, scheme.scheme.key_algorithm().as_str());
    if let Some(password) = password {
        config.set(JWT_KEY_PASSWORD, password);
    }
    if let Some(size) = scheme.scheme.key_size() {
        config.set(JWT_KEY_SIZE, size.to_string());
    }
    Ok(config)
}

#[test]
fn test_read_scheme_with_keys() -> Result<()> {
    let dir = TempDir::new()?;
    let scheme = TestScheme::rsa("jwt")?;
    let config = write_jwt_config(dir.path(), &scheme, Some("jwt-passphrase"))?;

    let actual = reader(config).read_scheme_with_keys("jwt", &jwt_keys())?;
    assert_same_scheme(&actual, &scheme.scheme);
    Ok(())
}

#[test]
fn test_read_scheme_with_keys_without_optional_keys() -> Result<()> {
    let dir = TempDir::new()?;
    let scheme = TestScheme::ec("jwt")?;

    // No password key: the key file is read unencrypted
    let config = write_jwt_config(dir.path(), &scheme, None)?;
    let keys = SchemeKeys {
        key_password: None,
        ..jwt_keys()
    };
    let actual = reader(config).read_scheme_with_keys("jwt", &keys)?;
    assert_same_scheme(&actual, &scheme.scheme);

    // No key size key: the scheme has no key size even though one is configured
    let config = write_jwt_config(dir.path(), &scheme, Some("jwt-passphrase"))?;
    let keys = SchemeKeys {
        key_size: None,
        ..jwt_keys()
    };
    let actual = reader(config).read_scheme_with_keys("jwt", &keys)?;
    assert_eq!(actual.private_key(), scheme.scheme.private_key());
    assert_eq!(actual.key_size(), None);
    Ok(())
}

#[test]
fn test_read_scheme_with_keys_requires_settings() -> Result<()> {
    let dir = TempDir::new()?;
    let scheme = TestScheme::rsa("jwt")?;

    for required in [JWT_CERT, JWT_KEY, JWT_SIGNATURE_ALGORITHM, JWT_KEY_ALGORITHM] {
        let mut config = write_jwt_config(dir.path(), &scheme, Some("jwt-passphrase"))?;
        config.remove(required);

        let message =
            configuration_error(reader(config).read_scheme_with_keys("jwt", &jwt_keys()));
        assert!(
            message.contains(required),
            "{} not named in {:?}",
            required,
            message
        );
    }
    Ok(())
}

#[test]
fn test_read_scheme_with_blank_keys() {
    let reader = reader(MapConfiguration::new());
    let is_invalid =
        |result: cairn_pki::Result<Scheme>| matches!(result, Err(PkiError::InvalidArgument(_)));

    for blank in ["", "  "] {
        assert!(is_invalid(reader.read_scheme_with_keys(blank, &jwt_keys())));

        let with_blank: [fn(&mut SchemeKeys, &str); 6] = [
            |keys, blank| keys.certificate = blank.to_string(),
            |keys, blank| keys.private_key = blank.to_string(),
            |keys, blank| keys.signature_algorithm = blank.to_string(),
            |keys, blank| keys.key_algorithm = blank.to_string(),
            |keys, blank| keys.key_password = Some(blank.to_string()),
            |keys, blank| keys.key_size = Some(blank.to_string()),
        ];
        for set_blank in with_blank {
            let mut keys = jwt_keys();
            set_blank(&mut keys, blank);
            assert!(
                is_invalid(reader.read_scheme_with_keys("jwt", &keys)),
                "{:?}",
                keys
            );
        }
    }
}
