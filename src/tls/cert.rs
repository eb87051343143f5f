//! Certificate handling module
//!
//! Loading of PEM certificates and SHA-256 certificate fingerprints used
//! for pinning and diagnostics.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::debug;
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::x509::{X509Ref, X509};

use crate::common::{OverrideError, Result};
use crate::config::ConfigError;

/// SHA-256 fingerprint of a DER-encoded certificate
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fingerprint of a certificate
    pub fn of(cert: &X509Ref) -> std::result::Result<Self, ErrorStack> {
        let digest = cert.digest(MessageDigest::sha256())?;
        let bytes = <[u8; 32]>::try_from(&digest[..]).map_err(|_| ErrorStack::get())?;
        Ok(Self(bytes))
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self
            .0
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<String>>()
            .join(":");
        f.write_str(&hex)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

impl FromStr for Fingerprint {
    type Err = ConfigError;

    /// Accepts 64 hex digits, optionally separated by `:` or spaces
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidFingerprint {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let digits: Vec<u8> = s
            .bytes()
            .filter(|b| *b != b':' && !b.is_ascii_whitespace())
            .collect();

        if digits.len() != 64 {
            return Err(invalid("expected 32 bytes (64 hex digits)"));
        }
        if !digits.iter().all(u8::is_ascii_hexdigit) {
            return Err(invalid("not hexadecimal"));
        }

        let mut bytes = [0u8; 32];
        for (i, pair) in digits.chunks(2).enumerate() {
            let pair = std::str::from_utf8(pair).map_err(|_| invalid("not hexadecimal"))?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| invalid("not hexadecimal"))?;
        }

        Ok(Self(bytes))
    }
}

/// Load every certificate from a PEM file
///
/// # Errors
///
/// Returns an error if the file cannot be read, cannot be parsed or holds no
/// certificate.
pub fn load_certificates(path: &Path) -> Result<Vec<X509>> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()).into());
    }

    let pem = fs::read(path)?;
    let certs = X509::stack_from_pem(&pem).map_err(|e| {
        OverrideError::Config(ConfigError::Load(format!(
            "failed to parse certificates in {}: {}",
            path.display(),
            e
        )))
    })?;

    if certs.is_empty() {
        return Err(ConfigError::Load(format!("no certificate found in {}", path.display())).into());
    }

    debug!("Loaded {} certificate(s) from {}", certs.len(), path.display());
    Ok(certs)
}

/// Fingerprint of the first certificate in a PEM file
pub fn certificate_fingerprint(path: &Path) -> Result<Fingerprint> {
    let certs = load_certificates(path)?;
    let leaf = certs
        .first()
        .ok_or_else(|| ConfigError::Load(format!("no certificate found in {}", path.display())))?;

    Fingerprint::of(leaf).map_err(|e| {
        OverrideError::Config(ConfigError::Load(format!(
            "failed to compute fingerprint of {}: {}",
            path.display(),
            e
        )))
    })
}

/// One-line subject of a certificate, for logging
pub fn certificate_subject(cert: &X509Ref) -> String {
    cert.subject_name()
        .entries()
        .filter_map(|entry| {
            let key = entry.object().nid().short_name().ok()?;
            let value = entry.data().as_utf8().ok()?;
            Some(format!("{}={}", key, value))
        })
        .collect::<Vec<String>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const HEX: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_fingerprint_parsing() {
        let plain: Fingerprint = HEX.parse().unwrap();
        let colons: Fingerprint = plain.to_string().parse().unwrap();
        let upper: Fingerprint = HEX.to_uppercase().parse().unwrap();

        assert_eq!(plain, colons);
        assert_eq!(plain, upper);
        assert_eq!(plain.as_bytes()[0], 0x01);
        assert!(plain.to_string().starts_with("01:23:45"));
    }

    #[test]
    fn test_fingerprint_rejects_malformed() {
        assert!("abcd".parse::<Fingerprint>().is_err());
        assert!(HEX.replace('0', "g").parse::<Fingerprint>().is_err());
        assert!(format!("{}00", HEX).parse::<Fingerprint>().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_certificates(&PathBuf::from("non_existent_file.pem"));
        assert!(result.is_err(), "Should fail to load a missing file");
    }
}
