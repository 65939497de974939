//! Certificate identity
//!
//! [`CertificateFingerprint`] is the key every cached proof is stored under:
//! the lowercase hex SHA-256 digest of the certificate DER encoding.
//! [`Certificate`] owns the DER bytes, validates them once at construction
//! and exposes the handful of X.509 facts the OCSP code needs.

use crate::error::RevocationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use x509_parser::prelude::*;

const FINGERPRINT_HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 digest of a certificate's DER encoding
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CertificateFingerprint(String);

impl CertificateFingerprint {
    /// Fingerprint of a DER-encoded certificate
    pub fn of_der(der: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(der)))
    }

    /// Parse a fingerprint string, accepting upper or lower case hex
    pub fn parse(value: &str) -> Result<Self, RevocationError> {
        if value.len() != FINGERPRINT_HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RevocationError::InvalidFingerprint(value.to_string()));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CertificateFingerprint {
    type Error = RevocationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CertificateFingerprint> for String {
    fn from(value: CertificateFingerprint) -> Self {
        value.0
    }
}

/// DER certificate with a precomputed fingerprint
///
/// Parsing is borrowed and cheap, so the parsed view is produced on demand
/// instead of being stored next to the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    fingerprint: CertificateFingerprint,
}

impl Certificate {
    /// Build from DER bytes, rejecting anything that is not a single X.509 certificate
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self, RevocationError> {
        let der = der.into();
        let (rem, _) = parse_x509_certificate(&der).map_err(|e| {
            RevocationError::CertificateError(format!("Failed to parse certificate: {}", e))
        })?;
        if !rem.is_empty() {
            return Err(RevocationError::CertificateError(format!(
                "{} trailing bytes after certificate",
                rem.len()
            )));
        }
        let fingerprint = CertificateFingerprint::of_der(&der);
        Ok(Self { der, fingerprint })
    }

    /// Build from the first PEM block in `pem`
    pub fn from_pem(pem: &[u8]) -> Result<Self, RevocationError> {
        let (_, block) = x509_parser::pem::parse_x509_pem(pem).map_err(|e| {
            RevocationError::CertificateError(format!("Failed to parse PEM: {}", e))
        })?;
        if block.label != "CERTIFICATE" {
            return Err(RevocationError::CertificateError(format!(
                "Unexpected PEM label: {}",
                block.label
            )));
        }
        Self::from_der(block.contents)
    }

    /// Build from either PEM or DER, detected by the leading `-----BEGIN`
    pub fn from_pem_or_der(data: &[u8]) -> Result<Self, RevocationError> {
        if data.starts_with(b"-----BEGIN") {
            Self::from_pem(data)
        } else {
            Self::from_der(data.to_vec())
        }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn fingerprint(&self) -> &CertificateFingerprint {
        &self.fingerprint
    }

    /// Parsed view over the owned DER bytes
    pub fn parsed(&self) -> Result<X509Certificate<'_>, RevocationError> {
        parse_x509_certificate(&self.der)
            .map(|(_, cert)| cert)
            .map_err(|e| {
                RevocationError::CertificateError(format!("Failed to parse certificate: {}", e))
            })
    }

    /// Subject distinguished name in RFC 4514 form
    pub fn subject_name(&self) -> String {
        self.parsed()
            .map(|cert| cert.subject().to_string())
            .unwrap_or_default()
    }

    /// Issuer distinguished name in RFC 4514 form
    pub fn issuer_name(&self) -> String {
        self.parsed()
            .map(|cert| cert.issuer().to_string())
            .unwrap_or_default()
    }

    /// DER encoding of the subject Name
    pub fn subject_name_der(&self) -> Vec<u8> {
        self.parsed()
            .map(|cert| cert.subject().as_raw().to_vec())
            .unwrap_or_default()
    }

    /// Serial number content octets exactly as encoded in the certificate
    pub fn raw_serial(&self) -> Vec<u8> {
        self.parsed()
            .map(|cert| cert.raw_serial().to_vec())
            .unwrap_or_default()
    }

    /// Serial number as lowercase hex
    pub fn serial_hex(&self) -> String {
        hex::encode(self.raw_serial())
    }

    /// Contents of the subjectPublicKey BIT STRING
    pub fn public_key_bits(&self) -> Vec<u8> {
        self.parsed()
            .map(|cert| cert.public_key().subject_public_key.data.to_vec())
            .unwrap_or_default()
    }

    /// Subject and issuer names are identical
    pub fn is_self_signed(&self) -> bool {
        self.parsed()
            .map(|cert| cert.subject().as_raw() == cert.issuer().as_raw())
            .unwrap_or(false)
    }

    /// `at` falls inside notBefore..=notAfter
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        let Ok(cert) = self.parsed() else {
            return false;
        };
        let validity = cert.validity();
        let ts = at.timestamp();
        validity.not_before.timestamp() <= ts && ts <= validity.not_after.timestamp()
    }

    /// Issuer name matches and the signature verifies with `issuer`'s key
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        let (Ok(cert), Ok(issuer_cert)) = (self.parsed(), issuer.parsed()) else {
            return false;
        };
        if cert.issuer().as_raw() != issuer_cert.subject().as_raw() {
            return false;
        }
        cert.verify_signature(Some(issuer_cert.public_key())).is_ok()
    }

    /// Extended key usage contains id-kp-OCSPSigning
    pub fn has_ocsp_signing_usage(&self) -> bool {
        match self.parsed() {
            Ok(cert) => matches!(
                cert.extended_key_usage(),
                Ok(Some(eku)) if eku.value.ocsp_signing
            ),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject_name())
            .field("fingerprint", &self.fingerprint.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestPki;

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        let fp = CertificateFingerprint::of_der(b"abc");
        assert_eq!(
            fp.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fingerprint_parse() {
        let upper = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        let fp = CertificateFingerprint::parse(upper).unwrap();
        assert_eq!(fp, CertificateFingerprint::of_der(b"abc"));

        assert!(CertificateFingerprint::parse("abcd").is_err());
        assert!(CertificateFingerprint::parse(&"z".repeat(64)).is_err());
    }

    #[test]
    fn test_fingerprint_serde_validates() {
        let fp = CertificateFingerprint::of_der(b"abc");
        let json = serde_json::to_string(&fp).unwrap();
        let back: CertificateFingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);

        assert!(serde_json::from_str::<CertificateFingerprint>("\"not-hex\"").is_err());
    }

    #[test]
    fn test_from_der_rejects_garbage() {
        assert!(Certificate::from_der(vec![0x30, 0x03, 0x01, 0x01, 0xff]).is_err());
    }

    #[test]
    fn test_chain_relationships() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 7);

        assert!(pki.root.certificate.is_self_signed());
        assert!(!pki.ca.certificate.is_self_signed());
        assert!(!leaf.is_self_signed());

        assert!(leaf.is_issued_by(&pki.ca.certificate));
        assert!(pki.ca.certificate.is_issued_by(&pki.root.certificate));
        assert!(!leaf.is_issued_by(&pki.root.certificate));

        assert!(pki.responder.certificate.has_ocsp_signing_usage());
        assert!(!leaf.has_ocsp_signing_usage());

        assert_eq!(leaf.serial_hex(), "07");
        assert!(leaf.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_pem_and_der_agree() {
        let pki = TestPki::new();
        let (leaf, pem) = pki.issue_leaf_with_pem("leaf.example", 9);

        let from_pem = Certificate::from_pem_or_der(pem.as_bytes()).unwrap();
        assert_eq!(from_pem, leaf);
        let from_der = Certificate::from_pem_or_der(leaf.der()).unwrap();
        assert_eq!(from_der.fingerprint(), leaf.fingerprint());
    }
}
