//! OCSP request encoding
//!
//! ```asn1
//! OCSPRequest ::= SEQUENCE {
//!     tbsRequest          TBSRequest,
//!     optionalSignature   [0] EXPLICIT Signature OPTIONAL
//! }
//!
//! TBSRequest ::= SEQUENCE {
//!     version             [0] EXPLICIT Version DEFAULT v1,
//!     requestorName       [1] EXPLICIT GeneralName OPTIONAL,
//!     requestList         SEQUENCE OF Request,
//!     requestExtensions   [2] EXPLICIT Extensions OPTIONAL
//! }
//!
//! Signature ::= SEQUENCE {
//!     signatureAlgorithm  AlgorithmIdentifier,
//!     signature           BIT STRING,
//!     certs               [0] EXPLICIT SEQUENCE OF Certificate OPTIONAL
//! }
//! ```

use crate::certificate::Certificate;
use crate::der::*;
use crate::error::RevocationError;
use ring::rand::SystemRandom;
use ring::signature::{self, EcdsaKeyPair, RsaKeyPair};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

const OID_SHA1: &[u64] = &[1, 3, 14, 3, 2, 26];
const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];
const OID_OCSP_NONCE: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1, 2];
const OID_ECDSA_SHA256: &[u64] = &[1, 2, 840, 10045, 4, 3, 2];
const OID_ECDSA_SHA384: &[u64] = &[1, 2, 840, 10045, 4, 3, 3];
const OID_RSA_SHA256: &[u64] = &[1, 2, 840, 113549, 1, 1, 11];

/// Hash algorithm used for CertID fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertIdHash {
    /// SHA-1 (the algorithm virtually every responder accepts)
    #[default]
    Sha1,
    Sha256,
}

impl CertIdHash {
    pub fn from_oid(oid: &str) -> Option<Self> {
        match oid {
            "1.3.14.3.2.26" => Some(Self::Sha1),
            "2.16.840.1.101.3.4.2.1" => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    fn oid(&self) -> &'static [u64] {
        match self {
            Self::Sha1 => OID_SHA1,
            Self::Sha256 => OID_SHA256,
        }
    }
}

/// CertID fields identifying one subject/issuer pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertId {
    pub hash: CertIdHash,
    pub issuer_name_hash: Vec<u8>,
    pub issuer_key_hash: Vec<u8>,
    /// INTEGER content octets
    pub serial: Vec<u8>,
}

impl CertId {
    /// Compute the CertID of `subject` as issued by `issuer`
    pub fn for_pair(subject: &Certificate, issuer: &Certificate, hash: CertIdHash) -> Self {
        Self::for_serial(subject.raw_serial(), issuer, hash)
    }

    /// CertID for a subject known only by its serial content octets
    pub fn for_serial(serial: Vec<u8>, issuer: &Certificate, hash: CertIdHash) -> Self {
        Self {
            hash,
            issuer_name_hash: hash.digest(&issuer.subject_name_der()),
            issuer_key_hash: hash.digest(&issuer.public_key_bits()),
            serial,
        }
    }

    /// ```asn1
    /// CertID ::= SEQUENCE {
    ///     hashAlgorithm       AlgorithmIdentifier,
    ///     issuerNameHash      OCTET STRING,
    ///     issuerKeyHash       OCTET STRING,
    ///     serialNumber        INTEGER
    /// }
    /// ```
    pub(crate) fn to_der(&self) -> Vec<u8> {
        let mut hash_algo = der_oid(self.hash.oid());
        hash_algo.extend_from_slice(&der_null());

        let mut cert_id = der_sequence(&hash_algo);
        cert_id.extend_from_slice(&der_octet_string(&self.issuer_name_hash));
        cert_id.extend_from_slice(&der_octet_string(&self.issuer_key_hash));
        cert_id.extend_from_slice(&der_integer(&self.serial));
        der_sequence(&cert_id)
    }
}

enum SigningKey {
    EcdsaP256(EcdsaKeyPair),
    EcdsaP384(EcdsaKeyPair),
    Rsa(RsaKeyPair),
}

/// Key and certificate used to produce signed requests
///
/// Some responders reply `sigRequired` to anonymous requests; those need a
/// requestor identity.
pub struct RequestSigner {
    key: SigningKey,
    certificate: Certificate,
    rng: SystemRandom,
}

impl RequestSigner {
    /// Load a PKCS#8 private key (ECDSA P-256, ECDSA P-384 or RSA)
    pub fn from_pkcs8(pkcs8: &[u8], certificate: Certificate) -> Result<Self, RevocationError> {
        let rng = SystemRandom::new();
        let key = if let Ok(key) =
            EcdsaKeyPair::from_pkcs8(&signature::ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8, &rng)
        {
            SigningKey::EcdsaP256(key)
        } else if let Ok(key) =
            EcdsaKeyPair::from_pkcs8(&signature::ECDSA_P384_SHA384_ASN1_SIGNING, pkcs8, &rng)
        {
            SigningKey::EcdsaP384(key)
        } else {
            let key = RsaKeyPair::from_pkcs8(pkcs8).map_err(|e| {
                RevocationError::RequestError(format!("Unsupported signing key: {}", e))
            })?;
            SigningKey::Rsa(key)
        };

        Ok(Self {
            key,
            certificate,
            rng,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// AlgorithmIdentifier DER for the key type
    fn algorithm_identifier(&self) -> Vec<u8> {
        match self.key {
            SigningKey::EcdsaP256(_) => der_sequence(&der_oid(OID_ECDSA_SHA256)),
            SigningKey::EcdsaP384(_) => der_sequence(&der_oid(OID_ECDSA_SHA384)),
            SigningKey::Rsa(_) => {
                der_sequence(&[der_oid(OID_RSA_SHA256), der_null()].concat())
            }
        }
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, RevocationError> {
        let failed = |_| RevocationError::RequestError("Request signing failed".to_string());
        match &self.key {
            SigningKey::EcdsaP256(key) | SigningKey::EcdsaP384(key) => key
                .sign(&self.rng, message)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(failed),
            SigningKey::Rsa(key) => {
                let mut sig = vec![0u8; key.public().modulus_len()];
                key.sign(&signature::RSA_PKCS1_SHA256, &self.rng, message, &mut sig)
                    .map_err(failed)?;
                Ok(sig)
            }
        }
    }
}

/// OCSP request builder
///
/// Builds a single-certificate request, optionally carrying a nonce and a
/// requestor signature.
pub struct OcspRequestBuilder<'a> {
    subject: &'a Certificate,
    issuer: &'a Certificate,
    hash: CertIdHash,
    nonce: Option<Vec<u8>>,
    signer: Option<&'a RequestSigner>,
}

impl<'a> OcspRequestBuilder<'a> {
    pub fn new(subject: &'a Certificate, issuer: &'a Certificate) -> Self {
        Self {
            subject,
            issuer,
            hash: CertIdHash::default(),
            nonce: None,
            signer: None,
        }
    }

    pub fn with_hash(mut self, hash: CertIdHash) -> Self {
        self.hash = hash;
        self
    }

    /// Add a nonce for replay protection
    pub fn with_nonce(mut self, nonce: Vec<u8>) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_signer(mut self, signer: &'a RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// The CertID this request asks about
    pub fn cert_id(&self) -> CertId {
        CertId::for_pair(self.subject, self.issuer, self.hash)
    }

    /// Build the DER-encoded OCSPRequest
    pub fn build(&self) -> Result<Vec<u8>, RevocationError> {
        if self.subject.raw_serial().is_empty() {
            return Err(RevocationError::RequestError(
                "subject certificate has no serial number".to_string(),
            ));
        }

        let request = der_sequence(&self.cert_id().to_der());
        let tbs_request = self.build_tbs_request(&request);

        let mut ocsp_request = tbs_request.clone();
        if let Some(signer) = self.signer {
            ocsp_request.extend_from_slice(&der_explicit_context(
                0,
                &self.build_signature(signer, &tbs_request)?,
            ));
        }

        Ok(der_sequence(&ocsp_request))
    }

    fn build_tbs_request(&self, request: &[u8]) -> Vec<u8> {
        let mut tbs = Vec::new();

        // requestorName [1] EXPLICIT GeneralName, directoryName [4] EXPLICIT Name
        if let Some(signer) = self.signer {
            let name = der_explicit_context(4, &signer.certificate.subject_name_der());
            tbs.extend_from_slice(&der_explicit_context(1, &name));
        }

        tbs.extend_from_slice(&der_sequence(request));

        if let Some(ref nonce_value) = self.nonce {
            tbs.extend_from_slice(&der_explicit_context(2, &build_nonce_extension(nonce_value)));
        }

        der_sequence(&tbs)
    }

    fn build_signature(
        &self,
        signer: &RequestSigner,
        tbs_request: &[u8],
    ) -> Result<Vec<u8>, RevocationError> {
        let mut sig = signer.algorithm_identifier();
        sig.extend_from_slice(&der_bit_string(&signer.sign(tbs_request)?));
        sig.extend_from_slice(&der_explicit_context(
            0,
            &der_sequence(signer.certificate.der()),
        ));
        Ok(der_sequence(&sig))
    }
}

/// Nonce extension wrapped as `Extensions`
///
/// ```asn1
/// Extension ::= SEQUENCE {
///     extnID      OBJECT IDENTIFIER,
///     critical    BOOLEAN DEFAULT FALSE,
///     extnValue   OCTET STRING
/// }
/// ```
pub(crate) fn build_nonce_extension(nonce: &[u8]) -> Vec<u8> {
    let mut ext = der_oid(OID_OCSP_NONCE);
    ext.extend_from_slice(&der_octet_string(&der_octet_string(nonce)));
    der_sequence(&der_sequence(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::der::read_single;
    use crate::testing::TestPki;
    use asn1_rs::Tag;

    #[test]
    fn test_unsigned_request_structure() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 0x42);

        let der = OcspRequestBuilder::new(&leaf, &pki.ca.certificate)
            .build()
            .unwrap();

        let outer = read_single(&der).unwrap();
        let parts = outer.children().unwrap();
        assert_eq!(parts.len(), 1, "unsigned request has no optionalSignature");

        let tbs = parts[0].children().unwrap();
        assert_eq!(tbs.len(), 1, "only requestList without nonce or requestor");

        let request_list = tbs[0].children().unwrap();
        let request = request_list[0].children().unwrap();
        let cert_id = request[0].children().unwrap();
        assert_eq!(cert_id.len(), 4);

        let algo = cert_id[0].children().unwrap();
        assert_eq!(algo[0].oid_string().unwrap(), "1.3.14.3.2.26");
        assert_eq!(cert_id[1].content.len(), 20);
        assert!(cert_id[3].is_universal(Tag::Integer));
        assert_eq!(cert_id[3].content, &[0x42]);
    }

    #[test]
    fn test_cert_id_matches_issuer_hashes() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 3);
        let issuer = &pki.ca.certificate;

        let cert_id = CertId::for_pair(&leaf, issuer, CertIdHash::Sha256);
        assert_eq!(
            cert_id.issuer_name_hash,
            Sha256::digest(issuer.subject_name_der()).to_vec()
        );
        assert_eq!(
            cert_id.issuer_key_hash,
            Sha256::digest(issuer.public_key_bits()).to_vec()
        );
        assert_eq!(cert_id.serial, leaf.raw_serial());
    }

    #[test]
    fn test_unsigned_request_is_deterministic() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 5);

        let a = OcspRequestBuilder::new(&leaf, &pki.ca.certificate)
            .build()
            .unwrap();
        let b = OcspRequestBuilder::new(&leaf, &pki.ca.certificate)
            .build()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_nonce_extension_present() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 5);

        let der = OcspRequestBuilder::new(&leaf, &pki.ca.certificate)
            .with_nonce(vec![0xAB; 16])
            .build()
            .unwrap();

        let outer = read_single(&der).unwrap();
        let tbs = outer.children().unwrap()[0].children().unwrap();
        assert_eq!(tbs.len(), 2);
        assert!(tbs[1].is_context(2));
        assert!(der.windows(16).any(|w| w == [0xAB; 16]));
    }

    #[test]
    fn test_signed_request_carries_signature_and_requestor() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 5);
        let signer = pki.request_signer();

        let der = OcspRequestBuilder::new(&leaf, &pki.ca.certificate)
            .with_signer(&signer)
            .build()
            .unwrap();

        let outer = read_single(&der).unwrap();
        let parts = outer.children().unwrap();
        assert_eq!(parts.len(), 2);

        let tbs = parts[0].children().unwrap();
        assert!(tbs[0].is_context(1), "requestorName present");

        assert!(parts[1].is_context(0));
        let signature = read_single(parts[1].content).unwrap().children().unwrap();
        let algo = signature[0].children().unwrap();
        assert_eq!(algo[0].oid_string().unwrap(), "1.2.840.10045.4.3.2");

        let sig_bytes = signature[1].bit_string().unwrap();
        let public_key = signer.certificate().public_key_bits();
        let key = signature::UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, public_key);
        assert!(key.verify(parts[0].raw, sig_bytes).is_ok());
    }

    #[test]
    fn test_signer_rejects_garbage_key() {
        let pki = TestPki::new();
        let result = RequestSigner::from_pkcs8(b"not a key", pki.ca.certificate.clone());
        assert!(matches!(result, Err(RevocationError::RequestError(_))));
    }
}
