//! Test PKI and signed OCSP response builder
//!
//! Available to this crate's tests and, through the `test-util` feature, to
//! downstream crates. Everything here panics on failure; it is fixture code.
//!
//! ```text
//! Test Root (self-signed)
//!   └─ Test CA
//!        ├─ Test OCSP Responder   (id-kp-OCSPSigning)
//!        └─ leaves issued on demand
//! Rogue Responder (self-signed, id-kp-OCSPSigning, unrelated to the CA)
//! ```

use crate::certificate::Certificate;
use crate::der::*;
use crate::request::{build_nonce_extension, CertId, CertIdHash, RequestSigner};
use crate::response::{CertificateStatus, OcspResponseStatus};
use chrono::{DateTime, Timelike, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, SerialNumber,
};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

const OID_PKIX_OCSP_BASIC: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1, 1];
const OID_ECDSA_SHA256: &[u64] = &[1, 2, 840, 10045, 4, 3, 2];

/// A certificate together with its private key
pub struct TestIdentity {
    pub certificate: Certificate,
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl TestIdentity {
    /// PKCS#8 DER encoding of the private key
    pub fn pkcs8(&self) -> Vec<u8> {
        self.key.serialize_der()
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let rng = SystemRandom::new();
        let key = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &self.pkcs8(), &rng)
            .expect("rcgen key is PKCS#8 P-256");
        key.sign(&rng, message)
            .expect("ECDSA signing")
            .as_ref()
            .to_vec()
    }
}

fn params(common_name: &str, serial: u64) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn.push(DnType::OrganizationName, "OCSP Cache Tests");
    params.distinguished_name = dn;

    let bytes = serial.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    params.serial_number = Some(SerialNumber::from_slice(&bytes[start..]));
    params
}

fn self_signed(params: CertificateParams) -> TestIdentity {
    let key = KeyPair::generate().expect("key generation");
    let cert = params.self_signed(&key).expect("self-signed certificate");
    identity(cert, key)
}

fn signed_by(params: CertificateParams, issuer: &TestIdentity) -> TestIdentity {
    let key = KeyPair::generate().expect("key generation");
    let cert = params
        .signed_by(&key, &issuer.cert, &issuer.key)
        .expect("issued certificate");
    identity(cert, key)
}

fn identity(cert: rcgen::Certificate, key: KeyPair) -> TestIdentity {
    let certificate = Certificate::from_der(cert.der().to_vec()).expect("rcgen emits valid DER");
    TestIdentity {
        certificate,
        cert,
        key,
    }
}

/// Small CA hierarchy with a delegated responder
pub struct TestPki {
    pub root: TestIdentity,
    pub ca: TestIdentity,
    pub responder: TestIdentity,
    pub rogue: TestIdentity,
}

impl TestPki {
    pub fn new() -> Self {
        let mut root_params = params("Test Root", 1);
        root_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let root = self_signed(root_params);

        let mut ca_params = params("Test CA", 2);
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        let ca = signed_by(ca_params, &root);

        let mut responder_params = params("Test OCSP Responder", 3);
        responder_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::OcspSigning];
        let responder = signed_by(responder_params, &ca);

        let mut rogue_params = params("Rogue Responder", 4);
        rogue_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::OcspSigning];
        let rogue = self_signed(rogue_params);

        Self {
            root,
            ca,
            responder,
            rogue,
        }
    }

    /// End-entity certificate issued by the CA
    pub fn issue_leaf(&self, common_name: &str, serial: u64) -> Certificate {
        self.issue_leaf_identity(common_name, serial).certificate
    }

    pub fn issue_leaf_with_pem(&self, common_name: &str, serial: u64) -> (Certificate, String) {
        let identity = self.issue_leaf_identity(common_name, serial);
        let pem = identity.pem();
        (identity.certificate, pem)
    }

    pub fn issue_leaf_identity(&self, common_name: &str, serial: u64) -> TestIdentity {
        signed_by(params(common_name, serial), &self.ca)
    }

    /// Signer for requests, backed by a CA-issued client certificate
    pub fn request_signer(&self) -> RequestSigner {
        let client = self.issue_leaf_identity("Test Requestor", 99);
        RequestSigner::from_pkcs8(&client.pkcs8(), client.certificate.clone())
            .expect("rcgen key is PKCS#8")
    }
}

impl Default for TestPki {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds DER OCSPResponse messages signed with test keys
pub struct ResponseBuilder<'a> {
    subject: &'a Certificate,
    issuer: &'a TestIdentity,
    signer: &'a TestIdentity,
    status: CertificateStatus,
    produced_at: DateTime<Utc>,
    this_update: Option<DateTime<Utc>>,
    next_update: Option<DateTime<Utc>>,
    hash: CertIdHash,
    responder_by_key: bool,
    embed_signer: bool,
    nonce: Option<Vec<u8>>,
    corrupt_signature: bool,
}

impl<'a> ResponseBuilder<'a> {
    /// Good status for `subject`, signed by `issuer`, produced now
    pub fn new(subject: &'a Certificate, issuer: &'a TestIdentity) -> Self {
        Self {
            subject,
            issuer,
            signer: issuer,
            status: CertificateStatus::Good,
            produced_at: Utc::now().with_nanosecond(0).unwrap_or_else(Utc::now),
            this_update: None,
            next_update: None,
            hash: CertIdHash::Sha1,
            responder_by_key: false,
            embed_signer: false,
            nonce: None,
            corrupt_signature: false,
        }
    }

    /// OCSPResponse with a non-successful status and no body
    pub fn error_response(status: OcspResponseStatus) -> Vec<u8> {
        der_sequence(&der_enumerated(status as u8))
    }

    pub fn status(mut self, status: CertificateStatus) -> Self {
        self.status = status;
        self
    }

    /// Also used as thisUpdate unless that is set separately
    pub fn produced_at(mut self, at: DateTime<Utc>) -> Self {
        self.produced_at = at;
        self
    }

    pub fn this_update(mut self, at: DateTime<Utc>) -> Self {
        self.this_update = Some(at);
        self
    }

    pub fn next_update(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.next_update = at;
        self
    }

    pub fn cert_id_hash(mut self, hash: CertIdHash) -> Self {
        self.hash = hash;
        self
    }

    pub fn signed_by(mut self, signer: &'a TestIdentity) -> Self {
        self.signer = signer;
        self
    }

    pub fn responder_by_key(mut self) -> Self {
        self.responder_by_key = true;
        self
    }

    pub fn embed_signer_certificate(mut self) -> Self {
        self.embed_signer = true;
        self
    }

    pub fn nonce(mut self, nonce: Vec<u8>) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn corrupt_signature(mut self) -> Self {
        self.corrupt_signature = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let tbs = self.tbs_response_data();

        let mut signature = self.signer.sign(&tbs);
        if self.corrupt_signature {
            if let Some(last) = signature.last_mut() {
                *last ^= 0xFF;
            }
        }

        let mut basic = tbs;
        basic.extend_from_slice(&der_sequence(&der_oid(OID_ECDSA_SHA256)));
        basic.extend_from_slice(&der_bit_string(&signature));
        if self.embed_signer {
            basic.extend_from_slice(&der_explicit_context(
                0,
                &der_sequence(self.signer.certificate.der()),
            ));
        }
        let basic = der_sequence(&basic);

        let mut response_bytes = der_oid(OID_PKIX_OCSP_BASIC);
        response_bytes.extend_from_slice(&der_octet_string(&basic));

        let mut response = der_enumerated(OcspResponseStatus::Successful as u8);
        response.extend_from_slice(&der_explicit_context(0, &der_sequence(&response_bytes)));
        der_sequence(&response)
    }

    fn tbs_response_data(&self) -> Vec<u8> {
        let mut tbs = if self.responder_by_key {
            let key_hash = CertIdHash::Sha1.digest(&self.signer.certificate.public_key_bits());
            der_explicit_context(2, &der_octet_string(&key_hash))
        } else {
            der_explicit_context(1, &self.signer.certificate.subject_name_der())
        };
        tbs.extend_from_slice(&der_generalized_time(self.produced_at));
        tbs.extend_from_slice(&der_sequence(&self.single_response()));
        if let Some(nonce) = &self.nonce {
            tbs.extend_from_slice(&der_explicit_context(1, &build_nonce_extension(nonce)));
        }
        der_sequence(&tbs)
    }

    fn single_response(&self) -> Vec<u8> {
        let mut single = CertId::for_pair(self.subject, &self.issuer.certificate, self.hash).to_der();

        single.extend_from_slice(&match &self.status {
            CertificateStatus::Good => der_implicit_context(0, &[]),
            CertificateStatus::Revoked {
                revocation_time,
                reason,
            } => {
                let mut info = der_generalized_time(*revocation_time);
                if let Some(reason) = reason {
                    info.extend_from_slice(&der_explicit_context(0, &der_enumerated(*reason)));
                }
                der_tlv(0xA1, &info)
            }
            CertificateStatus::Unknown => der_implicit_context(2, &[]),
        });

        single.extend_from_slice(&der_generalized_time(
            self.this_update.unwrap_or(self.produced_at),
        ));
        if let Some(next_update) = self.next_update {
            single.extend_from_slice(&der_explicit_context(0, &der_generalized_time(next_update)));
        }
        der_sequence(&single)
    }
}
