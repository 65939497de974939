//! OCSP response validation
//!
//! Turns a parsed [`OcspResponse`] into a [`RevocationProof`] for one
//! subject/issuer pair. Checks run in this order:
//!
//! | Step | Check                                             | Error                        |
//! |------|---------------------------------------------------|------------------------------|
//! | 1    | `responseStatus` is `successful`                  | `SignatureRequired`, `UnsuccessfulResponse` |
//! | 2    | a SingleResponse carries the subject's CertID     | `SubjectMismatch`            |
//! | 3    | the ResponderID resolves to a known certificate   | `ResponderSignatureInvalid`  |
//! | 4    | tbsResponseData signature verifies                | `ResponderSignatureInvalid`  |
//! | 5    | the signer may answer for this issuer             | `UnauthorizedResponder`      |
//! | 6    | status is `good` or `revoked`                     | `StatusUnknown`              |
//!
//! A signer is authorized when it is one of the configured responder
//! certificates, when it is the issuer itself, or when the issuer signed it
//! and it carries id-kp-OCSPSigning (RFC 6960 Section 4.2.2.2).
//! Freshness is not judged here.

use crate::certificate::{Certificate, CertificateFingerprint};
use crate::error::RevocationError;
use crate::proof::RevocationProof;
use crate::request::{CertId, CertIdHash};
use crate::response::{BasicResponse, OcspResponse, OcspResponseStatus, ResponderId};
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};

/// Validates responses against a set of configured responder certificates
#[derive(Debug, Clone, Default)]
pub struct OcspVerifier {
    trusted_responders: Vec<Certificate>,
}

impl OcspVerifier {
    pub fn new(trusted_responders: Vec<Certificate>) -> Self {
        Self { trusted_responders }
    }

    pub fn validate(
        &self,
        response: &OcspResponse,
        subject: &Certificate,
        issuer: &Certificate,
    ) -> Result<RevocationProof, RevocationError> {
        self.validate_serial(response, subject.fingerprint(), subject.raw_serial(), issuer)
    }

    /// Re-run every check on response bytes kept from an earlier validation
    ///
    /// The subject is known only by its fingerprint and serial (hex content
    /// octets), so the CertID is rebuilt from the serial and `issuer`.
    pub fn revalidate(
        &self,
        response_der: &[u8],
        fingerprint: &CertificateFingerprint,
        serial_hex: &str,
        issuer: &Certificate,
    ) -> Result<RevocationProof, RevocationError> {
        let serial = hex::decode(serial_hex).map_err(|e| {
            RevocationError::InvalidResponse(format!("stored serial '{}': {}", serial_hex, e))
        })?;
        let response = OcspResponse::parse(response_der)?;
        self.validate_serial(&response, fingerprint, serial, issuer)
    }

    fn validate_serial(
        &self,
        response: &OcspResponse,
        fingerprint: &CertificateFingerprint,
        serial: Vec<u8>,
        issuer: &Certificate,
    ) -> Result<RevocationProof, RevocationError> {
        match response.status {
            OcspResponseStatus::Successful => {}
            OcspResponseStatus::SigRequired => return Err(RevocationError::SignatureRequired),
            other => return Err(RevocationError::UnsuccessfulResponse(other)),
        }

        let basic = response.basic.as_ref().ok_or_else(|| {
            RevocationError::InvalidResponse("successful response without body".to_string())
        })?;

        let single = [CertIdHash::Sha1, CertIdHash::Sha256]
            .into_iter()
            .filter(|hash| basic.responses.iter().any(|r| r.cert_id.hash == *hash))
            .find_map(|hash| basic.find(&CertId::for_serial(serial.clone(), issuer, hash)))
            .ok_or_else(|| RevocationError::SubjectMismatch(hex::encode(&serial)))?;

        let signer = self.find_signer(basic, issuer).ok_or_else(|| {
            RevocationError::ResponderSignatureInvalid(
                "could not find responder certificate".to_string(),
            )
        })?;

        verify_signature(
            &basic.signature_algorithm,
            &signer.public_key_bits(),
            &basic.tbs_response_data,
            &basic.signature,
        )?;

        if !self.is_authorized(signer, issuer) {
            return Err(RevocationError::UnauthorizedResponder {
                responder: signer.subject_name(),
                issuer: issuer.subject_name(),
            });
        }

        RevocationProof::from_single(
            fingerprint.clone(),
            issuer.subject_name(),
            basic.produced_at,
            single,
            response.raw_bytes.clone(),
        )
    }

    /// Locate the certificate named by the ResponderID
    ///
    /// Embedded certificates are searched first, then configured responders,
    /// then the issuer.
    fn find_signer<'a>(
        &'a self,
        basic: &'a BasicResponse,
        issuer: &'a Certificate,
    ) -> Option<&'a Certificate> {
        basic
            .certs
            .iter()
            .chain(self.trusted_responders.iter())
            .chain(std::iter::once(issuer))
            .find(|cert| responder_id_matches(&basic.responder_id, cert))
    }

    fn is_authorized(&self, signer: &Certificate, issuer: &Certificate) -> bool {
        if self
            .trusted_responders
            .iter()
            .any(|trusted| trusted.fingerprint() == signer.fingerprint())
        {
            return true;
        }
        if signer.fingerprint() == issuer.fingerprint() {
            return true;
        }
        signer.is_issued_by(issuer) && signer.has_ocsp_signing_usage()
    }
}

fn responder_id_matches(id: &ResponderId, cert: &Certificate) -> bool {
    match id {
        ResponderId::ByName(name) => cert.subject_name_der() == *name,
        ResponderId::ByKey(hash) => CertIdHash::Sha1.digest(&cert.public_key_bits()) == *hash,
    }
}

type Algorithm = &'static dyn VerificationAlgorithm;

/// Candidate ring algorithms for a signature OID
///
/// ECDSA OIDs name only the digest, so both curves are tried.
fn algorithms_for(oid: &str) -> Vec<Algorithm> {
    match oid {
        "1.2.840.113549.1.1.5" => {
            vec![&signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY as Algorithm]
        }
        "1.2.840.113549.1.1.11" => vec![&signature::RSA_PKCS1_2048_8192_SHA256 as Algorithm],
        "1.2.840.113549.1.1.12" => vec![&signature::RSA_PKCS1_2048_8192_SHA384 as Algorithm],
        "1.2.840.113549.1.1.13" => vec![&signature::RSA_PKCS1_2048_8192_SHA512 as Algorithm],
        "1.2.840.10045.4.3.2" => vec![
            &signature::ECDSA_P256_SHA256_ASN1 as Algorithm,
            &signature::ECDSA_P384_SHA256_ASN1,
        ],
        "1.2.840.10045.4.3.3" => vec![
            &signature::ECDSA_P384_SHA384_ASN1 as Algorithm,
            &signature::ECDSA_P256_SHA384_ASN1,
        ],
        "1.3.101.112" => vec![&signature::ED25519 as Algorithm],
        _ => Vec::new(),
    }
}

pub(crate) fn verify_signature(
    algorithm_oid: &str,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), RevocationError> {
    let algorithms = algorithms_for(algorithm_oid);
    if algorithms.is_empty() {
        return Err(RevocationError::ResponderSignatureInvalid(format!(
            "unsupported signature algorithm {}",
            algorithm_oid
        )));
    }

    let verified = algorithms.iter().any(|algorithm| {
        UnparsedPublicKey::new(*algorithm, public_key)
            .verify(message, signature)
            .is_ok()
    });
    if verified {
        Ok(())
    } else {
        Err(RevocationError::ResponderSignatureInvalid(
            "signature does not verify with responder key".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::CertificateStatus;
    use crate::testing::{ResponseBuilder, TestPki};
    use chrono::{Duration, Utc};

    fn validate(
        verifier: &OcspVerifier,
        der: &[u8],
        subject: &Certificate,
        issuer: &Certificate,
    ) -> Result<RevocationProof, RevocationError> {
        verifier.validate(&OcspResponse::parse(der)?, subject, issuer)
    }

    #[test]
    fn test_issuer_signed_good_response() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 31);
        let produced = Utc::now();
        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .produced_at(produced)
            .next_update(Some(produced + Duration::hours(1)))
            .build();

        let proof = validate(&OcspVerifier::default(), &der, &leaf, &pki.ca.certificate).unwrap();
        assert_eq!(proof.fingerprint(), leaf.fingerprint());
        assert_eq!(proof.status(), &CertificateStatus::Good);
        assert_eq!(proof.issuer(), pki.ca.certificate.subject_name());
        assert_eq!(proof.response_der(), der.as_slice());
        assert!(proof.next_update().is_some());
    }

    #[test]
    fn test_delegated_responder_with_eku() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 32);
        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .signed_by(&pki.responder)
            .embed_signer_certificate()
            .build();

        let proof = validate(&OcspVerifier::default(), &der, &leaf, &pki.ca.certificate).unwrap();
        assert!(!proof.is_revoked());
    }

    #[test]
    fn test_delegated_responder_by_key_from_configuration() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 33);
        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .signed_by(&pki.rogue)
            .responder_by_key()
            .build();

        // Unknown signer without configuration
        assert!(matches!(
            validate(&OcspVerifier::default(), &der, &leaf, &pki.ca.certificate),
            Err(RevocationError::ResponderSignatureInvalid(_))
        ));

        // Explicitly configured responder is trusted even without an issuer link
        let verifier = OcspVerifier::new(vec![pki.rogue.certificate.clone()]);
        assert!(validate(&verifier, &der, &leaf, &pki.ca.certificate).is_ok());
    }

    #[test]
    fn test_unauthorized_embedded_signer() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 34);
        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .signed_by(&pki.rogue)
            .embed_signer_certificate()
            .build();

        assert!(matches!(
            validate(&OcspVerifier::default(), &der, &leaf, &pki.ca.certificate),
            Err(RevocationError::UnauthorizedResponder { .. })
        ));
    }

    #[test]
    fn test_tampered_signature() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 35);
        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .corrupt_signature()
            .build();

        assert!(matches!(
            validate(&OcspVerifier::default(), &der, &leaf, &pki.ca.certificate),
            Err(RevocationError::ResponderSignatureInvalid(_))
        ));
    }

    #[test]
    fn test_response_for_other_certificate() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 36);
        let other = pki.issue_leaf("other.example", 37);
        let der = ResponseBuilder::new(&other, &pki.ca).build();

        assert!(matches!(
            validate(&OcspVerifier::default(), &der, &leaf, &pki.ca.certificate),
            Err(RevocationError::SubjectMismatch(_))
        ));
    }

    #[test]
    fn test_response_for_other_issuer() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 38);
        let der = ResponseBuilder::new(&leaf, &pki.ca).build();

        // Same serial, but the CertID hashes name the intermediate CA
        assert!(matches!(
            validate(&OcspVerifier::default(), &der, &leaf, &pki.root.certificate),
            Err(RevocationError::SubjectMismatch(_))
        ));
    }

    #[test]
    fn test_sha256_cert_id_accepted() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 39);
        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .cert_id_hash(CertIdHash::Sha256)
            .build();

        assert!(validate(&OcspVerifier::default(), &der, &leaf, &pki.ca.certificate).is_ok());
    }

    #[test]
    fn test_unknown_status_and_revoked() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 40);

        let unknown = ResponseBuilder::new(&leaf, &pki.ca)
            .status(CertificateStatus::Unknown)
            .build();
        assert!(matches!(
            validate(&OcspVerifier::default(), &unknown, &leaf, &pki.ca.certificate),
            Err(RevocationError::StatusUnknown(_))
        ));

        let revoked = ResponseBuilder::new(&leaf, &pki.ca)
            .status(CertificateStatus::Revoked {
                revocation_time: Utc::now() - Duration::days(1),
                reason: None,
            })
            .build();
        let proof =
            validate(&OcspVerifier::default(), &revoked, &leaf, &pki.ca.certificate).unwrap();
        assert!(proof.is_revoked());
    }

    #[test]
    fn test_error_statuses_are_distinct() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 41);

        let sig_required = ResponseBuilder::error_response(OcspResponseStatus::SigRequired);
        assert!(matches!(
            validate(&OcspVerifier::default(), &sig_required, &leaf, &pki.ca.certificate),
            Err(RevocationError::SignatureRequired)
        ));

        let try_later = ResponseBuilder::error_response(OcspResponseStatus::TryLater);
        assert!(matches!(
            validate(&OcspVerifier::default(), &try_later, &leaf, &pki.ca.certificate),
            Err(RevocationError::UnsuccessfulResponse(OcspResponseStatus::TryLater))
        ));
    }

    #[test]
    fn test_fingerprint_comes_from_subject() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 42);
        let der = ResponseBuilder::new(&leaf, &pki.ca).build();

        let proof = validate(&OcspVerifier::default(), &der, &leaf, &pki.ca.certificate).unwrap();
        assert_eq!(proof.fingerprint(), &CertificateFingerprint::of_der(leaf.der()));
    }

    #[test]
    fn test_revalidate_matches_validate() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 43);
        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .next_update(Some(Utc::now() + Duration::hours(1)))
            .build();

        let validated = validate(&OcspVerifier::default(), &der, &leaf, &pki.ca.certificate).unwrap();
        let revalidated = OcspVerifier::default()
            .revalidate(
                validated.response_der(),
                validated.fingerprint(),
                validated.serial(),
                &pki.ca.certificate,
            )
            .unwrap();
        assert_eq!(revalidated, validated);
    }

    #[test]
    fn test_revalidate_rejects_forged_bytes() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 44);
        let serial = leaf.serial_hex();

        let corrupted = ResponseBuilder::new(&leaf, &pki.ca)
            .signed_by(&pki.rogue)
            .corrupt_signature()
            .build();
        assert!(matches!(
            OcspVerifier::default().revalidate(&corrupted, leaf.fingerprint(), &serial, &pki.ca.certificate),
            Err(RevocationError::ResponderSignatureInvalid(_))
        ));

        let rogue = ResponseBuilder::new(&leaf, &pki.ca)
            .signed_by(&pki.rogue)
            .embed_signer_certificate()
            .build();
        assert!(matches!(
            OcspVerifier::default().revalidate(&rogue, leaf.fingerprint(), &serial, &pki.ca.certificate),
            Err(RevocationError::UnauthorizedResponder { .. })
        ));
    }

    #[test]
    fn test_revalidate_rejects_wrong_serial_and_issuer() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 45);
        let der = ResponseBuilder::new(&leaf, &pki.ca).build();
        let verifier = OcspVerifier::default();

        assert!(matches!(
            verifier.revalidate(&der, leaf.fingerprint(), "ff", &pki.ca.certificate),
            Err(RevocationError::SubjectMismatch(_))
        ));
        assert!(matches!(
            verifier.revalidate(&der, leaf.fingerprint(), &leaf.serial_hex(), &pki.root.certificate),
            Err(RevocationError::SubjectMismatch(_))
        ));
        assert!(matches!(
            verifier.revalidate(&der, leaf.fingerprint(), "not hex", &pki.ca.certificate),
            Err(RevocationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_unsupported_algorithm() {
        assert!(matches!(
            verify_signature("1.2.3.4", &[], b"msg", b"sig"),
            Err(RevocationError::ResponderSignatureInvalid(_))
        ));
    }
}
