//! OCSP response decoding
//!
//! ```asn1
//! OCSPResponse ::= SEQUENCE {
//!     responseStatus      OCSPResponseStatus,
//!     responseBytes       [0] EXPLICIT ResponseBytes OPTIONAL
//! }
//!
//! BasicOCSPResponse ::= SEQUENCE {
//!     tbsResponseData     ResponseData,
//!     signatureAlgorithm  AlgorithmIdentifier,
//!     signature           BIT STRING,
//!     certs               [0] EXPLICIT SEQUENCE OF Certificate OPTIONAL
//! }
//!
//! ResponseData ::= SEQUENCE {
//!     version             [0] EXPLICIT Version DEFAULT v1,
//!     responderID         ResponderID,
//!     producedAt          GeneralizedTime,
//!     responses           SEQUENCE OF SingleResponse,
//!     responseExtensions  [1] EXPLICIT Extensions OPTIONAL
//! }
//!
//! SingleResponse ::= SEQUENCE {
//!     certID              CertID,
//!     certStatus          CertStatus,
//!     thisUpdate          GeneralizedTime,
//!     nextUpdate          [0] EXPLICIT GeneralizedTime OPTIONAL,
//!     singleExtensions    [1] EXPLICIT Extensions OPTIONAL
//! }
//! ```
//!
//! Parsing is purely structural. Nothing here asserts that the response is
//! trustworthy; see [`crate::verifier`].

use crate::certificate::Certificate;
use crate::der::{read_single, Tlv};
use crate::error::RevocationError;
use crate::request::{CertId, CertIdHash};
use asn1_rs::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const OID_PKIX_OCSP_BASIC: &str = "1.3.6.1.5.5.7.48.1.1";
const OID_OCSP_NONCE: &str = "1.3.6.1.5.5.7.48.1.2";

/// OCSP response status (RFC 6960 Section 2.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcspResponseStatus {
    /// Response has valid confirmations
    Successful = 0,
    /// Illegal confirmation request
    MalformedRequest = 1,
    /// Internal error in issuer
    InternalError = 2,
    /// Try again later
    TryLater = 3,
    /// Must sign the request
    SigRequired = 5,
    /// Request unauthorized
    Unauthorized = 6,
}

impl OcspResponseStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Successful),
            1 => Some(Self::MalformedRequest),
            2 => Some(Self::InternalError),
            3 => Some(Self::TryLater),
            5 => Some(Self::SigRequired),
            6 => Some(Self::Unauthorized),
            _ => None,
        }
    }
}

/// Certificate status in a SingleResponse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CertificateStatus {
    Good,
    Revoked {
        revocation_time: DateTime<Utc>,
        /// CRLReason code, if present
        reason: Option<u8>,
    },
    Unknown,
}

/// How the responder identifies its signing certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderId {
    /// DER encoding of the responder's subject Name
    ByName(Vec<u8>),
    /// SHA-1 of the responder's subjectPublicKey BIT STRING contents
    ByKey(Vec<u8>),
}

/// One certificate's status entry
#[derive(Debug, Clone)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub status: CertificateStatus,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

/// Decoded BasicOCSPResponse
#[derive(Debug, Clone)]
pub struct BasicResponse {
    /// Exact encoding of tbsResponseData, the signed bytes
    pub tbs_response_data: Vec<u8>,
    pub responder_id: ResponderId,
    pub produced_at: DateTime<Utc>,
    pub responses: Vec<SingleResponse>,
    pub nonce: Option<Vec<u8>>,
    /// Dotted OID of the signature algorithm
    pub signature_algorithm: String,
    pub signature: Vec<u8>,
    /// Certificates the responder chose to embed
    pub certs: Vec<Certificate>,
}

impl BasicResponse {
    /// The SingleResponse whose CertID equals `cert_id`
    pub fn find(&self, cert_id: &CertId) -> Option<&SingleResponse> {
        self.responses.iter().find(|r| r.cert_id == *cert_id)
    }
}

/// Parsed OCSP response
#[derive(Debug, Clone)]
pub struct OcspResponse {
    pub status: OcspResponseStatus,
    /// Present only when `status` is `Successful`
    pub basic: Option<BasicResponse>,
    /// Raw response bytes, kept for persistence
    pub raw_bytes: Vec<u8>,
}

impl OcspResponse {
    /// Parse an OCSP response from DER-encoded bytes
    pub fn parse(der_bytes: &[u8]) -> Result<Self, RevocationError> {
        if der_bytes.is_empty() {
            return Err(RevocationError::MalformedResponse(
                "empty response body".to_string(),
            ));
        }

        let outer = read_single(der_bytes)?.expect(Tag::Sequence, "OCSPResponse")?;
        let fields = outer.children()?;

        let status_tlv = fields
            .first()
            .ok_or_else(|| malformed("OCSP response SEQUENCE is empty"))?
            .expect(Tag::Enumerated, "responseStatus")?;
        let status_value = match status_tlv.content {
            [value] => *value,
            _ => return Err(malformed("responseStatus is not a single byte")),
        };
        let status = OcspResponseStatus::from_u8(status_value).ok_or_else(|| {
            RevocationError::MalformedResponse(format!(
                "Unknown OCSP response status: {}",
                status_value
            ))
        })?;

        if status != OcspResponseStatus::Successful {
            return Ok(Self {
                status,
                basic: None,
                raw_bytes: der_bytes.to_vec(),
            });
        }

        let response_bytes = fields
            .get(1)
            .filter(|tlv| tlv.is_context(0))
            .ok_or_else(|| malformed("OCSP response missing responseBytes"))?;
        let response_bytes = read_single(response_bytes.content)?
            .expect(Tag::Sequence, "ResponseBytes")?
            .children()?;
        if response_bytes.len() != 2 {
            return Err(malformed("ResponseBytes must have two elements"));
        }

        let response_type = response_bytes[0].oid_string()?;
        if response_type != OID_PKIX_OCSP_BASIC {
            return Err(RevocationError::MalformedResponse(format!(
                "Unsupported OCSP response type: {}",
                response_type
            )));
        }
        let basic_der = response_bytes[1]
            .expect(Tag::OctetString, "response")?
            .content;

        Ok(Self {
            status,
            basic: Some(parse_basic_response(basic_der)?),
            raw_bytes: der_bytes.to_vec(),
        })
    }

    /// Reject a response that echoes a nonce other than the one sent
    ///
    /// Responders serving pre-produced responses omit the nonce; that is
    /// accepted.
    pub fn check_nonce(&self, expected: &[u8]) -> Result<(), RevocationError> {
        match self.basic.as_ref().and_then(|b| b.nonce.as_deref()) {
            Some(nonce) if nonce != expected => Err(RevocationError::InvalidResponse(
                "response nonce does not match request nonce".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn malformed(message: &str) -> RevocationError {
    RevocationError::MalformedResponse(message.to_string())
}

fn parse_basic_response(der: &[u8]) -> Result<BasicResponse, RevocationError> {
    let basic = read_single(der)?
        .expect(Tag::Sequence, "BasicOCSPResponse")?
        .children()?;
    if basic.len() < 3 {
        return Err(malformed("BasicOCSPResponse SEQUENCE too short"));
    }

    let tbs = basic[0].expect(Tag::Sequence, "tbsResponseData")?;
    let signature_algorithm = basic[1]
        .expect(Tag::Sequence, "signatureAlgorithm")?
        .children()?
        .first()
        .ok_or_else(|| malformed("signatureAlgorithm is empty"))?
        .oid_string()?;
    let signature = basic[2].bit_string()?.to_vec();

    let mut certs = Vec::new();
    if let Some(certs_tlv) = basic.get(3).filter(|tlv| tlv.is_context(0)) {
        let list = read_single(certs_tlv.content)?.expect(Tag::Sequence, "certs")?;
        for cert in list.children()? {
            certs.push(Certificate::from_der(cert.raw.to_vec()).map_err(|e| {
                RevocationError::MalformedResponse(format!("embedded certificate: {}", e))
            })?);
        }
    }

    let data = tbs.children()?;
    let mut idx = 0;

    // version [0] EXPLICIT, default v1
    if data.get(idx).is_some_and(|tlv| tlv.is_context(0)) {
        idx += 1;
    }

    let responder_id = parse_responder_id(
        data.get(idx)
            .ok_or_else(|| malformed("ResponseData missing responderID"))?,
    )?;
    idx += 1;

    let produced_at = data
        .get(idx)
        .ok_or_else(|| malformed("ResponseData missing producedAt"))?
        .generalized_time()?;
    idx += 1;

    let responses_tlv = data
        .get(idx)
        .ok_or_else(|| malformed("ResponseData missing responses"))?
        .expect(Tag::Sequence, "responses")?;
    let responses = responses_tlv
        .children()?
        .iter()
        .map(parse_single_response)
        .collect::<Result<Vec<_>, _>>()?;
    if responses.is_empty() {
        return Err(malformed("No SingleResponse in OCSP response"));
    }
    idx += 1;

    let mut nonce = None;
    if let Some(exts) = data.get(idx).filter(|tlv| tlv.is_context(1)) {
        nonce = extract_nonce(&read_single(exts.content)?)?;
    }

    Ok(BasicResponse {
        tbs_response_data: tbs.raw.to_vec(),
        responder_id,
        produced_at,
        responses,
        nonce,
        signature_algorithm,
        signature,
        certs,
    })
}

/// ```asn1
/// ResponderID ::= CHOICE {
///     byName   [1] Name,
///     byKey    [2] KeyHash
/// }
/// ```
fn parse_responder_id(tlv: &Tlv<'_>) -> Result<ResponderId, RevocationError> {
    if tlv.is_context(1) {
        let name = read_single(tlv.content)?.expect(Tag::Sequence, "responderID byName")?;
        Ok(ResponderId::ByName(name.raw.to_vec()))
    } else if tlv.is_context(2) {
        let key_hash = read_single(tlv.content)?.expect(Tag::OctetString, "responderID byKey")?;
        Ok(ResponderId::ByKey(key_hash.content.to_vec()))
    } else {
        Err(malformed("responderID is neither byName nor byKey"))
    }
}

fn parse_single_response(tlv: &Tlv<'_>) -> Result<SingleResponse, RevocationError> {
    let fields = tlv.expect(Tag::Sequence, "SingleResponse")?.children()?;
    if fields.len() < 3 {
        return Err(malformed("SingleResponse SEQUENCE too short"));
    }

    let cert_id = parse_cert_id(&fields[0])?;
    let status = parse_cert_status(&fields[1])?;
    let this_update = fields[2].generalized_time()?;

    let next_update = match fields.get(3).filter(|tlv| tlv.is_context(0)) {
        Some(wrapper) => Some(read_single(wrapper.content)?.generalized_time()?),
        None => None,
    };

    Ok(SingleResponse {
        cert_id,
        status,
        this_update,
        next_update,
    })
}

fn parse_cert_id(tlv: &Tlv<'_>) -> Result<CertId, RevocationError> {
    let fields = tlv.expect(Tag::Sequence, "CertID")?.children()?;
    if fields.len() != 4 {
        return Err(malformed("CertID must have four elements"));
    }

    let algorithm = fields[0]
        .expect(Tag::Sequence, "hashAlgorithm")?
        .children()?
        .first()
        .ok_or_else(|| malformed("hashAlgorithm is empty"))?
        .oid_string()?;
    let hash = CertIdHash::from_oid(&algorithm).ok_or_else(|| {
        RevocationError::MalformedResponse(format!("Unsupported CertID hash: {}", algorithm))
    })?;

    Ok(CertId {
        hash,
        issuer_name_hash: fields[1].expect(Tag::OctetString, "issuerNameHash")?.content.to_vec(),
        issuer_key_hash: fields[2].expect(Tag::OctetString, "issuerKeyHash")?.content.to_vec(),
        serial: fields[3].expect(Tag::Integer, "serialNumber")?.content.to_vec(),
    })
}

/// ```asn1
/// CertStatus ::= CHOICE {
///     good        [0] IMPLICIT NULL,
///     revoked     [1] IMPLICIT RevokedInfo,
///     unknown     [2] IMPLICIT UnknownInfo
/// }
///
/// RevokedInfo ::= SEQUENCE {
///     revocationTime      GeneralizedTime,
///     revocationReason    [0] EXPLICIT CRLReason OPTIONAL
/// }
/// ```
fn parse_cert_status(tlv: &Tlv<'_>) -> Result<CertificateStatus, RevocationError> {
    if tlv.is_context(0) {
        Ok(CertificateStatus::Good)
    } else if tlv.is_context(1) {
        // IMPLICIT tagging: the content octets are RevokedInfo's fields
        let fields = tlv.children()?;
        let revocation_time = fields
            .first()
            .ok_or_else(|| malformed("RevokedInfo is empty"))?
            .generalized_time()?;

        let reason = match fields.get(1).filter(|f| f.is_context(0)) {
            Some(wrapper) => {
                let reason = read_single(wrapper.content)?.expect(Tag::Enumerated, "CRLReason")?;
                reason.content.last().copied()
            }
            None => None,
        };

        Ok(CertificateStatus::Revoked {
            revocation_time,
            reason,
        })
    } else if tlv.is_context(2) {
        Ok(CertificateStatus::Unknown)
    } else {
        Err(RevocationError::MalformedResponse(format!(
            "Unknown CertStatus tag: {:?}/{}",
            tlv.class, tlv.tag
        )))
    }
}

/// Find the nonce in an `Extensions` SEQUENCE
fn extract_nonce(extensions: &Tlv<'_>) -> Result<Option<Vec<u8>>, RevocationError> {
    for ext in extensions.expect(Tag::Sequence, "responseExtensions")?.children()? {
        let fields = ext.expect(Tag::Sequence, "Extension")?.children()?;
        let (Some(id), Some(value)) = (fields.first(), fields.last()) else {
            continue;
        };
        if id.oid_string()? != OID_OCSP_NONCE {
            continue;
        }

        // extnValue is an OCTET STRING wrapping the nonce OCTET STRING
        let outer = value.expect(Tag::OctetString, "nonce extnValue")?;
        let nonce = match read_single(outer.content) {
            Ok(inner) if inner.is_universal(Tag::OctetString) => inner.content.to_vec(),
            _ => outer.content.to_vec(),
        };
        return Ok(Some(nonce));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ResponseBuilder, TestPki};
    use chrono::{Duration, Timelike};

    fn now() -> DateTime<Utc> {
        Utc::now().with_nanosecond(0).unwrap()
    }

    #[test]
    fn test_parse_good_response() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 11);
        let produced = now();

        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .produced_at(produced)
            .next_update(Some(produced + Duration::hours(4)))
            .build();

        let response = OcspResponse::parse(&der).unwrap();
        assert_eq!(response.status, OcspResponseStatus::Successful);
        assert_eq!(response.raw_bytes, der);

        let basic = response.basic.unwrap();
        assert_eq!(basic.produced_at, produced);
        assert_eq!(basic.signature_algorithm, "1.2.840.10045.4.3.2");
        assert!(matches!(basic.responder_id, ResponderId::ByName(_)));

        let single = &basic.responses[0];
        assert_eq!(single.status, CertificateStatus::Good);
        assert_eq!(single.cert_id.serial, vec![11]);
        assert_eq!(single.next_update, Some(produced + Duration::hours(4)));
    }

    #[test]
    fn test_parse_revoked_with_reason() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 12);
        let revoked_at = now() - Duration::days(2);

        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .status(CertificateStatus::Revoked {
                revocation_time: revoked_at,
                reason: Some(1),
            })
            .build();

        let basic = OcspResponse::parse(&der).unwrap().basic.unwrap();
        assert_eq!(
            basic.responses[0].status,
            CertificateStatus::Revoked {
                revocation_time: revoked_at,
                reason: Some(1)
            }
        );
    }

    #[test]
    fn test_parse_responder_by_key_and_embedded_certs() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 13);

        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .signed_by(&pki.responder)
            .responder_by_key()
            .embed_signer_certificate()
            .build();

        let basic = OcspResponse::parse(&der).unwrap().basic.unwrap();
        assert!(matches!(basic.responder_id, ResponderId::ByKey(ref h) if h.len() == 20));
        assert_eq!(basic.certs, vec![pki.responder.certificate.clone()]);
    }

    #[test]
    fn test_parse_non_successful_status() {
        let der = ResponseBuilder::error_response(OcspResponseStatus::SigRequired);
        let response = OcspResponse::parse(&der).unwrap();
        assert_eq!(response.status, OcspResponseStatus::SigRequired);
        assert!(response.basic.is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            OcspResponse::parse(&[]),
            Err(RevocationError::MalformedResponse(_))
        ));
        assert!(matches!(
            OcspResponse::parse(b"<html>502 Bad Gateway</html>"),
            Err(RevocationError::MalformedResponse(_))
        ));
        // SEQUENCE { ENUMERATED 4 }: status value 4 is unassigned
        assert!(OcspResponse::parse(&[0x30, 0x03, 0x0A, 0x01, 0x04]).is_err());
    }

    #[test]
    fn test_nonce_check() {
        let pki = TestPki::new();
        let leaf = pki.issue_leaf("leaf.example", 14);

        let der = ResponseBuilder::new(&leaf, &pki.ca)
            .nonce(vec![1, 2, 3, 4])
            .build();
        let response = OcspResponse::parse(&der).unwrap();
        assert_eq!(
            response.basic.as_ref().unwrap().nonce.as_deref(),
            Some(&[1u8, 2, 3, 4][..])
        );
        assert!(response.check_nonce(&[1, 2, 3, 4]).is_ok());
        assert!(matches!(
            response.check_nonce(&[9, 9]),
            Err(RevocationError::InvalidResponse(_))
        ));

        let without = OcspResponse::parse(&ResponseBuilder::new(&leaf, &pki.ca).build()).unwrap();
        assert!(without.check_nonce(&[9, 9]).is_ok());
    }
}
