//! Validated revocation evidence

use crate::certificate::CertificateFingerprint;
use crate::error::RevocationError;
use crate::response::{CertificateStatus, SingleResponse};
use chrono::{DateTime, Utc};

/// A validated OCSP response for one certificate
///
/// Proofs are immutable and only come out of [`crate::OcspVerifier::validate`]
/// or [`crate::OcspVerifier::revalidate`], so holding one means the response
/// bytes were checked against the subject and a trusted responder. The status
/// is never `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationProof {
    fingerprint: CertificateFingerprint,
    serial: String,
    issuer: String,
    status: CertificateStatus,
    produced_at: DateTime<Utc>,
    this_update: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
    response: Vec<u8>,
}

impl RevocationProof {
    pub(crate) fn from_single(
        fingerprint: CertificateFingerprint,
        issuer: String,
        produced_at: DateTime<Utc>,
        single: &SingleResponse,
        response: Vec<u8>,
    ) -> Result<Self, RevocationError> {
        let serial = hex::encode(&single.cert_id.serial);
        if single.status == CertificateStatus::Unknown {
            return Err(RevocationError::StatusUnknown(serial));
        }
        Ok(Self {
            fingerprint,
            serial,
            issuer,
            status: single.status.clone(),
            produced_at,
            this_update: single.this_update,
            next_update: single.next_update,
            response,
        })
    }

    pub fn fingerprint(&self) -> &CertificateFingerprint {
        &self.fingerprint
    }

    /// Subject serial number as lowercase hex
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Issuing authority (issuer subject DN)
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn status(&self) -> &CertificateStatus {
        &self.status
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self.status, CertificateStatus::Revoked { .. })
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    pub fn this_update(&self) -> DateTime<Utc> {
        self.this_update
    }

    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.next_update
    }

    /// DER-encoded OCSPResponse as received from the responder
    pub fn response_der(&self) -> &[u8] {
        &self.response
    }
}
