//! Revocation-specific error types
//!
//! Errors raised while encoding OCSP requests, decoding responses and
//! validating them against a subject/issuer pair.

use crate::response::OcspResponseStatus;

/// Errors that can occur while building or validating OCSP exchanges
#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    /// Certificate could not be decoded
    #[error("Certificate parsing error: {0}")]
    CertificateError(String),

    /// Fingerprint string is not a lowercase hex SHA-256 digest
    #[error("Invalid certificate fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Request could not be encoded or signed
    #[error("Failed to build OCSP request: {0}")]
    RequestError(String),

    /// Response bytes are not a well-formed OCSPResponse
    #[error("Malformed OCSP response: {0}")]
    MalformedResponse(String),

    /// Responder refuses unsigned requests
    #[error("OCSP responder requires signed requests")]
    SignatureRequired,

    /// Responder answered with a non-successful responseStatus
    #[error("OCSP responder returned status {0:?}")]
    UnsuccessfulResponse(OcspResponseStatus),

    /// Response is well-formed but semantically unusable
    #[error("Invalid OCSP response: {0}")]
    InvalidResponse(String),

    /// Response signature is missing, unsupported or does not verify
    #[error("OCSP response signature invalid: {0}")]
    ResponderSignatureInvalid(String),

    /// Signer is not allowed to answer for the issuer
    #[error("OCSP responder '{responder}' is not authorized for issuer '{issuer}'")]
    UnauthorizedResponder { responder: String, issuer: String },

    /// No SingleResponse matches the requested certificate
    #[error("OCSP response does not apply to certificate serial={0}")]
    SubjectMismatch(String),

    /// Responder does not know the certificate
    #[error("OCSP responder reports unknown status for serial={0}")]
    StatusUnknown(String),
}
