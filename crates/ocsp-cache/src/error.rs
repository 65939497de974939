//! Error types for transport, fetching and caching

use ocsp_proto::{CertificateFingerprint, RevocationError};
use thiserror::Error;

/// Failure of a single request/response exchange
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection to {uri} failed: {message}")]
    Connect { uri: String, message: String },

    #[error("Request to {uri} timed out after {timeout_ms}ms")]
    Timeout { uri: String, timeout_ms: u64 },

    #[error("Responder {uri} returned HTTP {status}")]
    HttpStatus { uri: String, status: u16 },

    #[error("Responder {uri} returned an empty body")]
    EmptyResponse { uri: String },

    #[error("Response from {uri} exceeds {limit} bytes")]
    ResponseTooLarge { uri: String, limit: usize },
}

/// Why one responder could not produce a usable proof
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Revocation(#[from] RevocationError),

    #[error("Response produced at {produced_at} is already stale")]
    Stale { produced_at: String },
}

/// One failed responder attempt, kept for the aggregate error
#[derive(Debug)]
pub struct AttemptFailure {
    pub uri: String,
    pub error: FetchError,
}

/// Errors surfaced by the cache, refresh coordinator and disk store
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persistence failed for {fingerprint}: {message}")]
    Persistence {
        fingerprint: CertificateFingerprint,
        message: String,
    },

    #[error("Proof for {actual} cannot be stored under {expected}")]
    FingerprintMismatch {
        expected: CertificateFingerprint,
        actual: CertificateFingerprint,
    },

    #[error("No OCSP responder URIs available for {0}")]
    NoResponders(String),

    #[error("All {} OCSP responders failed for {subject}", .attempts.len())]
    AllRespondersFailed {
        subject: String,
        attempts: Vec<AttemptFailure>,
    },

    #[error("Issuer of {0} is not a known certificate authority")]
    UnknownIssuer(String),

    #[error("Fetched proof for {0} is not fresh")]
    StaleProof(CertificateFingerprint),

    #[error("Refresh task for {0} did not complete")]
    TaskFailed(CertificateFingerprint),

    #[error(transparent)]
    Revocation(#[from] RevocationError),
}
