//! OCSP protocol support - RFC 6960
//!
//! This crate is the I/O-free half of the OCSP status cache. It knows how to
//! identify certificates, encode requests, decode responses and decide
//! whether a response is trustworthy evidence for one certificate.
//!
//! # Quick Start
//!
//! ```no_run
//! use ocsp_proto::{Certificate, OcspRequestBuilder, OcspResponse, OcspVerifier};
//!
//! # fn fetch(_: &[u8]) -> Vec<u8> { Vec::new() }
//! # fn example(subject_der: Vec<u8>, issuer_der: Vec<u8>) -> Result<(), ocsp_proto::RevocationError> {
//! let subject = Certificate::from_der(subject_der)?;
//! let issuer = Certificate::from_der(issuer_der)?;
//!
//! let request = OcspRequestBuilder::new(&subject, &issuer).build()?;
//! let response = OcspResponse::parse(&fetch(&request))?;
//! let proof = OcspVerifier::default().validate(&response, &subject, &issuer)?;
//! println!("{} is revoked: {}", proof.fingerprint(), proof.is_revoked());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module        | Purpose                                               |
//! |---------------|-------------------------------------------------------|
//! | `certificate` | Fingerprints and the owned certificate wrapper        |
//! | `request`     | OCSPRequest encoding, CertID, request signing          |
//! | `response`    | Structural OCSPResponse decoding                       |
//! | `verifier`    | Subject matching, signature and authorization checks   |
//! | `proof`       | The validated, immutable [`RevocationProof`]           |

pub mod certificate;
mod der;
pub mod error;
pub mod proof;
pub mod request;
pub mod response;
pub mod verifier;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use certificate::{Certificate, CertificateFingerprint};
pub use error::RevocationError;
pub use proof::RevocationProof;
pub use request::{CertId, CertIdHash, OcspRequestBuilder, RequestSigner};
pub use response::{
    BasicResponse, CertificateStatus, OcspResponse, OcspResponseStatus, ResponderId,
    SingleResponse,
};
pub use verifier::OcspVerifier;
