//! Trust configuration seam
//!
//! The cache never decides on its own which authorities exist or where their
//! responders live. It asks a [`TrustConfiguration`]. The
//! [`StaticTrustConfiguration`] implementation is loaded from the service
//! config file.

use crate::config::{Config, ConfigError, SignerConfig};
use crate::error::CacheError;
use chrono::TimeDelta;
use ocsp_proto::{Certificate, RequestSigner};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

const MAX_CHAIN_DEPTH: usize = 16;

/// One responder URI with its failover preference (lower is tried first)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponderEndpoint {
    pub uri: String,
    pub preference: u32,
}

impl ResponderEndpoint {
    pub fn new(uri: impl Into<String>, preference: u32) -> Self {
        Self {
            uri: uri.into(),
            preference,
        }
    }

    /// Endpoints preferred in the order the URIs are listed
    pub fn ordered(uris: &[String]) -> Vec<Self> {
        uris.iter()
            .enumerate()
            .map(|(i, uri)| Self::new(uri.clone(), i as u32))
            .collect()
    }
}

/// Stable sort by preference; equal preferences keep their listed order
pub fn sort_by_preference(endpoints: &mut [ResponderEndpoint]) {
    endpoints.sort_by_key(|endpoint| endpoint.preference);
}

/// Responder URIs configured for one authority, keyed by its subject DN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityResponders {
    pub authority: String,
    pub responders: Vec<String>,
}

/// Source of CA, responder and freshness facts
pub trait TrustConfiguration: Send + Sync {
    /// The configured CA certificate that issued `certificate`
    fn issuer_of(&self, certificate: &Certificate) -> Option<Certificate>;

    /// Responders able to answer for certificates issued by `issuer`
    fn responder_endpoints(&self, issuer: &Certificate) -> Vec<ResponderEndpoint>;

    /// Delegated responder certificates trusted for `issuer`
    fn responder_certificates(&self, issuer: &Certificate) -> Vec<Certificate>;

    /// Every authority with its responder URIs
    fn authorities(&self) -> Vec<AuthorityResponders>;

    /// Configured CAs whose subject DN is `subject_name`
    fn authorities_named(&self, subject_name: &str) -> Vec<Certificate>;

    fn freshness_window(&self) -> TimeDelta;

    fn verify_next_update(&self) -> bool;

    /// `certificate` followed by its intermediate CAs, without the trust anchor
    ///
    /// The walk stops at a self-signed root or at a configured CA whose own
    /// issuer is unknown; either one is the anchor and is left out.
    fn chain_of(&self, certificate: &Certificate) -> Result<Vec<Certificate>, CacheError> {
        let mut chain: Vec<Certificate> = Vec::new();
        let mut seen = HashSet::new();
        let mut current = certificate.clone();

        loop {
            if current.is_self_signed() {
                break;
            }
            match self.issuer_of(&current) {
                None if chain.is_empty() => {
                    return Err(CacheError::UnknownIssuer(certificate.subject_name()));
                }
                None => break,
                Some(issuer) => {
                    if !seen.insert(current.fingerprint().clone()) || chain.len() >= MAX_CHAIN_DEPTH
                    {
                        return Err(CacheError::UnknownIssuer(format!(
                            "{} (issuer loop)",
                            certificate.subject_name()
                        )));
                    }
                    chain.push(current);
                    current = issuer;
                }
            }
        }

        Ok(chain)
    }
}

/// A CA certificate with its responders
#[derive(Debug, Clone)]
pub struct TrustedAuthority {
    pub certificate: Certificate,
    pub responders: Vec<String>,
    pub responder_certificates: Vec<Certificate>,
}

/// In-memory trust configuration
#[derive(Debug, Clone)]
pub struct StaticTrustConfiguration {
    authorities: Vec<TrustedAuthority>,
    freshness_window: TimeDelta,
    verify_next_update: bool,
}

impl StaticTrustConfiguration {
    pub fn new(
        authorities: Vec<TrustedAuthority>,
        freshness_window: TimeDelta,
        verify_next_update: bool,
    ) -> Self {
        Self {
            authorities,
            freshness_window,
            verify_next_update,
        }
    }

    /// Load every authority and responder certificate named in `config`
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut authorities = Vec::with_capacity(config.authorities.len());
        for authority in &config.authorities {
            let certificate = load_certificate(&authority.certificate_path)?;
            let responder_certificates = authority
                .responder_certificate_paths
                .iter()
                .map(|path| load_certificate(path))
                .collect::<Result<Vec<_>, _>>()?;
            authorities.push(TrustedAuthority {
                certificate,
                responders: authority.responders.clone(),
                responder_certificates,
            });
        }

        let window = i64::try_from(config.freshness.freshness_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| ConfigError::Invalid("freshness_secs is too large".to_string()))?;
        Ok(Self::new(
            authorities,
            window,
            config.freshness.verify_next_update,
        ))
    }

    fn authority(&self, issuer: &Certificate) -> Option<&TrustedAuthority> {
        self.authorities
            .iter()
            .find(|a| a.certificate.fingerprint() == issuer.fingerprint())
    }
}

impl TrustConfiguration for StaticTrustConfiguration {
    fn issuer_of(&self, certificate: &Certificate) -> Option<Certificate> {
        self.authorities
            .iter()
            .map(|a| &a.certificate)
            .filter(|ca| ca.fingerprint() != certificate.fingerprint())
            .find(|ca| certificate.is_issued_by(ca))
            .cloned()
    }

    fn responder_endpoints(&self, issuer: &Certificate) -> Vec<ResponderEndpoint> {
        self.authority(issuer)
            .map(|a| ResponderEndpoint::ordered(&a.responders))
            .unwrap_or_default()
    }

    fn responder_certificates(&self, issuer: &Certificate) -> Vec<Certificate> {
        self.authority(issuer)
            .map(|a| a.responder_certificates.clone())
            .unwrap_or_default()
    }

    fn authorities(&self) -> Vec<AuthorityResponders> {
        self.authorities
            .iter()
            .map(|a| AuthorityResponders {
                authority: a.certificate.subject_name(),
                responders: a.responders.clone(),
            })
            .collect()
    }

    fn authorities_named(&self, subject_name: &str) -> Vec<Certificate> {
        self.authorities
            .iter()
            .map(|a| &a.certificate)
            .filter(|ca| ca.subject_name() == subject_name)
            .cloned()
            .collect()
    }

    fn freshness_window(&self) -> TimeDelta {
        self.freshness_window
    }

    fn verify_next_update(&self) -> bool {
        self.verify_next_update
    }
}

/// Read a PEM or DER certificate file
pub fn load_certificate(path: &Path) -> Result<Certificate, ConfigError> {
    let data = std::fs::read(path)?;
    Certificate::from_pem_or_der(&data)
        .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.display(), e)))
}

/// Load the request signing key (PKCS#8 DER) and its certificate
pub fn load_signer(config: &SignerConfig) -> Result<RequestSigner, ConfigError> {
    let certificate = load_certificate(&config.certificate_path)?;
    let key = std::fs::read(&config.key_path)?;
    RequestSigner::from_pkcs8(&key, certificate)
        .map_err(|e| ConfigError::Invalid(format!("{}: {}", config.key_path.display(), e)))
}
