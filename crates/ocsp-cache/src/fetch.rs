//! Fetch-with-failover engine
//!
//! Shared by [`RevocationCache::ensure_fresh`](crate::cache::RevocationCache::ensure_fresh)
//! and the refresh sweep. It talks to responders and validates what they
//! return, but never touches the cache itself.

use crate::config::{FetchConfig, MIN_FETCH_INTERVAL_SECS};
use crate::diagnostics::{DiagnosticCode, DiagnosticsRegistry};
use crate::error::{AttemptFailure, CacheError, FetchError};
use crate::freshness::FreshnessPolicy;
use crate::transport::ResponderTransport;
use crate::trust::{sort_by_preference, ResponderEndpoint, TrustConfiguration};
use chrono::{DateTime, TimeDelta, Utc};
use ocsp_proto::{
    CertIdHash, Certificate, OcspRequestBuilder, OcspResponse, OcspVerifier, RequestSigner,
    RevocationProof,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const NONCE_LEN: usize = 16;

/// Request options for every fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-exchange timeout
    pub timeout: Duration,
    pub cert_id_hash: CertIdHash,
    pub send_nonce: bool,
    /// Added to an attempt time to give its `next_attempt`
    pub fetch_interval: Duration,
}

impl FetchOptions {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            timeout: config.http_timeout(),
            cert_id_hash: config.cert_id_hash,
            send_nonce: config.send_nonce,
            fetch_interval: config.fetch_interval(),
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

pub struct OcspFetcher {
    transport: Arc<dyn ResponderTransport>,
    trust: Arc<dyn TrustConfiguration>,
    diagnostics: Arc<DiagnosticsRegistry>,
    signer: Option<Arc<RequestSigner>>,
    options: FetchOptions,
    policy: FreshnessPolicy,
}

impl OcspFetcher {
    pub fn new(
        transport: Arc<dyn ResponderTransport>,
        trust: Arc<dyn TrustConfiguration>,
        diagnostics: Arc<DiagnosticsRegistry>,
        policy: FreshnessPolicy,
    ) -> Self {
        Self {
            transport,
            trust,
            diagnostics,
            signer: None,
            options: FetchOptions::default(),
            policy,
        }
    }

    /// Sign every request with `signer`
    pub fn with_signer(mut self, signer: Arc<RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn trust(&self) -> &Arc<dyn TrustConfiguration> {
        &self.trust
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticsRegistry> {
        &self.diagnostics
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Obtain a validated, fresh proof for `subject` from the first responder
    /// that yields one
    ///
    /// Endpoints are tried in ascending preference. Every attempt is
    /// recorded in diagnostics before the next one starts.
    pub async fn fetch_with_failover(
        &self,
        subject: &Certificate,
        issuer: &Certificate,
        endpoints: &[ResponderEndpoint],
    ) -> Result<RevocationProof, CacheError> {
        if endpoints.is_empty() {
            return Err(CacheError::NoResponders(subject.subject_name()));
        }

        let mut ordered = endpoints.to_vec();
        sort_by_preference(&mut ordered);

        let nonce = self
            .options
            .send_nonce
            .then(|| rand::random::<[u8; NONCE_LEN]>().to_vec());

        let mut builder =
            OcspRequestBuilder::new(subject, issuer).with_hash(self.options.cert_id_hash);
        if let Some(nonce) = &nonce {
            builder = builder.with_nonce(nonce.clone());
        }
        if let Some(signer) = &self.signer {
            builder = builder.with_signer(signer);
        }
        let request = builder.build()?;

        let verifier = OcspVerifier::new(self.trust.responder_certificates(issuer));
        let authority = issuer.subject_name();
        let mut attempts = Vec::new();

        for endpoint in &ordered {
            let attempted_at = Utc::now();
            let result = self
                .attempt(endpoint, &request, nonce.as_deref(), subject, issuer, &verifier)
                .await;
            let next_attempt = self.next_attempt_after(attempted_at);

            match result {
                Ok(proof) => {
                    self.diagnostics.record(
                        &authority,
                        &endpoint.uri,
                        DiagnosticCode::Success,
                        attempted_at,
                        next_attempt,
                    );
                    info!(
                        subject = %subject.subject_name(),
                        uri = %endpoint.uri,
                        revoked = proof.is_revoked(),
                        produced_at = %proof.produced_at(),
                        "Fetched OCSP proof"
                    );
                    return Ok(proof);
                }
                Err(error) => {
                    let code = DiagnosticCode::from_fetch_error(&error);
                    self.diagnostics.record(
                        &authority,
                        &endpoint.uri,
                        code,
                        attempted_at,
                        next_attempt,
                    );
                    warn!(
                        subject = %subject.subject_name(),
                        uri = %endpoint.uri,
                        code = ?code,
                        error = %error,
                        "OCSP responder attempt failed"
                    );
                    attempts.push(AttemptFailure {
                        uri: endpoint.uri.clone(),
                        error,
                    });
                }
            }
        }

        Err(CacheError::AllRespondersFailed {
            subject: subject.subject_name(),
            attempts,
        })
    }

    async fn attempt(
        &self,
        endpoint: &ResponderEndpoint,
        request: &[u8],
        nonce: Option<&[u8]>,
        subject: &Certificate,
        issuer: &Certificate,
        verifier: &OcspVerifier,
    ) -> Result<RevocationProof, FetchError> {
        let body = self
            .transport
            .exchange(endpoint, request, self.options.timeout)
            .await?;

        let response = OcspResponse::parse(&body)?;
        if let Some(nonce) = nonce {
            response.check_nonce(nonce)?;
        }
        let proof = verifier.validate(&response, subject, issuer)?;

        if !self.policy.is_fresh(&proof, Utc::now()) {
            return Err(FetchError::Stale {
                produced_at: proof.produced_at().to_rfc3339(),
            });
        }

        debug!(uri = %endpoint.uri, serial = proof.serial(), "OCSP response validated");
        Ok(proof)
    }

    fn next_attempt_after(&self, attempted_at: DateTime<Utc>) -> DateTime<Utc> {
        let interval = TimeDelta::from_std(self.options.fetch_interval)
            .unwrap_or_else(|_| TimeDelta::seconds(MIN_FETCH_INTERVAL_SECS as i64));
        attempted_at
            .checked_add_signed(interval)
            .unwrap_or(attempted_at)
    }
}
