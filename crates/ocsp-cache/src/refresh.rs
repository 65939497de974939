//! Refresh coordination
//!
//! A sweep walks the certificate inventory, expands every certificate to its
//! issuance chain (trust anchor excluded) and refreshes each chain member
//! whose cache entry is missing, stale or due. Refreshes fan out on a
//! `JoinSet` bounded by a semaphore; one slow responder only delays its own
//! certificate. A failure for one certificate never aborts the sweep.

use crate::cache::RevocationCache;
use crate::error::CacheError;
use crate::fetch::OcspFetcher;
use crate::inventory::CertificateInventory;
use crate::trust::{ResponderEndpoint, TrustConfiguration};
use chrono::{DateTime, Utc};
use ocsp_proto::{Certificate, CertificateFingerprint, RevocationProof};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default number of certificates refreshed in parallel
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 8;

/// One certificate whose refresh did not succeed this round
#[derive(Debug)]
pub struct SweepFailure {
    pub fingerprint: CertificateFingerprint,
    /// Subject DN
    pub subject: String,
    pub error: CacheError,
}

/// Outcome of one sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Distinct chain certificates whose cache entry was examined
    pub checked: usize,
    /// Inventory entries left out: inactive, unregistered, self-signed or outside validity
    pub skipped: usize,
    /// Examined certificates that did not need a refresh
    pub up_to_date: usize,
    /// Certificates with a newly stored proof
    pub refreshed: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct RefreshCoordinator {
    cache: Arc<RevocationCache>,
    fetcher: Arc<OcspFetcher>,
    trust: Arc<dyn TrustConfiguration>,
    inventory: Arc<dyn CertificateInventory>,
    concurrency: usize,
}

impl RefreshCoordinator {
    /// Coordinator sharing the cache's fetcher
    pub fn new(cache: Arc<RevocationCache>, inventory: Arc<dyn CertificateInventory>) -> Self {
        let fetcher = cache.fetcher().clone();
        let trust = fetcher.trust().clone();
        Self {
            cache,
            fetcher,
            trust,
            inventory,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
        }
    }

    /// Cap on parallel refreshes (at least one)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<RevocationCache> {
        &self.cache
    }

    pub fn fetcher(&self) -> &Arc<OcspFetcher> {
        &self.fetcher
    }

    pub fn trust(&self) -> &Arc<dyn TrustConfiguration> {
        &self.trust
    }

    /// See [`OcspFetcher::fetch_with_failover`]
    pub async fn fetch_with_failover(
        &self,
        subject: &Certificate,
        issuer: &Certificate,
        endpoints: &[ResponderEndpoint],
    ) -> Result<RevocationProof, CacheError> {
        self.fetcher
            .fetch_with_failover(subject, issuer, endpoints)
            .await
    }

    /// Refresh every certificate that needs it at `at`
    pub async fn sweep(&self, at: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let due = self.collect_due(at, &mut report);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<CertificateFingerprint, String> = HashMap::new();

        for certificate in due {
            let fingerprint = certificate.fingerprint().clone();
            let subject = certificate.subject_name();

            let Some(issuer) = self.trust.issuer_of(&certificate) else {
                report.failures.push(SweepFailure {
                    fingerprint,
                    error: CacheError::UnknownIssuer(subject.clone()),
                    subject,
                });
                continue;
            };
            let endpoints = self.trust.responder_endpoints(&issuer);

            pending.insert(fingerprint.clone(), subject);
            let cache = self.cache.clone();
            let fetcher = self.fetcher.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        match fetcher
                            .fetch_with_failover(&certificate, &issuer, &endpoints)
                            .await
                        {
                            Ok(proof) => cache.store(&fingerprint, proof).await,
                            Err(e) => Err(e),
                        }
                    }
                    Err(_) => Err(CacheError::TaskFailed(fingerprint.clone())),
                };
                (fingerprint, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((fingerprint, result)) => {
                    let subject = pending.remove(&fingerprint).unwrap_or_default();
                    match result {
                        Ok(()) => report.refreshed += 1,
                        Err(error) => {
                            warn!(subject = %subject, error = %error, "Certificate refresh failed");
                            report.failures.push(SweepFailure {
                                fingerprint,
                                subject,
                                error,
                            });
                        }
                    }
                }
                Err(e) => error!(error = %e, "Refresh task panicked"),
            }
        }

        // Whatever is still pending belongs to a task that never reported back
        for (fingerprint, subject) in pending {
            report.failures.push(SweepFailure {
                error: CacheError::TaskFailed(fingerprint.clone()),
                fingerprint,
                subject,
            });
        }

        info!(
            checked = report.checked,
            skipped = report.skipped,
            up_to_date = report.up_to_date,
            refreshed = report.refreshed,
            failed = report.failures.len(),
            "Refresh sweep finished"
        );
        report
    }

    /// Chain certificates that need a refresh at `at`, deduplicated
    fn collect_due(&self, at: DateTime<Utc>, report: &mut SweepReport) -> Vec<Certificate> {
        let mut seen = HashSet::new();
        let mut due = Vec::new();

        for entry in self.inventory.certificates() {
            let certificate = &entry.certificate;
            if !entry.active || !entry.registered {
                debug!(id = %entry.id, "Skipping inactive or unregistered certificate");
                report.skipped += 1;
                continue;
            }
            if certificate.is_self_signed() {
                debug!(id = %entry.id, "Skipping self-signed certificate");
                report.skipped += 1;
                continue;
            }

            let chain = match self.trust.chain_of(certificate) {
                Ok(chain) => chain,
                Err(error) => {
                    warn!(id = %entry.id, error = %error, "Cannot build issuance chain");
                    report.failures.push(SweepFailure {
                        fingerprint: certificate.fingerprint().clone(),
                        subject: certificate.subject_name(),
                        error,
                    });
                    continue;
                }
            };

            for member in chain {
                if !seen.insert(member.fingerprint().clone()) {
                    continue;
                }
                if !member.is_valid_at(at) {
                    debug!(subject = %member.subject_name(), "Skipping certificate outside its validity period");
                    report.skipped += 1;
                    continue;
                }

                report.checked += 1;
                if self.cache.needs_refresh(member.fingerprint(), at) {
                    due.push(member);
                } else {
                    report.up_to_date += 1;
                }
            }
        }

        due
    }
}
