//! Revocation proof cache
//!
//! [`RevocationCache`] is the only writer of both the in-memory mirror and
//! the [`DiskCache`]. Stores are write-through:
//!
//! 1. take the per-fingerprint lock
//! 2. persist to disk
//! 3. publish in memory
//!
//! A failed disk write rejects the store, so memory is never ahead of disk.
//! Records loaded at open are revalidated against the configured issuer and
//! dropped if they no longer verify. Reads go straight to the `DashMap` and never wait on a store or on the
//! network. Fetches run before any lock is taken.

use crate::disk::{DiskCache, PersistedProof};
use crate::error::CacheError;
use crate::fetch::OcspFetcher;
use crate::freshness::FreshnessPolicy;
use crate::trust::{ResponderEndpoint, TrustConfiguration};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ocsp_proto::{Certificate, CertificateFingerprint, OcspVerifier, RevocationProof};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A proof with the time it was stored
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub proof: RevocationProof,
    pub stored_at: DateTime<Utc>,
}

pub struct RevocationCache {
    entries: DashMap<CertificateFingerprint, CacheEntry>,
    /// Never pruned, so it grows with the number of certificates ever stored
    locks: DashMap<CertificateFingerprint, Arc<Mutex<()>>>,
    disk: DiskCache,
    policy: FreshnessPolicy,
    fetcher: Arc<OcspFetcher>,
}

impl RevocationCache {
    /// Open the cache, loading every record from `disk` that still verifies
    pub async fn open(
        disk: DiskCache,
        policy: FreshnessPolicy,
        fetcher: Arc<OcspFetcher>,
    ) -> Result<Self, CacheError> {
        let entries = DashMap::new();
        let mut discarded = 0usize;
        for record in disk.load_all().await? {
            match verify_record(fetcher.trust().as_ref(), &record) {
                Ok(proof) => {
                    entries.insert(
                        record.fingerprint,
                        CacheEntry {
                            proof,
                            stored_at: record.stored_at,
                        },
                    );
                }
                Err(reason) => {
                    warn!(
                        fingerprint = %record.fingerprint,
                        issuer = %record.issuer,
                        reason = %reason,
                        "Discarding cached proof that no longer verifies"
                    );
                    discarded += 1;
                }
            }
        }
        info!(
            entries = entries.len(),
            discarded = discarded,
            dir = %disk.dir().display(),
            "Revocation cache opened"
        );

        Ok(Self {
            entries,
            locks: DashMap::new(),
            disk,
            policy,
            fetcher,
        })
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    pub fn fetcher(&self) -> &Arc<OcspFetcher> {
        &self.fetcher
    }

    /// The proof for `fingerprint` if it is fresh at `at`
    ///
    /// A stale entry is reported as absent.
    pub fn get(&self, fingerprint: &CertificateFingerprint, at: DateTime<Utc>) -> Option<RevocationProof> {
        self.entries
            .get(fingerprint)
            .filter(|entry| self.policy.is_fresh(&entry.proof, at))
            .map(|entry| entry.proof.clone())
    }

    pub fn is_fresh(&self, fingerprint: &CertificateFingerprint, at: DateTime<Utc>) -> bool {
        self.entries
            .get(fingerprint)
            .is_some_and(|entry| self.policy.is_fresh(&entry.proof, at))
    }

    /// Missing, stale, or past its scheduled refresh at `at`
    pub fn needs_refresh(&self, fingerprint: &CertificateFingerprint, at: DateTime<Utc>) -> bool {
        let entry = self.entries.get(fingerprint);
        self.policy
            .needs_refresh(entry.as_ref().map(|entry| &entry.proof), at)
    }

    /// When the entry was last stored, fresh or not
    pub fn stored_at(&self, fingerprint: &CertificateFingerprint) -> Option<DateTime<Utc>> {
        self.entries.get(fingerprint).map(|entry| entry.stored_at)
    }

    fn lock_for(&self, fingerprint: &CertificateFingerprint) -> Arc<Mutex<()>> {
        self.locks
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Persist `proof` and publish it under `fingerprint`
    ///
    /// Stores for one fingerprint are serialised. The last one wins.
    pub async fn store(
        &self,
        fingerprint: &CertificateFingerprint,
        proof: RevocationProof,
    ) -> Result<(), CacheError> {
        if proof.fingerprint() != fingerprint {
            return Err(CacheError::FingerprintMismatch {
                expected: fingerprint.clone(),
                actual: proof.fingerprint().clone(),
            });
        }

        let lock = self.lock_for(fingerprint);
        let _guard = lock.lock().await;

        let stored_at = Utc::now();
        self.disk.put(&proof, stored_at).await?;
        self.entries
            .insert(fingerprint.clone(), CacheEntry { proof, stored_at });

        debug!(fingerprint = %fingerprint, "Stored revocation proof");
        Ok(())
    }

    /// Remove the entry from disk and memory
    pub async fn evict(&self, fingerprint: &CertificateFingerprint) -> Result<(), CacheError> {
        let lock = self.lock_for(fingerprint);
        let _guard = lock.lock().await;

        self.disk.remove(fingerprint).await?;
        self.entries.remove(fingerprint);
        debug!(fingerprint = %fingerprint, "Evicted revocation proof");
        Ok(())
    }

    /// A fresh proof for `subject`, fetched and stored on a miss
    pub async fn ensure_fresh(
        &self,
        subject: &Certificate,
        issuer: &Certificate,
        endpoints: &[ResponderEndpoint],
    ) -> Result<RevocationProof, CacheError> {
        self.ensure_fresh_at(subject, issuer, endpoints, Utc::now())
            .await
    }

    /// [`ensure_fresh`](Self::ensure_fresh) evaluated at `at`
    pub async fn ensure_fresh_at(
        &self,
        subject: &Certificate,
        issuer: &Certificate,
        endpoints: &[ResponderEndpoint],
        at: DateTime<Utc>,
    ) -> Result<RevocationProof, CacheError> {
        let fingerprint = subject.fingerprint();
        if let Some(proof) = self.get(fingerprint, at) {
            return Ok(proof);
        }

        debug!(fingerprint = %fingerprint, "Cache miss, fetching OCSP proof");
        let proof = self
            .fetcher
            .fetch_with_failover(subject, issuer, endpoints)
            .await?;

        if !self.policy.is_fresh(&proof, at) {
            return Err(CacheError::StaleProof(fingerprint.clone()));
        }

        self.store(fingerprint, proof.clone()).await?;
        Ok(proof)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Check a persisted record against the configured authorities it names
fn verify_record(
    trust: &dyn TrustConfiguration,
    record: &PersistedProof,
) -> Result<RevocationProof, String> {
    let mut last_error = format!("issuer '{}' is not a configured authority", record.issuer);
    for issuer in trust.authorities_named(&record.issuer) {
        let verifier = OcspVerifier::new(trust.responder_certificates(&issuer));
        match record.verify(&verifier, &issuer) {
            Ok(proof) => return Ok(proof),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(last_error)
}
