//! OCSP status cache and refresh service
//!
//! This crate keeps validated OCSP proofs for a set of certificates, backed
//! by a durable on-disk store, and refreshes them ahead of expiry with
//! failover across each authority's responders. It is built on the
//! `ocsp-proto` codec and verifier.
//!
//! # Features
//!
//! - Write-through cache with per-certificate serialised stores
//! - Freshness window and nextUpdate enforcement
//! - Responder failover in preference order
//! - Bounded-concurrency refresh sweeps on a schedule
//! - Per-responder diagnostics
//!
//! # Example
//!
//! ```rust,no_run
//! use ocsp_cache::{
//!     Config, DiagnosticsRegistry, DiskCache, FreshnessPolicy, HttpTransport, OcspFetcher,
//!     RevocationCache, StaticTrustConfiguration, TrustConfiguration,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(subject: ocsp_proto::Certificate) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("ocsp-cache.json")?;
//! let trust = Arc::new(StaticTrustConfiguration::from_config(&config)?);
//! let policy = FreshnessPolicy::new(trust.freshness_window(), trust.verify_next_update());
//!
//! let transport = Arc::new(HttpTransport::new(
//!     config.fetch.connect_timeout(),
//!     config.fetch.max_response_size_bytes,
//! )?);
//! let fetcher = Arc::new(OcspFetcher::new(
//!     transport,
//!     trust.clone(),
//!     Arc::new(DiagnosticsRegistry::new()),
//!     policy,
//! ));
//! let cache = RevocationCache::open(DiskCache::open(&config.cache_dir).await?, policy, fetcher).await?;
//!
//! let issuer = trust.issuer_of(&subject).ok_or("unknown issuer")?;
//! let endpoints = trust.responder_endpoints(&issuer);
//! let proof = cache.ensure_fresh(&subject, &issuer, &endpoints).await?;
//! println!("revoked: {}", proof.is_revoked());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod disk;
pub mod error;
pub mod fetch;
pub mod freshness;
pub mod inventory;
pub mod refresh;
pub mod scheduler;
pub mod transport;
pub mod trust;

#[cfg(test)]
mod test_support;

pub use cache::{CacheEntry, RevocationCache};
pub use config::{Config, ConfigError};
pub use diagnostics::{
    AuthorityStatus, DiagnosticCode, DiagnosticsRegistry, DiagnosticsSnapshot, ResponderStatus,
};
pub use disk::{DiskCache, PersistedProof};
pub use error::{AttemptFailure, CacheError, FetchError, TransportError};
pub use fetch::{FetchOptions, OcspFetcher};
pub use freshness::FreshnessPolicy;
pub use inventory::{CertificateInventory, InventoryCertificate, StaticInventory};
pub use refresh::{RefreshCoordinator, SweepFailure, SweepReport};
pub use scheduler::RefreshScheduler;
pub use transport::{HttpTransport, ResponderTransport};
pub use trust::{
    AuthorityResponders, ResponderEndpoint, StaticTrustConfiguration, TrustConfiguration,
    TrustedAuthority,
};
