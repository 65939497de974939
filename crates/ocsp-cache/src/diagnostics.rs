//! Per-responder fetch diagnostics
//!
//! Every responder attempt made by the fetcher is recorded here, keyed by the
//! issuing authority (its subject DN) and the responder URI. Each pair holds
//! only its latest attempt. Writes never fail and never block a fetch for
//! longer than a map shard lock.
//!
//! The [`DiagnosticsSnapshot`] is a read-only copy for health tooling. There
//! is no consistency guarantee across pairs: each entry is independently
//! current.

use crate::error::{FetchError, TransportError};
use crate::trust::AuthorityResponders;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ocsp_proto::RevocationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of the latest attempt against one responder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    /// A valid, fresh proof was obtained
    Success,
    /// Configured but not contacted yet
    Uninitialized,
    /// Connect failure or timeout
    ConnectionError,
    /// Non-2xx status or oversized body
    HttpError,
    /// 2xx with no body
    EmptyResponse,
    /// Undecodable, unsuccessful or mismatched response
    ResponseInvalid,
    /// Signature, responder authorisation or freshness check failed
    ResponseUnverified,
    /// The responder answered `unknown`
    StatusUnknown,
    /// The responder demands signed requests
    SignatureRequired,
}

impl DiagnosticCode {
    pub fn from_fetch_error(error: &FetchError) -> Self {
        match error {
            FetchError::Transport(e) => match e {
                TransportError::Connect { .. } | TransportError::Timeout { .. } => {
                    Self::ConnectionError
                }
                TransportError::HttpStatus { .. } | TransportError::ResponseTooLarge { .. } => {
                    Self::HttpError
                }
                TransportError::EmptyResponse { .. } => Self::EmptyResponse,
            },
            FetchError::Revocation(e) => match e {
                RevocationError::SignatureRequired => Self::SignatureRequired,
                RevocationError::StatusUnknown(_) => Self::StatusUnknown,
                RevocationError::ResponderSignatureInvalid(_)
                | RevocationError::UnauthorizedResponder { .. } => Self::ResponseUnverified,
                _ => Self::ResponseInvalid,
            },
            FetchError::Stale { .. } => Self::ResponseUnverified,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Latest recorded attempt for one (authority, responder) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponderStatus {
    pub responder_uri: String,
    pub code: DiagnosticCode,
    /// When the attempt was made (seed time for `Uninitialized`)
    pub last_attempt: DateTime<Utc>,
    /// When the scheduler expects to try again
    pub next_attempt: DateTime<Utc>,
    /// Registry-wide write order
    pub sequence: u64,
}

/// All responders of one authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityStatus {
    /// Issuing authority subject DN
    pub authority: String,
    pub responders: Vec<ResponderStatus>,
}

/// Point-in-time copy of the registry, sorted by authority then URI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub authorities: Vec<AuthorityStatus>,
}

impl DiagnosticsSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn authority(&self, authority: &str) -> Option<&AuthorityStatus> {
        self.authorities.iter().find(|a| a.authority == authority)
    }

    /// Entry for one pair
    pub fn responder(&self, authority: &str, uri: &str) -> Option<&ResponderStatus> {
        self.authority(authority)?
            .responders
            .iter()
            .find(|r| r.responder_uri == uri)
    }

    /// Every entry ordered by write sequence
    pub fn in_attempt_order(&self) -> Vec<&ResponderStatus> {
        let mut all: Vec<_> = self
            .authorities
            .iter()
            .flat_map(|a| a.responders.iter())
            .collect();
        all.sort_by_key(|r| r.sequence);
        all
    }
}

#[derive(Debug, Default)]
pub struct DiagnosticsRegistry {
    entries: DashMap<(String, String), ResponderStatus>,
    sequence: AtomicU64,
}

impl DiagnosticsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the entry for `(authority, uri)`
    pub fn record(
        &self,
        authority: &str,
        uri: &str,
        code: DiagnosticCode,
        attempt: DateTime<Utc>,
        next_attempt: DateTime<Utc>,
    ) {
        let status = |sequence| ResponderStatus {
            responder_uri: uri.to_string(),
            code,
            last_attempt: attempt,
            next_attempt,
            sequence,
        };

        // The sequence is drawn while the entry is held, so per pair the
        // stored entry is always the highest sequence written
        match self.entries.entry((authority.to_string(), uri.to_string())) {
            Entry::Occupied(mut slot) => {
                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
                if sequence > slot.get().sequence {
                    slot.insert(status(sequence));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(status(self.sequence.fetch_add(1, Ordering::Relaxed)));
            }
        }
    }

    /// Align the registry with the configured responders
    ///
    /// Pairs that are no longer configured are dropped. New pairs are seeded
    /// as `Uninitialized`. Existing entries keep their last result.
    pub fn initialize(&self, authorities: &[AuthorityResponders], next_attempt: DateTime<Utc>) {
        let configured: HashSet<(String, String)> = authorities
            .iter()
            .flat_map(|a| {
                a.responders
                    .iter()
                    .map(|uri| (a.authority.clone(), uri.clone()))
            })
            .collect();

        self.entries.retain(|key, _| configured.contains(key));

        let now = Utc::now();
        for key in configured {
            if self.entries.contains_key(&key) {
                continue;
            }
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
            let status = ResponderStatus {
                responder_uri: key.1.clone(),
                code: DiagnosticCode::Uninitialized,
                last_attempt: now,
                next_attempt,
                sequence,
            };
            self.entries.entry(key).or_insert(status);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut grouped: BTreeMap<String, Vec<ResponderStatus>> = BTreeMap::new();
        for entry in self.entries.iter() {
            grouped
                .entry(entry.key().0.clone())
                .or_default()
                .push(entry.value().clone());
        }

        let authorities = grouped
            .into_iter()
            .map(|(authority, mut responders)| {
                responders.sort_by(|a, b| a.responder_uri.cmp(&b.responder_uri));
                AuthorityStatus {
                    authority,
                    responders,
                }
            })
            .collect();

        DiagnosticsSnapshot { authorities }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use ocsp_proto::OcspResponseStatus;

    fn authorities() -> Vec<AuthorityResponders> {
        vec![
            AuthorityResponders {
                authority: "CN=Issuing CA".to_string(),
                responders: vec!["http://b.test".to_string(), "http://a.test".to_string()],
            },
            AuthorityResponders {
                authority: "CN=Root CA".to_string(),
                responders: Vec::new(),
            },
        ]
    }

    #[test]
    fn test_record_upserts() {
        let registry = DiagnosticsRegistry::new();
        let now = Utc::now();
        let next = now + TimeDelta::minutes(20);

        registry.record("CN=CA", "http://a.test", DiagnosticCode::ConnectionError, now, next);
        registry.record("CN=CA", "http://a.test", DiagnosticCode::Success, now, next);

        assert_eq!(registry.len(), 1);
        let snapshot = registry.snapshot();
        let entry = snapshot.responder("CN=CA", "http://a.test").unwrap();
        assert_eq!(entry.code, DiagnosticCode::Success);
        assert_eq!(entry.next_attempt, next);
    }

    #[test]
    fn test_concurrent_records_keep_latest_sequence() {
        let registry = std::sync::Arc::new(DiagnosticsRegistry::new());
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        registry.record("CN=CA", "http://a.test", DiagnosticCode::HttpError, now, now);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        let entry = snapshot.responder("CN=CA", "http://a.test").unwrap();
        assert_eq!(entry.sequence, 8 * 200 - 1);
    }

    #[test]
    fn test_initialize_seeds_and_prunes() {
        let registry = DiagnosticsRegistry::new();
        let now = Utc::now();
        registry.record("CN=Issuing CA", "http://a.test", DiagnosticCode::Success, now, now);
        registry.record("CN=Gone CA", "http://gone.test", DiagnosticCode::Success, now, now);

        registry.initialize(&authorities(), now);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.authorities.len(), 1);
        assert!(snapshot.authority("CN=Gone CA").is_none());

        let issuing = snapshot.authority("CN=Issuing CA").unwrap();
        let uris: Vec<_> = issuing.responders.iter().map(|r| r.responder_uri.as_str()).collect();
        assert_eq!(uris, vec!["http://a.test", "http://b.test"]);
        assert_eq!(issuing.responders[0].code, DiagnosticCode::Success);
        assert_eq!(issuing.responders[1].code, DiagnosticCode::Uninitialized);
    }

    #[test]
    fn test_sequence_orders_attempts_across_pairs() {
        let registry = DiagnosticsRegistry::new();
        let now = Utc::now();
        for uri in ["http://c.test", "http://a.test", "http://b.test"] {
            registry.record("CN=CA", uri, DiagnosticCode::HttpError, now, now);
        }

        let snapshot = registry.snapshot();
        let ordered: Vec<_> = snapshot
            .in_attempt_order()
            .into_iter()
            .map(|r| r.responder_uri.as_str())
            .collect();
        assert_eq!(ordered, vec!["http://c.test", "http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_code_mapping() {
        let uri = "http://a.test".to_string();
        let cases = [
            (
                FetchError::Transport(TransportError::Timeout {
                    uri: uri.clone(),
                    timeout_ms: 10,
                }),
                DiagnosticCode::ConnectionError,
            ),
            (
                FetchError::Transport(TransportError::HttpStatus {
                    uri: uri.clone(),
                    status: 503,
                }),
                DiagnosticCode::HttpError,
            ),
            (
                FetchError::Transport(TransportError::EmptyResponse { uri }),
                DiagnosticCode::EmptyResponse,
            ),
            (
                FetchError::Revocation(RevocationError::MalformedResponse("x".into())),
                DiagnosticCode::ResponseInvalid,
            ),
            (
                FetchError::Revocation(RevocationError::UnsuccessfulResponse(
                    OcspResponseStatus::TryLater,
                )),
                DiagnosticCode::ResponseInvalid,
            ),
            (
                FetchError::Revocation(RevocationError::SubjectMismatch("x".into())),
                DiagnosticCode::ResponseInvalid,
            ),
            (
                FetchError::Revocation(RevocationError::ResponderSignatureInvalid("x".into())),
                DiagnosticCode::ResponseUnverified,
            ),
            (
                FetchError::Revocation(RevocationError::StatusUnknown("x".into())),
                DiagnosticCode::StatusUnknown,
            ),
            (
                FetchError::Revocation(RevocationError::SignatureRequired),
                DiagnosticCode::SignatureRequired,
            ),
            (
                FetchError::Stale {
                    produced_at: "then".into(),
                },
                DiagnosticCode::ResponseUnverified,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(DiagnosticCode::from_fetch_error(&error), expected, "{}", error);
        }
    }

    #[test]
    fn test_snapshot_json() {
        let registry = DiagnosticsRegistry::new();
        let now = Utc::now();
        registry.record("CN=CA", "http://a.test", DiagnosticCode::StatusUnknown, now, now);

        let json = registry.snapshot().to_json().unwrap();
        assert!(json.contains("\"status_unknown\""));
        assert!(json.contains("http://a.test"));
    }
}
