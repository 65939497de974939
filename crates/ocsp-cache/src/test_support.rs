//! Shared fixtures for unit tests

use crate::error::TransportError;
use crate::transport::ResponderTransport;
use crate::trust::ResponderEndpoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ocsp_proto::testing::{ResponseBuilder, TestPki};
use ocsp_proto::{Certificate, OcspResponse, OcspVerifier, RevocationProof};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Issuer-signed good response for `leaf`
pub(crate) fn response_for(
    pki: &TestPki,
    leaf: &Certificate,
    produced_at: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
) -> Vec<u8> {
    ResponseBuilder::new(leaf, &pki.ca)
        .produced_at(produced_at)
        .next_update(next_update)
        .build()
}

pub(crate) fn proof_for_leaf(
    pki: &TestPki,
    leaf: &Certificate,
    produced_at: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
) -> RevocationProof {
    let der = response_for(pki, leaf, produced_at, next_update);
    OcspVerifier::default()
        .validate(
            &OcspResponse::parse(&der).unwrap(),
            leaf,
            &pki.ca.certificate,
        )
        .unwrap()
}

/// Proof for a fresh leaf with the given serial
pub(crate) fn proof_for(
    pki: &TestPki,
    serial: u64,
    produced_at: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
) -> RevocationProof {
    let leaf = pki.issue_leaf(&format!("leaf-{}.example", serial), serial);
    proof_for_leaf(pki, &leaf, produced_at, next_update)
}

/// Transport answering from a fixed table and recording every call
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<HashMap<String, Result<Vec<u8>, TransportError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, uri: &str, reply: Result<Vec<u8>, TransportError>) {
        self.replies.lock().unwrap().insert(uri.to_string(), reply);
    }

    pub fn refuse(&self, uri: &str) {
        self.reply(
            uri,
            Err(TransportError::Connect {
                uri: uri.to_string(),
                message: "connection refused".to_string(),
            }),
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponderTransport for ScriptedTransport {
    async fn exchange(
        &self,
        endpoint: &ResponderEndpoint,
        _request: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.calls.lock().unwrap().push(endpoint.uri.clone());
        self.replies
            .lock()
            .unwrap()
            .get(&endpoint.uri)
            .cloned()
            .unwrap_or_else(|| {
                Err(TransportError::Connect {
                    uri: endpoint.uri.clone(),
                    message: "no route".to_string(),
                })
            })
    }
}
