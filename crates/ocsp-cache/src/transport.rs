//! Responder transport
//!
//! One call is one request/response round trip. Retries and failover belong
//! to the refresh layer.

use crate::error::TransportError;
use crate::trust::ResponderEndpoint;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;

pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
pub const OCSP_RESPONSE_CONTENT_TYPE: &str = "application/ocsp-response";

#[async_trait]
pub trait ResponderTransport: Send + Sync {
    /// Send `request` to `endpoint` and return the raw response body
    async fn exchange(
        &self,
        endpoint: &ResponderEndpoint,
        request: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}

/// HTTP POST transport (RFC 6960 Appendix A.1)
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_response_size: usize,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, max_response_size: usize) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("ocsp-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Connect {
                uri: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            max_response_size,
        })
    }

    fn map_error(uri: &str, timeout: Duration, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout {
                uri: uri.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
        } else {
            TransportError::Connect {
                uri: uri.to_string(),
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl ResponderTransport for HttpTransport {
    async fn exchange(
        &self,
        endpoint: &ResponderEndpoint,
        request: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let uri = endpoint.uri.as_str();
        debug!(uri = uri, request_len = request.len(), "Sending OCSP request");

        let mut response = self
            .client
            .post(uri)
            .header(CONTENT_TYPE, OCSP_REQUEST_CONTENT_TYPE)
            .header(ACCEPT, OCSP_RESPONSE_CONTENT_TYPE)
            .timeout(timeout)
            .body(request.to_vec())
            .send()
            .await
            .map_err(|e| Self::map_error(uri, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }

        let too_large = || TransportError::ResponseTooLarge {
            uri: uri.to_string(),
            limit: self.max_response_size,
        };

        if let Some(length) = response.content_length() {
            if length > self.max_response_size as u64 {
                return Err(too_large());
            }
        }

        // Chunked bodies carry no length, so the cap is enforced while reading
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::map_error(uri, timeout, e))?
        {
            if body.len() + chunk.len() > self.max_response_size {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(TransportError::EmptyResponse {
                uri: uri.to_string(),
            });
        }

        debug!(uri = uri, response_len = body.len(), "Received OCSP response");
        Ok(body)
    }
}
