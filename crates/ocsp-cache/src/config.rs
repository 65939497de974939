use ocsp_proto::CertIdHash;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Shortest allowed interval between scheduled sweeps
pub const MIN_FETCH_INTERVAL_SECS: u64 = 60;

/// Longest allowed freshness window (ten years)
pub const MAX_FRESHNESS_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Freshness rules applied to cached proofs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessConfig {
    /// Maximum age of a proof, measured from producedAt (default: 3600)
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,

    /// Treat proofs past nextUpdate as stale (default: true)
    #[serde(default = "default_true")]
    pub verify_next_update: bool,

    /// Fraction of the freshness window to refresh ahead of expiry (default: 0.1)
    #[serde(default = "default_refresh_margin_ratio")]
    pub refresh_margin_ratio: f64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness_secs(),
            verify_next_update: true,
            refresh_margin_ratio: default_refresh_margin_ratio(),
        }
    }
}

/// Responder fetch behaviour and refresh scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds (default: 20)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// TCP connect timeout in seconds (default: 5)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Largest accepted response body (default: 1 MiB)
    #[serde(default = "default_max_response_size")]
    pub max_response_size_bytes: usize,

    /// Interval between refresh sweeps in seconds (default: 1200, minimum: 60)
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,

    /// First retry delay after a failed sweep, doubled per failure (default: 10)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Maximum certificates refreshed concurrently (default: 8)
    #[serde(default = "default_sweep_concurrency")]
    pub sweep_concurrency: usize,

    /// Include a random nonce in each request (default: false)
    #[serde(default)]
    pub send_nonce: bool,

    /// Hash algorithm used for CertID (default: sha1)
    #[serde(default)]
    pub cert_id_hash: CertIdHash,
}

impl FetchConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Fetch interval, clamped to the minimum
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs.max(MIN_FETCH_INTERVAL_SECS))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_response_size_bytes: default_max_response_size(),
            fetch_interval_secs: default_fetch_interval_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            sweep_concurrency: default_sweep_concurrency(),
            send_nonce: false,
            cert_id_hash: CertIdHash::default(),
        }
    }
}

/// Key and certificate used to sign OCSP requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// PKCS#8 DER private key
    pub key_path: PathBuf,
    /// PEM or DER certificate matching the key
    pub certificate_path: PathBuf,
}

/// A certificate authority and its OCSP responders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// PEM or DER CA certificate
    pub certificate_path: PathBuf,

    /// Responder URIs in order of preference
    #[serde(default)]
    pub responders: Vec<String>,

    /// Delegated responder certificates trusted for this CA
    #[serde(default)]
    pub responder_certificate_paths: Vec<PathBuf>,
}

/// A certificate whose revocation status is kept in the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// PEM or DER certificate
    pub path: PathBuf,

    /// Inactive certificates are skipped by refresh sweeps
    #[serde(default = "default_true")]
    pub active: bool,

    /// Certificates not yet registered are skipped by refresh sweeps
    #[serde(default = "default_true")]
    pub registered: bool,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one persisted proof per certificate fingerprint
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub freshness: FreshnessConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    /// Request signing identity (optional)
    #[serde(default)]
    pub signer: Option<SignerConfig>,

    /// Trusted certificate authorities, intermediates and roots alike
    #[serde(default)]
    pub authorities: Vec<AuthorityConfig>,

    /// Certificates to keep proofs for
    #[serde(default)]
    pub certificates: Vec<CertificateConfig>,
}

fn default_true() -> bool {
    true
}

fn default_freshness_secs() -> u64 {
    3600
}

fn default_refresh_margin_ratio() -> f64 {
    0.1
}

fn default_http_timeout_secs() -> u64 {
    20
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_max_response_size() -> usize {
    1024 * 1024
}

fn default_fetch_interval_secs() -> u64 {
    1200
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_sweep_concurrency() -> usize {
    8
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/ocsp-cache")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            log_level: None,
            freshness: FreshnessConfig::default(),
            fetch: FetchConfig::default(),
            signer: None,
            authorities: Vec::new(),
            certificates: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.freshness.freshness_secs == 0 {
            return Err(ConfigError::Invalid(
                "freshness_secs must be greater than zero".to_string(),
            ));
        }
        if self.freshness.freshness_secs > MAX_FRESHNESS_SECS {
            return Err(ConfigError::Invalid(format!(
                "freshness_secs must be at most {}, got {}",
                MAX_FRESHNESS_SECS, self.freshness.freshness_secs
            )));
        }

        let ratio = self.freshness.refresh_margin_ratio;
        if !(0.0..1.0).contains(&ratio) {
            return Err(ConfigError::Invalid(format!(
                "refresh_margin_ratio must be in [0, 1), got {}",
                ratio
            )));
        }

        if self.fetch.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.fetch.sweep_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "sweep_concurrency must be greater than zero".to_string(),
            ));
        }

        for authority in &self.authorities {
            for uri in &authority.responders {
                let url = reqwest::Url::parse(uri).map_err(|e| {
                    ConfigError::Invalid(format!("Invalid responder URI '{}': {}", uri, e))
                })?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ConfigError::Invalid(format!(
                        "Responder URI '{}' must use http or https",
                        uri
                    )));
                }
            }
        }

        if let Some(level) = &self.log_level {
            let valid = ["trace", "debug", "info", "warn", "error"];
            if !valid.contains(&level.to_lowercase().as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Invalid log_level '{}', expected one of {:?}",
                    level, valid
                )));
            }
        }

        Ok(())
    }

    /// Example configuration
    pub fn example() -> Self {
        Config {
            cache_dir: PathBuf::from("/var/cache/ocsp-cache"),
            log_level: Some("info".to_string()),
            freshness: FreshnessConfig::default(),
            fetch: FetchConfig::default(),
            signer: None,
            authorities: vec![
                AuthorityConfig {
                    certificate_path: PathBuf::from("/etc/ocsp-cache/ca/root.pem"),
                    responders: Vec::new(),
                    responder_certificate_paths: Vec::new(),
                },
                AuthorityConfig {
                    certificate_path: PathBuf::from("/etc/ocsp-cache/ca/issuing-ca.pem"),
                    responders: vec![
                        "http://ocsp.example.com".to_string(),
                        "http://ocsp-backup.example.com".to_string(),
                    ],
                    responder_certificate_paths: Vec::new(),
                },
            ],
            certificates: vec![CertificateConfig {
                path: PathBuf::from("/etc/ocsp-cache/certs/sign.pem"),
                active: true,
                registered: true,
            }],
        }
    }
}
