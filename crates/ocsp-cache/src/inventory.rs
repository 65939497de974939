//! Certificates the cache keeps proofs for

use crate::config::{Config, ConfigError};
use crate::trust::load_certificate;
use ocsp_proto::Certificate;

/// A certificate held by this server, with its lifecycle flags
#[derive(Debug, Clone)]
pub struct InventoryCertificate {
    /// Operator-facing identifier (the file path for file-backed inventories)
    pub id: String,
    pub certificate: Certificate,
    pub active: bool,
    pub registered: bool,
}

pub trait CertificateInventory: Send + Sync {
    fn certificates(&self) -> Vec<InventoryCertificate>;
}

/// Fixed inventory loaded at startup
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    certificates: Vec<InventoryCertificate>,
}

impl StaticInventory {
    pub fn new(certificates: Vec<InventoryCertificate>) -> Self {
        Self { certificates }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let certificates = config
            .certificates
            .iter()
            .map(|entry| {
                Ok(InventoryCertificate {
                    id: entry.path.display().to_string(),
                    certificate: load_certificate(&entry.path)?,
                    active: entry.active,
                    registered: entry.registered,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self::new(certificates))
    }
}

impl CertificateInventory for StaticInventory {
    fn certificates(&self) -> Vec<InventoryCertificate> {
        self.certificates.clone()
    }
}
