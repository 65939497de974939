//! Durable proof store
//!
//! One JSON record per certificate at `<dir>/<fingerprint>.json`. Records are
//! written to a temporary file, synced and renamed into place, so a crash
//! leaves either the old record or the new one.
//!
//! Reads return [`PersistedProof`], which is not evidence until
//! [`PersistedProof::verify`] has checked it against the issuer again.

use crate::error::CacheError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use ocsp_proto::{
    Certificate, CertificateFingerprint, OcspVerifier, RevocationError, RevocationProof,
};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    fingerprint: CertificateFingerprint,
    issuer: String,
    serial: String,
    produced_at: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
    stored_at: DateTime<Utc>,
    /// Base64 DER OCSPResponse
    response: String,
}

/// An unverified record read back from disk
#[derive(Debug, Clone)]
pub struct PersistedProof {
    pub fingerprint: CertificateFingerprint,
    /// Issuer subject DN
    pub issuer: String,
    /// Subject serial as lowercase hex
    pub serial: String,
    pub produced_at: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub stored_at: DateTime<Utc>,
    /// DER OCSPResponse
    pub response: Vec<u8>,
}

impl PersistedProof {
    /// Revalidate the stored response with `verifier` against `issuer`
    ///
    /// The record's own metadata must agree with the verified response.
    pub fn verify(
        &self,
        verifier: &OcspVerifier,
        issuer: &Certificate,
    ) -> Result<RevocationProof, RevocationError> {
        let proof = verifier.revalidate(&self.response, &self.fingerprint, &self.serial, issuer)?;
        if proof.issuer() != self.issuer
            || proof.produced_at() != self.produced_at
            || proof.next_update() != self.next_update
        {
            return Err(RevocationError::InvalidResponse(
                "record metadata disagrees with stored response".to_string(),
            ));
        }
        Ok(proof)
    }
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Open (and create if needed) the cache directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, fingerprint: &CertificateFingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.{}", fingerprint, RECORD_EXTENSION))
    }

    /// Read one record; `None` if absent
    pub async fn get(
        &self,
        fingerprint: &CertificateFingerprint,
    ) -> Result<Option<PersistedProof>, CacheError> {
        let bytes = match fs::read(self.record_path(fingerprint)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode_record(&bytes, fingerprint)
            .map(Some)
            .map_err(|message| CacheError::Persistence {
                fingerprint: fingerprint.clone(),
                message,
            })
    }

    /// Durably write the record for `proof`, replacing any previous one
    pub async fn put(
        &self,
        proof: &RevocationProof,
        stored_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let fingerprint = proof.fingerprint();
        let persistence = |e: std::io::Error| CacheError::Persistence {
            fingerprint: fingerprint.clone(),
            message: e.to_string(),
        };

        let record = DiskRecord {
            fingerprint: fingerprint.clone(),
            issuer: proof.issuer().to_string(),
            serial: proof.serial().to_string(),
            produced_at: proof.produced_at(),
            next_update: proof.next_update(),
            stored_at,
            response: STANDARD.encode(proof.response_der()),
        };
        let contents = serde_json::to_vec_pretty(&record)?;

        let final_path = self.record_path(fingerprint);
        let temp_path = self.dir.join(format!(
            "{}.{:08x}.{}",
            fingerprint,
            rand::random::<u32>(),
            TEMP_EXTENSION
        ));

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&contents).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &final_path).await?;
            sync_dir(&self.dir).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(persistence(e));
        }

        debug!(fingerprint = %fingerprint, path = %final_path.display(), "Persisted OCSP proof");
        Ok(())
    }

    /// Delete the record; absent records are not an error
    pub async fn remove(&self, fingerprint: &CertificateFingerprint) -> Result<(), CacheError> {
        match fs::remove_file(self.record_path(fingerprint)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Persistence {
                fingerprint: fingerprint.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Read every decodable record, skipping corrupt ones
    ///
    /// Leftover temporary files from interrupted writes are deleted.
    pub async fn load_all(&self) -> Result<Vec<PersistedProof>, CacheError> {
        let mut loaded = Vec::new();
        let mut skipped = 0usize;
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let extension = path.extension().and_then(|e| e.to_str());

            if extension == Some(TEMP_EXTENSION) {
                debug!(path = %path.display(), "Removing interrupted write");
                let _ = fs::remove_file(&path).await;
                continue;
            }
            if extension != Some(RECORD_EXTENSION) {
                continue;
            }

            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let Ok(fingerprint) = CertificateFingerprint::parse(stem) else {
                warn!(path = %path.display(), "Skipping cache file with unexpected name");
                skipped += 1;
                continue;
            };

            let decoded = match fs::read(&path).await {
                Ok(bytes) => decode_record(&bytes, &fingerprint),
                Err(e) => Err(e.to_string()),
            };
            match decoded {
                Ok(stored) => loaded.push(stored),
                Err(reason) => {
                    warn!(path = %path.display(), reason = %reason, "Skipping corrupt cache record");
                    skipped += 1;
                }
            }
        }

        debug!(loaded = loaded.len(), skipped = skipped, dir = %self.dir.display(), "Loaded disk cache");
        Ok(loaded)
    }
}

/// Decode one record and check it belongs to its file name
fn decode_record(
    bytes: &[u8],
    fingerprint: &CertificateFingerprint,
) -> Result<PersistedProof, String> {
    let record: DiskRecord = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    if &record.fingerprint != fingerprint {
        return Err(format!(
            "record fingerprint {} does not match file name",
            record.fingerprint
        ));
    }

    let response = STANDARD
        .decode(record.response.as_bytes())
        .map_err(|e| format!("response is not base64: {}", e))?;

    Ok(PersistedProof {
        fingerprint: record.fingerprint,
        issuer: record.issuer,
        serial: record.serial,
        produced_at: record.produced_at,
        next_update: record.next_update,
        stored_at: record.stored_at,
        response,
    })
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
