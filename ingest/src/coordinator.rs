//! Instance coordinator (C10): filesystem-backed claim/heartbeat/steal
//! protocol letting multiple engine instances split a symbol universe
//! without a shared database, per `spec.md` §4.9/§6.
//!
//! Cross-instance races are resolved by the filesystem itself (last
//! create/rename wins); this type only serializes the *local* process's view
//! with a mutex around the read-check-write sequence, per §5's "claim
//! directory — per-process mutex plus filesystem as cross-process arbiter".

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ingest_types::{CoordinatorConfig, IngestError, SymbolClaim};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// On-disk claim file shape, `spec.md` §6's exact wire format. Kept distinct
/// from [`ingest_types::SymbolClaim`] (whose fields serialize as
/// `ownerId`/`heartbeatAt`) so the file format matches the spec precisely
/// without renaming the shared in-memory type (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimFile {
    symbol: String,
    instance_id: String,
    claimed_at: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
}

impl From<&ClaimFile> for SymbolClaim {
    fn from(f: &ClaimFile) -> Self {
        Self {
            symbol: f.symbol.clone(),
            owner_id: f.instance_id.clone(),
            claimed_at: f.claimed_at,
            heartbeat_at: f.last_heartbeat,
        }
    }
}

/// Replace `/`, `\`, `:` with `_`, per `spec.md` §6's `SAFE_SYMBOL` rule.
fn sanitize_symbol(symbol: &str) -> String {
    symbol.replace(['/', '\\', ':'], "_")
}

fn claim_path(dir: &Path, symbol: &str) -> PathBuf {
    dir.join(format!("{}.claim.json", sanitize_symbol(symbol)))
}

/// Coordinates exclusive ownership of symbols across engine instances via a
/// shared claim directory.
pub struct InstanceCoordinator {
    instance_id: String,
    cfg: CoordinatorConfig,
    /// Symbols this process currently believes it owns.
    owned: Mutex<HashMap<String, ()>>,
}

impl InstanceCoordinator {
    /// Create a coordinator identified by `instance_id` (e.g. `host-pid`),
    /// writing claims under `cfg.claim_dir`.
    #[must_use]
    pub fn new(instance_id: impl Into<String>, cfg: CoordinatorConfig) -> Self {
        Self {
            instance_id: instance_id.into(),
            cfg,
            owned: Mutex::new(HashMap::new()),
        }
    }

    async fn ensure_dir(&self) -> Result<(), IngestError> {
        tokio::fs::create_dir_all(&self.cfg.claim_dir)
            .await
            .map_err(|e| IngestError::Io(e.to_string()))
    }

    async fn read_claim(&self, symbol: &str) -> Result<Option<ClaimFile>, IngestError> {
        let path = claim_path(&self.cfg.claim_dir, symbol);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map(Some).map_err(|e| IngestError::Data(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IngestError::Io(e.to_string())),
        }
    }

    async fn write_claim(&self, claim: &ClaimFile) -> Result<(), IngestError> {
        let path = claim_path(&self.cfg.claim_dir, &claim.symbol);
        let bytes = serde_json::to_vec_pretty(claim).map_err(|e| IngestError::Data(e.to_string()))?;
        let tmp = path.with_extension("claim.json.tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| IngestError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| IngestError::Io(e.to_string()))
    }

    fn is_stale(&self, claim: &ClaimFile, now: DateTime<Utc>) -> bool {
        let age = now - claim.last_heartbeat;
        age.to_std().unwrap_or_default() > self.cfg.stale_timeout
    }

    /// Attempt to claim `symbol` for this instance.
    ///
    /// Returns `Ok(true)` if the claim was acquired or refreshed, `Ok(false)`
    /// if another live instance already owns it.
    ///
    /// # Errors
    /// Returns [`IngestError::Io`]/[`IngestError::Data`] on filesystem or
    /// serialization failure.
    pub async fn try_claim(&self, symbol: &str) -> Result<bool, IngestError> {
        self.ensure_dir().await?;
        let mut owned = self.owned.lock().await;
        let now = Utc::now();
        let existing = self.read_claim(symbol).await?;

        let should_write = match &existing {
            None => true,
            Some(claim) if claim.instance_id == self.instance_id => true,
            Some(claim) if self.is_stale(claim, now) => true,
            Some(_) => false,
        };

        if !should_write {
            owned.remove(symbol);
            return Ok(false);
        }

        let claimed_at = existing
            .as_ref()
            .filter(|c| c.instance_id == self.instance_id)
            .map_or(now, |c| c.claimed_at);
        let claim = ClaimFile {
            symbol: symbol.to_string(),
            instance_id: self.instance_id.clone(),
            claimed_at,
            last_heartbeat: now,
        };
        self.write_claim(&claim).await?;
        owned.insert(symbol.to_string(), ());
        Ok(true)
    }

    /// Release a locally-owned claim, deleting the file iff we still own it.
    ///
    /// # Errors
    /// Returns [`IngestError::Io`] on filesystem failure other than
    /// not-found.
    pub async fn release(&self, symbol: &str) -> Result<(), IngestError> {
        let mut owned = self.owned.lock().await;
        if let Some(claim) = self.read_claim(symbol).await?
            && claim.instance_id == self.instance_id
        {
            let path = claim_path(&self.cfg.claim_dir, symbol);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(IngestError::Io(e.to_string())),
            }
        }
        owned.remove(symbol);
        Ok(())
    }

    /// For each locally-owned symbol, re-read its file and refresh the
    /// heartbeat if still ours; drop it from the local set (with a warning)
    /// if another instance has since taken it over.
    ///
    /// # Errors
    /// Returns [`IngestError::Io`]/[`IngestError::Data`] on filesystem or
    /// serialization failure while refreshing.
    pub async fn refresh_heartbeat(&self) -> Result<(), IngestError> {
        let symbols: Vec<String> = self.owned.lock().await.keys().cloned().collect();
        let now = Utc::now();
        for symbol in symbols {
            match self.read_claim(&symbol).await? {
                Some(claim) if claim.instance_id == self.instance_id => {
                    let refreshed = ClaimFile {
                        last_heartbeat: now,
                        ..claim
                    };
                    self.write_claim(&refreshed).await?;
                }
                _ => {
                    tracing_warn_lost_claim(&symbol, &self.instance_id);
                    self.owned.lock().await.remove(&symbol);
                }
            }
        }
        Ok(())
    }

    /// Sweep the claim directory, deleting any file whose heartbeat is older
    /// than `cfg.stale_timeout`. Returns the number reclaimed.
    ///
    /// # Errors
    /// Returns [`IngestError::Io`] if the directory cannot be read.
    pub async fn reclaim_stale(&self) -> Result<u64, IngestError> {
        self.ensure_dir().await?;
        let mut reclaimed = 0u64;
        let mut entries = tokio::fs::read_dir(&self.cfg.claim_dir)
            .await
            .map_err(|e| IngestError::Io(e.to_string()))?;
        let now = Utc::now();
        while let Some(entry) = entries.next_entry().await.map_err(|e| IngestError::Io(e.to_string()))? {
            let path = entry.path();
            if path.extension().and_then(std::ffi::OsStr::to_str) != Some("json") {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else { continue };
            let Ok(claim) = serde_json::from_slice::<ClaimFile>(&bytes) else { continue };
            if self.is_stale(&claim, now) && tokio::fs::remove_file(&path).await.is_ok() {
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    /// Snapshot of non-stale `(symbol -> owning instance)` across the whole
    /// claim directory, regardless of which instance owns each symbol.
    ///
    /// # Errors
    /// Returns [`IngestError::Io`] if the directory cannot be read.
    pub async fn get_all_claims(&self) -> Result<Vec<SymbolClaim>, IngestError> {
        self.ensure_dir().await?;
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.cfg.claim_dir)
            .await
            .map_err(|e| IngestError::Io(e.to_string()))?;
        let now = Utc::now();
        while let Some(entry) = entries.next_entry().await.map_err(|e| IngestError::Io(e.to_string()))? {
            let path = entry.path();
            let Ok(bytes) = tokio::fs::read(&path).await else { continue };
            let Ok(claim) = serde_json::from_slice::<ClaimFile>(&bytes) else { continue };
            if !self.is_stale(&claim, now) {
                out.push(SymbolClaim::from(&claim));
            }
        }
        Ok(out)
    }
}

fn tracing_warn_lost_claim(symbol: &str, instance_id: &str) {
    tracing::warn!(symbol, instance_id, "claim lost to another instance during heartbeat refresh");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(dir: &Path) -> CoordinatorConfig {
        CoordinatorConfig {
            claim_dir: dir.to_path_buf(),
            stale_timeout: std::time::Duration::from_secs(60),
            heartbeat_interval: std::time::Duration::from_secs(20),
        }
    }

    #[tokio::test]
    async fn claims_an_unowned_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let coord = InstanceCoordinator::new("host-1", cfg(dir.path()));
        assert!(coord.try_claim("AAPL").await.unwrap());
    }

    #[tokio::test]
    async fn second_instance_cannot_steal_a_fresh_claim() {
        let dir = tempfile::tempdir().unwrap();
        let a = InstanceCoordinator::new("host-a", cfg(dir.path()));
        let b = InstanceCoordinator::new("host-b", cfg(dir.path()));
        assert!(a.try_claim("AAPL").await.unwrap());
        assert!(!b.try_claim("AAPL").await.unwrap());
    }

    #[tokio::test]
    async fn stale_claim_can_be_stolen() {
        let dir = tempfile::tempdir().unwrap();
        let mut stale_cfg = cfg(dir.path());
        stale_cfg.stale_timeout = std::time::Duration::from_millis(1);
        let a = InstanceCoordinator::new("host-a", stale_cfg.clone());
        let b = InstanceCoordinator::new("host-b", stale_cfg);
        assert!(a.try_claim("AAPL").await.unwrap());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(b.try_claim("AAPL").await.unwrap());
    }

    #[tokio::test]
    async fn release_removes_the_file_only_if_still_owned() {
        let dir = tempfile::tempdir().unwrap();
        let a = InstanceCoordinator::new("host-a", cfg(dir.path()));
        a.try_claim("AAPL").await.unwrap();
        a.release("AAPL").await.unwrap();
        assert!(a.try_claim("AAPL").await.unwrap());
    }

    #[tokio::test]
    async fn reclaim_stale_sweeps_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut stale_cfg = cfg(dir.path());
        stale_cfg.stale_timeout = std::time::Duration::from_millis(1);
        let a = InstanceCoordinator::new("host-a", stale_cfg);
        a.try_claim("AAPL").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let n = a.reclaim_stale().await.unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn get_all_claims_lists_non_stale_owners() {
        let dir = tempfile::tempdir().unwrap();
        let a = InstanceCoordinator::new("host-a", cfg(dir.path()));
        a.try_claim("AAPL").await.unwrap();
        a.try_claim("MSFT").await.unwrap();
        let claims = a.get_all_claims().await.unwrap();
        assert_eq!(claims.len(), 2);
    }
}
