//! Durable quota snapshot, written through on every consumption

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::errors::Result;

/// Stored window state for one request-count credential
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialQuota {
    #[serde(default)]
    pub short_events: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub long_events: Vec<DateTime<Utc>>,
}

/// Stored monthly state for the volume-billed provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeQuota {
    pub used: usize,
    pub month_start: NaiveDate,
}

/// Whole-ledger snapshot as serialized to disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialQuota>,
    #[serde(default)]
    pub volume: Option<VolumeQuota>,
}

/// Whole-file read/rewrite persistence for quota state
///
/// Each mutation rewrites the file, so a crash loses at most the in-flight
/// request's accounting. The limiters own the state in memory; the ledger is
/// only read once at startup and written after every consumption.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    path: PathBuf,
}

impl QuotaLedger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the stored snapshot; a missing or unreadable file starts fresh
    ///
    /// Expired events are filtered by the limiters on restore, never trusted
    /// from the stored verdicts.
    pub fn load(&self) -> LedgerSnapshot {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no quota ledger on disk, starting fresh");
            return LedgerSnapshot::default();
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(path = %self.path.display(), "quota ledger unreadable, starting fresh: {e}");
                    LedgerSnapshot::default()
                }
            },
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read quota ledger: {e}");
                LedgerSnapshot::default()
            }
        }
    }

    /// Flush a snapshot to disk, replacing the previous one
    ///
    /// Written to a sibling temp file and renamed over the target, so a
    /// crash mid-write never leaves a truncated ledger behind.
    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)?;
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, content)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}
