//! PhotoRally Game Engine
//!
//! Platform-agnostic core logic for the PhotoRally scavenger-hunt game:
//! progression state machine, scoring, achievements, team ledger, and the
//! versioned backup/migration layer. Storage is abstracted behind the
//! traits below; browser backends live in `photorally-web`, in-memory
//! backends for native tests in [`memory`].

pub mod achievements;
pub mod backup;
pub mod constants;
pub mod engine;
pub mod memory;
pub mod migrate;
pub mod rally;
pub mod state;
pub mod teams;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

// Re-export commonly used types
pub use achievements::{ACHIEVEMENTS, AchievementDef, newly_unlocked, seen_ids, unlocked};
pub use backup::{BackupDocument, ImportError, ImportOutcome, export_backup, import_backup};
pub use constants::{
    EXPORT_VERSION, MAX_NOTE_LEN, MIGRATION_MARKER_KEY, bonus_photo_key, main_photo_key,
    quiz_points, seen_key, state_key, teams_key,
};
pub use engine::Session;
pub use memory::{FixedClock, MemoryPhotoStore, MemoryPhotoStores, MemoryStateStore};
pub use migrate::run_migrations;
pub use rally::{CatalogError, Checkpoint, CheckpointId, Hint, Quiz, Rally, RallyCatalog, Theme};
pub use state::{CheckpointStatus, CompletedEntry, GameState, QuizResult, format_elapsed};
pub use teams::{TeamEntry, TeamLedger};

/// Failure taxonomy shared by both storage tiers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The host reported storage pressure; the write was rejected before
    /// anything was persisted. Non-fatal, surfaced as a user warning.
    #[error("storage quota exceeded")]
    QuotaExceeded,
    /// No persistence mechanism is available at all.
    #[error("storage unavailable")]
    Unavailable,
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Advisory result of a storage-quota estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaStatus {
    /// Writes may proceed.
    pub ok: bool,
    /// Above the warning threshold; surface a heads-up to the player.
    pub warning: bool,
    /// Estimated usage in percent of quota (0 when unknown).
    pub pct: f64,
}

impl QuotaStatus {
    /// Status used when the host cannot estimate storage at all:
    /// treated as unlimited.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            ok: true,
            warning: false,
            pct: 0.0,
        }
    }

    /// Classify a usage percentage against the block/warn thresholds.
    #[must_use]
    pub fn from_pct(pct: f64) -> Self {
        Self {
            ok: pct < constants::QUOTA_BLOCK_PCT,
            warning: pct >= constants::QUOTA_WARN_PCT,
            pct,
        }
    }
}

/// Small-quota structured store for game metadata (state, ledger, seen
/// set). Values are JSON documents; photo payloads never go through here.
pub trait StateStore {
    /// Read and decode a record. Absent keys are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the value does not decode.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError>;

    /// Encode and write a record as one unit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QuotaExceeded`] under storage pressure;
    /// nothing is written in that case.
    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError>;

    /// Delete a record. Deleting an absent key is a no-op.
    fn remove(&self, key: &str);

    /// Whether a record exists, without decoding it.
    fn contains(&self, key: &str) -> bool;
}

/// Key-addressed large-binary store for photo payloads, namespaced per
/// rally. Payloads are encoded image strings (data URLs); the progression
/// engine is the sole writer and deleter.
#[async_trait(?Send)]
pub trait PhotoStore {
    /// Persist a payload under `key`, replacing any previous value.
    /// Performs the advisory quota check first and fails with
    /// [`StoreError::QuotaExceeded`] without writing when blocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota is exhausted or the backend fails.
    async fn save(&self, key: &str, payload: &str) -> Result<(), StoreError>;

    /// Fetch one payload; absent keys are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Fetch several payloads; the result covers every requested key,
    /// mapping absent ones to `None`.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<BTreeMap<String, Option<String>>, StoreError>;

    /// Every entry in this namespace, keyed exactly as stored.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn get_all(&self) -> Result<BTreeMap<String, String>, StoreError>;

    /// Delete one payload. Absent keys are tolerated (idempotent).
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete every entry in this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Advisory storage estimate; hosts without estimation report
    /// [`QuotaStatus::unlimited`].
    async fn quota(&self) -> QuotaStatus;
}

/// Opens a [`PhotoStore`] per namespace. Import and migrations need this
/// because they may target a rally other than the active one.
pub trait PhotoStores {
    type Store: PhotoStore;

    fn open(&self, namespace: &str) -> Self::Store;
}

/// Wall-clock seam so progression timestamps are testable.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
