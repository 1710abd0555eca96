//! Centralized tuning constants and storage-key helpers for PhotoRally.
//!
//! Every persisted record is namespaced by rally id through the helpers
//! below; nothing else in the workspace builds a storage key by hand.

// Storage keys -------------------------------------------------------------
pub(crate) const STATE_KEY_PREFIX: &str = "photorally_";
pub(crate) const TEAMS_KEY_SUFFIX: &str = "_teams";
pub(crate) const SEEN_KEY_PREFIX: &str = "photorallyAch_";
pub(crate) const PHOTO_NAMESPACE_PREFIX: &str = "photorallyPhotos_";

/// Marker key holding the index of the next storage migration to apply.
pub const MIGRATION_MARKER_KEY: &str = "photorally_migration";

// Legacy (pre-namespacing) keys, consumed only by migrations ---------------
pub(crate) const LEGACY_STATE_KEY: &str = "photoRally";
pub(crate) const LEGACY_TEAMS_KEY: &str = "photoRally_teams";
pub(crate) const LEGACY_SEEN_KEY: &str = "photoRallyAchievements";
pub(crate) const LEGACY_PHOTO_NAMESPACE: &str = "photoRallyPhotos";

/// Key for the structured `GameState` record of one rally.
#[must_use]
pub fn state_key(rally_id: &str) -> String {
    format!("{STATE_KEY_PREFIX}{rally_id}")
}

/// Key for the team ledger record of one rally.
#[must_use]
pub fn teams_key(rally_id: &str) -> String {
    format!("{STATE_KEY_PREFIX}{rally_id}{TEAMS_KEY_SUFFIX}")
}

/// Key for the achievement "seen" record of one rally.
#[must_use]
pub fn seen_key(rally_id: &str) -> String {
    format!("{SEEN_KEY_PREFIX}{rally_id}")
}

/// Photo-store namespace (database name) for one rally.
#[must_use]
pub fn photo_namespace(rally_id: &str) -> String {
    format!("{PHOTO_NAMESPACE_PREFIX}{rally_id}")
}

/// Photo key for the required checkpoint photo.
#[must_use]
pub fn main_photo_key(checkpoint_id: u32) -> String {
    format!("main_{checkpoint_id}")
}

/// Photo key for the optional bonus-challenge photo.
#[must_use]
pub fn bonus_photo_key(checkpoint_id: u32) -> String {
    format!("bonus_{checkpoint_id}")
}

// Scoring ------------------------------------------------------------------
/// Fixed quiz award per difficulty tier (1..=3). Unknown tiers award 0.
#[must_use]
pub fn quiz_points(difficulty: u8) -> u32 {
    match difficulty {
        1 => 5,
        2 => 10,
        3 => 15,
        _ => 0,
    }
}

/// Maximum stored length of a checkpoint note, after trimming.
pub const MAX_NOTE_LEN: usize = 500;

// Quota thresholds (percent of the host storage estimate) ------------------
pub(crate) const QUOTA_BLOCK_PCT: f64 = 95.0;
pub(crate) const QUOTA_WARN_PCT: f64 = 80.0;

// Rally document validation bounds -----------------------------------------
pub(crate) const MIN_CHECKPOINTS: usize = 2;
pub(crate) const MAX_CHECKPOINTS: usize = 200;
pub(crate) const MAX_RALLY_NAME_LEN: usize = 100;
pub(crate) const MAX_SUBTITLE_LEN: usize = 200;
pub(crate) const MAX_RALLY_DESC_LEN: usize = 2000;
pub(crate) const MAX_SHORT_NAME_LEN: usize = 40;
pub(crate) const MAX_RULES_TEXT_LEN: usize = 500;
pub(crate) const MAX_CHECKPOINT_NAME_LEN: usize = 100;
pub(crate) const MAX_CHECKPOINT_DESC_LEN: usize = 1000;
pub(crate) const MAX_PHOTO_HINT_LEN: usize = 500;
pub(crate) const MAX_BONUS_CHALLENGE_LEN: usize = 500;
pub(crate) const MAX_HINTS_PER_CHECKPOINT: usize = 10;
pub(crate) const MAX_HINT_TEXT_LEN: usize = 500;
pub(crate) const MAX_HINT_PENALTY: u32 = 100;
pub(crate) const MAX_CHECKPOINT_POINTS: u32 = 1000;
pub(crate) const MIN_MAP_ZOOM: f64 = 1.0;
pub(crate) const MAX_MAP_ZOOM: f64 = 20.0;

// Achievement tuning -------------------------------------------------------
pub(crate) const SPEED_RUN_CHECKPOINTS: usize = 3;
pub(crate) const SPEED_RUN_WINDOW_MINUTES: i64 = 30;
pub(crate) const FAST_FINISH_HOURS: i64 = 8;
pub(crate) const HIGH_SCORE_RATIO: f64 = 0.75;

// Backup format ------------------------------------------------------------
/// Version written by `export_backup`. Import accepts 1..=EXPORT_VERSION.
pub const EXPORT_VERSION: u32 = 3;
