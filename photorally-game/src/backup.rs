//! Versioned backup export/import.
//!
//! One self-contained JSON document per rally: structured state, team
//! ledger, achievement seen set and every photo payload keyed exactly as
//! stored. Import is destructive by design (the caller confirms with the
//! player first) and must keep accepting every historical shape:
//!
//! * v3 (current): top-level `photos` map plus an explicit `rallyId`;
//! * v2: `photos` map but no trusted rally id (active rally assumed);
//! * v1: photo payloads embedded inline inside each `completed` entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{self, bonus_photo_key, main_photo_key};
use crate::state::GameState;
use crate::teams::TeamLedger;
use crate::{Clock, PhotoStore, PhotoStores, StateStore, StoreError};

/// The self-contained backup document for one rally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rally_id: Option<String>,
    #[serde(default)]
    pub export_date: Option<DateTime<Utc>>,
    pub game_state: GameState,
    #[serde(default)]
    pub teams: TeamLedger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievements_seen: Option<Vec<String>>,
    #[serde(default)]
    pub photos: BTreeMap<String, String>,
}

/// Rejection reasons for an import. Nothing is written once one of these
/// is raised.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid backup document: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What an import actually replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Rally namespace the document was applied to.
    pub rally_id: String,
    pub photos_restored: usize,
}

/// Assemble the current backup document for one rally from both storage
/// tiers.
///
/// # Errors
///
/// Returns an error when either store cannot be read.
pub async fn export_backup<S, P, C>(
    store: &S,
    photos: &P,
    rally_id: &str,
    clock: &C,
) -> Result<BackupDocument, StoreError>
where
    S: StateStore,
    P: PhotoStore,
    C: Clock,
{
    let game_state = store
        .get::<GameState>(&constants::state_key(rally_id))?
        .unwrap_or_default();
    let teams = store
        .get::<TeamLedger>(&constants::teams_key(rally_id))?
        .unwrap_or_default();
    let seen = store
        .get::<Vec<String>>(&constants::seen_key(rally_id))?
        .unwrap_or_default();
    let all_photos = photos.get_all().await?;

    Ok(BackupDocument {
        version: constants::EXPORT_VERSION,
        rally_id: Some(rally_id.to_string()),
        export_date: Some(clock.now()),
        game_state,
        teams,
        achievements_seen: Some(seen),
        photos: all_photos,
    })
}

/// Parse and fully validate a backup document without side effects.
///
/// # Errors
///
/// Returns [`ImportError::Invalid`] with a specific reason when the
/// mandatory version/state fields are missing or malformed.
pub fn parse_backup(json: &str) -> Result<BackupDocument, ImportError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|err| ImportError::Invalid(format!("not valid JSON: {err}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| ImportError::Invalid("not a JSON object".to_string()))?;
    match object.get("version").and_then(serde_json::Value::as_u64) {
        None => return Err(ImportError::Invalid("missing version field".to_string())),
        Some(0) => return Err(ImportError::Invalid("version 0 is invalid".to_string())),
        Some(_) => {}
    }
    if !object
        .get("gameState")
        .is_some_and(serde_json::Value::is_object)
    {
        return Err(ImportError::Invalid("missing gameState field".to_string()));
    }
    serde_json::from_value(value)
        .map_err(|err| ImportError::Invalid(format!("malformed fields: {err}")))
}

/// Apply a backup document: replace state, ledger, seen set and photo
/// namespace for the target rally. Destructive; validate-then-write, so
/// a rejected document has no partial effects.
///
/// # Errors
///
/// Returns [`ImportError::Invalid`] for malformed documents (nothing
/// written) or a [`StoreError`] from the replacement writes.
pub async fn import_backup<S, PP>(
    store: &S,
    photo_stores: &PP,
    active_rally_id: &str,
    json: &str,
) -> Result<ImportOutcome, ImportError>
where
    S: StateStore,
    PP: PhotoStores,
{
    let mut doc = parse_backup(json)?;

    // v3 documents carry their own rally identity; older ones apply to
    // whatever rally is active right now.
    let rally_id = if doc.version >= 3 {
        doc.rally_id
            .clone()
            .unwrap_or_else(|| active_rally_id.to_string())
    } else {
        active_rally_id.to_string()
    };

    // v1 kept photo payloads inline in the completion entries; lift them
    // into the photo map and strip them so they are not duplicated in the
    // persisted state.
    if doc.version == 1 {
        for (id, entry) in &mut doc.game_state.completed {
            if let Some(payload) = entry.photo_data.take() {
                doc.photos.insert(main_photo_key(*id), payload);
            }
            if let Some(payload) = entry.bonus_photo_data.take() {
                doc.photos.insert(bonus_photo_key(*id), payload);
            }
        }
    }

    store.set(&constants::state_key(&rally_id), &doc.game_state)?;
    store.set(&constants::teams_key(&rally_id), &doc.teams)?;
    if let Some(seen) = &doc.achievements_seen {
        store.set(&constants::seen_key(&rally_id), seen)?;
    }

    let photos = photo_stores.open(&constants::photo_namespace(&rally_id));
    photos.clear().await?;
    for (key, payload) in &doc.photos {
        photos.save(key, payload).await?;
    }

    log::info!(
        "imported backup v{} into rally '{rally_id}' ({} photos)",
        doc.version,
        doc.photos.len()
    );
    Ok(ImportOutcome {
        rally_id,
        photos_restored: doc.photos.len(),
    })
}
