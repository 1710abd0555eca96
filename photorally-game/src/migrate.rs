//! One-time storage-layout migrations.
//!
//! An ordered list of idempotent steps plus a persisted marker holding
//! the index of the next step to apply. Re-running after the marker
//! reaches the end is a no-op, and each step stays safe to re-check on
//! its own (a crash between step and marker write only repeats an
//! idempotent step).

use crate::constants::{self, bonus_photo_key, main_photo_key};
use crate::rally::RallyCatalog;
use crate::state::GameState;
use crate::{PhotoStore, PhotoStores, StateStore, StoreError};

/// Names of the migration steps, in application order. The marker stores
/// the count of applied steps, so appending here is the only allowed
/// evolution.
pub const MIGRATIONS: &[&str] = &[
    "namespace-structured-keys",
    "relocate-legacy-photo-store",
    "extract-inline-photo-payloads",
];

/// Apply every pending migration for this browser profile.
///
/// # Errors
///
/// Returns the first storage failure; the marker then still points at
/// the failed step, so the next run resumes there.
pub async fn run_migrations<S, PP>(
    store: &S,
    photo_stores: &PP,
    catalog: &RallyCatalog,
) -> Result<(), StoreError>
where
    S: StateStore,
    PP: PhotoStores,
{
    let applied = store
        .get::<usize>(constants::MIGRATION_MARKER_KEY)?
        .unwrap_or(0);

    for index in applied..MIGRATIONS.len() {
        log::info!("applying storage migration '{}'", MIGRATIONS[index]);
        match index {
            0 => namespace_structured_keys(store, catalog)?,
            1 => relocate_legacy_photo_store(photo_stores, catalog).await?,
            2 => extract_inline_photo_payloads(store, photo_stores, catalog).await?,
            _ => {}
        }
        store.set(constants::MIGRATION_MARKER_KEY, &(index + 1))?;
    }
    Ok(())
}

/// Step 1: copy the pre-multi-rally, non-namespaced structured records to
/// the namespaced keys of the default (first) rally. Existing namespaced
/// records are never overwritten, so re-running is harmless.
fn namespace_structured_keys<S: StateStore>(
    store: &S,
    catalog: &RallyCatalog,
) -> Result<(), StoreError> {
    let Some(default_id) = catalog.default_rally_id() else {
        return Ok(());
    };
    let moves = [
        (constants::LEGACY_STATE_KEY, constants::state_key(default_id)),
        (constants::LEGACY_TEAMS_KEY, constants::teams_key(default_id)),
        (constants::LEGACY_SEEN_KEY, constants::seen_key(default_id)),
    ];
    for (legacy_key, new_key) in moves {
        if store.contains(&new_key) {
            continue;
        }
        if let Some(value) = store.get::<serde_json::Value>(legacy_key)? {
            store.set(&new_key, &value)?;
            store.remove(legacy_key);
        }
    }
    Ok(())
}

/// Step 2: drain the legacy single photo database into the default
/// rally's namespaced store. The legacy namespace is emptied afterwards,
/// which also makes a re-run a natural no-op.
async fn relocate_legacy_photo_store<PP: PhotoStores>(
    photo_stores: &PP,
    catalog: &RallyCatalog,
) -> Result<(), StoreError> {
    let Some(default_id) = catalog.default_rally_id() else {
        return Ok(());
    };
    let legacy = photo_stores.open(constants::LEGACY_PHOTO_NAMESPACE);
    let target = photo_stores.open(&constants::photo_namespace(default_id));

    let payloads = legacy.get_all().await?;
    if payloads.is_empty() {
        return Ok(());
    }
    for (key, payload) in &payloads {
        target.save(key, payload).await?;
    }
    legacy.clear().await?;
    log::info!("relocated {} legacy photo payloads", payloads.len());
    Ok(())
}

/// Step 3: strip inline photo payloads out of every persisted game state,
/// moving them into the rally's photo store first. States without inline
/// payloads pass through untouched.
async fn extract_inline_photo_payloads<S, PP>(
    store: &S,
    photo_stores: &PP,
    catalog: &RallyCatalog,
) -> Result<(), StoreError>
where
    S: StateStore,
    PP: PhotoStores,
{
    for rally in catalog.rallies() {
        let key = constants::state_key(&rally.id);
        let Some(mut state) = store.get::<GameState>(&key)? else {
            continue;
        };
        let photos = photo_stores.open(&constants::photo_namespace(&rally.id));
        let mut moved = 0usize;
        for (id, entry) in &mut state.completed {
            if let Some(payload) = entry.photo_data.take() {
                photos.save(&main_photo_key(*id), &payload).await?;
                moved += 1;
            }
            if let Some(payload) = entry.bonus_photo_data.take() {
                photos.save(&bonus_photo_key(*id), &payload).await?;
                moved += 1;
            }
        }
        if moved > 0 {
            store.set(&key, &state)?;
            log::info!("extracted {moved} inline payloads for rally '{}'", rally.id);
        }
    }
    Ok(())
}
