//! Browser session bootstrap: built-in rally catalog, one-time storage
//! migrations, and session construction over the web storage backends.

use photorally_game::constants::photo_namespace;
use photorally_game::rally::RallyCatalog;
use photorally_game::{CatalogError, Session, StoreError, SystemClock, run_migrations};

use crate::photos::{WebPhotoStore, WebPhotoStores};
use crate::storage::WebStateStore;

/// Session type used by the browser frontend.
pub type WebSession = Session<WebStateStore, WebPhotoStore, SystemClock>;

/// Parse the rally catalog shipped with the app bundle.
///
/// # Errors
///
/// Returns an error when the bundled catalog does not parse or a rally
/// definition fails validation.
pub fn builtin_catalog() -> Result<RallyCatalog, CatalogError> {
    RallyCatalog::from_json(include_str!("../static/assets/data/rallies.json"))
}

/// Open a session for `rally_id`, running any pending storage migrations
/// first. Unknown rally ids yield `Ok(None)`.
///
/// # Errors
///
/// Returns the first storage failure from the migration pass.
#[allow(clippy::future_not_send)] // Wasm futures rely on `JsFuture`, which is not `Send`.
pub async fn start_session(
    catalog: &RallyCatalog,
    rally_id: &str,
) -> Result<Option<WebSession>, StoreError> {
    let Some(rally) = catalog.select(rally_id) else {
        return Ok(None);
    };

    let store = WebStateStore::new();
    let photo_stores = WebPhotoStores;
    run_migrations(&store, &photo_stores, catalog).await?;

    let photos = WebPhotoStore::new(photo_namespace(rally_id));
    Ok(Some(Session::load(rally.clone(), store, photos, SystemClock)))
}
