//! Browser-side checks for the IndexedDB photo store. Run with a wasm
//! test runner; on native targets the whole file compiles to nothing.

#![cfg(target_arch = "wasm32")]

use photorally_web::WebPhotoStore;
use photorally_web::game::PhotoStore;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

const PHOTO: &str = "data:image/jpeg;base64,QUFB";

#[wasm_bindgen_test]
async fn save_is_durable_once_it_resolves() {
    let store = WebPhotoStore::new("photorallyPhotos_test_durability");
    store.clear().await.expect("clear");

    store.save("main_1", PHOTO).await.expect("save commits");

    // A resolved save must be visible to a fresh handle (and therefore a
    // fresh transaction), not just to the request that issued the put.
    let fresh = WebPhotoStore::new("photorallyPhotos_test_durability");
    assert_eq!(fresh.get("main_1").await.expect("get").as_deref(), Some(PHOTO));
}

#[wasm_bindgen_test]
async fn delete_commits_and_tolerates_absent_keys() {
    let store = WebPhotoStore::new("photorallyPhotos_test_delete");
    store.clear().await.expect("clear");
    store.save("main_1", PHOTO).await.expect("save");

    store.delete("main_1").await.expect("delete commits");
    store.delete("main_1").await.expect("deleting again is a no-op");

    let fresh = WebPhotoStore::new("photorallyPhotos_test_delete");
    assert_eq!(fresh.get("main_1").await.expect("get"), None);
}

#[wasm_bindgen_test]
async fn clear_empties_the_namespace() {
    let store = WebPhotoStore::new("photorallyPhotos_test_clear");
    store.save("main_1", PHOTO).await.expect("save");
    store.save("bonus_1", PHOTO).await.expect("save");

    store.clear().await.expect("clear commits");

    let fresh = WebPhotoStore::new("photorallyPhotos_test_clear");
    assert!(fresh.get_all().await.expect("get_all").is_empty());
}
