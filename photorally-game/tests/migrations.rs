use futures::executor::block_on;
use photorally_game::memory::{MemoryPhotoStores, MemoryStateStore};
use photorally_game::rally::RallyCatalog;
use photorally_game::state::GameState;
use photorally_game::{MIGRATION_MARKER_KEY, PhotoStore, PhotoStores, StateStore, run_migrations};

fn catalog() -> RallyCatalog {
    RallyCatalog::from_json(
        r#"[
        {
            "id": "coast",
            "name": "Coast Rally",
            "checkpoints": [
                { "name": "Harbor", "points": 10 },
                { "name": "Lighthouse", "points": 20 }
            ]
        }
    ]"#,
    )
    .expect("test catalog is valid")
}

#[test]
fn legacy_structured_keys_move_to_the_default_rally_namespace() {
    let store = MemoryStateStore::new();
    let stores = MemoryPhotoStores::new();
    store
        .set("photoRally", &serde_json::json!({ "teamName": "Old-timers", "score": 10 }))
        .unwrap();
    store
        .set("photoRally_teams", &serde_json::json!([{ "name": "Old-timers", "score": 10 }]))
        .unwrap();
    store.set("photoRallyAchievements", &vec!["first_step"]).unwrap();

    block_on(run_migrations(&store, &stores, &catalog())).unwrap();

    assert!(store.contains("photorally_coast"));
    assert!(store.contains("photorally_coast_teams"));
    assert!(store.contains("photorallyAch_coast"));
    assert!(!store.contains("photoRally"), "legacy key removed after the move");

    let state: GameState = store.get("photorally_coast").unwrap().unwrap();
    assert_eq!(state.team_name, "Old-timers");
}

#[test]
fn namespaced_records_are_never_overwritten_by_legacy_ones() {
    let store = MemoryStateStore::new();
    let stores = MemoryPhotoStores::new();
    store
        .set("photorally_coast", &serde_json::json!({ "teamName": "Current", "score": 50 }))
        .unwrap();
    store
        .set("photoRally", &serde_json::json!({ "teamName": "Stale", "score": 1 }))
        .unwrap();

    block_on(run_migrations(&store, &stores, &catalog())).unwrap();

    let state: GameState = store.get("photorally_coast").unwrap().unwrap();
    assert_eq!(state.team_name, "Current");
}

#[test]
fn legacy_photo_database_drains_into_the_rally_namespace() {
    let store = MemoryStateStore::new();
    let stores = MemoryPhotoStores::new();
    block_on(async {
        let legacy = stores.open("photoRallyPhotos");
        legacy.save("main_1", "data:image/jpeg;base64,QUFB").await.unwrap();
        legacy.save("bonus_1", "data:image/jpeg;base64,QkJC").await.unwrap();

        run_migrations(&store, &stores, &catalog()).await.unwrap();

        let target = stores.open("photorallyPhotos_coast");
        assert_eq!(target.get_all().await.unwrap().len(), 2);
        assert!(legacy.get_all().await.unwrap().is_empty(), "legacy store drained");
    });
}

#[test]
fn inline_photo_payloads_move_out_of_persisted_state() {
    let store = MemoryStateStore::new();
    let stores = MemoryPhotoStores::new();
    store
        .set(
            "photorally_coast",
            &serde_json::json!({
                "teamName": "Pioneers",
                "score": 10,
                "completed": {
                    "1": {
                        "timestamp": "2024-03-10T10:00:00Z",
                        "bonusValidated": false,
                        "photoData": "data:image/jpeg;base64,SU5MSU5F"
                    }
                }
            }),
        )
        .unwrap();

    block_on(run_migrations(&store, &stores, &catalog())).unwrap();

    block_on(async {
        let photos = stores.open("photorallyPhotos_coast");
        assert_eq!(
            photos.get("main_1").await.unwrap().as_deref(),
            Some("data:image/jpeg;base64,SU5MSU5F")
        );
    });
    let raw = store.raw("photorally_coast").expect("state persisted");
    assert!(!raw.contains("photoData"), "inline payload stripped: {raw}");
}

#[test]
fn rerunning_migrations_is_a_no_op() {
    let store = MemoryStateStore::new();
    let stores = MemoryPhotoStores::new();
    block_on(run_migrations(&store, &stores, &catalog())).unwrap();
    let marker: usize = store.get(MIGRATION_MARKER_KEY).unwrap().unwrap();
    assert_eq!(marker, 3);

    // Plant a legacy key after the marker is set: a re-run ignores it.
    store
        .set("photoRally", &serde_json::json!({ "teamName": "Too late" }))
        .unwrap();
    block_on(run_migrations(&store, &stores, &catalog())).unwrap();
    assert!(!store.contains("photorally_coast"));
    assert!(store.contains("photoRally"));
}
