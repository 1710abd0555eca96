use chrono::{Duration, TimeZone, Utc};
use futures::executor::block_on;
use photorally_game::memory::{FixedClock, MemoryPhotoStores, MemoryStateStore};
use photorally_game::rally::RallyCatalog;
use photorally_game::state::CheckpointStatus;
use photorally_game::{PhotoStore, PhotoStores, Session, StoreError};

const PHOTO: &str = "data:image/jpeg;base64,QUFB";

fn catalog() -> RallyCatalog {
    RallyCatalog::from_json(
        r#"[
        {
            "id": "coast",
            "name": "Coast Rally",
            "checkpoints": [
                {
                    "name": "Harbor",
                    "points": 10,
                    "bonusChallenge": "Photo with a fishing boat",
                    "bonusPoints": 15,
                    "hints": [
                        { "text": "Look for the red crane", "penalty": 5 },
                        { "text": "Behind the fish market", "penalty": 10 }
                    ]
                },
                {
                    "name": "Lighthouse",
                    "points": 20,
                    "quiz": {
                        "question": "When was the lighthouse built?",
                        "choices": ["1820", "1905", "1956"],
                        "answer": 2,
                        "difficulty": 1
                    }
                },
                { "name": "Old Town", "points": 30 }
            ]
        }
    ]"#,
    )
    .expect("test rally is valid")
}

fn session() -> (
    Session<MemoryStateStore, photorally_game::memory::MemoryPhotoStore, FixedClock>,
    MemoryStateStore,
    MemoryPhotoStores,
    FixedClock,
) {
    let _ = env_logger::builder().is_test(true).try_init();
    let catalog = catalog();
    let rally = catalog.select("coast").expect("registered").clone();
    let store = MemoryStateStore::new();
    let stores = MemoryPhotoStores::new();
    let photos = stores.open("photorallyPhotos_coast");
    let clock = FixedClock::at(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
    let session = Session::load(rally, store.clone(), photos, clock.clone());
    (session, store, stores, clock)
}

#[test]
fn sequential_run_scores_and_finishes() {
    let (mut session, _, _, clock) = session();
    session.start_game("Foxes", false);

    block_on(async {
        assert!(session.complete_checkpoint(1, PHOTO).await.unwrap());
        assert_eq!(session.state().score, 10);
        assert_eq!(session.state().current_checkpoint, 2);

        clock.advance(Duration::minutes(40));
        assert!(session.complete_checkpoint(2, PHOTO).await.unwrap());
        assert_eq!(session.state().score, 30);
        assert_eq!(session.state().current_checkpoint, 3);

        clock.advance(Duration::minutes(40));
        assert!(session.complete_checkpoint(3, PHOTO).await.unwrap());
        assert_eq!(session.state().score, 60);
        assert!(session.state().finished);
        assert!(session.state().end_time.is_some());
    });

    // The ledger saw the final score and the elapsed run time.
    let entry = &session.teams().entries()[0];
    assert_eq!(entry.name, "Foxes");
    assert_eq!(entry.score, 60);
    assert_eq!(entry.elapsed, Some(80 * 60 * 1000));
}

#[test]
fn locked_checkpoints_reject_completion() {
    let (mut session, _, _, _) = session();
    session.start_game("Foxes", false);

    block_on(async {
        // Checkpoint 3 is locked while the pointer is at 1.
        assert_eq!(session.state().status(session.rally(), 3), CheckpointStatus::Locked);
        assert!(!session.complete_checkpoint(3, PHOTO).await.unwrap());
        assert_eq!(session.state().score, 0);
        assert!(session.state().completed.is_empty());
        // Unknown ids are silent no-ops too.
        assert!(!session.complete_checkpoint(99, PHOTO).await.unwrap());
    });
}

#[test]
fn free_mode_completes_in_any_order() {
    let (mut session, _, _, _) = session();
    session.start_game("Foxes", true);

    block_on(async {
        assert!(session.complete_checkpoint(3, PHOTO).await.unwrap());
        assert!(session.complete_checkpoint(1, PHOTO).await.unwrap());
        assert_eq!(session.state().score, 40);
        assert!(!session.state().finished);
    });
}

#[test]
fn exactly_one_status_holds_throughout_a_run() {
    let (mut session, _, _, _) = session();
    session.start_game("Foxes", false);

    let assert_partition = |session: &Session<_, _, _>| {
        for cp in &session.rally().checkpoints.clone() {
            let state = session.state();
            let count = [
                state.is_locked(session.rally(), cp.id),
                state.is_current(cp.id),
                state.is_completed(cp.id),
            ]
            .iter()
            .filter(|&&flag| flag)
            .count();
            assert_eq!(count, 1, "checkpoint {}", cp.id);
        }
    };

    block_on(async {
        assert_partition(&session);
        session.complete_checkpoint(1, PHOTO).await.unwrap();
        assert_partition(&session);
        session.complete_checkpoint(2, PHOTO).await.unwrap();
        assert_partition(&session);
        session.uncomplete_checkpoint(1).await;
        assert_partition(&session);
    });
}

#[test]
fn hints_charge_penalties_floored_at_zero() {
    let (mut session, _, _, _) = session();
    session.start_game("Foxes", false);

    block_on(async {
        session.complete_checkpoint(1, PHOTO).await.unwrap();
    });
    assert_eq!(session.state().score, 10);

    let first = session.use_hint(1).expect("first hint");
    assert_eq!(first.text, "Look for the red crane");
    assert_eq!(session.state().score, 5);

    // Second penalty is 10 but only 5 points remain: floor at zero.
    let second = session.use_hint(1).expect("second hint");
    assert_eq!(second.penalty, 10);
    assert_eq!(session.state().score, 0);

    // No third hint exists; score unchanged.
    assert!(session.use_hint(1).is_none());
    assert_eq!(session.state().score, 0);
    assert_eq!(session.state().hints_used(1), 2);
}

#[test]
fn quiz_is_one_shot_right_or_wrong() {
    let (mut session, _, _, _) = session();
    session.start_game("Foxes", false);

    let result = session.validate_quiz(2, 2).expect("first answer counts");
    assert!(result.correct);
    assert_eq!(result.points, 5);
    assert_eq!(session.state().score, 5);

    // The quiz cannot be retaken, not even with a different answer.
    assert!(session.validate_quiz(2, 0).is_none());
    assert_eq!(session.state().score, 5);
    assert!(session.state().quiz_result(2).expect("recorded").correct);

    // Checkpoints without a quiz yield nothing.
    assert!(session.validate_quiz(1, 0).is_none());
}

#[test]
fn wrong_quiz_answer_is_recorded_without_points() {
    let (mut session, _, _, _) = session();
    session.start_game("Foxes", false);

    let result = session.validate_quiz(2, 0).expect("recorded");
    assert!(!result.correct);
    assert_eq!(result.points, 0);
    assert_eq!(session.state().score, 0);
    assert!(session.validate_quiz(2, 2).is_none(), "no retake after a miss");
}

#[test]
fn bonus_validation_requires_completion_and_is_reversible() {
    let (mut session, _, stores, _) = session();
    session.start_game("Foxes", false);

    block_on(async {
        // Bonus before completion: silent no-op.
        assert!(!session.validate_bonus(1, PHOTO).await.unwrap());

        session.complete_checkpoint(1, PHOTO).await.unwrap();
        assert!(session.validate_bonus(1, PHOTO).await.unwrap());
        assert_eq!(session.state().bonus_score, 15);
        // Double validation is a no-op.
        assert!(!session.validate_bonus(1, PHOTO).await.unwrap());

        let photos = stores.open("photorallyPhotos_coast");
        assert!(photos.get("bonus_1").await.unwrap().is_some());

        assert!(session.delete_bonus_photo(1).await);
        assert_eq!(session.state().bonus_score, 0);
        assert!(photos.get("bonus_1").await.unwrap().is_none());
        // Deleting again without a validated bonus: no-op.
        assert!(!session.delete_bonus_photo(1).await);
    });
}

#[test]
fn uncomplete_is_the_exact_inverse_of_complete_plus_bonus() {
    let (mut session, _, stores, _) = session();
    session.start_game("Foxes", false);

    block_on(async {
        let before = session.state().clone();

        session.complete_checkpoint(1, PHOTO).await.unwrap();
        session.validate_bonus(1, PHOTO).await.unwrap();
        session.uncomplete_checkpoint(1).await;

        let after = session.state();
        assert_eq!(after.score, before.score);
        assert_eq!(after.bonus_score, before.bonus_score);
        assert_eq!(after.completed, before.completed);
        assert_eq!(after.current_checkpoint, before.current_checkpoint);
        assert_eq!(after.finished, before.finished);

        let photos = stores.open("photorallyPhotos_coast");
        assert!(photos.get("main_1").await.unwrap().is_none());
        assert!(photos.get("bonus_1").await.unwrap().is_none());
    });
}

#[test]
fn uncomplete_unfinishes_and_rewinds_the_pointer() {
    let (mut session, _, _, _) = session();
    session.start_game("Foxes", false);

    block_on(async {
        for id in 1..=3 {
            session.complete_checkpoint(id, PHOTO).await.unwrap();
        }
        assert!(session.state().finished);

        session.uncomplete_checkpoint(2).await;
        assert!(!session.state().finished);
        assert!(session.state().end_time.is_none());
        assert_eq!(session.state().current_checkpoint, 2);

        // Recompleting skips over the still-completed checkpoint 3.
        session.complete_checkpoint(2, PHOTO).await.unwrap();
        assert!(session.state().finished);
    });
}

#[test]
fn photo_write_failure_leaves_state_untouched() {
    let (mut session, _, stores, _) = session();
    session.start_game("Foxes", false);

    stores.fail_writes(true);
    block_on(async {
        let err = session
            .complete_checkpoint(1, PHOTO)
            .await
            .expect_err("photo phase fails");
        assert!(matches!(err, StoreError::QuotaExceeded));
    });
    // Phase ordering: the structured state was never committed.
    assert!(session.state().completed.is_empty());
    assert_eq!(session.state().score, 0);
    assert_eq!(session.state().current_checkpoint, 1);

    stores.fail_writes(false);
    block_on(async {
        assert!(session.complete_checkpoint(1, PHOTO).await.unwrap());
    });
}

#[test]
fn notes_are_trimmed_capped_and_deleted_when_blank() {
    let (mut session, store, _, _) = session();
    session.start_game("Foxes", false);

    session.set_note(1, "  crowded at noon  ");
    assert_eq!(session.note(1), "crowded at noon");

    let long = "x".repeat(800);
    session.set_note(1, &long);
    assert_eq!(session.note(1).chars().count(), 500);

    session.set_note(1, "   ");
    assert_eq!(session.note(1), "");
    assert!(!session.state().notes.contains_key(&1));

    // Notes persist with the rest of the state.
    let raw = store.raw("photorally_coast").expect("state persisted");
    assert!(raw.contains("\"notes\":{}"));
}

#[test]
fn reset_clears_state_and_photos_but_not_teams() {
    let (mut session, _, stores, _) = session();
    session.start_game("Foxes", false);

    block_on(async {
        session.complete_checkpoint(1, PHOTO).await.unwrap();
        session.reset().await;
    });

    assert!(!session.state().started);
    assert!(session.state().completed.is_empty());
    let photos = stores.open("photorallyPhotos_coast");
    block_on(async {
        assert!(photos.get_all().await.unwrap().is_empty());
    });
    assert_eq!(session.teams().entries().len(), 1, "ledger survives a reset");
}

#[test]
fn session_reloads_persisted_state() {
    let (mut session, store, stores, clock) = session();
    session.start_game("Foxes", false);
    block_on(async {
        session.complete_checkpoint(1, PHOTO).await.unwrap();
    });

    let rally = catalog().select("coast").unwrap().clone();
    let reloaded = Session::load(
        rally,
        store,
        stores.open("photorallyPhotos_coast"),
        clock,
    );
    assert_eq!(reloaded.state().score, 10);
    assert_eq!(reloaded.state().current_checkpoint, 2);
    assert_eq!(reloaded.teams().entries()[0].score, 10);
}

#[test]
fn gallery_fetches_payloads_in_one_batch() {
    let (mut session, _, _, _) = session();
    session.start_game("Foxes", false);

    block_on(async {
        session.complete_checkpoint(1, PHOTO).await.unwrap();
        session.validate_bonus(1, "data:image/jpeg;base64,Qk9OVVM=").await.unwrap();
        session.complete_checkpoint(2, PHOTO).await.unwrap();

        let entries = session.photo_entries_with_data().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry.checkpoint.id, 1);
        assert_eq!(entries[0].photo.as_deref(), Some(PHOTO));
        assert_eq!(
            entries[0].bonus_photo.as_deref(),
            Some("data:image/jpeg;base64,Qk9OVVM=")
        );
        assert_eq!(entries[1].bonus_photo, None);
    });
}

#[test]
fn achievements_fire_once_through_the_session() {
    let (mut session, _, _, _) = session();
    session.start_game("Foxes", false);

    block_on(async {
        session.complete_checkpoint(1, PHOTO).await.unwrap();
    });
    let fresh = session.check_achievements();
    assert!(fresh.iter().any(|def| def.id == "first_step"));
    assert!(session.check_achievements().is_empty());

    // Uncompleting does not un-see the achievement.
    block_on(async {
        session.uncomplete_checkpoint(1).await;
        session.complete_checkpoint(1, PHOTO).await.unwrap();
    });
    assert!(
        session
            .check_achievements()
            .iter()
            .all(|def| def.id != "first_step")
    );
}
