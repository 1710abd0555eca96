//! Achievement evaluator: a fixed set of pure predicates over the game
//! state plus a persisted "seen" set used to compute newly-unlocked
//! deltas. Eligibility is always recomputed from current state; the seen
//! set only grows, so an achievement shown once is never re-shown, even
//! if its condition later becomes false again via an uncomplete.

use chrono::Duration;

use crate::constants;
use crate::rally::Rally;
use crate::state::GameState;
use crate::{StateStore, StoreError};

/// Static definition of one achievement.
pub struct AchievementDef {
    pub id: &'static str,
    pub icon: &'static str,
    pub name: &'static str,
    /// Teaser shown while the achievement is still locked.
    pub hint: &'static str,
    /// Description, rendered against the active rally's constants.
    pub describe: fn(&Rally) -> String,
    /// Pure unlock predicate.
    pub check: fn(&GameState, &Rally) -> bool,
}

fn half(rally: &Rally) -> usize {
    rally.checkpoints.len().div_ceil(2)
}

fn high_score_target(rally: &Rally) -> u32 {
    let target = f64::from(rally.max_score()) * constants::HIGH_SCORE_RATIO;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        target.round() as u32
    }
}

/// Sliding-window check: `count` completions within `minutes`, anywhere
/// in the sorted completion timestamps.
fn speed_window(state: &GameState, count: usize, minutes: i64) -> bool {
    let times = state.completion_times();
    if times.len() < count {
        return false;
    }
    let window = Duration::minutes(minutes);
    times
        .windows(count)
        .any(|slice| slice[count - 1] - slice[0] < window)
}

fn finished_under(state: &GameState, hours: i64) -> bool {
    if !state.finished {
        return false;
    }
    match (state.start_time, state.end_time) {
        (Some(start), Some(end)) => end - start < Duration::hours(hours),
        _ => false,
    }
}

/// All achievements in definition (and therefore display) order.
pub static ACHIEVEMENTS: &[AchievementDef] = &[
    AchievementDef {
        id: "first_step",
        icon: "\u{1F3C1}",
        name: "First step",
        hint: "Check in at a checkpoint to get going",
        describe: |_| "Complete your first checkpoint".to_string(),
        check: |state, _| state.completed_count() >= 1,
    },
    AchievementDef {
        id: "halfway",
        icon: "\u{1F4AA}",
        name: "Halfway there",
        hint: "Keep going, you're getting close",
        describe: |rally| format!("Complete {} checkpoints", half(rally)),
        check: |state, rally| state.completed_count() >= half(rally),
    },
    AchievementDef {
        id: "completionist",
        icon: "\u{1F3C6}",
        name: "Completionist",
        hint: "Walk the whole rally",
        describe: |rally| format!("Finish all {} checkpoints", rally.checkpoints.len()),
        check: |state, _| state.finished,
    },
    AchievementDef {
        id: "bonus_first",
        icon: "\u{2B50}",
        name: "Bonus unlocked",
        hint: "Try a bonus challenge on a completed checkpoint",
        describe: |_| "Validate your first bonus challenge".to_string(),
        check: |state, _| state.validated_bonus_count() >= 1,
    },
    AchievementDef {
        id: "bonus_hunter",
        icon: "\u{1F525}",
        name: "Bonus hunter",
        hint: "Stack up those bonus challenges",
        describe: |rally| format!("Validate {} bonus challenges", half(rally)),
        check: |state, rally| state.validated_bonus_count() >= half(rally),
    },
    AchievementDef {
        id: "bonus_master",
        icon: "\u{1F48E}",
        name: "Bonus master",
        hint: "Let no bonus escape you",
        describe: |_| "Validate every bonus challenge".to_string(),
        check: |state, rally| state.validated_bonus_count() >= rally.checkpoints.len(),
    },
    AchievementDef {
        id: "speed_3",
        icon: "\u{26A1}",
        name: "Lightning",
        hint: "Speed is your ally",
        describe: |_| {
            format!(
                "{} checkpoints in under {} minutes",
                constants::SPEED_RUN_CHECKPOINTS,
                constants::SPEED_RUN_WINDOW_MINUTES
            )
        },
        check: |state, _| {
            speed_window(
                state,
                constants::SPEED_RUN_CHECKPOINTS,
                constants::SPEED_RUN_WINDOW_MINUTES,
            )
        },
    },
    AchievementDef {
        id: "speed_demon",
        icon: "\u{1F3CE}",
        name: "Speed demon",
        hint: "Finish the rally at full tilt",
        describe: |_| format!("Finish in under {} hours", constants::FAST_FINISH_HOURS),
        check: |state, _| finished_under(state, constants::FAST_FINISH_HOURS),
    },
    AchievementDef {
        id: "high_score",
        icon: "\u{1F451}",
        name: "Royal score",
        hint: "Aim high, the bonuses count",
        describe: |rally| format!("Score more than {} points", high_score_target(rally)),
        check: |state, rally| state.total_score() >= high_score_target(rally),
    },
    AchievementDef {
        id: "perfect",
        icon: "\u{1F31F}",
        name: "Perfection",
        hint: "Checkpoints, bonuses, quizzes: miss nothing",
        describe: |rally| format!("Reach the maximum score: {} pts", rally.max_score()),
        check: |state, rally| state.total_score() >= rally.max_score(),
    },
];

/// Ids of every achievement whose predicate holds right now, in
/// definition order. Pure recompute, no caching.
#[must_use]
pub fn unlocked(state: &GameState, rally: &Rally) -> Vec<&'static str> {
    ACHIEVEMENTS
        .iter()
        .filter(|def| (def.check)(state, rally))
        .map(|def| def.id)
        .collect()
}

/// The persisted seen set for a rally (empty when nothing was shown yet).
#[must_use]
pub fn seen_ids<S: StateStore>(store: &S, rally_id: &str) -> Vec<String> {
    store
        .get::<Vec<String>>(&constants::seen_key(rally_id))
        .unwrap_or_default()
        .unwrap_or_default()
}

/// Diff the current unlock set against the persisted seen set, persist
/// the union (seen only grows), and return the newly unlocked definitions
/// in definition order.
///
/// # Errors
///
/// Returns an error when the updated seen set cannot be persisted; the
/// delta is not reported in that case so it will be retried next call.
pub fn newly_unlocked<S: StateStore>(
    state: &GameState,
    rally: &Rally,
    store: &S,
) -> Result<Vec<&'static AchievementDef>, StoreError> {
    let seen = seen_ids(store, &rally.id);
    let unlocked_now = unlocked(state, rally);
    let fresh: Vec<&'static AchievementDef> = ACHIEVEMENTS
        .iter()
        .filter(|def| unlocked_now.contains(&def.id) && !seen.iter().any(|s| s == def.id))
        .collect();
    if fresh.is_empty() {
        return Ok(fresh);
    }
    let mut updated = seen;
    for def in &fresh {
        updated.push(def.id.to_string());
    }
    store.set(&constants::seen_key(&rally.id), &updated)?;
    Ok(fresh)
}
