//! Mutable per-rally game state and its derived read-only queries.
//!
//! The serde shape is the persisted/wire format (camelCase, tolerant
//! defaults) so states written by every historical schema version still
//! load. Photo bytes never live here; `completed` entries only carry the
//! legacy inline payload fields until a migration or import strips them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::rally::{CheckpointId, Rally};

/// Completion record for one checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletedEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub bonus_validated: bool,
    /// Legacy inline payloads (schema v1). Never written by current code;
    /// migrations and imports move them into the photo store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_photo_data: Option<String>,
}

/// Recorded outcome of a checkpoint quiz. One-shot: once present the
/// result is immutable, right or wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub correct: bool,
    pub chosen_index: usize,
    /// Points awarded (0 for a wrong answer).
    #[serde(default)]
    pub points: u32,
}

/// Lock/current/completed partition of one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    Locked,
    Current,
    Completed,
}

/// Mutable game state for one rally in one browser profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    pub team_name: String,
    /// Next unlockable checkpoint id in sequential mode.
    pub current_checkpoint: CheckpointId,
    pub completed: BTreeMap<CheckpointId, CompletedEntry>,
    /// Base points minus hint penalties plus quiz awards, floored at 0.
    pub score: u32,
    /// Sum of validated bonus points.
    pub bonus_score: u32,
    pub started: bool,
    pub finished: bool,
    /// Sequential unlocking off: every uncompleted checkpoint is current.
    pub free_mode: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub hints_used: BTreeMap<CheckpointId, u32>,
    pub notes: BTreeMap<CheckpointId, String>,
    pub quiz_completed: BTreeMap<CheckpointId, QuizResult>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            team_name: String::new(),
            current_checkpoint: 1,
            completed: BTreeMap::new(),
            score: 0,
            bonus_score: 0,
            started: false,
            finished: false,
            free_mode: false,
            start_time: None,
            end_time: None,
            hints_used: BTreeMap::new(),
            notes: BTreeMap::new(),
            quiz_completed: BTreeMap::new(),
        }
    }
}

impl GameState {
    #[must_use]
    pub fn is_completed(&self, id: CheckpointId) -> bool {
        self.completed.contains_key(&id)
    }

    /// A checkpoint is current when it is uncompleted and unlockable now.
    #[must_use]
    pub fn is_current(&self, id: CheckpointId) -> bool {
        if self.is_completed(id) {
            return false;
        }
        if self.free_mode {
            return true;
        }
        self.current_checkpoint == id
    }

    /// A checkpoint is locked when sequential order has not reached it.
    #[must_use]
    pub fn is_locked(&self, rally: &Rally, id: CheckpointId) -> bool {
        if self.free_mode || self.is_completed(id) {
            return false;
        }
        let Some(position) = rally.position(id) else {
            return false;
        };
        let current = rally
            .position(self.current_checkpoint)
            .map_or(-1, |p| i64::try_from(p).unwrap_or(i64::MAX));
        i64::try_from(position).unwrap_or(i64::MAX) > current
    }

    /// Exactly one status holds for every checkpoint of the rally.
    #[must_use]
    pub fn status(&self, rally: &Rally, id: CheckpointId) -> CheckpointStatus {
        if self.is_completed(id) {
            CheckpointStatus::Completed
        } else if self.is_locked(rally, id) {
            CheckpointStatus::Locked
        } else {
            CheckpointStatus::Current
        }
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    #[must_use]
    pub fn hints_used(&self, id: CheckpointId) -> u32 {
        self.hints_used.get(&id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn note(&self, id: CheckpointId) -> &str {
        self.notes.get(&id).map_or("", String::as_str)
    }

    #[must_use]
    pub fn quiz_result(&self, id: CheckpointId) -> Option<QuizResult> {
        self.quiz_completed.get(&id).copied()
    }

    #[must_use]
    pub fn total_score(&self) -> u32 {
        self.score + self.bonus_score
    }

    /// Wall-clock time spent in the run. Open runs measure up to `now`,
    /// finished runs up to `end_time`.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or(now);
        Some(end - start)
    }

    /// Completion timestamps in chronological order. Entries persisted by
    /// very old versions may lack a timestamp and are skipped.
    #[must_use]
    pub fn completion_times(&self) -> Vec<DateTime<Utc>> {
        let mut times: Vec<DateTime<Utc>> = self
            .completed
            .values()
            .filter_map(|entry| entry.timestamp)
            .collect();
        times.sort_unstable();
        times
    }

    #[must_use]
    pub fn validated_bonus_count(&self) -> usize {
        self.completed
            .values()
            .filter(|entry| entry.bonus_validated)
            .count()
    }
}

/// Format a duration as HH:MM:SS for timers and the team ledger.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.num_seconds().max(0);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
