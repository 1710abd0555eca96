//! Progression engine: the session context threading one rally's state,
//! ledger and stores through every mutation.
//!
//! Write protocol (two phases, in this order):
//! 1. photo payload into the photo store; a failure here rejects the
//!    whole operation with the state untouched;
//! 2. the whole `GameState` as one unit into the structured store.
//! A crash between the phases can only leave an orphan photo, never a
//! state entry referencing a missing photo. Deletions run in the reverse
//! order, best-effort, before the structured reference is removed.
//!
//! Missing preconditions (completing a locked checkpoint, re-answering a
//! quiz, a hint beyond the list) are silent no-ops by contract: they are
//! defensive guards against UI desync, not user-facing errors.

use chrono::{DateTime, Duration, Utc};

use crate::achievements::{self, AchievementDef};
use crate::constants::{self, bonus_photo_key, main_photo_key};
use crate::rally::{Checkpoint, CheckpointId, Hint, Rally};
use crate::state::{CompletedEntry, GameState, QuizResult};
use crate::teams::TeamLedger;
use crate::{Clock, PhotoStore, StateStore, StoreError};

/// Gallery metadata for one completed checkpoint (no photo bytes).
#[derive(Debug, Clone)]
pub struct PhotoEntry {
    pub checkpoint: Checkpoint,
    pub timestamp: Option<DateTime<Utc>>,
    pub bonus_validated: bool,
}

/// Gallery entry with the payloads fetched from the photo store.
#[derive(Debug, Clone)]
pub struct PhotoEntryWithData {
    pub entry: PhotoEntry,
    pub photo: Option<String>,
    pub bonus_photo: Option<String>,
}

/// One rally's live session: active rally definition, game state, team
/// ledger and the two storage tiers. Switching rallies constructs a new
/// session; nothing is shared between rally namespaces.
pub struct Session<S, P, C> {
    rally: Rally,
    state: GameState,
    teams: TeamLedger,
    store: S,
    photos: P,
    clock: C,
}

impl<S, P, C> Session<S, P, C>
where
    S: StateStore,
    P: PhotoStore,
    C: Clock,
{
    /// Load the persisted session for a rally, falling back to fresh
    /// defaults when a record is absent or unreadable.
    pub fn load(rally: Rally, store: S, photos: P, clock: C) -> Self {
        let state = match store.get::<GameState>(&constants::state_key(&rally.id)) {
            Ok(Some(state)) => state,
            Ok(None) => GameState::default(),
            Err(err) => {
                log::warn!("game state for '{}' unreadable, starting fresh: {err}", rally.id);
                GameState::default()
            }
        };
        let teams = match store.get::<TeamLedger>(&constants::teams_key(&rally.id)) {
            Ok(Some(teams)) => teams,
            Ok(None) => TeamLedger::new(),
            Err(err) => {
                log::warn!("team ledger for '{}' unreadable, starting empty: {err}", rally.id);
                TeamLedger::new()
            }
        };
        Self {
            rally,
            state,
            teams,
            store,
            photos,
            clock,
        }
    }

    #[must_use]
    pub fn rally(&self) -> &Rally {
        &self.rally
    }

    #[must_use]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    #[must_use]
    pub fn teams(&self) -> &TeamLedger {
        &self.teams
    }

    #[must_use]
    pub fn state_store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn photo_store(&self) -> &P {
        &self.photos
    }

    /// Time spent in the current run, `None` before the game started.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.state.elapsed(self.clock.now())
    }

    // -- persistence ------------------------------------------------------

    /// Persist the whole game state as one unit. A structured-store
    /// failure here is downgraded to a warning: the in-memory state stays
    /// authoritative and the next successful persist catches up.
    fn persist(&self) {
        if let Err(err) = self
            .store
            .set(&constants::state_key(&self.rally.id), &self.state)
        {
            log::warn!("persisting game state for '{}' failed: {err}", self.rally.id);
        }
    }

    fn persist_teams(&self) {
        if let Err(err) = self
            .store
            .set(&constants::teams_key(&self.rally.id), &self.teams)
        {
            log::warn!("persisting team ledger for '{}' failed: {err}", self.rally.id);
        }
    }

    /// Push the current total to the active team's ledger entry.
    fn push_score(&mut self) {
        let name = self.state.team_name.clone();
        self.teams.update_score(&name, self.state.total_score());
        self.persist_teams();
    }

    // -- lifecycle --------------------------------------------------------

    /// Start a fresh game for `team_name`, replacing any previous state
    /// for this rally, and register the team in the ledger.
    pub fn start_game(&mut self, team_name: &str, free_mode: bool) {
        let now = self.clock.now();
        self.state = GameState {
            team_name: team_name.to_string(),
            free_mode,
            started: true,
            start_time: Some(now),
            ..GameState::default()
        };
        self.persist();
        self.teams.add(team_name, now);
        self.persist_teams();
    }

    /// Reset the rally: fresh state and an emptied photo namespace. The
    /// team ledger has its own lifecycle and is left alone.
    pub async fn reset(&mut self) {
        self.state = GameState::default();
        self.persist();
        if let Err(err) = self.photos.clear().await {
            log::warn!("clearing photos for '{}' failed: {err}", self.rally.id);
        }
    }

    // -- progression ------------------------------------------------------

    /// Complete a checkpoint with its proof photo. Valid only from the
    /// Current state; returns `Ok(false)` without effect otherwise.
    ///
    /// # Errors
    ///
    /// Returns the photo-store failure when the payload cannot be
    /// written; the game state is untouched in that case.
    pub async fn complete_checkpoint(
        &mut self,
        id: CheckpointId,
        photo: &str,
    ) -> Result<bool, StoreError> {
        let Some(cp) = self.rally.checkpoint(id).cloned() else {
            return Ok(false);
        };
        if self.state.is_completed(id) || self.state.is_locked(&self.rally, id) {
            return Ok(false);
        }

        // Phase 1: photo first, so the state never references a missing one.
        self.photos.save(&main_photo_key(id), photo).await?;

        let now = self.clock.now();
        self.state.completed.insert(
            id,
            CompletedEntry {
                timestamp: Some(now),
                ..CompletedEntry::default()
            },
        );
        self.state.score += cp.points;

        if !self.state.free_mode {
            self.advance_pointer(id);
        }

        if self.state.completed.len() >= self.rally.checkpoints.len() {
            self.state.finished = true;
            self.state.end_time = Some(now);
        }

        self.persist();
        self.push_score();
        if self.state.finished {
            if let Some(elapsed) = self.state.elapsed(now) {
                let name = self.state.team_name.clone();
                self.teams
                    .update_elapsed(&name, elapsed.num_milliseconds());
                self.persist_teams();
            }
        }
        Ok(true)
    }

    /// Move the sequential pointer to the next uncompleted checkpoint in
    /// list order after `completed_id`, falling back to the first
    /// uncompleted one anywhere. With everything completed it stays put.
    fn advance_pointer(&mut self, completed_id: CheckpointId) {
        let Some(from) = self.rally.position(completed_id) else {
            return;
        };
        let next_after = self
            .rally
            .checkpoints
            .iter()
            .skip(from + 1)
            .find(|cp| !self.state.is_completed(cp.id));
        let next = next_after.or_else(|| {
            self.rally
                .checkpoints
                .iter()
                .find(|cp| !self.state.is_completed(cp.id))
        });
        if let Some(cp) = next {
            self.state.current_checkpoint = cp.id;
        }
    }

    /// Validate the bonus challenge of an already-completed checkpoint.
    ///
    /// # Errors
    ///
    /// Returns the photo-store failure when the payload cannot be
    /// written; the game state is untouched in that case.
    pub async fn validate_bonus(
        &mut self,
        id: CheckpointId,
        photo: &str,
    ) -> Result<bool, StoreError> {
        let Some(cp) = self.rally.checkpoint(id).cloned() else {
            return Ok(false);
        };
        let already_validated = match self.state.completed.get(&id) {
            Some(entry) => entry.bonus_validated,
            None => return Ok(false),
        };
        if already_validated {
            return Ok(false);
        }

        self.photos.save(&bonus_photo_key(id), photo).await?;

        if let Some(entry) = self.state.completed.get_mut(&id) {
            entry.bonus_validated = true;
        }
        self.state.bonus_score += cp.bonus_points;
        self.persist();
        self.push_score();
        Ok(true)
    }

    /// Reverse of [`Session::validate_bonus`]: drop the bonus photo,
    /// clear the flag and subtract the bonus points.
    pub async fn delete_bonus_photo(&mut self, id: CheckpointId) -> bool {
        let Some(cp) = self.rally.checkpoint(id).cloned() else {
            return false;
        };
        let validated = self
            .state
            .completed
            .get(&id)
            .is_some_and(|entry| entry.bonus_validated);
        if !validated {
            return false;
        }

        if let Err(err) = self.photos.delete(&bonus_photo_key(id)).await {
            log::warn!("deleting bonus photo {id} failed: {err}");
        }
        if let Some(entry) = self.state.completed.get_mut(&id) {
            entry.bonus_validated = false;
        }
        self.state.bonus_score = self.state.bonus_score.saturating_sub(cp.bonus_points);
        self.persist();
        self.push_score();
        true
    }

    /// Replace the proof photo of a completed checkpoint.
    ///
    /// # Errors
    ///
    /// Returns the photo-store failure when the payload cannot be written.
    pub async fn replace_photo(&mut self, id: CheckpointId, photo: &str) -> Result<bool, StoreError> {
        if !self.state.is_completed(id) {
            return Ok(false);
        }
        self.photos.save(&main_photo_key(id), photo).await?;
        Ok(true)
    }

    /// Undo a completion: subtract its points (and validated bonus),
    /// delete both photos best-effort, drop the completion entry, un-set
    /// `finished`, and rewind the sequential pointer when needed. This is
    /// the only operation that can un-finish a finished game. The quiz
    /// result, if any, deliberately stays locked in.
    pub async fn uncomplete_checkpoint(&mut self, id: CheckpointId) -> bool {
        let Some(cp) = self.rally.checkpoint(id).cloned() else {
            return false;
        };
        let Some(entry) = self.state.completed.get(&id).cloned() else {
            return false;
        };

        self.state.score = self.state.score.saturating_sub(cp.points);
        if entry.bonus_validated {
            self.state.bonus_score = self.state.bonus_score.saturating_sub(cp.bonus_points);
        }

        // Photos go first, tolerating absence, so a crash leaves at worst
        // an orphan payload rather than a dangling reference.
        for key in [main_photo_key(id), bonus_photo_key(id)] {
            if let Err(err) = self.photos.delete(&key).await {
                log::warn!("deleting photo {key} failed: {err}");
            }
        }

        self.state.completed.remove(&id);

        if self.state.finished {
            self.state.finished = false;
            self.state.end_time = None;
        }

        if !self.state.free_mode {
            let undone = self.rally.position(id);
            let current = self.rally.position(self.state.current_checkpoint);
            let rewind = match (undone, current) {
                (Some(u), Some(c)) => u < c,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if rewind {
                self.state.current_checkpoint = id;
            }
        }

        self.persist();
        self.push_score();
        true
    }

    /// Reveal the next hint for a checkpoint, charging its penalty
    /// (floored at zero). `None` when no hints remain.
    pub fn use_hint(&mut self, id: CheckpointId) -> Option<Hint> {
        let cp = self.rally.checkpoint(id)?;
        let used = self.state.hints_used(id) as usize;
        let hint = cp.hints.get(used)?.clone();

        self.state
            .hints_used
            .insert(id, u32::try_from(used + 1).unwrap_or(u32::MAX));
        self.state.score = self.state.score.saturating_sub(hint.penalty);
        self.persist();
        self.push_score();
        Some(hint)
    }

    /// Answer a checkpoint quiz. One-shot: once a result is recorded it
    /// is immutable, and this returns `None` without any change. A
    /// correct answer adds the difficulty tier's fixed points to the
    /// score; a wrong one records the miss and awards nothing.
    pub fn validate_quiz(&mut self, id: CheckpointId, chosen_index: usize) -> Option<QuizResult> {
        let quiz = self.rally.checkpoint(id)?.quiz.clone()?;
        if self.state.quiz_completed.contains_key(&id) {
            return None;
        }

        let correct = chosen_index == quiz.answer;
        let points = if correct { quiz.points() } else { 0 };
        let result = QuizResult {
            correct,
            chosen_index,
            points,
        };
        self.state.quiz_completed.insert(id, result);
        self.state.score += points;
        self.persist();
        self.push_score();
        Some(result)
    }

    /// Attach a free-text note to a checkpoint. The text is trimmed and
    /// capped; an empty result deletes the entry instead of storing a
    /// blank.
    pub fn set_note(&mut self, id: CheckpointId, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.state.notes.remove(&id);
        } else {
            let capped: String = trimmed.chars().take(constants::MAX_NOTE_LEN).collect();
            self.state.notes.insert(id, capped);
        }
        self.persist();
    }

    #[must_use]
    pub fn note(&self, id: CheckpointId) -> &str {
        self.state.note(id)
    }

    // -- achievements -----------------------------------------------------

    /// Evaluate achievements against the current state and return the
    /// newly unlocked ones (already marked seen). Storage trouble only
    /// delays the report to a later call.
    pub fn check_achievements(&mut self) -> Vec<&'static AchievementDef> {
        match achievements::newly_unlocked(&self.state, &self.rally, &self.store) {
            Ok(fresh) => fresh,
            Err(err) => {
                log::warn!("achievement seen-set update failed: {err}");
                Vec::new()
            }
        }
    }

    // -- gallery ----------------------------------------------------------

    /// Completion metadata for every completed checkpoint, in rally order.
    #[must_use]
    pub fn photo_entries(&self) -> Vec<PhotoEntry> {
        self.rally
            .checkpoints
            .iter()
            .filter_map(|cp| {
                self.state.completed.get(&cp.id).map(|entry| PhotoEntry {
                    checkpoint: cp.clone(),
                    timestamp: entry.timestamp,
                    bonus_validated: entry.bonus_validated,
                })
            })
            .collect()
    }

    /// Gallery entries with payloads fetched from the photo store in one
    /// batch. Entries that still carry a legacy inline payload fall back
    /// to it when the store has no value under the key.
    ///
    /// # Errors
    ///
    /// Returns an error when the photo store cannot be read.
    pub async fn photo_entries_with_data(&self) -> Result<Vec<PhotoEntryWithData>, StoreError> {
        let entries = self.photo_entries();
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in &entries {
            keys.push(main_photo_key(entry.checkpoint.id));
            if entry.bonus_validated {
                keys.push(bonus_photo_key(entry.checkpoint.id));
            }
        }
        let payloads = self.photos.get_many(&keys).await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let id = entry.checkpoint.id;
                let legacy = self.state.completed.get(&id);
                let photo = payloads
                    .get(&main_photo_key(id))
                    .cloned()
                    .flatten()
                    .or_else(|| legacy.and_then(|e| e.photo_data.clone()));
                let bonus_photo = if entry.bonus_validated {
                    payloads
                        .get(&bonus_photo_key(id))
                        .cloned()
                        .flatten()
                        .or_else(|| legacy.and_then(|e| e.bonus_photo_data.clone()))
                } else {
                    None
                };
                PhotoEntryWithData {
                    entry,
                    photo,
                    bonus_photo,
                }
            })
            .collect())
    }
}
