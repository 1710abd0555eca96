//! Per-rally team ledger: a small leaderboard with a lifecycle independent
//! of the game state. Entries are created when a game starts and updated
//! on every score-affecting mutation; removing one never touches the
//! progression state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamEntry {
    pub name: String,
    pub score: u32,
    /// Total run time in milliseconds once the team finished.
    pub elapsed: Option<i64>,
    /// Registration time.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for TeamEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            score: 0,
            elapsed: None,
            timestamp: None,
        }
    }
}

/// Insertion-ordered list of team entries, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamLedger {
    entries: Vec<TeamEntry>,
}

impl TeamLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> &[TeamEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a team if the name is not taken yet.
    pub fn add(&mut self, name: &str, registered_at: DateTime<Utc>) {
        if self.entries.iter().any(|entry| entry.name == name) {
            return;
        }
        self.entries.push(TeamEntry {
            name: name.to_string(),
            score: 0,
            elapsed: None,
            timestamp: Some(registered_at),
        });
    }

    /// Push a new total score to an existing team. Unknown names are
    /// ignored (the ledger may have been cleared independently).
    pub fn update_score(&mut self, name: &str, score: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.name == name) {
            entry.score = score;
        }
    }

    /// Record the finished run time for a team, in milliseconds.
    pub fn update_elapsed(&mut self, name: &str, elapsed_ms: i64) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.name == name) {
            entry.elapsed = Some(elapsed_ms);
        }
    }

    /// Remove one team. Does not affect any game state.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|entry| entry.name != name);
    }

    /// Entries sorted for display: score descending, then elapsed
    /// ascending with unfinished runs last.
    #[must_use]
    pub fn leaderboard(&self) -> Vec<TeamEntry> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| {
            b.score.cmp(&a.score).then_with(|| {
                let a_time = a.elapsed.unwrap_or(i64::MAX);
                let b_time = b.elapsed.unwrap_or(i64::MAX);
                a_time.cmp(&b_time)
            })
        });
        sorted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
