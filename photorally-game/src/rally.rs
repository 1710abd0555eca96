//! Rally catalog: immutable rally/checkpoint definitions and their validator.
//!
//! Rally documents are authored as JSON (by the bundled assets or the
//! external editor surface) in camelCase, so every serde type here keeps
//! that wire casing.

use serde::{Deserialize, Serialize};

use crate::constants;

/// Checkpoint ids are dense 1..=N positions within one rally.
pub type CheckpointId = u32;

/// One revealable hint with its score penalty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub text: String,
    #[serde(default)]
    pub penalty: u32,
}

/// Multiple-choice quiz attached to a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub question: String,
    pub choices: Vec<String>,
    /// Index into `choices` of the correct answer.
    pub answer: usize,
    /// Difficulty tier 1..=3, mapped to fixed point values.
    pub difficulty: u8,
}

impl Quiz {
    /// Point value awarded when this quiz is answered correctly.
    #[must_use]
    pub fn points(&self) -> u32 {
        constants::quiz_points(self.difficulty)
    }
}

/// One stop in a rally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// 1-based position, normalized to match list order on load.
    #[serde(default)]
    pub id: CheckpointId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub photo_hint: Option<String>,
    #[serde(default)]
    pub bonus_challenge: Option<String>,
    #[serde(default)]
    pub bonus_points: u32,
    #[serde(default)]
    pub hints: Vec<Hint>,
    #[serde(default)]
    pub quiz: Option<Quiz>,
    /// Structured label -> value pairs shown on the checkpoint sheet.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub info: std::collections::BTreeMap<String, String>,
}

impl Checkpoint {
    /// Points the quiz of this checkpoint can award, 0 without a quiz.
    #[must_use]
    pub fn quiz_points(&self) -> u32 {
        self.quiz.as_ref().map_or(0, Quiz::points)
    }
}

/// Theme colors, kept as raw hex strings for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub primary_light: Option<String>,
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub accent_light: Option<String>,
}

/// Immutable definition of one rally. The `id` doubles as the storage
/// namespace for every persisted record belonging to this rally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rally {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rules_intro: Option<String>,
    #[serde(default)]
    pub rules_highlight: Option<String>,
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub map_center: Option<[f64; 2]>,
    #[serde(default)]
    pub map_zoom: Option<f64>,
    pub checkpoints: Vec<Checkpoint>,
}

impl Rally {
    /// Look up a checkpoint by id.
    #[must_use]
    pub fn checkpoint(&self, id: CheckpointId) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|cp| cp.id == id)
    }

    /// List position of a checkpoint id.
    #[must_use]
    pub fn position(&self, id: CheckpointId) -> Option<usize> {
        self.checkpoints.iter().position(|cp| cp.id == id)
    }

    /// Sum of base checkpoint points.
    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.checkpoints.iter().map(|cp| cp.points).sum()
    }

    /// Sum of bonus-challenge points.
    #[must_use]
    pub fn total_bonus(&self) -> u32 {
        self.checkpoints.iter().map(|cp| cp.bonus_points).sum()
    }

    /// Sum of quiz point values for quiz-bearing checkpoints.
    #[must_use]
    pub fn total_quiz(&self) -> u32 {
        self.checkpoints.iter().map(Checkpoint::quiz_points).sum()
    }

    /// Maximum achievable score: base + bonus + quiz.
    #[must_use]
    pub fn max_score(&self) -> u32 {
        self.total_points() + self.total_bonus() + self.total_quiz()
    }

    /// Rewrite checkpoint ids to the dense 1..=N sequence matching list
    /// order. Authoring sources are allowed to omit ids entirely.
    pub fn normalize_ids(&mut self) {
        for (index, cp) in self.checkpoints.iter_mut().enumerate() {
            cp.id = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
        }
    }

    /// Validate the document against the editor/share contract. Returns
    /// every field-level reason rather than stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut reasons = Vec::new();
        validate_rally(self, &mut reasons);
        if reasons.is_empty() { Ok(()) } else { Err(reasons) }
    }
}

fn text_ok(value: &str, max: usize) -> bool {
    value.chars().count() <= max
}

fn hex_color_ok(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    (3..=8).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

fn validate_rally(rally: &Rally, reasons: &mut Vec<String>) {
    if rally.id.trim().is_empty() {
        reasons.push("rally id is missing".to_string());
    }
    if rally.name.trim().is_empty() {
        reasons.push("rally name is missing".to_string());
    } else if !text_ok(&rally.name, constants::MAX_RALLY_NAME_LEN) {
        reasons.push("rally name is too long".to_string());
    }
    if let Some(subtitle) = &rally.subtitle {
        if !text_ok(subtitle, constants::MAX_SUBTITLE_LEN) {
            reasons.push("subtitle is too long".to_string());
        }
    }
    if let Some(description) = &rally.description {
        if !text_ok(description, constants::MAX_RALLY_DESC_LEN) {
            reasons.push("description is too long".to_string());
        }
    }
    if let Some(short_name) = &rally.short_name {
        if !text_ok(short_name, constants::MAX_SHORT_NAME_LEN) {
            reasons.push("short name is too long".to_string());
        }
    }
    for (label, value) in [
        ("rules intro", &rally.rules_intro),
        ("rules highlight", &rally.rules_highlight),
    ] {
        if let Some(text) = value {
            if !text_ok(text, constants::MAX_RULES_TEXT_LEN) {
                reasons.push(format!("{label} is too long"));
            }
        }
    }

    if let Some(theme) = &rally.theme {
        for (label, color) in [
            ("primary", &theme.primary),
            ("primaryLight", &theme.primary_light),
            ("accent", &theme.accent),
            ("accentLight", &theme.accent_light),
        ] {
            if let Some(value) = color {
                if !hex_color_ok(value) {
                    reasons.push(format!("theme color {label} is malformed"));
                }
            }
        }
    }

    if let Some([lat, lng]) = rally.map_center {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            reasons.push("map center is out of range".to_string());
        }
    }
    if let Some(zoom) = rally.map_zoom {
        if !(constants::MIN_MAP_ZOOM..=constants::MAX_MAP_ZOOM).contains(&zoom) {
            reasons.push("map zoom is out of range".to_string());
        }
    }

    if rally.checkpoints.len() < constants::MIN_CHECKPOINTS {
        reasons.push(format!(
            "a rally needs at least {} checkpoints",
            constants::MIN_CHECKPOINTS
        ));
    }
    if rally.checkpoints.len() > constants::MAX_CHECKPOINTS {
        reasons.push(format!(
            "too many checkpoints (max {})",
            constants::MAX_CHECKPOINTS
        ));
    }

    for (index, cp) in rally.checkpoints.iter().enumerate() {
        let n = index + 1;
        if cp.name.trim().is_empty() {
            reasons.push(format!("checkpoint {n}: name is missing"));
        } else if !text_ok(&cp.name, constants::MAX_CHECKPOINT_NAME_LEN) {
            reasons.push(format!("checkpoint {n}: name is too long"));
        }
        if let Some(lat) = cp.lat {
            if !(-90.0..=90.0).contains(&lat) {
                reasons.push(format!("checkpoint {n}: latitude is out of range"));
            }
        }
        if let Some(lng) = cp.lng {
            if !(-180.0..=180.0).contains(&lng) {
                reasons.push(format!("checkpoint {n}: longitude is out of range"));
            }
        }
        if cp.points > constants::MAX_CHECKPOINT_POINTS {
            reasons.push(format!("checkpoint {n}: points are out of range"));
        }
        if cp.bonus_points > constants::MAX_CHECKPOINT_POINTS {
            reasons.push(format!("checkpoint {n}: bonus points are out of range"));
        }
        if !text_ok(&cp.description, constants::MAX_CHECKPOINT_DESC_LEN) {
            reasons.push(format!("checkpoint {n}: description is too long"));
        }
        if let Some(photo_hint) = &cp.photo_hint {
            if !text_ok(photo_hint, constants::MAX_PHOTO_HINT_LEN) {
                reasons.push(format!("checkpoint {n}: photo hint is too long"));
            }
        }
        if let Some(bonus) = &cp.bonus_challenge {
            if !text_ok(bonus, constants::MAX_BONUS_CHALLENGE_LEN) {
                reasons.push(format!("checkpoint {n}: bonus challenge is too long"));
            }
        }
        if cp.hints.len() > constants::MAX_HINTS_PER_CHECKPOINT {
            reasons.push(format!("checkpoint {n}: too many hints"));
        }
        for (hint_index, hint) in cp.hints.iter().enumerate() {
            if !text_ok(&hint.text, constants::MAX_HINT_TEXT_LEN) {
                reasons.push(format!(
                    "checkpoint {n}: hint {} text is too long",
                    hint_index + 1
                ));
            }
            if hint.penalty > constants::MAX_HINT_PENALTY {
                reasons.push(format!(
                    "checkpoint {n}: hint {} penalty is out of range",
                    hint_index + 1
                ));
            }
        }
        if let Some(quiz) = &cp.quiz {
            if quiz.choices.len() < 2 {
                reasons.push(format!("checkpoint {n}: quiz needs at least 2 choices"));
            }
            if quiz.answer >= quiz.choices.len() {
                reasons.push(format!("checkpoint {n}: quiz answer index is out of range"));
            }
            if !(1..=3).contains(&quiz.difficulty) {
                reasons.push(format!("checkpoint {n}: quiz difficulty is out of range"));
            }
        }
    }
}

/// Ordered registry of the rallies known to this install. All other
/// components read checkpoint geometry and scoring constants through the
/// catalog's active selection, never through ambient globals.
#[derive(Debug, Clone, Default)]
pub struct RallyCatalog {
    rallies: Vec<Rally>,
}

impl RallyCatalog {
    /// Build a catalog from already-validated rally definitions.
    /// Checkpoint ids are normalized to dense 1..=N sequences.
    #[must_use]
    pub fn new(mut rallies: Vec<Rally>) -> Self {
        for rally in &mut rallies {
            rally.normalize_ids();
        }
        Self { rallies }
    }

    /// Parse a catalog from a JSON array of rally documents, rejecting the
    /// whole load when any document fails validation.
    ///
    /// # Errors
    ///
    /// Returns the parse error or the first document's validation reasons.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let mut rallies: Vec<Rally> = serde_json::from_str(json)?;
        for rally in &mut rallies {
            rally.normalize_ids();
            rally
                .validate()
                .map_err(|reasons| CatalogError::Invalid(rally.id.clone(), reasons))?;
        }
        Ok(Self { rallies })
    }

    /// Look up a rally definition. Callers must guard on `None` before
    /// treating the id as the active rally; selection of an unknown id is
    /// a no-op by contract.
    #[must_use]
    pub fn select(&self, rally_id: &str) -> Option<&Rally> {
        self.rallies.iter().find(|rally| rally.id == rally_id)
    }

    /// All registered rallies in registration order.
    #[must_use]
    pub fn rallies(&self) -> &[Rally] {
        &self.rallies
    }

    /// Id of the first registered rally, the default namespace target for
    /// legacy-layout migrations.
    #[must_use]
    pub fn default_rally_id(&self) -> Option<&str> {
        self.rallies.first().map(|rally| rally.id.as_str())
    }

    /// Register an additional rally (e.g. an imported custom rally).
    ///
    /// # Errors
    ///
    /// Returns the validation reasons if the document is rejected.
    pub fn register(&mut self, mut rally: Rally) -> Result<(), Vec<String>> {
        rally.normalize_ids();
        rally.validate()?;
        self.rallies.retain(|existing| existing.id != rally.id);
        self.rallies.push(rally);
        Ok(())
    }
}

/// Failure to load a rally catalog from JSON.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("rally document parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("rally '{0}' is invalid: {1:?}")]
    Invalid(String, Vec<String>),
}
