//! Hunt domain record, draft, completion pair, and patch types.

use serde::{Deserialize, Serialize};

use crate::types::{HuntId, TimestampMs};

/// Fully materialized, authoritative hunt record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuntRecord {
    /// Record identifier (server-assigned or locally pending).
    pub id: HuntId,
    /// Species being hunted, as returned by the reference service.
    pub species_name: String,
    /// Game the hunt takes place in.
    pub game: String,
    /// Sprite image URL for display.
    pub sprite_url: String,
    /// Ordered type list, possibly empty.
    pub types: Vec<String>,
    /// Number of encounters so far. Floored at zero.
    pub encounter_count: u64,
    /// Optional encounter goal, used only for progress display.
    pub target_count: Option<u64>,
    /// True once the shiny has been found.
    pub completed: bool,
    /// Set exactly when `completed` becomes true, cleared when it
    /// becomes false.
    pub completed_at: Option<TimestampMs>,
    /// Creation timestamp. Immutable.
    pub started_at: TimestampMs,
}

/// Creation payload for a new [`HuntRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuntDraft {
    /// Species being hunted.
    pub species_name: String,
    /// Game the hunt takes place in.
    pub game: String,
    /// Sprite image URL for display.
    pub sprite_url: String,
    /// Ordered type list, possibly empty.
    pub types: Vec<String>,
    /// Optional encounter goal.
    pub target_count: Option<u64>,
}

/// Completion state of a hunt. The flag and its timestamp always travel
/// together so neither side can be written without the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// True once the shiny has been found.
    pub completed: bool,
    /// Present exactly when `completed` is true.
    pub completed_at: Option<TimestampMs>,
}

impl Completion {
    /// Completion state for a shiny found at `at`.
    pub fn found(at: TimestampMs) -> Self {
        Self {
            completed: true,
            completed_at: Some(at),
        }
    }

    /// Completion state for a hunt marked not-found again.
    pub fn cleared() -> Self {
        Self {
            completed: false,
            completed_at: None,
        }
    }
}

/// Sparse patch where each `Some` field overwrites the record value.
///
/// Patches always carry absolute values, never deltas, so replaying one is
/// idempotent regardless of how many times or in which order it arrives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HuntPatch {
    /// Optional replacement for the encounter counter.
    pub encounter_count: Option<u64>,
    /// Optional replacement for the completion pair.
    pub completion: Option<Completion>,
}

impl HuntPatch {
    /// Patch carrying only an encounter count.
    pub fn count(value: u64) -> Self {
        Self {
            encounter_count: Some(value),
            ..Self::default()
        }
    }

    /// Patch carrying only a completion pair.
    pub fn completion(completion: Completion) -> Self {
        Self {
            completion: Some(completion),
            ..Self::default()
        }
    }

    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut HuntRecord) {
        if let Some(v) = self.encounter_count {
            rec.encounter_count = v;
        }
        if let Some(c) = self.completion {
            rec.completed = c.completed;
            rec.completed_at = c.completed_at;
        }
    }
}
