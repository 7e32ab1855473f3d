//! Annotation record model, the ordered record set, and save-time scoring.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{RecordId, Timestamp, UserId};

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// Score of a record with no flagged fields.
pub const SCORE_CLEAN: i32 = 1;

/// Score of a record where at least one field was flagged as erroneous.
pub const SCORE_FLAGGED: i32 = 0;

/// Derive the quality score from the per-field error checkboxes.
///
/// Recomputed from scratch on every save: any set flag yields
/// [`SCORE_FLAGGED`], otherwise [`SCORE_CLEAN`].
pub fn compute_score(flags: &BTreeMap<String, bool>) -> i32 {
    if flags.values().any(|&flagged| flagged) {
        SCORE_FLAGGED
    } else {
        SCORE_CLEAN
    }
}

// ---------------------------------------------------------------------------
// AnnotationRecord
// ---------------------------------------------------------------------------

/// One labeled object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: RecordId,
    /// Set by the first save, never cleared by later saves.
    pub annotated: bool,
    /// Empty when nobody has claimed the record yet.
    pub owner: UserId,
    pub score: i32,
    /// Schema fields plus any extra imported keys (e.g. `image_url`).
    pub fields: BTreeMap<String, Value>,
    pub field_flags: BTreeMap<String, bool>,
    pub updated_at: Option<Timestamp>,
}

impl AnnotationRecord {
    /// A freshly imported record: unowned, not annotated, clean score.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            annotated: false,
            owner: String::new(),
            score: SCORE_CLEAN,
            fields: BTreeMap::new(),
            field_flags: BTreeMap::new(),
            updated_at: None,
        }
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn is_unowned(&self) -> bool {
        self.owner.is_empty()
    }

    pub fn is_owned_by(&self, user: &str) -> bool {
        !user.is_empty() && self.owner == user
    }

    /// Apply a successful save in place. Shared by the file-backed stores so
    /// the save semantics live in one spot.
    pub fn apply_save(&mut self, save: &UpsertRequest, now: Timestamp) {
        for (key, value) in &save.fields {
            self.fields.insert(key.clone(), value.clone());
        }
        self.field_flags = save.field_flags.clone();
        self.score = save.score;
        self.annotated = true;
        if self.owner.is_empty() {
            self.owner = save.owner.clone();
        }
        self.updated_at = Some(now);
    }
}

/// Values written by a save. `fields` holds only the schema's interactive
/// fields; other keys already on the record are preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRequest {
    pub id: RecordId,
    pub fields: BTreeMap<String, Value>,
    pub field_flags: BTreeMap<String, bool>,
    pub score: i32,
    /// The saving user; becomes the owner when the record is unowned.
    pub owner: UserId,
}

/// The UI's in-progress form values: one display string per field and one
/// boolean per error checkbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditedValues {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

// ---------------------------------------------------------------------------
// RecordSet
// ---------------------------------------------------------------------------

/// An immutable-by-convention snapshot of the store, keyed by id, iterating
/// in insertion order so index-based navigation stays stable between loads.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<AnnotationRecord>,
    positions: HashMap<RecordId, usize>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing (in place) any record with the same id.
    pub fn insert(&mut self, record: AnnotationRecord) {
        match self.positions.get(&record.id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.positions.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&AnnotationRecord> {
        self.positions.get(id).map(|&pos| &self.records[pos])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AnnotationRecord> {
        match self.positions.get(id) {
            Some(&pos) => self.records.get_mut(pos),
            None => None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnotationRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AnnotationRecord> {
        self.records.iter_mut()
    }

    pub fn into_records(self) -> Vec<AnnotationRecord> {
        self.records
    }
}

impl FromIterator<AnnotationRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = AnnotationRecord>>(iter: I) -> Self {
        let mut set = Self::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Progress counters over a record set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub annotated: usize,
    pub pending: usize,
    /// Annotated records whose score is [`SCORE_FLAGGED`].
    pub flagged: usize,
    /// Record count per non-empty owner.
    pub by_owner: BTreeMap<UserId, usize>,
}

impl Statistics {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AnnotationRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.total += 1;
            if record.annotated {
                stats.annotated += 1;
                if record.score == SCORE_FLAGGED {
                    stats.flagged += 1;
                }
            }
            if !record.owner.is_empty() {
                *stats.by_owner.entry(record.owner.clone()).or_default() += 1;
            }
        }
        stats.pending = stats.total - stats.annotated;
        stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
