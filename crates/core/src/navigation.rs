//! Navigation state machine for a single annotator session.
//!
//! ```text
//!              navigate / goto (clean)
//!            +------------------------+
//!            v                        |
//!     Viewing(index) ---------------- +
//!        |      ^
//!  dirty |      | confirm: save-and-continue / discard (move)
//!        v      | confirm: cancel (stay, edits kept)
//!     ConfirmingDiscard(index, pending)
//! ```
//!
//! This module only decides transitions and computes indices; the store
//! calls happen in [`crate::session`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::RecordId;

/// Step direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Next,
    Prev,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Prev => "prev",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "next" => Ok(Self::Next),
            "prev" => Ok(Self::Prev),
            _ => Err(CoreError::Validation(format!(
                "Invalid direction '{s}'. Must be one of: next, prev"
            ))),
        }
    }
}

/// Behaviour at the ends of the visible list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Stay on the first/last record.
    #[default]
    Clamp,
    /// Continue from the other end.
    Wrap,
}

impl BoundaryPolicy {
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "clamp" => Ok(Self::Clamp),
            "wrap" => Ok(Self::Wrap),
            _ => Err(CoreError::Validation(format!(
                "Invalid boundary policy '{s}'. Must be one of: clamp, wrap"
            ))),
        }
    }
}

/// The move waiting on the annotator's decision about unsaved edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingMove {
    Step { direction: Direction },
    Goto { id: RecordId },
}

/// Answer to the unsaved-changes dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmChoice {
    SaveAndContinue,
    Discard,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NavState {
    Viewing { index: usize },
    ConfirmingDiscard { index: usize, pending: PendingMove },
}

impl NavState {
    pub fn index(&self) -> usize {
        match self {
            Self::Viewing { index } | Self::ConfirmingDiscard { index, .. } => *index,
        }
    }

    pub fn is_confirming(&self) -> bool {
        matches!(self, Self::ConfirmingDiscard { .. })
    }

    /// Require the `Viewing` state for a pointer-changing or saving action.
    pub fn require_viewing(&self, action: &str) -> Result<usize, CoreError> {
        match self {
            Self::Viewing { index } => Ok(*index),
            Self::ConfirmingDiscard { .. } => Err(CoreError::Conflict(format!(
                "Cannot {action} while unsaved changes await confirmation"
            ))),
        }
    }

    /// Require the `ConfirmingDiscard` state and hand back its pending move.
    pub fn require_confirming(&self) -> Result<(usize, PendingMove), CoreError> {
        match self {
            Self::ConfirmingDiscard { index, pending } => Ok((*index, pending.clone())),
            Self::Viewing { .. } => Err(CoreError::Conflict(
                "There is no pending navigation to confirm".into(),
            )),
        }
    }
}

impl Default for NavState {
    fn default() -> Self {
        Self::Viewing { index: 0 }
    }
}

/// Index reached by stepping once from `index` in a list of `len` records.
///
/// Returns `None` for an empty list. An out-of-range `index` (the list shrank
/// since it was computed) is first clamped to the last record.
pub fn step_index(index: usize, len: usize, direction: Direction, policy: BoundaryPolicy) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let current = index.min(len - 1);
    let next = match (direction, policy) {
        (Direction::Next, BoundaryPolicy::Clamp) => (current + 1).min(len - 1),
        (Direction::Prev, BoundaryPolicy::Clamp) => current.saturating_sub(1),
        (Direction::Next, BoundaryPolicy::Wrap) => (current + 1) % len,
        (Direction::Prev, BoundaryPolicy::Wrap) => (current + len - 1) % len,
    };
    Some(next)
}

/// Locate the current record in a freshly computed visible list: by id when
/// it is still visible, otherwise by the remembered index clamped to bounds.
pub fn resolve_position(visible: &[RecordId], current_id: Option<&str>, index: usize) -> Option<usize> {
    if visible.is_empty() {
        return None;
    }
    if let Some(id) = current_id {
        if let Some(pos) = visible.iter().position(|v| v == id) {
            return Some(pos);
        }
    }
    Some(index.min(visible.len() - 1))
}

/// Target index of a pending move, given the current position.
pub fn target_index(
    visible: &[RecordId],
    position: usize,
    pending: &PendingMove,
    policy: BoundaryPolicy,
) -> Result<usize, CoreError> {
    match pending {
        PendingMove::Step { direction } => step_index(position, visible.len(), *direction, policy)
            .ok_or_else(|| CoreError::Conflict("No records are visible".into())),
        PendingMove::Goto { id } => visible
            .iter()
            .position(|v| v == id)
            .ok_or_else(|| CoreError::record_not_found(id)),
    }
}

/// `"3 / 10"` progress label.
pub fn progress_label(index: usize, total: usize) -> String {
    if total == 0 {
        "0 / 0".to_string()
    } else {
        format!("{} / {}", index + 1, total)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
