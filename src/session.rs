use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dedup::ActiveMatches;
use crate::markup::MarkupList;
use crate::matches::Language;

/// Identity of one focused surface. A new id is minted every time focus
/// moves to a different editable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CheckState {
    Idle,
    Debouncing,
    InFlight,
    Succeeded {
        language: Language,
        matches: ActiveMatches,
    },
    Failed {
        message: String,
    },
}

impl CheckState {
    /// Result for a surface with no text at all.
    pub fn empty() -> Self {
        CheckState::Succeeded {
            language: Language::default(),
            matches: ActiveMatches::default(),
        }
    }
}

/// Latest known check state of the active surface, as handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub surface: SurfaceId,
    pub markup_list: MarkupList,
    pub state: CheckState,
}

impl CheckResult {
    /// Active error count, `None` while unknown.
    pub fn total_errors(&self) -> Option<usize> {
        match &self.state {
            CheckState::Succeeded { matches, .. } => Some(matches.active_count),
            _ => None,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.state, CheckState::Debouncing | CheckState::InFlight)
    }
}
