use serde::{Deserialize, Serialize};

use super::revision::RevisionPair;

/// Bounded diff prepared for the semantic judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeDiffResult {
    /// Admitted segments joined with newlines; never larger than the budget.
    pub diff: String,
    /// Paths left out of (or cut from) the payload, first exclusion first.
    #[serde(default)]
    pub excluded_files: Vec<String>,
    /// Whether any content was cut to fit the budget.
    #[serde(default)]
    pub truncated: bool,
    /// Base revision the diff was computed from.
    pub base: String,
    /// Head revision the diff was computed to.
    pub head: String,
}

impl JudgeDiffResult {
    /// Result used when no diff could be produced for the pair.
    #[must_use]
    pub fn empty(revisions: &RevisionPair) -> Self {
        Self {
            diff: String::new(),
            excluded_files: Vec::new(),
            truncated: false,
            base: revisions.base.clone(),
            head: revisions.head.clone(),
        }
    }

    /// True when there is nothing to send to the judge.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diff.trim().is_empty()
    }
}
