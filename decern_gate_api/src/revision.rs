use serde::{Deserialize, Serialize};

/// The pair of revisions a gate run compares.
///
/// Resolved once per run and reused for both the changed-file list and the
/// judge diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPair {
    /// Base revision (branch name, ref expression or object id).
    pub base: String,
    /// Head revision being gated.
    pub head: String,
}

impl RevisionPair {
    /// Construct a pair from any two revision expressions.
    #[must_use]
    pub fn new(base: impl Into<String>, head: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            head: head.into(),
        }
    }
}

impl std::fmt::Display for RevisionPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.base, self.head)
    }
}
