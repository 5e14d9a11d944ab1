//! Core library for the decern-gate CI check.
//!
//! The crate is layered around four responsibilities:
//! - repository access: revision resolution, changed files and raw diffs
//! - the judge diff segmenter and byte budget
//! - high-impact policy and decision reference extraction
//! - the gate pipeline that ties them to the decision service clients

#![warn(
    clippy::all,
    clippy::cargo,
    clippy::nursery,
    clippy::pedantic,
    missing_docs
)]
#![cfg_attr(
    not(test),
    deny(
        clippy::dbg_macro,
        clippy::expect_used,
        clippy::panic,
        clippy::print_stderr,
        clippy::print_stdout,
        clippy::todo,
        clippy::unwrap_used
    )
)]

/// Environment-driven configuration.
pub mod config;
/// Judge diff segmentation and budgeting.
pub mod diff;
/// The gate pipeline.
pub mod gate;
/// High-impact path policy.
pub mod policy;
/// Decision reference extraction.
pub mod references;
/// Console report lines.
pub mod report;
/// Git repository access.
pub mod repository;

pub use decern_gate_api::{JudgeDiffResult, Reference, RevisionPair};

/// Common result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying git operation failed.
    #[error("git error: {source}")]
    Git {
        /// Original libgit2 error bubbled up by the core library.
        #[from]
        source: git2::Error,
    },
    /// Provided path does not correspond to a git repository.
    #[error("path does not reference a git repository: {path}")]
    NotARepository {
        /// Path that failed to resolve to a repository.
        path: String,
    },
    /// A revision expression did not resolve to a commit.
    #[error("unknown revision '{revision}': {source}")]
    UnknownRevision {
        /// Revision expression as supplied.
        revision: String,
        /// Error reported by libgit2.
        #[source]
        source: git2::Error,
    },
    /// Filesystem interaction failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Filesystem path involved in the failed operation.
        path: String,
        /// Source I/O error returned by the standard library.
        #[source]
        source: std::io::Error,
    },
    /// A high-impact path pattern is not a valid glob.
    #[error("invalid high-impact pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as configured.
        pattern: String,
        /// Glob compilation error.
        #[source]
        source: globset::Error,
    },
    /// A flag or environment variable holds an unusable value.
    #[error("{}", summary(.0))]
    Arguments(#[from] clap::Error),
}

/// First line of a clap error, without its `error:` prefix or usage footer.
fn summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let line = rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    line.strip_prefix("error: ").unwrap_or(line).to_owned()
}
