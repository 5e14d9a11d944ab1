//! Bounded diff construction for the semantic judge.
//!
//! A raw unified diff is split into one segment per file. Segments for heavy
//! assets, binary files and oversized files are dropped, and the rest are
//! admitted in order until the total byte budget is spent. The last admitted
//! segment may be cut to fit; every file that did not make it in whole is
//! named in [`JudgeDiffResult::excluded_files`].

use crate::repository::DiffSource;
use crate::{JudgeDiffResult, RevisionPair};

/// Ceiling for the assembled judge diff, in bytes.
pub const MAX_DIFF_BYTES: usize = 2 * 1024 * 1024;
/// Ceiling for a single file's segment, in bytes.
pub const MAX_FILE_DIFF_BYTES: usize = 1024 * 1024;

const SEGMENT_BREAK: &str = "\ndiff --git ";
const PATH_PREFIX: &str = "diff --git a/";
const PATH_END: &str = " b/";
const BINARY_PREFIX: &str = "Binary files ";
const BINARY_SUFFIX: &str = " differ";
const SEPARATOR: &str = "\n";

/// Extensions whose diffs never go to the judge: images, video, PDF, fonts.
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "tif", "tiff", "avif", "heic", "psd",
    "mp4", "mov", "avi", "mkv", "webm", "wmv", "m4v", "pdf", "woff", "woff2", "ttf", "otf", "eot",
];

/// Byte limits applied while assembling a judge diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffBudget {
    /// Ceiling for the joined output.
    pub max_total_bytes: usize,
    /// Segments larger than this are excluded outright.
    pub max_file_bytes: usize,
}

impl Default for DiffBudget {
    fn default() -> Self {
        Self {
            max_total_bytes: MAX_DIFF_BYTES,
            max_file_bytes: MAX_FILE_DIFF_BYTES,
        }
    }
}

/// Why a segment was left out of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Image, video, PDF or font file.
    HeavyAsset,
    /// Git reported the file as binary.
    Binary,
    /// Larger than the per-file ceiling.
    Oversized,
}

/// One file's slice of a raw unified diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffSegment<'a> {
    text: &'a str,
    path: Option<&'a str>,
}

impl<'a> DiffSegment<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            path: segment_path(text),
        }
    }

    /// Raw text of the segment, without its trailing newline.
    #[must_use]
    pub const fn text(&self) -> &'a str {
        self.text
    }

    /// File path from the `diff --git` header, when it parses.
    #[must_use]
    pub const fn path(&self) -> Option<&'a str> {
        self.path
    }

    /// Size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.text.len()
    }

    /// Segments are never empty once split.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether the segment is git's binary placeholder.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.text.contains(BINARY_PREFIX) && self.text.contains(BINARY_SUFFIX)
    }
}

/// Split a raw diff at every line that starts a new file section.
///
/// Each segment drops its trailing newline so that joining the segments with
/// `"\n"` reproduces the input. Blank pieces are discarded.
#[must_use]
pub fn split_segments(raw: &str) -> Vec<DiffSegment<'_>> {
    let mut bounds = vec![0];
    bounds.extend(raw.match_indices(SEGMENT_BREAK).map(|(index, _)| index + 1));
    bounds.push(raw.len());

    bounds
        .windows(2)
        .map(|window| &raw[window[0]..window[1]])
        .map(|piece| piece.strip_suffix('\n').unwrap_or(piece))
        .filter(|piece| !piece.trim().is_empty())
        .map(DiffSegment::new)
        .collect()
}

fn segment_path(text: &str) -> Option<&str> {
    let header = text.lines().next()?;
    let rest = header.strip_prefix(PATH_PREFIX)?;
    let end = rest.find(PATH_END)?;
    Some(&rest[..end]).filter(|path| !path.is_empty())
}

/// Lowercase extension after the last `.`, if any.
fn extension(path: &str) -> Option<String> {
    path.rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
}

fn is_heavy_asset(path: &str) -> bool {
    extension(path).is_some_and(|extension| EXCLUDED_EXTENSIONS.contains(&extension.as_str()))
}

impl DiffBudget {
    /// Classify a segment; `None` means it may be admitted.
    #[must_use]
    pub fn exclusion(&self, segment: &DiffSegment<'_>) -> Option<Exclusion> {
        if segment.path().is_some_and(is_heavy_asset) {
            Some(Exclusion::HeavyAsset)
        } else if segment.is_binary() {
            Some(Exclusion::Binary)
        } else if segment.len() > self.max_file_bytes {
            Some(Exclusion::Oversized)
        } else {
            None
        }
    }
}

/// Builds judge payloads from a diff source.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine {
    budget: DiffBudget,
}

impl DiffEngine {
    /// Construct an engine with the default 2 MiB / 1 MiB budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct an engine with custom limits.
    #[must_use]
    pub const fn with_budget(budget: DiffBudget) -> Self {
        Self { budget }
    }

    /// Fetch the diff for `revisions` and assemble the judge payload.
    ///
    /// A diff source failure yields an empty result rather than an error; the
    /// caller treats that as nothing to judge.
    #[must_use]
    pub fn diff_for_judge(
        &self,
        source: &dyn DiffSource,
        revisions: &RevisionPair,
    ) -> JudgeDiffResult {
        match source.unified_diff(revisions) {
            Ok(raw) => self.assemble(&raw, revisions),
            Err(err) => {
                tracing::warn!(error = %err, %revisions, "diff unavailable for judge");
                JudgeDiffResult::empty(revisions)
            }
        }
    }

    /// Filter and budget a raw diff.
    #[must_use]
    pub fn assemble(&self, raw: &str, revisions: &RevisionPair) -> JudgeDiffResult {
        let ceiling = self.budget.max_total_bytes;
        let mut admitted: Vec<&str> = Vec::new();
        let mut excluded = ExcludedFiles::default();
        let mut used = 0;
        let mut cut = false;

        for segment in split_segments(raw) {
            if let Some(reason) = self.budget.exclusion(&segment) {
                tracing::debug!(path = ?segment.path(), ?reason, "excluding diff segment");
                excluded.record(segment.path());
                continue;
            }

            if used >= ceiling {
                excluded.record(segment.path());
                continue;
            }

            let separator = if admitted.is_empty() { 0 } else { SEPARATOR.len() };
            let needed = separator + segment.len();
            if used + needed <= ceiling {
                admitted.push(segment.text());
                used += needed;
                continue;
            }

            let prefix = truncate_at_boundary(segment.text(), ceiling - used - separator);
            tracing::debug!(
                path = ?segment.path(),
                kept = prefix.len(),
                size = segment.len(),
                "truncating diff segment at budget"
            );
            if !prefix.is_empty() {
                admitted.push(prefix);
            }
            used = ceiling;
            cut = true;
            excluded.record(segment.path());
        }

        JudgeDiffResult {
            diff: admitted.join(SEPARATOR),
            excluded_files: excluded.into_inner(),
            truncated: cut || raw.len() > ceiling,
            base: revisions.base.clone(),
            head: revisions.head.clone(),
        }
    }
}

/// Longest prefix of `text` that fits in `limit` bytes and ends on a char
/// boundary.
fn truncate_at_boundary(text: &str, limit: usize) -> &str {
    if limit >= text.len() {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[derive(Debug, Default)]
struct ExcludedFiles(Vec<String>);

impl ExcludedFiles {
    fn record(&mut self, path: Option<&str>) {
        if let Some(path) = path {
            if !self.0.iter().any(|seen| seen == path) {
                self.0.push(path.to_owned());
            }
        }
    }

    fn into_inner(self) -> Vec<String> {
        self.0
    }
}
