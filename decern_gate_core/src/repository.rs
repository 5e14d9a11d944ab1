//! Repository access built on top of libgit2.

use std::fmt;
use std::path::Path;

use git2::{
    Commit, Diff, DiffFormat, DiffOptions, ErrorClass, ErrorCode, Repository as GitRepository,
};

use crate::{Error, Result, RevisionPair};

/// Remote branches tried, in order, when no explicit base is configured.
pub const DEFAULT_BASE_CANDIDATES: [&str; 2] = ["origin/main", "origin/master"];
const FALLBACK_BASE: &str = "HEAD~1";
const HEAD: &str = "HEAD";

/// Source of changed-file lists and raw unified diffs.
pub trait DiffSource {
    /// Paths touched between the two revisions, in diff order, deduplicated.
    ///
    /// # Errors
    ///
    /// Returns an error when either revision cannot be resolved or the diff
    /// cannot be computed.
    fn changed_files(&self, revisions: &RevisionPair) -> Result<Vec<String>>;

    /// Full unified diff text between the two revisions.
    ///
    /// # Errors
    ///
    /// Returns an error when either revision cannot be resolved or the diff
    /// cannot be rendered.
    fn unified_diff(&self, revisions: &RevisionPair) -> Result<String>;
}

/// Handle to the repository being gated.
pub struct Repository {
    inner: GitRepository,
}

impl Repository {
    /// Open a repository from the given filesystem path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be canonicalized or does not
    /// resolve to a git repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let original = path.as_ref();
        let canonical = std::fs::canonicalize(original).map_err(|source| Error::Io {
            path: display_path(original),
            source,
        })?;

        let repo = match GitRepository::discover(&canonical) {
            Ok(repo) => repo,
            Err(err)
                if err.class() == ErrorClass::Repository && err.code() == ErrorCode::NotFound =>
            {
                return Err(Error::NotARepository {
                    path: display_path(&canonical),
                })
            }
            Err(err) => return Err(Error::from(err)),
        };

        Ok(Self { inner: repo })
    }

    /// Pick the revision pair for this run.
    ///
    /// Explicit overrides win. Otherwise the first default upstream branch
    /// that exists is compared with `HEAD`, and failing that `HEAD~1` is.
    ///
    /// Each side that names a commit is replaced by the commit id; anything
    /// else is kept as written so later errors can name it.
    #[must_use]
    pub fn resolve_revisions(&self, overrides: Option<&RevisionPair>) -> RevisionPair {
        let pair = overrides.cloned().unwrap_or_else(|| {
            DEFAULT_BASE_CANDIDATES
                .iter()
                .find(|candidate| self.inner.revparse_single(candidate).is_ok())
                .map_or_else(
                    || RevisionPair::new(FALLBACK_BASE, HEAD),
                    |base| RevisionPair::new(*base, HEAD),
                )
        });
        RevisionPair::new(self.peel(&pair.base), self.peel(&pair.head))
    }

    fn peel(&self, revision: &str) -> String {
        match self.commit(revision) {
            Ok(commit) => {
                let id = commit.id().to_string();
                tracing::debug!(revision, %id, "resolved revision");
                id
            }
            Err(_) => revision.to_owned(),
        }
    }

    /// Full message of the HEAD commit, if the repository has one.
    ///
    /// # Errors
    ///
    /// Returns any error produced while resolving the HEAD reference.
    pub fn head_message(&self) -> Result<Option<String>> {
        let head = match self.inner.head() {
            Ok(head) => head,
            Err(err)
                if matches!(
                    (err.class(), err.code()),
                    (
                        ErrorClass::Reference,
                        ErrorCode::NotFound | ErrorCode::UnbornBranch
                    )
                ) =>
            {
                return Ok(None)
            }
            Err(err) => return Err(Error::from(err)),
        };

        let commit = head.peel_to_commit()?;
        Ok(commit.message().map(str::to_owned))
    }

    fn commit(&self, revision: &str) -> Result<Commit<'_>> {
        let object = self
            .inner
            .revparse_single(revision)
            .map_err(|source| Error::UnknownRevision {
                revision: revision.to_owned(),
                source,
            })?;
        Ok(object.peel_to_commit()?)
    }

    /// Tree diff from the merge base of the pair to the head commit.
    ///
    /// Falls back to the base commit itself when the histories share no
    /// ancestor.
    fn diff(&self, revisions: &RevisionPair) -> Result<Diff<'_>> {
        let base = self.commit(&revisions.base)?;
        let head = self.commit(&revisions.head)?;

        let base_tree = match self.inner.merge_base(base.id(), head.id()) {
            Ok(oid) => self.inner.find_commit(oid)?.tree()?,
            Err(err) if err.code() == ErrorCode::NotFound => base.tree()?,
            Err(err) => return Err(Error::from(err)),
        };
        let head_tree = head.tree()?;

        let mut opts = DiffOptions::new();
        opts.context_lines(3);
        Ok(self
            .inner
            .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), Some(&mut opts))?)
    }
}

impl DiffSource for Repository {
    fn changed_files(&self, revisions: &RevisionPair) -> Result<Vec<String>> {
        let diff = self.diff(revisions)?;
        let mut files: Vec<String> = Vec::new();
        for delta in diff.deltas() {
            for path in [delta.new_file().path(), delta.old_file().path()]
                .into_iter()
                .flatten()
            {
                let path = path.to_string_lossy().into_owned();
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }
        tracing::debug!(%revisions, count = files.len(), "collected changed files");
        Ok(files)
    }

    fn unified_diff(&self, revisions: &RevisionPair) -> Result<String> {
        let diff = self.diff(revisions)?;
        let mut patch = Vec::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            let origin = line.origin();
            if matches!(origin, '+' | '-' | ' ') {
                let mut buf = [0; 4];
                patch.extend_from_slice(origin.encode_utf8(&mut buf).as_bytes());
            }
            patch.extend_from_slice(line.content());
            true
        })?;
        Ok(String::from_utf8_lossy(&patch).into_owned())
    }
}

fn display_path(path: &Path) -> String {
    path.to_path_buf()
        .into_os_string()
        .to_string_lossy()
        .into_owned()
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.inner.path())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Repository as GitRepository};
    use tempfile::TempDir;

    #[test]
    fn falls_back_to_previous_commit() -> Result<()> {
        let temp = TempDir::new().expect("tempdir");
        let git_repo = GitRepository::init(temp.path())?;
        write_file(temp.path().join("README.md"), "hello\n");
        stage_and_commit(&git_repo, "Initial commit")?;
        let head = git_repo.head()?.peel_to_commit()?.id().to_string();

        let repo = Repository::open(temp.path())?;
        assert_eq!(
            repo.resolve_revisions(None),
            RevisionPair::new("HEAD~1", head)
        );
        Ok(())
    }

    #[test]
    fn prefers_explicit_overrides() -> Result<()> {
        let temp = TempDir::new().expect("tempdir");
        GitRepository::init(temp.path())?;

        let repo = Repository::open(temp.path())?;
        let pair = RevisionPair::new("abc", "def");
        assert_eq!(repo.resolve_revisions(Some(&pair)), pair);
        Ok(())
    }

    #[test]
    fn overrides_are_pinned_to_commit_ids() -> Result<()> {
        let temp = TempDir::new().expect("tempdir");
        let git_repo = GitRepository::init(temp.path())?;
        write_file(temp.path().join("file.txt"), "one\n");
        stage_and_commit(&git_repo, "First")?;
        let first = git_repo.head()?.peel_to_commit()?.id();
        write_file(temp.path().join("file.txt"), "two\n");
        stage_and_commit(&git_repo, "Second")?;
        let second = git_repo.head()?.peel_to_commit()?.id();

        let repo = Repository::open(temp.path())?;
        let short = first.to_string()[..7].to_owned();
        assert_eq!(
            repo.resolve_revisions(Some(&RevisionPair::new(short, "HEAD"))),
            RevisionPair::new(first.to_string(), second.to_string())
        );
        Ok(())
    }

    #[test]
    fn head_message_reads_full_message() -> Result<()> {
        let temp = TempDir::new().expect("tempdir");
        let git_repo = GitRepository::init(temp.path())?;

        let repo = Repository::open(temp.path())?;
        assert!(repo.head_message()?.is_none());

        write_file(temp.path().join("file.txt"), "one\n");
        stage_and_commit(&git_repo, "Add table\n\nRefs decern:abc_123")?;
        let message = repo.head_message()?.expect("head message");
        assert!(message.contains("decern:abc_123"));
        Ok(())
    }

    #[test]
    fn unknown_revision_is_reported() -> Result<()> {
        let temp = TempDir::new().expect("tempdir");
        let git_repo = GitRepository::init(temp.path())?;
        write_file(temp.path().join("file.txt"), "one\n");
        stage_and_commit(&git_repo, "Initial commit")?;

        let repo = Repository::open(temp.path())?;
        let err = repo
            .changed_files(&RevisionPair::new("HEAD~1", "HEAD"))
            .expect_err("no parent");
        assert!(matches!(err, Error::UnknownRevision { revision, .. } if revision == "HEAD~1"));
        Ok(())
    }

    #[test]
    fn open_non_repository_returns_error() {
        let temp = TempDir::new().expect("tempdir");
        let err = Repository::open(temp.path());
        assert!(matches!(err, Err(Error::NotARepository { .. })));
    }

    fn write_file(path: std::path::PathBuf, contents: &str) {
        std::fs::write(path, contents).expect("write file");
    }

    fn stage_and_commit(repo: &GitRepository, message: &str) -> Result<()> {
        let mut index = repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let signature = git2::Signature::now("Test User", "test@example.com")?;

        let parents = match repo.head() {
            Ok(head) => head
                .peel_to_commit()
                .map_or_else(|_| Vec::new(), |parent| vec![parent]),
            Err(err)
                if matches!(
                    (err.class(), err.code()),
                    (
                        git2::ErrorClass::Reference,
                        git2::ErrorCode::NotFound | git2::ErrorCode::UnbornBranch
                    )
                ) =>
            {
                Vec::new()
            }
            Err(err) => return Err(Error::from(err)),
        };

        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parent_refs,
        )?;
        Ok(())
    }
}
