use std::path::Path;

use decern_gate_core::{
    diff::DiffEngine,
    repository::{DiffSource, Repository},
    Error, Result, RevisionPair,
};
use git2::{IndexAddOption, Oid, Repository as GitRepository};
use tempfile::TempDir;

#[test]
fn judge_diff_leaves_out_assets_and_binaries() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let git_repo = GitRepository::init(temp.path())?;

    write_bytes(temp.path().join("README.md"), b"hello\n");
    stage_and_commit(&git_repo, "Initial commit")?;

    write_bytes(temp.path().join("logo.png"), b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR");
    write_bytes(temp.path().join("blob.dat"), b"\0\x01\x02\x03\0binary\0");
    std::fs::create_dir_all(temp.path().join("src")).expect("create src");
    write_bytes(temp.path().join("src/lib.rs"), b"pub fn answer() -> u32 {\n    42\n}\n");
    stage_and_commit(&git_repo, "Add assets and code")?;

    let repository = Repository::open(temp.path())?;
    let pair = RevisionPair::new("HEAD~1", "HEAD");

    let mut changed = repository.changed_files(&pair)?;
    changed.sort();
    assert_eq!(changed, vec!["blob.dat", "logo.png", "src/lib.rs"]);

    let result = DiffEngine::new().diff_for_judge(&repository, &pair);
    assert!(result.diff.starts_with("diff --git a/src/lib.rs b/src/lib.rs"));
    assert!(result.diff.contains("+    42"));
    assert!(!result.diff.contains("logo.png"));
    assert!(!result.diff.contains("blob.dat"));
    assert_eq!(result.excluded_files, vec!["blob.dat", "logo.png"]);
    assert!(!result.truncated);
    assert_eq!(result.base, "HEAD~1");
    assert_eq!(result.head, "HEAD");

    Ok(())
}

#[test]
fn upstream_branch_is_compared_from_the_merge_base() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let git_repo = GitRepository::init(temp.path())?;

    write_bytes(temp.path().join("README.md"), b"hello\n");
    let root = stage_and_commit(&git_repo, "Initial commit")?;

    // Upstream moves on independently of the branch under review.
    let root_commit = git_repo.find_commit(root)?;
    let mut builder = git_repo.treebuilder(Some(&root_commit.tree()?))?;
    let blob = git_repo.blob(b"upstream only\n")?;
    builder.insert("upstream.txt", blob, 0o100_644)?;
    let upstream_tree = git_repo.find_tree(builder.write()?)?;
    let signature = git2::Signature::now("Test", "test@example.com")?;
    git_repo.commit(
        Some("refs/remotes/origin/main"),
        &signature,
        &signature,
        "Upstream change",
        &upstream_tree,
        &[&root_commit],
    )?;

    std::fs::create_dir_all(temp.path().join("db/migrations")).expect("create migrations");
    write_bytes(
        temp.path().join("db/migrations/001_users.sql"),
        b"create table users (id int);\n",
    );
    let head = stage_and_commit(&git_repo, "Add users table")?;
    let upstream = git_repo.refname_to_id("refs/remotes/origin/main")?;

    let repository = Repository::open(temp.path())?;
    let pair = repository.resolve_revisions(None);
    assert_eq!(
        pair,
        RevisionPair::new(upstream.to_string(), head.to_string())
    );

    let changed = repository.changed_files(&pair)?;
    assert_eq!(changed, vec!["db/migrations/001_users.sql"]);

    let raw = repository.unified_diff(&pair)?;
    assert!(raw.contains("+create table users (id int);"));
    assert!(!raw.contains("upstream.txt"));

    Ok(())
}

#[test]
fn missing_revision_yields_empty_judge_diff() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let git_repo = GitRepository::init(temp.path())?;
    write_bytes(temp.path().join("README.md"), b"hello\n");
    stage_and_commit(&git_repo, "Initial commit")?;

    let repository = Repository::open(temp.path())?;
    let pair = RevisionPair::new("does-not-exist", "HEAD");

    let err = repository
        .changed_files(&pair)
        .expect_err("unknown base");
    assert!(matches!(err, Error::UnknownRevision { .. }));

    let result = DiffEngine::new().diff_for_judge(&repository, &pair);
    assert!(result.is_empty());
    assert!(result.excluded_files.is_empty());

    Ok(())
}

fn write_bytes(path: impl AsRef<Path>, contents: &[u8]) {
    std::fs::write(path, contents).expect("write file");
}

fn stage_and_commit(repo: &GitRepository, message: &str) -> Result<Oid> {
    let mut index = repo.index()?;
    index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let signature = git2::Signature::now("Test", "test@example.com")?;

    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit()?],
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
    Ok(repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        &parent_refs,
    )?)
}
