//! The version-control capabilities the analysis and rewrite code depends on.
//!
//! `Repository` implements this trait by shelling out to the git CLI. Everything is
//! fallible and potentially slow; callers treat each call as a blocking suspension point.

use chrono::{DateTime, Utc};

use crate::error::LineageError;

/// Name, email and raw git date (`<unix-seconds> <±HHMM>`) of an author or committer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub seconds: i64,
    pub offset: String,
}

impl Signature {
    /// Date in the form git accepts for GIT_AUTHOR_DATE / GIT_COMMITTER_DATE.
    pub fn git_date(&self) -> String {
        format!("{} {}", self.seconds, self.offset)
    }
}

/// A commit object as stored by git: headers plus the exact message bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommit {
    pub hash: String,
    pub tree: String,
    pub parents: Vec<String>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    pub signed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchScope {
    Local,
    RemoteTracking,
}

impl BranchScope {
    pub fn ref_prefix(&self) -> &'static str {
        match self {
            BranchScope::Local => "refs/heads/",
            BranchScope::RemoteTracking => "refs/remotes/",
        }
    }
}

pub trait GitGateway {
    /// Short name of the checked-out branch, `None` when HEAD is detached.
    fn current_branch(&self) -> Result<Option<String>, LineageError>;

    fn head_commit(&self) -> Result<String, LineageError>;

    /// Resolve any revision to a full commit hash. Unknown revisions are `NotFound`.
    fn resolve_commit(&self, rev: &str) -> Result<String, LineageError>;

    fn ref_exists(&self, refname: &str) -> bool;

    /// Branches (short names) of the given scope whose history contains `commit`.
    fn branches_containing(
        &self,
        commit: &str,
        scope: BranchScope,
    ) -> Result<Vec<String>, LineageError>;

    fn read_commit(&self, commit: &str) -> Result<RawCommit, LineageError>;

    /// Hashes of commits reachable from HEAD with two or more parents, committed at or after
    /// `since`. `None` means no lower bound.
    fn merge_commits_since(&self, since: Option<DateTime<Utc>>)
    -> Result<Vec<String>, LineageError>;

    /// Commits in `base..tip`, oldest first.
    fn commit_range(&self, base: &str, tip: &str) -> Result<Vec<String>, LineageError>;

    /// Commits on the ancestry path `base..tip`, parents before children.
    fn ancestry_path(&self, base: &str, tip: &str) -> Result<Vec<String>, LineageError>;

    /// NUL-separated `--numstat` output of `commit` against `parent` (root diff when `None`).
    fn diff_numstat(&self, commit: &str, parent: Option<&str>) -> Result<Vec<u8>, LineageError>;

    /// NUL-separated `--name-status` output of `commit` against `parent`.
    fn diff_name_status(&self, commit: &str, parent: Option<&str>)
    -> Result<Vec<u8>, LineageError>;

    /// Full unified patch of `commit` against `parent`.
    fn diff_patch(&self, commit: &str, parent: Option<&str>) -> Result<String, LineageError>;

    /// True when tracked files have no staged or unstaged modifications.
    fn is_working_tree_clean(&self) -> Result<bool, LineageError>;

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, LineageError>;

    /// Number of commits in `from..to`.
    fn count_commits_between(&self, from: &str, to: &str) -> Result<usize, LineageError>;

    fn create_branch(&self, name: &str, target: &str) -> Result<(), LineageError>;

    fn create_tag(&self, name: &str, target: &str) -> Result<(), LineageError>;

    /// Write a new commit object and return its hash. No ref is moved.
    fn commit_tree(
        &self,
        tree: &str,
        parents: &[String],
        message: &str,
        author: &Signature,
        committer: &Signature,
    ) -> Result<String, LineageError>;

    /// Move `refname` to `new_target`, failing unless it currently points at `expected_old`.
    fn update_ref(
        &self,
        refname: &str,
        new_target: &str,
        expected_old: &str,
        reason: &str,
    ) -> Result<(), LineageError>;

    fn reset_hard(&self, target: &str) -> Result<(), LineageError>;
}
