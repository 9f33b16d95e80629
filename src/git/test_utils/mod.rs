//! Throw-away repositories for tests, built with git2 so fixture setup does not depend on
//! the code under test.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use git2::build::CheckoutBuilder;
use git2::{BranchType, IndexAddOption, Oid, RepositoryInitOptions};

use crate::config::Config;
use crate::error::LineageError;
use crate::git::repository::{Repository, find_repository_in_path};

pub const TEST_USER_NAME: &str = "Test User";
pub const TEST_USER_EMAIL: &str = "test@example.com";

pub struct TmpRepo {
    path: PathBuf,
    git2_repo: git2::Repository,
    repo: Repository,
    clock: Cell<i64>,
}

impl TmpRepo {
    pub fn new() -> Result<Self, LineageError> {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Result<Self, LineageError> {
        let path = std::env::temp_dir().join(format!("git-lineage-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&path)?;

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let git2_repo = git2::Repository::init_opts(&path, &opts)?;
        {
            let mut git_config = git2_repo.config()?;
            git_config.set_str("user.name", TEST_USER_NAME)?;
            git_config.set_str("user.email", TEST_USER_EMAIL)?;
        }

        let repo = find_repository_in_path(&path.to_string_lossy(), config)?;

        Ok(TmpRepo {
            path,
            git2_repo,
            repo,
            // Start a month back so `--since` windows include every fixture commit
            clock: Cell::new(Utc::now().timestamp() - 30 * 24 * 60 * 60),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn git2(&self) -> &git2::Repository {
        &self.git2_repo
    }

    /// Advance the fixture clock by a minute and return the new timestamp.
    pub fn tick(&self) -> i64 {
        let next = self.clock.get() + 60;
        self.clock.set(next);
        next
    }

    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf, LineageError> {
        let file_path = self.path.join(name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file_path, contents)?;
        Ok(file_path)
    }

    pub fn read_file(&self, name: &str) -> Result<String, LineageError> {
        Ok(fs::read_to_string(self.path.join(name))?)
    }

    pub fn remove_file(&self, name: &str) -> Result<(), LineageError> {
        fs::remove_file(self.path.join(name))?;
        Ok(())
    }

    /// Stage everything and commit as the default test user.
    pub fn commit(&self, message: &str) -> Result<String, LineageError> {
        let when = self.tick();
        self.commit_as(message, TEST_USER_NAME, TEST_USER_EMAIL, when)
    }

    /// Stage everything and commit with an explicit author/committer identity and time.
    pub fn commit_as(
        &self,
        message: &str,
        name: &str,
        email: &str,
        seconds: i64,
    ) -> Result<String, LineageError> {
        let mut index = self.git2_repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = self.git2_repo.find_tree(tree_id)?;

        let sig = git2::Signature::new(name, email, &git2::Time::new(seconds, 0))?;
        let parent = self
            .git2_repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = self
            .git2_repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        Ok(oid.to_string())
    }

    pub fn create_branch(&self, name: &str) -> Result<(), LineageError> {
        let head = self.git2_repo.head()?.peel_to_commit()?;
        self.git2_repo.branch(name, &head, false)?;
        Ok(())
    }

    pub fn checkout(&self, name: &str) -> Result<(), LineageError> {
        self.git2_repo.set_head(&format!("refs/heads/{}", name))?;
        self.git2_repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(())
    }

    /// Create a two-parent merge of `branch` into the current branch (like `merge --no-ff`).
    pub fn merge_no_ff(
        &self,
        branch: &str,
        message: &str,
        name: &str,
        email: &str,
    ) -> Result<String, LineageError> {
        let ours = self.git2_repo.head()?.peel_to_commit()?;
        let theirs = self
            .git2_repo
            .find_branch(branch, BranchType::Local)?
            .get()
            .peel_to_commit()?;

        let mut index = self.git2_repo.merge_commits(&ours, &theirs, None)?;
        if index.has_conflicts() {
            return Err(LineageError::Generic(format!(
                "Fixture merge of {} has conflicts",
                branch
            )));
        }
        let tree_id = index.write_tree_to(&self.git2_repo)?;
        let tree = self.git2_repo.find_tree(tree_id)?;
        let sig = git2::Signature::new(name, email, &git2::Time::new(self.tick(), 0))?;

        let oid = self.git2_repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            message,
            &tree,
            &[&ours, &theirs],
        )?;
        self.git2_repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(oid.to_string())
    }

    /// Point `refs/remotes/<name>` at `target`, as a fetch would.
    pub fn set_remote_ref(&self, name: &str, target: &str) -> Result<(), LineageError> {
        self.git2_repo.reference(
            &format!("refs/remotes/{}", name),
            Oid::from_str(target)?,
            true,
            "fixture remote-tracking ref",
        )?;
        Ok(())
    }

    pub fn head_sha(&self) -> Result<String, LineageError> {
        Ok(self.git2_repo.head()?.peel_to_commit()?.id().to_string())
    }

    /// Message of `commit` as stored in the object database.
    pub fn message_of(&self, commit: &str) -> Result<String, LineageError> {
        let commit = self.git2_repo.find_commit(Oid::from_str(commit)?)?;
        Ok(commit.message().unwrap_or_default().to_string())
    }
}

impl Drop for TmpRepo {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
