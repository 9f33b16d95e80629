//! Feature-branch reconstruction from merge commits.
//!
//! A merge commit's first parent is the base it was merged into and its second parent
//! is the tip of the merged branch; the commits in `base..tip` are the branch's own work.
//! Branch names come from the merge message, since the branch ref itself is usually gone.

pub mod contributors;
pub mod merge_message;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{TimeDelta, Utc};

use crate::config::Config;
use crate::diff::DiffParser;
use crate::error::LineageError;
use crate::git::GitGateway;
use crate::logging::Logger;
use crate::models::{BranchStatus, ChangeCategory, Commit, CommitChanges, FeatureBranch};
use crate::utils::short_hash;

pub use contributors::{co_authors, extract_contributors};
pub use merge_message::{
    accepted_branch_name, extract_branch_name, extract_pull_request_info, is_feature_branch_name,
};

const MAX_DESCRIBED_SUBJECTS: usize = 5;
const MAX_CATEGORY_TAKEAWAYS: usize = 2;

/// Cooperative stop signal shared between a caller and a long enumeration.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct BranchReconstructor<'a> {
    gateway: &'a dyn GitGateway,
    diff: DiffParser<'a>,
    logger: Logger,
    integration_markers: Vec<String>,
    cancel: CancellationFlag,
}

impl<'a> BranchReconstructor<'a> {
    pub fn new(gateway: &'a dyn GitGateway, config: &Config, logger: Logger) -> Self {
        BranchReconstructor {
            gateway,
            diff: DiffParser::new(gateway, config, logger.clone()),
            logger,
            integration_markers: config.integration_branch_markers().to_vec(),
            cancel: CancellationFlag::new(),
        }
    }

    /// Stop enumerations early once `flag` is cancelled.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = flag;
        self
    }

    fn cancelled(&self, during: &str) -> bool {
        if self.cancel.is_cancelled() {
            self.logger
                .warn(&format!("Cancelled while {}; returning partial results", during));
            return true;
        }
        false
    }

    /// Read one commit with its parents and computed changes.
    pub fn read_commit(&self, hash: &str) -> Result<Commit, LineageError> {
        self.diff.read_commit(hash)
    }

    /// Merge commits reachable from HEAD committed in the last `since_days` days, newest first.
    ///
    /// A window reaching past the earliest representable date is unbounded.
    pub fn get_all_merge_commits(&self, since_days: u32) -> Vec<Commit> {
        let since = TimeDelta::try_days(i64::from(since_days))
            .and_then(|window| Utc::now().checked_sub_signed(window));
        let hashes = match self.gateway.merge_commits_since(since) {
            Ok(hashes) => hashes,
            Err(e) => {
                self.logger
                    .warn(&format!("Could not list merge commits: {}", e));
                return Vec::new();
            }
        };
        self.logger.debug(&format!(
            "Found {} merge commit(s) in the last {} day(s)",
            hashes.len(),
            since_days
        ));

        let mut merges = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if self.cancelled("listing merge commits") {
                break;
            }
            match self.read_commit(&hash) {
                Ok(commit) => merges.push(commit),
                Err(e) => self.logger.warn(&format!(
                    "Skipping merge commit {}: {}",
                    short_hash(&hash),
                    e
                )),
            }
        }
        merges
    }

    /// Commits that originated on the branch merged by `merge_commit`, oldest first.
    ///
    /// Empty when the merge commit has fewer than two parents.
    pub fn get_branch_commits(&self, merge_commit: &Commit, branch_name: &str) -> Vec<Commit> {
        let [base, tip, ..] = merge_commit.parents.as_slice() else {
            self.logger.debug(&format!(
                "{} ({}) has fewer than two parents; no branch commits",
                short_hash(&merge_commit.hash),
                branch_name
            ));
            return Vec::new();
        };

        let hashes = match self.gateway.commit_range(base, tip) {
            Ok(hashes) => hashes,
            Err(e) => {
                self.logger.warn(&format!(
                    "Could not list commits of {} ({}): {}",
                    branch_name,
                    short_hash(&merge_commit.hash),
                    e
                ));
                return Vec::new();
            }
        };

        let mut commits = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if self.cancelled("reading branch commits") {
                break;
            }
            match self.read_commit(&hash) {
                Ok(commit) => commits.push(commit),
                Err(e) => self.logger.warn(&format!(
                    "Skipping commit {} of {}: {}",
                    short_hash(&hash),
                    branch_name,
                    e
                )),
            }
        }
        commits
    }

    /// Feature branches merged in the last `since_days` days.
    ///
    /// Merges whose hash is in `already_processed`, whose message names no branch, or whose
    /// branch is an integration branch are skipped.
    pub fn reconstruct_feature_branches(
        &self,
        since_days: u32,
        already_processed: &HashSet<String>,
    ) -> Vec<FeatureBranch> {
        let mut branches = Vec::new();
        for merge in self.get_all_merge_commits(since_days) {
            if self.cancelled("reconstructing branches") {
                break;
            }
            if already_processed.contains(&merge.hash) {
                continue;
            }
            let Some(name) = accepted_branch_name(&merge.message, &self.integration_markers)
            else {
                self.logger.debug(&format!(
                    "Skipping {}: not a feature branch merge ({:?})",
                    short_hash(&merge.hash),
                    merge.subject()
                ));
                continue;
            };
            branches.push(self.assemble_branch(merge, name));
        }
        branches
    }

    /// Build the full record for one accepted merge.
    pub fn assemble_branch(&self, merge_commit: Commit, name: String) -> FeatureBranch {
        let commits = self.get_branch_commits(&merge_commit, &name);
        let contributors = extract_contributors(&commits, &merge_commit);
        let description = describe_branch(&commits, &merge_commit);
        let key_takeaways = key_takeaways(&commits, &merge_commit);
        let pull_request = extract_pull_request_info(&merge_commit.message);

        FeatureBranch {
            name,
            commits,
            merged_at: merge_commit.timestamp,
            merge_commit,
            description,
            status: BranchStatus::Merged,
            contributors,
            pull_request,
            key_takeaways,
        }
    }
}

fn presented<'c>(commits: &'c [Commit], merge_commit: &'c Commit) -> Vec<&'c CommitChanges> {
    if commits.is_empty() {
        vec![&merge_commit.changes]
    } else {
        commits.iter().map(|c| &c.changes).collect()
    }
}

/// One-paragraph description of a branch from its commit subjects and overall diff.
///
/// Falls back to the merge commit's own change summary when the branch has no commits.
pub fn describe_branch(commits: &[Commit], merge_commit: &Commit) -> String {
    if commits.is_empty() {
        if merge_commit.changes.summary.is_empty() {
            return merge_commit.subject().to_string();
        }
        return merge_commit.changes.summary.clone();
    }

    let mut subjects: Vec<&str> = Vec::new();
    for subject in commits.iter().map(Commit::subject) {
        if !subject.is_empty() && !subjects.contains(&subject) {
            subjects.push(subject);
        }
    }
    let extra = subjects.len().saturating_sub(MAX_DESCRIBED_SUBJECTS);
    subjects.truncate(MAX_DESCRIBED_SUBJECTS);
    let mut listed = subjects.join("; ");
    if extra > 0 {
        listed.push_str(&format!("; and {} more", extra));
    }

    let files: HashSet<&str> = commits
        .iter()
        .flat_map(|c| c.changes.files.iter().map(String::as_str))
        .collect();
    let insertions: u64 = commits.iter().map(|c| c.changes.insertions).sum();
    let deletions: u64 = commits.iter().map(|c| c.changes.deletions).sum();

    format!(
        "{} {}: {}. {} {} changed (+{}/-{}).",
        commits.len(),
        if commits.len() == 1 { "commit" } else { "commits" },
        listed,
        files.len(),
        if files.len() == 1 { "file" } else { "files" },
        insertions,
        deletions
    )
}

/// Distinct insights across the branch, then its most-touched file categories.
pub fn key_takeaways(commits: &[Commit], merge_commit: &Commit) -> Option<Vec<String>> {
    let changes = presented(commits, merge_commit);

    let mut takeaways: Vec<String> = Vec::new();
    for insight in changes.iter().flat_map(|c| c.insights.iter()) {
        if !takeaways.contains(insight) {
            takeaways.push(insight.clone());
        }
    }

    // A file touched by several commits counts once, under its latest category
    let mut by_file: BTreeMap<&str, ChangeCategory> = BTreeMap::new();
    for file in changes.iter().flat_map(|c| c.file_changes.iter()) {
        by_file.insert(file.filename.as_str(), file.category);
    }
    let mut per_category: BTreeMap<ChangeCategory, usize> = BTreeMap::new();
    for category in by_file.into_values() {
        if category != ChangeCategory::Other {
            *per_category.entry(category).or_default() += 1;
        }
    }
    let mut dominant: Vec<(ChangeCategory, usize)> = per_category.into_iter().collect();
    // Stable sort keeps taxonomy order among equal counts
    dominant.sort_by(|a, b| b.1.cmp(&a.1));
    for (category, count) in dominant.into_iter().take(MAX_CATEGORY_TAKEAWAYS) {
        takeaways.push(format!(
            "Touches {} {} file{}",
            count,
            category.as_str(),
            if count == 1 { "" } else { "s" }
        ));
    }

    if takeaways.is_empty() {
        None
    } else {
        Some(takeaways)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_utils::TmpRepo;
    use crate::models::ContributorRole;

    fn login_fix_repo() -> (TmpRepo, String) {
        let tmp = TmpRepo::new().unwrap();
        tmp.write_file("app.txt", "base\n").unwrap();
        tmp.commit("initial").unwrap();

        tmp.create_branch("feature/login-fix").unwrap();
        tmp.checkout("feature/login-fix").unwrap();
        tmp.write_file("app.txt", "a\nb\nc\n").unwrap();
        let when = tmp.tick();
        tmp.commit_as("fix login redirect", "Alice", "alice@example.com", when)
            .unwrap();
        let body: String = (1..=10).map(|i| format!("check {}\n", i)).collect();
        tmp.write_file("login_checks.txt", &body).unwrap();
        let when = tmp.tick();
        tmp.commit_as("add login checks", "Alice", "alice@example.com", when)
            .unwrap();

        tmp.checkout("main").unwrap();
        let merge = tmp
            .merge_no_ff(
                "feature/login-fix",
                "Merge branch 'feature/login-fix' into 'main'",
                "Maintainer",
                "maint@example.com",
            )
            .unwrap();
        (tmp, merge)
    }

    #[test]
    fn test_reconstructs_login_fix_branch() {
        let (tmp, merge) = login_fix_repo();
        let reconstructor =
            BranchReconstructor::new(tmp.repo(), &Config::default(), Logger::quiet());

        let branches = reconstructor.reconstruct_feature_branches(90, &HashSet::new());
        assert_eq!(branches.len(), 1);
        let branch = &branches[0];
        assert_eq!(branch.name, "feature/login-fix");
        assert_eq!(branch.merge_commit.hash, merge);
        assert_eq!(branch.status, BranchStatus::Merged);
        assert_eq!(branch.commits.len(), 2);
        assert_eq!(branch.commits[0].subject(), "fix login redirect");
        assert_eq!(
            (branch.commits[0].changes.insertions, branch.commits[0].changes.deletions),
            (3, 1)
        );
        assert_eq!(
            (branch.commits[1].changes.insertions, branch.commits[1].changes.deletions),
            (10, 0)
        );

        assert_eq!(branch.contributors[0].role, ContributorRole::Author);
        assert_eq!(branch.contributors[0].name, "Alice");
        assert_eq!(branch.contributors[0].lines_added, 13);
        assert_eq!(branch.contributors[1].role, ContributorRole::Merger);

        assert!(branch.description.starts_with("2 commits: fix login redirect; add login checks."));
        let pr = branch.pull_request.as_ref().unwrap();
        assert_eq!(pr.target_branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_already_processed_merges_are_skipped() {
        let (tmp, merge) = login_fix_repo();
        let reconstructor =
            BranchReconstructor::new(tmp.repo(), &Config::default(), Logger::quiet());
        let processed: HashSet<String> = [merge].into_iter().collect();
        assert!(
            reconstructor
                .reconstruct_feature_branches(90, &processed)
                .is_empty()
        );
    }

    #[test]
    fn test_integration_branch_merges_are_skipped() {
        let tmp = TmpRepo::new().unwrap();
        tmp.write_file("a.txt", "a\n").unwrap();
        tmp.commit("initial").unwrap();
        tmp.create_branch("develop").unwrap();
        tmp.checkout("develop").unwrap();
        tmp.write_file("b.txt", "b\n").unwrap();
        tmp.commit("work on develop").unwrap();
        tmp.checkout("main").unwrap();
        tmp.merge_no_ff("develop", "Merge branch 'develop'", "M", "m@example.com")
            .unwrap();

        let reconstructor =
            BranchReconstructor::new(tmp.repo(), &Config::default(), Logger::quiet());
        assert_eq!(reconstructor.get_all_merge_commits(90).len(), 1);
        assert!(
            reconstructor
                .reconstruct_feature_branches(90, &HashSet::new())
                .is_empty()
        );
    }

    #[test]
    fn test_integration_markers_come_from_config() {
        let tmp = TmpRepo::new().unwrap();
        tmp.write_file("a.txt", "a\n").unwrap();
        tmp.commit("initial").unwrap();
        tmp.create_branch("develop").unwrap();
        tmp.checkout("develop").unwrap();
        tmp.write_file("b.txt", "b\n").unwrap();
        tmp.commit("work on develop").unwrap();
        tmp.checkout("main").unwrap();
        tmp.merge_no_ff("develop", "Merge branch 'develop'", "M", "m@example.com")
            .unwrap();

        let config = Config::default().with_integration_branch_markers(vec!["trunk".to_string()]);
        let reconstructor = BranchReconstructor::new(tmp.repo(), &config, Logger::quiet());
        let branches = reconstructor.reconstruct_feature_branches(90, &HashSet::new());
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, "develop");
    }

    #[test]
    fn test_single_parent_merge_falls_back_to_own_changes() {
        let tmp = TmpRepo::new().unwrap();
        tmp.write_file("a.txt", "a\n").unwrap();
        tmp.commit("initial").unwrap();
        tmp.write_file("feature.txt", "one\ntwo\n").unwrap();
        let squashed = tmp.commit("Merge branch 'feature/squashed'").unwrap();

        let reconstructor =
            BranchReconstructor::new(tmp.repo(), &Config::default(), Logger::quiet());
        let merge = reconstructor.read_commit(&squashed).unwrap();
        let branch = reconstructor.assemble_branch(merge, "feature/squashed".to_string());

        assert!(branch.commits.is_empty());
        assert_eq!(branch.description, branch.merge_commit.changes.summary);
        assert!(branch.description.starts_with("1 file changed (+2/-0)"));
        assert_eq!(branch.presented_changes().len(), 1);
        assert_eq!(branch.contributors.len(), 1);
        assert_eq!(branch.contributors[0].role, ContributorRole::Merger);
    }

    #[test]
    fn test_cancellation_stops_enumeration() {
        let (tmp, _) = login_fix_repo();
        let flag = CancellationFlag::new();
        let logger = Logger::capturing();
        let reconstructor = BranchReconstructor::new(tmp.repo(), &Config::default(), logger.clone())
            .with_cancellation(flag.clone());

        flag.cancel();
        assert!(reconstructor.get_all_merge_commits(90).is_empty());
        assert!(logger.captured().iter().any(|l| l.contains("Cancelled")));
    }

    #[test]
    fn test_key_takeaways_from_categories() {
        let (tmp, _) = login_fix_repo();
        let reconstructor =
            BranchReconstructor::new(tmp.repo(), &Config::default(), Logger::quiet());
        let branch = reconstructor
            .reconstruct_feature_branches(90, &HashSet::new())
            .remove(0);
        // Both files are .txt, which classifies as documentation
        assert_eq!(
            branch.key_takeaways,
            Some(vec!["Touches 2 documentation files".to_string()])
        );
    }

    #[test]
    fn test_key_takeaways_count_each_file_once() {
        let tmp = TmpRepo::new().unwrap();
        tmp.write_file("notes.txt", "one\n").unwrap();
        tmp.commit("initial").unwrap();

        tmp.create_branch("feature/notes").unwrap();
        tmp.checkout("feature/notes").unwrap();
        tmp.write_file("notes.txt", "one\ntwo\n").unwrap();
        tmp.commit("add two").unwrap();
        tmp.write_file("notes.txt", "one\ntwo\nthree\n").unwrap();
        tmp.commit("add three").unwrap();
        tmp.checkout("main").unwrap();
        tmp.merge_no_ff("feature/notes", "Merge branch 'feature/notes'", "M", "m@example.com")
            .unwrap();

        let reconstructor =
            BranchReconstructor::new(tmp.repo(), &Config::default(), Logger::quiet());
        let branch = reconstructor
            .reconstruct_feature_branches(90, &HashSet::new())
            .remove(0);
        assert_eq!(branch.commits.len(), 2);
        let takeaways = branch.key_takeaways.unwrap();
        assert!(
            takeaways.contains(&"Touches 1 documentation file".to_string()),
            "takeaways were {:?}",
            takeaways
        );
        assert!(!takeaways.iter().any(|t| t.contains("2 documentation")));
    }

    #[test]
    fn test_huge_window_lists_every_merge() {
        let (tmp, merge) = login_fix_repo();
        let reconstructor =
            BranchReconstructor::new(tmp.repo(), &Config::default(), Logger::quiet());

        let merges = reconstructor.get_all_merge_commits(u32::MAX);
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].hash, merge);
    }
}
