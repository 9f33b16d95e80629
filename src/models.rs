//! Data model shared by the analysis and rewrite code. Everything here is derived from the
//! live commit graph on each query; nothing is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Added => "added",
            FileStatus::Modified => "modified",
            FileStatus::Deleted => "deleted",
            FileStatus::Renamed => "renamed",
        }
    }
}

/// Fixed taxonomy used for change summaries. Declaration order is the classification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCategory {
    Configuration,
    Documentation,
    Infrastructure,
    Scripts,
    Binaries,
    Templates,
    Security,
    Other,
}

impl ChangeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeCategory::Configuration => "configuration",
            ChangeCategory::Documentation => "documentation",
            ChangeCategory::Infrastructure => "infrastructure",
            ChangeCategory::Scripts => "scripts",
            ChangeCategory::Binaries => "binaries",
            ChangeCategory::Templates => "templates",
            ChangeCategory::Security => "security",
            ChangeCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_filename: Option<String>,
    pub status: FileStatus,
    pub insertions: u64,
    pub deletions: u64,
    #[serde(default)]
    pub binary: bool,
    pub category: ChangeCategory,
    /// Patch text for this file only, capped with a truncation marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitChanges {
    pub insertions: u64,
    pub deletions: u64,
    pub files: Vec<String>,
    pub file_changes: Vec<FileChange>,
    pub summary: String,
    /// Keyword-triggered observations about the diff, at most three
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integrity_warnings: Vec<String>,
}

impl CommitChanges {
    pub fn is_empty(&self) -> bool {
        self.file_changes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Committer timestamp
    pub timestamp: DateTime<Utc>,
    pub parents: Vec<String>,
    pub changes: CommitChanges,
}

impl Commit {
    /// First line of the message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    Merged,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContributorRole {
    Author,
    Merger,
    CoAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub email: String,
    pub commit_count: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub role: ContributorRole,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referenced_issues: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBranch {
    pub name: String,
    /// Commits that originated on the branch, oldest first. Empty when the merge
    /// commit has fewer than two parents.
    pub commits: Vec<Commit>,
    pub merge_commit: Commit,
    pub merged_at: DateTime<Utc>,
    pub description: String,
    pub status: BranchStatus,
    pub contributors: Vec<Contributor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_takeaways: Option<Vec<String>>,
}

impl FeatureBranch {
    /// Changes to present for this branch: the merge commit's own diff when the branch
    /// has no commits of its own.
    pub fn presented_changes(&self) -> Vec<&CommitChanges> {
        if self.commits.is_empty() {
            vec![&self.merge_commit.changes]
        } else {
            self.commits.iter().map(|c| &c.changes).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_serialization_names() {
        assert_eq!(
            serde_json::to_string(&ContributorRole::CoAuthor).unwrap(),
            "\"co-author\""
        );
        assert_eq!(
            serde_json::to_string(&FileStatus::Renamed).unwrap(),
            "\"renamed\""
        );
        assert_eq!(
            serde_json::to_string(&ChangeCategory::Infrastructure).unwrap(),
            "\"infrastructure\""
        );
        assert_eq!(serde_json::to_string(&BranchStatus::Merged).unwrap(), "\"merged\"");
    }

    #[test]
    fn test_commit_subject_and_merge() {
        let commit = Commit {
            hash: "h".to_string(),
            message: "fix: null check\n\nlonger body\n".to_string(),
            author_name: "A".to_string(),
            author_email: "a@x".to_string(),
            timestamp: Utc::now(),
            parents: vec!["p1".to_string(), "p2".to_string()],
            changes: CommitChanges::default(),
        };
        assert_eq!(commit.subject(), "fix: null check");
        assert!(commit.is_merge());
    }
}
