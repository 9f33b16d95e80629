//! Safety-gated rewriting of local commit messages.
//!
//! A rewrite goes `Planned -> BackedUp -> Rewriting -> Completed | PartiallyFailed`.
//! `RolledBack` is reached only through an explicit [`executor::RewriteExecutor::rollback_to_backup`];
//! nothing is rolled back automatically.

pub mod executor;
pub mod planner;
pub mod safety;
pub mod token;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LineageError;

pub use executor::RewriteExecutor;
pub use planner::{
    ConventionalMessageSuggester, FixedMessageSuggester, MessageSuggester, RewritePlanner,
};
pub use safety::SafetyGate;
pub use token::{DigestTokenAuthority, NonceTokenAuthority, TokenAuthority};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub safe: bool,
    /// First blocking condition found, when `safe` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStrategy {
    pub branch_name: String,
    pub tag_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub commit_count: usize,
    /// The branch whose history is rewritten
    pub affected_branches: Vec<String>,
    /// Other local branches that contain a target and will keep the old commits
    pub dependent_branches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteTarget {
    pub hash: String,
    pub original_message: String,
    pub proposed_message: String,
    /// Committer timestamp
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewritePlan {
    /// Oldest first
    pub targets: Vec<RewriteTarget>,
    pub safety_check: SafetyAssessment,
    pub backup: BackupStrategy,
    pub impact: ImpactAnalysis,
    pub confirmation_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RewritePlan {
    pub fn target_hashes(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.hash.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteState {
    Planned,
    BackedUp,
    Rewriting,
    Completed,
    PartiallyFailed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRewrite {
    pub original_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_hash: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteResult {
    pub commits: Vec<CommitRewrite>,
    pub backup: BackupStrategy,
    pub warnings: Vec<String>,
    pub state: RewriteState,
}

impl RewriteResult {
    pub fn failed_count(&self) -> usize {
        self.commits.iter().filter(|c| !c.success).count()
    }

    /// Turn a partially failed batch into `PartialFailure`.
    pub fn into_result(self) -> Result<RewriteResult, LineageError> {
        let failed = self.failed_count();
        if failed > 0 {
            return Err(LineageError::PartialFailure {
                failed,
                total: self.commits.len(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result_reports_partial_failure() {
        let result = RewriteResult {
            commits: vec![
                CommitRewrite {
                    original_hash: "a".to_string(),
                    new_hash: Some("b".to_string()),
                    success: true,
                    error: None,
                },
                CommitRewrite {
                    original_hash: "c".to_string(),
                    new_hash: None,
                    success: false,
                    error: Some("boom".to_string()),
                },
            ],
            backup: BackupStrategy {
                branch_name: "backup/x".to_string(),
                tag_name: "backup-x".to_string(),
                created_at: Utc::now(),
            },
            warnings: Vec::new(),
            state: RewriteState::PartiallyFailed,
        };
        match result.into_result() {
            Err(LineageError::PartialFailure { failed, total }) => {
                assert_eq!((failed, total), (1, 2));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[test]
    fn test_state_names() {
        assert_eq!(
            serde_json::to_string(&RewriteState::PartiallyFailed).unwrap(),
            "\"partially-failed\""
        );
    }
}
