use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::config::Config;
use crate::diff::DiffParser;
use crate::error::LineageError;
use crate::git::{BranchScope, GitGateway};
use crate::logging::Logger;
use crate::models::{ChangeCategory, Commit, CommitChanges, FileStatus};
use crate::rewrite::safety::SafetyGate;
use crate::rewrite::token::TokenAuthority;
use crate::rewrite::{BackupStrategy, ImpactAnalysis, RewritePlan, RewriteTarget};
use crate::utils::short_hash;

/// Proposes a replacement message for a commit.
pub trait MessageSuggester {
    fn suggest(&self, commit: &Commit) -> Result<String, LineageError>;
}

static CONVENTIONAL_SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]+(\([^)]+\))?!?: \S").expect("conventional subject pattern")
});

/// Rewrites the subject line into `type(scope): description`, keeping the body.
///
/// The type is guessed from the commit's changes. Messages that already follow the
/// convention are returned unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConventionalMessageSuggester;

impl ConventionalMessageSuggester {
    fn commit_type(changes: &CommitChanges) -> &'static str {
        let files = &changes.file_changes;
        if files.is_empty() {
            return "chore";
        }
        if files
            .iter()
            .all(|f| f.category == ChangeCategory::Documentation)
        {
            return "docs";
        }
        if files
            .iter()
            .all(|f| f.filename.to_lowercase().contains("test"))
        {
            return "test";
        }
        if files.iter().all(|f| {
            matches!(
                f.category,
                ChangeCategory::Configuration
                    | ChangeCategory::Infrastructure
                    | ChangeCategory::Scripts
            )
        }) {
            return "build";
        }
        if files.iter().all(|f| f.status == FileStatus::Added) {
            return "feat";
        }
        if changes.deletions > changes.insertions {
            return "refactor";
        }
        "chore"
    }

    /// Top-level directory shared by every changed file, if any.
    fn scope(changes: &CommitChanges) -> Option<String> {
        let mut dirs = changes
            .file_changes
            .iter()
            .map(|f| f.filename.split_once('/').map(|(dir, _)| dir));
        let first = dirs.next()??;
        if dirs.all(|d| d == Some(first)) {
            Some(first.to_string())
        } else {
            None
        }
    }
}

impl MessageSuggester for ConventionalMessageSuggester {
    fn suggest(&self, commit: &Commit) -> Result<String, LineageError> {
        let subject = commit.subject();
        if CONVENTIONAL_SUBJECT.is_match(subject) {
            return Ok(commit.message.clone());
        }

        let description = if subject.is_empty() {
            format!("update {} file(s)", commit.changes.file_changes.len())
        } else {
            let trimmed = subject.trim_end_matches('.');
            let mut chars = trimmed.chars();
            match chars.next() {
                Some(c) => c.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        };

        let kind = Self::commit_type(&commit.changes);
        let header = match Self::scope(&commit.changes) {
            Some(scope) => format!("{}({}): {}", kind, scope, description),
            None => format!("{}: {}", kind, description),
        };
        let rest = commit
            .message
            .find('\n')
            .map(|idx| &commit.message[idx..])
            .unwrap_or("\n");
        Ok(format!("{}{}", header, rest))
    }
}

/// Suggests caller-provided messages keyed by full or abbreviated commit hash.
#[derive(Debug, Clone, Default)]
pub struct FixedMessageSuggester {
    messages: HashMap<String, String>,
}

impl FixedMessageSuggester {
    pub fn new(messages: HashMap<String, String>) -> Self {
        FixedMessageSuggester { messages }
    }

    pub fn insert(&mut self, hash: &str, message: &str) {
        self.messages.insert(hash.to_string(), message.to_string());
    }
}

impl MessageSuggester for FixedMessageSuggester {
    fn suggest(&self, commit: &Commit) -> Result<String, LineageError> {
        if let Some(message) = self.messages.get(&commit.hash) {
            return Ok(message.clone());
        }
        let mut matches = self
            .messages
            .iter()
            .filter(|(key, _)| key.len() >= 4 && commit.hash.starts_with(key.as_str()));
        match (matches.next(), matches.next()) {
            (Some((_, message)), None) => Ok(message.clone()),
            (Some(_), Some(_)) => Err(LineageError::Generic(format!(
                "More than one replacement message matches commit {}",
                short_hash(&commit.hash)
            ))),
            (None, _) => Err(LineageError::NotFound(format!(
                "replacement message for commit {}",
                commit.hash
            ))),
        }
    }
}

/// Uniquely named backup branch and tag for a rewrite started at `now`.
pub fn backup_strategy(now: DateTime<Utc>) -> BackupStrategy {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let suffix = format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &uuid[..8]);
    BackupStrategy {
        branch_name: format!("backup/rewrite-{}", suffix),
        tag_name: format!("backup-rewrite-{}", suffix),
        created_at: now,
    }
}

pub struct RewritePlanner<'a> {
    gateway: &'a dyn GitGateway,
    config: &'a Config,
    logger: Logger,
    suggester: &'a dyn MessageSuggester,
    tokens: &'a dyn TokenAuthority,
}

impl<'a> RewritePlanner<'a> {
    pub fn new(
        gateway: &'a dyn GitGateway,
        config: &'a Config,
        logger: Logger,
        suggester: &'a dyn MessageSuggester,
        tokens: &'a dyn TokenAuthority,
    ) -> Self {
        RewritePlanner {
            gateway,
            config,
            logger,
            suggester,
            tokens,
        }
    }

    /// Build a plan to rewrite the messages of `commit_hashes`.
    ///
    /// Hashes may be abbreviated or any revision git understands; unknown ones fail the
    /// whole plan. An unsafe assessment does not fail planning, it makes execution refuse.
    pub fn create_rewrite_plan(&self, commit_hashes: &[String]) -> Result<RewritePlan, LineageError> {
        if commit_hashes.is_empty() {
            return Err(LineageError::Generic(
                "No commits given to rewrite".to_string(),
            ));
        }

        let mut resolved: Vec<String> = Vec::with_capacity(commit_hashes.len());
        for rev in commit_hashes {
            let full = self.gateway.resolve_commit(rev)?;
            if !resolved.contains(&full) {
                resolved.push(full);
            }
        }

        let diff = DiffParser::new(self.gateway, self.config, self.logger.clone());
        let mut targets = Vec::with_capacity(resolved.len());
        for hash in &resolved {
            let commit = diff.read_commit(hash)?;
            let proposed_message = self.suggester.suggest(&commit)?;
            if proposed_message == commit.message {
                self.logger.info(&format!(
                    "Suggested message for {} is unchanged",
                    short_hash(hash)
                ));
            }
            targets.push(RewriteTarget {
                hash: commit.hash,
                original_message: commit.message,
                proposed_message,
                timestamp: commit.timestamp,
            });
        }
        targets.sort_by_key(|t| t.timestamp);

        let safety_check = SafetyGate::new(self.gateway, self.config).perform_safety_checks(&resolved);
        if let Some(reason) = &safety_check.reason {
            self.logger
                .warn(&format!("Rewrite plan is not safe to execute: {}", reason));
        }

        let now = Utc::now();
        let impact = self.analyze_impact(&resolved);
        let (confirmation_token, expires_at) = self.tokens.issue(&resolved, now);

        Ok(RewritePlan {
            targets,
            safety_check,
            backup: backup_strategy(now),
            impact,
            confirmation_token,
            expires_at,
            created_at: now,
        })
    }

    fn analyze_impact(&self, hashes: &[String]) -> ImpactAnalysis {
        let current = match self.gateway.current_branch() {
            Ok(branch) => branch,
            Err(e) => {
                self.logger
                    .warn(&format!("Could not determine the current branch: {}", e));
                None
            }
        };

        let mut dependent: BTreeSet<String> = BTreeSet::new();
        for hash in hashes {
            match self.gateway.branches_containing(hash, BranchScope::Local) {
                Ok(branches) => dependent.extend(
                    branches
                        .into_iter()
                        .filter(|b| Some(b) != current.as_ref()),
                ),
                Err(e) => self.logger.warn(&format!(
                    "Could not list branches containing {}: {}",
                    short_hash(hash),
                    e
                )),
            }
        }

        ImpactAnalysis {
            commit_count: hashes.len(),
            affected_branches: current.into_iter().collect(),
            dependent_branches: dependent.into_iter().collect(),
        }
    }
}
