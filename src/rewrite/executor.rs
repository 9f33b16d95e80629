use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;

use crate::config::Config;
use crate::error::LineageError;
use crate::git::lock::{DEFAULT_LOCK_WAIT, RepoLock};
use crate::git::{GitGateway, Repository};
use crate::logging::Logger;
use crate::rewrite::safety::SafetyGate;
use crate::rewrite::token::TokenAuthority;
use crate::rewrite::{CommitRewrite, RewritePlan, RewriteResult, RewriteState, RewriteTarget};
use crate::utils::short_hash;

/// Applies rewrite plans and restores backups. Holds the repository lock while mutating.
pub struct RewriteExecutor<'a> {
    gateway: &'a dyn GitGateway,
    lock_path: PathBuf,
    config: &'a Config,
    logger: Logger,
    tokens: &'a dyn TokenAuthority,
}

impl<'a> RewriteExecutor<'a> {
    pub fn new(
        gateway: &'a dyn GitGateway,
        lock_path: PathBuf,
        config: &'a Config,
        logger: Logger,
        tokens: &'a dyn TokenAuthority,
    ) -> Self {
        RewriteExecutor {
            gateway,
            lock_path,
            config,
            logger,
            tokens,
        }
    }

    pub fn for_repository(
        repo: &'a Repository,
        config: &'a Config,
        logger: Logger,
        tokens: &'a dyn TokenAuthority,
    ) -> Self {
        Self::new(repo, repo.lock_path(), config, logger, tokens)
    }

    /// Rewrite the messages of every target in `plan`.
    ///
    /// Refuses with `UnsafeOperation` when `supplied_token` does not validate, when the plan
    /// was assessed unsafe, or when the repository no longer passes the safety checks.
    /// Otherwise backs up HEAD and rewrites targets oldest-first; a failed commit is recorded
    /// in the result and the batch carries on.
    pub fn rewrite_commit_messages(
        &self,
        plan: &RewritePlan,
        supplied_token: &str,
    ) -> Result<RewriteResult, LineageError> {
        let hashes = plan.target_hashes();
        if !self.tokens.validate(supplied_token, &hashes, Utc::now()) {
            return Err(LineageError::UnsafeOperation(
                "confirmation token is invalid or has expired; create a new plan".to_string(),
            ));
        }
        if !plan.safety_check.safe {
            return Err(LineageError::UnsafeOperation(
                plan.safety_check
                    .reason
                    .clone()
                    .unwrap_or_else(|| "plan was assessed as unsafe".to_string()),
            ));
        }

        let _lock = RepoLock::acquire(&self.lock_path, DEFAULT_LOCK_WAIT)?;

        // The repository may have moved on since planning
        let recheck = SafetyGate::new(self.gateway, self.config).perform_safety_checks(&hashes);
        if !recheck.safe {
            return Err(LineageError::UnsafeOperation(format!(
                "repository state changed since planning: {}",
                recheck.reason.unwrap_or_default()
            )));
        }

        let head = self.gateway.head_commit()?;
        let branch = self.gateway.current_branch()?;
        self.gateway.create_branch(&plan.backup.branch_name, &head)?;
        self.gateway.create_tag(&plan.backup.tag_name, &head)?;
        self.logger.info(&format!(
            "Backed up {} to branch {} and tag {}",
            short_hash(&head),
            plan.backup.branch_name,
            plan.backup.tag_name
        ));

        let mut warnings: Vec<String> = plan.safety_check.warnings.clone();
        warnings.push(format!(
            "Backup kept at branch '{}' and tag '{}'; delete them once the rewrite is verified",
            plan.backup.branch_name, plan.backup.tag_name
        ));

        let ordered = self.order_oldest_first(&plan.targets);

        // Original target hash -> its hash in the current history
        let mut current: HashMap<String, String> = ordered
            .iter()
            .map(|t| (t.hash.clone(), t.hash.clone()))
            .collect();
        let mut commits: Vec<CommitRewrite> = Vec::with_capacity(ordered.len());

        for target in &ordered {
            let live_hash = current
                .get(&target.hash)
                .cloned()
                .unwrap_or_else(|| target.hash.clone());
            self.logger.debug(&format!(
                "Rewriting {} (now {})",
                short_hash(&target.hash),
                short_hash(&live_hash)
            ));

            match self.rewrite_one(&live_hash, &target.proposed_message, branch.as_deref()) {
                Ok(replaced) => {
                    for live in current.values_mut() {
                        if let Some(new_hash) = replaced.get(live.as_str()) {
                            *live = new_hash.clone();
                        }
                    }
                    commits.push(CommitRewrite {
                        original_hash: target.hash.clone(),
                        new_hash: replaced.get(&live_hash).cloned(),
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    self.logger.warn(&format!(
                        "Failed to rewrite {}: {}",
                        short_hash(&target.hash),
                        e
                    ));
                    commits.push(CommitRewrite {
                        original_hash: target.hash.clone(),
                        new_hash: None,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        // A later replay can move an earlier target when committer dates disagree with topology
        for record in commits.iter_mut().filter(|c| c.success) {
            record.new_hash = current.get(&record.original_hash).cloned();
        }

        let failed = commits.iter().filter(|c| !c.success).count();
        let state = if failed == 0 {
            RewriteState::Completed
        } else {
            RewriteState::PartiallyFailed
        };
        if failed > 0 {
            warnings.push(format!(
                "{} of {} commit(s) were not rewritten; roll back with the backup if needed",
                failed,
                commits.len()
            ));
        }

        Ok(RewriteResult {
            commits,
            backup: plan.backup.clone(),
            warnings,
            state,
        })
    }

    /// Targets sorted by their committer timestamp as currently stored, oldest first.
    fn order_oldest_first(&self, targets: &[RewriteTarget]) -> Vec<RewriteTarget> {
        let mut keyed: Vec<(i64, RewriteTarget)> = targets
            .iter()
            .map(|t| {
                let seconds = self
                    .gateway
                    .read_commit(&t.hash)
                    .map(|raw| raw.committer.seconds)
                    .unwrap_or_else(|_| t.timestamp.timestamp());
                (seconds, t.clone())
            })
            .collect();
        keyed.sort_by_key(|(seconds, _)| *seconds);
        keyed.into_iter().map(|(_, t)| t).collect()
    }

    /// Replace `target`'s message and replay its descendants up to HEAD.
    ///
    /// Returns every replaced hash mapped to its replacement.
    fn rewrite_one(
        &self,
        target: &str,
        message: &str,
        branch: Option<&str>,
    ) -> Result<HashMap<String, String>, LineageError> {
        let head = self.gateway.head_commit()?;
        if !self.gateway.is_ancestor(target, &head)? {
            return Err(LineageError::UnsafeOperation(format!(
                "commit {} is no longer an ancestor of HEAD",
                target
            )));
        }

        let raw = self.gateway.read_commit(target)?;
        let replacement = self.gateway.commit_tree(
            &raw.tree,
            &raw.parents,
            message,
            &raw.author,
            &raw.committer,
        )?;

        let mut replaced: HashMap<String, String> = HashMap::new();
        replaced.insert(raw.hash.clone(), replacement);

        for descendant in self.gateway.ancestry_path(&raw.hash, &head)? {
            let original = self.gateway.read_commit(&descendant)?;
            let parents: Vec<String> = original
                .parents
                .iter()
                .map(|p| replaced.get(p).cloned().unwrap_or_else(|| p.clone()))
                .collect();
            let replayed = self.gateway.commit_tree(
                &original.tree,
                &parents,
                &original.message,
                &original.author,
                &original.committer,
            )?;
            replaced.insert(original.hash, replayed);
        }

        let new_head = replaced.get(&head).cloned().ok_or_else(|| {
            LineageError::Generic(format!(
                "replay of {} did not reach HEAD {}",
                short_hash(target),
                short_hash(&head)
            ))
        })?;
        let refname = match branch {
            Some(name) => format!("refs/heads/{}", name),
            None => "HEAD".to_string(),
        };
        self.gateway.update_ref(
            &refname,
            &new_head,
            &head,
            &format!("git-lineage: reword {}", short_hash(target)),
        )?;
        Ok(replaced)
    }

    /// Hard-reset the current branch to `backup_ref` (branch, tag or full ref name).
    ///
    /// Returns the commit HEAD now points at.
    pub fn rollback_to_backup(&self, backup_ref: &str) -> Result<String, LineageError> {
        let candidates = [
            backup_ref.to_string(),
            format!("refs/heads/{}", backup_ref),
            format!("refs/tags/{}", backup_ref),
        ];
        let Some(refname) = candidates.iter().find(|r| self.gateway.ref_exists(r)) else {
            return Err(LineageError::NotFound(format!(
                "backup reference {}",
                backup_ref
            )));
        };

        let _lock = RepoLock::acquire(&self.lock_path, DEFAULT_LOCK_WAIT)?;
        let target = self.gateway.resolve_commit(refname)?;
        self.gateway.reset_hard(&target)?;
        self.logger
            .info(&format!("Rolled back to {} ({})", backup_ref, short_hash(&target)));
        Ok(target)
    }
}
