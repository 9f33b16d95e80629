use crate::config::Config;
use crate::git::{BranchScope, GitGateway};
use crate::rewrite::SafetyAssessment;
use crate::utils::short_hash;

/// Pre-mutation checks for a set of target commits.
pub struct SafetyGate<'a> {
    gateway: &'a dyn GitGateway,
    config: &'a Config,
}

#[derive(Default)]
struct Findings {
    blocking: Vec<String>,
    warnings: Vec<String>,
    recommendations: Vec<String>,
}

impl Findings {
    fn block(&mut self, reason: String) {
        self.blocking.push(reason);
    }

    fn warn(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    fn recommend(&mut self, recommendation: &str) {
        if !self.recommendations.iter().any(|r| r == recommendation) {
            self.recommendations.push(recommendation.to_string());
        }
    }

    fn into_assessment(self) -> SafetyAssessment {
        let mut blocking = self.blocking.into_iter();
        let reason = blocking.next();
        let mut warnings: Vec<String> = blocking.map(|b| format!("Also blocking: {}", b)).collect();
        warnings.extend(self.warnings);
        SafetyAssessment {
            safe: reason.is_none(),
            reason,
            warnings,
            recommendations: self.recommendations,
        }
    }
}

impl<'a> SafetyGate<'a> {
    pub fn new(gateway: &'a dyn GitGateway, config: &'a Config) -> Self {
        SafetyGate { gateway, config }
    }

    /// Run every check against `commit_hashes` and report the first blocking condition.
    ///
    /// Checks run in a fixed order and never short-circuit. A check that cannot be run
    /// counts as blocking.
    pub fn perform_safety_checks(&self, commit_hashes: &[String]) -> SafetyAssessment {
        let mut findings = Findings::default();

        match self.gateway.is_working_tree_clean() {
            Ok(true) => {}
            Ok(false) => {
                findings.block("Working tree has uncommitted changes to tracked files".to_string());
                findings.recommend("Commit or stash local changes before rewriting");
            }
            Err(e) => findings.block(format!("Could not check working tree status: {}", e)),
        }

        let current_branch = match self.gateway.current_branch() {
            Ok(Some(branch)) => {
                if self.config.is_protected_branch(&branch) {
                    findings.warn(format!("Current branch '{}' is a protected branch", branch));
                    findings.recommend("Rewrite on a feature branch instead of a shared one");
                }
                Some(branch)
            }
            Ok(None) => {
                findings.warn("HEAD is detached; the rewrite will move HEAD only".to_string());
                None
            }
            Err(e) => {
                findings.block(format!("Could not determine the current branch: {}", e));
                None
            }
        };

        for hash in commit_hashes {
            match self
                .gateway
                .branches_containing(hash, BranchScope::RemoteTracking)
            {
                Ok(remotes) if !remotes.is_empty() => {
                    findings.block(format!(
                        "Commit {} has already been pushed (contained in {})",
                        hash,
                        remotes.join(", ")
                    ));
                    findings.recommend("Only rewrite commits that exist solely in this clone");
                }
                Ok(_) => {}
                Err(e) => findings.block(format!(
                    "Could not check remote branches for commit {}: {}",
                    hash, e
                )),
            }
        }

        for hash in commit_hashes {
            match self.gateway.read_commit(hash) {
                Ok(raw) => {
                    if raw.parents.len() > 1 {
                        findings.warn(format!(
                            "Commit {} is a merge commit; only its message will change",
                            short_hash(hash)
                        ));
                    }
                    if raw.signed {
                        findings.warn(format!(
                            "Commit {} is signed; the rewritten commit will not carry the signature",
                            short_hash(hash)
                        ));
                    }
                }
                Err(e) => findings.block(format!(
                    "Could not read commit {} for the merge check: {}",
                    hash, e
                )),
            }
        }

        let threshold = self.config.blast_radius_threshold();
        for hash in commit_hashes {
            match self.gateway.is_ancestor(hash, "HEAD") {
                Ok(true) => match self.gateway.count_commits_between(hash, "HEAD") {
                    Ok(distance) if distance > threshold => {
                        findings.warn(format!(
                            "Commit {} is {} commits behind HEAD; rewriting it touches a wide blast radius",
                            short_hash(hash),
                            distance
                        ));
                        findings.recommend("Prefer rewriting recent commits");
                    }
                    Ok(_) => {}
                    Err(e) => findings.block(format!(
                        "Could not measure distance from commit {} to HEAD: {}",
                        hash, e
                    )),
                },
                Ok(false) => findings.block(format!(
                    "Commit {} is not an ancestor of HEAD and cannot be rewritten on this branch",
                    hash
                )),
                Err(e) => findings.block(format!(
                    "Could not check ancestry of commit {}: {}",
                    hash, e
                )),
            }
        }

        for hash in commit_hashes {
            match self.gateway.branches_containing(hash, BranchScope::Local) {
                Ok(branches) => {
                    let dependents: Vec<String> = branches
                        .into_iter()
                        .filter(|b| Some(b) != current_branch.as_ref())
                        .collect();
                    if !dependents.is_empty() {
                        findings.warn(format!(
                            "Commit {} is also on {}; those branches keep the original commit",
                            short_hash(hash),
                            dependents.join(", ")
                        ));
                        findings.recommend("Rebase dependent branches onto the rewritten history");
                    }
                }
                Err(e) => findings.block(format!(
                    "Could not check dependent branches for commit {}: {}",
                    hash, e
                )),
            }
        }

        findings.into_assessment()
    }
}
