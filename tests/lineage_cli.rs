mod repos;

use git_lineage::models::{Commit, ContributorRole, FeatureBranch, FileStatus};
use git_lineage::rewrite::{RewritePlan, RewriteResult, RewriteState, SafetyAssessment};
use repos::test_repo::{TestRepo, wait_for_fresh_minute};

/// main: initial; feature/payments: two commits by Alice (one co-authored); merged by Maintainer.
fn merged_feature_repo() -> (TestRepo, String) {
    let repo = TestRepo::new();
    repo.commit_file("README.md", "# Shop\n", "initial commit");

    let tmp = repo.tmp();
    tmp.create_branch("feature/payments").unwrap();
    tmp.checkout("feature/payments").unwrap();

    tmp.write_file("src/payments.rs", "pub fn pay() {}\n").unwrap();
    let when = tmp.tick();
    tmp.commit_as("add payment entry point", "Alice", "alice@example.com", when)
        .unwrap();

    tmp.write_file("config/payments.yaml", "timeout: 30\nretries: 2\n")
        .unwrap();
    let when = tmp.tick();
    tmp.commit_as(
        "configure payment retries\n\nCo-authored-by: Bob <bob@example.com>",
        "Alice",
        "alice@example.com",
        when,
    )
    .unwrap();

    tmp.checkout("main").unwrap();
    let merge = tmp
        .merge_no_ff(
            "feature/payments",
            "Merge pull request #42 from acme/feature/payments\n\nFixes #7",
            "Maintainer",
            "maint@example.com",
        )
        .unwrap();
    (repo, merge)
}

#[test]
fn test_branches_json_reconstructs_merged_feature() {
    let (repo, merge) = merged_feature_repo();

    let output = repo
        .git_lineage(&["branches", "--since-days", "90", "--json"])
        .expect("branches should succeed");
    let branches: Vec<FeatureBranch> = serde_json::from_str(&output).unwrap();

    assert_eq!(branches.len(), 1);
    let branch = &branches[0];
    assert_eq!(branch.name, "feature/payments");
    assert_eq!(branch.merge_commit.hash, merge);
    assert_eq!(branch.commits.len(), 2);
    assert_eq!(branch.commits[0].subject(), "add payment entry point");

    let roles: Vec<(&str, ContributorRole)> = branch
        .contributors
        .iter()
        .map(|c| (c.name.as_str(), c.role))
        .collect();
    assert_eq!(
        roles,
        vec![
            ("Alice", ContributorRole::Author),
            ("Bob", ContributorRole::CoAuthor),
            ("Maintainer", ContributorRole::Merger),
        ]
    );

    let pr = branch.pull_request.as_ref().unwrap();
    assert_eq!(pr.number, Some(42));
    assert_eq!(pr.referenced_issues, vec![7]);
}

#[test]
fn test_branches_skips_processed_merges() {
    let (repo, merge) = merged_feature_repo();

    let output = repo
        .git_lineage(&[
            "branches",
            "--since-days",
            "90",
            "--processed",
            &merge[..10],
            "--json",
        ])
        .expect("branches should succeed");
    let branches: Vec<FeatureBranch> = serde_json::from_str(&output).unwrap();
    assert!(branches.is_empty());
}

#[test]
fn test_changes_json_describes_one_commit() {
    let (repo, _) = merged_feature_repo();
    let config_commit = repo.git(&["rev-parse", "feature/payments"]).unwrap();

    let output = repo
        .git_lineage(&["changes", config_commit.trim(), "--json"])
        .expect("changes should succeed");
    let commit: Commit = serde_json::from_str(&output).unwrap();

    assert_eq!(commit.author_name, "Alice");
    assert_eq!(commit.changes.files, vec!["config/payments.yaml"]);
    assert_eq!(commit.changes.file_changes[0].status, FileStatus::Added);
    assert_eq!(commit.changes.insertions, 2);
    assert!(commit.changes.summary.starts_with("1 file changed (+2/-0)"));
    assert!(commit.changes.integrity_warnings.is_empty());
}

#[test]
fn test_changes_of_unknown_commit_fails() {
    let repo = TestRepo::new();
    repo.commit_file("a.txt", "a\n", "initial");

    let err = repo
        .git_lineage(&["changes", "0123456789abcdef0123456789abcdef01234567"])
        .expect_err("unknown commit should fail");
    assert!(err.contains("Error:"), "stderr was: {}", err);
}

#[test]
fn test_safety_exit_code_follows_assessment() {
    let repo = TestRepo::new();
    repo.commit_file("a.txt", "a\n", "initial");
    repo.tmp().create_branch("topic").unwrap();
    repo.tmp().checkout("topic").unwrap();
    let local = repo.commit_file("b.txt", "b\n", "local work");

    let output = repo
        .git_lineage(&["safety", &local, "--json"])
        .expect("local commit should be safe");
    let assessment: SafetyAssessment = serde_json::from_str(&output).unwrap();
    assert!(assessment.safe);

    repo.tmp().set_remote_ref("origin/topic", &local).unwrap();
    repo.git_lineage(&["safety", &local])
        .expect_err("pushed commit should be unsafe");
}

#[test]
fn test_plan_rewrite_and_rollback_round_trip() {
    let repo = TestRepo::new();
    repo.commit_file("a.txt", "a\n", "initial");
    repo.tmp().create_branch("topic").unwrap();
    repo.tmp().checkout("topic").unwrap();
    let first = repo.commit_file("b.txt", "b\n", "wip");
    let second = repo.commit_file("c.txt", "c\n", "more wip");
    let plan_path = repo.path().join("..").join(format!(
        "{}-plan.json",
        repo.path().file_name().unwrap().to_string_lossy()
    ));
    let plan_arg = plan_path.to_string_lossy().to_string();

    wait_for_fresh_minute();
    let message_arg = format!("{}=feat: add b", &first[..12]);
    repo.git_lineage(&["plan", &first, "--message", &message_arg, "--output", &plan_arg])
        .expect("plan should succeed");
    let plan: RewritePlan =
        serde_json::from_str(&std::fs::read_to_string(&plan_path).unwrap()).unwrap();
    assert!(plan.safety_check.safe);
    assert_eq!(plan.targets[0].proposed_message, "feat: add b");

    let output = repo
        .git_lineage(&[
            "rewrite",
            "--plan",
            &plan_arg,
            "--token",
            &plan.confirmation_token,
        ])
        .expect("rewrite should succeed");
    let result: RewriteResult = serde_json::from_str(&output).unwrap();
    assert_eq!(result.state, RewriteState::Completed);

    let new_first = result.commits[0].new_hash.clone().unwrap();
    assert_ne!(new_first, first);
    assert_eq!(repo.message_of(&new_first).trim(), "feat: add b");
    let head = repo.head();
    assert_ne!(head, second);
    assert_eq!(repo.message_of(&head).trim(), "more wip");
    let parent = repo.git(&["rev-parse", "HEAD~1"]).unwrap();
    assert_eq!(parent.trim(), new_first);

    let output = repo
        .git_lineage(&["rollback", &plan.backup.branch_name])
        .expect("rollback should succeed");
    let rolled_back: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(rolled_back["state"], "rolled-back");
    assert_eq!(rolled_back["head"], second.as_str());
    assert_eq!(repo.head(), second);

    let _ = std::fs::remove_file(&plan_path);
}

#[test]
fn test_plan_message_keyed_by_revision_name() {
    let repo = TestRepo::new();
    repo.commit_file("a.txt", "a\n", "initial");
    repo.tmp().create_branch("topic").unwrap();
    repo.tmp().checkout("topic").unwrap();
    repo.commit_file("b.txt", "b\n", "wip");

    let output = repo
        .git_lineage(&["plan", "HEAD", "--message", "HEAD=feat: my words"])
        .expect("plan should succeed");
    let plan: RewritePlan = serde_json::from_str(&output).unwrap();
    assert_eq!(plan.targets[0].proposed_message, "feat: my words");

    let err = repo
        .git_lineage(&["plan", "HEAD", "--message", "HEAD~1=feat: not planned"])
        .expect_err("a message for an unplanned commit should fail");
    assert!(err.contains("not a planned commit"), "stderr was: {}", err);
}

#[test]
fn test_rewrite_rejects_wrong_token() {
    let repo = TestRepo::new();
    repo.commit_file("a.txt", "a\n", "initial");
    repo.tmp().create_branch("topic").unwrap();
    repo.tmp().checkout("topic").unwrap();
    let target = repo.commit_file("b.txt", "b\n", "wip");
    let plan_path = repo.path().join("..").join(format!(
        "{}-plan.json",
        repo.path().file_name().unwrap().to_string_lossy()
    ));
    let plan_arg = plan_path.to_string_lossy().to_string();

    repo.git_lineage(&["plan", &target, "--output", &plan_arg])
        .expect("plan should succeed");
    let err = repo
        .git_lineage(&["rewrite", "--plan", &plan_arg, "--token", "0000000000000000"])
        .expect_err("wrong token should be refused");
    assert!(err.contains("confirmation token"), "stderr was: {}", err);
    assert_eq!(repo.head(), target);

    let _ = std::fs::remove_file(&plan_path);
}

#[test]
fn test_unknown_command_fails() {
    let repo = TestRepo::new();
    let err = repo
        .git_lineage(&["frobnicate"])
        .expect_err("unknown command should fail");
    assert!(err.contains("Unknown git-lineage command: frobnicate"));
}
