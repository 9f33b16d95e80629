//! Best-effort parsing of merge commit messages.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::PullRequestInfo;

/// Source-branch patterns, tried in order. The first capture group is the branch name.
static BRANCH_NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Merge branch '([^']+)'",
        r#"Merge branch "([^"]+)""#,
        r"Merge branch (\S+)",
        r"Merge pull request #\d+ from [^/\s]+/(\S+)",
        r"Merge remote-tracking branch '[^/']+/([^']+)'",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("branch name pattern"))
    .collect()
});

static MERGE_REQUEST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"See merge request [\w.\-/]+!(\d+)").expect("mr pattern"));
static PULL_REQUEST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Merge pull request #(\d+)").expect("pr pattern"));
static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(#(\d+)\)\s*$").expect("trailing number pattern"));
static BRANCH_INTO_BRANCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Merge branch '([^']+)' into '([^']+)'").expect("into pattern")
});
static FROM_OWNER_BRANCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"from [^/\s]+/(\S+)").expect("from pattern"));
static ISSUE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?)\s+#(\d+)").expect("issue pattern")
});

/// Name of the branch a merge commit brought in, if the message says.
pub fn extract_branch_name(merge_message: &str) -> Option<String> {
    BRANCH_NAME_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(merge_message)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// False for names that contain any integration-branch marker (`develop`, `master`, ...).
pub fn is_feature_branch_name(name: &str, integration_markers: &[String]) -> bool {
    !integration_markers
        .iter()
        .any(|marker| name.contains(marker.as_str()))
}

/// The branch name of a merge that should be reconstructed as a feature branch.
pub fn accepted_branch_name(merge_message: &str, integration_markers: &[String]) -> Option<String> {
    extract_branch_name(merge_message).filter(|name| is_feature_branch_name(name, integration_markers))
}

/// Pull/merge request number, source/target branches and referenced issues.
///
/// Returns `None` when the message mentions none of them.
pub fn extract_pull_request_info(message: &str) -> Option<PullRequestInfo> {
    let subject = message.lines().next().unwrap_or("");
    let number = MERGE_REQUEST_NUMBER
        .captures(message)
        .or_else(|| PULL_REQUEST_NUMBER.captures(message))
        .or_else(|| TRAILING_NUMBER.captures(subject))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok());

    let (source_branch, target_branch) = if let Some(caps) = BRANCH_INTO_BRANCH.captures(message) {
        (
            caps.get(1).map(|m| m.as_str().to_string()),
            caps.get(2).map(|m| m.as_str().to_string()),
        )
    } else {
        (
            FROM_OWNER_BRANCH
                .captures(message)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string()),
            None,
        )
    };

    let mut referenced_issues: Vec<u64> = Vec::new();
    for caps in ISSUE_REFERENCE.captures_iter(message) {
        if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok())
            && !referenced_issues.contains(&n)
        {
            referenced_issues.push(n);
        }
    }

    let info = PullRequestInfo {
        number,
        source_branch,
        target_branch,
        referenced_issues,
    };
    if info == PullRequestInfo::default() {
        None
    } else {
        Some(info)
    }
}
