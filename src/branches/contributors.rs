//! Per-branch contributor attribution.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Commit, Contributor, ContributorRole};

static CO_AUTHOR_TRAILER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*co-authored-by:\s*(.+?)\s*<([^>]+)>\s*$").expect("co-author pattern")
});

/// `(name, email)` pairs from `Co-authored-by:` trailers, in message order.
pub fn co_authors(message: &str) -> Vec<(String, String)> {
    CO_AUTHOR_TRAILER
        .captures_iter(message)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().trim();
            let email = caps.get(2)?.as_str().trim();
            (!name.is_empty() && !email.is_empty()).then(|| (name.to_string(), email.to_string()))
        })
        .collect()
}

fn blank(name: &str, email: &str, role: ContributorRole) -> Contributor {
    Contributor {
        name: name.to_string(),
        email: email.to_string(),
        commit_count: 0,
        lines_added: 0,
        lines_removed: 0,
        role,
    }
}

/// Contributors to a branch: commit authors, `Co-authored-by` trailers and the merger.
///
/// Identities are keyed by exact `(name, email)`. A merger or co-author who also
/// authored a commit becomes an author; nobody is ever demoted. Authors come first,
/// then higher commit counts, then more lines touched, then name and email.
pub fn extract_contributors(commits: &[Commit], merge_commit: &Commit) -> Vec<Contributor> {
    let mut by_identity: HashMap<(String, String), Contributor> = HashMap::new();

    by_identity.insert(
        (
            merge_commit.author_name.clone(),
            merge_commit.author_email.clone(),
        ),
        blank(
            &merge_commit.author_name,
            &merge_commit.author_email,
            ContributorRole::Merger,
        ),
    );

    for commit in commits {
        let entry = by_identity
            .entry((commit.author_name.clone(), commit.author_email.clone()))
            .or_insert_with(|| {
                blank(
                    &commit.author_name,
                    &commit.author_email,
                    ContributorRole::Author,
                )
            });
        entry.role = ContributorRole::Author;
        entry.commit_count += 1;
        entry.lines_added += commit.changes.insertions;
        entry.lines_removed += commit.changes.deletions;

        for (name, email) in co_authors(&commit.message) {
            by_identity
                .entry((name.clone(), email.clone()))
                .or_insert_with(|| blank(&name, &email, ContributorRole::CoAuthor));
        }
    }

    let mut contributors: Vec<Contributor> = by_identity.into_values().collect();
    contributors.sort_by(|a, b| {
        let a_author = a.role == ContributorRole::Author;
        let b_author = b.role == ContributorRole::Author;
        b_author
            .cmp(&a_author)
            .then(b.commit_count.cmp(&a.commit_count))
            .then((b.lines_added + b.lines_removed).cmp(&(a.lines_added + a.lines_removed)))
            .then(a.name.cmp(&b.name))
            .then(a.email.cmp(&b.email))
    });
    contributors
}
