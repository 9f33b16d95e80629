//! Human-readable summaries of a commit's file changes.
//!
//! Files are classified with a first-match-wins table over lowercase paths, and the full
//! diff text is scanned for a small set of keyword-triggered insights.

use std::collections::BTreeMap;

use crate::models::{ChangeCategory, FileChange, FileStatus};

pub const MAX_INSIGHTS: usize = 3;

type PathPredicate = fn(&str) -> bool;

/// Classification rules in evaluation order. The first matching rule wins.
pub const CATEGORY_RULES: &[(ChangeCategory, PathPredicate)] = &[
    (ChangeCategory::Configuration, is_configuration),
    (ChangeCategory::Documentation, is_documentation),
    (ChangeCategory::Infrastructure, is_infrastructure),
    (ChangeCategory::Scripts, is_script),
    (ChangeCategory::Binaries, is_binary_asset),
    (ChangeCategory::Templates, is_template),
    (ChangeCategory::Security, is_security),
];

/// Insight phrases in reporting order, each with the keywords that trigger it.
pub const INSIGHT_RULES: &[(&str, &[&str])] = &[
    (
        "Version bump",
        &["version =", "version:", "\"version\":", "bump version"],
    ),
    (
        "Credential change",
        &[
            "password",
            "secret",
            "api_key",
            "apikey",
            "access_token",
            "credential",
            "private_key",
        ],
    ),
    (
        "Network configuration change",
        &[
            "port:",
            "port =",
            "host:",
            "hostname",
            "firewall",
            "proxy",
            "ip_address",
            "dns",
        ],
    ),
    (
        "Database change",
        &["database", "migration", "schema", "connection_string", "jdbc:"],
    ),
    (
        "Dependency update",
        &[
            "dependencies",
            "requirements.txt",
            "package.json",
            "cargo.lock",
            "go.mod",
            "pom.xml",
        ],
    ),
    (
        "Feature flag change",
        &["feature_flag", "feature flag", "featureflag", "feature-flag"],
    ),
    ("Logging change", &["log_level", "loglevel", "logging"]),
];

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => extensions.contains(&ext),
        _ => false,
    }
}

fn contains_any(path: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| path.contains(needle))
}

fn is_configuration(path: &str) -> bool {
    has_extension(
        path,
        &[
            "json",
            "yaml",
            "yml",
            "toml",
            "ini",
            "cfg",
            "conf",
            "config",
            "properties",
            "env",
        ],
    ) || contains_any(path, &[".env", "config"])
}

fn is_documentation(path: &str) -> bool {
    has_extension(path, &["md", "rst", "txt", "adoc"])
        || contains_any(path, &["docs/", "readme", "changelog", "license"])
}

fn is_infrastructure(path: &str) -> bool {
    has_extension(path, &["tf", "tfvars", "hcl"])
        || contains_any(
            path,
            &[
                "dockerfile",
                "docker-compose",
                "terraform",
                "k8s/",
                "kubernetes",
                "helm",
                "ansible",
                ".github/workflows",
                "jenkinsfile",
                ".gitlab-ci",
                "vagrantfile",
            ],
        )
}

fn is_script(path: &str) -> bool {
    has_extension(path, &["sh", "bash", "zsh", "ps1", "bat", "cmd"]) || path.contains("scripts/")
}

fn is_binary_asset(path: &str) -> bool {
    has_extension(
        path,
        &[
            "exe", "dll", "so", "dylib", "bin", "jar", "war", "zip", "tar", "gz", "tgz", "png",
            "jpg", "jpeg", "gif", "ico", "pdf", "woff", "woff2",
        ],
    )
}

fn is_template(path: &str) -> bool {
    has_extension(
        path,
        &[
            "j2", "jinja", "jinja2", "tmpl", "tpl", "hbs", "mustache", "erb", "ejs",
        ],
    ) || path.contains("templates/")
}

fn is_security(path: &str) -> bool {
    has_extension(path, &["pem", "key", "crt", "cer", "p12", "pfx", "jks"])
        || contains_any(
            path,
            &[
                "secret",
                "security",
                "credential",
                "auth",
                "ssh",
                "vault",
                "policy",
            ],
        )
}

/// Category of a changed path. Matching is case-insensitive.
pub fn classify_file(path: &str) -> ChangeCategory {
    let lower = path.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(_, matches)| matches(&lower))
        .map(|(category, _)| *category)
        .unwrap_or(ChangeCategory::Other)
}

/// Insight phrases triggered by `diff_text`, in table order, at most [`MAX_INSIGHTS`].
pub fn detect_insights(diff_text: &str) -> Vec<String> {
    let lower = diff_text.to_lowercase();
    INSIGHT_RULES
        .iter()
        .filter(|(_, keywords)| contains_any(&lower, keywords))
        .take(MAX_INSIGHTS)
        .map(|(phrase, _)| phrase.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSummary {
    pub text: String,
    pub insights: Vec<String>,
}

/// Build the summary sentence for a set of file changes.
///
/// The text lists file and line totals, per-operation counts, per-category counts in
/// taxonomy order and any insights found in `diff_text`.
pub fn generate_change_summary(file_changes: &[FileChange], diff_text: &str) -> ChangeSummary {
    let insights = detect_insights(diff_text);
    if file_changes.is_empty() {
        return ChangeSummary {
            text: "No file changes".to_string(),
            insights,
        };
    }

    let insertions: u64 = file_changes.iter().map(|f| f.insertions).sum();
    let deletions: u64 = file_changes.iter().map(|f| f.deletions).sum();

    let operations: Vec<String> = [
        FileStatus::Added,
        FileStatus::Modified,
        FileStatus::Deleted,
        FileStatus::Renamed,
    ]
    .iter()
    .filter_map(|status| {
        let count = file_changes.iter().filter(|f| f.status == *status).count();
        (count > 0).then(|| format!("{} {}", count, status.as_str()))
    })
    .collect();

    let mut categories: BTreeMap<ChangeCategory, usize> = BTreeMap::new();
    for change in file_changes {
        *categories.entry(change.category).or_default() += 1;
    }
    let areas: Vec<String> = categories
        .iter()
        .map(|(category, count)| format!("{} {}", count, category.as_str()))
        .collect();

    let file_word = if file_changes.len() == 1 {
        "file"
    } else {
        "files"
    };
    let mut text = format!(
        "{} {} changed (+{}/-{}): {}. Areas: {}.",
        file_changes.len(),
        file_word,
        insertions,
        deletions,
        operations.join(", "),
        areas.join(", ")
    );
    if !insights.is_empty() {
        text.push_str(&format!(" Notable: {}.", insights.join("; ")));
    }

    ChangeSummary { text, insights }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use rstest::rstest;

    fn change(filename: &str, status: FileStatus, insertions: u64, deletions: u64) -> FileChange {
        FileChange {
            filename: filename.to_string(),
            previous_filename: None,
            status,
            insertions,
            deletions,
            binary: false,
            category: classify_file(filename),
            patch: None,
        }
    }

    #[rstest]
    #[case("config/app.yaml", ChangeCategory::Configuration)]
    #[case("README.md", ChangeCategory::Documentation)]
    #[case("docs/guide.html", ChangeCategory::Documentation)]
    #[case("Dockerfile", ChangeCategory::Infrastructure)]
    #[case("deploy/main.tf", ChangeCategory::Infrastructure)]
    #[case("scripts/release.py", ChangeCategory::Scripts)]
    #[case("build.sh", ChangeCategory::Scripts)]
    #[case("assets/logo.PNG", ChangeCategory::Binaries)]
    #[case("views/index.hbs", ChangeCategory::Templates)]
    #[case("certs/server.pem", ChangeCategory::Security)]
    #[case("src/auth/session.rs", ChangeCategory::Security)]
    #[case("src/main.rs", ChangeCategory::Other)]
    fn test_classify_file(#[case] path: &str, #[case] expected: ChangeCategory) {
        assert_eq!(classify_file(path), expected);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // Both a config file (yml) and infrastructure (docker-compose)
        assert_eq!(
            classify_file("docker-compose.yml"),
            ChangeCategory::Configuration
        );
        // Both a script directory and a template extension
        assert_eq!(
            classify_file("scripts/render.j2"),
            ChangeCategory::Scripts
        );
    }

    #[test]
    fn test_insights_are_capped_and_ordered() {
        let diff = "+version = \"1.2.0\"\n+password: hunter2\n+proxy: corp\n+database: main\n+logging: debug\n";
        assert_eq!(
            detect_insights(diff),
            vec![
                "Version bump".to_string(),
                "Credential change".to_string(),
                "Network configuration change".to_string(),
            ]
        );
    }

    #[test]
    fn test_insights_empty_for_plain_diff() {
        assert!(detect_insights("+fn main() {}\n").is_empty());
    }

    #[test]
    fn test_empty_change_set() {
        let summary = generate_change_summary(&[], "");
        assert_eq!(summary.text, "No file changes");
        assert!(summary.insights.is_empty());
    }

    #[test]
    fn test_summary_text() {
        let changes = vec![
            change("src/lib.rs", FileStatus::Modified, 10, 2),
            change("README.md", FileStatus::Added, 5, 0),
            change("config/app.yaml", FileStatus::Modified, 1, 1),
        ];
        let summary = generate_change_summary(&changes, "+log_level: debug\n");
        assert_snapshot!(
            summary.text,
            @"3 files changed (+16/-3): 1 added, 2 modified. Areas: 1 configuration, 1 documentation, 1 other. Notable: Logging change."
        );
    }

    #[test]
    fn test_single_file_wording() {
        let changes = vec![change("old.txt", FileStatus::Deleted, 0, 4)];
        let summary = generate_change_summary(&changes, "");
        assert_eq!(
            summary.text,
            "1 file changed (+0/-4): 1 deleted. Areas: 1 documentation."
        );
    }
}
