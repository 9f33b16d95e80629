//! Per-commit change extraction.
//!
//! `git diff-tree --numstat` and `--name-status` are requested with `-z` and joined by
//! destination filename, so rename and copy lines never shift the pairing between the two
//! listings. Any disagreement between them is reported as an integrity warning instead of
//! failing the commit.

pub mod summary;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::LineageError;
use crate::git::GitGateway;
use crate::logging::Logger;
use crate::models::{Commit, CommitChanges, FileChange, FileStatus};
use crate::utils::{short_hash, truncate_chars, unescape_git_path};

pub use summary::{ChangeSummary, classify_file, detect_insights, generate_change_summary};

pub const PATCH_TRUNCATION_MARKER: &str = "\n... [patch truncated]";

/// One record of `--numstat -z` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumstatEntry {
    pub path: String,
    pub previous_path: Option<String>,
    pub insertions: u64,
    pub deletions: u64,
    pub binary: bool,
}

/// One record of `--name-status -z` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: String,
    pub previous_path: Option<String>,
    /// Status letter with any similarity score stripped (`R100` -> `R`)
    pub letter: char,
}

fn nul_fields(raw: &[u8]) -> Vec<String> {
    raw.split(|b| *b == 0)
        .map(|field| {
            String::from_utf8_lossy(field)
                .trim_start_matches('\n')
                .to_string()
        })
        .collect()
}

/// Parse `git diff-tree --numstat -z` output.
///
/// Ordinary records are `ins\tdel\tpath\0`. Renames and copies leave the path empty and
/// follow with `old\0new\0`. Binary files report `-` for both counts.
pub fn parse_numstat_z(raw: &[u8]) -> Result<Vec<NumstatEntry>, LineageError> {
    let mut fields = nul_fields(raw).into_iter();
    let mut entries = Vec::new();

    while let Some(record) = fields.next() {
        if record.is_empty() {
            continue;
        }
        let mut parts = record.splitn(3, '\t');
        let (Some(ins), Some(del), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(LineageError::Generic(format!(
                "Malformed numstat record: {:?}",
                record
            )));
        };

        let (path, previous_path) = if path.is_empty() {
            let old = fields.next().unwrap_or_default();
            let new = fields.next().unwrap_or_default();
            if old.is_empty() || new.is_empty() {
                return Err(LineageError::Generic(format!(
                    "Truncated numstat rename record: {:?}",
                    record
                )));
            }
            (new, Some(old))
        } else {
            (path.to_string(), None)
        };

        let binary = ins == "-" && del == "-";
        let parse_count = |value: &str| -> Result<u64, LineageError> {
            if value == "-" {
                return Ok(0);
            }
            value.parse::<u64>().map_err(|_| {
                LineageError::Generic(format!("Invalid numstat count {:?} for {}", value, path))
            })
        };

        entries.push(NumstatEntry {
            insertions: parse_count(ins)?,
            deletions: parse_count(del)?,
            path,
            previous_path,
            binary,
        });
    }

    Ok(entries)
}

/// Parse `git diff-tree --name-status -z` output.
///
/// Records are `<status>\0path\0`, or `<status>\0old\0new\0` for renames and copies.
pub fn parse_name_status_z(raw: &[u8]) -> Result<Vec<StatusEntry>, LineageError> {
    let mut fields = nul_fields(raw).into_iter();
    let mut entries = Vec::new();

    while let Some(status) = fields.next() {
        if status.is_empty() {
            continue;
        }
        let Some(letter) = status.chars().next() else {
            continue;
        };
        let first = fields.next().unwrap_or_default();
        if first.is_empty() {
            return Err(LineageError::Generic(format!(
                "Name-status record {:?} has no path",
                status
            )));
        }

        let entry = if matches!(letter, 'R' | 'C') {
            let second = fields.next().unwrap_or_default();
            if second.is_empty() {
                return Err(LineageError::Generic(format!(
                    "Name-status record {:?} for {} has no destination",
                    status, first
                )));
            }
            StatusEntry {
                path: second,
                previous_path: Some(first),
                letter,
            }
        } else {
            StatusEntry {
                path: first,
                previous_path: None,
                letter,
            }
        };
        entries.push(entry);
    }

    Ok(entries)
}

/// Map a name-status letter onto the four-way status model. Unknown letters are `None`.
pub fn status_from_letter(letter: char) -> Option<FileStatus> {
    match letter {
        'A' | 'C' => Some(FileStatus::Added),
        'M' | 'T' => Some(FileStatus::Modified),
        'D' => Some(FileStatus::Deleted),
        'R' => Some(FileStatus::Renamed),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct JoinedDiff {
    pub file_changes: Vec<FileChange>,
    pub warnings: Vec<String>,
}

/// Pair numstat and name-status records by destination filename.
///
/// Output follows numstat order, then any status-only files in their listing order.
pub fn join_by_filename(stats: Vec<NumstatEntry>, statuses: Vec<StatusEntry>) -> JoinedDiff {
    let mut joined = JoinedDiff::default();
    let mut by_path: HashMap<String, StatusEntry> = HashMap::with_capacity(statuses.len());
    let mut status_order = Vec::with_capacity(statuses.len());
    for entry in statuses {
        status_order.push(entry.path.clone());
        by_path.insert(entry.path.clone(), entry);
    }

    for stat in stats {
        let status = match by_path.remove(&stat.path) {
            Some(entry) => resolve_status(&entry, &mut joined.warnings),
            None => {
                joined
                    .warnings
                    .push(format!("no status entry for {}", stat.path));
                FileStatus::Modified
            }
        };
        joined.file_changes.push(FileChange {
            category: classify_file(&stat.path),
            filename: stat.path,
            previous_filename: stat.previous_path,
            status,
            insertions: stat.insertions,
            deletions: stat.deletions,
            binary: stat.binary,
            patch: None,
        });
    }

    for path in status_order {
        let Some(entry) = by_path.remove(&path) else {
            continue;
        };
        joined
            .warnings
            .push(format!("no numstat entry for {}", entry.path));
        let status = resolve_status(&entry, &mut joined.warnings);
        joined.file_changes.push(FileChange {
            category: classify_file(&entry.path),
            filename: entry.path,
            previous_filename: entry.previous_path,
            status,
            insertions: 0,
            deletions: 0,
            binary: false,
            patch: None,
        });
    }

    joined
}

fn resolve_status(entry: &StatusEntry, warnings: &mut Vec<String>) -> FileStatus {
    status_from_letter(entry.letter).unwrap_or_else(|| {
        warnings.push(format!(
            "unknown status letter '{}' for {}",
            entry.letter, entry.path
        ));
        FileStatus::Modified
    })
}

/// Cap `patch` at `cap` characters, appending the truncation marker when cut.
pub fn cap_patch(patch: &str, cap: usize) -> String {
    if patch.chars().count() <= cap {
        return patch.to_string();
    }
    format!("{}{}", truncate_chars(patch, cap), PATCH_TRUNCATION_MARKER)
}

fn header_names_file(header: &str, filename: &str) -> bool {
    let Some(paths) = header.trim_end().strip_prefix("diff --git ") else {
        return false;
    };
    let plain_new = format!(" b/{}", filename);
    let plain_old = format!("a/{} ", filename);
    if paths.ends_with(&plain_new) || paths.starts_with(&plain_old) {
        return true;
    }
    // Quoted form: diff --git "a/x y" "b/x y"
    if let Some(idx) = paths.rfind(" \"b/") {
        let new_path = unescape_git_path(&paths[idx + 1..]);
        if new_path.strip_prefix("b/") == Some(filename) {
            return true;
        }
    }
    false
}

/// Slice one file's section out of a multi-file unified diff, capped at `cap` characters.
///
/// The section runs from the `diff --git` header naming `filename` up to the next file
/// header. Returns `None` when no header names the file.
pub fn extract_file_patch(full_diff: &str, filename: &str, cap: usize) -> Option<String> {
    let mut section = String::new();
    let mut capturing = false;

    for line in full_diff.split_inclusive('\n') {
        if line.starts_with("diff --git ") {
            if capturing {
                break;
            }
            capturing = header_names_file(line, filename);
        }
        if capturing {
            section.push_str(line);
        }
    }

    if section.is_empty() {
        None
    } else {
        Some(cap_patch(&section, cap))
    }
}

/// Extracts structured file changes for single commits.
pub struct DiffParser<'a> {
    gateway: &'a dyn GitGateway,
    logger: Logger,
    patch_size_cap: usize,
    include_patches: bool,
}

impl<'a> DiffParser<'a> {
    pub fn new(gateway: &'a dyn GitGateway, config: &Config, logger: Logger) -> Self {
        DiffParser {
            gateway,
            logger,
            patch_size_cap: config.patch_size_cap(),
            include_patches: config.include_patches(),
        }
    }

    /// Read one commit with its parents and computed changes.
    ///
    /// Unlike [`DiffParser::parse_change`] this fails when the commit itself is unreadable;
    /// only the diff part degrades to an empty change set.
    pub fn read_commit(&self, hash: &str) -> Result<Commit, LineageError> {
        let raw = self.gateway.read_commit(hash)?;
        let timestamp = DateTime::<Utc>::from_timestamp(raw.committer.seconds, 0).ok_or_else(
            || {
                LineageError::Generic(format!(
                    "Commit {} has an out-of-range committer date",
                    raw.hash
                ))
            },
        )?;
        let changes = self.parse_change_against(&raw.hash, raw.parents.first().map(String::as_str));

        Ok(Commit {
            hash: raw.hash,
            message: raw.message,
            author_name: raw.author.name,
            author_email: raw.author.email,
            timestamp,
            parents: raw.parents,
            changes,
        })
    }

    /// Changes introduced by `commit_hash` relative to its first parent.
    ///
    /// Never fails: any git or parse error is logged and yields an empty change set.
    pub fn parse_change(&self, commit_hash: &str) -> CommitChanges {
        let parent = match self.gateway.read_commit(commit_hash) {
            Ok(raw) => raw.parents.into_iter().next(),
            Err(e) => {
                self.logger.warn(&format!(
                    "Could not read commit {}: {}",
                    short_hash(commit_hash),
                    e
                ));
                return CommitChanges::default();
            }
        };
        self.parse_change_against(commit_hash, parent.as_deref())
    }

    /// Like [`DiffParser::parse_change`] when the caller already knows the first parent.
    pub fn parse_change_against(&self, commit_hash: &str, parent: Option<&str>) -> CommitChanges {
        match self.try_parse_change(commit_hash, parent) {
            Ok(changes) => changes,
            Err(e) => {
                self.logger.warn(&format!(
                    "Could not parse changes of {}: {}",
                    short_hash(commit_hash),
                    e
                ));
                CommitChanges::default()
            }
        }
    }

    fn try_parse_change(
        &self,
        commit_hash: &str,
        parent: Option<&str>,
    ) -> Result<CommitChanges, LineageError> {
        let stats = parse_numstat_z(&self.gateway.diff_numstat(commit_hash, parent)?)?;
        let statuses = parse_name_status_z(&self.gateway.diff_name_status(commit_hash, parent)?)?;
        let JoinedDiff {
            mut file_changes,
            warnings,
        } = join_by_filename(stats, statuses);

        for warning in &warnings {
            self.logger
                .warn(&format!("{}: {}", short_hash(commit_hash), warning));
        }

        // Counts are still useful without the patch text
        let full_diff = match self.gateway.diff_patch(commit_hash, parent) {
            Ok(text) => text,
            Err(e) => {
                self.logger.warn(&format!(
                    "Patch unavailable for {}: {}",
                    short_hash(commit_hash),
                    e
                ));
                String::new()
            }
        };

        if self.include_patches {
            for change in file_changes.iter_mut() {
                change.patch = extract_file_patch(&full_diff, &change.filename, self.patch_size_cap);
            }
        }

        let summary = generate_change_summary(&file_changes, &full_diff);
        self.logger.debug(&format!(
            "{}: {} file(s), {}",
            short_hash(commit_hash),
            file_changes.len(),
            summary.text
        ));

        Ok(CommitChanges {
            insertions: file_changes.iter().map(|f| f.insertions).sum(),
            deletions: file_changes.iter().map(|f| f.deletions).sum(),
            files: file_changes.iter().map(|f| f.filename.clone()).collect(),
            file_changes,
            summary: summary.text,
            insights: summary.insights,
            integrity_warnings: warnings,
        })
    }
}
