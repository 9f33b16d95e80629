use crate::config::Config;
use crate::error::LineageError;
use crate::git::gateway::{BranchScope, GitGateway, RawCommit, Signature};

use chrono::{DateTime, SecondsFormat, Utc};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const EMPTY_TREE_HASH: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

const LOCK_FILE_NAME: &str = "git-lineage.lock";

/// A repository driven through the git CLI.
///
/// Holds no interior mutability, so read-only queries may be issued from several
/// threads at once. Mutations must go through `RepoLock`.
#[derive(Debug, Clone)]
pub struct Repository {
    global_args: Vec<String>,
    git_dir: PathBuf,
    workdir: PathBuf,
    git_cmd: String,
    timeout: Option<Duration>,
}

impl Repository {
    // Util for preparing global args for execution
    pub fn global_args_for_exec(&self) -> Vec<String> {
        let mut args = self.global_args.clone();
        if !args.iter().any(|arg| arg == "--no-pager") {
            args.push("--no-pager".to_string());
        }
        args
    }

    /// Execute an arbitrary git command and return stdout as string
    pub fn git(&self, args: &[&str]) -> Result<String, LineageError> {
        let output = self.exec(args.iter().map(|s| s.to_string()).collect())?;
        Ok(String::from_utf8(output.stdout)?)
    }

    fn exec(&self, args: Vec<String>) -> Result<Output, LineageError> {
        let mut full_args = self.global_args_for_exec();
        full_args.extend(args);
        exec_git(&self.git_cmd, &full_args, self.timeout)
    }

    fn exec_stdout(&self, args: Vec<String>) -> Result<String, LineageError> {
        let output = self.exec(args)?;
        Ok(String::from_utf8(output.stdout)?)
    }

    /// Path to the .git folder
    pub fn path(&self) -> &Path {
        self.git_dir.as_path()
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.as_path()
    }

    /// File used for the repository-scoped advisory lock around mutations.
    pub fn lock_path(&self) -> PathBuf {
        self.git_dir.join(LOCK_FILE_NAME)
    }

    fn lines(&self, args: Vec<String>) -> Result<Vec<String>, LineageError> {
        Ok(self
            .exec_stdout(args)?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn diff_tree_args(&self, mode: &str, commit: &str, parent: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "diff-tree".to_string(),
            "-r".to_string(),
            "-M".to_string(),
            "--no-commit-id".to_string(),
            "--no-color".to_string(),
            "--no-ext-diff".to_string(),
            mode.to_string(),
        ];
        if mode != "-p" {
            args.push("-z".to_string());
        }
        match parent {
            Some(parent) => args.push(parent.to_string()),
            None => args.push("--root".to_string()),
        }
        args.push(commit.to_string());
        args
    }
}

impl GitGateway for Repository {
    fn current_branch(&self) -> Result<Option<String>, LineageError> {
        let args = vec![
            "symbolic-ref".to_string(),
            "--quiet".to_string(),
            "--short".to_string(),
            "HEAD".to_string(),
        ];
        match self.exec_stdout(args) {
            Ok(name) => Ok(Some(name.trim().to_string())),
            // Exit code 1 means HEAD is detached
            Err(LineageError::GitCliError { code: Some(1), .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn head_commit(&self) -> Result<String, LineageError> {
        self.resolve_commit("HEAD")
    }

    fn resolve_commit(&self, rev: &str) -> Result<String, LineageError> {
        let args = vec![
            "rev-parse".to_string(),
            "--verify".to_string(),
            "--quiet".to_string(),
            format!("{}^{{commit}}", rev),
        ];
        match self.exec_stdout(args) {
            Ok(oid) => Ok(oid.trim().to_string()),
            Err(LineageError::GitCliError { .. }) => {
                Err(LineageError::NotFound(format!("commit '{}'", rev)))
            }
            Err(e) => Err(e),
        }
    }

    fn ref_exists(&self, refname: &str) -> bool {
        self.resolve_commit(refname).is_ok()
    }

    fn branches_containing(
        &self,
        commit: &str,
        scope: BranchScope,
    ) -> Result<Vec<String>, LineageError> {
        let args = vec![
            "for-each-ref".to_string(),
            "--contains".to_string(),
            commit.to_string(),
            "--format=%(refname)".to_string(),
            scope.ref_prefix().to_string(),
        ];
        Ok(strip_ref_prefixes(self.lines(args)?, scope))
    }

    fn read_commit(&self, commit: &str) -> Result<RawCommit, LineageError> {
        let hash = self.resolve_commit(commit)?;
        let output = self.exec(vec![
            "cat-file".to_string(),
            "commit".to_string(),
            hash.clone(),
        ])?;
        parse_raw_commit(&hash, &output.stdout)
    }

    fn merge_commits_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>, LineageError> {
        let mut args = vec!["log".to_string(), "--min-parents=2".to_string()];
        if let Some(since) = since {
            args.push(format!(
                "--since={}",
                since.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
        args.push("--format=%H".to_string());
        args.push("HEAD".to_string());
        self.lines(args)
    }

    fn commit_range(&self, base: &str, tip: &str) -> Result<Vec<String>, LineageError> {
        let args = vec![
            "rev-list".to_string(),
            "--reverse".to_string(),
            format!("{}..{}", base, tip),
        ];
        self.lines(args)
    }

    fn ancestry_path(&self, base: &str, tip: &str) -> Result<Vec<String>, LineageError> {
        let args = vec![
            "rev-list".to_string(),
            "--reverse".to_string(),
            "--topo-order".to_string(),
            "--ancestry-path".to_string(),
            format!("{}..{}", base, tip),
        ];
        self.lines(args)
    }

    fn diff_numstat(&self, commit: &str, parent: Option<&str>) -> Result<Vec<u8>, LineageError> {
        Ok(self
            .exec(self.diff_tree_args("--numstat", commit, parent))?
            .stdout)
    }

    fn diff_name_status(
        &self,
        commit: &str,
        parent: Option<&str>,
    ) -> Result<Vec<u8>, LineageError> {
        Ok(self
            .exec(self.diff_tree_args("--name-status", commit, parent))?
            .stdout)
    }

    fn diff_patch(&self, commit: &str, parent: Option<&str>) -> Result<String, LineageError> {
        let output = self.exec(self.diff_tree_args("-p", commit, parent))?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn is_working_tree_clean(&self) -> Result<bool, LineageError> {
        let status = self.exec_stdout(vec![
            "status".to_string(),
            "--porcelain".to_string(),
            "--untracked-files=no".to_string(),
        ])?;
        Ok(status.trim().is_empty())
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, LineageError> {
        let args = vec![
            "merge-base".to_string(),
            "--is-ancestor".to_string(),
            ancestor.to_string(),
            descendant.to_string(),
        ];
        match self.exec(args) {
            Ok(_) => Ok(true),
            Err(LineageError::GitCliError { code: Some(1), .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn count_commits_between(&self, from: &str, to: &str) -> Result<usize, LineageError> {
        let out = self.exec_stdout(vec![
            "rev-list".to_string(),
            "--count".to_string(),
            format!("{}..{}", from, to),
        ])?;
        out.trim().parse::<usize>().map_err(|e| {
            LineageError::Generic(format!("Unexpected rev-list --count output '{}': {}", out.trim(), e))
        })
    }

    fn create_branch(&self, name: &str, target: &str) -> Result<(), LineageError> {
        self.exec(vec![
            "branch".to_string(),
            name.to_string(),
            target.to_string(),
        ])?;
        Ok(())
    }

    fn create_tag(&self, name: &str, target: &str) -> Result<(), LineageError> {
        self.exec(vec!["tag".to_string(), name.to_string(), target.to_string()])?;
        Ok(())
    }

    fn commit_tree(
        &self,
        tree: &str,
        parents: &[String],
        message: &str,
        author: &Signature,
        committer: &Signature,
    ) -> Result<String, LineageError> {
        if author.name.trim().is_empty() || author.email.trim().is_empty() {
            return Err(LineageError::Generic(
                "Missing author name or email".to_string(),
            ));
        }

        let env: Vec<(String, String)> = vec![
            ("GIT_AUTHOR_NAME".to_string(), author.name.clone()),
            ("GIT_AUTHOR_EMAIL".to_string(), author.email.clone()),
            ("GIT_AUTHOR_DATE".to_string(), author.git_date()),
            ("GIT_COMMITTER_NAME".to_string(), committer.name.clone()),
            ("GIT_COMMITTER_EMAIL".to_string(), committer.email.clone()),
            ("GIT_COMMITTER_DATE".to_string(), committer.git_date()),
        ];

        let mut args = self.global_args_for_exec();
        args.push("commit-tree".to_string());
        args.push(tree.to_string());
        for p in parents {
            args.push("-p".to_string());
            args.push(p.clone());
        }
        let output = exec_git_stdin_with_env(
            &self.git_cmd,
            &args,
            &env,
            message.as_bytes(),
            self.timeout,
        )?;
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    fn update_ref(
        &self,
        refname: &str,
        new_target: &str,
        expected_old: &str,
        reason: &str,
    ) -> Result<(), LineageError> {
        self.exec(vec![
            "update-ref".to_string(),
            "-m".to_string(),
            reason.to_string(),
            refname.to_string(),
            new_target.to_string(),
            expected_old.to_string(),
        ])?;
        Ok(())
    }

    fn reset_hard(&self, target: &str) -> Result<(), LineageError> {
        self.exec(vec![
            "reset".to_string(),
            "--hard".to_string(),
            "--quiet".to_string(),
            target.to_string(),
        ])?;
        Ok(())
    }
}

fn strip_ref_prefixes(refs: Vec<String>, scope: BranchScope) -> Vec<String> {
    refs.into_iter()
        .filter_map(|r| r.strip_prefix(scope.ref_prefix()).map(str::to_string))
        // refs/remotes/<remote>/HEAD is a symbolic alias, not a branch
        .filter(|r| !(scope == BranchScope::RemoteTracking && r.ends_with("/HEAD")))
        .collect()
}

/// Parse the output of `git cat-file commit <hash>`.
pub fn parse_raw_commit(hash: &str, bytes: &[u8]) -> Result<RawCommit, LineageError> {
    let text = std::str::from_utf8(bytes)?;
    let (header, message) = match text.find("\n\n") {
        Some(idx) => (&text[..idx], &text[idx + 2..]),
        None => (text, ""),
    };

    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;
    let mut signed = false;

    for line in header.lines() {
        // Continuation of a multi-line header (e.g. gpgsig)
        if line.starts_with(' ') {
            continue;
        }
        let Some((key, value)) = line.split_once(' ') else {
            continue;
        };
        match key {
            "tree" => tree = Some(value.to_string()),
            "parent" => parents.push(value.to_string()),
            "author" => author = Some(parse_signature(value)?),
            "committer" => committer = Some(parse_signature(value)?),
            "gpgsig" | "gpgsig-sha256" => signed = true,
            _ => {}
        }
    }

    let missing = |what: &str| {
        LineageError::Generic(format!("Commit {} has no {} header", hash, what))
    };

    Ok(RawCommit {
        hash: hash.to_string(),
        tree: tree.ok_or_else(|| missing("tree"))?,
        parents,
        author: author.ok_or_else(|| missing("author"))?,
        committer: committer.ok_or_else(|| missing("committer"))?,
        message: message.to_string(),
        signed,
    })
}

/// Parse `Name <email> 1700000000 +0100`.
fn parse_signature(value: &str) -> Result<Signature, LineageError> {
    let invalid = || LineageError::Generic(format!("Malformed signature line: {}", value));

    let lt = value.find('<').ok_or_else(invalid)?;
    let gt = value.rfind('>').ok_or_else(invalid)?;
    if gt < lt {
        return Err(invalid());
    }
    let name = value[..lt].trim().to_string();
    let email = value[lt + 1..gt].trim().to_string();

    let mut date = value[gt + 1..].split_whitespace();
    let seconds = date
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(invalid)?;
    let offset = date.next().unwrap_or("+0000").to_string();

    Ok(Signature {
        name,
        email,
        seconds,
        offset,
    })
}

pub fn find_repository_in_path(path: &str, config: &Config) -> Result<Repository, LineageError> {
    let global_args = vec!["-C".to_string(), path.to_string()];
    find_repository(&global_args, config)
}

pub fn find_repository(global_args: &[String], config: &Config) -> Result<Repository, LineageError> {
    let git_cmd = config.git_cmd().to_string();
    let timeout = config.git_timeout();

    let mut rev_parse_args = global_args.to_owned();
    rev_parse_args.push("rev-parse".to_string());
    rev_parse_args.push("--is-bare-repository".to_string());
    rev_parse_args.push("--absolute-git-dir".to_string());

    let output = exec_git(&git_cmd, &rev_parse_args, timeout)?;
    let stdout = String::from_utf8(output.stdout)?;
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());

    match lines.next() {
        Some("false") => {}
        Some("true") => {
            return Err(LineageError::Generic(
                "Bare repositories have no working tree to analyze or rewrite".to_string(),
            ));
        }
        other => {
            return Err(LineageError::Generic(format!(
                "Unexpected --is-bare-repository output: {:?}",
                other
            )));
        }
    }

    let git_dir = lines
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| LineageError::Generic("Missing --absolute-git-dir output".to_string()))?;

    let mut top_level_args = global_args.to_owned();
    top_level_args.push("rev-parse".to_string());
    top_level_args.push("--show-toplevel".to_string());
    let output = exec_git(&git_cmd, &top_level_args, timeout)?;
    let workdir = PathBuf::from(String::from_utf8(output.stdout)?.trim());

    if !workdir.is_dir() {
        return Err(LineageError::NotFound(format!(
            "work directory {}",
            workdir.display()
        )));
    }

    Ok(Repository {
        // Pin every later invocation to the repository root
        global_args: vec!["-C".to_string(), workdir.display().to_string()],
        git_dir,
        workdir,
        git_cmd,
        timeout,
    })
}

/// Helper to execute a git command
pub fn exec_git(
    git_cmd: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> Result<Output, LineageError> {
    run_git(git_cmd, args, &[], None, timeout)
}

/// Helper to execute a git command with data provided on stdin and additional environment variables
pub fn exec_git_stdin_with_env(
    git_cmd: &str,
    args: &[String],
    env: &[(String, String)],
    stdin_data: &[u8],
    timeout: Option<Duration>,
) -> Result<Output, LineageError> {
    run_git(git_cmd, args, env, Some(stdin_data), timeout)
}

fn run_git(
    git_cmd: &str,
    args: &[String],
    env: &[(String, String)],
    stdin_data: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<Output, LineageError> {
    let mut cmd = Command::new(git_cmd);
    cmd.args(args)
        .stdin(if stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    for (k, v) in env {
        cmd.env(k, v);
    }

    let mut child = cmd.spawn().map_err(LineageError::IoError)?;

    if let Some(data) = stdin_data
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin.write_all(data).map_err(LineageError::IoError)?;
        // stdin is dropped here so git sees EOF
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let status = match timeout {
        None => child.wait().map_err(LineageError::IoError)?,
        Some(limit) => {
            let start = Instant::now();
            loop {
                if let Some(status) = child.try_wait().map_err(LineageError::IoError)? {
                    break status;
                }
                if start.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(LineageError::Timeout {
                        args: args.to_vec(),
                        seconds: limit.as_secs(),
                    });
                }
                thread::sleep(Duration::from_millis(10));
            }
        }
    };

    let output = Output {
        status,
        stdout: stdout_handle.join().unwrap_or_default(),
        stderr: stderr_handle.join().unwrap_or_default(),
    };

    if !output.status.success() {
        return Err(LineageError::GitCliError {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            args: args.to_vec(),
        });
    }

    Ok(output)
}
