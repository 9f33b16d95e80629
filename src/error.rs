use std::fmt;

#[derive(Debug)]
pub enum LineageError {
    #[cfg(feature = "test-support")]
    GitError(git2::Error),
    IoError(std::io::Error),
    /// Errors from invoking the git CLI that exited with a non-zero status
    GitCliError {
        code: Option<i32>,
        stderr: String,
        args: Vec<String>,
    },
    /// A git invocation exceeded the configured timeout and was killed
    Timeout {
        args: Vec<String>,
        seconds: u64,
    },
    /// A commit, ref or branch that was expected to exist could not be resolved
    NotFound(String),
    /// A history mutation was refused (unsafe plan, bad or expired token)
    UnsafeOperation(String),
    /// A rewrite batch finished with some commits left unrewritten
    PartialFailure {
        failed: usize,
        total: usize,
    },
    LockUnavailable(String),
    ConfigError(String),
    JsonError(serde_json::Error),
    Utf8Error(std::str::Utf8Error),
    FromUtf8Error(std::string::FromUtf8Error),
    Generic(String),
}

impl LineageError {
    /// True for failures of the underlying git tool (non-zero exit, spawn failure, timeout).
    pub fn is_external_tool_failure(&self) -> bool {
        matches!(
            self,
            LineageError::GitCliError { .. } | LineageError::IoError(_) | LineageError::Timeout { .. }
        )
    }
}

impl fmt::Display for LineageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "test-support")]
            LineageError::GitError(e) => write!(f, "Git error: {}", e),
            LineageError::IoError(e) => write!(f, "IO error: {}", e),
            LineageError::GitCliError { code, stderr, args } => match code {
                Some(c) => write!(
                    f,
                    "Git CLI ({}) failed with exit code {}: {}",
                    args.join(" "),
                    c,
                    stderr.trim()
                ),
                None => write!(f, "Git CLI ({}) failed: {}", args.join(" "), stderr.trim()),
            },
            LineageError::Timeout { args, seconds } => write!(
                f,
                "Git CLI ({}) timed out after {}s",
                args.join(" "),
                seconds
            ),
            LineageError::NotFound(what) => write!(f, "Not found: {}", what),
            LineageError::UnsafeOperation(reason) => write!(f, "Unsafe operation: {}", reason),
            LineageError::PartialFailure { failed, total } => write!(
                f,
                "Partial failure: {} of {} commits could not be rewritten",
                failed, total
            ),
            LineageError::LockUnavailable(e) => write!(f, "Repository lock unavailable: {}", e),
            LineageError::ConfigError(e) => write!(f, "Config error: {}", e),
            LineageError::JsonError(e) => write!(f, "JSON error: {}", e),
            LineageError::Utf8Error(e) => write!(f, "UTF-8 error: {}", e),
            LineageError::FromUtf8Error(e) => write!(f, "From UTF-8 error: {}", e),
            LineageError::Generic(e) => write!(f, "Generic error: {}", e),
        }
    }
}

impl std::error::Error for LineageError {}

#[cfg(feature = "test-support")]
impl From<git2::Error> for LineageError {
    fn from(err: git2::Error) -> Self {
        LineageError::GitError(err)
    }
}

impl From<std::io::Error> for LineageError {
    fn from(err: std::io::Error) -> Self {
        LineageError::IoError(err)
    }
}

impl From<serde_json::Error> for LineageError {
    fn from(err: serde_json::Error) -> Self {
        LineageError::JsonError(err)
    }
}

impl From<std::str::Utf8Error> for LineageError {
    fn from(err: std::str::Utf8Error) -> Self {
        LineageError::Utf8Error(err)
    }
}

impl From<std::string::FromUtf8Error> for LineageError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        LineageError::FromUtf8Error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_cli_error_display_includes_args_and_code() {
        let err = LineageError::GitCliError {
            code: Some(128),
            stderr: "fatal: bad revision 'nope'\n".to_string(),
            args: vec!["rev-parse".to_string(), "nope".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Git CLI (rev-parse nope) failed with exit code 128: fatal: bad revision 'nope'"
        );
        assert!(err.is_external_tool_failure());
    }

    #[test]
    fn test_partial_failure_display() {
        let err = LineageError::PartialFailure {
            failed: 1,
            total: 3,
        };
        assert_eq!(
            err.to_string(),
            "Partial failure: 1 of 3 commits could not be rewritten"
        );
        assert!(!err.is_external_tool_failure());
    }
}
