use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::LineageError;
use crate::logging::Logger;

pub const DEFAULT_PATCH_SIZE_CAP: usize = 5000;
pub const DEFAULT_BLAST_RADIUS_THRESHOLD: usize = 50;
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

const DEFAULT_INTEGRATION_BRANCH_MARKERS: &[&str] = &["develop", "master"];
const DEFAULT_PROTECTED_BRANCHES: &[&str] = &["main", "master", "develop", "production", "prod"];

#[derive(Debug, Clone)]
pub struct Config {
    git_path: String,
    git_timeout: Option<Duration>,
    patch_size_cap: usize,
    include_patches: bool,
    integration_branch_markers: Vec<String>,
    protected_branches: Vec<Pattern>,
    blast_radius_threshold: usize,
    token_ttl: Duration,
    debug: bool,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_size_cap: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_patches: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_branch_markers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected_branches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blast_radius_threshold: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_ttl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            git_path: "git".to_string(),
            git_timeout: None,
            patch_size_cap: DEFAULT_PATCH_SIZE_CAP,
            include_patches: true,
            integration_branch_markers: DEFAULT_INTEGRATION_BRANCH_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            protected_branches: DEFAULT_PROTECTED_BRANCHES
                .iter()
                .filter_map(|s| Pattern::new(s).ok())
                .collect(),
            blast_radius_threshold: DEFAULT_BLAST_RADIUS_THRESHOLD,
            token_ttl: DEFAULT_TOKEN_TTL,
            debug: cfg!(debug_assertions),
        }
    }
}

impl Config {
    /// Build the configuration from `~/.git-lineage/config.json` and `GIT_LINEAGE_*`
    /// environment variables. Invalid values fall back to defaults with a warning.
    pub fn load(logger: &Logger) -> Config {
        let file_cfg = load_file_config(logger);
        let mut config = Config::from_file_config(file_cfg.unwrap_or_default(), logger);
        config.apply_env_overrides(|key| env::var(key).ok(), logger);
        config
    }

    pub fn from_file_config(file_cfg: FileConfig, logger: &Logger) -> Config {
        let mut config = Config::default();

        if let Some(path) = file_cfg.git_path {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                config.git_path = trimmed.to_string();
            }
        }
        if let Some(timeout) = file_cfg.git_timeout {
            config.git_timeout = parse_duration_setting("git_timeout", &timeout, logger);
        }
        if let Some(cap) = file_cfg.patch_size_cap {
            if cap == 0 {
                logger.warn("Ignoring patch_size_cap of 0; using default");
            } else {
                config.patch_size_cap = cap;
            }
        }
        if let Some(include) = file_cfg.include_patches {
            config.include_patches = include;
        }
        if let Some(markers) = file_cfg.integration_branch_markers {
            config.integration_branch_markers = markers
                .into_iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Some(patterns) = file_cfg.protected_branches {
            config.protected_branches = compile_patterns(&patterns, logger);
        }
        if let Some(threshold) = file_cfg.blast_radius_threshold {
            config.blast_radius_threshold = threshold;
        }
        if let Some(ttl) = file_cfg.token_ttl
            && let Some(parsed) = parse_duration_setting("token_ttl", &ttl, logger)
        {
            config.token_ttl = parsed;
        }
        if let Some(debug) = file_cfg.debug {
            config.debug = debug;
        }

        config
    }

    /// Apply `GIT_LINEAGE_*` overrides. The lookup is injected so tests don't need to
    /// mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F, logger: &Logger)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("GIT_LINEAGE_GIT_PATH").filter(|p| !p.trim().is_empty()) {
            self.git_path = path.trim().to_string();
        }
        if let Some(timeout) = lookup("GIT_LINEAGE_GIT_TIMEOUT") {
            self.git_timeout = parse_duration_setting("GIT_LINEAGE_GIT_TIMEOUT", &timeout, logger);
        }
        if let Some(debug) = lookup("GIT_LINEAGE_DEBUG") {
            self.debug = debug.trim() == "1";
        }
        if let Some(branches) = lookup("GIT_LINEAGE_PROTECTED_BRANCHES") {
            let patterns: Vec<String> = branches
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            self.protected_branches = compile_patterns(&patterns, logger);
        }
        if let Some(ttl) = lookup("GIT_LINEAGE_TOKEN_TTL")
            && let Some(parsed) = parse_duration_setting("GIT_LINEAGE_TOKEN_TTL", &ttl, logger)
        {
            self.token_ttl = parsed;
        }
    }

    /// Returns the command to invoke git.
    pub fn git_cmd(&self) -> &str {
        &self.git_path
    }

    pub fn git_timeout(&self) -> Option<Duration> {
        self.git_timeout
    }

    pub fn patch_size_cap(&self) -> usize {
        self.patch_size_cap
    }

    pub fn include_patches(&self) -> bool {
        self.include_patches
    }

    pub fn integration_branch_markers(&self) -> &[String] {
        &self.integration_branch_markers
    }

    pub fn blast_radius_threshold(&self) -> usize {
        self.blast_radius_threshold
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn is_protected_branch(&self, branch: &str) -> bool {
        self.protected_branches.iter().any(|p| p.matches(branch))
    }

    pub fn with_git_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.git_timeout = timeout;
        self
    }

    pub fn with_integration_branch_markers(mut self, markers: Vec<String>) -> Self {
        self.integration_branch_markers = markers;
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn with_blast_radius_threshold(mut self, threshold: usize) -> Self {
        self.blast_radius_threshold = threshold;
        self
    }

    pub fn with_patch_size_cap(mut self, cap: usize) -> Self {
        self.patch_size_cap = cap.max(1);
        self
    }
}

fn parse_duration_setting(name: &str, value: &str, logger: &Logger) -> Option<Duration> {
    match humantime::parse_duration(value.trim()) {
        Ok(d) => Some(d),
        Err(e) => {
            logger.warn(&format!("Invalid duration for {} '{}': {}", name, value, e));
            None
        }
    }
}

fn compile_patterns(patterns: &[String], logger: &Logger) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|pattern_str| {
            Pattern::new(pattern_str)
                .map_err(|e| {
                    logger.warn(&format!(
                        "Invalid glob pattern in protected_branches '{}': {}",
                        pattern_str, e
                    ));
                })
                .ok()
        })
        .collect()
}

fn load_file_config(logger: &Logger) -> Option<FileConfig> {
    let path = config_file_path()?;
    if !path.exists() {
        return None;
    }
    match read_file_config(&path) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            logger.warn(&format!("Ignoring {}: {}", path.display(), e));
            None
        }
    }
}

pub fn read_file_config(path: &Path) -> Result<FileConfig, LineageError> {
    let data = fs::read(path)?;
    serde_json::from_slice::<FileConfig>(&data)
        .map_err(|e| LineageError::ConfigError(format!("Failed to parse config file: {}", e)))
}

pub fn config_file_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".git-lineage").join("config.json"))
}
