#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{Timelike, Utc};
use git_lineage::git::test_utils::TmpRepo;

/// A fixture repository plus helpers to drive the `git-lineage` binary against it.
pub struct TestRepo {
    tmp: TmpRepo,
    home: tempfile::TempDir,
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRepo {
    pub fn new() -> Self {
        TestRepo {
            tmp: TmpRepo::new().expect("failed to create fixture repository"),
            home: tempfile::tempdir().expect("failed to create isolated HOME"),
        }
    }

    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn tmp(&self) -> &TmpRepo {
        &self.tmp
    }

    /// Write `contents` to `name` and commit it as the default test user.
    pub fn commit_file(&self, name: &str, contents: &str, message: &str) -> String {
        self.tmp
            .write_file(name, contents)
            .expect("write should succeed");
        self.tmp.commit(message).expect("commit should succeed")
    }

    /// Run plain git in the repository.
    pub fn git(&self, args: &[&str]) -> Result<String, String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .unwrap_or_else(|_| panic!("Failed to execute git command: {:?}", args));
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).to_string())
        }
    }

    /// Run `git-lineage -C <repo> <args>` from an unrelated directory.
    ///
    /// Ok carries stdout, Err carries stderr.
    pub fn git_lineage(&self, args: &[&str]) -> Result<String, String> {
        let mut full_args = vec!["-C", self.path().to_str().unwrap()];
        full_args.extend(args);

        let output = Command::new(get_binary_path())
            .args(&full_args)
            .current_dir(std::env::temp_dir())
            .env("HOME", self.home.path())
            .env("GIT_LINEAGE_DEBUG", "0")
            .output()
            .unwrap_or_else(|_| panic!("Failed to execute git-lineage command: {:?}", args));

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).to_string())
        }
    }

    pub fn head(&self) -> String {
        self.tmp.head_sha().expect("HEAD should resolve")
    }

    pub fn message_of(&self, commit: &str) -> String {
        self.tmp.message_of(commit).expect("commit should exist")
    }
}

pub fn get_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_git-lineage"))
}

/// Confirmation tokens from the CLI are bound to the current minute; wait out the last
/// few seconds of a minute so a plan and its execution land in the same one.
pub fn wait_for_fresh_minute() {
    let second = Utc::now().second();
    if second >= 50 {
        std::thread::sleep(std::time::Duration::from_secs(u64::from(61 - second)));
    }
}
