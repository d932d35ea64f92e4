//! Common test utilities and helpers for repomirror tests
#![allow(dead_code)]

use repomirror::RepositoryDescriptor;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Run git in `dir` with a fixed identity, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=repomirror", "-c", "user.email=repomirror@example.com"])
        .args(["-c", "init.defaultBranch=main", "-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("Failed to execute git");

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A set of bare "remote" repositories living in a temp directory
pub struct RemoteFixture {
    pub temp_dir: TempDir,
}

impl RemoteFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn remotes_dir(&self) -> PathBuf {
        let dir = self.temp_dir.path().join("remotes");
        std::fs::create_dir_all(&dir).expect("Failed to create remotes dir");
        dir
    }

    fn work_dir(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join("work").join(name)
    }

    /// Create a bare repository `name` with a single commit on `main`
    pub fn create_remote(&self, name: &str) -> PathBuf {
        let work = self.work_dir(name);
        std::fs::create_dir_all(&work).expect("Failed to create work dir");

        git(&work, &["init", "-b", "main"]);
        std::fs::write(work.join("README.md"), format!("# {}\n", name))
            .expect("Failed to write README");
        git(&work, &["add", "README.md"]);
        git(&work, &["commit", "-m", "Initial commit"]);

        let bare = self.remotes_dir().join(format!("{}.git", name));
        git(
            self.temp_dir.path(),
            &["clone", "--bare", &work.to_string_lossy(), &bare.to_string_lossy()],
        );
        git(&work, &["remote", "add", "origin", &bare.to_string_lossy()]);
        git(&work, &["fetch", "origin"]);
        git(&work, &["branch", "--set-upstream-to=origin/main", "main"]);
        bare
    }

    /// Push a new commit to the remote `name`, returning its id
    pub fn push_commit(&self, name: &str, message: &str) -> String {
        let work = self.work_dir(name);
        let file = work.join("CHANGES.md");
        let mut content = std::fs::read_to_string(&file).unwrap_or_default();
        content.push_str(message);
        content.push('\n');
        std::fs::write(&file, content).expect("Failed to write file");

        git(&work, &["add", "CHANGES.md"]);
        git(&work, &["commit", "-m", message]);
        git(&work, &["push", "origin", "main"]);
        git(&work, &["rev-parse", "HEAD"])
    }

    /// Clone URL for the remote `name`
    pub fn clone_url(&self, name: &str) -> String {
        self.remotes_dir()
            .join(format!("{}.git", name))
            .to_string_lossy()
            .to_string()
    }

    /// Head commit of the remote `name`
    pub fn remote_head(&self, name: &str) -> String {
        git(&self.work_dir(name), &["rev-parse", "origin/main"])
    }

    pub fn descriptor(&self, name: &str) -> RepositoryDescriptor {
        RepositoryDescriptor {
            name: name.to_string(),
            clone_url: self.clone_url(name),
            fork: false,
        }
    }
}

/// Head commit of a local working copy
pub fn local_head(path: &Path) -> String {
    git(path, &["rev-parse", "HEAD"])
}

/// JSON for one repository object as the GitHub API returns it
pub fn repo_json(name: &str, clone_url: &str, fork: bool) -> Value {
    json!({
        "id": 1,
        "name": name,
        "full_name": format!("octocat/{}", name),
        "clone_url": clone_url,
        "fork": fork,
        "private": false
    })
}

/// A page of `count` repositories named `{prefix}-{n}`
pub fn repo_page(prefix: &str, count: usize) -> Vec<Value> {
    (0..count)
        .map(|n| {
            let name = format!("{}-{}", prefix, n);
            let url = format!("https://github.com/octocat/{}.git", name);
            repo_json(&name, &url, false)
        })
        .collect()
}
