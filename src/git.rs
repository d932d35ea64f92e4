use std::ffi::{OsStr, OsString};
use std::path::Path;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::error::{MirrorError, Result};

/// What is currently on disk at a repository's mirror path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    /// Nothing exists at the path
    Absent,
    /// The path is the top level of a git working copy
    ValidCopy,
    /// Something exists at the path but it is not a usable working copy,
    /// including a repository with no checked-out commit (an interrupted clone)
    CorruptCopy,
}

/// Git operations used by the mirror engine, run through the `git` executable
#[derive(Debug, Clone, Default)]
pub struct GitClient;

impl GitClient {
    pub fn new() -> Self {
        Self
    }

    /// Classify the mirror path of a repository
    pub async fn repo_state(&self, path: &Path) -> RepoState {
        // symlink_metadata so a dangling symlink still counts as "something there"
        if tokio::fs::symlink_metadata(path).await.is_err() {
            return RepoState::Absent;
        }

        if self.is_working_copy(path).await && self.head_revision(path).await.is_some() {
            RepoState::ValidCopy
        } else {
            RepoState::CorruptCopy
        }
    }

    /// True when `path` has its own `.git` and git agrees it is the top level
    pub async fn is_working_copy(&self, path: &Path) -> bool {
        if !path.join(".git").exists() {
            return false;
        }

        let toplevel = match self.run(Some(path), ["rev-parse", "--show-toplevel"]).await {
            Ok(toplevel) => toplevel,
            Err(e) => {
                debug!("{} is not a working copy: {}", path.display(), e);
                return false;
            }
        };

        match (
            tokio::fs::canonicalize(&toplevel).await,
            tokio::fs::canonicalize(path).await,
        ) {
            (Ok(toplevel), Ok(path)) => toplevel == path,
            _ => false,
        }
    }

    /// Clone `url` into `target`
    pub async fn clone_repository(&self, url: &str, target: &Path) -> Result<()> {
        self.run(
            None,
            [
                OsStr::new("clone"),
                OsStr::new("--"),
                OsStr::new(url),
                target.as_os_str(),
            ],
        )
        .await?;
        Ok(())
    }

    /// Fetch from `origin`
    pub async fn fetch(&self, path: &Path) -> Result<()> {
        self.run(Some(path), ["fetch", "origin"]).await?;
        Ok(())
    }

    /// Fast-forward the current branch to its upstream
    pub async fn pull_fast_forward(&self, path: &Path) -> Result<()> {
        self.run(Some(path), ["pull", "--ff-only"]).await?;
        Ok(())
    }

    /// Commit id of `HEAD`, or `None` for a repository without commits
    pub async fn head_revision(&self, path: &Path) -> Option<String> {
        self.resolve(path, "HEAD").await
    }

    /// Commit id of the fetched remote head
    ///
    /// Uses the upstream of the current branch, falling back to `origin/HEAD`
    /// when no upstream is configured.
    pub async fn remote_head_revision(&self, path: &Path) -> Option<String> {
        match self.resolve(path, "@{upstream}").await {
            Some(revision) => Some(revision),
            None => self.resolve(path, "origin/HEAD").await,
        }
    }

    async fn resolve(&self, path: &Path, revision: &str) -> Option<String> {
        let spec = format!("{}^{{commit}}", revision);
        self.run(Some(path), ["rev-parse", "--verify", "--quiet", spec.as_str()])
            .await
            .ok()
            .filter(|id| !id.is_empty())
    }

    /// Run git and return its trimmed stdout, failing on a non-zero exit
    async fn run<I, S>(&self, cwd: Option<&Path>, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        let command = args
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        let mut cmd = AsyncCommand::new("git");
        cmd.args(&args)
            // Never block on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!("Running git {} (cwd: {:?})", command, cwd);
        let output = cmd.output().await?;

        if !output.status.success() {
            return Err(MirrorError::Git {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_path_is_absent() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let git = GitClient::new();

        assert_eq!(git.repo_state(&dir.path().join("nothing")).await, RepoState::Absent);
    }

    #[tokio::test]
    async fn test_plain_directory_is_corrupt() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("plain");
        std::fs::create_dir(&path).expect("Failed to create dir");
        std::fs::write(path.join("README"), "not a repo").expect("Failed to write file");

        let git = GitClient::new();
        assert_eq!(git.repo_state(&path).await, RepoState::CorruptCopy);
    }

    #[tokio::test]
    async fn test_plain_file_is_corrupt() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("stray-file");
        std::fs::write(&path, "oops").expect("Failed to write file");

        let git = GitClient::new();
        assert_eq!(git.repo_state(&path).await, RepoState::CorruptCopy);
    }

    #[tokio::test]
    async fn test_empty_git_dir_is_corrupt() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("broken");
        std::fs::create_dir_all(path.join(".git")).expect("Failed to create dir");

        let git = GitClient::new();
        assert_eq!(git.repo_state(&path).await, RepoState::CorruptCopy);
    }

    #[tokio::test]
    async fn test_repository_without_commits_is_corrupt() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("half");
        std::fs::create_dir(&path).expect("Failed to create dir");
        let status = std::process::Command::new("git")
            .arg("init")
            .current_dir(&path)
            .output()
            .expect("Failed to execute git")
            .status;
        assert!(status.success());

        let git = GitClient::new();
        assert!(git.is_working_copy(&path).await);
        assert_eq!(git.repo_state(&path).await, RepoState::CorruptCopy);
    }

    #[tokio::test]
    async fn test_clone_treats_dashed_url_as_operand() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let git = GitClient::new();

        let err = git
            .clone_repository("--upload-pack=true", &dir.path().join("target"))
            .await
            .expect_err("a dashed url is not a repository");

        match err {
            MirrorError::Git { command, .. } => {
                assert!(command.starts_with("clone -- --upload-pack"), "{}", command)
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!dir.path().join("target").exists());
    }

    #[tokio::test]
    async fn test_failed_command_reports_stderr() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let git = GitClient::new();

        let err = git
            .clone_repository(
                &dir.path().join("missing-remote").to_string_lossy(),
                &dir.path().join("target"),
            )
            .await
            .expect_err("clone of a missing remote should fail");

        match err {
            MirrorError::Git { command, stderr } => {
                assert!(command.starts_with("clone "));
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
