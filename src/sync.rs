//! Mirror Engine - Keeps one local working copy per repository
//!
//! Each repository is visited once per run and moves through a small state
//! machine decided by what is on disk at `destination/<name>`:
//!
//! - `Absent`: clone, ending in `Cloned` or `Failed`
//! - `ValidCopy`: fetch and compare heads, ending in `UpToDate`, `Pulled` or `Failed`
//! - `CorruptCopy`: remove and clone again, ending in `Recloned` or `Failed`
//!
//! A clone cut short by an error or the per-repository timeout is removed, so
//! the next run starts again from `Absent`.
//!
//! Repositories are processed strictly one after another. A failure is
//! recorded in the [`SyncResult`] and never stops the next repository.

use crate::config::Config;
use crate::error::{MirrorError, Result};
use crate::git::{GitClient, RepoState};
use crate::github::RepositoryDescriptor;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Outcome of mirroring a single repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    /// Repository was missing and has been cloned
    Cloned { name: String, path: PathBuf },
    /// Path held something that was not a working copy; replaced by a fresh clone
    Recloned { name: String, path: PathBuf },
    /// Working copy was fast-forwarded
    Pulled {
        name: String,
        path: PathBuf,
        from: Option<String>,
        to: String,
    },
    /// Local head already matches the remote head
    UpToDate { name: String, path: PathBuf },
    /// Operation failed; the repository is left as it was for this run
    Failed {
        name: String,
        path: PathBuf,
        /// What was found on disk before mirroring started
        state: RepoState,
        error: String,
    },
}

impl SyncResult {
    pub fn name(&self) -> &str {
        match self {
            SyncResult::Cloned { name, .. }
            | SyncResult::Recloned { name, .. }
            | SyncResult::Pulled { name, .. }
            | SyncResult::UpToDate { name, .. }
            | SyncResult::Failed { name, .. } => name,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            SyncResult::Cloned { path, .. }
            | SyncResult::Recloned { path, .. }
            | SyncResult::Pulled { path, .. }
            | SyncResult::UpToDate { path, .. }
            | SyncResult::Failed { path, .. } => path,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncResult::Failed { .. })
    }
}

/// Results from a complete mirroring run
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub total_repositories: usize,
    pub cloned: usize,
    pub pulled: usize,
    pub up_to_date: usize,
    pub failed_operations: usize,
    pub duration: Duration,
    pub results: Vec<SyncResult>,
}

impl SyncSummary {
    /// Tally a list of results
    pub fn compile(results: Vec<SyncResult>, duration: Duration) -> Self {
        let mut summary = SyncSummary {
            total_repositories: results.len(),
            cloned: 0,
            pulled: 0,
            up_to_date: 0,
            failed_operations: 0,
            duration,
            results: Vec::new(),
        };

        for result in &results {
            match result {
                SyncResult::Cloned { .. } | SyncResult::Recloned { .. } => summary.cloned += 1,
                SyncResult::Pulled { .. } => summary.pulled += 1,
                SyncResult::UpToDate { .. } => summary.up_to_date += 1,
                SyncResult::Failed { .. } => summary.failed_operations += 1,
            }
        }

        summary.results = results;
        summary
    }

    pub fn successful_operations(&self) -> usize {
        self.total_repositories - self.failed_operations
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter().filter(|result| result.is_failure())
    }
}

/// Mirrors repositories into a destination root, one at a time
#[derive(Debug, Clone)]
pub struct MirrorEngine {
    git: GitClient,
    timeout: Duration,
}

impl MirrorEngine {
    /// Create an engine using the configured per-repository timeout
    pub fn new(config: &Config) -> Self {
        Self::with_timeout(config.git_timeout())
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            git: GitClient::new(),
            timeout,
        }
    }

    /// Mirror every repository in listing order
    ///
    /// `on_result` is called as soon as each repository is done, so callers
    /// can report progress while the run continues.
    pub async fn sync_all<F>(
        &self,
        repositories: &[RepositoryDescriptor],
        destination_root: &Path,
        mut on_result: F,
    ) -> SyncSummary
    where
        F: FnMut(&SyncResult),
    {
        let start_time = Instant::now();
        info!(
            "Mirroring {} repositories into {}",
            repositories.len(),
            destination_root.display()
        );

        let mut results = Vec::with_capacity(repositories.len());
        for repo in repositories {
            let result = self.sync(repo, destination_root).await;
            on_result(&result);
            results.push(result);
        }

        let summary = SyncSummary::compile(results, start_time.elapsed());
        info!(
            "Mirroring completed in {:.2}s: {} successful, {} failed",
            summary.duration.as_secs_f64(),
            summary.successful_operations(),
            summary.failed_operations
        );
        summary
    }

    /// Bring `destination_root/<name>` in line with the remote repository
    pub async fn sync(&self, repo: &RepositoryDescriptor, destination_root: &Path) -> SyncResult {
        let path = destination_root.join(&repo.name);
        let state = self.git.repo_state(&path).await;
        debug!("{} is {:?} at {}", repo.name, state, path.display());

        let outcome = timeout(self.timeout, self.mirror(repo, &path, state)).await;
        let error = match outcome {
            Ok(Ok(result)) => return result,
            Ok(Err(e)) => {
                warn!("Mirroring {} failed: {}", repo.name, e);
                e.to_string()
            }
            Err(_) => {
                warn!("Mirroring {} timed out", repo.name);
                // The clone was killed mid-way
                if state != RepoState::ValidCopy {
                    discard_partial_clone(&path).await;
                }
                format!("timed out after {:?}", self.timeout)
            }
        };

        SyncResult::Failed {
            name: repo.name.clone(),
            path,
            state,
            error,
        }
    }

    async fn mirror(
        &self,
        repo: &RepositoryDescriptor,
        path: &Path,
        state: RepoState,
    ) -> Result<SyncResult> {
        match state {
            RepoState::Absent => {
                info!("Cloning {}...", repo.name);
                self.clone_into(repo, path).await?;
                Ok(SyncResult::Cloned {
                    name: repo.name.clone(),
                    path: path.to_path_buf(),
                })
            }
            RepoState::ValidCopy => self.update(repo, path).await,
            RepoState::CorruptCopy => {
                warn!(
                    "{} is not a git repository, removing and cloning again",
                    path.display()
                );
                remove_path(path).await?;
                self.clone_into(repo, path).await?;
                Ok(SyncResult::Recloned {
                    name: repo.name.clone(),
                    path: path.to_path_buf(),
                })
            }
        }
    }

    async fn clone_into(&self, repo: &RepositoryDescriptor, path: &Path) -> Result<()> {
        if let Err(e) = self.git.clone_repository(&repo.clone_url, path).await {
            discard_partial_clone(path).await;
            return Err(e);
        }
        Ok(())
    }

    async fn update(&self, repo: &RepositoryDescriptor, path: &Path) -> Result<SyncResult> {
        info!("Updating {}", path.display());

        let local = self.git.head_revision(path).await;
        self.git.fetch(path).await?;
        let remote = self
            .git
            .remote_head_revision(path)
            .await
            .ok_or_else(|| MirrorError::Git {
                command: "rev-parse @{upstream}".to_string(),
                stderr: "no upstream branch or origin/HEAD to compare against".to_string(),
            })?;

        let up_to_date = SyncResult::UpToDate {
            name: repo.name.clone(),
            path: path.to_path_buf(),
        };

        if local.as_deref() == Some(remote.as_str()) {
            debug!("{} is up to date", repo.name);
            return Ok(up_to_date);
        }

        info!("Pulling new commits into {}...", repo.name);
        self.git.pull_fast_forward(path).await?;

        // A branch ahead of its upstream pulls nothing
        let after = self.git.head_revision(path).await;
        if after == local {
            return Ok(up_to_date);
        }

        Ok(SyncResult::Pulled {
            name: repo.name.clone(),
            path: path.to_path_buf(),
            from: local,
            to: after.unwrap_or(remote),
        })
    }
}

/// Remove what a failed or interrupted clone left at `path`
async fn discard_partial_clone(path: &Path) {
    // A killed git process may still be exiting when the first removal runs
    for _ in 0..3 {
        if tokio::fs::symlink_metadata(path).await.is_err() {
            return;
        }
        if let Err(e) = remove_path(path).await {
            debug!("Removing {} failed: {}", path.display(), e);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    if tokio::fs::symlink_metadata(path).await.is_ok() {
        warn!("Failed to clean up {}", path.display());
    }
}

/// Remove whatever is at `path`, recursing into directories
async fn remove_path(path: &Path) -> Result<()> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await?;
    } else {
        tokio::fs::remove_file(path).await?;
    }
    Ok(())
}
