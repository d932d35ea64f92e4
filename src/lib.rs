//! repomirror - Personal GitHub Backup Utility
//!
//! repomirror discovers every non-fork repository owned by the authenticated
//! GitHub user and mirrors it onto local disk: missing repositories are cloned,
//! existing working copies are fast-forwarded, and directories that are no
//! longer valid working copies are replaced by a fresh clone.
//!
//! ## Modules
//!
//! - [`config`]: JSON configuration loading
//! - [`error`]: Error taxonomy shared by the library
//! - [`github`]: GitHub API identity lookup and repository listing
//! - [`git`]: Thin async wrapper over the `git` command line
//! - [`sync`]: Per-repository mirror state machine and sequential driver

pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod sync;

pub use config::Config;
pub use error::MirrorError;
pub use git::{GitClient, RepoState};
pub use github::{GitHubClient, ListingStrategy, RepositoryDescriptor};
pub use sync::{MirrorEngine, SyncResult, SyncSummary};
