use thiserror::Error;

/// Errors surfaced by the mirroring library.
///
/// `Config` and `Api` are fatal for a run; `Git` and `Io` are caught per
/// repository by the mirror engine and turned into a failed [`SyncResult`].
///
/// [`SyncResult`]: crate::sync::SyncResult
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("github api error: {0}")]
    Api(String),

    #[error("`git {command}` failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<octocrab::Error> for MirrorError {
    fn from(err: octocrab::Error) -> Self {
        MirrorError::Api(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
