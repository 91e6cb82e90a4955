use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Corpus-level loader failures. Problems with a single file are reported as
/// [`crate::SkippedDocument`] instead and never abort a build.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("corpus root {path} does not exist or is not a directory")]
    CorpusRootMissing { path: PathBuf },

    #[error("none of the configured documentation roots exist under {path}")]
    NoDocumentationRoots { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// A rebuild was aborted; the previously published snapshot is still live.
    #[error("index build failed: {reason}")]
    BuildFailure { reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The target directory has content that is not an index.
    #[error("{path} is not empty and does not contain an index")]
    NotAnIndex { path: PathBuf },

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
