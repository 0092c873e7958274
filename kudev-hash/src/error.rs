//! Error types for kudev-hash.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from walking and digesting a source tree.
#[derive(Debug, Error)]
pub enum HashError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every file under the root was excluded (or the root is empty).
    #[error("no files found to hash under {root}")]
    NoFiles { root: PathBuf },

    /// A caller-supplied exclusion is not a valid glob.
    #[error("invalid exclusion pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Errors from parsing image tags.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    #[error("'{0}' is not a kudev tag (expected kudev-<8 hex>[-YYYYMMDD-HHMMSS])")]
    Malformed(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> HashError {
    HashError::Io {
        path: path.into(),
        source,
    }
}
