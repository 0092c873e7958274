//! Error types for kudev-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading or validating `.kudev.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading or writing the config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path and serde_yaml line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No config file at the expected location.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// A field holds a value the tool cannot work with.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// `kudev init` refuses to overwrite an existing config.
    #[error("config already exists at {path}")]
    AlreadyExists { path: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
