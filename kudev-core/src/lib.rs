//! kudev core library: domain types, project configuration, errors.
//!
//! - [`types`]: digests, file-change events, desired and observed workload state
//! - [`config`]: `.kudev.yaml` discovery, loading and validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, CONFIG_FILE_NAME};
pub use error::ConfigError;
pub use types::{
    DesiredWorkloadState, EnvVar, EventBatch, FileChangeEvent, FileOperation, ObservedStatus,
    PodStatus, SourceDigest, StatusCode,
};
