//! Rendering failures.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Tera(#[from] tera::Error),

    /// [`TemplateData`](crate::TemplateData) could not be turned into a Tera context.
    #[error("failed to build template context: {0}")]
    Context(#[from] serde_json::Error),

    /// Rendered YAML did not decode into the expected Kubernetes object.
    #[error("rendered {kind} manifest is invalid: {source}")]
    Manifest {
        kind: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    /// A template override exists but could not be read.
    #[error("cannot read template override {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
