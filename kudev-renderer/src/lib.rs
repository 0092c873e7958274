//! # kudev-renderer
//!
//! Tera-based rendering of the Kubernetes manifests kudev deploys.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kudev_renderer::{Renderer, TemplateData};
//!
//! fn render(data: &TemplateData) {
//!     if let Ok(renderer) = Renderer::new() {
//!         if let Ok(deployment) = renderer.render_deployment(data) {
//!             println!("{:?}", deployment.metadata.name);
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::TemplateData;
pub use engine::{ManifestKind, Renderer};
pub use error::RenderError;

/// Label carrying the app name; also the Deployment selector.
pub const LABEL_APP: &str = "app.kubernetes.io/name";
/// Ownership marker: only resources carrying it are touched by bulk deletes.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Value of [`LABEL_MANAGED_BY`] on kudev-owned resources.
pub const MANAGED_BY_VALUE: &str = "kudev";
/// Source digest of the deployed image.
pub const LABEL_HASH: &str = "kudev.io/hash";

/// `app.kubernetes.io/managed-by=kudev`, for list/delete label selectors.
pub fn managed_selector() -> String {
    format!("{LABEL_MANAGED_BY}={MANAGED_BY_VALUE}")
}
