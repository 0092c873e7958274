//! Manifest rendering: [`ManifestKind`] and [`Renderer`].
//!
//! | Manifest   | Template                  | Decoded as                         |
//! |------------|---------------------------|------------------------------------|
//! | Deployment | `deployment.yaml.tera`    | `k8s_openapi` `apps/v1` Deployment |
//! | Service    | `service.yaml.tera`       | `k8s_openapi` `v1` Service         |
//!
//! A template directory may override either file by name; anything else in it
//! is ignored.

use std::path::Path;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use serde::de::DeserializeOwned;
use tera::Tera;

use crate::context::TemplateData;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// ManifestKind
// ---------------------------------------------------------------------------

/// Kubernetes objects kudev renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestKind {
    Deployment,
    Service,
}

impl ManifestKind {
    pub fn all() -> &'static [ManifestKind] {
        &[ManifestKind::Deployment, ManifestKind::Service]
    }

    pub fn template_name(&self) -> &'static str {
        match self {
            ManifestKind::Deployment => "deployment.yaml.tera",
            ManifestKind::Service => "service.yaml.tera",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ManifestKind::Deployment => "Deployment",
            ManifestKind::Service => "Service",
        }
    }

    /// Template compiled into the binary.
    fn embedded(&self) -> &'static str {
        match self {
            ManifestKind::Deployment => include_str!("templates/deployment.yaml.tera"),
            ManifestKind::Service => include_str!("templates/service.yaml.tera"),
        }
    }

    /// Override from `dir`, or the embedded template.
    fn source(&self, dir: Option<&Path>) -> Result<String, RenderError> {
        let Some(path) = dir.map(|d| d.join(self.template_name())) else {
            return Ok(self.embedded().to_string());
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                tracing::debug!(path = %path.display(), "using template override");
                Ok(text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(self.embedded().to_string()),
            Err(source) => Err(RenderError::Io { path, source }),
        }
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders typed Kubernetes objects. Create once and reuse.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Renderer with embedded templates only.
    pub fn new() -> Result<Self, RenderError> {
        Self::with_template_dir(None)
    }

    /// Renderer whose embedded templates are overridden from `dir`. A missing
    /// directory is the same as none.
    pub fn with_template_dir(dir: Option<&Path>) -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        let sources = ManifestKind::all()
            .iter()
            .map(|kind| Ok((kind.template_name(), kind.source(dir)?)))
            .collect::<Result<Vec<_>, RenderError>>()?;
        tera.add_raw_templates(sources)?;
        Ok(Renderer { tera })
    }

    /// Rendered YAML text, line endings normalised to `\n`.
    pub fn render_yaml(&self, data: &TemplateData, kind: ManifestKind) -> Result<String, RenderError> {
        let ctx = data.to_tera_context()?;
        let yaml = self.tera.render(kind.template_name(), &ctx)?;
        Ok(yaml.replace("\r\n", "\n"))
    }

    pub fn render_deployment(&self, data: &TemplateData) -> Result<Deployment, RenderError> {
        self.decode(data, ManifestKind::Deployment)
    }

    pub fn render_service(&self, data: &TemplateData) -> Result<Service, RenderError> {
        self.decode(data, ManifestKind::Service)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &TemplateData,
        kind: ManifestKind,
    ) -> Result<T, RenderError> {
        let yaml = self.render_yaml(data, kind)?;
        serde_yaml::from_str(&yaml).map_err(|source| RenderError::Manifest {
            kind: kind.label(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
