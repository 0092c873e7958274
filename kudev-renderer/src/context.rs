//! Template context: the data a manifest template may reference.

use serde::{Deserialize, Serialize};

use kudev_core::{DesiredWorkloadState, EnvVar};

use crate::error::RenderError;

/// Rendering payload for Deployment and Service templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateData {
    pub app_name: String,
    pub namespace: String,
    pub image_ref: String,
    pub image_digest: String,
    pub replicas: i32,
    pub service_port: u16,
    pub env: Vec<EnvVar>,
}

impl TemplateData {
    /// Build the payload for one upsert.
    pub fn from_desired(desired: &DesiredWorkloadState) -> Self {
        Self {
            app_name: desired.app_name.clone(),
            namespace: desired.namespace.clone(),
            image_ref: desired.image_ref.clone(),
            image_digest: desired.image_digest_label.clone(),
            replicas: desired.replicas,
            service_port: desired.service_port,
            env: desired.env.clone(),
        }
    }

    /// Convert into a [`tera::Context`], adding the label constants so
    /// templates never hard-code them.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        let mut ctx = tera::Context::from_serialize(self)?;
        ctx.insert("label_app", crate::LABEL_APP);
        ctx.insert("label_managed_by", crate::LABEL_MANAGED_BY);
        ctx.insert("managed_by", crate::MANAGED_BY_VALUE);
        ctx.insert("label_hash", crate::LABEL_HASH);
        Ok(ctx)
    }
}

impl From<&DesiredWorkloadState> for TemplateData {
    fn from(desired: &DesiredWorkloadState) -> Self {
        Self::from_desired(desired)
    }
}
