//! Project configuration: `.kudev.yaml`.
//!
//! # Discovery
//!
//! [`find_config_file`] walks upward from a start directory until it finds a
//! `.kudev.yaml`. The directory holding that file is the project root; it is
//! never stored in the file itself.
//!
//! # API pattern
//!
//! - [`load_at`]: explicit path; used by tests with `TempDir`
//! - [`discover`]: find + load from a start directory

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{DesiredWorkloadState, EnvVar, SourceDigest};

pub const CONFIG_FILE_NAME: &str = ".kudev.yaml";

const MAX_REPLICAS: i32 = 100;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Read-only project configuration consumed by every kudev component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub app_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Image repository name; defaults to `app_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(default = "default_dockerfile")]
    pub dockerfile_path: PathBuf,
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    #[serde(default = "default_port")]
    pub service_port: u16,
    /// Host port for port-forwarding; defaults to `service_port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    /// Extra exclusion patterns, appended to the built-in defaults.
    #[serde(default)]
    pub build_context_exclusions: Vec<String>,
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,
    /// Directory of `.tera` manifest overrides, relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,

    /// Directory containing the config file. Attached after load.
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_dockerfile() -> PathBuf {
    PathBuf::from("./Dockerfile")
}

fn default_replicas() -> i32 {
    1
}

fn default_port() -> u16 {
    8080
}

impl Config {
    /// Minimal config for `app_name` with every default applied.
    pub fn new(app_name: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            app_name: app_name.into(),
            namespace: default_namespace(),
            image_name: None,
            dockerfile_path: default_dockerfile(),
            replicas: default_replicas(),
            service_port: default_port(),
            local_port: None,
            env: Vec::new(),
            build_context_exclusions: Vec::new(),
            build_args: BTreeMap::new(),
            target: None,
            kube_context: None,
            templates_dir: None,
            project_root: project_root.into(),
        }
    }

    pub fn image_name(&self) -> &str {
        self.image_name.as_deref().unwrap_or(&self.app_name)
    }

    pub fn local_port(&self) -> u16 {
        self.local_port.unwrap_or(self.service_port)
    }

    /// Dockerfile path resolved against the project root.
    pub fn dockerfile(&self) -> PathBuf {
        self.project_root.join(&self.dockerfile_path)
    }

    pub fn templates_dir(&self) -> Option<PathBuf> {
        self.templates_dir
            .as_ref()
            .map(|dir| self.project_root.join(dir))
    }

    /// Desired workload state for a freshly built image.
    pub fn desired_state(&self, image_ref: &str, digest: &SourceDigest) -> DesiredWorkloadState {
        DesiredWorkloadState {
            app_name: self.app_name.clone(),
            namespace: self.namespace.clone(),
            image_ref: image_ref.to_string(),
            image_digest_label: digest.0.clone(),
            replicas: self.replicas,
            service_port: self.service_port,
            env: self.env.clone(),
        }
    }

    /// Check every field the cluster or the builder would later reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_dns_label("app_name", &self.app_name)?;
        validate_dns_label("namespace", &self.namespace)?;

        if self.replicas < 0 || self.replicas > MAX_REPLICAS {
            return Err(ConfigError::Invalid {
                field: "replicas",
                reason: format!("must be between 0 and {MAX_REPLICAS}, got {}", self.replicas),
            });
        }
        if self.service_port == 0 {
            return Err(ConfigError::Invalid {
                field: "service_port",
                reason: "must be between 1 and 65535".to_string(),
            });
        }
        if self.local_port == Some(0) {
            return Err(ConfigError::Invalid {
                field: "local_port",
                reason: "must be between 1 and 65535".to_string(),
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for var in &self.env {
            if var.name.is_empty() || var.name.contains('=') {
                return Err(ConfigError::Invalid {
                    field: "env",
                    reason: format!("invalid variable name '{}'", var.name),
                });
            }
            if !seen.insert(var.name.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "env",
                    reason: format!("duplicate variable '{}'", var.name),
                });
            }
        }
        Ok(())
    }

    /// Starter file written by `kudev init`.
    pub fn default_yaml(app_name: &str) -> Result<String, ConfigError> {
        let config = Config::new(app_name, PathBuf::new());
        Ok(serde_yaml::to_string(&config)?)
    }
}

fn validate_dns_label(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        field,
        reason: format!("'{value}' {reason}"),
    };
    if value.is_empty() || value.len() > 63 {
        return Err(invalid("must be 1-63 characters"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("may only contain lowercase letters, digits and '-'"));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(invalid("must start and end with an alphanumeric character"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Load / discover / write
// ---------------------------------------------------------------------------

/// Walk upward from `start` looking for `.kudev.yaml`.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Load and validate the config at `path`, attaching its project root.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.project_root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    config.validate()?;
    Ok(config)
}

/// `find_config_file` + `load_at`.
pub fn discover(start: &Path) -> Result<Config, ConfigError> {
    let path = find_config_file(start).ok_or_else(|| ConfigError::NotFound {
        path: start.join(CONFIG_FILE_NAME),
    })?;
    load_at(&path)
}

/// Write a starter config into `dir`, refusing to overwrite.
///
/// Write flow: serialize → `.kudev.yaml.tmp` sibling → `rename`.
pub fn init_at(dir: &Path, app_name: &str) -> Result<PathBuf, ConfigError> {
    validate_dns_label("app_name", app_name)?;
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(ConfigError::AlreadyExists { path });
    }
    let yaml = Config::default_yaml(app_name)?;
    let tmp = dir.join(format!("{CONFIG_FILE_NAME}.tmp"));
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
