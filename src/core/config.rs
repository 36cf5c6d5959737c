// src/core/config.rs

use crate::constants::{
    COMPOSE_FILENAME, CONFIG_DIR, DEFAULT_ARM_MARKER, DEFAULT_READY_MARKER,
    DEFAULT_STACK_TIMEOUT_SECS, PROJECT_CONFIG_FILENAME,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to expand path '{path}': {reason}")]
    Expand { path: String, reason: String },
}

/// The project configuration stored in `config/platgen.toml`.
///
/// Every field has a default, so the file is optional and may be partial.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlatformConfig {
    pub project: ProjectSection,
    pub templates: TemplatesSection,
    pub stack: StackSection,
    pub test: TestSection,
    pub api: ApiSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectSection {
    /// Compose project name. Defaults to the root directory name.
    pub stack_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TemplatesSection {
    /// Templates directory; relative paths are resolved against the root.
    /// `~` and environment variables are expanded.
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StackSection {
    pub compose_file: String,
    /// Marker that arms the readiness watcher. Empty means armed from the start.
    pub arm_marker: String,
    pub ready_marker: String,
    pub timeout_secs: u64,
}

impl Default for StackSection {
    fn default() -> Self {
        Self {
            compose_file: COMPOSE_FILENAME.to_string(),
            arm_marker: DEFAULT_ARM_MARKER.to_string(),
            ready_marker: DEFAULT_READY_MARKER.to_string(),
            timeout_secs: DEFAULT_STACK_TIMEOUT_SECS,
        }
    }
}

impl StackSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn arm_marker(&self) -> Option<&str> {
        Some(self.arm_marker.as_str()).filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TestSection {
    /// Command run per service; `[service]` is replaced by the service name.
    pub command: String,
}

impl Default for TestSection {
    fn default() -> Self {
        Self {
            command: "docker compose run --rm [service] npm test".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSection {
    pub route_extension: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            route_extension: "js".to_string(),
        }
    }
}

impl PlatformConfig {
    /// Loads `config/platgen.toml` under `root`. A missing file yields the
    /// defaults.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_DIR).join(PROJECT_CONFIG_FILENAME);
        if !path.exists() {
            log::debug!("No project config at '{}', using defaults.", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.clone(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse { path, source: e })
    }

    /// The compose project name for this platform.
    pub fn stack_name(&self, root: &Path) -> String {
        self.project.stack_name.clone().unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_else(|| "platform".to_string())
        })
    }

    /// The absolute templates directory.
    pub fn templates_dir(&self, root: &Path) -> Result<PathBuf, ConfigError> {
        let Some(template) = &self.templates.dir else {
            return Ok(root.join(CONFIG_DIR).join("templates"));
        };
        let expanded = shellexpand::full(template).map_err(|e| ConfigError::Expand {
            path: template.clone(),
            reason: e.to_string(),
        })?;
        let path = PathBuf::from(expanded.into_owned());
        Ok(if path.is_absolute() { path } else { root.join(path) })
    }
}
