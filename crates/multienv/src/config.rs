// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Configuration parsing and data types for multienv.yaml files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

/// Extensions copied verbatim during resource filtering unless overridden.
pub const DEFAULT_NON_FILTERED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "gif", "bmp", "png", "ico", "pdf", "zip", "jar", "war", "ear", "class", "gz",
    "tgz", "so", "dll", "exe",
];

/// API version for configuration files.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum ApiVersion {
    #[serde(rename = "multienv/v0")]
    #[default]
    V0,
}

/// Helper for two-stage deserialization to determine API version first.
#[derive(Deserialize)]
struct ApiVersionMapping {
    #[serde(default)]
    api: ApiVersion,
}

/// Per-environment overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EnvironmentOverrides {
    /// Bypass this environment entirely.
    #[serde(default)]
    pub skip: bool,

    /// Tokens layered over the global `filter_tokens`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filter_tokens: BTreeMap<String, String>,
}

/// Main configuration from a multienv.yaml file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MultiEnvConfig {
    /// API version identifier.
    #[serde(default)]
    pub api: ApiVersion,

    /// Root holding one subdirectory per environment.
    #[serde(default = "default_source_directory")]
    pub source_directory: PathBuf,

    /// Name of the shared overlay directory under `source_directory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_dir: Option<String>,

    /// Environment names or glob patterns to skip.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_environments: Vec<String>,

    /// Base name of the produced archives; defaults to the artifact's stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_name: Option<String>,

    /// Where produced archives are written.
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,

    /// Scratch space for extraction and staging.
    #[serde(default = "default_work_directory")]
    pub work_directory: PathBuf,

    /// Token substitutions applied during resource filtering.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filter_tokens: BTreeMap<String, String>,

    /// File extensions never filtered.
    #[serde(default = "default_non_filtered_extensions")]
    pub non_filtered_extensions: Vec<String>,

    /// Bypass processing entirely.
    #[serde(default)]
    pub skip: bool,

    /// Per-environment overrides keyed by environment name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, EnvironmentOverrides>,

    /// Archive format hint, overriding detection from the file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Upper bound on environments processed at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Path to the file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

fn default_source_directory() -> PathBuf {
    PathBuf::from("src/main/environments")
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("target")
}

fn default_work_directory() -> PathBuf {
    PathBuf::from("target/multienv")
}

fn default_non_filtered_extensions() -> Vec<String> {
    DEFAULT_NON_FILTERED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl MultiEnvConfig {
    /// Parse configuration from YAML string.
    pub fn from_yaml<S: Into<String>>(yaml: S) -> crate::Result<Self> {
        let yaml = yaml.into();

        // Stage 1: Parse to get API version
        let value: serde_yaml::Value =
            serde_yaml::from_str(&yaml).map_err(|e| crate::Error::InvalidYaml {
                error: e,
                yaml_content: yaml.clone(),
            })?;

        // An empty document is a valid, all-defaults configuration.
        let value = match value {
            serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
            other => other,
        };

        let with_version: ApiVersionMapping =
            serde_yaml::from_value(value.clone()).map_err(|e| crate::Error::InvalidYaml {
                error: e,
                yaml_content: yaml.clone(),
            })?;

        // Stage 2: Deserialize based on version
        match with_version.api {
            ApiVersion::V0 => {
                serde_yaml::from_value(value).map_err(|e| crate::Error::InvalidYaml {
                    error: e,
                    yaml_content: yaml,
                })
            }
        }
    }

    /// Load configuration from file path.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| crate::Error::ReadFailed {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config = Self::from_yaml(yaml)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory that relative paths in this configuration are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default()
    }

    /// Resolve a configured path against [`Self::base_dir`].
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Whether the named environment is marked `skip` in its overrides.
    pub fn is_environment_skipped(&self, environment: &str) -> bool {
        self.environments
            .get(environment)
            .is_some_and(|overrides| overrides.skip)
    }

    /// Global tokens with the environment's own tokens layered on top.
    pub fn tokens_for(&self, environment: &str) -> BTreeMap<String, String> {
        let mut tokens = self.filter_tokens.clone();
        if let Some(overrides) = self.environments.get(environment) {
            tokens.extend(
                overrides
                    .filter_tokens
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        tokens
    }
}

impl Default for MultiEnvConfig {
    fn default() -> Self {
        Self {
            api: ApiVersion::default(),
            source_directory: default_source_directory(),
            common_dir: None,
            exclude_environments: Vec::new(),
            final_name: None,
            output_directory: default_output_directory(),
            work_directory: default_work_directory(),
            filter_tokens: BTreeMap::new(),
            non_filtered_extensions: default_non_filtered_extensions(),
            skip: false,
            environments: BTreeMap::new(),
            format: None,
            jobs: None,
            source_path: None,
        }
    }
}
