// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Manifest of the archives a run produced, handed to whatever registers
//! them as build outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::pipeline::RunReport;
use crate::Error;

#[cfg(test)]
#[path = "./report_test.rs"]
mod report_test;

/// Manifest API version.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub enum ManifestApiVersion {
    #[serde(rename = "multienv/v0/manifest")]
    V0,
}

/// Archives attached by a run, with the environments that failed.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ArtifactManifest {
    pub api: ManifestApiVersion,
    pub generated: GenerationMetadata,
    /// The base artifact the archives were derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(default)]
    pub attached: Vec<AttachedArtifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedEnvironment>,
}

/// When and by what the manifest was generated.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GenerationMetadata {
    pub timestamp: DateTime<Utc>,
    pub multienv_version: String,
}

/// One archive, labelled with its environment as the classifier.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AttachedArtifact {
    pub environment: String,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FailedEnvironment {
    pub environment: String,
    pub reason: String,
}

/// A single detected difference between a manifest and the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestChange {
    pub kind: ManifestChangeKind,
    pub environment: String,
    pub expected: String,
    pub actual: Option<String>,
}

/// Types of manifest mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestChangeKind {
    ArchiveChanged,
    ArchiveMissing,
}

fn sha256_file(path: &Path) -> crate::Result<String> {
    let content = std::fs::read(path).map_err(|error| Error::ReadFailed {
        path: path.to_path_buf(),
        error,
    })?;
    Ok(format!("{:x}", Sha256::digest(&content)))
}

impl ArtifactManifest {
    /// Build a manifest from a finished run, hashing every attached archive.
    pub fn from_report(report: &RunReport) -> crate::Result<Self> {
        let attached = report
            .attached()
            .map(|(environment, path)| {
                Ok(AttachedArtifact {
                    environment: environment.to_string(),
                    path: path.to_path_buf(),
                    sha256: sha256_file(path)?,
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;

        let failed = report
            .failures()
            .map(|(environment, err)| FailedEnvironment {
                environment: environment.to_string(),
                reason: err.to_string(),
            })
            .collect();

        Ok(Self {
            api: ManifestApiVersion::V0,
            generated: GenerationMetadata {
                timestamp: Utc::now(),
                multienv_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            artifact: report.artifact.as_ref().map(|a| a.path.clone()),
            attached,
            failed,
        })
    }

    /// Load a manifest from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|error| Error::ReadFailed {
            path: path.to_path_buf(),
            error,
        })?;
        serde_yaml::from_str(&content).map_err(|error| Error::InvalidYaml {
            error,
            yaml_content: content,
        })
    }

    /// Write the manifest as YAML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let yaml = serde_yaml::to_string(self).map_err(|error| Error::InvalidYaml {
            error,
            yaml_content: String::new(),
        })?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Compare recorded digests against the archives on disk.
    pub fn verify(&self) -> crate::Result<Vec<ManifestChange>> {
        let mut changes = Vec::new();
        for entry in &self.attached {
            if !entry.path.is_file() {
                changes.push(ManifestChange {
                    kind: ManifestChangeKind::ArchiveMissing,
                    environment: entry.environment.clone(),
                    expected: entry.sha256.clone(),
                    actual: None,
                });
                continue;
            }

            let actual = sha256_file(&entry.path)?;
            if actual != entry.sha256 {
                changes.push(ManifestChange {
                    kind: ManifestChangeKind::ArchiveChanged,
                    environment: entry.environment.clone(),
                    expected: entry.sha256.clone(),
                    actual: Some(actual),
                });
            }
        }
        Ok(changes)
    }
}
