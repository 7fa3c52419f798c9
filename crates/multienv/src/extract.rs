// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Selection and one-time extraction of the base artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec::{archive_extension, FormatRegistry};
use crate::tree::FileTree;
use crate::Error;

#[cfg(test)]
#[path = "./extract_test.rs"]
mod extract_test;

/// The artifacts a build produced.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSource {
    /// The build's main artifact, if it produced a file.
    pub main: Option<PathBuf>,
    /// Additional artifacts attached to the build.
    pub attached: Vec<PathBuf>,
}

/// The archive chosen as the base layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Format identifier used to look up its codec.
    pub format: String,
}

impl Artifact {
    /// Describe an archive, detecting the format from its name unless a
    /// hint is given.
    pub fn new(path: PathBuf, format_hint: Option<&str>) -> crate::Result<Self> {
        let format = match format_hint {
            Some(hint) => hint.to_ascii_lowercase(),
            None => archive_extension(&path)
                .ok_or_else(|| Error::UnsupportedFormat(path.display().to_string()))?,
        };
        Ok(Self { path, format })
    }

    /// File name without the archive extension.
    pub fn stem(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = format!(".{}", self.format);
        if name.len() > suffix.len() && name.to_ascii_lowercase().ends_with(&suffix) {
            name[..name.len() - suffix.len()].to_string()
        } else {
            name
        }
    }
}

impl ArtifactSource {
    /// Pick the archive to derive environments from.
    ///
    /// The main artifact wins when it is a file. Otherwise exactly one
    /// attached artifact must exist.
    pub fn select(&self, format_hint: Option<&str>) -> crate::Result<Artifact> {
        if let Some(main) = self.main.as_ref().filter(|p| p.is_file()) {
            tracing::info!("Selected main artifact {} for further processing.", main.display());
            return Artifact::new(main.clone(), format_hint);
        }

        match self.attached.as_slice() {
            [] => Err(Error::NoArtifact),
            [single] => {
                tracing::info!(
                    "Selected attached artifact {} for further processing.",
                    single.display()
                );
                Artifact::new(single.clone(), format_hint)
            }
            many => {
                tracing::error!("Cannot decide which attached artifact to use.");
                Err(Error::AmbiguousArtifact(many.to_vec()))
            }
        }
    }
}

/// Extract the base artifact into `scratch` and snapshot the result.
///
/// Anything already in `scratch` is removed first. The returned tree is
/// shared by every environment of the run and never modified.
pub fn extract_base(
    artifact: &Artifact,
    scratch: &Path,
    registry: &FormatRegistry,
) -> crate::Result<Arc<FileTree>> {
    let codec = registry.get(&artifact.format)?;

    let failed = |error| Error::ExtractionFailed {
        path: artifact.path.clone(),
        dest: scratch.to_path_buf(),
        error,
    };

    if !artifact.path.is_file() {
        return Err(failed(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "artifact is not a readable file",
        )));
    }

    if scratch.exists() {
        std::fs::remove_dir_all(scratch).map_err(failed)?;
    }
    std::fs::create_dir_all(scratch).map_err(failed)?;

    (codec.extract)(&artifact.path, scratch).map_err(failed)?;
    let tree = FileTree::from_dir(scratch).map_err(failed)?;

    tracing::debug!(
        artifact = %artifact.path.display(),
        scratch = %scratch.display(),
        entries = tree.len(),
        "extracted base artifact"
    );
    Ok(Arc::new(tree))
}
