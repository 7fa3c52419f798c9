// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Destination names for the produced archives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::Error;

#[cfg(test)]
#[path = "./naming_test.rs"]
mod naming_test;

/// Strip characters that are unsafe in file names.
///
/// Keeps ASCII alphanumerics, `.`, `_` and `-`.
pub fn sanitize_environment(environment: &str) -> String {
    environment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// `<final_name>-<environment>.<extension>`
pub fn archive_file_name(final_name: &str, environment: &str, extension: &str) -> String {
    format!(
        "{final_name}-{}.{extension}",
        sanitize_environment(environment)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Claimant {
    BaseArtifact,
    Environment(String),
}

impl std::fmt::Display for Claimant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Claimant::BaseArtifact => f.write_str("the base artifact"),
            Claimant::Environment(name) => write!(f, "environment '{name}'"),
        }
    }
}

/// Hands out destination paths for one run, refusing duplicates.
///
/// Paths are claimed in discovery order, so when two environments map to
/// the same archive the first one keeps it.
#[derive(Debug)]
pub struct OutputPlanner {
    output_directory: PathBuf,
    final_name: String,
    extension: String,
    claimed: HashMap<PathBuf, Claimant>,
}

impl OutputPlanner {
    /// Create a planner whose outputs must also avoid `artifact`.
    pub fn new(
        output_directory: &Path,
        final_name: impl Into<String>,
        extension: impl Into<String>,
        artifact: &Path,
    ) -> Self {
        let output_directory = normalize(output_directory);
        let mut claimed = HashMap::new();
        claimed.insert(normalize(artifact), Claimant::BaseArtifact);
        Self {
            output_directory,
            final_name: final_name.into(),
            extension: extension.into(),
            claimed,
        }
    }

    /// Reserve the destination for an environment.
    pub fn claim(&mut self, environment: &str) -> crate::Result<PathBuf> {
        let sanitized = sanitize_environment(environment);
        if sanitized.is_empty() {
            return Err(Error::InvalidEnvironmentName {
                name: environment.to_string(),
                reason: "no characters usable in a file name".to_string(),
            });
        }

        let path = self.output_directory.join(archive_file_name(
            &self.final_name,
            environment,
            &self.extension,
        ));

        if let Some(owner) = self.claimed.get(&path) {
            return Err(Error::NamingCollision {
                environment: environment.to_string(),
                other: owner.to_string(),
                path,
            });
        }

        self.claimed
            .insert(path.clone(), Claimant::Environment(environment.to_string()));
        Ok(path)
    }
}

/// Canonicalize what exists so that different spellings of one location
/// compare equal.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = dunce::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            normalize(parent).join(name)
        }
        _ => path.to_owned(),
    }
}
