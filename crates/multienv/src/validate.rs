// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Validation of discovered environment names and the exclusion policy.

use glob::Pattern;

use crate::Error;

#[cfg(test)]
#[path = "./validate_test.rs"]
mod validate_test;

/// Check a single candidate environment name.
pub fn validate_environment_name(name: &str) -> crate::Result<()> {
    let invalid = |reason: &str| Error::InvalidEnvironmentName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty or blank"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name refers to a relative directory"));
    }
    if name.contains(['/', '\\']) {
        return Err(invalid("name contains a path separator"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("name contains control characters"));
    }
    if name.contains(char::REPLACEMENT_CHARACTER) {
        return Err(invalid("directory name is not valid UTF-8"));
    }
    Ok(())
}

/// Split discovered names into valid ones and rejected ones.
///
/// A bad entry never aborts the run; each rejection is logged and
/// returned alongside the reason so the caller can report it.
pub fn validate_environments(names: &[String]) -> (Vec<String>, Vec<(String, Error)>) {
    let mut valid = Vec::with_capacity(names.len());
    let mut rejected = Vec::new();
    for name in names {
        match validate_environment_name(name) {
            Ok(()) => valid.push(name.clone()),
            Err(err) => {
                tracing::warn!("Skipping environment directory {name:?}: {err}");
                rejected.push((name.clone(), err));
            }
        }
    }
    (valid, rejected)
}

/// Names or glob patterns of environments to skip.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    names: Vec<String>,
    patterns: Vec<Pattern>,
}

impl ExclusionPolicy {
    /// Build a policy from configured entries.
    ///
    /// Entries containing glob metacharacters are compiled as patterns,
    /// everything else is matched literally.
    pub fn new<I, S>(entries: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            if entry.contains(['*', '?', '[']) {
                let pattern =
                    Pattern::new(entry).map_err(|error| Error::InvalidExcludePattern {
                        pattern: entry.to_string(),
                        error,
                    })?;
                policy.patterns.push(pattern);
            } else {
                policy.names.push(entry.to_string());
            }
        }
        Ok(policy)
    }

    /// Check whether an environment is excluded.
    pub fn is_excluded(&self, environment: &str) -> bool {
        self.names.iter().any(|n| n == environment)
            || self.patterns.iter().any(|p| p.matches(environment))
    }

    /// Whether the policy excludes nothing.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.patterns.is_empty()
    }

    /// The configured entries, for logging.
    pub fn entries(&self) -> Vec<String> {
        self.names
            .iter()
            .cloned()
            .chain(self.patterns.iter().map(|p| p.as_str().to_string()))
            .collect()
    }
}
