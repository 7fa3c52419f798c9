// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Discovery of environment directories under a source root.

use std::path::Path;

#[cfg(test)]
#[path = "./discovery_test.rs"]
mod discovery_test;

/// Discover candidate environment names.
///
/// Returns the names of the immediate subdirectories of `root`, sorted
/// lexicographically so that runs over the same tree are reproducible.
/// Plain files are ignored. A missing root yields an empty list rather
/// than an error; names are not validated here.
pub fn discover_environments<P: AsRef<Path>>(root: P) -> crate::Result<Vec<String>> {
    let root = root.as_ref();
    if !root.is_dir() {
        tracing::debug!(root = %root.display(), "environment root does not exist");
        return Ok(Vec::new());
    }

    let read_failed = |error| crate::Error::ReadFailed {
        path: root.to_path_buf(),
        error,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(root).map_err(read_failed)? {
        let entry = entry.map_err(read_failed)?;
        // follow symlinks so linked environment directories count
        if !entry.path().is_dir() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }

    names.sort();
    tracing::debug!(root = %root.display(), count = names.len(), "discovered environments");
    Ok(names)
}
