// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Read-only snapshots of a directory's files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

#[cfg(test)]
#[path = "./tree_test.rs"]
mod tree_test;

/// One entry of a [`FileTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    Directory,
    /// A regular file and the on-disk location of its content.
    File(PathBuf),
}

/// A rooted set of relative paths.
///
/// Paths use `/` as separator and never start with one. File contents are
/// not held in memory; they are read from disk when an archive is
/// written, so a file that disappears after the snapshot surfaces as an
/// error at that point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    root: PathBuf,
    entries: BTreeMap<String, TreeEntry>,
}

impl FileTree {
    /// Snapshot every file and directory below `root`.
    ///
    /// Symlinks are followed. A missing root yields an empty tree.
    pub fn from_dir<P: AsRef<Path>>(root: P) -> std::io::Result<Self> {
        let root = root.as_ref();
        let mut entries = BTreeMap::new();
        if !root.exists() {
            return Ok(Self {
                root: root.to_owned(),
                entries,
            });
        }

        for entry in WalkDir::new(root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(std::io::Error::other)?;
            let key = relative_key(relative)?;
            if entry.file_type().is_dir() {
                entries.insert(key, TreeEntry::Directory);
            } else {
                entries.insert(key, TreeEntry::File(entry.path().to_owned()));
            }
        }

        Ok(Self {
            root: root.to_owned(),
            entries,
        })
    }

    /// Build a tree from already-known entries.
    pub fn from_entries<P: Into<PathBuf>>(root: P, entries: BTreeMap<String, TreeEntry>) -> Self {
        Self {
            root: root.into(),
            entries,
        }
    }

    /// Directory this tree was read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All entries in path order.
    pub fn entries(&self) -> &BTreeMap<String, TreeEntry> {
        &self.entries
    }

    /// Files in path order, with their content location.
    pub fn files(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().filter_map(|(k, v)| match v {
            TreeEntry::File(source) => Some((k.as_str(), source.as_path())),
            TreeEntry::Directory => None,
        })
    }

    /// Directories in path order.
    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, v)| matches!(v, TreeEntry::Directory))
            .map(|(k, _)| k.as_str())
    }

    pub fn get(&self, path: &str) -> Option<&TreeEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Convert a relative filesystem path to a `/`-separated archive key.
fn relative_key(relative: &Path) -> std::io::Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            std::path::Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("path {relative:?} is not valid UTF-8"),
                    )
                })?;
                parts.push(part);
            }
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unexpected component in {relative:?}"),
                ));
            }
        }
    }
    Ok(parts.join("/"))
}
