// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Layer composition: merging the base, common and environment trees into
//! one archive.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec::Codec;
use crate::tree::{FileTree, TreeEntry};
use crate::Error;

#[cfg(test)]
#[path = "./compose_test.rs"]
mod compose_test;

/// Which layer of a stack an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerKind {
    Base,
    Common,
    Environment,
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerKind::Base => f.write_str("base"),
            LayerKind::Common => f.write_str("common"),
            LayerKind::Environment => f.write_str("environment"),
        }
    }
}

/// One entry of a [`MergedTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergedEntry {
    Directory,
    File { source: PathBuf, layer: LayerKind },
}

/// Result of overlaying the layers of a [`LayerStack`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedTree {
    entries: BTreeMap<String, MergedEntry>,
}

impl MergedTree {
    /// All entries in path order; every parent directory is present.
    pub fn entries(&self) -> &BTreeMap<String, MergedEntry> {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&MergedEntry> {
        self.entries.get(path)
    }

    /// Files in path order with their content location and origin.
    pub fn files(&self) -> impl Iterator<Item = (&str, &Path, LayerKind)> {
        self.entries.iter().filter_map(|(k, v)| match v {
            MergedEntry::File { source, layer } => Some((k.as_str(), source.as_path(), *layer)),
            MergedEntry::Directory => None,
        })
    }

    /// The layer that supplied the file at `path`.
    pub fn origin(&self, path: &str) -> Option<LayerKind> {
        match self.entries.get(path)? {
            MergedEntry::File { layer, .. } => Some(*layer),
            MergedEntry::Directory => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The ordered layers for one environment: base, optional common, then the
/// environment's own filtered overlay.
///
/// Base and common are shared with every other environment of the run and
/// are only ever read.
#[derive(Debug, Clone)]
pub struct LayerStack {
    base: Arc<FileTree>,
    common: Option<Arc<FileTree>>,
    environment: FileTree,
}

impl LayerStack {
    pub fn new(base: Arc<FileTree>, common: Option<Arc<FileTree>>, environment: FileTree) -> Self {
        Self {
            base,
            common,
            environment,
        }
    }

    /// Layers in precedence order, lowest first.
    pub fn layers(&self) -> Vec<(LayerKind, &FileTree)> {
        let mut layers = vec![(LayerKind::Base, self.base.as_ref())];
        if let Some(common) = &self.common {
            layers.push((LayerKind::Common, common.as_ref()));
        }
        layers.push((LayerKind::Environment, &self.environment));
        layers
    }

    /// Overlay the layers in precedence order.
    ///
    /// A file in a later layer replaces the file at the same path from an
    /// earlier one. Nothing is ever removed: paths absent from a later
    /// layer keep their earlier content. A path that is a file in one
    /// layer and a directory in another fails with [`Error::PathConflict`].
    pub fn merge(&self) -> crate::Result<MergedTree> {
        let mut entries: BTreeMap<String, MergedEntry> = BTreeMap::new();

        for (layer, tree) in self.layers() {
            tracing::trace!(%layer, root = %tree.root().display(), entries = tree.len(), "merging layer");
            for (path, entry) in tree.entries() {
                match (entry, entries.get(path)) {
                    (TreeEntry::Directory, Some(MergedEntry::File { .. }))
                    | (TreeEntry::File(_), Some(MergedEntry::Directory)) => {
                        return Err(Error::PathConflict { path: path.clone() });
                    }
                    (TreeEntry::Directory, _) => {
                        entries.insert(path.clone(), MergedEntry::Directory);
                    }
                    (TreeEntry::File(source), _) => {
                        entries.insert(
                            path.clone(),
                            MergedEntry::File {
                                source: source.clone(),
                                layer,
                            },
                        );
                    }
                }
            }
        }

        // every parent of an entry must be a directory
        let mut parents = Vec::new();
        for path in entries.keys() {
            let mut rest = path.as_str();
            while let Some((parent, _)) = rest.rsplit_once('/') {
                parents.push(parent.to_string());
                rest = parent;
            }
        }
        for parent in parents {
            match entries.get(&parent) {
                Some(MergedEntry::File { .. }) => {
                    return Err(Error::PathConflict { path: parent });
                }
                Some(MergedEntry::Directory) => {}
                None => {
                    entries.insert(parent, MergedEntry::Directory);
                }
            }
        }

        Ok(MergedTree { entries })
    }
}

/// Merge a stack and write it to `dest` with the given codec.
///
/// The archive is written to a temporary file next to `dest` and only
/// moved into place once complete, so a failure never leaves a partial
/// archive at the destination.
pub fn compose_archive(stack: &LayerStack, dest: &Path, codec: &Codec) -> crate::Result<MergedTree> {
    let merged = stack.merge()?;

    let failed = |error| Error::CompositionFailed {
        path: dest.to_path_buf(),
        error,
    };

    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(failed)?;

    let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(failed)?;
    (codec.compress)(&merged, staged.as_file_mut()).map_err(failed)?;
    staged.as_file().sync_all().map_err(failed)?;
    staged.persist(dest).map_err(|e| failed(e.error))?;

    tracing::debug!(dest = %dest.display(), entries = merged.len(), "composed archive");
    Ok(merged)
}
