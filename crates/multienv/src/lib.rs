// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! multienv - Per-Environment Archive Builder
//!
//! This crate derives one archive per deployment environment from a single
//! built artifact by overlaying environment-specific resources on top of it.
//!
//! # Overview
//!
//! Environments are the immediate subdirectories of a source root. The base
//! artifact is extracted once, each environment's overlay is resource
//! filtered on its own, and every output is composed with the precedence
//! base < common < environment. Outputs are named
//! `<final_name>-<environment>.<ext>` in the output directory.
//!
//! # Example
//!
//! ```yaml
//! # multienv.yaml
//! api: multienv/v0
//!
//! source_directory: src/main/environments
//! common_dir: common
//! exclude_environments:
//!   - local
//!   - "tmp-*"
//!
//! filter_tokens:
//!   db.host: localhost
//!
//! environments:
//!   prod:
//!     filter_tokens:
//!       db.host: db.prod.internal
//! ```

pub mod codec;
pub mod compose;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod filter;
pub mod naming;
pub mod pipeline;
pub mod report;
pub mod tree;
pub mod validate;

pub use codec::{archive_extension, Codec, FormatRegistry, DEFAULT_REGISTRY};
pub use compose::{compose_archive, LayerKind, LayerStack, MergedTree};
pub use config::{ApiVersion, EnvironmentOverrides, MultiEnvConfig};
pub use discovery::discover_environments;
pub use error::{Error, Result};
pub use extract::{extract_base, Artifact, ArtifactSource};
pub use filter::{filter_directory, FilterRules};
pub use naming::{archive_file_name, OutputPlanner};
pub use pipeline::{
    Discovered,
    Disposition,
    EnvironmentOutcome,
    EnvironmentReport,
    Pipeline,
    RunReport,
};
pub use report::{ArtifactManifest, ManifestChange, ManifestChangeKind};
pub use tree::{FileTree, TreeEntry};
pub use validate::{validate_environment_name, validate_environments, ExclusionPolicy};

/// Well-known filename for the configuration.
pub const CONFIG_FILENAME: &str = "multienv.yaml";

/// Well-known filename for the artifact manifest.
pub const MANIFEST_FILENAME: &str = "multienv.manifest.yaml";
