// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for multienv operations.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience Result type with multienv Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during multienv operations.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Failed to read file or directory
    #[error("Failed to read {path:?}")]
    #[diagnostic(code(multienv::read_failed))]
    ReadFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Invalid YAML in configuration file
    #[error("Invalid multienv configuration: {error}")]
    #[diagnostic(
        code(multienv::invalid_yaml),
        help("Check YAML syntax and ensure 'api: multienv/v0' is present")
    )]
    InvalidYaml {
        #[source]
        error: serde_yaml::Error,
        yaml_content: String,
    },

    /// Neither a main nor an attached artifact is available
    #[error("No artifact available for processing")]
    #[diagnostic(
        code(multienv::no_artifact),
        help("Pass the built archive with --artifact or --attached")
    )]
    NoArtifact,

    /// Several attached artifacts and no main artifact file
    #[error("Cannot decide which attached artifact to use: {0:?}")]
    #[diagnostic(
        code(multienv::ambiguous_artifact),
        help("Pass the archive to use with --artifact")
    )]
    AmbiguousArtifact(Vec<PathBuf>),

    /// No codec registered for the archive format
    #[error("Unsupported archive format '{0}'")]
    #[diagnostic(
        code(multienv::unsupported_format),
        help("Supported formats are zip, jar, war, ear, tar, tar.gz and tgz")
    )]
    UnsupportedFormat(String),

    /// The base artifact could not be extracted
    #[error("Error unpacking {path:?} to {dest:?}")]
    #[diagnostic(code(multienv::extraction_failed))]
    ExtractionFailed {
        path: PathBuf,
        dest: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Environment name is blank or malformed
    #[error("Invalid environment name {name:?}: {reason}")]
    #[diagnostic(code(multienv::invalid_environment_name))]
    InvalidEnvironmentName { name: String, reason: String },

    /// Exclusion entry is not a valid glob pattern
    #[error("Invalid exclude pattern {pattern:?}")]
    #[diagnostic(code(multienv::invalid_exclude_pattern))]
    InvalidExcludePattern {
        pattern: String,
        #[source]
        error: glob::PatternError,
    },

    /// Resource filtering of one file failed
    #[error("Failed to filter {path:?}")]
    #[diagnostic(code(multienv::filter_failed))]
    FilterFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Writing the composed archive failed
    #[error("Failed to compose archive {path:?}")]
    #[diagnostic(code(multienv::composition_failed))]
    CompositionFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// A file and a directory occupy the same path across layers
    #[error("Path {path:?} is a file in one layer and a directory in another")]
    #[diagnostic(
        code(multienv::path_conflict),
        help("Rename the overlay file or directory so it no longer shadows the other kind")
    )]
    PathConflict { path: String },

    /// Two outputs resolve to the same destination
    #[error("Output {path:?} for environment '{environment}' collides with {other}")]
    #[diagnostic(
        code(multienv::naming_collision),
        help("Rename one of the environment directories so their archive names differ")
    )]
    NamingCollision {
        environment: String,
        path: PathBuf,
        other: String,
    },

    /// IO error passthrough
    #[error(transparent)]
    #[diagnostic(code(multienv::io_error))]
    Io(#[from] std::io::Error),
}
