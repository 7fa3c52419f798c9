// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Verify that produced archives still match their manifest.

use std::path::PathBuf;

use clap::Args;
use miette::Result;

/// Verify archives match a manifest
#[derive(Debug, Args)]
pub struct CmdCheck {
    /// Manifest written by 'multienv run --manifest'
    #[clap(short, long, default_value = multienv::MANIFEST_FILENAME)]
    manifest: PathBuf,

    /// Exit with error on mismatch
    #[clap(long)]
    strict: bool,
}

impl CmdCheck {
    pub async fn run(&mut self) -> Result<i32> {
        if !self.manifest.exists() {
            if self.strict {
                return Err(miette::miette!("No manifest found at {:?}", self.manifest));
            } else {
                println!("Warning: No manifest found");
                return Ok(2);
            }
        }

        let manifest = multienv::ArtifactManifest::load(&self.manifest)?;
        let changes = manifest.verify()?;

        for failed in &manifest.failed {
            println!(
                "Note: environment '{}' failed when the manifest was written: {}",
                failed.environment, failed.reason
            );
        }

        if changes.is_empty() {
            println!("✓ Archives match manifest");
            return Ok(0);
        }

        if self.strict {
            eprintln!("Error: Archives differ from manifest:");
        } else {
            println!("Warning: Archives differ from manifest:");
        }

        for change in &changes {
            match change.kind {
                multienv::ManifestChangeKind::ArchiveChanged => {
                    println!("  - Archive for '{}' changed", change.environment);
                    println!("    Expected: {}", change.expected);
                    if let Some(actual) = &change.actual {
                        println!("    Actual:   {}", actual);
                    }
                }
                multienv::ManifestChangeKind::ArchiveMissing => {
                    println!("  - Archive for '{}' is missing", change.environment);
                }
            }
        }

        if self.strict {
            return Ok(1);
        }

        println!("\nRun 'multienv run --manifest' to rebuild the archives");
        Ok(0)
    }
}
