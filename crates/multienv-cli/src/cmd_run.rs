// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `multienv run` command.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use miette::Result;
use multienv::EnvironmentOutcome;

/// Build one archive per environment
#[derive(Debug, Args)]
pub struct CmdRun {
    #[clap(flatten)]
    config: crate::ConfigFlags,

    /// Main artifact produced by the build
    #[clap(short = 'a', long)]
    artifact: Option<PathBuf>,

    /// Additional artifact attached to the build (repeatable)
    #[clap(long = "attached")]
    attached: Vec<PathBuf>,

    /// Maximum number of environments processed at once
    #[clap(short = 'j', long, env = "MULTIENV_JOBS")]
    jobs: Option<usize>,

    /// Bypass processing entirely
    #[clap(long, env = "MULTIENV_SKIP")]
    skip: bool,

    /// Write a manifest of the produced archives to PATH
    #[clap(short = 'm', long)]
    manifest: Option<PathBuf>,
}

impl CmdRun {
    pub async fn run(&mut self) -> Result<i32> {
        let mut config = self.config.load()?;
        if self.jobs.is_some() {
            config.jobs = self.jobs;
        }
        config.skip |= self.skip;

        let pipeline = multienv::Pipeline::new(config)?;
        let artifacts = multienv::ArtifactSource {
            main: self.artifact.clone(),
            attached: self.attached.clone(),
        };

        let report = pipeline.run(&artifacts).await?;

        if report.skipped {
            println!("{}", "Skipped multienv processing".dimmed());
            return Ok(0);
        }
        if report.environments.is_empty() {
            println!(
                "No environments found under {}",
                pipeline.source_directory().display()
            );
            return Ok(0);
        }

        println!("{}", "Environments:".bold());
        println!();
        for env in &report.environments {
            match &env.outcome {
                EnvironmentOutcome::Attached(path) => {
                    println!(
                        "  {} {} -> {}",
                        "✓".green(),
                        env.name.cyan(),
                        path.display()
                    );
                }
                EnvironmentOutcome::Excluded => {
                    println!("  - {} {}", env.name, "(excluded)".dimmed());
                }
                EnvironmentOutcome::Skipped => {
                    println!("  - {} {}", env.name, "(skipped)".dimmed());
                }
                EnvironmentOutcome::Invalid(err) => {
                    println!("  ! {:?} {}", env.name, err.to_string().yellow());
                }
                EnvironmentOutcome::Failed(err) => {
                    println!("  {} {} {}", "✗".red(), env.name.cyan(), err.to_string().red());
                }
            }
        }

        let attached = report.attached().count();
        let failed = report.failures().count();
        println!();
        println!("Total: {attached} archive(s), {failed} failure(s)");

        if let Some(path) = &self.manifest {
            let manifest = multienv::ArtifactManifest::from_report(&report)?;
            manifest.save(path)?;
            println!("Wrote manifest to {:?}", path);
        }

        if report.is_success() {
            Ok(0)
        } else {
            eprintln!("Error: {failed} environment(s) failed");
            Ok(1)
        }
    }
}
