// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `multienv show` command.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use miette::Result;
use multienv::Disposition;

/// List discovered environments and their planned outputs
#[derive(Debug, Args)]
pub struct CmdShow {
    #[clap(flatten)]
    config: crate::ConfigFlags,

    /// Main artifact, used to plan output names
    #[clap(short = 'a', long)]
    artifact: Option<PathBuf>,

    /// Additional artifact attached to the build (repeatable)
    #[clap(long = "attached")]
    attached: Vec<PathBuf>,

    /// Print the effective configuration as YAML instead
    #[clap(long)]
    resolved: bool,
}

impl CmdShow {
    pub async fn run(&mut self) -> Result<i32> {
        let config = self.config.load()?;
        let pipeline = multienv::Pipeline::new(config)?;

        if self.resolved {
            let yaml = serde_yaml::to_string(pipeline.config())
                .map_err(|e| miette::miette!("Failed to serialize configuration: {e}"))?;
            print!("{yaml}");
            return Ok(0);
        }

        let mut planner = if self.artifact.is_some() || !self.attached.is_empty() {
            let artifacts = multienv::ArtifactSource {
                main: self.artifact.clone(),
                attached: self.attached.clone(),
            };
            let artifact = artifacts.select(pipeline.config().format.as_deref())?;
            Some(pipeline.planner(&artifact))
        } else {
            None
        };

        let discovered = pipeline.discover()?;

        println!(
            "{} {}",
            "Source directory:".bold(),
            pipeline.source_directory().display()
        );
        if let Some(common) = &pipeline.config().common_dir {
            println!("{} {}", "Common overlay:".bold(), common.cyan());
        }
        println!();
        println!("{}", "Environments:".bold());
        println!();

        if discovered.is_empty() {
            println!("  {}", "(no environments)".dimmed());
        }

        for name in &discovered.valid {
            match pipeline.disposition(name) {
                Disposition::Excluded => {
                    println!("  - {} {}", name, "(excluded)".dimmed());
                }
                Disposition::Skipped => {
                    println!("  - {} {}", name, "(skipped)".dimmed());
                }
                Disposition::Process => match planner.as_mut().map(|p| p.claim(name)) {
                    None => println!("  {} {}", "✓".green(), name.cyan()),
                    Some(Ok(path)) => {
                        println!("  {} {} -> {}", "✓".green(), name.cyan(), path.display())
                    }
                    Some(Err(err)) => {
                        println!("  {} {} {}", "✗".red(), name.cyan(), err.to_string().red())
                    }
                },
            }
        }
        for (name, err) in &discovered.invalid {
            println!("  ! {:?} {}", name, err.to_string().yellow());
        }

        println!();
        println!(
            "Total: {} environment(s), {} invalid",
            discovered.valid.len(),
            discovered.invalid.len()
        );

        Ok(0)
    }
}
