// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! multienv - Per-Environment Archive Builder CLI

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;

mod cmd_check;
mod cmd_init;
mod cmd_run;
mod cmd_show;

use cmd_check::CmdCheck;
use cmd_init::CmdInit;
use cmd_run::CmdRun;
use cmd_show::CmdShow;


#[derive(Parser)]
#[clap(
    name = "multienv",
    about = "Per-Environment Archive Builder",
    version,
    long_about = "Derive one archive per deployment environment from a single built artifact"
)]
struct Opt {
    #[clap(flatten)]
    logging: Logging,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Parser)]
struct Logging {
    /// Increase verbosity (-v, -vv, -vvv)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[clap(short, long, global = true)]
    quiet: bool,
}

/// Configuration file selection and command-line overrides.
#[derive(Parser, Clone, Debug, Default)]
pub struct ConfigFlags {
    /// Configuration file (defaults to ./multienv.yaml when present)
    #[clap(short = 'f', long = "file", env = "MULTIENV_CONFIG")]
    pub file: Option<PathBuf>,

    /// Root holding one directory per environment
    #[clap(long = "source-dir", env = "MULTIENV_SOURCE_DIR")]
    pub source_directory: Option<PathBuf>,

    /// Shared overlay directory under the source root
    #[clap(long = "common-dir", env = "MULTIENV_COMMON_DIR")]
    pub common_dir: Option<String>,

    /// Environment name or glob pattern to exclude (repeatable)
    #[clap(
        short = 'x',
        long = "exclude",
        env = "MULTIENV_EXCLUDE",
        value_delimiter = ','
    )]
    pub exclude: Vec<String>,

    /// Base name of the produced archives
    #[clap(long = "final-name")]
    pub final_name: Option<String>,

    /// Directory the archives are written to
    #[clap(short = 'o', long = "output-dir", env = "MULTIENV_OUTPUT_DIR")]
    pub output_directory: Option<PathBuf>,

    /// Filter token as KEY=VALUE (repeatable)
    #[clap(short = 't', long = "token", value_parser = parse_token)]
    pub tokens: Vec<(String, String)>,

    /// Archive format, overriding detection from the file name
    #[clap(long)]
    pub format: Option<String>,
}

fn parse_token(token: &str) -> std::result::Result<(String, String), String> {
    match token.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{token}'")),
    }
}

impl ConfigFlags {
    /// Load the configuration and layer the command-line overrides on top.
    pub fn load(&self) -> Result<multienv::MultiEnvConfig> {
        let default_path = PathBuf::from(multienv::CONFIG_FILENAME);
        let mut config = match &self.file {
            Some(path) => multienv::MultiEnvConfig::load(path)?,
            None if default_path.is_file() => multienv::MultiEnvConfig::load(&default_path)?,
            None => {
                tracing::debug!("No {} found, using defaults", multienv::CONFIG_FILENAME);
                multienv::MultiEnvConfig::default()
            }
        };

        if let Some(dir) = &self.source_directory {
            config.source_directory = dir.clone();
        }
        if let Some(common) = &self.common_dir {
            config.common_dir = Some(common.clone());
        }
        config.exclude_environments.extend(self.exclude.iter().cloned());
        if let Some(name) = &self.final_name {
            config.final_name = Some(name.clone());
        }
        if let Some(dir) = &self.output_directory {
            config.output_directory = dir.clone();
        }
        config.filter_tokens.extend(self.tokens.iter().cloned());
        if let Some(format) = &self.format {
            config.format = Some(format.clone());
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create a new multienv.yaml file
    Init(CmdInit),

    /// List discovered environments and their planned outputs
    Show(CmdShow),

    /// Build one archive per environment
    Run(CmdRun),

    /// Verify archives match a manifest
    Check(CmdCheck),
}

impl Opt {
    async fn run(self) -> Result<i32> {
        // Setup logging
        let log_level = match (self.logging.quiet, self.logging.verbose) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::WARN,
            (false, 1) => tracing::Level::INFO,
            (false, 2) => tracing::Level::DEBUG,
            (false, _) => tracing::Level::TRACE,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .init();

        // Dispatch to command
        match self.cmd {
            Command::Init(mut cmd) => cmd.run().await,
            Command::Show(mut cmd) => cmd.run().await,
            Command::Run(mut cmd) => cmd.run().await,
            Command::Check(mut cmd) => cmd.run().await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    let code = opt.run().await?;
    std::process::exit(code);
}
