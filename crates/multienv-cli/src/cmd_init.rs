// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `multienv init` command.

use clap::Args;
use miette::Result;
use std::path::PathBuf;

/// Create a new multienv.yaml file
#[derive(Debug, Args)]
pub struct CmdInit {
    /// Directory to create file in
    #[clap(default_value = ".")]
    path: PathBuf,

    /// Shared overlay directory under the source root
    #[clap(long = "common-dir")]
    common_dir: Option<String>,

    /// Environment to exclude
    #[clap(long = "exclude")]
    exclude: Vec<String>,

    /// Template to use: minimal, standard
    #[clap(long, default_value = "standard")]
    template: String,

    /// Also create the environments source directory
    #[clap(long)]
    create_source: bool,
}

impl CmdInit {
    pub async fn run(&mut self) -> Result<i32> {
        let config_path = self.path.join(multienv::CONFIG_FILENAME);

        // Check if file already exists
        if config_path.exists() {
            return Err(miette::miette!(
                "{} already exists at {:?}",
                multienv::CONFIG_FILENAME,
                config_path
            ));
        }

        let content = match self.template.as_str() {
            "minimal" => self.generate_minimal_template(),
            _ => self.generate_standard_template(),
        };

        std::fs::write(&config_path, content).map_err(|e| {
            miette::miette!("Failed to write {}: {}", multienv::CONFIG_FILENAME, e)
        })?;

        if self.create_source {
            let defaults = multienv::MultiEnvConfig::default();
            let source = self.path.join(&defaults.source_directory);
            std::fs::create_dir_all(&source)
                .map_err(|e| miette::miette!("Failed to create {:?}: {}", source, e))?;
            if let Some(common) = &self.common_dir {
                let common = source.join(common);
                std::fs::create_dir_all(&common)
                    .map_err(|e| miette::miette!("Failed to create {:?}: {}", common, e))?;
            }
        }

        println!("Created {} at {:?}", multienv::CONFIG_FILENAME, config_path);
        println!();
        println!("Next steps:");
        println!("  1. Add one directory per environment under src/main/environments");
        println!("  2. Run 'multienv show' to preview the environments");
        println!("  3. Run 'multienv run --artifact <archive>' to build them");

        Ok(0)
    }

    fn common_line(&self) -> String {
        match &self.common_dir {
            Some(common) => format!("common_dir: {common}\n"),
            None => "# common_dir: common\n".to_string(),
        }
    }

    fn exclude_section(&self) -> String {
        if self.exclude.is_empty() {
            "# exclude_environments:\n\
            #   - local\n\
            #   - \"tmp-*\"\n"
                .to_string()
        } else {
            format!(
                "exclude_environments:\n{}\n",
                self.exclude
                    .iter()
                    .map(|e| format!("  - {:?}", e))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        }
    }

    fn generate_minimal_template(&self) -> String {
        format!(
            "api: multienv/v0\n\
            {}",
            self.common_line()
        )
    }

    fn generate_standard_template(&self) -> String {
        format!(
            "# multienv configuration\n\
            \n\
            api: multienv/v0\n\
            \n\
            # One subdirectory per environment\n\
            source_directory: src/main/environments\n\
            \n\
            # Files shared by every environment, layered under each one\n\
            {}\
            \n\
            # Environment names or glob patterns to leave out\n\
            {}\
            \n\
            # Base name of the produced archives (default: artifact file stem)\n\
            # final_name: my-app-1.0\n\
            \n\
            # Where archives and scratch data are written\n\
            output_directory: target\n\
            work_directory: target/multienv\n\
            \n\
            # Substituted for ${{name}} and @name@ in filtered resources\n\
            # filter_tokens:\n\
            #   db.host: localhost\n\
            \n\
            # Per-environment overrides\n\
            # environments:\n\
            #   prod:\n\
            #     filter_tokens:\n\
            #       db.host: db.prod.internal\n\
            #   legacy:\n\
            #     skip: true\n",
            self.common_line(),
            self.exclude_section(),
        )
    }
}
