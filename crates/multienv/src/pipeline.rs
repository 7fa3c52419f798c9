// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Orchestration of a run: discovery, validation, extraction and the
//! per-environment fan-out.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::codec::{Codec, FormatRegistry, DEFAULT_REGISTRY};
use crate::compose::{compose_archive, LayerStack};
use crate::discovery::discover_environments;
use crate::extract::{extract_base, Artifact, ArtifactSource};
use crate::filter::{filter_directory, FilterRules};
use crate::naming::OutputPlanner;
use crate::tree::FileTree;
use crate::validate::{validate_environments, ExclusionPolicy};
use crate::{Error, MultiEnvConfig};

#[cfg(test)]
#[path = "./pipeline_test.rs"]
mod pipeline_test;

/// What a run will do with one valid environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Process,
    Excluded,
    Skipped,
}

/// Terminal state of one environment.
#[derive(Debug)]
pub enum EnvironmentOutcome {
    /// An archive was written and is ready for registration.
    Attached(PathBuf),
    Excluded,
    Skipped,
    /// The name was rejected by validation.
    Invalid(Error),
    Failed(Error),
}

/// One environment's result.
#[derive(Debug)]
pub struct EnvironmentReport {
    pub name: String,
    pub outcome: EnvironmentOutcome,
}

/// Environments found under the source root, split by validity.
#[derive(Debug, Default)]
pub struct Discovered {
    pub valid: Vec<String>,
    pub invalid: Vec<(String, Error)>,
}

impl Discovered {
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty() && self.invalid.is_empty()
    }
}

/// Union of the per-environment outcomes of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// The whole run was bypassed by configuration.
    pub skipped: bool,
    /// The base artifact, once one was selected.
    pub artifact: Option<Artifact>,
    /// Outcomes in discovery order.
    pub environments: Vec<EnvironmentReport>,
}

impl RunReport {
    /// True unless some environment failed.
    ///
    /// Invalid, excluded and skipped environments do not count as failures.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Archives produced, with their environment label.
    pub fn attached(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.environments.iter().filter_map(|env| match &env.outcome {
            EnvironmentOutcome::Attached(path) => Some((env.name.as_str(), path.as_path())),
            _ => None,
        })
    }

    /// Environments that failed, with the reason.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.environments.iter().filter_map(|env| match &env.outcome {
            EnvironmentOutcome::Failed(err) => Some((env.name.as_str(), err)),
            _ => None,
        })
    }

    pub fn outcome(&self, environment: &str) -> Option<&EnvironmentOutcome> {
        self.environments
            .iter()
            .find(|env| env.name == environment)
            .map(|env| &env.outcome)
    }
}

/// Everything one environment's blocking work needs, owned so it can move
/// to a worker thread.
struct EnvironmentJob {
    name: String,
    source: PathBuf,
    staging: PathBuf,
    destination: PathBuf,
    rules: FilterRules,
    base: Arc<FileTree>,
    common: Option<Arc<FileTree>>,
    codec: Codec,
}

impl EnvironmentJob {
    /// Build the environment's archive. On failure no archive is left at
    /// the destination, including one written by an earlier run.
    fn process(self) -> crate::Result<PathBuf> {
        match self.compose() {
            Ok(()) => Ok(self.destination),
            Err(err) => {
                self.discard_stale_output();
                Err(err)
            }
        }
    }

    fn compose(&self) -> crate::Result<()> {
        tracing::debug!(environment = %self.name, "filtering");
        let overlay = filter_directory(&self.source, &self.staging, &self.rules)?;

        tracing::debug!(environment = %self.name, files = overlay.len(), "composing");
        let stack = LayerStack::new(self.base.clone(), self.common.clone(), overlay);
        compose_archive(&stack, &self.destination, &self.codec)?;

        tracing::debug!(environment = %self.name, "composed");
        Ok(())
    }

    fn discard_stale_output(&self) {
        match std::fs::remove_file(&self.destination) {
            Ok(()) => tracing::debug!(
                environment = %self.name,
                "removed stale archive {}",
                self.destination.display()
            ),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                environment = %self.name,
                "failed to remove stale archive {}: {err}",
                self.destination.display()
            ),
        }
    }
}

/// A configured run.
#[derive(Debug)]
pub struct Pipeline {
    config: MultiEnvConfig,
    exclusion: ExclusionPolicy,
    registry: FormatRegistry,
    source_directory: PathBuf,
    output_directory: PathBuf,
    work_directory: PathBuf,
    jobs: usize,
}

fn join_error(err: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(err))
}

impl Pipeline {
    /// Prepare a run, resolving configured paths against the config's
    /// base directory.
    pub fn new(config: MultiEnvConfig) -> crate::Result<Self> {
        let exclusion = ExclusionPolicy::new(&config.exclude_environments)?;
        let jobs = config
            .jobs
            .filter(|jobs| *jobs > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(usize::from))
            .unwrap_or(1)
            .min(Semaphore::MAX_PERMITS);

        Ok(Self {
            source_directory: config.resolve_path(&config.source_directory),
            output_directory: config.resolve_path(&config.output_directory),
            work_directory: config.resolve_path(&config.work_directory),
            registry: DEFAULT_REGISTRY.clone(),
            exclusion,
            jobs,
            config,
        })
    }

    /// Use a custom format registry instead of the built-in one.
    pub fn with_registry(mut self, registry: FormatRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &MultiEnvConfig {
        &self.config
    }

    pub fn source_directory(&self) -> &Path {
        &self.source_directory
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn exclusion(&self) -> &ExclusionPolicy {
        &self.exclusion
    }

    /// Name of the top-level directory holding the common overlay.
    fn common_root_name(&self) -> Option<String> {
        let common = self.config.common_dir.as_deref()?.trim();
        Path::new(common).components().find_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
    }

    /// Discover and validate environment names.
    ///
    /// The common overlay's directory is not an environment and is left out.
    pub fn discover(&self) -> crate::Result<Discovered> {
        let mut names = discover_environments(&self.source_directory)?;
        if let Some(common) = self.common_root_name() {
            names.retain(|name| *name != common);
        }
        let (valid, invalid) = validate_environments(&names);
        Ok(Discovered { valid, invalid })
    }

    /// Whether an environment is excluded, skipped or processed.
    pub fn disposition(&self, environment: &str) -> Disposition {
        if self.exclusion.is_excluded(environment) {
            Disposition::Excluded
        } else if self.config.is_environment_skipped(environment) {
            Disposition::Skipped
        } else {
            Disposition::Process
        }
    }

    /// Output planner for archives derived from `artifact`.
    pub fn planner(&self, artifact: &Artifact) -> OutputPlanner {
        let final_name = self
            .config
            .final_name
            .clone()
            .unwrap_or_else(|| artifact.stem());
        OutputPlanner::new(
            &self.output_directory,
            final_name,
            artifact.format.clone(),
            &artifact.path,
        )
    }

    /// Filter the common overlay once for the whole run.
    async fn prepare_common(&self) -> crate::Result<Option<Arc<FileTree>>> {
        let Some(common_dir) = self
            .config
            .common_dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
        else {
            return Ok(None);
        };

        let source = self.source_directory.join(common_dir);
        if !source.is_dir() {
            tracing::warn!(
                "Common directory {} does not exist, continuing without it.",
                source.display()
            );
            return Ok(None);
        }

        let staging = self.work_directory.join("common");
        let rules = FilterRules::new(
            self.config.filter_tokens.clone(),
            &self.config.non_filtered_extensions,
        );
        let tree = tokio::task::spawn_blocking(move || filter_directory(&source, &staging, &rules))
            .await
            .map_err(join_error)??;
        Ok(Some(Arc::new(tree)))
    }

    /// Execute the run.
    ///
    /// Run-level problems (artifact selection, extraction, the common
    /// overlay) return `Err` and produce nothing. Failures of individual
    /// environments are recorded in the report while the others proceed.
    pub async fn run(&self, artifacts: &ArtifactSource) -> crate::Result<RunReport> {
        let mut report = RunReport::default();

        if self.config.skip {
            tracing::info!("Skipping multienv processing.");
            report.skipped = true;
            return Ok(report);
        }

        let discovered = self.discover()?;
        if discovered.is_empty() {
            tracing::warn!("No environment directories found.");
            return Ok(report);
        }

        tracing::info!("Found environments: {}", discovered.valid.join(", "));
        tracing::info!("Excluded environments: {:?}", self.exclusion.entries());

        let Discovered { valid, invalid } = discovered;
        report.environments = invalid
            .into_iter()
            .map(|(name, err)| EnvironmentReport {
                name,
                outcome: EnvironmentOutcome::Invalid(err),
            })
            .collect();

        if valid.is_empty() {
            tracing::warn!("No valid environment directories found.");
            return Ok(report);
        }

        let artifact = artifacts.select(self.config.format.as_deref())?;
        let codec = *self.registry.get(&artifact.format)?;

        // every environment composes against this, so it must finish first
        let base = {
            let artifact = artifact.clone();
            let scratch = self.work_directory.join("unpack");
            let registry = self.registry.clone();
            tokio::task::spawn_blocking(move || extract_base(&artifact, &scratch, &registry))
                .await
                .map_err(join_error)??
        };
        let common = self.prepare_common().await?;

        std::fs::create_dir_all(&self.output_directory)?;
        let mut planner = self.planner(&artifact);

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut tasks = JoinSet::new();

        for name in valid {
            let settled = |outcome| EnvironmentReport {
                name: name.clone(),
                outcome,
            };

            match self.disposition(&name) {
                Disposition::Excluded => {
                    tracing::info!("Environment '{name}' is excluded.");
                    report.environments.push(settled(EnvironmentOutcome::Excluded));
                    continue;
                }
                Disposition::Skipped => {
                    tracing::info!("Environment '{name}' is skipped.");
                    report.environments.push(settled(EnvironmentOutcome::Skipped));
                    continue;
                }
                Disposition::Process => {}
            }

            let destination = match planner.claim(&name) {
                Ok(destination) => destination,
                Err(err) => {
                    tracing::error!("Environment '{name}' failed: {err}");
                    report.environments.push(settled(EnvironmentOutcome::Failed(err)));
                    continue;
                }
            };

            let job = EnvironmentJob {
                source: self.source_directory.join(&name),
                staging: self.work_directory.join("environments").join(&name),
                destination,
                rules: FilterRules::new(
                    self.config.tokens_for(&name),
                    &self.config.non_filtered_extensions,
                ),
                base: Arc::clone(&base),
                common: common.clone(),
                codec,
                name: name.clone(),
            };
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = tokio::task::spawn_blocking(move || job.process()).await;
                (name, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (name, result) = joined.map_err(join_error)?;
            let outcome = match result.map_err(join_error).and_then(|r| r) {
                Ok(path) => {
                    tracing::info!("Environment '{name}' attached as {}", path.display());
                    EnvironmentOutcome::Attached(path)
                }
                Err(err) => {
                    tracing::error!("Environment '{name}' failed: {err}");
                    EnvironmentOutcome::Failed(err)
                }
            };
            report.environments.push(EnvironmentReport { name, outcome });
        }

        // discovery order is lexicographic, so this restores it
        report.environments.sort_by(|a, b| a.name.cmp(&b.name));
        report.artifact = Some(artifact);
        Ok(report)
    }
}
