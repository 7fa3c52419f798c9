// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::io::{Read, Write};

use tempfile::TempDir;

use super::*;

type Files<'a> = &'a [(&'a str, &'a str)];

struct Fixture {
    tmp: TempDir,
    config: MultiEnvConfig,
    artifacts: ArtifactSource,
}

impl Fixture {
    fn new(base: Files<'_>) -> Self {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("target/app.zip");
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        write_zip(&artifact, base);
        std::fs::create_dir_all(tmp.path().join("envs")).unwrap();

        let config = MultiEnvConfig {
            source_directory: tmp.path().join("envs"),
            output_directory: tmp.path().join("target"),
            work_directory: tmp.path().join("target/multienv"),
            ..Default::default()
        };
        let artifacts = ArtifactSource {
            main: Some(artifact),
            attached: Vec::new(),
        };
        Self {
            tmp,
            config,
            artifacts,
        }
    }

    fn overlay(&self, name: &str, files: Files<'_>) -> &Self {
        let dir = self.tmp.path().join("envs").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for (path, content) in files {
            let path = dir.join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        self
    }

    fn output(&self, environment: &str) -> PathBuf {
        self.tmp.path().join(format!("target/app-{environment}.zip"))
    }

    async fn run(&self) -> crate::Result<RunReport> {
        Pipeline::new(self.config.clone())?.run(&self.artifacts).await
    }
}

fn write_zip(path: &Path, files: Files<'_>) {
    let mut writer = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, content) in files {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

fn read_zip(path: &Path) -> BTreeMap<String, String> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut files = BTreeMap::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).unwrap();
        if entry.is_dir() {
            continue;
        }
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        files.insert(entry.name().to_string(), content);
    }
    files
}

#[tokio::test]
async fn test_common_and_environment_overlays() {
    let mut fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.config.common_dir = Some("common".to_string());
    fixture
        .overlay("common", &[("shared.txt", "s")])
        .overlay("prod", &[("app.txt", "prod-v1")])
        .overlay("dev", &[]);

    let report = fixture.run().await.unwrap();

    assert!(report.is_success());
    let prod = read_zip(&fixture.output("prod"));
    assert_eq!(prod["app.txt"], "prod-v1");
    assert_eq!(prod["shared.txt"], "s");
    let dev = read_zip(&fixture.output("dev"));
    assert_eq!(dev["app.txt"], "v1");
    assert_eq!(dev["shared.txt"], "s");

    // the common overlay is not an environment of its own
    assert!(report.outcome("common").is_none());
    assert!(!fixture.output("common").exists());
    let attached: Vec<&str> = report.attached().map(|(name, _)| name).collect();
    assert_eq!(attached, vec!["dev", "prod"]);
}

#[tokio::test]
async fn test_excluded_environment_produces_nothing() {
    let mut fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.config.exclude_environments = vec!["qa".to_string()];
    fixture
        .overlay("dev", &[])
        .overlay("qa", &[("app.txt", "qa")])
        .overlay("prod", &[]);

    let report = fixture.run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.attached().count(), 2);
    assert!(fixture.output("dev").exists());
    assert!(fixture.output("prod").exists());
    assert!(!fixture.output("qa").exists());
    assert!(matches!(report.outcome("qa"), Some(EnvironmentOutcome::Excluded)));
    assert!(!fixture.tmp.path().join("target/multienv/environments/qa").exists());
}

#[tokio::test]
async fn test_no_environments_is_a_successful_no_op() {
    let fixture = Fixture::new(&[("app.txt", "v1")]);
    std::fs::write(fixture.tmp.path().join("envs/not-a-dir.txt"), "x").unwrap();

    let report = fixture.run().await.unwrap();

    assert!(report.is_success());
    assert!(report.environments.is_empty());
    assert!(report.artifact.is_none());
    assert!(!fixture.tmp.path().join("target/multienv").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_one_failing_environment_does_not_stop_the_others() {
    let fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture
        .overlay("dev", &[("a.txt", "dev")])
        .overlay("prod", &[("a.txt", "prod")])
        .overlay("qa", &[]);
    let qa = fixture.tmp.path().join("envs/qa");
    std::os::unix::fs::symlink(qa.join("missing"), qa.join("broken.txt")).unwrap();

    let report = fixture.run().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.attached().count(), 2);
    assert!(fixture.output("dev").exists());
    assert!(fixture.output("prod").exists());
    assert!(!fixture.output("qa").exists());
    let failures: Vec<&str> = report.failures().map(|(name, _)| name).collect();
    assert_eq!(failures, vec!["qa"]);
    assert!(matches!(
        report.outcome("qa"),
        Some(EnvironmentOutcome::Failed(Error::FilterFailed { .. }))
    ));
}

#[tokio::test]
async fn test_ambiguous_artifact_fails_before_extraction() {
    let mut fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.overlay("dev", &[]);
    fixture.artifacts = ArtifactSource {
        main: None,
        attached: vec![
            fixture.tmp.path().join("target/app.zip"),
            fixture.tmp.path().join("target/other.zip"),
        ],
    };

    let result = fixture.run().await;

    assert!(matches!(result, Err(Error::AmbiguousArtifact(_))));
    assert!(!fixture.tmp.path().join("target/multienv").exists());
}

#[tokio::test]
async fn test_unsupported_format_is_run_level() {
    let mut fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.overlay("dev", &[]);
    fixture.config.format = Some("rar".to_string());

    let result = fixture.run().await;

    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    assert!(!fixture.output("dev").exists());
}

#[tokio::test]
async fn test_blank_environment_name_is_skipped() {
    let fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.overlay("  ", &[]).overlay("dev", &[]);

    let report = fixture.run().await.unwrap();

    assert!(report.is_success());
    assert!(matches!(report.outcome("  "), Some(EnvironmentOutcome::Invalid(_))));
    assert!(fixture.output("dev").exists());
}

#[tokio::test]
async fn test_global_skip() {
    let mut fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.config.skip = true;
    fixture.overlay("dev", &[]);

    let report = fixture.run().await.unwrap();

    assert!(report.skipped);
    assert!(report.is_success());
    assert!(!fixture.output("dev").exists());
}

#[tokio::test]
async fn test_per_environment_skip() {
    let mut fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.config.environments.insert(
        "legacy".to_string(),
        crate::config::EnvironmentOverrides {
            skip: true,
            ..Default::default()
        },
    );
    fixture.overlay("dev", &[]).overlay("legacy", &[]);

    let report = fixture.run().await.unwrap();

    assert!(matches!(report.outcome("legacy"), Some(EnvironmentOutcome::Skipped)));
    assert!(!fixture.output("legacy").exists());
    assert!(fixture.output("dev").exists());
}

#[tokio::test]
async fn test_naming_collision_fails_later_environment() {
    let fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.overlay("qa env", &[("x.txt", "first")]).overlay("qaenv", &[("x.txt", "second")]);

    let report = fixture.run().await.unwrap();

    assert!(!report.is_success());
    assert!(matches!(
        report.outcome("qaenv"),
        Some(EnvironmentOutcome::Failed(Error::NamingCollision { .. }))
    ));
    assert_eq!(read_zip(&fixture.output("qaenv"))["x.txt"], "first");
}

#[tokio::test]
async fn test_runs_are_reproducible() {
    let fixture = Fixture::new(&[("app.txt", "v1"), ("lib/a.txt", "a")]);
    fixture.overlay("prod", &[("conf/app.properties", "mode=prod")]);

    fixture.run().await.unwrap();
    let first = std::fs::read(fixture.output("prod")).unwrap();
    fixture.run().await.unwrap();
    let second = std::fs::read(fixture.output("prod")).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_tokens_are_filtered_per_environment() {
    let mut fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.config.common_dir = Some("common".to_string());
    fixture
        .config
        .filter_tokens
        .insert("db.host".to_string(), "localhost".to_string());
    fixture.config.environments.insert(
        "prod".to_string(),
        crate::config::EnvironmentOverrides {
            filter_tokens: [("db.host".to_string(), "db.prod".to_string())].into(),
            ..Default::default()
        },
    );
    fixture
        .overlay("common", &[("common.properties", "host=${db.host}")])
        .overlay("prod", &[("db.properties", "host=${db.host}")])
        .overlay("dev", &[("db.properties", "host=@db.host@")]);

    fixture.run().await.unwrap();

    let prod = read_zip(&fixture.output("prod"));
    assert_eq!(prod["db.properties"], "host=db.prod");
    assert_eq!(prod["common.properties"], "host=localhost");
    assert_eq!(read_zip(&fixture.output("dev"))["db.properties"], "host=localhost");
}

#[tokio::test]
async fn test_single_job_processes_every_environment() {
    let mut fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.config.jobs = Some(1);
    for name in ["a", "b", "c", "d"] {
        fixture.overlay(name, &[("name.txt", name)]);
    }

    let report = fixture.run().await.unwrap();

    let attached: Vec<&str> = report.attached().map(|(name, _)| name).collect();
    assert_eq!(attached, vec!["a", "b", "c", "d"]);
    assert_eq!(read_zip(&fixture.output("c"))["name.txt"], "c");
}

#[tokio::test]
async fn test_final_name_override() {
    let mut fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.config.final_name = Some("shop-1.0".to_string());
    fixture.overlay("dev", &[]);

    fixture.run().await.unwrap();

    assert!(fixture.tmp.path().join("target/shop-1.0-dev.zip").exists());
}

#[tokio::test]
async fn test_oversized_job_count_is_clamped() {
    let mut fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture.config.jobs = Some(usize::MAX);
    fixture.overlay("dev", &[]).overlay("prod", &[]);

    let report = fixture.run().await.unwrap();

    assert!(report.is_success());
    assert!(fixture.output("dev").exists());
    assert!(fixture.output("prod").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_environment_removes_previous_archive() {
    let fixture = Fixture::new(&[("app.txt", "v1")]);
    fixture
        .overlay("dev", &[("a.txt", "dev")])
        .overlay("qa", &[("a.txt", "qa")]);
    fixture.run().await.unwrap();
    assert!(fixture.output("qa").exists());

    let qa = fixture.tmp.path().join("envs/qa");
    std::os::unix::fs::symlink(qa.join("missing"), qa.join("broken.txt")).unwrap();
    let report = fixture.run().await.unwrap();

    assert!(matches!(
        report.outcome("qa"),
        Some(EnvironmentOutcome::Failed(_))
    ));
    assert!(!fixture.output("qa").exists());
    assert_eq!(read_zip(&fixture.output("dev"))["a.txt"], "dev");
}

#[cfg(unix)]
#[tokio::test]
async fn test_executable_bit_survives_tar_gz_base() {
    let mut fixture = Fixture::new(&[]);
    let artifact = fixture.tmp.path().join("target/app.tar.gz");
    {
        let encoder = flate2::write::GzEncoder::new(
            std::fs::File::create(&artifact).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);
        for (path, mode, content) in [
            ("bin/start.sh", 0o755, "#!/bin/sh\n"),
            ("conf/app.properties", 0o644, "x=1\n"),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(mode);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }
    fixture.artifacts.main = Some(artifact);
    fixture.overlay("dev", &[("conf/app.properties", "x=2\n")]);

    let report = fixture.run().await.unwrap();
    assert!(report.is_success());

    let output = fixture.tmp.path().join("target/app-dev.tar.gz");
    let decoder = flate2::read::GzDecoder::new(std::fs::File::open(output).unwrap());
    let mut archive = tar::Archive::new(decoder);
    let modes: BTreeMap<String, u32> = archive
        .entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            (path, entry.header().mode().unwrap())
        })
        .collect();
    assert_eq!(modes["bin/start.sh"], 0o755);
    assert_eq!(modes["conf/app.properties"], 0o644);
}
