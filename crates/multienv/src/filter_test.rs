// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use tempfile::TempDir;

use super::*;

fn rules(pairs: &[(&str, &str)]) -> FilterRules {
    let tokens = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    FilterRules::new(tokens, crate::config::DEFAULT_NON_FILTERED_EXTENSIONS)
}

#[rstest]
#[case("url=${db.url}", "url=jdbc:h2:mem")]
#[case("url=@db.url@", "url=jdbc:h2:mem")]
#[case("${db.url}${db.url}", "jdbc:h2:memjdbc:h2:mem")]
#[case("keep ${unknown} and @unknown@", "keep ${unknown} and @unknown@")]
#[case("mail me@example.com or @db.url@", "mail me@example.com or jdbc:h2:mem")]
#[case("unterminated ${db.url", "unterminated ${db.url")]
#[case("cost $5 @ noon", "cost $5 @ noon")]
#[case("", "")]
#[case("${db${db.url}}", "${dbjdbc:h2:mem}")]
#[case("@@db.url@@", "@jdbc:h2:mem@")]
#[case("${ db.url}", "${ db.url}")]
fn test_filter_text(#[case] input: &str, #[case] expected: &str) {
    let rules = rules(&[("db.url", "jdbc:h2:mem")]);
    assert_eq!(rules.filter_text(input), expected);
}

#[rstest]
fn test_substituted_values_are_not_rescanned() {
    let rules = rules(&[("a", "${b}"), ("b", "nope")]);
    assert_eq!(rules.filter_text("${a}"), "${b}");
}

#[rstest]
#[case("config.properties", true)]
#[case("Dockerfile", true)]
#[case("logo.PNG", false)]
#[case("lib/driver.jar", false)]
fn test_is_filtered_by_extension(#[case] path: &str, #[case] expected: bool) {
    let rules = rules(&[("x", "y")]);
    assert_eq!(rules.is_filtered(Path::new(path)), expected);
}

#[rstest]
fn test_no_tokens_means_nothing_is_filtered() {
    let rules = FilterRules::default();
    assert!(!rules.is_filtered(Path::new("config.properties")));
}

#[rstest]
fn test_filter_directory_substitutes_text_and_copies_binary() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("prod");
    std::fs::create_dir_all(source.join("conf")).unwrap();
    std::fs::write(source.join("conf/app.properties"), "env=${env.name}\n").unwrap();
    let binary = vec![0u8, 159, 146, 150, b'$', b'{', b'x', b'}'];
    std::fs::write(source.join("conf/blob.dat"), &binary).unwrap();
    std::fs::write(source.join("logo.png"), "${env.name}").unwrap();

    let staging = tmp.path().join("staging/prod");
    let tree = filter_directory(&source, &staging, &rules(&[("env.name", "prod")])).unwrap();

    assert_eq!(
        std::fs::read_to_string(staging.join("conf/app.properties")).unwrap(),
        "env=prod\n"
    );
    assert_eq!(std::fs::read(staging.join("conf/blob.dat")).unwrap(), binary);
    assert_eq!(
        std::fs::read_to_string(staging.join("logo.png")).unwrap(),
        "${env.name}"
    );
    assert!(tree.get("conf/app.properties").is_some());
    assert_eq!(tree.root(), staging.as_path());
    // source is untouched
    assert_eq!(
        std::fs::read_to_string(source.join("conf/app.properties")).unwrap(),
        "env=${env.name}\n"
    );
}

#[rstest]
fn test_filter_directory_clears_stale_staging() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("dev");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("a.txt"), "a").unwrap();
    let staging = tmp.path().join("staging");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("stale.txt"), "old").unwrap();

    let tree = filter_directory(&source, &staging, &FilterRules::default()).unwrap();

    assert!(!staging.join("stale.txt").exists());
    assert_eq!(tree.len(), 1);
}

#[rstest]
fn test_filter_directory_keeps_empty_directories() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("dev");
    std::fs::create_dir_all(source.join("logs")).unwrap();

    let staging = tmp.path().join("staging");
    let tree = filter_directory(&source, &staging, &FilterRules::default()).unwrap();

    assert!(staging.join("logs").is_dir());
    assert_eq!(tree.directories().collect::<Vec<_>>(), vec!["logs"]);
}

#[rstest]
fn test_filter_directory_missing_source() {
    let tmp = TempDir::new().unwrap();

    let result = filter_directory(
        &tmp.path().join("absent"),
        &tmp.path().join("staging"),
        &FilterRules::default(),
    );

    assert!(matches!(result, Err(Error::FilterFailed { .. })));
}

#[cfg(unix)]
#[rstest]
fn test_filter_directory_unreadable_entry_fails() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("qa");
    std::fs::create_dir_all(&source).unwrap();
    std::os::unix::fs::symlink(source.join("missing"), source.join("broken.txt")).unwrap();

    let result = filter_directory(&source, &tmp.path().join("staging"), &FilterRules::default());

    assert!(matches!(result, Err(Error::FilterFailed { .. })));
}

#[rstest]
fn test_unterminated_tokens_filter_in_one_pass() {
    let rules = rules(&[("db.url", "jdbc:h2:mem")]);
    let text = "${".repeat(200_000) + "@" + &"x@".repeat(200_000);

    let filtered = rules.filter_text(&text);

    assert_eq!(filtered, text);
}

#[cfg(unix)]
#[rstest]
fn test_filter_directory_keeps_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("prod");
    std::fs::create_dir_all(source.join("bin")).unwrap();
    std::fs::write(source.join("bin/start.sh"), "#!/bin/sh\necho ${env.name}\n").unwrap();
    std::fs::set_permissions(
        source.join("bin/start.sh"),
        std::fs::Permissions::from_mode(0o755),
    )
    .unwrap();

    let staging = tmp.path().join("staging");
    filter_directory(&source, &staging, &rules(&[("env.name", "prod")])).unwrap();

    let staged = staging.join("bin/start.sh");
    assert_eq!(std::fs::read_to_string(&staged).unwrap(), "#!/bin/sh\necho prod\n");
    let mode = std::fs::metadata(&staged).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}
