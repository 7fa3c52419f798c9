// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Resource filtering: token substitution into a per-environment staging
//! copy of an overlay directory.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use walkdir::WalkDir;

use crate::tree::FileTree;
use crate::Error;

#[cfg(test)]
#[path = "./filter_test.rs"]
mod filter_test;

/// How many leading bytes are inspected to tell text from binary.
const BINARY_SNIFF_LEN: usize = 8000;

/// Token substitutions and the files they apply to.
///
/// Tokens are written as `${name}` or `@name@` in text files. Names never
/// contain whitespace or any of `$ { } @`. Unknown tokens are left as they
/// are, and substituted values are not scanned again.
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    tokens: BTreeMap<String, String>,
    non_filtered_extensions: BTreeSet<String>,
}

impl FilterRules {
    pub fn new<I, S>(tokens: BTreeMap<String, String>, non_filtered_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens,
            non_filtered_extensions: non_filtered_extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn tokens(&self) -> &BTreeMap<String, String> {
        &self.tokens
    }

    /// Whether a file at `path` is eligible for substitution by name alone.
    pub fn is_filtered(&self, path: &Path) -> bool {
        if self.tokens.is_empty() {
            return false;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => !self
                .non_filtered_extensions
                .contains(&ext.to_ascii_lowercase()),
            None => true,
        }
    }

    /// Substitute every known token in `text`.
    pub fn filter_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find(['$', '@']) {
            out.push_str(&rest[..start]);
            let candidate = &rest[start..];

            if let Some((value, consumed)) = self.match_token(candidate) {
                out.push_str(value);
                rest = &candidate[consumed..];
            } else {
                // emit the delimiter character itself and move on
                out.push_str(&candidate[..1]);
                rest = &candidate[1..];
            }
        }

        out.push_str(rest);
        out
    }

    /// Match a token at the start of `candidate`, returning its value and
    /// the number of bytes it spans.
    ///
    /// The name scan stops at the first character that cannot be part of a
    /// name, which is never past the next delimiter, so filtering stays
    /// linear in the length of the text.
    fn match_token(&self, candidate: &str) -> Option<(&str, usize)> {
        let (body, open, close) = match candidate.strip_prefix("${") {
            Some(body) => (body, 2, '}'),
            None => (candidate.strip_prefix('@')?, 1, '@'),
        };

        let end = body.find(is_name_boundary)?;
        if end == 0 || !body[end..].starts_with(close) {
            return None;
        }
        let name = &body[..end];
        self.tokens
            .get(name)
            .map(|value| (value.as_str(), open + end + close.len_utf8()))
    }
}

/// Characters that end a token name.
fn is_name_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '$' | '{' | '}' | '@')
}

/// Whether file content should be copied verbatim.
fn looks_binary(content: &[u8]) -> bool {
    let head = &content[..content.len().min(BINARY_SNIFF_LEN)];
    head.contains(&0) || std::str::from_utf8(content).is_err()
}

/// Give `target` the permission bits of `source`.
#[cfg(unix)]
fn copy_mode(source: &Path, target: &Path) -> std::io::Result<()> {
    let permissions = std::fs::metadata(source)?.permissions();
    std::fs::set_permissions(target, permissions)
}

#[cfg(not(unix))]
fn copy_mode(_source: &Path, _target: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Filter `source` into `staging` and return a snapshot of the result.
///
/// `staging` is emptied first so files left over from an earlier run never
/// reach the archive. Only `source` is read and only `staging` is written.
pub fn filter_directory(source: &Path, staging: &Path, rules: &FilterRules) -> crate::Result<FileTree> {
    let failed = |path: &Path, error| Error::FilterFailed {
        path: path.to_path_buf(),
        error,
    };

    if !source.is_dir() {
        return Err(failed(
            source,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "overlay directory does not exist",
            ),
        ));
    }

    if staging.exists() {
        std::fs::remove_dir_all(staging).map_err(|e| failed(staging, e))?;
    }
    std::fs::create_dir_all(staging).map_err(|e| failed(staging, e))?;

    for entry in WalkDir::new(source)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            failed(&path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| failed(entry.path(), std::io::Error::other(e)))?;
        let target = staging.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| failed(&target, e))?;
            continue;
        }

        let content = std::fs::read(entry.path()).map_err(|e| failed(entry.path(), e))?;
        let content = if rules.is_filtered(entry.path()) && !looks_binary(&content) {
            // looks_binary has already proven this is UTF-8
            let text = String::from_utf8_lossy(&content);
            rules.filter_text(&text).into_bytes()
        } else {
            content
        };
        std::fs::write(&target, content).map_err(|e| failed(&target, e))?;
        copy_mode(entry.path(), &target).map_err(|e| failed(&target, e))?;
    }

    FileTree::from_dir(staging).map_err(|e| failed(staging, e))
}
