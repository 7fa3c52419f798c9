// Copyright (c) Contributors to the Multienv project.
// SPDX-License-Identifier: Apache-2.0

//! Archive formats: a lookup table from format name to an
//! extract/compress function pair.
//!
//! Written archives are reproducible: entries appear in path order with an
//! entry for every parent directory, and timestamps and ownership are
//! fixed. File modes are reduced to 0755 for executables and 0644 for
//! everything else.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use flate2::Compression;
use once_cell::sync::Lazy;

use crate::compose::{MergedEntry, MergedTree};

#[cfg(test)]
#[path = "./codec_test.rs"]
mod codec_test;

const FILE_MODE: u32 = 0o644;
const EXEC_MODE: u32 = 0o755;
const DIR_MODE: u32 = 0o755;

/// Unpack the archive at the first path into the directory at the second.
pub type ExtractFn = fn(&Path, &Path) -> io::Result<()>;

/// Serialize a merged tree into the given file.
pub type CompressFn = fn(&MergedTree, &mut File) -> io::Result<()>;

/// The pair of operations backing one archive format.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    pub extract: ExtractFn,
    pub compress: CompressFn,
}

/// Zip-family archives (zip, jar, war, ear).
pub const ZIP: Codec = Codec {
    extract: extract_zip,
    compress: compress_zip,
};

/// Uncompressed tarballs.
pub const TAR: Codec = Codec {
    extract: extract_tar,
    compress: compress_tar,
};

/// Gzip-compressed tarballs.
pub const TAR_GZ: Codec = Codec {
    extract: extract_tar_gz,
    compress: compress_tar_gz,
};

/// Registry shared by runs that do not bring their own.
pub static DEFAULT_REGISTRY: Lazy<FormatRegistry> = Lazy::new(FormatRegistry::default);

/// Maps format identifiers (lowercase extensions) to codecs.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    codecs: HashMap<String, Codec>,
}

impl FormatRegistry {
    /// A registry with no formats at all.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Add or replace the codec for a format.
    pub fn register<S: AsRef<str>>(&mut self, format: S, codec: Codec) {
        self.codecs
            .insert(format.as_ref().to_ascii_lowercase(), codec);
    }

    /// Look up the codec for a format.
    pub fn get(&self, format: &str) -> crate::Result<&Codec> {
        self.codecs
            .get(&format.to_ascii_lowercase())
            .ok_or_else(|| crate::Error::UnsupportedFormat(format.to_string()))
    }

    /// Registered format names, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for format in ["zip", "jar", "war", "ear"] {
            registry.register(format, ZIP);
        }
        registry.register("tar", TAR);
        registry.register("tar.gz", TAR_GZ);
        registry.register("tgz", TAR_GZ);
        registry
    }
}

/// Determine the archive format of a file from its name.
///
/// Recognizes the compound `tar.gz` suffix; otherwise the lowercase
/// extension is returned.
pub fn archive_extension<P: AsRef<Path>>(path: P) -> Option<String> {
    let name = path.as_ref().file_name()?.to_str()?.to_ascii_lowercase();
    if name.len() > ".tar.gz".len() && name.ends_with(".tar.gz") {
        return Some("tar.gz".to_string());
    }
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_string())
}

/// Name the layer file in an I/O error.
fn with_path(source: &Path) -> impl Fn(io::Error) -> io::Error + '_ {
    move |e| io::Error::new(e.kind(), format!("failed to archive {}: {e}", source.display()))
}

/// Open a layer file for streaming, with its size and archive mode.
fn open_layer_file(source: &Path) -> io::Result<(File, u64, u32)> {
    let file = File::open(source).map_err(with_path(source))?;
    let metadata = file.metadata().map_err(with_path(source))?;
    Ok((file, metadata.len(), archive_mode(&metadata)))
}

/// Executable files keep their exec bit; everything else is normalized.
#[cfg(unix)]
fn archive_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    if metadata.permissions().mode() & 0o111 != 0 {
        EXEC_MODE
    } else {
        FILE_MODE
    }
}

#[cfg(not(unix))]
fn archive_mode(_metadata: &std::fs::Metadata) -> u32 {
    FILE_MODE
}

#[cfg(unix)]
fn restore_mode(target: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    match mode {
        Some(mode) => {
            std::fs::set_permissions(target, std::fs::Permissions::from_mode(mode & 0o777))
        }
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn restore_mode(_target: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

fn extract_zip(source: &Path, dest: &Path) -> io::Result<()> {
    let file = File::open(source)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(io::Error::other)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(io::Error::other)?;
        let target = match entry.enclosed_name() {
            Some(relative) => dest.join(relative),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("archive entry {:?} escapes the target directory", entry.name()),
                ));
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        restore_mode(&target, entry.unix_mode())?;
    }
    Ok(())
}

fn zip_options(permissions: u32) -> zip::write::SimpleFileOptions {
    zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(permissions)
}

fn compress_zip(tree: &MergedTree, file: &mut File) -> io::Result<()> {
    let mut writer = zip::ZipWriter::new(file);

    for (path, entry) in tree.entries() {
        match entry {
            MergedEntry::Directory => {
                writer
                    .add_directory(format!("{path}/"), zip_options(DIR_MODE))
                    .map_err(io::Error::other)?;
            }
            MergedEntry::File { source, .. } => {
                let (mut content, _, mode) = open_layer_file(source)?;
                writer
                    .start_file(path.as_str(), zip_options(mode))
                    .map_err(io::Error::other)?;
                io::copy(&mut content, &mut writer).map_err(with_path(source))?;
            }
        }
    }

    writer.finish().map_err(io::Error::other)?;
    Ok(())
}

fn unpack_tar<R: Read>(reader: R, dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    archive.unpack(dest)
}

fn extract_tar(source: &Path, dest: &Path) -> io::Result<()> {
    unpack_tar(BufReader::new(File::open(source)?), dest)
}

fn extract_tar_gz(source: &Path, dest: &Path) -> io::Result<()> {
    let decoder = flate2::read::GzDecoder::new(BufReader::new(File::open(source)?));
    unpack_tar(decoder, dest)
}

fn tar_header(entry_type: tar::EntryType, mode: u32, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

fn write_tar<W: Write>(tree: &MergedTree, writer: W) -> io::Result<W> {
    let mut builder = tar::Builder::new(writer);

    for (path, entry) in tree.entries() {
        match entry {
            MergedEntry::Directory => {
                let mut header = tar_header(tar::EntryType::Directory, DIR_MODE, 0);
                builder.append_data(&mut header, path, io::empty())?;
            }
            MergedEntry::File { source, .. } => {
                let (content, size, mode) = open_layer_file(source)?;
                let mut header = tar_header(tar::EntryType::Regular, mode, size);
                builder
                    .append_data(&mut header, path, content.take(size))
                    .map_err(with_path(source))?;
            }
        }
    }

    builder.into_inner()
}

fn compress_tar(tree: &MergedTree, file: &mut File) -> io::Result<()> {
    write_tar(tree, file)?.flush()
}

fn compress_tar_gz(tree: &MergedTree, file: &mut File) -> io::Result<()> {
    let encoder = flate2::GzBuilder::new()
        .mtime(0)
        .write(file, Compression::default());
    write_tar(tree, encoder)?.finish()?.flush()
}
