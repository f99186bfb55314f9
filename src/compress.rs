//! One-shot archive helpers
//!
//! Standalone ZIP compression for a single file or a directory tree. These
//! functions do synchronous I/O and are not wired into the download engine;
//! call them through `spawn_blocking` from async code.

use crate::error::{Error, Result};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::FileOptions;

/// Compress a single file into a ZIP archive at `archive_path`
///
/// The archive holds one entry named after the source file. Parent
/// directories of `archive_path` are created as needed.
pub fn compress_file(source: &Path, archive_path: &Path) -> Result<()> {
    debug!(?source, ?archive_path, "compressing file");

    if !source.is_file() {
        return Err(Error::Io(std::io::Error::other(format!(
            "not a file: {}",
            source.display()
        ))));
    }
    let entry_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::Io(std::io::Error::other(format!(
                "source has no file name: {}",
                source.display()
            )))
        })?;

    let mut writer = open_archive(archive_path)?;
    writer
        .start_file(entry_name, FileOptions::default())
        .map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to start archive entry: {}",
                e
            )))
        })?;
    let mut input = std::fs::File::open(source).map_err(|e| {
        Error::Io(std::io::Error::other(format!(
            "failed to open source file: {}",
            e
        )))
    })?;
    std::io::copy(&mut input, &mut writer).map_err(|e| {
        Error::Io(std::io::Error::other(format!(
            "failed to write archive entry: {}",
            e
        )))
    })?;
    finish_archive(writer)?;

    info!(?source, ?archive_path, "file compressed");
    Ok(())
}

/// Compress a directory tree into a ZIP archive at `archive_path`
///
/// Entry names are relative to `source_dir`; empty directories are kept.
/// Returns the number of file entries written.
pub fn compress_dir(source_dir: &Path, archive_path: &Path) -> Result<usize> {
    debug!(?source_dir, ?archive_path, "compressing directory");

    if !source_dir.is_dir() {
        return Err(Error::Io(std::io::Error::other(format!(
            "not a directory: {}",
            source_dir.display()
        ))));
    }

    let mut writer = open_archive(archive_path)?;
    let options = FileOptions::default();
    let mut file_count = 0;

    for entry in WalkDir::new(source_dir).min_depth(1) {
        let entry = entry.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to walk directory: {}",
                e
            )))
        })?;
        let relative = entry.path().strip_prefix(source_dir).map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "entry escapes the source directory: {}",
                e
            )))
        })?;
        let entry_name = relative.to_string_lossy().into_owned();

        if entry.file_type().is_dir() {
            writer.add_directory(entry_name, options).map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "failed to add directory entry: {}",
                    e
                )))
            })?;
        } else if entry.file_type().is_file() {
            writer.start_file(entry_name, options).map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "failed to start archive entry: {}",
                    e
                )))
            })?;
            let mut input = std::fs::File::open(entry.path()).map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "failed to open source file: {}",
                    e
                )))
            })?;
            std::io::copy(&mut input, &mut writer).map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "failed to write archive entry: {}",
                    e
                )))
            })?;
            file_count += 1;
        }
        // Symlinks and other special files are skipped
    }
    finish_archive(writer)?;

    info!(?source_dir, ?archive_path, file_count, "directory compressed");
    Ok(file_count)
}

fn open_archive(archive_path: &Path) -> Result<zip::ZipWriter<std::fs::File>> {
    if let Some(parent) = archive_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "failed to create archive directory: {}",
                    e
                )))
            })?;
        }
    }
    let file = std::fs::File::create(archive_path).map_err(|e| {
        Error::Io(std::io::Error::other(format!(
            "failed to create archive file: {}",
            e
        )))
    })?;
    Ok(zip::ZipWriter::new(file))
}

fn finish_archive(mut writer: zip::ZipWriter<std::fs::File>) -> Result<()> {
    writer.finish().map_err(|e| {
        Error::Io(std::io::Error::other(format!(
            "failed to finalize archive: {}",
            e
        )))
    })?;
    Ok(())
}
