//! ZIP extraction into the shared unzip folder.
//!
//! Every country archive is extracted into the same directory, so entries
//! from all countries share one namespace. Extraction is not atomic: if an
//! entry fails, entries written before it stay on disk.

use std::fs::File;
use std::path::Path;

/// Extracts every entry of a ZIP archive under `dest_dir`.
///
/// Directory entries are created; file entries are written byte for byte,
/// creating parent directories as needed. Entries whose names would land
/// outside `dest_dir` are skipped.
///
/// Returns the number of entries written.
///
/// # Errors
///
/// Returns [`ArchiveError::Open`] if the file is not a readable ZIP, and
/// [`ArchiveError::Entry`] or [`ArchiveError::Io`] if an entry cannot be
/// read or written.
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<u64, ArchiveError> {
    let file = File::open(archive_path).map_err(|e| ArchiveError::Io {
        path: archive_path.display().to_string(),
        source: e,
    })?;

    let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Open {
        path: archive_path.display().to_string(),
        source: e,
    })?;

    std::fs::create_dir_all(dest_dir).map_err(|e| ArchiveError::Io {
        path: dest_dir.display().to_string(),
        source: e,
    })?;

    let mut count = 0u64;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| ArchiveError::Entry {
            path: archive_path.display().to_string(),
            index: i,
            source: e,
        })?;

        let Some(relative) = entry.enclosed_name() else {
            log::warn!("  skipping unsafe entry name: {}", entry.name());
            continue;
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| ArchiveError::Io {
                path: out_path.display().to_string(),
                source: e,
            })?;
            count += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let mut out = File::create(&out_path).map_err(|e| ArchiveError::Io {
            path: out_path.display().to_string(),
            source: e,
        })?;
        std::io::copy(&mut entry, &mut out).map_err(|e| ArchiveError::Io {
            path: out_path.display().to_string(),
            source: e,
        })?;

        log::trace!("  extracted {}", out_path.display());
        count += 1;
    }

    Ok(count)
}

/// Errors from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The file could not be opened as a ZIP archive.
    #[error("{path} is not a valid zip file: {source}")]
    Open {
        /// Archive path.
        path: String,
        /// Underlying ZIP error.
        source: zip::result::ZipError,
    },

    /// An entry inside the archive could not be read.
    #[error("corrupt entry {index} in {path}: {source}")]
    Entry {
        /// Archive path.
        path: String,
        /// Entry index.
        index: usize,
        /// Underlying ZIP error.
        source: zip::result::ZipError,
    },

    /// I/O error reading the archive or writing an entry.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
