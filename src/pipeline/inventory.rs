//! Source discovery for the TIFF merge: which files in a folder can be merged.
//!
//! The scan preserves directory-listing order on purpose. That order is
//! platform-dependent and usually *not* what the user wants, but sorting here
//! would silently impose a policy (lexicographic? natural? mtime?) that the
//! caller then has to undo. The caller owns ordering; this module only filters.

use crate::error::OfficeConvError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions (lower-case, without dot) accepted by the merge pipeline.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "pdf"];

/// How a source file is turned into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Decoded as a single raster frame.
    Image,
    /// Expanded into one frame per page.
    Pdf,
}

impl SourceKind {
    /// Classify `path` by its extension (case-insensitive). `None` when the
    /// extension is missing or not in [`SUPPORTED_EXTENSIONS`].
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceKind::Pdf),
            e if SUPPORTED_EXTENSIONS.contains(&e) => Some(SourceKind::Image),
            _ => None,
        }
    }
}

/// A mergeable file tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl SourceEntry {
    /// Tag `path` by extension; `None` for unsupported files.
    pub fn classify(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = SourceKind::from_path(&path)?;
        Some(Self { path, kind })
    }

    /// File name for status lines, falling back to the full path.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// List the supported regular files directly inside `dir`, in listing order.
///
/// Subdirectories are not descended into. Entries that vanish or cannot be
/// stat'ed mid-scan are skipped.
///
/// # Errors
/// [`OfficeConvError::Filesystem`] if `dir` cannot be read.
pub fn scan(dir: &Path) -> Result<Vec<SourceEntry>, OfficeConvError> {
    let listing = std::fs::read_dir(dir).map_err(|e| OfficeConvError::filesystem(dir, e))?;

    let mut found = Vec::new();
    for entry in listing.flatten() {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false)
            || entry.path().is_file();
        if !is_file {
            continue;
        }
        if let Some(source) = SourceEntry::classify(entry.path()) {
            found.push(source);
        }
    }

    debug!("Scanned {}: {} mergeable file(s)", dir.display(), found.len());
    Ok(found)
}

/// Default merge target for a folder: `<dir>/<dir-name>.tif`.
pub fn default_output_path(dir: &Path) -> PathBuf {
    let stem = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "merged".to_string());
    dir.join(format!("{stem}.tif"))
}
