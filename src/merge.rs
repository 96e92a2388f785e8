//! TIFF merge: an ordered list of images and PDFs into one multi-page TIFF.
//!
//! Output page order is exactly input order, with each PDF expanded in place
//! into its pages:
//!
//! ```text
//! [a.png, doc.pdf (3 pages), b.jpg]  ──▶  [a, doc p1, doc p2, doc p3, b]
//! ```
//!
//! ## Why decode everything before writing?
//!
//! Knowing the full frame list up front is what lets an all-unreadable or
//! empty input fail with [`OfficeConvError::EmptyInput`] without creating a
//! file, and lets the writer stage the whole TIFF in a temp file that only
//! replaces `output` once complete. Frames are dropped when this function
//! returns, on success and on error alike.

use crate::config::MergeConfig;
use crate::error::OfficeConvError;
use crate::pipeline::inventory::{default_output_path, scan, SourceKind};
use crate::pipeline::render::{decode_image, rasterize, RasterFrame};
use crate::pipeline::tiff::write_multipage;
use crate::progress::{percent_of, Reporter};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Progress checkpoint reported right before encoding starts.
pub const SAVING_PERCENT: u8 = 90;

/// What a successful [`merge`] produced.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub output: PathBuf,
    /// Number of input paths.
    pub inputs: usize,
    /// Pages written (PDFs count once per page).
    pub frames: usize,
    pub duration_ms: u64,
}

/// Merge `inputs`, in order, into a single TIFF at `output`.
///
/// PDFs are rasterised at `config.dpi`; every other input is decoded as one
/// image. All frames are normalised to 8-bit RGB.
///
/// # Errors
/// - [`OfficeConvError::Validation`] for an invalid config, before any I/O.
/// - [`OfficeConvError::SourceRead`] for the first unreadable input; the merge
///   stops there and `output` is not touched.
/// - [`OfficeConvError::EmptyInput`] when no frames were produced; no file is
///   written.
/// - [`OfficeConvError::ImageWrite`] if encoding or persisting fails.
pub fn merge<P: AsRef<Path>>(
    inputs: &[P],
    output: impl AsRef<Path>,
    config: &MergeConfig,
) -> Result<MergeReport, OfficeConvError> {
    let start = Instant::now();
    let output = output.as_ref();
    config.validate()?;
    info!(
        "Merging {} input(s) into {} ({}, {} DPI)",
        inputs.len(),
        output.display(),
        config.compression,
        config.dpi
    );

    let mut reporter = Reporter::new(config.progress_callback.as_ref());
    let total = inputs.len();
    let mut frames: Vec<RasterFrame> = Vec::new();

    for (i, input) in inputs.iter().enumerate() {
        let path = input.as_ref();
        reporter.step(percent_of(i, total), &format!("processing: {}", display_name(path)));
        let before = frames.len();

        match SourceKind::from_path(path) {
            Some(SourceKind::Pdf) => frames.extend(rasterize(path, None, config.dpi)?),
            _ => frames.push(decode_image(path)?),
        }
        debug!("{} → {} frame(s)", path.display(), frames.len() - before);
    }

    if frames.is_empty() {
        return Err(OfficeConvError::EmptyInput { inputs: total });
    }

    reporter.step(SAVING_PERCENT, "saving");
    write_multipage(&frames, output, config)?;
    reporter.step(100, "done");

    let report = MergeReport {
        output: output.to_path_buf(),
        inputs: total,
        frames: frames.len(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Merge complete: {} page(s) from {} input(s) in {}ms",
        report.frames, report.inputs, report.duration_ms
    );
    Ok(report)
}

/// Merge every supported file in `dir` in listing order, writing
/// `<dir>/<dir-name>.tif` unless `output` is given.
pub fn merge_dir(
    dir: impl AsRef<Path>,
    output: Option<&Path>,
    config: &MergeConfig,
) -> Result<MergeReport, OfficeConvError> {
    let dir = dir.as_ref();
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(dir));
    let sources: Vec<PathBuf> = scan(dir)?
        .into_iter()
        .map(|entry| entry.path)
        .filter(|path| path != &output)
        .collect();
    merge(&sources, &output, config)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Compression;
    use image::{Rgb, RgbImage};

    fn lossless() -> MergeConfig {
        MergeConfig::builder()
            .compression(Compression::Lzw)
            .build()
            .unwrap()
    }

    #[test]
    fn empty_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.tif");
        let err = merge::<PathBuf>(&[], &out, &lossless()).unwrap_err();
        assert!(matches!(err, OfficeConvError::EmptyInput { inputs: 0 }));
        assert!(!out.exists());
    }

    #[test]
    fn invalid_config_rejected_before_reading_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.tif");
        let config = MergeConfig {
            dpi: 0,
            ..MergeConfig::default()
        };
        let err = merge(&[dir.path().join("missing.png")], &out, &config).unwrap_err();
        assert!(matches!(err, OfficeConvError::Validation(_)));
    }

    #[test]
    fn unreadable_input_aborts_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        RgbImage::from_pixel(5, 5, Rgb([1, 2, 3])).save(&good).unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"garbage").unwrap();
        let out = dir.path().join("out.tif");

        let err = merge(&[good, bad.clone()], &out, &lossless()).unwrap_err();
        match err {
            OfficeConvError::SourceRead { path, .. } => assert_eq!(path, bad),
            other => panic!("expected SourceRead, got {other}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn merge_dir_skips_its_own_output() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("scans");
        std::fs::create_dir(&folder).unwrap();
        RgbImage::new(4, 4).save(folder.join("a.png")).unwrap();
        RgbImage::new(4, 4).save(folder.join("b.png")).unwrap();

        let first = merge_dir(&folder, None, &lossless()).unwrap();
        assert_eq!(first.output, folder.join("scans.tif"));
        assert_eq!(first.frames, 2);

        // Second run must not merge the TIFF written by the first.
        let second = merge_dir(&folder, None, &lossless()).unwrap();
        assert_eq!(second.frames, 2);
    }
}
