//! Card generation: one PNG per spreadsheet row.
//!
//! ```text
//! workbook ──▶ load_sheet ──▶ grouped? ──yes──▶ <out>/<key>/<key>_<n>.png
//!                                │               + shared files per folder
//!                                └─no───▶ <out>/<name>.png, <name>_1.png, …
//! ```
//!
//! ## Partial output on failure
//!
//! A run is not transactional. Rows are rendered in order and the first
//! failure aborts the loop, so cards for earlier rows (and any shared files
//! already copied) stay on disk. The error is the only reliable signal that
//! the run did not finish; a caller that needs all-or-nothing should generate
//! into a fresh directory and discard it on error.

use crate::config::GenerationConfig;
use crate::error::OfficeConvError;
use crate::pipeline::card::CardRenderer;
use crate::pipeline::naming::{
    copy_dir_files, group_records, row_stem, unique_file_name, DirNames,
};
use crate::pipeline::sheet::{load_sheet, Record};
use crate::progress::{percent_of, Reporter};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// What a successful [`generate`] run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    /// Data rows read from the sheet.
    pub rows: usize,
    /// Every card written, in the order it was written.
    pub images: Vec<PathBuf>,
    /// Group folders created; `0` in flat mode.
    pub groups: usize,
    /// Shared files copied, summed over all group folders.
    pub shared_files_copied: usize,
    pub duration_ms: u64,
}

/// Render every row of `sheet` in `excel_path` as a card under `output_dir`.
///
/// `output_dir` is created (recursively) if it does not exist. Grouped mode
/// applies only when `config.grouped` is set and `config.naming_field` names
/// an existing column; otherwise rows are written flat.
///
/// # Errors
/// - [`OfficeConvError::Validation`] for a bad style, before any I/O.
/// - [`OfficeConvError::SourceRead`] if the workbook or sheet is unreadable.
/// - [`OfficeConvError::Filesystem`] / [`OfficeConvError::ImageWrite`] from
///   directory creation, shared-file copies, or card writes. See the module
///   docs for what remains on disk.
pub fn generate(
    excel_path: impl AsRef<Path>,
    sheet: &str,
    output_dir: impl AsRef<Path>,
    config: &GenerationConfig,
) -> Result<GenerationReport, OfficeConvError> {
    let start = Instant::now();
    let excel_path = excel_path.as_ref();
    let output_dir = output_dir.as_ref();
    config.validate()?;
    info!(
        "Generating cards from {} [{}] into {}",
        excel_path.display(),
        sheet,
        output_dir.display()
    );

    let renderer = CardRenderer::new(config.style.clone())?;
    debug!("Card font: {}", renderer.font_strategy());

    fs::create_dir_all(output_dir).map_err(|e| OfficeConvError::filesystem(output_dir, e))?;
    let data = load_sheet(excel_path, sheet)?;

    let mut reporter = Reporter::new(config.progress_callback.as_ref());
    let mut report = GenerationReport {
        rows: data.records.len(),
        ..GenerationReport::default()
    };

    let grouping_field = config
        .naming_field
        .as_deref()
        .filter(|field| config.grouped && data.has_column(field));

    match grouping_field {
        Some(field) => {
            write_grouped(&renderer, &data.records, field, output_dir, config, &mut reporter, &mut report)?
        }
        None => write_flat(&renderer, &data.records, output_dir, config, &mut reporter, &mut report)?,
    }

    reporter.step(100, "done");
    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Generated {} card(s) from {} row(s) in {}ms",
        report.images.len(),
        report.rows,
        report.duration_ms
    );
    Ok(report)
}

fn write_grouped(
    renderer: &CardRenderer,
    records: &[Record],
    field: &str,
    output_dir: &Path,
    config: &GenerationConfig,
    reporter: &mut Reporter<'_>,
    report: &mut GenerationReport,
) -> Result<(), OfficeConvError> {
    let share_dir = config.share_dir.as_deref().filter(|dir| dir.is_dir());
    let mut dir_names = DirNames::default();
    let total = records.len();
    let mut done = 0;

    for group in group_records(records, field) {
        let base = group.base_name();
        let group_dir = output_dir.join(dir_names.claim(&base));
        fs::create_dir_all(&group_dir).map_err(|e| OfficeConvError::filesystem(&group_dir, e))?;
        report.groups += 1;

        if let Some(share) = share_dir {
            report.shared_files_copied += copy_dir_files(share, &group_dir)?;
        }

        for (pos, record) in group.records.iter().enumerate() {
            let path = group_dir.join(format!("{base}_{}.png", pos + 1));
            render_one(renderer, record, &path, percent_of(done, total), reporter)?;
            report.images.push(path);
            done += 1;
        }
        debug!(
            "Group '{}' → {} ({} card(s))",
            group.key,
            group_dir.display(),
            group.records.len()
        );
    }
    Ok(())
}

fn write_flat(
    renderer: &CardRenderer,
    records: &[Record],
    output_dir: &Path,
    config: &GenerationConfig,
    reporter: &mut Reporter<'_>,
    report: &mut GenerationReport,
) -> Result<(), OfficeConvError> {
    let total = records.len();

    for (idx, record) in records.iter().enumerate() {
        let path = match config.naming_field.as_deref() {
            Some(field) => {
                let stem = row_stem(record.get(field).unwrap_or(""), idx);
                unique_file_name(output_dir, &stem, "png")
            }
            None => output_dir.join(format!("row_{}.png", idx + 1)),
        };
        render_one(renderer, record, &path, percent_of(idx, total), reporter)?;
        report.images.push(path);
    }
    Ok(())
}

fn render_one(
    renderer: &CardRenderer,
    record: &Record,
    path: &Path,
    percent: u8,
    reporter: &mut Reporter<'_>,
) -> Result<(), OfficeConvError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    reporter.step(percent, &format!("rendering: {name}"));
    renderer.render(record, path)
}
