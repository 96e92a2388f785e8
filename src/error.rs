//! Error type for the officeconv library.
//!
//! Every pipeline is all-or-nothing: the first failure aborts the run and is
//! returned as an [`OfficeConvError`]. There is no per-item error type because
//! neither pipeline skips a bad row or a bad page and keeps going.
//!
//! The variants follow the four failure families callers need to tell apart:
//!
//! * **source read**: a workbook, sheet, image or PDF could not be opened or
//!   decoded ([`OfficeConvError::SourceRead`]);
//! * **empty input**: a merge had nothing to write
//!   ([`OfficeConvError::EmptyInput`]), distinct from a read failure so a UI
//!   can say "nothing selected" instead of "file broken";
//! * **validation**: caller configuration out of range, always raised before
//!   the filesystem is touched ([`OfficeConvError::Validation`]);
//! * **filesystem / write**: creating directories, copying shared files, or
//!   persisting an encoded image ([`OfficeConvError::Filesystem`],
//!   [`OfficeConvError::ImageWrite`]).

use std::path::{Path, PathBuf};
use thiserror::Error;

/// All errors returned by the officeconv library.
#[derive(Debug, Error)]
pub enum OfficeConvError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A spreadsheet, image or PDF could not be opened or decoded.
    #[error("Cannot read '{}'{}: {detail}", path.display(), sheet_suffix(sheet))]
    SourceRead {
        path: PathBuf,
        /// Sheet name, when the failure is specific to one worksheet.
        sheet: Option<String>,
        detail: String,
    },

    /// A merge produced no frames at all.
    #[error(
        "Nothing to merge: {inputs} input(s) produced no image frames.\n\
Select at least one PNG, JPEG, TIFF or PDF file."
    )]
    EmptyInput { inputs: usize },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Caller-supplied configuration is out of range.
    #[error("Invalid configuration: {0}")]
    Validation(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Creating a directory or copying/writing a file failed.
    #[error("Filesystem error at '{}': {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding or persisting an output image failed.
    #[error("Failed to write image '{}': {detail}", path.display())]
    ImageWrite { path: PathBuf, detail: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is downloaded automatically the first time a PDF is opened.\n\
If that failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Set PDFIUM_AUTO_CACHE_DIR to a writable directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (worker panic, runtime construction).
    #[error("Internal error: {0}")]
    Internal(String),
}

fn sheet_suffix(sheet: &Option<String>) -> String {
    match sheet {
        Some(name) => format!(" (sheet '{name}')"),
        None => String::new(),
    }
}

impl OfficeConvError {
    /// Shorthand for a [`SourceRead`](Self::SourceRead) without a sheet.
    pub fn source_read(path: &Path, detail: impl ToString) -> Self {
        Self::SourceRead {
            path: path.to_path_buf(),
            sheet: None,
            detail: detail.to_string(),
        }
    }

    /// Shorthand for a [`Filesystem`](Self::Filesystem) error.
    pub fn filesystem(path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_read_display_with_sheet() {
        let e = OfficeConvError::SourceRead {
            path: "book.xlsx".into(),
            sheet: Some("Orders".into()),
            detail: "sheet not found".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("book.xlsx"), "got: {msg}");
        assert!(msg.contains("sheet 'Orders'"), "got: {msg}");
        assert!(msg.contains("sheet not found"), "got: {msg}");
    }

    #[test]
    fn source_read_display_without_sheet() {
        let e = OfficeConvError::source_read(Path::new("scan.pdf"), "bad xref");
        let msg = e.to_string();
        assert!(!msg.contains("sheet"), "got: {msg}");
        assert!(msg.contains("'scan.pdf': bad xref"), "got: {msg}");
    }

    #[test]
    fn empty_input_display() {
        let e = OfficeConvError::EmptyInput { inputs: 0 };
        assert!(e.to_string().contains("0 input(s)"));
    }

    #[test]
    fn filesystem_keeps_io_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e = OfficeConvError::filesystem(Path::new("/out"), io);
        assert!(e.to_string().contains("/out"));
        assert!(e.source().is_some());
    }

    #[test]
    fn pdfium_binding_display_has_hint() {
        let e = OfficeConvError::PdfiumBindingFailed("dlopen failed".into());
        assert!(e.to_string().contains("PDFIUM_LIB_PATH"));
    }
}
