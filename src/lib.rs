//! # officeconv
//!
//! Batch document conversions for office paperwork:
//!
//! * **Data cards**: every row of a spreadsheet becomes a PNG "card" of
//!   stacked `column : value` lines, written flat or grouped into one folder
//!   per entity, with shared attachments copied into each folder.
//! * **TIFF merge**: an ordered list of PNG/JPEG/TIFF images and PDFs becomes
//!   one multi-page compressed TIFF, PDFs expanded page by page at a chosen
//!   DPI.
//!
//! ## Why this crate?
//!
//! Both jobs are routinely done by hand: screenshotting rows to send as
//! images, or printing a stack of scans and PDFs to a TIFF driver for an
//! archive that only accepts TIFF. Doing them in a library keeps the
//! decisions (names, grouping, page order, compression, resolution)
//! explicit and repeatable.
//!
//! ## Pipeline Overview
//!
//! ```text
//! workbook ─▶ sheet ─▶ naming ─▶ card ─▶ PNG per row        (cards::generate)
//!
//! paths ─┬─ image ─▶ decode ──┐
//!        └─ pdf ───▶ pdfium ──┴─▶ RGB frames ─▶ TIFF        (merge::merge)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use officeconv::{generate, merge, Compression, GenerationConfig, MergeConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cards = GenerationConfig::builder()
//!         .naming_field("Case ID")
//!         .grouped(true)
//!         .share_dir("attachments")
//!         .build()?;
//!     let report = generate("cases.xlsx", "Sheet1", "out/cards", &cards)?;
//!     eprintln!("{} cards in {} folders", report.images.len(), report.groups);
//!
//!     let tiff = MergeConfig::builder()
//!         .compression(Compression::Lzw)
//!         .dpi(300)
//!         .build()?;
//!     merge(&["cover.png", "contract.pdf", "id.jpg"], "out/bundle.tif", &tiff)?;
//!     Ok(())
//! }
//! ```
//!
//! Async hosts use [`job::merge_to_tiff`] / [`job::generate_cards`], or the
//! event streams [`job::merge_events`] / [`job::generate_events`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `officeconv` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! officeconv = { version = "0.3", default-features = false }
//! ```
//!
//! ## PDFium
//!
//! PDF rasterisation uses the PDFium shared library, located or downloaded
//! on first use by the bundled `pdfium-auto` crate. Image-only merges and
//! card generation never load it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cards;
pub mod config;
pub mod error;
pub mod job;
pub mod merge;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cards::{generate, GenerationReport};
pub use config::{
    CardStyle, Compression, GenerationConfig, GenerationConfigBuilder, MergeConfig,
    MergeConfigBuilder, DEFAULT_DPI, DEFAULT_JPEG_QUALITY,
};
pub use error::OfficeConvError;
pub use job::{JobEvent, JobStream};
pub use merge::{merge, merge_dir, MergeReport};
pub use pipeline::inventory::{default_output_path, scan, SourceEntry, SourceKind};
pub use pipeline::render::{page_count, preview, rasterize, RasterFrame, PREVIEW_MAX_EDGE};
pub use pipeline::sheet::{list_columns, list_sheets, Record};
pub use progress::{ChannelProgress, NoopProgress, ProgressCallback, ProgressEvent, ProgressSink};
