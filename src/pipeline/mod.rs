//! Pipeline stages shared by card generation and TIFF merging.
//!
//! Each submodule implements exactly one step and is blocking; the
//! orchestration in [`crate::cards`] and [`crate::merge`] strings them
//! together, and [`crate::job`] moves whole runs off the async executor.
//!
//! ## Data Flow
//!
//! ```text
//! cards:  sheet ──▶ naming ──▶ card (+ fonts) ──▶ PNG files
//!        (calamine) (groups,     (ab_glyph +
//!                    file names)  imageproc)
//!
//! merge:  inventory ──▶ render ──▶ tiff ──▶ one multi-page TIFF
//!         (scan dir)    (pdfium,   (tiff crate,
//!                        image)     temp file + rename)
//! ```
//!
//! 1. [`sheet`]: workbook introspection and cell normalisation
//! 2. [`naming`]: sanitising, first-encounter grouping, collision-free names
//! 3. [`fonts`]: ordered font strategies ending in a built-in face
//! 4. [`card`]: measure and draw one record
//! 5. [`inventory`]: list mergeable sources in a directory
//! 6. [`render`]: rasterise PDF pages, decode images, previews
//! 7. [`tiff`]: encode frames as one multi-page TIFF

pub mod card;
pub mod fonts;
pub mod inventory;
pub mod naming;
pub mod render;
pub mod sheet;
pub mod tiff;
