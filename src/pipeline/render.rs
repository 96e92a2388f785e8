//! Source decoding: rasterise PDF pages via pdfium, decode raster images via
//! `image`, and build previews from either.
//!
//! Everything here is blocking. The async layer in [`crate::job`] moves calls
//! onto `spawn_blocking`.
//!
//! ## Why a process-wide pdfium lock?
//!
//! pdfium keeps global state and is not re-entrant. The `thread_safe` feature
//! of `pdfium-render` serialises individual FFI calls, but a document handle
//! opened on one thread and a second `FPDF_InitLibrary` on another still
//! interfere. Holding [`PDFIUM_LOCK`] for the lifetime of each document makes
//! concurrent callers (tests, multiple jobs in one host) queue up instead.
//!
//! ## Why scale by DPI, not by target pixels?
//!
//! The merged TIFF stamps the same DPI into its resolution tags. Rendering at
//! `dpi / 72` points-to-pixels keeps the physical page size in the output
//! exactly what it was in the PDF, which matters when the TIFF is printed or
//! archived.

use crate::config::DEFAULT_DPI;
use crate::error::OfficeConvError;
use image::imageops::FilterType;
use image::RgbImage;
use pdfium_render::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tiff::decoder::{Decoder, DecodingResult};
use tracing::{debug, info, warn};

use super::inventory::SourceKind;

static PDFIUM_LOCK: Mutex<()> = Mutex::new(());

/// Default bounding box for [`preview`].
pub const PREVIEW_MAX_EDGE: u32 = 800;

/// One decoded page or image, always 8-bit RGB.
#[derive(Debug, Clone)]
pub struct RasterFrame {
    /// File the frame came from.
    pub source: PathBuf,
    /// 0-based page index for PDF frames; `None` for raster images.
    pub page: Option<usize>,
    pub image: RgbImage,
}

impl RasterFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Run `f` with a bound PDFium instance while holding the process-wide
/// PDFium lock.
///
/// Every PDF operation in this crate goes through here. Host code that
/// needs PDFium itself (building fixtures, reading metadata) should too, so
/// it never initialises or tears down the library under a running merge.
pub fn with_pdfium<T>(
    f: impl FnOnce(&Pdfium) -> Result<T, OfficeConvError>,
) -> Result<T, OfficeConvError> {
    let _guard = PDFIUM_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let pdfium = pdfium_auto::bind_pdfium_silent()
        .map_err(|e| OfficeConvError::PdfiumBindingFailed(e.to_string()))?;
    f(&pdfium)
}

fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, OfficeConvError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| OfficeConvError::source_read(path, format!("{e:?}")))
}

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<usize, OfficeConvError> {
    with_pdfium(|pdfium| Ok(open_document(pdfium, path)?.pages().len() as usize))
}

/// Rasterise pages of the PDF at `path` at `dpi`.
///
/// `pages = None` renders every page in document order. Otherwise indices
/// are rendered in the order given; indices outside `[0, page_count)` are
/// skipped with a warning, never an error.
///
/// # Errors
/// [`OfficeConvError::SourceRead`] if the document cannot be opened or a
/// page fails to render.
pub fn rasterize(
    path: &Path,
    pages: Option<&[usize]>,
    dpi: u32,
) -> Result<Vec<RasterFrame>, OfficeConvError> {
    with_pdfium(|pdfium| {
        let document = open_document(pdfium, path)?;
        let doc_pages = document.pages();
        let total = doc_pages.len() as usize;
        debug!("{}: {} page(s)", path.display(), total);

        let indices: Vec<usize> = match pages {
            None => (0..total).collect(),
            Some(wanted) => wanted
                .iter()
                .copied()
                .filter(|&idx| {
                    let ok = idx < total;
                    if !ok {
                        warn!(
                            "Skipping page index {} of {} (document has {} pages)",
                            idx,
                            path.display(),
                            total
                        );
                    }
                    ok
                })
                .collect(),
        };

        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
        let mut frames = Vec::with_capacity(indices.len());

        for idx in indices {
            let page_error = |e: PdfiumError| OfficeConvError::SourceRead {
                path: path.to_path_buf(),
                sheet: None,
                detail: format!("page {}: {e:?}", idx + 1),
            };
            let page = doc_pages.get(idx as PdfPageIndex).map_err(page_error)?;
            let bitmap = page.render_with_config(&render_config).map_err(page_error)?;
            let image = bitmap.as_image().into_rgb8();
            debug!(
                "Rendered {} page {} → {}x{} px",
                path.display(),
                idx + 1,
                image.width(),
                image.height()
            );
            frames.push(RasterFrame {
                source: path.to_path_buf(),
                page: Some(idx),
                image,
            });
        }

        info!(
            "Rasterised {} page(s) of {} at {} DPI",
            frames.len(),
            path.display(),
            dpi
        );
        Ok(frames)
    })
}

/// Decode a raster image (PNG, JPEG, TIFF) and normalise it to RGB.
///
/// Alpha is dropped, grey is expanded, 16-bit is narrowed. Multi-page TIFFs
/// contribute their first page only.
///
/// JPEG-compressed TIFFs (scanner output, and this crate's own default
/// merge output) store YCbCr samples, which `image` refuses. Those are read
/// with the `tiff` decoder and converted to RGB here.
pub fn decode_image(path: &Path) -> Result<RasterFrame, OfficeConvError> {
    let image = match decode_with_image(path) {
        Ok(image) => image,
        Err(err) if has_tiff_extension(path) => match decode_ycbcr_tiff(path) {
            Some(image) => image,
            None => return Err(err),
        },
        Err(err) => return Err(err),
    };
    Ok(RasterFrame {
        source: path.to_path_buf(),
        page: None,
        image,
    })
}

fn decode_with_image(path: &Path) -> Result<RgbImage, OfficeConvError> {
    Ok(image::ImageReader::open(path)
        .map_err(|e| OfficeConvError::source_read(path, e))?
        .with_guessed_format()
        .map_err(|e| OfficeConvError::source_read(path, e))?
        .decode()
        .map_err(|e| OfficeConvError::source_read(path, e))?
        .into_rgb8())
}

fn has_tiff_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
}

/// First page of an 8-bit YCbCr TIFF as RGB. `None` for any other layout or
/// on a decoding failure, so the caller reports the original error.
fn decode_ycbcr_tiff(path: &Path) -> Option<RgbImage> {
    let attempt = || -> Result<Option<RgbImage>, tiff::TiffError> {
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?;
        if decoder.colortype()? != tiff::ColorType::YCbCr(8) {
            return Ok(None);
        }
        let (w, h) = decoder.dimensions()?;
        let DecodingResult::U8(samples) = decoder.read_image()? else {
            return Ok(None);
        };
        let rgb: Vec<u8> = samples
            .chunks_exact(3)
            .flat_map(|px| ycbcr_to_rgb([px[0], px[1], px[2]]))
            .collect();
        Ok(RgbImage::from_raw(w, h, rgb))
    };

    match attempt() {
        Ok(image) => {
            if image.is_some() {
                debug!("{}: decoded as YCbCr TIFF", path.display());
            }
            image
        }
        Err(e) => {
            debug!("{}: YCbCr TIFF fallback failed: {}", path.display(), e);
            None
        }
    }
}

/// Full-range (JFIF) YCbCr to RGB.
fn ycbcr_to_rgb([y, cb, cr]: [u8; 3]) -> [u8; 3] {
    let y = f32::from(y);
    let cb = f32::from(cb) - 128.0;
    let cr = f32::from(cr) - 128.0;
    let clamp = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * cr),
        clamp(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp(y + 1.772 * cb),
    ]
}

/// A display-sized rendering of `path`.
///
/// PDFs show their first page rendered at [`DEFAULT_DPI`] (the same default
/// the merge uses); images are decoded as-is. The result is scaled down,
/// preserving aspect ratio, to fit within `max_edge × max_edge`; smaller
/// images are returned at their natural size.
pub fn preview(path: &Path, max_edge: u32) -> Result<RgbImage, OfficeConvError> {
    let image = match SourceKind::from_path(path) {
        Some(SourceKind::Pdf) => rasterize(path, Some(&[0]), DEFAULT_DPI)?
            .into_iter()
            .next()
            .map(|frame| frame.image)
            .ok_or_else(|| OfficeConvError::source_read(path, "document has no pages"))?,
        _ => decode_image(path)?.image,
    };
    Ok(fit_within(image, max_edge.max(1)))
}

fn fit_within(image: RgbImage, max_edge: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w <= max_edge && h <= max_edge {
        return image;
    }
    let ratio = f64::from(max_edge) / f64::from(w.max(h));
    let nw = ((f64::from(w) * ratio).round() as u32).max(1);
    let nh = ((f64::from(h) * ratio).round() as u32).max(1);
    image::imageops::resize(&image, nw, nh, FilterType::Triangle)
}
