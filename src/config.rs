//! Configuration types for card generation and TIFF merging.
//!
//! Each pipeline takes one config struct, built via its builder. Keeping every
//! knob in one struct makes it trivial to hand a job to a worker thread, log
//! it, or diff two runs to understand why their outputs differ.
//!
//! # Design choice: validate in `build()`
//! Out-of-range values are rejected, not clamped: a DPI of 0 or a JPEG
//! quality of 250 is a caller bug, and silently "fixing" it would hide that.
//! The pipelines re-run the same checks on entry because the fields are
//! public and a config can be assembled without the builder.

use crate::error::OfficeConvError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default rasterisation and metadata resolution.
pub const DEFAULT_DPI: u32 = 200;

/// Upper bound for [`MergeConfig::dpi`]. An A4 page at 2400 DPI is already
/// ~20 000 × 28 000 px.
pub const MAX_DPI: u32 = 2400;

/// JPEG quality applied when [`Compression::Jpeg`] is chosen without an
/// explicit quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

// ── Compression ──────────────────────────────────────────────────────────

/// TIFF compression scheme for merged output.
///
/// Parsed from the tokens a UI or CLI presents: `raw`/`none`, `lzw`, `jpeg`,
/// `deflate`/`zlib`/`tiff_adobe_deflate`, `packbits`, `ccittfax4`/`fax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Uncompressed strips.
    #[serde(alias = "raw")]
    None,
    /// Lossless LZW.
    Lzw,
    /// Lossy baseline JPEG (TIFF compression 7). The only scheme that honours
    /// a quality setting. (default)
    #[default]
    Jpeg,
    /// Lossless zlib/deflate (Adobe-style, tag value 8).
    #[serde(alias = "zlib", alias = "tiff_adobe_deflate")]
    Deflate,
    /// Lossless run-length (Macintosh PackBits).
    #[serde(rename = "packbits")]
    PackBits,
    /// CCITT Group 4 fax. Only defined for bilevel images; merged frames are
    /// always RGB, so selecting it fails validation.
    #[serde(rename = "ccittfax4", alias = "fax")]
    Fax,
}

impl Compression {
    /// Every variant, in the order a picker should list them.
    pub const ALL: [Compression; 6] = [
        Compression::None,
        Compression::Lzw,
        Compression::Jpeg,
        Compression::Deflate,
        Compression::PackBits,
        Compression::Fax,
    ];

    /// Canonical token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "raw",
            Compression::Lzw => "lzw",
            Compression::Jpeg => "jpeg",
            Compression::Deflate => "deflate",
            Compression::PackBits => "packbits",
            Compression::Fax => "ccittfax4",
        }
    }

    /// Short human description for menus and `--help`.
    pub fn describe(&self) -> &'static str {
        match self {
            Compression::None => "no compression",
            Compression::Lzw => "LZW, lossless",
            Compression::Jpeg => "JPEG, lossy, smallest files",
            Compression::Deflate => "Deflate/zlib, lossless",
            Compression::PackBits => "PackBits run-length, lossless",
            Compression::Fax => "CCITT G4 fax, black-and-white only",
        }
    }

    pub fn is_lossy(&self) -> bool {
        matches!(self, Compression::Jpeg)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = OfficeConvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "none" => Ok(Compression::None),
            "lzw" => Ok(Compression::Lzw),
            "jpeg" | "jpg" => Ok(Compression::Jpeg),
            "deflate" | "zlib" | "tiff_adobe_deflate" => Ok(Compression::Deflate),
            "packbits" => Ok(Compression::PackBits),
            "ccittfax4" | "fax" | "group4" => Ok(Compression::Fax),
            other => Err(OfficeConvError::Validation(format!(
                "unknown compression '{other}' (expected one of: raw, lzw, jpeg, deflate, packbits, ccittfax4)"
            ))),
        }
    }
}

// ── MergeConfig ──────────────────────────────────────────────────────────

/// Parameters for [`crate::merge::merge`].
///
/// # Example
/// ```rust
/// use officeconv::{Compression, MergeConfig};
///
/// let config = MergeConfig::builder()
///     .compression(Compression::Jpeg)
///     .dpi(300)
///     .jpeg_quality(85)
///     .build()
///     .unwrap();
/// assert_eq!(config.effective_quality(), Some(85));
/// ```
#[derive(Clone)]
pub struct MergeConfig {
    /// Output compression. Default: [`Compression::Jpeg`].
    pub compression: Compression,

    /// PDF rasterisation DPI, also stamped into the TIFF X/Y resolution tags.
    /// Range: 1–2400. Default: 200.
    pub dpi: u32,

    /// JPEG quality 1–100. Only valid with [`Compression::Jpeg`]; `None`
    /// means [`DEFAULT_JPEG_QUALITY`].
    pub jpeg_quality: Option<u8>,

    /// Optional progress sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            dpi: DEFAULT_DPI,
            jpeg_quality: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for MergeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeConfig")
            .field("compression", &self.compression)
            .field("dpi", &self.dpi)
            .field("jpeg_quality", &self.jpeg_quality)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressSink>"),
            )
            .finish()
    }
}

impl MergeConfig {
    /// Create a new builder for `MergeConfig`.
    pub fn builder() -> MergeConfigBuilder {
        MergeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check every constraint. Called by `build()` and again by the merge
    /// pipeline before it touches the filesystem.
    pub fn validate(&self) -> Result<(), OfficeConvError> {
        if self.dpi == 0 || self.dpi > MAX_DPI {
            return Err(OfficeConvError::Validation(format!(
                "DPI must be 1–{MAX_DPI}, got {}",
                self.dpi
            )));
        }
        if self.compression == Compression::Fax {
            return Err(OfficeConvError::Validation(
                "ccittfax4 compression needs black-and-white frames; merged pages are RGB. \
                 Choose lzw, deflate, packbits, jpeg or raw"
                    .into(),
            ));
        }
        if let Some(q) = self.jpeg_quality {
            if !self.compression.is_lossy() {
                return Err(OfficeConvError::Validation(format!(
                    "JPEG quality is only valid with jpeg compression, not {}",
                    self.compression
                )));
            }
            if !(1..=100).contains(&q) {
                return Err(OfficeConvError::Validation(format!(
                    "JPEG quality must be 1–100, got {q}"
                )));
            }
        }
        Ok(())
    }

    /// Quality the encoder will actually use: `Some` only for JPEG.
    pub fn effective_quality(&self) -> Option<u8> {
        self.compression
            .is_lossy()
            .then(|| self.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY))
    }
}

/// Builder for [`MergeConfig`].
#[derive(Debug)]
pub struct MergeConfigBuilder {
    config: MergeConfig,
}

impl MergeConfigBuilder {
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = Some(quality);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<MergeConfig, OfficeConvError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Card style ───────────────────────────────────────────────────────────

/// Visual constants for rendered data cards.
///
/// The defaults produce 24 px black text on white, 25 px padding, and a
/// 1 px light-grey rule centred in each 15 px gap between lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardStyle {
    /// Font pixel height. Default: 24.
    pub font_size: f32,
    /// Outer margin on all four sides, in pixels. Default: 25.
    pub padding: u32,
    /// Vertical gap between consecutive lines (the rule sits inside it). Default: 15.
    pub line_spacing: u32,
    /// Separator rule thickness. Default: 1.
    pub separator_thickness: u32,
    pub separator_color: [u8; 3],
    pub text_color: [u8; 3],
    pub background: [u8; 3],
    /// Placed between key and value. Default: `" : "`.
    pub key_value_separator: String,
    /// Explicit font file; tried before any system lookup.
    pub font_path: Option<PathBuf>,
    /// System font family names, tried in order. CJK-capable faces first.
    pub font_families: Vec<String>,
    /// System font file names (e.g. `msyh.ttc`), tried after the families.
    pub font_files: Vec<String>,
}

impl Default for CardStyle {
    fn default() -> Self {
        Self {
            font_size: 24.0,
            padding: 25,
            line_spacing: 15,
            separator_thickness: 1,
            separator_color: [220, 220, 220],
            text_color: [0, 0, 0],
            background: [255, 255, 255],
            key_value_separator: " : ".to_string(),
            font_path: None,
            font_families: vec![
                "STHeiti Medium".into(),
                "STHeiti".into(),
                "Microsoft YaHei".into(),
                "Noto Sans CJK SC".into(),
            ],
            font_files: vec!["STHeiti Medium.ttc".into(), "msyh.ttc".into()],
        }
    }
}

impl CardStyle {
    /// A style that skips system font discovery and renders with the
    /// built-in font. Output is identical on every machine.
    pub fn builtin_font() -> Self {
        Self {
            font_families: Vec::new(),
            font_files: Vec::new(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), OfficeConvError> {
        if !self.font_size.is_finite() || self.font_size <= 0.0 || self.font_size > 512.0 {
            return Err(OfficeConvError::Validation(format!(
                "font size must be in (0, 512], got {}",
                self.font_size
            )));
        }
        Ok(())
    }
}

// ── GenerationConfig ─────────────────────────────────────────────────────

/// Parameters for [`crate::cards::generate`].
///
/// # Example
/// ```rust
/// use officeconv::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .naming_field("Case ID")
///     .grouped(true)
///     .share_dir("attachments")
///     .build()
///     .unwrap();
/// assert!(config.grouped);
/// ```
#[derive(Clone, Default)]
pub struct GenerationConfig {
    /// Column whose value names the output files (flat) or folders (grouped).
    /// `None` or a column that doesn't exist means `row_<n>.png` naming.
    pub naming_field: Option<String>,

    /// Partition rows into one folder per distinct naming-field value.
    /// Ignored (flat mode) when `naming_field` is not a column of the sheet.
    pub grouped: bool,

    /// Directory whose regular files are copied into every group folder.
    /// Ignored in flat mode or when the directory does not exist.
    pub share_dir: Option<PathBuf>,

    /// Card appearance.
    pub style: CardStyle,

    /// Optional progress sink (one step per row).
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("naming_field", &self.naming_field)
            .field("grouped", &self.grouped)
            .field("share_dir", &self.share_dir)
            .field("style", &self.style)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressSink>"),
            )
            .finish()
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn validate(&self) -> Result<(), OfficeConvError> {
        self.style.validate()
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    /// Set the naming column. A blank name clears it.
    pub fn naming_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.config.naming_field = (!field.trim().is_empty()).then_some(field);
        self
    }

    pub fn grouped(mut self, grouped: bool) -> Self {
        self.config.grouped = grouped;
        self
    }

    pub fn share_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.share_dir = Some(dir.into());
        self
    }

    pub fn style(mut self, style: CardStyle) -> Self {
        self.config.style = style;
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.style.font_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, OfficeConvError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
