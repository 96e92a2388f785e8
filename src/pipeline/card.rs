//! Render one [`Record`] as a "data card": stacked `key : value` entries on a
//! white canvas, separated by thin grey rules.
//!
//! ```text
//!  ┌──────────────────────────────┐
//!  │ pad                          │
//!  │   Name : Alice               │  ← line height from font metrics
//!  │   ────────────────────────   │  ← rule centred in the entry gap
//!  │   Note : first line          │  ← a value with line breaks keeps
//!  │   second line                │    them, inside one entry
//!  │                          pad │
//!  └──────────────────────────────┘
//!   width  = widest text row + 2 × padding
//!   height = 2 × padding + rows × line_height + (entries − 1) × (spacing + rule)
//! ```
//!
//! ## Why a fixed line height?
//!
//! Measuring each line's ink box makes a line of `a`s shorter than a line of
//! `Ág`s and the rules drift. Using the font's ascent-to-descent extent for
//! every line keeps rules evenly spaced and makes card height a pure function
//! of the line count.

use crate::config::CardStyle;
use crate::error::OfficeConvError;
use crate::pipeline::fonts::{resolve_font, FontStrategy, ResolvedFont};
use crate::pipeline::sheet::Record;
use ab_glyph::{Font, PxScale, ScaleFont};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::debug;

/// Measured geometry of a card, before any pixels are drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLayout {
    pub width: u32,
    pub height: u32,
    pub line_height: u32,
    /// One entry per record field, top to bottom. Each entry holds its text
    /// rows (more than one when the value contains line breaks) with their
    /// measured widths.
    pub entries: Vec<Vec<(String, u32)>>,
}

impl CardLayout {
    pub fn widest_line(&self) -> u32 {
        self.entries
            .iter()
            .flatten()
            .map(|(_, w)| *w)
            .max()
            .unwrap_or(0)
    }

    /// Text rows across all entries.
    pub fn row_count(&self) -> usize {
        self.entries.iter().map(Vec::len).sum()
    }
}

/// Card renderer bound to one style and one resolved font.
///
/// Resolve once, render many: font discovery happens in [`CardRenderer::new`],
/// so a generation run of ten thousand rows loads the font a single time.
#[derive(Debug, Clone)]
pub struct CardRenderer {
    style: CardStyle,
    font: ResolvedFont,
    scale: PxScale,
    line_height: u32,
}

impl CardRenderer {
    pub fn new(style: CardStyle) -> Result<Self, OfficeConvError> {
        style.validate()?;
        let font = resolve_font(&style)?;
        let scale = PxScale::from(style.font_size);
        let scaled = font.font.as_scaled(scale);
        let line_height = (scaled.ascent() - scaled.descent()).ceil().max(1.0) as u32;
        Ok(Self {
            style,
            font,
            scale,
            line_height,
        })
    }

    /// Which font strategy won.
    pub fn font_strategy(&self) -> &FontStrategy {
        &self.font.strategy
    }

    pub fn style(&self) -> &CardStyle {
        &self.style
    }

    /// Build the text of each entry for `record`. Whitespace-only values
    /// render as empty; line breaks inside a value are kept.
    pub fn lines(&self, record: &Record) -> Vec<String> {
        record
            .iter()
            .map(|(key, value)| {
                let value = if value.trim().is_empty() { "" } else { value };
                format!("{key}{}{value}", self.style.key_value_separator)
            })
            .collect()
    }

    /// Measure `record` without drawing.
    pub fn layout(&self, record: &Record) -> CardLayout {
        let s = &self.style;
        let entries: Vec<Vec<(String, u32)>> = self
            .lines(record)
            .iter()
            .map(|entry| {
                entry
                    .split('\n')
                    .map(|row| {
                        let row = row.strip_suffix('\r').unwrap_or(row);
                        let (w, _) = text_size(self.scale, &self.font.font, row);
                        (row.to_string(), w)
                    })
                    .collect()
            })
            .collect();

        let rows: u32 = entries.iter().map(|e| e.len() as u32).sum();
        let gaps = (entries.len() as u32).saturating_sub(1);
        let widest = entries
            .iter()
            .flatten()
            .map(|(_, w)| *w)
            .max()
            .unwrap_or(0);

        CardLayout {
            width: widest + 2 * s.padding,
            height: 2 * s.padding
                + rows * self.line_height
                + gaps * (s.line_spacing + s.separator_thickness),
            line_height: self.line_height,
            entries,
        }
    }

    /// Draw `record` into an in-memory RGB image.
    pub fn draw(&self, record: &Record) -> RgbImage {
        let s = &self.style;
        let layout = self.layout(record);
        let mut canvas = RgbImage::from_pixel(
            layout.width.max(1),
            layout.height.max(1),
            Rgb(s.background),
        );

        let rule_width = layout.width.saturating_sub(2 * s.padding);
        let above_rule = s.line_spacing / 2;
        let below_rule = s.line_spacing - above_rule;
        let last = layout.entries.len().saturating_sub(1);

        let mut y = s.padding;
        for (i, rows) in layout.entries.iter().enumerate() {
            for (row, _) in rows {
                draw_text_mut(
                    &mut canvas,
                    Rgb(s.text_color),
                    s.padding as i32,
                    y as i32,
                    self.scale,
                    &self.font.font,
                    row,
                );
                y += layout.line_height;
            }

            if i == last {
                break;
            }
            y += above_rule;
            if rule_width > 0 && s.separator_thickness > 0 {
                draw_filled_rect_mut(
                    &mut canvas,
                    Rect::at(s.padding as i32, y as i32).of_size(rule_width, s.separator_thickness),
                    Rgb(s.separator_color),
                );
            }
            y += s.separator_thickness + below_rule;
        }
        canvas
    }

    /// Render `record` and write it as a PNG at `path`, replacing any
    /// existing file.
    pub fn render(&self, record: &Record, path: &Path) -> Result<(), OfficeConvError> {
        let canvas = self.draw(record);
        canvas
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| OfficeConvError::ImageWrite {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        debug!(
            "Card {}x{} → {}",
            canvas.width(),
            canvas.height(),
            path.display()
        );
        Ok(())
    }
}
