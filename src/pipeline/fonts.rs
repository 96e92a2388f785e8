//! Font resolution for card rendering.
//!
//! Cards usually contain CJK text, which the built-in font cannot draw, so a
//! system CJK face is preferred. But no single face exists on every OS, so
//! resolution walks an ordered list of strategies and takes the first that
//! loads:
//!
//! ```text
//! explicit file ─▶ system family names ─▶ system file names ─▶ built-in Hack
//!  (style.font_path)  (STHeiti, YaHei, …)   (msyh.ttc, …)        (always works)
//! ```
//!
//! The built-in face is compiled into the binary, so resolution as a whole
//! cannot fail for lack of fonts.
//!
//! ## Why cache the system database?
//!
//! `fontdb::Database::load_system_fonts` scans every font directory on the
//! machine, which can take hundreds of milliseconds. It is done at most once
//! per process and only if a system strategy is actually reached.

use crate::config::CardStyle;
use crate::error::OfficeConvError;
use ab_glyph::{FontArc, FontVec};
use fontdb::{Database, Family, Query, Source, ID};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

static SYSTEM_FONTS: OnceLock<Database> = OnceLock::new();

fn system_fonts() -> &'static Database {
    SYSTEM_FONTS.get_or_init(|| {
        let mut db = Database::new();
        db.load_system_fonts();
        debug!("Indexed {} system font faces", db.len());
        db
    })
}

/// One way of obtaining a font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontStrategy {
    /// Read this file directly (face 0 of a collection).
    File(PathBuf),
    /// Ask the system database for a family name.
    Family(String),
    /// Find an installed font file by its file name, e.g. `msyh.ttc`.
    SystemFile(String),
    /// The font compiled into the binary.
    Builtin,
}

impl fmt::Display for FontStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontStrategy::File(p) => write!(f, "file {}", p.display()),
            FontStrategy::Family(name) => write!(f, "family '{name}'"),
            FontStrategy::SystemFile(name) => write!(f, "system file '{name}'"),
            FontStrategy::Builtin => f.write_str("built-in Hack"),
        }
    }
}

/// A loaded font and the strategy that produced it.
#[derive(Clone)]
pub struct ResolvedFont {
    pub font: FontArc,
    pub strategy: FontStrategy,
}

impl fmt::Debug for ResolvedFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedFont")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// The strategies `style` asks for, in order, always ending with
/// [`FontStrategy::Builtin`].
pub fn strategies(style: &CardStyle) -> Vec<FontStrategy> {
    let mut order = Vec::new();
    if let Some(path) = &style.font_path {
        order.push(FontStrategy::File(path.clone()));
    }
    order.extend(style.font_families.iter().cloned().map(FontStrategy::Family));
    order.extend(style.font_files.iter().cloned().map(FontStrategy::SystemFile));
    order.push(FontStrategy::Builtin);
    order
}

/// Try each strategy in turn; the first that loads wins.
pub fn resolve_font(style: &CardStyle) -> Result<ResolvedFont, OfficeConvError> {
    for strategy in strategies(style) {
        match load(&strategy) {
            Some(font) => {
                debug!("Card font: {}", strategy);
                return Ok(ResolvedFont { font, strategy });
            }
            None => {
                if let FontStrategy::File(_) = strategy {
                    warn!("Could not load card font {}; falling back", strategy);
                } else {
                    debug!("Card font {} unavailable", strategy);
                }
            }
        }
    }
    // Unreachable with an intact binary: the built-in face is a valid TTF.
    Err(OfficeConvError::Internal(
        "built-in card font failed to parse".into(),
    ))
}

fn load(strategy: &FontStrategy) -> Option<FontArc> {
    match strategy {
        FontStrategy::File(path) => load_file(path),
        FontStrategy::Family(name) => {
            let db = system_fonts();
            let id = db.query(&Query {
                families: &[Family::Name(name)],
                ..Query::default()
            })?;
            load_face(db, id)
        }
        FontStrategy::SystemFile(file_name) => {
            let db = system_fonts();
            let id = db
                .faces()
                .find(|face| face.index == 0 && source_file_name_is(&face.source, file_name))?
                .id;
            load_face(db, id)
        }
        FontStrategy::Builtin => builtin(),
    }
}

fn load_file(path: &Path) -> Option<FontArc> {
    let data = std::fs::read(path).ok()?;
    FontVec::try_from_vec_and_index(data, 0)
        .ok()
        .map(FontArc::new)
}

fn load_face(db: &Database, id: ID) -> Option<FontArc> {
    db.with_face_data(id, |data, index| {
        FontVec::try_from_vec_and_index(data.to_vec(), index).ok()
    })
    .flatten()
    .map(FontArc::new)
}

fn source_file_name_is(source: &Source, wanted: &str) -> bool {
    let path = match source {
        Source::File(path) => path,
        Source::SharedFile(path, _) => path,
        _ => return false,
    };
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.eq_ignore_ascii_case(wanted))
}

/// The compiled-in fallback face.
pub fn builtin() -> Option<FontArc> {
    FontArc::try_from_slice(epaint_default_fonts::HACK_REGULAR)
        .or_else(|_| FontArc::try_from_slice(epaint_default_fonts::UBUNTU_LIGHT))
        .ok()
}
