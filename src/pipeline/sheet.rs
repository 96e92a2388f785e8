//! Workbook access: sheet names, column headers, and rows as display strings.
//!
//! Any format `calamine` can auto-detect (xlsx, xlsm, xlsb, xls, ods) works.
//!
//! ## Why normalise to strings up front?
//!
//! Every downstream consumer (card text, file names, group keys) wants text.
//! Converting once, with a single rule for "missing" values, means an empty
//! cell, a `NaN`, an Excel error like `#N/A`, and the literal strings `nan` /
//! `NaN` / `NaT` that exported CSV-turned-workbooks are full of all become the
//! same `""`. Grouping and naming then never see two spellings of "nothing".

use crate::error::OfficeConvError;
use calamine::{open_workbook_auto, Data, DataRef, Reader, Sheets, Xlsx, XlsxError};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::{debug, info};

/// String cell values treated as missing.
const MISSING_SENTINELS: [&str; 3] = ["nan", "NaN", "NaT"];

/// One spreadsheet row: `(column, value)` pairs in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Value of `column`, if the record has that column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A fully loaded sheet.
#[derive(Debug, Clone, Default)]
pub struct SheetData {
    /// Unique column names, in sheet order.
    pub columns: Vec<String>,
    /// Every data row below the header, in sheet order.
    pub records: Vec<Record>,
}

impl SheetData {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

// ── Cell normalisation ───────────────────────────────────────────────────

/// Map a text cell to its display form: missing-value sentinels become `""`,
/// everything else is kept verbatim.
pub fn normalize_text(text: &str) -> String {
    if MISSING_SENTINELS.contains(&text) {
        String::new()
    } else {
        text.to_string()
    }
}

/// Render any cell as display text.
///
/// | Cell                    | Text                                   |
/// |-------------------------|----------------------------------------|
/// | empty, error, NaN       | `""`                                   |
/// | integer / integral float| `42`                                   |
/// | other float             | shortest round-trip form, `3.25`       |
/// | bool                    | `True` / `False`                       |
/// | date-time               | `2024-01-05 12:00:00`                  |
/// | time of day             | `12:30:00`                             |
/// | string                  | verbatim, sentinels → `""`             |
pub fn normalize_cell(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => (if *b { "True" } else { "False" }).to_string(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => normalize_text(s),
        Data::DateTime(dt) => {
            let (y, mo, d, h, mi, s, ms) = dt.to_ymd_hms_milli();
            let time = if ms > 0 {
                format!("{h:02}:{mi:02}:{s:02}.{ms:03}000")
            } else {
                format!("{h:02}:{mi:02}:{s:02}")
            };
            if dt.is_duration() || (0.0..1.0).contains(&dt.as_f64()) {
                time
            } else {
                format!("{y:04}-{mo:02}-{d:02} {time}")
            }
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        String::new()
    } else if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Turn the header row into unique, non-empty column names.
///
/// Blank headers become `Unnamed: <index>`; repeated names get `.1`, `.2`, …
/// appended, so every [`Record`] key is distinct.
fn header_names(cells: &[Data]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(cells.len());

    for (idx, cell) in cells.iter().enumerate() {
        let mut base = normalize_cell(cell);
        if base.trim().is_empty() {
            base = format!("Unnamed: {idx}");
        }
        let mut name = base.clone();
        if let Some(&used) = seen.get(&base) {
            let mut n = used;
            loop {
                n += 1;
                name = format!("{base}.{n}");
                if !seen.contains_key(&name) {
                    break;
                }
            }
            seen.insert(base, n);
        }
        seen.entry(name.clone()).or_insert(0);
        names.push(name);
    }
    names
}

// ── Workbook access ──────────────────────────────────────────────────────

fn open(path: &Path) -> Result<Sheets<BufReader<File>>, OfficeConvError> {
    open_workbook_auto(path).map_err(|e| OfficeConvError::source_read(path, e))
}

fn sheet_error(path: &Path, sheet: &str, detail: impl ToString) -> OfficeConvError {
    OfficeConvError::SourceRead {
        path: path.to_path_buf(),
        sheet: Some(sheet.to_string()),
        detail: detail.to_string(),
    }
}

fn read_range(
    path: &Path,
    sheet: &str,
) -> Result<calamine::Range<Data>, OfficeConvError> {
    let mut workbook = open(path)?;
    workbook
        .worksheet_range(sheet)
        .map_err(|e| sheet_error(path, sheet, e))
}

/// Header cells of an xlsx sheet, streamed from the sheet XML.
///
/// Reading stops at the first cell past the header row. The header spans
/// the sheet's recorded dimension, so it lines up column for column with
/// the first row of the full range.
fn xlsx_header<RS: Read + Seek>(
    xlsx: &mut Xlsx<RS>,
    sheet: &str,
) -> Result<Vec<Data>, XlsxError> {
    let mut reader = xlsx.worksheet_cells_reader(sheet)?;
    let dims = reader.dimensions();

    let mut header_row = None;
    let mut cells: Vec<(u32, Data)> = Vec::new();
    while let Some(cell) = reader.next_cell()? {
        if matches!(cell.get_value(), DataRef::Empty) {
            continue;
        }
        let (row, col) = cell.get_position();
        match header_row {
            None => header_row = Some(row),
            Some(first) if row != first => break,
            Some(_) => {}
        }
        cells.push((col, Data::from(cell.get_value().clone())));
    }

    let (Some(min_col), Some(max_col)) = (
        cells.iter().map(|(c, _)| *c).min(),
        cells.iter().map(|(c, _)| *c).max(),
    ) else {
        return Ok(Vec::new());
    };
    let first = dims.start.1.min(min_col);
    let last = dims.end.1.max(max_col);

    let mut header = vec![Data::Empty; (last - first + 1) as usize];
    for (col, value) in cells {
        header[(col - first) as usize] = value;
    }
    Ok(header)
}

/// Sheet names in workbook order.
///
/// # Errors
/// [`OfficeConvError::SourceRead`] if the file cannot be opened or parsed.
pub fn list_sheets(path: &Path) -> Result<Vec<String>, OfficeConvError> {
    let workbook = open(path)?;
    Ok(workbook.sheet_names())
}

/// Column names of `sheet`, taken from its first row.
///
/// Names are made unique the same way [`load_sheet`] does, so the result can
/// be offered directly as naming-field choices. An empty sheet has no
/// columns.
///
/// xlsx/xlsm sheets are streamed and only the header row is decoded. Other
/// formats have no row-level reader in `calamine`, so their sheet is loaded
/// whole and every row after the first is discarded.
pub fn list_columns(path: &Path, sheet: &str) -> Result<Vec<String>, OfficeConvError> {
    let mut workbook = open(path)?;
    if let Sheets::Xlsx(xlsx) = &mut workbook {
        let header = xlsx_header(xlsx, sheet).map_err(|e| sheet_error(path, sheet, e))?;
        return Ok(if header.is_empty() {
            Vec::new()
        } else {
            header_names(&header)
        });
    }

    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| sheet_error(path, sheet, e))?;
    Ok(range
        .rows()
        .next()
        .map(header_names)
        .unwrap_or_default())
}

/// Load every row of `sheet` as normalised [`Record`]s.
///
/// The first row is the header. Rows are kept in sheet order, including rows
/// whose cells are all blank.
pub fn load_sheet(path: &Path, sheet: &str) -> Result<SheetData, OfficeConvError> {
    let range = read_range(path, sheet)?;
    let mut rows = range.rows();

    let Some(header) = rows.next() else {
        debug!("Sheet '{}' in {} is empty", sheet, path.display());
        return Ok(SheetData::default());
    };
    let columns = header_names(header);

    let records: Vec<Record> = rows
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    let value = row.get(i).map(normalize_cell).unwrap_or_default();
                    (col.clone(), value)
                })
                .collect()
        })
        .collect();

    info!(
        "Loaded sheet '{}': {} columns, {} rows",
        sheet,
        columns.len(),
        records.len()
    );
    Ok(SheetData { columns, records })
}
