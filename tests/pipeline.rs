//! Integration tests for both pipelines, through the public API only.
//!
//! Workbooks are generated with `rust_xlsxwriter` and images with `image`
//! into throwaway temp directories. Tests that need PDFium (to build or
//! rasterise PDFs) print `SKIP` and return when the library is not available
//! locally; set `PDFIUM_LIB_PATH` or run the CLI once to enable them.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use officeconv::pipeline::render::with_pdfium;
use officeconv::{
    generate, list_columns, list_sheets, merge, scan, CardStyle, Compression, GenerationConfig,
    MergeConfig, OfficeConvError, ProgressCallback, ProgressSink,
};
use pdfium_render::prelude::{PdfPagePaperSize, PdfPoints};
use rust_xlsxwriter::Workbook;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tiff::decoder::Decoder;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test when the PDFium shared library is not available.
macro_rules! skip_unless_pdfium {
    () => {
        if !pdfium_auto::is_pdfium_cached() {
            println!("SKIP: PDFium not available (set PDFIUM_LIB_PATH or run the CLI once)");
            return;
        }
    };
}

/// Write a workbook with one sheet per `(name, rows)`. Row 0 is the header;
/// empty strings leave the cell blank.
fn workbook(path: &Path, sheets: &[(&str, &[&[&str]])]) {
    let mut book = Workbook::new();
    for (name, rows) in sheets {
        let sheet = book.add_worksheet();
        sheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    sheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
    }
    book.save(path).unwrap();
}

/// Renders with the compiled-in font so results do not depend on the host.
fn cards_config() -> GenerationConfig {
    GenerationConfig {
        style: CardStyle::builtin_font(),
        ..GenerationConfig::default()
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn relative(paths: &[PathBuf], base: &Path) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.strip_prefix(base)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

/// Dimensions of every page of a TIFF, in file order.
fn tiff_pages(path: &Path) -> Vec<(u32, u32)> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path).unwrap())).unwrap();
    let mut pages = vec![decoder.dimensions().unwrap()];
    while decoder.more_images() {
        decoder.next_image().unwrap();
        pages.push(decoder.dimensions().unwrap());
    }
    pages
}

fn solid_png(path: &Path, w: u32, h: u32) {
    RgbImage::from_pixel(w, h, Rgb([30, 120, 220])).save(path).unwrap();
}

fn blank_pdf(path: &Path, pages: &[(f32, f32)]) {
    with_pdfium(|pdfium| {
        let mut doc = pdfium.create_new_pdf().unwrap();
        for &(w, h) in pages {
            doc.pages_mut()
                .create_page_at_end(PdfPagePaperSize::new_custom(
                    PdfPoints::new(w),
                    PdfPoints::new(h),
                ))
                .unwrap();
        }
        doc.save_to_file(path).unwrap();
        Ok(())
    })
    .unwrap();
}

#[derive(Default)]
struct Recorder {
    percents: Mutex<Vec<u8>>,
    statuses: Mutex<Vec<String>>,
}

impl ProgressSink for Recorder {
    fn on_progress(&self, percent: u8) {
        self.percents.lock().unwrap().push(percent);
    }

    fn on_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }
}

// ── Spreadsheet introspection ────────────────────────────────────────────────

#[test]
fn sheets_and_columns_in_workbook_order() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("book.xlsx");
    workbook(
        &book,
        &[
            ("Orders", &[&["Id", "Customer", "Total"], &["1", "Ann", "9"]]),
            ("Staff", &[&["Name", "", "Name"]]),
        ],
    );

    assert_eq!(list_sheets(&book).unwrap(), vec!["Orders", "Staff"]);
    assert_eq!(
        list_columns(&book, "Orders").unwrap(),
        vec!["Id", "Customer", "Total"]
    );
    assert_eq!(
        list_columns(&book, "Staff").unwrap(),
        vec!["Name", "Unnamed: 1", "Name.1"]
    );
}

#[test]
fn unknown_sheet_is_source_read_with_sheet_name() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("book.xlsx");
    workbook(&book, &[("Only", &[&["A"]])]);

    match list_columns(&book, "Missing").unwrap_err() {
        OfficeConvError::SourceRead { sheet, .. } => assert_eq!(sheet.as_deref(), Some("Missing")),
        other => panic!("expected SourceRead, got {other}"),
    }
}

// ── Card generation: flat ────────────────────────────────────────────────────

#[test]
fn flat_names_dedupe_in_row_order() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("people.xlsx");
    workbook(
        &book,
        &[(
            "Sheet1",
            &[&["Name", "City"], &["A", "Lyon"], &["A", "Oslo"], &["B", "Rome"]],
        )],
    );
    let out = dir.path().join("cards");

    let config = GenerationConfig {
        naming_field: Some("Name".into()),
        ..cards_config()
    };
    let report = generate(&book, "Sheet1", &out, &config).unwrap();

    assert_eq!(report.rows, 3);
    assert_eq!(report.groups, 0);
    assert_eq!(relative(&report.images, &out), vec!["A.png", "A_1.png", "B.png"]);
    assert_eq!(file_names(&out), vec!["A.png", "A_1.png", "B.png"]);
}

#[test]
fn flat_without_naming_field_uses_row_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("rows.xlsx");
    workbook(&book, &[("S", &[&["k", "v"], &["a", "1"], &["b", "2"]])]);
    let out = dir.path().join("deeply").join("nested").join("out");

    let report = generate(&book, "S", &out, &cards_config()).unwrap();
    assert_eq!(relative(&report.images, &out), vec!["row_1.png", "row_2.png"]);
    assert!(out.is_dir());
}

#[test]
fn flat_blank_or_punctuation_names_fall_back_to_row_index() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("rows.xlsx");
    workbook(
        &book,
        &[("S", &[&["Name", "x"], &["", "1"], &["#?!", "2"], &["ok", "3"]])],
    );
    let out = dir.path().join("out");

    let config = GenerationConfig {
        naming_field: Some("Name".into()),
        ..cards_config()
    };
    let report = generate(&book, "S", &out, &config).unwrap();
    assert_eq!(
        relative(&report.images, &out),
        vec!["row_1.png", "row_2.png", "ok.png"]
    );
}

#[test]
fn flat_rerun_never_overwrites_previous_cards() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("rows.xlsx");
    workbook(&book, &[("S", &[&["Name"], &["A"]])]);
    let out = dir.path().join("out");
    let config = GenerationConfig {
        naming_field: Some("Name".into()),
        ..cards_config()
    };

    generate(&book, "S", &out, &config).unwrap();
    let second = generate(&book, "S", &out, &config).unwrap();
    assert_eq!(relative(&second.images, &out), vec!["A_1.png"]);
    assert_eq!(file_names(&out), vec!["A.png", "A_1.png"]);
}

#[test]
fn cards_are_valid_pngs_with_one_line_per_column() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("rows.xlsx");
    workbook(
        &book,
        &[("S", &[&["a", "b"], &["1", "2"]]), ("T", &[&["a", "b", "c"], &["1", "2", "3"]])],
    );

    let two = generate(&book, "S", dir.path().join("two"), &cards_config()).unwrap();
    let three = generate(&book, "T", dir.path().join("three"), &cards_config()).unwrap();

    let img2 = image::open(&two.images[0]).unwrap();
    let img3 = image::open(&three.images[0]).unwrap();
    assert!(img3.height() > img2.height());
}

// ── Card generation: grouped ─────────────────────────────────────────────────

#[test]
fn grouped_folders_sanitise_keys_and_copy_shared_files() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("cases.xlsx");
    workbook(
        &book,
        &[(
            "Cases",
            &[
                &["Case", "Note"],
                &["Case #1/2024", "first"],
                &["!!!", "odd"],
                &["Case #1/2024", "second"],
                &["B", "third"],
            ],
        )],
    );
    let share = dir.path().join("share");
    fs::create_dir(&share).unwrap();
    fs::write(share.join("form.pdf"), b"%PDF").unwrap();
    fs::write(share.join("readme.txt"), b"hi").unwrap();
    fs::create_dir(share.join("nested")).unwrap();

    let out = dir.path().join("out");
    let config = GenerationConfig {
        naming_field: Some("Case".into()),
        grouped: true,
        share_dir: Some(share),
        ..cards_config()
    };
    let report = generate(&book, "Cases", &out, &config).unwrap();

    assert_eq!(report.groups, 3);
    assert_eq!(report.shared_files_copied, 6);
    assert_eq!(
        relative(&report.images, &out),
        vec![
            "Case 12024/Case 12024_1.png",
            "Case 12024/Case 12024_2.png",
            "group_1/group_1_1.png",
            "B/B_1.png",
        ]
    );
    assert_eq!(
        file_names(&out.join("Case 12024")),
        vec!["Case 12024_1.png", "Case 12024_2.png", "form.pdf", "readme.txt"]
    );
    assert!(!out.join("B").join("nested").exists());
}

#[test]
fn grouped_without_share_dir_copies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("cases.xlsx");
    workbook(&book, &[("S", &[&["K"], &["x"], &["y"]])]);
    let out = dir.path().join("out");
    let config = GenerationConfig {
        naming_field: Some("K".into()),
        grouped: true,
        share_dir: Some(dir.path().join("does-not-exist")),
        ..cards_config()
    };
    let report = generate(&book, "S", &out, &config).unwrap();
    assert_eq!(report.shared_files_copied, 0);
    assert_eq!(file_names(&out.join("x")), vec!["x_1.png"]);
}

#[test]
fn grouped_on_missing_column_falls_back_to_flat() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("cases.xlsx");
    workbook(&book, &[("S", &[&["K"], &["x"], &["y"]])]);
    let out = dir.path().join("out");
    let config = GenerationConfig {
        naming_field: Some("Nope".into()),
        grouped: true,
        ..cards_config()
    };
    let report = generate(&book, "S", &out, &config).unwrap();
    assert_eq!(report.groups, 0);
    assert_eq!(relative(&report.images, &out), vec!["row_1.png", "row_2.png"]);
}

#[test]
fn generation_progress_ends_at_100() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("rows.xlsx");
    workbook(&book, &[("S", &[&["k"], &["a"], &["b"], &["c"], &["d"]])]);

    let recorder = Arc::new(Recorder::default());
    let config = GenerationConfig {
        progress_callback: Some(recorder.clone() as ProgressCallback),
        ..cards_config()
    };
    generate(&book, "S", dir.path().join("out"), &config).unwrap();

    let percents = recorder.percents.lock().unwrap().clone();
    assert_eq!(percents, vec![0, 25, 50, 75, 100]);
    let statuses = recorder.statuses.lock().unwrap().clone();
    assert_eq!(statuses[0], "rendering: row_1.png");
    assert_eq!(statuses.last().map(String::as_str), Some("done"));
}

#[test]
fn invalid_style_fails_before_creating_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let config = GenerationConfig {
        style: CardStyle {
            font_size: 0.0,
            ..CardStyle::builtin_font()
        },
        ..GenerationConfig::default()
    };
    let err = generate(dir.path().join("missing.xlsx"), "S", &out, &config).unwrap_err();
    assert!(matches!(err, OfficeConvError::Validation(_)));
    assert!(!out.exists());
}

// ── TIFF merge ───────────────────────────────────────────────────────────────

#[test]
fn merge_of_nothing_is_empty_input_and_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.tif");
    let err = merge::<PathBuf>(&[], &out, &MergeConfig::default()).unwrap_err();
    assert!(matches!(err, OfficeConvError::EmptyInput { .. }));
    assert!(!out.exists());
}

#[test]
fn merge_keeps_caller_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    let c = dir.path().join("c.jpg");
    solid_png(&a, 10, 10);
    solid_png(&b, 20, 5);
    solid_png(&c, 7, 30);
    let out = dir.path().join("out.tif");

    let config = MergeConfig::builder()
        .compression(Compression::PackBits)
        .build()
        .unwrap();
    let report = merge(&[c.clone(), a.clone(), b.clone()], &out, &config).unwrap();
    assert_eq!(report.frames, 3);
    assert_eq!(tiff_pages(&out), vec![(7, 30), (10, 10), (20, 5)]);
}

#[test]
fn merge_progress_is_monotonic_and_ends_at_100() {
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<PathBuf> = (0..3)
        .map(|i| {
            let p = dir.path().join(format!("{i}.png"));
            solid_png(&p, 4, 4);
            p
        })
        .collect();

    let recorder = Arc::new(Recorder::default());
    let config = MergeConfig::builder()
        .compression(Compression::Lzw)
        .progress_callback(recorder.clone() as ProgressCallback)
        .build()
        .unwrap();
    merge(&inputs, dir.path().join("out.tif"), &config).unwrap();

    let percents = recorder.percents.lock().unwrap().clone();
    assert_eq!(percents, vec![0, 33, 66, 90, 100]);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    let statuses = recorder.statuses.lock().unwrap().clone();
    assert_eq!(
        statuses,
        vec!["processing: 0.png", "processing: 1.png", "processing: 2.png", "saving", "done"]
    );
}

#[test]
fn uncompressed_round_trip_normalises_to_rgb() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("alpha.png");
    RgbaImage::from_pixel(17, 9, Rgba([5, 6, 7, 100])).save(&src).unwrap();
    let out = dir.path().join("out.tif");

    let config = MergeConfig::builder()
        .compression(Compression::None)
        .dpi(150)
        .build()
        .unwrap();
    merge(&[&src], &out, &config).unwrap();

    let mut decoder = Decoder::new(BufReader::new(File::open(&out).unwrap())).unwrap();
    assert_eq!(decoder.dimensions().unwrap(), (17, 9));
    assert_eq!(decoder.colortype().unwrap(), tiff::ColorType::RGB(8));
    assert!(!decoder.more_images());

    let decoded = image::open(&out).unwrap().to_rgb8();
    assert_eq!(*decoded.get_pixel(16, 8), Rgb([5, 6, 7]));
}

#[test]
fn jpeg_quality_only_with_jpeg_compression() {
    let err = MergeConfig::builder()
        .compression(Compression::Deflate)
        .jpeg_quality(80)
        .build()
        .unwrap_err();
    assert!(matches!(err, OfficeConvError::Validation(_)));

    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("a.png");
    solid_png(&src, 32, 32);
    let config = MergeConfig::builder()
        .compression(Compression::Jpeg)
        .jpeg_quality(40)
        .build()
        .unwrap();
    assert_eq!(config.effective_quality(), Some(40));
    let out = dir.path().join("out.tif");
    merge(&[&src], &out, &config).unwrap();
    assert_eq!(tiff_pages(&out), vec![(32, 32)]);
}

#[test]
fn jpeg_tiff_output_can_be_merged_again() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    RgbImage::from_pixel(24, 16, Rgb([200, 30, 30])).save(&a).unwrap();

    // Default compression is JPEG, stored as YCbCr.
    let first = dir.path().join("first.tif");
    merge(&[&a], &first, &MergeConfig::default()).unwrap();

    let second = dir.path().join("second.tif");
    let report = merge(&[&first, &a], &second, &MergeConfig::default()).unwrap();
    assert_eq!(report.frames, 2);
    assert_eq!(tiff_pages(&second), vec![(24, 16), (24, 16)]);

    let page = officeconv::pipeline::render::decode_image(&second).unwrap();
    let [r, g, b] = page.image.get_pixel(12, 8).0;
    assert!(
        r.abs_diff(200) <= 12 && g.abs_diff(30) <= 12 && b.abs_diff(30) <= 12,
        "re-merged pixel ({r}, {g}, {b}) drifted from (200, 30, 30)"
    );
}

#[test]
fn list_columns_agrees_with_loaded_header() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("offset.xlsx");
    // Column A is never used; the data row reaches one column past the header.
    workbook(
        &book,
        &[("S", &[&["", "Id", "Name"], &["", "1", "Ann", "extra"], &["", "2", "Bo"]])],
    );

    let listed = list_columns(&book, "S").unwrap();
    let loaded = officeconv::pipeline::sheet::load_sheet(&book, "S").unwrap();
    assert_eq!(listed, vec!["Id", "Name", "Unnamed: 2"]);
    assert_eq!(listed, loaded.columns);
}

#[test]
fn scan_filters_by_extension_without_recursing() {
    let dir = tempfile::tempdir().unwrap();
    solid_png(&dir.path().join("a.PNG"), 2, 2);
    fs::write(dir.path().join("doc.pdf"), b"%PDF").unwrap();
    fs::write(dir.path().join("notes.txt"), b"x").unwrap();
    fs::create_dir(dir.path().join("sub.png")).unwrap();
    fs::create_dir(dir.path().join("inner")).unwrap();
    solid_png(&dir.path().join("inner").join("deep.png"), 2, 2);

    let mut names: Vec<String> = scan(dir.path())
        .unwrap()
        .into_iter()
        .map(|e| e.display_name())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.PNG", "doc.pdf"]);
}

// ── TIFF merge with PDFs (needs PDFium) ──────────────────────────────────────

#[test]
fn pdf_pages_expand_in_place() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let img1 = dir.path().join("img1.png");
    let img2 = dir.path().join("img2.jpg");
    solid_png(&img1, 11, 7);
    solid_png(&img2, 13, 5);
    let pdf = dir.path().join("doc.pdf");
    // At 72 DPI one point is one pixel.
    blank_pdf(&pdf, &[(30.0, 40.0), (50.0, 60.0), (70.0, 80.0)]);
    let out = dir.path().join("out.tif");

    let config = MergeConfig::builder()
        .compression(Compression::Deflate)
        .dpi(72)
        .build()
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = MergeConfig {
        progress_callback: Some(recorder.clone() as ProgressCallback),
        ..config
    };
    let report = merge(&[img1, pdf, img2], &out, &config).unwrap();

    assert_eq!(report.inputs, 3);
    assert_eq!(report.frames, 5);
    assert_eq!(
        tiff_pages(&out),
        vec![(11, 7), (30, 40), (50, 60), (70, 80), (13, 5)]
    );
    // One progress step per input, not per page.
    assert_eq!(*recorder.percents.lock().unwrap(), vec![0, 33, 66, 90, 100]);
}

#[test]
fn pdf_dpi_is_stamped_and_scales_pages() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("doc.pdf");
    blank_pdf(&pdf, &[(72.0, 144.0)]);
    let out = dir.path().join("out.tif");

    let config = MergeConfig::builder()
        .compression(Compression::Lzw)
        .dpi(100)
        .build()
        .unwrap();
    merge(&[&pdf], &out, &config).unwrap();

    let mut decoder = Decoder::new(BufReader::new(File::open(&out).unwrap())).unwrap();
    assert_eq!(decoder.dimensions().unwrap(), (100, 200));
    assert_eq!(
        decoder.get_tag_u32_vec(tiff::tags::Tag::XResolution).unwrap(),
        vec![100, 1]
    );
    assert_eq!(
        decoder.get_tag_u32_vec(tiff::tags::Tag::YResolution).unwrap(),
        vec![100, 1]
    );
}

#[test]
fn corrupt_pdf_aborts_merge() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("a.png");
    solid_png(&img, 4, 4);
    let pdf = dir.path().join("broken.pdf");
    fs::write(&pdf, b"%PDF-1.4 not really").unwrap();
    let out = dir.path().join("out.tif");

    let err = merge(&[img, pdf], &out, &MergeConfig::default()).unwrap_err();
    assert!(matches!(err, OfficeConvError::SourceRead { .. }));
    assert!(!out.exists());
}
