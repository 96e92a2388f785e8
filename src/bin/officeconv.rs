//! CLI binary for officeconv.
//!
//! A thin shim over the library crate that maps subcommands and flags to
//! `GenerationConfig` / `MergeConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use officeconv::{
    default_output_path, list_columns, list_sheets, page_count, preview, scan, CardStyle,
    Compression, GenerationConfig, MergeConfig, ProgressCallback, ProgressSink, SourceKind,
    PREVIEW_MAX_EDGE,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Terminal progress sink: a 0–100 bar whose message is the latest status.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(prefix: &str) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix(prefix.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for CliProgress {
    fn on_progress(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn on_status(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Which sheets and columns does a workbook have?
  officeconv sheets cases.xlsx
  officeconv columns cases.xlsx --sheet Sheet1

  # One PNG card per row, named by a column (A.png, A_1.png, B.png, ...)
  officeconv cards cases.xlsx --sheet Sheet1 -o cards --naming-field "Case ID"

  # One folder per case, with attachments copied into every folder
  officeconv cards cases.xlsx -o cards --naming-field "Case ID" --grouped --share-dir forms/

  # Merge images and PDFs, in the order given, into one TIFF
  officeconv merge cover.png contract.pdf id.jpg -o bundle.tif --compression lzw --dpi 300

  # Merge everything in a folder into <folder>/<folder>.tif
  officeconv merge --dir scans/

  # List mergeable files, or render a thumbnail of one
  officeconv scan scans/ --json
  officeconv preview contract.pdf -o contract.png

COMPRESSION:
  raw        no compression
  lzw        LZW, lossless
  jpeg       JPEG, lossy, smallest files (default; --quality 1-100, default 75)
  deflate    Deflate/zlib, lossless (aliases: zlib, tiff_adobe_deflate)
  packbits   PackBits run-length, lossless
  ccittfax4  rejected: needs black-and-white pages, merged pages are RGB

ENVIRONMENT VARIABLES:
  OFFICECONV_*            Every flag has an env equivalent (see --help per command)
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Override the log filter (e.g. officeconv=debug)

SETUP:
  PDFium (~30 MB) is downloaded automatically the first time a PDF is
  merged or previewed, and cached in ~/.cache/officeconv/pdfium-7690/.
"#;

/// Turn spreadsheet rows into PNG cards, and images/PDFs into multi-page TIFFs.
#[derive(Parser, Debug)]
#[command(
    name = "officeconv",
    version,
    about = "Spreadsheet rows to PNG cards, images and PDFs to multi-page TIFF",
    long_about = "Batch office conversions. `cards` renders every spreadsheet row as a \
key/value PNG card, flat or grouped into one folder per entity. `merge` combines an ordered \
list of PNG/JPEG/TIFF images and PDFs into one compressed multi-page TIFF, rasterising PDF \
pages at the chosen DPI.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output structured JSON instead of text.
    #[arg(long, global = true, env = "OFFICECONV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "OFFICECONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OFFICECONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OFFICECONV_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the sheets of a workbook.
    Sheets {
        /// Workbook (xlsx, xlsm, xlsb, xls, ods).
        workbook: PathBuf,
    },
    /// List the column headers of one sheet.
    Columns {
        workbook: PathBuf,
        /// Sheet name. Default: the first sheet.
        #[arg(long, env = "OFFICECONV_SHEET")]
        sheet: Option<String>,
    },
    /// Render one PNG card per row.
    Cards(CardsArgs),
    /// List mergeable files in a directory, in listing order.
    Scan {
        dir: PathBuf,
    },
    /// Merge images and PDFs into one multi-page TIFF.
    Merge(MergeArgs),
    /// Write a thumbnail of an image or the first page of a PDF.
    Preview {
        input: PathBuf,
        /// PNG to write.
        #[arg(short, long)]
        output: PathBuf,
        /// Bounding box edge in pixels.
        #[arg(long, default_value_t = PREVIEW_MAX_EDGE)]
        max_edge: u32,
    },
}

#[derive(Args, Debug)]
struct CardsArgs {
    workbook: PathBuf,

    /// Sheet name. Default: the first sheet.
    #[arg(long, env = "OFFICECONV_SHEET")]
    sheet: Option<String>,

    /// Output directory (created if missing).
    #[arg(short, long, env = "OFFICECONV_OUTPUT_DIR")]
    output: PathBuf,

    /// Column whose value names files (flat) or folders (grouped).
    #[arg(long, env = "OFFICECONV_NAMING_FIELD")]
    naming_field: Option<String>,

    /// One folder per distinct naming-field value.
    #[arg(long, env = "OFFICECONV_GROUPED")]
    grouped: bool,

    /// Directory whose files are copied into every group folder.
    #[arg(long, env = "OFFICECONV_SHARE_DIR")]
    share_dir: Option<PathBuf>,

    /// Font file tried before system fonts.
    #[arg(long, env = "OFFICECONV_FONT")]
    font: Option<PathBuf>,

    /// Font pixel size.
    #[arg(long, env = "OFFICECONV_FONT_SIZE", default_value_t = 24.0)]
    font_size: f32,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Inputs in output page order.
    #[arg(required_unless_present = "dir", conflicts_with = "dir")]
    inputs: Vec<PathBuf>,

    /// Merge every supported file in this directory instead.
    #[arg(long, env = "OFFICECONV_MERGE_DIR")]
    dir: Option<PathBuf>,

    /// TIFF to write. Default with --dir: <dir>/<dir-name>.tif.
    #[arg(short, long, env = "OFFICECONV_OUTPUT")]
    output: Option<PathBuf>,

    /// raw, lzw, jpeg, deflate, packbits.
    #[arg(long, env = "OFFICECONV_COMPRESSION", default_value = "jpeg")]
    compression: Compression,

    /// PDF rasterisation DPI, also stamped into the TIFF.
    #[arg(long, env = "OFFICECONV_DPI", default_value_t = officeconv::DEFAULT_DPI)]
    dpi: u32,

    /// JPEG quality 1–100 (jpeg compression only).
    #[arg(long, env = "OFFICECONV_QUALITY")]
    quality: Option<u8>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Sheets { workbook } => {
            let sheets = list_sheets(workbook)
                .with_context(|| format!("Failed to read {}", workbook.display()))?;
            print_list(&cli, &sheets)?;
        }
        Command::Columns { workbook, sheet } => {
            let sheet = pick_sheet(workbook, sheet.as_deref())?;
            let columns = list_columns(workbook, &sheet)
                .with_context(|| format!("Failed to read sheet '{sheet}'"))?;
            print_list(&cli, &columns)?;
        }
        Command::Cards(args) => run_cards(&cli, args, show_progress).await?,
        Command::Scan { dir } => {
            let entries =
                scan(dir).with_context(|| format!("Failed to scan {}", dir.display()))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&entries).context("Failed to serialise scan")?
                );
            } else {
                for entry in &entries {
                    let kind = match entry.kind {
                        SourceKind::Pdf => "pdf  ",
                        SourceKind::Image => "image",
                    };
                    println!("{}  {}", dim(kind), entry.path.display());
                }
            }
        }
        Command::Merge(args) => run_merge(&cli, args, show_progress).await?,
        Command::Preview {
            input,
            output,
            max_edge,
        } => {
            if SourceKind::from_path(input) == Some(SourceKind::Pdf) {
                ensure_pdfium(cli.quiet)?;
            }
            let thumb = preview(input, *max_edge)
                .with_context(|| format!("Failed to preview {}", input.display()))?;
            thumb
                .save(output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{} {}x{}  →  {}",
                    green("✔"),
                    thumb.width(),
                    thumb.height(),
                    bold(&output.display().to_string())
                );
            }
        }
    }

    Ok(())
}

async fn run_cards(cli: &Cli, args: &CardsArgs, show_progress: bool) -> Result<()> {
    let sheet = pick_sheet(&args.workbook, args.sheet.as_deref())?;

    let style = CardStyle {
        font_size: args.font_size,
        font_path: args.font.clone(),
        ..CardStyle::default()
    };
    let mut builder = GenerationConfig::builder()
        .grouped(args.grouped)
        .style(style);
    if let Some(field) = &args.naming_field {
        builder = builder.naming_field(field.clone());
    }
    if let Some(dir) = &args.share_dir {
        builder = builder.share_dir(dir.clone());
    }

    let progress = show_progress.then(|| CliProgress::new("Rendering"));
    if let Some(p) = &progress {
        builder = builder.progress_callback(p.clone() as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    let result =
        officeconv::job::generate_cards(&args.workbook, sheet, &args.output, config).await;
    if let Some(p) = &progress {
        p.finish();
    }
    let report = result.context("Card generation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        let groups = if report.groups > 0 {
            format!(
                " in {} folders ({} shared files copied)",
                report.groups, report.shared_files_copied
            )
        } else {
            String::new()
        };
        eprintln!(
            "{} {} cards{}  {}ms  →  {}",
            green("✔"),
            bold(&report.images.len().to_string()),
            groups,
            report.duration_ms,
            bold(&args.output.display().to_string()),
        );
    }
    Ok(())
}

async fn run_merge(cli: &Cli, args: &MergeArgs, show_progress: bool) -> Result<()> {
    let (inputs, output) = match &args.dir {
        Some(dir) => {
            let output = args.output.clone().unwrap_or_else(|| default_output_path(dir));
            let inputs: Vec<PathBuf> = scan(dir)
                .with_context(|| format!("Failed to scan {}", dir.display()))?
                .into_iter()
                .map(|entry| entry.path)
                .filter(|path| path != &output)
                .collect();
            (inputs, output)
        }
        None => {
            let output = args
                .output
                .clone()
                .context("--output is required when inputs are listed explicitly")?;
            (args.inputs.clone(), output)
        }
    };

    let has_pdf = inputs
        .iter()
        .any(|p| SourceKind::from_path(p) == Some(SourceKind::Pdf));
    if has_pdf {
        ensure_pdfium(cli.quiet)?;
        if cli.verbose {
            for pdf in inputs
                .iter()
                .filter(|p| SourceKind::from_path(p) == Some(SourceKind::Pdf))
            {
                if let Ok(n) = page_count(pdf) {
                    eprintln!("{} {} ({n} pages)", cyan("◆"), pdf.display());
                }
            }
        }
    }

    let mut builder = MergeConfig::builder()
        .compression(args.compression)
        .dpi(args.dpi);
    if let Some(q) = args.quality {
        builder = builder.jpeg_quality(q);
    }
    let progress = show_progress.then(|| CliProgress::new("Merging"));
    if let Some(p) = &progress {
        builder = builder.progress_callback(p.clone() as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    let result = officeconv::job::merge_to_tiff(inputs, &output, config).await;
    if let Some(p) = &progress {
        p.finish();
    }
    let report = result.context("Merge failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{} {} pages from {} inputs  {}  {}ms  →  {}",
            green("✔"),
            bold(&report.frames.to_string()),
            report.inputs,
            dim(&format!("{} @ {} DPI", args.compression, args.dpi)),
            report.duration_ms,
            bold(&report.output.display().to_string()),
        );
    }
    Ok(())
}

/// The named sheet, or the workbook's first sheet.
fn pick_sheet(workbook: &Path, sheet: Option<&str>) -> Result<String> {
    if let Some(name) = sheet {
        return Ok(name.to_string());
    }
    list_sheets(workbook)
        .with_context(|| format!("Failed to read {}", workbook.display()))?
        .into_iter()
        .next()
        .with_context(|| format!("{} has no sheets", workbook.display()))
}

fn print_list(cli: &Cli, items: &[String]) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(items).context("Failed to serialise list")?
        );
    } else {
        for item in items {
            println!("{item}");
        }
    }
    Ok(())
}

/// Make sure PDFium is available before a PDF is opened.
///
/// On the very first run the library (~30 MB) is downloaded to
/// `~/.cache/officeconv/pdfium-{VERSION}/`; later runs only check the path.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    // block_in_place lets the callback borrow `bar` without a 'static bound.
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}
