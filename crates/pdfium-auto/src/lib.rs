//! # pdfium-auto
//!
//! Find a usable [PDFium](https://pdfium.googlesource.com/pdfium/) shared
//! library for `pdfium-render`, downloading and caching it on first use.
//!
//! ## Resolution order
//!
//! 1. `PDFIUM_LIB_PATH`: an explicit library file. Used as-is when it exists.
//! 2. The per-user cache: `<cache>/officeconv/pdfium-{VERSION}/<libname>`.
//! 3. A one-time download of the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries),
//!    extracted into the cache from step 2.
//!
//! The first successful resolution is memoised for the rest of the process,
//! so repeated binds never touch the network or re-stat the cache.
//!
//! ## Why a separate crate?
//!
//! Library consumers that bring their own PDFium (static builds, system
//! packages) set `PDFIUM_LIB_PATH` and never pull the download path into
//! their hot loop; the main crate only ever calls [`bind_pdfium_silent`].
//!
//! ```rust,no_run
//! let pdfium = pdfium_auto::bind_pdfium_silent().expect("PDFium unavailable");
//! let doc = pdfium.load_pdf_from_file("scan.pdf", None).expect("open");
//! println!("{} pages", doc.pages().len());
//! ```
//!
//! ## Environment variables
//!
//! - `PDFIUM_LIB_PATH`: path to an existing pdfium library; skips the cache.
//! - `PDFIUM_AUTO_CACHE_DIR`: replaces the platform cache root.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

// ── Constants ────────────────────────────────────────────────────────────────

/// pdfium-binaries release tag (`chromium/{VERSION}`) fetched on first use.
pub const PDFIUM_VERSION: &str = "7690";

/// Directory name created under the platform cache root.
pub const CACHE_NAMESPACE: &str = "officeconv";

const RELEASES_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

const ENV_LIB_PATH: &str = "PDFIUM_LIB_PATH";
const ENV_CACHE_DIR: &str = "PDFIUM_AUTO_CACHE_DIR";

const READ_CHUNK: usize = 64 * 1024;

// ── Errors ───────────────────────────────────────────────────────────────────

/// Failures while locating, fetching or loading PDFium.
#[derive(Error, Debug)]
pub enum PdfiumAutoError {
    /// No prebuilt archive is published for this OS/architecture.
    #[error("No prebuilt PDFium for {os}/{arch}; set PDFIUM_LIB_PATH to a local build")]
    UnsupportedPlatform { os: String, arch: String },

    /// The cache directory could not be created or written.
    #[error("Cannot prepare PDFium cache at '{path}': {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP request or body read failed.
    #[error("PDFium download failed: {0}")]
    Download(String),

    /// The archive was corrupt or did not contain the library.
    #[error("PDFium archive extraction failed: {0}")]
    Extract(String),

    /// The library file exists but could not be loaded.
    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

// ── Platform table ───────────────────────────────────────────────────────────

/// Release asset and library names for one OS/architecture pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Release asset, e.g. `pdfium-linux-x64.tgz`.
    pub archive: &'static str,
    /// Library path inside the archive.
    pub member: &'static str,
    /// File name written into the cache.
    pub lib_name: &'static str,
}

impl Platform {
    const fn unix(archive: &'static str, member: &'static str, lib_name: &'static str) -> Self {
        Self {
            archive,
            member,
            lib_name,
        }
    }

    const fn windows(archive: &'static str) -> Self {
        Self {
            archive,
            member: "bin/pdfium.dll",
            lib_name: "pdfium.dll",
        }
    }

    /// Look up the release entry for `(os, arch)` as spelled by
    /// [`std::env::consts`].
    pub fn lookup(os: &str, arch: &str) -> Result<Self, PdfiumAutoError> {
        let found = match (os, arch) {
            ("linux", "x86_64") => {
                Self::unix("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so")
            }
            ("linux", "aarch64") => {
                Self::unix("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so")
            }
            ("macos", "aarch64") => Self::unix(
                "pdfium-mac-arm64.tgz",
                "lib/libpdfium.dylib",
                "libpdfium.dylib",
            ),
            ("macos", "x86_64") => Self::unix(
                "pdfium-mac-x64.tgz",
                "lib/libpdfium.dylib",
                "libpdfium.dylib",
            ),
            ("windows", "x86_64") => Self::windows("pdfium-win-x64.tgz"),
            ("windows", "aarch64") => Self::windows("pdfium-win-arm64.tgz"),
            ("windows", "x86") => Self::windows("pdfium-win-x86.tgz"),
            _ => {
                return Err(PdfiumAutoError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };
        Ok(found)
    }

    /// The entry for the running process.
    pub fn current() -> Result<Self, PdfiumAutoError> {
        Self::lookup(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn download_url(&self) -> String {
        format!("{RELEASES_URL}/chromium%2F{PDFIUM_VERSION}/{}", self.archive)
    }
}

// ── Cache layout ─────────────────────────────────────────────────────────────

/// Versioned cache directory holding the downloaded library.
///
/// `<cache root>/officeconv/pdfium-{VERSION}`, where the cache root is
/// `PDFIUM_AUTO_CACHE_DIR` when set, else the platform cache directory
/// (`~/.cache`, `~/Library/Caches`, `%LOCALAPPDATA%`).
pub fn pdfium_cache_dir() -> PathBuf {
    let versioned = format!("pdfium-{PDFIUM_VERSION}");
    if let Some(root) = std::env::var_os(ENV_CACHE_DIR) {
        return PathBuf::from(root).join(versioned);
    }
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_NAMESPACE)
        .join(versioned)
}

/// Where a resolved library came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryOrigin {
    /// `PDFIUM_LIB_PATH`.
    Environment,
    /// Found in [`pdfium_cache_dir`].
    Cache,
    /// Fetched during this call.
    Downloaded,
}

fn env_library() -> Option<PathBuf> {
    std::env::var_os(ENV_LIB_PATH)
        .map(PathBuf::from)
        .filter(|p| p.is_file())
}

fn cached_library() -> Option<PathBuf> {
    let platform = Platform::current().ok()?;
    let path = pdfium_cache_dir().join(platform.lib_name);
    path.is_file().then_some(path)
}

/// Returns the library path and origin if PDFium is available without a
/// download.
pub fn locate_pdfium() -> Option<(PathBuf, LibraryOrigin)> {
    env_library()
        .map(|p| (p, LibraryOrigin::Environment))
        .or_else(|| cached_library().map(|p| (p, LibraryOrigin::Cache)))
}

/// `true` when [`ensure_pdfium_library`] would not hit the network.
pub fn is_pdfium_cached() -> bool {
    RESOLVED.get().is_some() || locate_pdfium().is_some()
}

// ── Resolution ───────────────────────────────────────────────────────────────

static RESOLVED: OnceLock<PathBuf> = OnceLock::new();

/// Progress hook for the first-run download: `(bytes_so_far, content_length)`.
pub type DownloadProgress<'a> = &'a dyn Fn(u64, Option<u64>);

/// Resolves the PDFium library, downloading it into the cache when needed.
///
/// Memoised per process: after the first success every call returns the
/// same path immediately. Concurrent first calls may both download; the
/// extraction is written through a temporary file and renamed, so neither
/// observes a half-written library.
pub fn ensure_pdfium_library(
    on_progress: Option<DownloadProgress<'_>>,
) -> Result<PathBuf, PdfiumAutoError> {
    if let Some(path) = RESOLVED.get() {
        return Ok(path.clone());
    }
    let (path, _) = resolve_pdfium(on_progress)?;
    Ok(RESOLVED.get_or_init(|| path).clone())
}

/// Like [`ensure_pdfium_library`] but reports where the library came from.
///
/// Not memoised; callers use it once at startup to tell the user whether a
/// download happened.
pub fn resolve_pdfium(
    on_progress: Option<DownloadProgress<'_>>,
) -> Result<(PathBuf, LibraryOrigin), PdfiumAutoError> {
    if let Some(found) = locate_pdfium() {
        return Ok(found);
    }

    let platform = Platform::current()?;
    let dir = pdfium_cache_dir();
    fs::create_dir_all(&dir).map_err(|source| PdfiumAutoError::Cache {
        path: dir.clone(),
        source,
    })?;

    let archive = fetch(&platform.download_url(), on_progress)?;
    let target = dir.join(platform.lib_name);
    unpack_member(&archive, platform.member, &target)?;
    Ok((target, LibraryOrigin::Downloaded))
}

/// Load PDFium, downloading it first if necessary.
pub fn bind_pdfium(on_progress: Option<DownloadProgress<'_>>) -> Result<Pdfium, PdfiumAutoError> {
    let path = ensure_pdfium_library(on_progress)?;
    bind_pdfium_from_path(&path)
}

/// [`bind_pdfium`] without download progress.
pub fn bind_pdfium_silent() -> Result<Pdfium, PdfiumAutoError> {
    bind_pdfium(None)
}

/// Load the library at `path`, bypassing discovery entirely.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, PdfiumAutoError> {
    let bindings = Pdfium::bind_to_library(path).map_err(|e| PdfiumAutoError::Bind {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(Pdfium::new(bindings))
}

// ── Download & extract ───────────────────────────────────────────────────────

fn fetch(url: &str, on_progress: Option<DownloadProgress<'_>>) -> Result<Vec<u8>, PdfiumAutoError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-auto/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| PdfiumAutoError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| PdfiumAutoError::Download(format!("GET {url}: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(PdfiumAutoError::Download(format!("HTTP {status} for {url}")));
    }

    let total = response.content_length();
    let mut body = Vec::with_capacity(total.unwrap_or(0) as usize);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PdfiumAutoError::Download(format!("reading body: {e}"))),
        };
        body.extend_from_slice(&chunk[..n]);
        if let Some(report) = on_progress {
            report(body.len() as u64, total);
        }
    }
    Ok(body)
}

/// Copy `member` out of a gzipped tarball into `dest`.
fn unpack_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), PdfiumAutoError> {
    let extract = |e: std::io::Error| PdfiumAutoError::Extract(e.to_string());
    let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(archive));

    for entry in tarball.entries().map_err(extract)? {
        let mut entry = entry.map_err(extract)?;
        if entry.path().map_err(extract)?.to_string_lossy() != member {
            continue;
        }
        let staging = dest.with_extension("partial");
        entry.unpack(&staging).map_err(extract)?;
        return fs::rename(&staging, dest).map_err(|source| PdfiumAutoError::Cache {
            path: dest.to_path_buf(),
            source,
        });
    }

    Err(PdfiumAutoError::Extract(format!(
        "'{member}' is missing from the archive"
    )))
}

// ── Tests ────────────────────────────────────────────────────────────────────
