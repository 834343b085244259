//! Stages a prebuilt Pdfium next to the build and exports its location as
//! `TERMDOC_PDFIUM_LIBRARY_PATH` for runtime binding.

use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use walkdir::WalkDir;
use zip::read::ZipArchive;

const PDFIUM_VERSION: &str = "7350";
const RELEASES: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

const WATCHED_ENV: &[&str] = &[
    "TERMDOC_PDFIUM_SKIP_DOWNLOAD",
    "TERMDOC_PDFIUM_ARCHIVE",
    "TERMDOC_PDFIUM_VERSION",
    "PDFIUM_DYNAMIC_LIB_PATH",
    "PDFIUM_STATIC_LIB_PATH",
];

struct Target {
    os: String,
    arch: String,
}

impl Target {
    fn from_env() -> Result<Self> {
        Ok(Self {
            os: env::var("CARGO_CFG_TARGET_OS").context("CARGO_CFG_TARGET_OS missing")?,
            arch: env::var("CARGO_CFG_TARGET_ARCH").context("CARGO_CFG_TARGET_ARCH missing")?,
        })
    }

    /// Platform suffix used by the prebuilt release archives.
    fn platform(&self) -> String {
        let os = match self.os.as_str() {
            "macos" => "mac",
            other => other,
        };
        let arch = match self.arch.as_str() {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            other => other,
        };
        format!("{os}-{arch}")
    }

    fn library_name(&self) -> &'static str {
        match self.os.as_str() {
            "windows" => "pdfium.dll",
            "macos" => "libpdfium.dylib",
            _ => "libpdfium.so",
        }
    }
}

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=build.rs");
    for name in WATCHED_ENV {
        println!("cargo:rerun-if-env-changed={name}");
    }
    if env::var_os("TERMDOC_PDFIUM_SKIP_DOWNLOAD").is_some()
        || env::var_os("PDFIUM_DYNAMIC_LIB_PATH").is_some()
        || env::var_os("PDFIUM_STATIC_LIB_PATH").is_some()
    {
        return Ok(());
    }

    let target = Target::from_env()?;
    let stage = PathBuf::from(env::var("OUT_DIR").context("OUT_DIR missing")?).join("pdfium");
    let unpacked = stage.join("lib");

    let library = match find_library(&unpacked, target.library_name()) {
        Some(path) => path,
        None => {
            let archive = match env::var_os("TERMDOC_PDFIUM_ARCHIVE") {
                Some(path) => PathBuf::from(path),
                None => fetch_archive(&stage.join("archives"), &target.platform())?,
            };
            unpack(&archive, &unpacked)?;
            find_library(&unpacked, target.library_name())
                .ok_or_else(|| anyhow!("{} missing from {:?}", target.library_name(), archive))?
        }
    };

    let library = library
        .to_str()
        .ok_or_else(|| anyhow!("non UTF-8 library path {:?}", library))?;
    println!("cargo:rustc-env=TERMDOC_PDFIUM_LIBRARY_PATH={library}");
    Ok(())
}

fn find_library(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .map(|entry| entry.into_path())
}

fn fetch_archive(cache: &Path, platform: &str) -> Result<PathBuf> {
    let version = env::var("TERMDOC_PDFIUM_VERSION").unwrap_or_else(|_| PDFIUM_VERSION.into());
    fs::create_dir_all(cache).with_context(|| format!("failed to create {:?}", cache))?;

    let agent = ureq::AgentBuilder::new()
        .timeout_read(Duration::from_secs(120))
        .build();
    let mut failures = Vec::new();
    for name in [format!("pdfium-{platform}.tgz"), format!("pdfium-{platform}.zip")] {
        let destination = cache.join(&name);
        if destination.exists() {
            return Ok(destination);
        }
        let url = format!("{RELEASES}/chromium/{version}/{name}");
        match agent.get(&url).call() {
            Ok(response) => {
                let mut file = File::create(&destination)
                    .with_context(|| format!("failed to create {:?}", destination))?;
                io::copy(&mut response.into_reader(), &mut file)
                    .with_context(|| format!("failed to download {url}"))?;
                return Ok(destination);
            }
            Err(err) => failures.push(format!("{url}: {err}")),
        }
    }
    bail!("no Pdfium {version} build for {platform}: {}", failures.join("; "))
}

fn unpack(archive: &Path, destination: &Path) -> Result<()> {
    if destination.exists() {
        fs::remove_dir_all(destination)
            .with_context(|| format!("failed to clear {:?}", destination))?;
    }
    fs::create_dir_all(destination)?;
    let file = File::open(archive).with_context(|| format!("failed to open {:?}", archive))?;

    match archive.extension().and_then(|ext| ext.to_str()) {
        Some("tgz" | "gz") => Archive::new(GzDecoder::new(file))
            .unpack(destination)
            .with_context(|| format!("failed to unpack {:?}", archive)),
        Some("zip") => ZipArchive::new(file)
            .and_then(|mut zip| zip.extract(destination))
            .with_context(|| format!("failed to extract {:?}", archive)),
        _ => bail!("unsupported archive {:?}", archive),
    }
}
