use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{DynamicImage, ImageDecoder, ImageEncoder, ImageFormat, ImageReader};
use serde::Serialize;
use walkdir::WalkDir;

pub const COVER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
pub const UPSCALE_BACKUP_DIR: &str = "_backup_originals";
pub const RESIZE_BACKUP_DIR: &str = "_backup_resized_originals";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverFormat {
    Png,
    Jpeg,
}

impl CoverFormat {
    pub fn label(self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// `.jpg`/`.jpeg` map to JPEG; every other cover extension to PNG.
    pub fn from_extension(path: &Path) -> Self {
        match lowercase_extension(path).as_deref() {
            Some("jpg") | Some("jpeg") => Self::Jpeg,
            _ => Self::Png,
        }
    }
}

/// Extension-only check for `.png`, `.jpg`, `.jpeg` (any case).
pub fn is_cover_image(path: &Path) -> bool {
    lowercase_extension(path).is_some_and(|ext| COVER_EXTENSIONS.contains(&ext.as_str()))
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Cover files directly inside `dir`, sorted by file name.
pub fn list_top_level_covers(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && is_cover_image(&path) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Cover files anywhere under `dir`, skipping backup directories.
pub fn walk_covers(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_dir() && is_backup_dir_name(&name))
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() && is_cover_image(entry.path()) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

fn is_backup_dir_name(name: &str) -> bool {
    name == UPSCALE_BACKUP_DIR || name == RESIZE_BACKUP_DIR
}

/// Copy `path` into `backup_dir` unless a backup of the same name exists.
/// Returns `true` when a copy was made.
pub fn backup_original(path: &Path, backup_dir: &Path) -> Result<bool> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", path.display()))?;
    let backup_path = backup_dir.join(name);
    if backup_path.exists() {
        return Ok(false);
    }
    fs::create_dir_all(backup_dir)
        .with_context(|| format!("failed to create {}", backup_dir.display()))?;
    fs::copy(path, &backup_path).with_context(|| {
        format!(
            "failed to back up {} to {}",
            path.display(),
            backup_path.display()
        )
    })?;
    Ok(true)
}

#[derive(Debug)]
pub struct LoadedCover {
    pub image: DynamicImage,
    pub format: Option<ImageFormat>,
    pub icc_profile: Option<Vec<u8>>,
}

/// Decode `path` fully; the file handle is released before returning.
pub fn load_cover(path: &Path) -> Result<LoadedCover> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to detect format of {}", path.display()))?;
    let format = reader.format();
    let mut decoder = reader
        .into_decoder()
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let icc_profile = decoder.icc_profile().ok().flatten();
    let image = DynamicImage::from_decoder(decoder)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(LoadedCover {
        image,
        format,
        icc_profile,
    })
}

#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub jpeg_quality: u8,
    pub png_compression: CompressionType,
    pub icc_profile: Option<Vec<u8>>,
}

/// PNG compression for a 0..=9 level.
pub fn png_compression_for_level(level: u8) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

pub fn encode_cover(
    image: &DynamicImage,
    format: CoverFormat,
    settings: &EncodeSettings,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        CoverFormat::Jpeg => {
            let flattened = jpeg_compatible(image);
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, settings.jpeg_quality);
            if let Some(profile) = settings.icc_profile.clone()
                && encoder.set_icc_profile(profile).is_err()
            {
                tracing::debug!("JPEG encoder rejected ICC profile");
            }
            flattened
                .write_with_encoder(encoder)
                .context("failed to encode JPEG")?;
        }
        CoverFormat::Png => {
            let prepared = png_compatible(image);
            let mut encoder = PngEncoder::new_with_quality(
                &mut buffer,
                settings.png_compression,
                PngFilterType::Adaptive,
            );
            if let Some(profile) = settings.icc_profile.clone()
                && encoder.set_icc_profile(profile).is_err()
            {
                tracing::debug!("PNG encoder rejected ICC profile");
            }
            prepared
                .write_with_encoder(encoder)
                .context("failed to encode PNG")?;
        }
    }
    Ok(buffer)
}

fn jpeg_compatible(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image.clone(),
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

fn png_compatible(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb8(image.to_rgb8()),
        DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => image.clone(),
    }
}

/// Plain mode conversion to 8-bit RGB or RGBA; no color-management engine is linked,
/// so pixel values are never transformed between profiles.
pub fn to_rgb_mode(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Write encoded bytes over `path`; encoding happens before the original is touched.
pub fn write_cover(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionRule {
    Exact(Dimensions),
    AtLeast(u32),
}

#[derive(Debug, Clone, Default)]
pub struct SavedCoverCheck {
    pub after: Option<Dimensions>,
    pub icc_profile_embedded: bool,
    pub issues: Vec<String>,
}

/// Re-open a saved cover and compare it against the expected size and format.
pub fn validate_saved(path: &Path, rule: DimensionRule, expected: CoverFormat) -> SavedCoverCheck {
    let loaded = match load_cover(path) {
        Ok(loaded) => loaded,
        Err(error) => {
            return SavedCoverCheck {
                issues: vec![format!("validation error: {error:#}")],
                ..SavedCoverCheck::default()
            };
        }
    };
    let after = Dimensions::of(&loaded.image);
    let mut issues = Vec::new();
    match rule {
        DimensionRule::Exact(target) if after != target => issues.push(format!(
            "dimension mismatch: expected {}x{}, got {}x{}",
            target.width, target.height, after.width, after.height
        )),
        DimensionRule::AtLeast(min) if after.width < min || after.height < min => {
            issues.push(format!(
                "below minimum size {min}: got {}x{}",
                after.width, after.height
            ))
        }
        _ => {}
    }
    let actual = loaded.format.and_then(CoverFormat::from_image_format);
    if actual != Some(expected) {
        issues.push(format!(
            "format mismatch: expected {}, got {}",
            expected.label(),
            actual.map(CoverFormat::label).unwrap_or("unknown")
        ));
    }
    SavedCoverCheck {
        after: Some(after),
        icc_profile_embedded: loaded.icc_profile.is_some_and(|profile| !profile.is_empty()),
        issues,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverEntry {
    pub file: String,
    pub before: Option<Dimensions>,
    pub after: Option<Dimensions>,
    pub format: Option<String>,
    pub changed: bool,
    pub backed_up: bool,
    pub icc_profile_embedded: bool,
    pub color_managed: bool,
    pub validation_passed: bool,
    pub issues: Vec<String>,
    pub size_bytes: Option<u64>,
}

impl CoverEntry {
    pub fn new(file: String) -> Self {
        Self {
            file,
            before: None,
            after: None,
            format: None,
            changed: false,
            backed_up: false,
            icc_profile_embedded: false,
            color_managed: false,
            validation_passed: false,
            issues: Vec::new(),
            size_bytes: None,
        }
    }

    /// Entry for a file whose processing failed before a result existed.
    pub fn failed(file: String, error: &anyhow::Error) -> Self {
        let mut entry = Self::new(file);
        entry.issues.push(format!("{error:#}"));
        entry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl CoverSummary {
    pub fn from_entries(entries: &[CoverEntry]) -> Self {
        let passed = entries.iter().filter(|entry| entry.validation_passed).count();
        Self {
            total: entries.len(),
            passed,
            failed: entries.len() - passed,
        }
    }
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|metadata| metadata.len())
}

pub fn require_covers_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("covers directory not found: {}", dir.display());
    }
    Ok(())
}

pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to encode cover report")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}
