use std::path::{Path, PathBuf};

use anyhow::Result;
use image::imageops::FilterType;
use serde::Serialize;

use crate::config::SiteConfig;
use crate::covers::{
    CoverEntry, CoverFormat, CoverSummary, DimensionRule, Dimensions, EncodeSettings,
    UPSCALE_BACKUP_DIR, backup_original, encode_cover, file_size, list_top_level_covers,
    load_cover, png_compression_for_level, require_covers_dir, validate_saved, write_cover,
    write_report,
};
use crate::runtime::ResolvedPaths;
use crate::utc_timestamp;

pub const UPSCALE_REPORT_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Serialize)]
pub struct UpscaleReport {
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    pub min_size: u32,
    pub covers: Vec<CoverEntry>,
    pub summary: CoverSummary,
    #[serde(skip)]
    pub report_path: PathBuf,
}

/// Smallest uniform scale that brings both sides up to `min_size`; unchanged when already there.
pub fn scaled_dimensions(before: Dimensions, min_size: u32) -> Dimensions {
    if before.width >= min_size && before.height >= min_size {
        return before;
    }
    let scale = f64::max(
        f64::from(min_size) / f64::from(before.width),
        f64::from(min_size) / f64::from(before.height),
    );
    let grow = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    Dimensions {
        width: grow(before.width),
        height: grow(before.height),
    }
}

/// Upscale undersized covers and resave every cover with format-appropriate compression.
pub fn upscale_covers(paths: &ResolvedPaths, config: &SiteConfig) -> Result<UpscaleReport> {
    require_covers_dir(&paths.covers_dir)?;
    let backup_dir = paths.covers_dir.join(UPSCALE_BACKUP_DIR);
    let settings = EncodeSettings {
        jpeg_quality: config.covers.upscale_jpeg_quality,
        png_compression: png_compression_for_level(9),
        icc_profile: None,
    };
    let min_size = config.covers.min_size;

    let mut covers = Vec::new();
    for path in list_top_level_covers(&paths.covers_dir)? {
        let file = file_name(&path);
        let entry = match upscale_one(&path, &backup_dir, min_size, &settings) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(file = %file, error = %format!("{error:#}"), "cover upscale failed");
                CoverEntry::failed(file, &error)
            }
        };
        covers.push(entry);
    }

    let report_path = paths.covers_dir.join(UPSCALE_REPORT_FILE);
    let report = UpscaleReport {
        updated_at: utc_timestamp(),
        min_size,
        summary: CoverSummary::from_entries(&covers),
        covers,
        report_path,
    };
    write_report(&report.report_path, &report)?;
    Ok(report)
}

fn upscale_one(
    path: &Path,
    backup_dir: &Path,
    min_size: u32,
    settings: &EncodeSettings,
) -> Result<CoverEntry> {
    let mut entry = CoverEntry::new(file_name(path));
    let loaded = load_cover(path)?;
    let before = Dimensions::of(&loaded.image);
    let target = scaled_dimensions(before, min_size);
    let format = CoverFormat::from_extension(path);

    let output = if target == before {
        loaded.image
    } else {
        loaded
            .image
            .resize_exact(target.width, target.height, FilterType::Lanczos3)
    };
    let bytes = encode_cover(
        &output,
        format,
        &EncodeSettings {
            icc_profile: loaded.icc_profile,
            ..settings.clone()
        },
    )?;

    entry.backed_up = backup_original(path, backup_dir)?;
    write_cover(path, &bytes)?;

    let check = validate_saved(path, DimensionRule::AtLeast(min_size), format);
    entry.before = Some(before);
    entry.after = check.after;
    entry.format = Some(format.label().to_string());
    entry.changed = target != before;
    entry.icc_profile_embedded = check.icc_profile_embedded;
    entry.validation_passed = check.issues.is_empty();
    entry.issues = check.issues;
    entry.size_bytes = file_size(path);
    Ok(entry)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use crate::config::{PathsSection, SiteConfig};
    use crate::covers::testing::write_test_image;
    use crate::covers::{Dimensions, UPSCALE_BACKUP_DIR, load_cover};
    use crate::runtime::resolve_paths;

    use super::{UPSCALE_REPORT_FILE, scaled_dimensions, upscale_covers};

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn scale_uses_the_shorter_side() {
        assert_eq!(scaled_dimensions(dims(500, 250), 1000), dims(2000, 1000));
        assert_eq!(scaled_dimensions(dims(400, 800), 1000), dims(1000, 2000));
        assert_eq!(scaled_dimensions(dims(333, 333), 1000), dims(1000, 1000));
        assert_eq!(scaled_dimensions(dims(1200, 1000), 1000), dims(1200, 1000));
    }

    #[test]
    fn large_covers_keep_dimensions_and_small_covers_grow() {
        let temp = tempdir().expect("tempdir");
        let paths = resolve_paths(temp.path(), &PathsSection::default());
        fs::create_dir_all(&paths.covers_dir).expect("covers");
        write_test_image(&paths.covers_dir.join("big.png"), 64, 80);
        write_test_image(&paths.covers_dir.join("small.jpg"), 20, 10);
        fs::write(paths.covers_dir.join("broken.png"), b"garbage").expect("broken");

        let mut config = SiteConfig::default();
        config.covers.min_size = 60;
        let report = upscale_covers(&paths, &config).expect("upscale");

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.passed, 2);
        assert_eq!(report.summary.failed, 1);

        let big = report
            .covers
            .iter()
            .find(|entry| entry.file == "big.png")
            .expect("big entry");
        assert!(!big.changed);
        assert_eq!(big.after, Some(dims(64, 80)));
        assert_eq!(big.format.as_deref(), Some("PNG"));

        let small = report
            .covers
            .iter()
            .find(|entry| entry.file == "small.jpg")
            .expect("small entry");
        assert!(small.changed);
        assert_eq!(small.before, Some(dims(20, 10)));
        assert_eq!(small.after, Some(dims(120, 60)));
        assert!(small.validation_passed);

        let broken = report
            .covers
            .iter()
            .find(|entry| entry.file == "broken.png")
            .expect("broken entry");
        assert!(!broken.validation_passed);
        assert!(!broken.issues.is_empty());

        let reloaded = load_cover(&paths.covers_dir.join("small.jpg")).expect("reload");
        assert_eq!(Dimensions::of(&reloaded.image), dims(120, 60));
        assert!(paths.covers_dir.join(UPSCALE_BACKUP_DIR).join("small.jpg").exists());
        assert!(!paths.covers_dir.join(UPSCALE_BACKUP_DIR).join("broken.png").exists());

        let written: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(paths.covers_dir.join(UPSCALE_REPORT_FILE)).expect("report"),
        )
        .expect("report json");
        assert!(written["updatedAt"].is_string());
        assert_eq!(written["covers"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn missing_covers_dir_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let paths = resolve_paths(temp.path(), &PathsSection::default());

        let error = upscale_covers(&paths, &SiteConfig::default()).expect_err("no covers dir");
        assert!(error.to_string().contains("covers directory not found"));
        assert!(!paths.covers_dir.join(UPSCALE_REPORT_FILE).exists());
    }

    #[test]
    fn backup_keeps_the_first_original_across_runs() {
        let temp = tempdir().expect("tempdir");
        let paths = resolve_paths(temp.path(), &PathsSection::default());
        fs::create_dir_all(&paths.covers_dir).expect("covers");
        write_test_image(&paths.covers_dir.join("song.png"), 10, 10);
        let original = fs::read(paths.covers_dir.join("song.png")).expect("original bytes");

        let mut config = SiteConfig::default();
        config.covers.min_size = 30;
        upscale_covers(&paths, &config).expect("first run");
        let second = upscale_covers(&paths, &config).expect("second run");

        let entry = &second.covers[0];
        assert!(!entry.changed);
        assert!(!entry.backed_up);
        assert_eq!(
            fs::read(paths.covers_dir.join(UPSCALE_BACKUP_DIR).join("song.png")).expect("backup"),
            original
        );
    }
}
