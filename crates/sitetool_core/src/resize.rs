use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use image::DynamicImage;
use image::imageops::FilterType;
use serde::Serialize;

use crate::config::{CoversSection, OutputFormat, SiteConfig};
use crate::covers::{
    CoverEntry, CoverFormat, CoverSummary, DimensionRule, Dimensions, EncodeSettings,
    RESIZE_BACKUP_DIR, backup_original, encode_cover, file_size, load_cover,
    png_compression_for_level, require_covers_dir, to_rgb_mode, validate_saved, walk_covers,
    write_cover, write_report,
};
use crate::runtime::{ResolvedPaths, normalize_for_display};

pub const RESIZE_REPORT_FILE: &str = "resize_report.json";

#[derive(Debug, Clone, Serialize)]
pub struct ResizeTarget {
    pub width: u32,
    pub height: u32,
    pub maintain_aspect: bool,
    pub output_format: &'static str,
    pub jpeg_quality: u8,
    pub png_compress_level: u8,
    pub convert_to_srgb: bool,
}

impl ResizeTarget {
    fn from_config(covers: &CoversSection) -> Self {
        Self {
            width: covers.target_width,
            height: covers.target_height,
            maintain_aspect: covers.maintain_aspect,
            output_format: covers.output_format.as_str(),
            jpeg_quality: covers.jpeg_quality,
            png_compress_level: covers.png_compress_level,
            convert_to_srgb: covers.convert_to_srgb,
        }
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResizeReport {
    pub run_at: String,
    pub target: ResizeTarget,
    pub results: Vec<CoverEntry>,
    pub summary: CoverSummary,
    #[serde(skip)]
    pub report_path: PathBuf,
}

/// Resize to exactly `width`×`height`: cover-fit with a centered crop, or a plain stretch.
pub fn resize_exact(
    image: &DynamicImage,
    width: u32,
    height: u32,
    maintain_aspect: bool,
) -> DynamicImage {
    if maintain_aspect {
        image.resize_to_fill(width, height, FilterType::Lanczos3)
    } else {
        image.resize_exact(width, height, FilterType::Lanczos3)
    }
}

/// The format a file is written in under the configured output policy.
pub fn output_format_for(path: &Path, policy: OutputFormat) -> CoverFormat {
    match policy {
        OutputFormat::Preserve => CoverFormat::from_extension(path),
        OutputFormat::Png => CoverFormat::Png,
        OutputFormat::Jpeg => CoverFormat::Jpeg,
    }
}

/// Normalize every cover under the covers dir to the exact target size, in place.
pub fn resize_covers(paths: &ResolvedPaths, config: &SiteConfig) -> Result<ResizeReport> {
    require_covers_dir(&paths.covers_dir)?;
    let backup_dir = paths.covers_dir.join(RESIZE_BACKUP_DIR);
    let target = ResizeTarget::from_config(&config.covers);

    let mut results = Vec::new();
    for path in walk_covers(&paths.covers_dir)? {
        let relative = normalize_for_display(
            path.strip_prefix(&paths.covers_dir).unwrap_or(path.as_path()),
        );
        let entry = match resize_one(&path, &relative, &backup_dir, &config.covers, &target) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(
                    file = %relative,
                    error = %format!("{error:#}"),
                    "cover resize failed"
                );
                CoverEntry::failed(relative, &error)
            }
        };
        results.push(entry);
    }

    let report = ResizeReport {
        run_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        target,
        summary: CoverSummary::from_entries(&results),
        results,
        report_path: paths.covers_dir.join(RESIZE_REPORT_FILE),
    };
    write_report(&report.report_path, &report)?;
    Ok(report)
}

fn resize_one(
    path: &Path,
    relative: &str,
    backup_dir: &Path,
    covers: &CoversSection,
    target: &ResizeTarget,
) -> Result<CoverEntry> {
    let mut entry = CoverEntry::new(relative.to_string());
    entry.backed_up = backup_original(path, backup_dir)?;

    let loaded = load_cover(path)?;
    let before = Dimensions::of(&loaded.image);
    let image = if covers.convert_to_srgb {
        to_rgb_mode(loaded.image)
    } else {
        loaded.image
    };
    let resized = resize_exact(&image, target.width, target.height, target.maintain_aspect);
    let format = output_format_for(path, covers.output_format);

    let bytes = encode_cover(
        &resized,
        format,
        &EncodeSettings {
            jpeg_quality: covers.jpeg_quality,
            png_compression: png_compression_for_level(covers.png_compress_level),
            icc_profile: loaded.icc_profile,
        },
    )?;
    write_cover(path, &bytes)?;

    let check = validate_saved(path, DimensionRule::Exact(target.dimensions()), format);
    entry.before = Some(before);
    entry.after = check.after;
    entry.format = Some(format.label().to_string());
    entry.changed = true;
    entry.icc_profile_embedded = check.icc_profile_embedded;
    entry.validation_passed = check.issues.is_empty();
    entry.issues = check.issues;
    entry.size_bytes = file_size(path);
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{ColorType, DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
    use tempfile::tempdir;

    use crate::config::{OutputFormat, PathsSection, SiteConfig};
    use crate::covers::testing::write_test_image;
    use crate::covers::{CoverFormat, Dimensions, RESIZE_BACKUP_DIR, load_cover};
    use crate::runtime::resolve_paths;

    use super::{RESIZE_REPORT_FILE, output_format_for, resize_covers, resize_exact};

    #[test]
    fn cover_fit_is_exact_for_any_aspect_ratio() {
        for (width, height) in [(1000, 300), (300, 1000), (499, 501), (20, 20), (2000, 2000)] {
            let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                width,
                height,
                Rgba([10, 20, 30, 255]),
            ));
            let resized = resize_exact(&image, 500, 500, true);
            assert_eq!((resized.width(), resized.height()), (500, 500));
            let stretched = resize_exact(&image, 500, 500, false);
            assert_eq!((stretched.width(), stretched.height()), (500, 500));
        }
    }

    #[test]
    fn output_policy_chooses_format() {
        let jpg = std::path::Path::new("a.jpeg");
        assert_eq!(output_format_for(jpg, OutputFormat::Preserve), CoverFormat::Jpeg);
        assert_eq!(output_format_for(jpg, OutputFormat::Png), CoverFormat::Png);
        let png = std::path::Path::new("a.png");
        assert_eq!(output_format_for(png, OutputFormat::Jpeg), CoverFormat::Jpeg);
    }

    #[test]
    fn resize_walks_tree_and_validates_each_file() {
        let temp = tempdir().expect("tempdir");
        let paths = resolve_paths(temp.path(), &PathsSection::default());
        let nested = paths.covers_dir.join("singles");
        fs::create_dir_all(&nested).expect("covers");
        write_test_image(&paths.covers_dir.join("wide.png"), 90, 30);
        write_test_image(&nested.join("tall.jpg"), 30, 90);
        fs::write(paths.covers_dir.join("zz_broken.jpg"), b"garbage").expect("broken");

        let mut config = SiteConfig::default();
        config.covers.target_width = 48;
        config.covers.target_height = 48;
        let report = resize_covers(&paths, &config).expect("resize");

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.passed, 2);
        assert_eq!(report.summary.failed, 1);
        let files = report
            .results
            .iter()
            .map(|entry| entry.file.as_str())
            .collect::<Vec<_>>();
        assert_eq!(files, vec!["singles/tall.jpg", "wide.png", "zz_broken.jpg"]);

        let tall = &report.results[0];
        assert_eq!(tall.before, Some(Dimensions { width: 30, height: 90 }));
        assert_eq!(tall.after, Some(Dimensions { width: 48, height: 48 }));
        assert_eq!(tall.format.as_deref(), Some("JPEG"));

        for name in ["wide.png", "singles/tall.jpg"] {
            let reloaded = load_cover(&paths.covers_dir.join(name)).expect("reload");
            assert_eq!((reloaded.image.width(), reloaded.image.height()), (48, 48));
        }
        assert!(paths.covers_dir.join(RESIZE_BACKUP_DIR).join("tall.jpg").exists());
        assert!(paths.covers_dir.join(RESIZE_BACKUP_DIR).join("wide.png").exists());

        let written: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(paths.covers_dir.join(RESIZE_REPORT_FILE)).expect("report"),
        )
        .expect("json");
        assert_eq!(written["target"]["width"], 48);
        assert_eq!(written["target"]["output_format"], "preserve");
        assert_eq!(written["summary"]["failed"], 1);

        let rerun = resize_covers(&paths, &config).expect("rerun");
        assert_eq!(rerun.summary.total, 3);
        assert!(rerun.results.iter().all(|entry| !entry.backed_up));
    }

    #[test]
    fn missing_covers_dir_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let paths = resolve_paths(temp.path(), &PathsSection::default());

        let error = resize_covers(&paths, &SiteConfig::default()).expect_err("no covers dir");
        assert!(error.to_string().contains("covers directory not found"));
        assert!(!paths.covers_dir.exists());
    }

    #[test]
    fn stretch_mode_reaches_the_exact_target() {
        let temp = tempdir().expect("tempdir");
        let paths = resolve_paths(temp.path(), &PathsSection::default());
        fs::create_dir_all(&paths.covers_dir).expect("covers");
        write_test_image(&paths.covers_dir.join("wide.png"), 90, 30);

        let mut config = SiteConfig::default();
        config.covers.target_width = 48;
        config.covers.target_height = 48;
        config.covers.maintain_aspect = false;
        let report = resize_covers(&paths, &config).expect("resize");

        assert!(!report.target.maintain_aspect);
        let entry = &report.results[0];
        assert!(entry.validation_passed, "issues: {:?}", entry.issues);
        assert_eq!(entry.before, Some(Dimensions { width: 90, height: 30 }));
        assert_eq!(entry.after, Some(Dimensions { width: 48, height: 48 }));
    }

    #[test]
    fn color_conversion_only_runs_when_enabled() {
        let temp = tempdir().expect("tempdir");
        let paths = resolve_paths(temp.path(), &PathsSection::default());
        fs::create_dir_all(&paths.covers_dir).expect("covers");
        let gray = paths.covers_dir.join("gray.png");
        let write_gray = || {
            DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, Luma([120])))
                .save(&gray)
                .expect("gray png");
        };

        let mut config = SiteConfig::default();
        config.covers.target_width = 8;
        config.covers.target_height = 8;

        write_gray();
        config.covers.convert_to_srgb = false;
        let kept = resize_covers(&paths, &config).expect("resize without conversion");
        assert!(kept.results[0].validation_passed);
        assert_eq!(load_cover(&gray).expect("reload").image.color(), ColorType::L8);

        write_gray();
        config.covers.convert_to_srgb = true;
        let converted = resize_covers(&paths, &config).expect("resize with conversion");
        assert!(converted.results[0].validation_passed);
        assert_eq!(load_cover(&gray).expect("reload").image.color(), ColorType::Rgb8);
    }

    #[test]
    fn forced_jpeg_output_drops_alpha() {
        let temp = tempdir().expect("tempdir");
        let paths = resolve_paths(temp.path(), &PathsSection::default());
        fs::create_dir_all(&paths.covers_dir).expect("covers");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 12, Rgba([1, 2, 3, 128])))
            .save(paths.covers_dir.join("alpha.png"))
            .expect("alpha png");

        let mut config = SiteConfig::default();
        config.covers.target_width = 8;
        config.covers.target_height = 8;
        config.covers.output_format = OutputFormat::Jpeg;
        let report = resize_covers(&paths, &config).expect("resize");

        let entry = &report.results[0];
        assert!(entry.validation_passed, "issues: {:?}", entry.issues);
        assert_eq!(entry.format.as_deref(), Some("JPEG"));
        let reloaded = load_cover(&paths.covers_dir.join("alpha.png")).expect("reload");
        assert!(!reloaded.image.color().has_alpha());
    }
}
