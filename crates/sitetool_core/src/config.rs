use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ARTIST: &str = "MoneyPrinter G";
pub const DEFAULT_HYPERFOLLOW_URL: &str = "https://hyperfollow.com/moneyprinterg";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_HEAD_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_GET_TIMEOUT_MS: u64 = 20_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub covers: CoversSection,
    #[serde(default)]
    pub http: HttpSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    pub artist: Option<String>,
    pub hyperfollow_url: Option<String>,
    pub user_agent: Option<String>,
}

/// File and directory names, relative to the project root.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsSection {
    pub site_dir: String,
    pub covers_dir: String,
    pub docs_dir: String,
    pub config_dir: String,
    pub dist_dir: String,
    pub project_doc: String,
    pub team_dump: String,
    pub links_text: String,
    pub links_json: String,
    pub discography_json: String,
    pub build_report: String,
    pub release_zip: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            site_dir: "Moneyprinterg".to_string(),
            covers_dir: "covers".to_string(),
            docs_dir: "docs".to_string(),
            config_dir: "config".to_string(),
            dist_dir: "dist".to_string(),
            project_doc: "MoneyPrinter G Official Fan Website.md".to_string(),
            team_dump: "team-fullstack.txt".to_string(),
            links_text: "MoneyPrinter G link.txt".to_string(),
            links_json: "links.json".to_string(),
            discography_json: "discography.json".to_string(),
            build_report: "BUILD_REPORT.md".to_string(),
            release_zip: "release.zip".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildSection {
    pub required_site_files: Vec<String>,
    pub data_files: Vec<String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            required_site_files: [
                "index.html",
                "discography.html",
                "events.html",
                "styles.css",
                "script.js",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            data_files: ["discography.json", "events.json", "links.json"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Preserve,
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preserve => "preserve",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoversSection {
    pub min_size: u32,
    pub target_width: u32,
    pub target_height: u32,
    pub maintain_aspect: bool,
    pub output_format: OutputFormat,
    pub jpeg_quality: u8,
    pub upscale_jpeg_quality: u8,
    pub png_compress_level: u8,
    pub convert_to_srgb: bool,
}

impl Default for CoversSection {
    fn default() -> Self {
        Self {
            min_size: 1000,
            target_width: 500,
            target_height: 500,
            maintain_aspect: true,
            output_format: OutputFormat::Preserve,
            jpeg_quality: 92,
            upscale_jpeg_quality: 85,
            png_compress_level: 6,
            convert_to_srgb: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub head_timeout_ms: Option<u64>,
    pub get_timeout_ms: Option<u64>,
}

impl SiteConfig {
    pub fn artist(&self) -> &str {
        self.site.artist.as_deref().unwrap_or(DEFAULT_ARTIST)
    }

    pub fn hyperfollow_url(&self) -> &str {
        self.site
            .hyperfollow_url
            .as_deref()
            .unwrap_or(DEFAULT_HYPERFOLLOW_URL)
    }

    /// Resolve user agent: env SITETOOL_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Some(value) = non_empty_env("SITETOOL_USER_AGENT") {
            return value;
        }
        self.site
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve the HEAD deadline: env SITETOOL_HTTP_TIMEOUT_MS > config > default.
    pub fn head_timeout_ms(&self) -> u64 {
        env_timeout_ms()
            .or(self.http.head_timeout_ms)
            .unwrap_or(DEFAULT_HEAD_TIMEOUT_MS)
    }

    /// Resolve the GET deadline: env SITETOOL_HTTP_TIMEOUT_MS > config > default.
    pub fn get_timeout_ms(&self) -> u64 {
        env_timeout_ms()
            .or(self.http.get_timeout_ms)
            .unwrap_or(DEFAULT_GET_TIMEOUT_MS)
    }
}

/// Load and parse a SiteConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SiteConfig> {
    if !config_path.exists() {
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SiteConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    validate_config(&parsed)
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
    Ok(parsed)
}

fn validate_config(config: &SiteConfig) -> Result<()> {
    let covers = &config.covers;
    if covers.min_size == 0 {
        bail!("covers.min_size must be greater than zero");
    }
    if covers.target_width == 0 || covers.target_height == 0 {
        bail!(
            "covers target size must be non-zero (got {}x{})",
            covers.target_width,
            covers.target_height
        );
    }
    let quality_range = 1..=100;
    if !quality_range.contains(&covers.jpeg_quality)
        || !quality_range.contains(&covers.upscale_jpeg_quality)
    {
        bail!("covers JPEG quality must be within 1..=100");
    }
    if covers.png_compress_level > 9 {
        bail!(
            "covers.png_compress_level must be within 0..=9 (got {})",
            covers.png_compress_level
        );
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_timeout_ms() -> Option<u64> {
    non_empty_env("SITETOOL_HTTP_TIMEOUT_MS").and_then(|value| value.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{DEFAULT_ARTIST, OutputFormat, SiteConfig, load_config};

    #[test]
    fn load_config_returns_default_when_missing() {
        let temp = tempdir().expect("tempdir");
        let config = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(config, SiteConfig::default());
        assert_eq!(config.artist(), DEFAULT_ARTIST);
        assert_eq!(config.covers.min_size, 1000);
        assert_eq!(config.paths.site_dir, "Moneyprinterg");
    }

    #[test]
    fn load_config_merges_partial_sections_with_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[site]\nartist = \"Someone Else\"\n\n[paths]\nsite_dir = \"public\"\n\n[covers]\ntarget_width = 640\noutput_format = \"jpeg\"\n",
        )
        .expect("write config");

        let config = load_config(&path).expect("load");
        assert_eq!(config.artist(), "Someone Else");
        assert_eq!(config.paths.site_dir, "public");
        assert_eq!(config.paths.covers_dir, "covers");
        assert_eq!(config.covers.target_width, 640);
        assert_eq!(config.covers.target_height, 500);
        assert_eq!(config.covers.output_format, OutputFormat::Jpeg);
        assert_eq!(config.build.data_files.len(), 3);
    }

    #[test]
    fn load_config_rejects_out_of_range_compression() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[covers]\npng_compress_level = 12\n").expect("write config");

        let err = load_config(&path).expect_err("must fail");
        assert!(format!("{err:#}").contains("png_compress_level"));
    }
}
