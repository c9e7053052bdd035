use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::config::SiteConfig;
use crate::covers::list_top_level_covers;
use crate::http::{SiteHttpClient, WebClient};
use crate::links::LinkCatalog;
use crate::runtime::ResolvedPaths;
use crate::utc_timestamp;

const KNOWN_SUFFIX: &str = "_mpg";
const UNDATED_SENTINEL: &str = "9999-12-31";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platforms {
    pub youtube: Option<String>,
    pub spotify: String,
    pub apple: String,
    pub hyperfollow: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credits {
    pub artist: String,
    pub producer: String,
    pub writers: Vec<String>,
    pub label: String,
}

impl Credits {
    pub fn for_artist(artist: &str) -> Self {
        Self {
            artist: artist.to_string(),
            producer: "Unknown".to_string(),
            writers: vec![artist.to_string()],
            label: "Independent".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub cover: String,
    #[serde(rename = "releaseDate")]
    pub release_date: Option<String>,
    pub platforms: Platforms,
    pub credits: Credits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discography {
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone)]
pub struct DiscographyReport {
    pub output_path: PathBuf,
    pub tracks: Vec<Track>,
    pub request_count: usize,
}

impl DiscographyReport {
    pub fn matched_count(&self) -> usize {
        self.tracks
            .iter()
            .filter(|track| track.platforms.youtube.is_some())
            .count()
    }

    pub fn dated_count(&self) -> usize {
        self.tracks
            .iter()
            .filter(|track| track.release_date.is_some())
            .count()
    }
}

/// Lowercase, drop a trailing `_mpg`, keep only `[a-z0-9]`.
pub fn normalize_key(value: &str) -> String {
    let lower = value.to_lowercase();
    let stem = lower.strip_suffix(KNOWN_SUFFIX).unwrap_or(&lower);
    stem.chars()
        .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        .collect()
}

/// `neon_rain_MPG.png` -> `Neon Rain`.
pub fn title_from_filename(name: &str) -> String {
    let base = image_extension_regex().replace(name, "");
    let base = suffix_regex().replace(&base, "");
    let spaced = base.replace('_', " ");
    word_start_regex()
        .replace_all(&spaced, |caps: &Captures| caps[1].to_uppercase())
        .into_owned()
}

/// First publish date found in a video page, normalized to `YYYY-MM-DD`.
pub fn extract_publish_date(html: &str) -> Option<String> {
    let raw = meta_date_regex()
        .captures(html)
        .or_else(|| json_date_regex().captures(html))
        .map(|caps| caps[1].to_string())?;
    normalize_date(&raw)
}

fn normalize_date(raw: &str) -> Option<String> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

pub fn platform_links(
    config: &SiteConfig,
    title: &str,
    youtube: Option<String>,
) -> Platforms {
    let query = urlencoding::encode(&format!("{} {title}", config.artist())).into_owned();
    Platforms {
        youtube,
        spotify: format!("https://open.spotify.com/search/{query}"),
        apple: format!("https://music.apple.com/us/search?term={query}"),
        hyperfollow: config.hyperfollow_url().to_string(),
    }
}

fn sort_key(track: &Track) -> (bool, &str) {
    (
        track.release_date.is_none(),
        track.release_date.as_deref().unwrap_or(UNDATED_SENTINEL),
    )
}

/// Release date ascending, undated last; ties keep their input order.
pub fn sort_tracks(tracks: &mut [Track]) {
    tracks.sort_by(|left, right| sort_key(left).cmp(&sort_key(right)));
}

fn load_link_map(path: &Path) -> Result<HashMap<String, String>> {
    if !path.is_file() {
        bail!("link catalog not found: {}", path.display());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let catalog: LinkCatalog = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut map = HashMap::new();
    for record in catalog.links {
        let url = record.resolved_url();
        if record.title.is_empty() || url.is_empty() {
            continue;
        }
        map.insert(normalize_key(&record.title), url.to_string());
    }
    Ok(map)
}

fn fetch_publish_date(client: &mut impl WebClient, url: &str) -> Option<String> {
    match client.get(url) {
        Ok(response) if response.status >= 400 => {
            tracing::warn!(
                url,
                status = response.status,
                "publish date page returned error status"
            );
            None
        }
        Ok(response) => response.body.as_deref().and_then(extract_publish_date),
        Err(error) => {
            tracing::warn!(url, error = %format!("{error:#}"), "publish date fetch failed");
            None
        }
    }
}

pub fn build_discography_with_client(
    paths: &ResolvedPaths,
    config: &SiteConfig,
    client: &mut impl WebClient,
) -> Result<DiscographyReport> {
    let link_map = load_link_map(&paths.links_json_path)?;
    let covers_label = paths.display_relative(&paths.covers_dir);

    let mut tracks = Vec::new();
    if paths.covers_dir.is_dir() {
        for path in list_top_level_covers(&paths.covers_dir)? {
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if name.starts_with('_') {
                tracing::debug!(file = name, "skipping underscore-prefixed cover");
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(name);
            let title = title_from_filename(name);
            let youtube = link_map.get(&normalize_key(stem)).cloned();
            let release_date = youtube
                .as_deref()
                .and_then(|url| fetch_publish_date(client, url));
            tracks.push(Track {
                platforms: platform_links(config, &title, youtube),
                credits: Credits::for_artist(config.artist()),
                cover: format!("{covers_label}/{name}"),
                release_date,
                title,
            });
        }
    } else {
        tracing::warn!(
            dir = %paths.covers_dir.display(),
            "covers directory missing; no tracks built"
        );
    }
    sort_tracks(&mut tracks);

    let document = Discography {
        updated_at: utc_timestamp(),
        tracks,
    };
    let json = serde_json::to_string_pretty(&document).context("failed to encode discography")?;
    fs::write(&paths.discography_json_path, json).with_context(|| {
        format!(
            "failed to write {}",
            paths.discography_json_path.display()
        )
    })?;

    Ok(DiscographyReport {
        output_path: paths.discography_json_path.clone(),
        tracks: document.tracks,
        request_count: client.request_count(),
    })
}

pub fn build_discography(paths: &ResolvedPaths, config: &SiteConfig) -> Result<DiscographyReport> {
    let mut client = SiteHttpClient::from_site_config(config)?;
    build_discography_with_client(paths, config, &mut client)
}

fn image_extension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\.(png|jpe?g)$").expect("image extension regex must compile")
    })
}

fn suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)_mpg$").expect("suffix regex must compile"))
}

fn word_start_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\w)").expect("word start regex must compile"))
}

fn meta_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<meta itemprop="datePublished" content="(.*?)""#)
            .expect("meta date regex must compile")
    })
}

fn json_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""publishDate":"(\d{4}-\d{2}-\d{2})""#).expect("json date regex must compile")
    })
}
