use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::SiteConfig;
use crate::http::{SiteHttpClient, WebClient};
use crate::runtime::ResolvedPaths;
use crate::utc_timestamp;

const YOUTUBE_PREFIX: &str = "https://www.youtube.com";
const STATUS_PREFIX: &str = "Status: ";
const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPair {
    pub title: String,
    pub url: String,
}

impl LinkPair {
    fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// One verified link as mirrored into `links.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkRecord {
    pub title: String,
    pub url: String,
    pub ok: bool,
    pub status: Option<u16>,
    pub final_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LinkRecord {
    /// The URL a consumer should follow: the post-redirect URL when known.
    pub fn resolved_url(&self) -> &str {
        if self.final_url.is_empty() {
            &self.url
        } else {
            &self.final_url
        }
    }

    pub fn status_label(&self) -> String {
        if self.ok {
            return "OK".to_string();
        }
        match self.status {
            Some(status) => format!("BAD ({status})"),
            None => "BAD (no response)".to_string(),
        }
    }
}

/// `links.json` as written by the verifier and read by the discography builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkCatalog {
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub links: Vec<LinkRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCheck {
    pub ok: bool,
    pub status: Option<u16>,
    pub final_url: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LinkVerifyReport {
    pub records: Vec<LinkRecord>,
    pub text_path: PathBuf,
    pub json_path: PathBuf,
    pub request_count: usize,
}

impl LinkVerifyReport {
    pub fn ok_count(&self) -> usize {
        self.records.iter().filter(|record| record.ok).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &LinkRecord> {
        self.records.iter().filter(|record| !record.ok)
    }
}

/// Truncate a URL that carries a second concatenated `https://www.youtube.com` prefix.
pub fn repair_duplicated_scheme(url: &str) -> String {
    let Some(first) = url.find(YOUTUBE_PREFIX) else {
        return url.to_string();
    };
    match url[first + 1..].find(YOUTUBE_PREFIX) {
        Some(offset) => url[..first + 1 + offset].to_string(),
        None => url.to_string(),
    }
}

/// Read (title, url) pairs from the link text, whether hand-written or previously normalized.
pub fn parse_links(text: &str) -> Vec<LinkPair> {
    let lines = text.lines().map(str::trim).collect::<Vec<_>>();
    let attempts: [fn(&[&str]) -> Option<Vec<LinkPair>>; 2] =
        [parse_normalized_listing, parse_loose_listing];
    let mut pairs = attempts
        .iter()
        .find_map(|attempt| attempt(&lines))
        .unwrap_or_default();
    append_artist_profiles(text, &mut pairs);
    pairs
}

/// `title / url / Status: …` triples, as written by [`render_link_text`].
fn parse_normalized_listing(lines: &[&str]) -> Option<Vec<LinkPair>> {
    let content = lines
        .iter()
        .copied()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();
    if content.is_empty() || content.len() % 3 != 0 {
        return None;
    }
    let mut pairs = Vec::with_capacity(content.len() / 3);
    for chunk in content.chunks(3) {
        let [title, url, status] = chunk else {
            return None;
        };
        // Titles may themselves be URLs; the url and status lines decide the shape.
        if !url.starts_with("http") || !status.starts_with(STATUS_PREFIX) {
            return None;
        }
        pairs.push(LinkPair::new(*title, repair_duplicated_scheme(url)));
    }
    Some(pairs)
}

/// A line starting with `http` opens a pair; the next non-blank line is its title.
fn parse_loose_listing(lines: &[&str]) -> Option<Vec<LinkPair>> {
    let mut pairs = Vec::new();
    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];
        if !line.starts_with("http") {
            index += 1;
            continue;
        }
        let url = repair_duplicated_scheme(line);
        match lines[index + 1..]
            .iter()
            .position(|candidate| !candidate.is_empty())
        {
            Some(offset) => {
                let title_index = index + 1 + offset;
                pairs.push(LinkPair::new(lines[title_index], url));
                index = title_index + 1;
            }
            None => {
                pairs.push(LinkPair::new(UNTITLED, url));
                index += 1;
            }
        }
    }
    Some(pairs)
}

fn append_artist_profiles(text: &str, pairs: &mut Vec<LinkPair>) {
    let profiles = [
        ("apple.com", "Apple Music", "Apple Music (Artist)", apple_profile_regex()),
        ("open.spotify.com", "Spotify", "Spotify (Artist)", spotify_profile_regex()),
    ];
    for (host, mention, title, regex) in profiles {
        if !text.contains(host) || pairs.iter().any(|pair| pair.title.contains(mention)) {
            continue;
        }
        if let Some(found) = regex.find(text) {
            pairs.push(LinkPair::new(title, found.as_str()));
        }
    }
}

fn apple_profile_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"https://music\.apple\.com/\S+").expect("apple profile regex must compile")
    })
}

fn spotify_profile_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"https://open\.spotify\.com/\S+").expect("spotify profile regex must compile")
    })
}

/// HEAD first, GET when HEAD answers with an error status. Never fails; errors become data.
pub fn check_url(client: &mut impl WebClient, url: &str) -> LinkCheck {
    let response = client.head(url).and_then(|head| {
        if head.status >= 400 {
            client.get(url)
        } else {
            Ok(head)
        }
    });
    match response {
        Ok(response) => LinkCheck {
            ok: response.is_success(),
            status: Some(response.status),
            final_url: response.final_url,
            error: None,
        },
        Err(error) => LinkCheck {
            ok: false,
            status: None,
            final_url: url.to_string(),
            error: Some(format!("{error:#}")),
        },
    }
}

pub fn render_link_text(records: &[LinkRecord]) -> String {
    let blocks = records
        .iter()
        .map(|record| {
            format!(
                "{}\n{}\n{STATUS_PREFIX}{}\n",
                record.title,
                record.final_url,
                record.status_label()
            )
        })
        .collect::<Vec<_>>();
    format!("{}\n", blocks.join("\n").trim())
}

pub fn verify_links_with_client(
    paths: &ResolvedPaths,
    client: &mut impl WebClient,
) -> Result<LinkVerifyReport> {
    let text_path = &paths.links_text_path;
    if !text_path.is_file() {
        bail!("link file not found: {}", text_path.display());
    }
    let raw = fs::read_to_string(text_path)
        .with_context(|| format!("failed to read {}", text_path.display()))?;

    let mut records = Vec::new();
    for pair in parse_links(&raw) {
        let check = check_url(client, &pair.url);
        records.push(LinkRecord {
            title: pair.title,
            url: pair.url,
            ok: check.ok,
            status: check.status,
            final_url: check.final_url,
            error: check.error,
        });
    }

    fs::write(text_path, render_link_text(&records))
        .with_context(|| format!("failed to write {}", text_path.display()))?;

    let catalog = LinkCatalog {
        updated_at: Some(utc_timestamp()),
        links: records,
    };
    let json = serde_json::to_string_pretty(&catalog).context("failed to encode link catalog")?;
    fs::write(&paths.links_json_path, json)
        .with_context(|| format!("failed to write {}", paths.links_json_path.display()))?;

    let report = LinkVerifyReport {
        records: catalog.links,
        text_path: text_path.clone(),
        json_path: paths.links_json_path.clone(),
        request_count: client.request_count(),
    };
    for record in report.failed() {
        tracing::warn!(
            title = %record.title,
            status = ?record.status,
            error = record.error.as_deref().unwrap_or(""),
            "link check failed"
        );
    }
    Ok(report)
}

pub fn verify_links(paths: &ResolvedPaths, config: &SiteConfig) -> Result<LinkVerifyReport> {
    let mut client = SiteHttpClient::from_site_config(config)?;
    verify_links_with_client(paths, &mut client)
}
