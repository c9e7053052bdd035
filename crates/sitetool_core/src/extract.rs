use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::runtime::ResolvedPaths;

pub const PROJECT_DOC_OUTPUT: &str = "ProjectDocumentation.md";
pub const PROJECT_DOC_SUMMARY: &str = "ProjectDocumentation.summary.json";
pub const TEAM_CONFIG_OUTPUT: &str = "team-fullstack.yaml";
pub const TEAM_CONFIG_SUMMARY: &str = "team-fullstack.summary.json";

pub const TEAM_BLOCK_START: &str = "==================== START: .bmad-core/agent-teams/team-fullstack.yaml ====================";
pub const TEAM_BLOCK_END: &str = "==================== END: .bmad-core/agent-teams/team-fullstack.yaml ====================";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub level: usize,
    pub content: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownOutline {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preamble: Vec<String>,
    pub sections: Vec<Section>,
}

impl MarkdownOutline {
    /// Preamble, then each section's title followed by its body, one line each.
    pub fn flatten(&self) -> Vec<String> {
        let mut out = self.preamble.clone();
        for section in &self.sections {
            out.push(section.title.clone());
            out.extend(section.content.iter().cloned());
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
struct OutlineSummary<'a> {
    section_count: usize,
    #[serde(flatten)]
    outline: &'a MarkdownOutline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocExtractReport {
    pub exists: bool,
    pub section_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub agents: Vec<String>,
    pub workflows: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Markers,
    Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigParser {
    Structured,
    LineScrape,
}

impl ConfigParser {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::LineScrape => "line_scrape",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct TeamConfigSummary<'a> {
    #[serde(flatten)]
    config: &'a TeamConfig,
    parser: ConfigParser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamConfigReport {
    pub exists: bool,
    pub extracted: bool,
    pub source: Option<ExtractionSource>,
    pub parser: Option<ConfigParser>,
    pub agent_count: usize,
    pub workflow_count: usize,
}

impl TeamConfigReport {
    fn not_extracted(exists: bool) -> Self {
        Self {
            exists,
            extracted: false,
            source: None,
            parser: None,
            agent_count: 0,
            workflow_count: 0,
        }
    }
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("heading regex must compile"))
}

fn team_signature_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"bundle:\n[\s\S]+?agents:[\s\S]+?workflows:[\s\S]+")
            .expect("team signature regex must compile")
    })
}

pub fn parse_markdown_outline(text: &str) -> MarkdownOutline {
    let mut outline = MarkdownOutline::default();
    let mut current: Option<Section> = None;
    for line in text.lines() {
        if let Some(captures) = heading_re().captures(line) {
            if let Some(done) = current.take() {
                outline.sections.push(done);
            }
            current = Some(Section {
                title: captures[2].trim().to_string(),
                level: captures[1].len(),
                content: Vec::new(),
            });
            continue;
        }
        match current.as_mut() {
            Some(section) => section.content.push(line.to_string()),
            None => outline.preamble.push(line.to_string()),
        }
    }
    if let Some(done) = current {
        outline.sections.push(done);
    }
    outline
}

/// Copy the project document verbatim into the docs dir and write its section summary.
pub fn extract_project_doc(paths: &ResolvedPaths) -> Result<DocExtractReport> {
    if !paths.project_doc_path.exists() {
        tracing::debug!(path = %paths.project_doc_path.display(), "project document not found");
        return Ok(DocExtractReport {
            exists: false,
            section_count: 0,
        });
    }
    let text = fs::read_to_string(&paths.project_doc_path)
        .with_context(|| format!("failed to read {}", paths.project_doc_path.display()))?;
    let outline = parse_markdown_outline(&text);

    write_output(&paths.docs_dir.join(PROJECT_DOC_OUTPUT), &text)?;
    let summary = OutlineSummary {
        section_count: outline.sections.len(),
        outline: &outline,
    };
    write_output(
        &paths.docs_dir.join(PROJECT_DOC_SUMMARY),
        &serde_json::to_string_pretty(&summary).context("failed to encode document summary")?,
    )?;

    Ok(DocExtractReport {
        exists: true,
        section_count: outline.sections.len(),
    })
}

/// Marker pair first, then the `bundle:`/`agents:`/`workflows:` signature.
pub fn locate_team_block(text: &str) -> Option<(ExtractionSource, String)> {
    let attempts: [(ExtractionSource, fn(&str) -> Option<String>); 2] = [
        (ExtractionSource::Markers, block_between_markers),
        (ExtractionSource::Signature, block_by_signature),
    ];
    attempts
        .iter()
        .find_map(|(source, attempt)| attempt(text).map(|block| (*source, block)))
}

fn block_between_markers(text: &str) -> Option<String> {
    let start = text.find(TEAM_BLOCK_START)?;
    let end = text.find(TEAM_BLOCK_END)?;
    if end <= start {
        return None;
    }
    let block = text[start + TEAM_BLOCK_START.len()..end].trim();
    if block.is_empty() {
        None
    } else {
        Some(block.to_string())
    }
}

fn block_by_signature(text: &str) -> Option<String> {
    team_signature_re()
        .find(text)
        .map(|found| found.as_str().to_string())
}

/// Structured YAML first; line scraping when the block does not parse.
pub fn parse_team_config(block: &str) -> (TeamConfig, ConfigParser) {
    match parse_structured(block) {
        Ok(config) => (config, ConfigParser::Structured),
        Err(error) => {
            tracing::debug!(%error, "team config is not valid YAML; scraping list items");
            (scrape_list_items(block), ConfigParser::LineScrape)
        }
    }
}

fn parse_structured(block: &str) -> Result<TeamConfig> {
    let value: Value = serde_yaml::from_str(block).context("failed to parse team config YAML")?;
    if !value.is_mapping() && !value.is_null() {
        anyhow::bail!("team config YAML is not a mapping");
    }
    let bundle = value.get("bundle");
    let list = |key: &str| {
        value
            .get(key)
            .or_else(|| bundle.and_then(|bundle| bundle.get(key)))
            .and_then(Value::as_sequence)
            .map(|items| items.iter().filter_map(yaml_scalar).collect::<Vec<_>>())
            .unwrap_or_default()
    };
    Ok(TeamConfig {
        agents: list("agents"),
        workflows: list("workflows"),
    })
}

fn yaml_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn scrape_list_items(block: &str) -> TeamConfig {
    let mut config = TeamConfig::default();
    let mut current_key: Option<&str> = None;
    for line in block.lines() {
        let trimmed = line.trim();
        if let Some(item) = trimmed.strip_prefix("- ") {
            let item = item.trim().to_string();
            match current_key {
                Some("agents") => config.agents.push(item),
                Some("workflows") => config.workflows.push(item),
                _ => {}
            }
            continue;
        }
        if let Some((key, _)) = trimmed.split_once(':')
            && !key.contains(' ')
            && !key.is_empty()
        {
            current_key = match key {
                "agents" => Some("agents"),
                "workflows" => Some("workflows"),
                _ => None,
            };
        }
    }
    config
}

/// Pull the team block out of the text dump, save it raw, and write the parsed summary.
pub fn extract_team_config(paths: &ResolvedPaths) -> Result<TeamConfigReport> {
    if !paths.team_dump_path.exists() {
        tracing::debug!(path = %paths.team_dump_path.display(), "team dump not found");
        return Ok(TeamConfigReport::not_extracted(false));
    }
    let text = fs::read_to_string(&paths.team_dump_path)
        .with_context(|| format!("failed to read {}", paths.team_dump_path.display()))?;
    let Some((source, block)) = locate_team_block(&text) else {
        tracing::warn!(
            path = %paths.team_dump_path.display(),
            "no team configuration block found"
        );
        return Ok(TeamConfigReport::not_extracted(true));
    };

    write_output(&paths.config_dir.join(TEAM_CONFIG_OUTPUT), &block)?;
    let (config, parser) = parse_team_config(&block);
    let summary = TeamConfigSummary {
        config: &config,
        parser,
    };
    write_output(
        &paths.config_dir.join(TEAM_CONFIG_SUMMARY),
        &serde_json::to_string_pretty(&summary).context("failed to encode team summary")?,
    )?;

    Ok(TeamConfigReport {
        exists: true,
        extracted: true,
        source: Some(source),
        parser: Some(parser),
        agent_count: config.agents.len(),
        workflow_count: config.workflows.len(),
    })
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}
