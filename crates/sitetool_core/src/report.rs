use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::dist::{DIST_CONFIG_DIR, DIST_DOCS_DIR, DIST_SITE_DIR, DistManifest};
use crate::extract::{PROJECT_DOC_OUTPUT, TEAM_CONFIG_OUTPUT, TeamConfigReport};
use crate::runtime::ResolvedPaths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactIntegrity {
    pub site_entry: bool,
    pub docs_packaged: bool,
    pub team_config_packaged: bool,
    pub file_count: usize,
    pub digest: String,
}

impl ArtifactIntegrity {
    /// Inspect the packaged dist tree for the three artifacts the site cannot ship without.
    pub fn inspect(paths: &ResolvedPaths, manifest: &DistManifest) -> Self {
        let dist = &paths.dist_dir;
        Self {
            site_entry: dist.join(DIST_SITE_DIR).join("index.html").is_file(),
            docs_packaged: dist.join(DIST_DOCS_DIR).join(PROJECT_DOC_OUTPUT).is_file(),
            team_config_packaged: dist.join(DIST_CONFIG_DIR).join(TEAM_CONFIG_OUTPUT).is_file(),
            file_count: manifest.file_count(),
            digest: manifest.digest.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildReportInput {
    pub project_root: String,
    pub main_dirs: Vec<String>,
    pub team: TeamConfigReport,
    pub issues: Vec<String>,
    pub integrity: ArtifactIntegrity,
    pub release_zip: Option<String>,
}

pub fn render_build_report(input: &BuildReportInput) -> String {
    let mut lines = vec![
        "# Build Report".to_string(),
        String::new(),
        "## Project layout".to_string(),
        String::new(),
        format!("- Root: {}", input.project_root),
        format!("- Main directories: {}", input.main_dirs.join(", ")),
        String::new(),
        "## Team configuration".to_string(),
        String::new(),
        format!("- Agents extracted: {}", input.team.agent_count),
        format!("- Workflows extracted: {}", input.team.workflow_count),
    ];
    if let Some(parser) = input.team.parser {
        lines.push(format!("- Parser: {}", parser.as_str()));
    } else if !input.team.exists {
        lines.push("- Team dump not found".to_string());
    } else if !input.team.extracted {
        lines.push("- No configuration block found".to_string());
    }

    lines.push(String::new());
    lines.push("## Issues found during the build".to_string());
    lines.push(String::new());
    if input.issues.is_empty() {
        lines.push("- No blocking issues".to_string());
    } else {
        lines.extend(input.issues.iter().map(|issue| format!("- {issue}")));
    }

    let integrity = &input.integrity;
    lines.push(String::new());
    lines.push("## Artifact integrity".to_string());
    lines.push(String::new());
    lines.push(format!("- Site entry present: {}", yes_no(integrity.site_entry)));
    lines.push(format!("- Docs packaged: {}", yes_no(integrity.docs_packaged)));
    lines.push(format!(
        "- Team config packaged: {}",
        yes_no(integrity.team_config_packaged)
    ));
    lines.push(format!("- Dist files: {}", integrity.file_count));
    lines.push(format!("- Dist digest: `{}`", integrity.digest));
    if let Some(release) = &input.release_zip {
        lines.push(format!("- Release archive: {release}"));
    }
    lines.push(String::new());
    lines.join("\n")
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

pub fn write_build_report(paths: &ResolvedPaths, input: &BuildReportInput) -> Result<PathBuf> {
    let path = &paths.build_report_path;
    fs::write(path, render_build_report(input))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path.clone())
}
