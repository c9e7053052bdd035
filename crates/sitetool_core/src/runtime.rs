use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{PathsSection, SiteConfig, load_config};

pub const STATE_DIR_NAME: &str = ".sitetool";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub executable_dir: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        let executable_dir = env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf));
        Ok(Self {
            cwd,
            executable_dir,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub site_dir: PathBuf,
    pub covers_dir: PathBuf,
    pub docs_dir: PathBuf,
    pub config_dir: PathBuf,
    pub dist_dir: PathBuf,
    pub project_doc_path: PathBuf,
    pub team_dump_path: PathBuf,
    pub links_text_path: PathBuf,
    pub links_json_path: PathBuf,
    pub discography_json_path: PathBuf,
    pub build_report_path: PathBuf,
    pub release_zip_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

/// Resolved paths plus the configuration they were laid out from.
#[derive(Debug, Clone)]
pub struct SiteRuntime {
    pub paths: ResolvedPaths,
    pub config: SiteConfig,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nconfig_path={} ({})\nsite_dir={}\ncovers_dir={}\ndocs_dir={}\nconfig_dir={}\ndist_dir={}\nproject_doc={}\nteam_dump={}\nlinks_text={}\nlinks_json={}\ndiscography_json={}",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.site_dir),
            normalize_for_display(&self.covers_dir),
            normalize_for_display(&self.docs_dir),
            normalize_for_display(&self.config_dir),
            normalize_for_display(&self.dist_dir),
            normalize_for_display(&self.project_doc_path),
            normalize_for_display(&self.team_dump_path),
            normalize_for_display(&self.links_text_path),
            normalize_for_display(&self.links_json_path),
            normalize_for_display(&self.discography_json_path),
        )
    }

    /// Path of `name` relative to the project root, for display in reports.
    pub fn display_relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.project_root).unwrap_or(path);
        normalize_for_display(relative)
    }
}

/// Resolve the project root and config path, load the config, and lay out every path from it.
pub fn load_runtime(context: &ResolutionContext, overrides: &PathOverrides) -> Result<SiteRuntime> {
    load_runtime_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn load_runtime_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<SiteRuntime>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env)
        .context("failed to resolve project root")?;
    let (config_path, config_source) = resolve_config_path(&project_root, overrides, &lookup_env);
    let config = load_config(&config_path)?;
    let paths = layout_paths(
        project_root,
        root_source,
        config_path,
        config_source,
        &config.paths,
    );
    Ok(SiteRuntime { paths, config })
}

/// Lay out paths for `project_root` using the default config path and the given names.
pub fn resolve_paths(project_root: &Path, layout: &PathsSection) -> ResolvedPaths {
    let state_dir = project_root.join(STATE_DIR_NAME);
    layout_paths(
        project_root.to_path_buf(),
        ValueSource::Flag,
        state_dir.join("config.toml"),
        ValueSource::Default,
        layout,
    )
}

fn layout_paths(
    project_root: PathBuf,
    root_source: ValueSource,
    config_path: PathBuf,
    config_source: ValueSource,
    layout: &PathsSection,
) -> ResolvedPaths {
    let join = |name: &str| absolutize(Path::new(name), &project_root);
    ResolvedPaths {
        state_dir: project_root.join(STATE_DIR_NAME),
        site_dir: join(&layout.site_dir),
        covers_dir: join(&layout.covers_dir),
        docs_dir: join(&layout.docs_dir),
        config_dir: join(&layout.config_dir),
        dist_dir: join(&layout.dist_dir),
        project_doc_path: join(&layout.project_doc),
        team_dump_path: join(&layout.team_dump),
        links_text_path: join(&layout.links_text),
        links_json_path: join(&layout.links_json),
        discography_json_path: join(&layout.discography_json),
        build_report_path: join(&layout.build_report),
        release_zip_path: join(&layout.release_zip),
        project_root,
        config_path,
        root_source,
        config_source,
    }
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> Result<(PathBuf, ValueSource)>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return Ok((absolutize(path, &context.cwd), ValueSource::Flag));
    }

    if let Some(value) = lookup_env("SITETOOL_PROJECT_ROOT")
        && !value.trim().is_empty()
    {
        return Ok((
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        ));
    }

    let root = detect_project_root_heuristic(&context.cwd, context.executable_dir.as_deref());
    Ok(root)
}

fn resolve_config_path<F>(
    project_root: &Path,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.config.as_deref() {
        return (absolutize(path, project_root), ValueSource::Flag);
    }
    if let Some(value) = lookup_env("SITETOOL_CONFIG")
        && !value.trim().is_empty()
    {
        return (
            absolutize(Path::new(value.trim()), project_root),
            ValueSource::Env,
        );
    }
    (
        project_root.join(STATE_DIR_NAME).join("config.toml"),
        ValueSource::Default,
    )
}

fn detect_project_root_heuristic(
    cwd: &Path,
    executable_dir: Option<&Path>,
) -> (PathBuf, ValueSource) {
    let default_site_dir = PathsSection::default().site_dir;
    let mut seen = HashSet::new();
    for candidate in candidate_roots(cwd, executable_dir) {
        let key = normalize_for_display(&candidate);
        if !seen.insert(key) {
            continue;
        }
        if candidate.join(STATE_DIR_NAME).is_dir() || candidate.join(&default_site_dir).is_dir() {
            return (candidate, ValueSource::Heuristic);
        }
    }
    (cwd.to_path_buf(), ValueSource::Default)
}

fn candidate_roots(cwd: &Path, executable_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut out = ancestors(cwd);
    if let Some(exe_dir) = executable_dir {
        out.extend(ancestors(exe_dir));
    }
    out
}

fn ancestors(path: &Path) -> Vec<PathBuf> {
    path.ancestors().map(Path::to_path_buf).collect()
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
