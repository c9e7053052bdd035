use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::SiteConfig;
use crate::dist::{DistReport, ReleaseReport, copy_to_dist, zip_release};
use crate::extract::{DocExtractReport, TeamConfigReport, extract_project_doc, extract_team_config};
use crate::quality::quality_checks;
use crate::report::{ArtifactIntegrity, BuildReportInput, write_build_report};
use crate::runtime::{ResolvedPaths, normalize_for_display};

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub release: bool,
}

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub doc: DocExtractReport,
    pub team: TeamConfigReport,
    pub issues: Vec<String>,
    pub dist: DistReport,
    pub integrity: ArtifactIntegrity,
    pub report_path: PathBuf,
    pub release: Option<ReleaseReport>,
}

/// Extract, check, package, zip when `options.release` is set, then report.
pub fn run_build(
    paths: &ResolvedPaths,
    config: &SiteConfig,
    options: BuildOptions,
) -> Result<BuildSummary> {
    for dir in [&paths.docs_dir, &paths.config_dir, &paths.dist_dir] {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let doc = extract_project_doc(paths)?;
    let team = extract_team_config(paths)?;
    let issues = quality_checks(paths, config);
    for issue in &issues {
        tracing::warn!(issue = %issue, "build quality issue");
    }
    let dist = copy_to_dist(paths, config)?;
    let integrity = ArtifactIntegrity::inspect(paths, &dist.manifest);

    let release = if options.release {
        Some(zip_release(paths)?)
    } else {
        None
    };
    let release_label = release
        .as_ref()
        .map(|release| paths.display_relative(&release.zip_path));
    let report_path = write_build_report(
        paths,
        &BuildReportInput {
            project_root: normalize_for_display(&paths.project_root),
            main_dirs: main_dirs(paths),
            team: team.clone(),
            issues: issues.clone(),
            integrity: integrity.clone(),
            release_zip: release_label,
        },
    )?;

    Ok(BuildSummary {
        doc,
        team,
        issues,
        dist,
        integrity,
        report_path,
        release,
    })
}

fn main_dirs(paths: &ResolvedPaths) -> Vec<String> {
    [&paths.docs_dir, &paths.config_dir, &paths.site_dir, &paths.dist_dir]
        .into_iter()
        .map(|dir| format!("{}/", paths.display_relative(dir)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use crate::config::SiteConfig;
    use crate::extract::{TEAM_BLOCK_END, TEAM_BLOCK_START};
    use crate::runtime::resolve_paths;

    use super::{BuildOptions, run_build};

    #[test]
    fn empty_project_still_builds_with_issues() {
        let temp = tempdir().expect("tempdir");
        let config = SiteConfig::default();
        let paths = resolve_paths(temp.path(), &config.paths);

        let summary = run_build(&paths, &config, BuildOptions::default()).expect("build");
        assert!(!summary.doc.exists);
        assert!(!summary.team.exists);
        assert!(!summary.issues.is_empty());
        assert!(!summary.integrity.site_entry);
        assert!(summary.release.is_none());
        assert!(paths.docs_dir.is_dir());
        assert!(paths.config_dir.is_dir());
        let report = fs::read_to_string(&summary.report_path).expect("report");
        assert!(report.contains("- missing site file: index.html"));
    }

    #[test]
    fn failed_release_zip_leaves_no_report_claiming_it() {
        let temp = tempdir().expect("tempdir");
        let config = SiteConfig::default();
        let paths = resolve_paths(temp.path(), &config.paths);
        fs::create_dir_all(paths.release_zip_path.join("blocker")).expect("blocking dir");

        let error = run_build(&paths, &config, BuildOptions { release: true })
            .expect_err("zip over a directory");
        assert!(format!("{error:#}").contains("release.zip"));
        let report = fs::read_to_string(&paths.build_report_path).unwrap_or_default();
        assert!(!report.contains("Release archive"));
    }

    #[test]
    fn full_project_release_build_packages_everything() {
        let temp = tempdir().expect("tempdir");
        let config = SiteConfig::default();
        let paths = resolve_paths(temp.path(), &config.paths);

        fs::create_dir_all(&paths.site_dir).expect("site");
        for name in &config.build.required_site_files {
            fs::write(paths.site_dir.join(name), "ok").expect("site file");
        }
        for name in &config.build.data_files {
            fs::write(paths.project_root.join(name), "{}").expect("data file");
        }
        fs::create_dir_all(&paths.covers_dir).expect("covers");
        fs::write(paths.covers_dir.join("song.png"), b"png").expect("cover");
        fs::write(&paths.project_doc_path, "# Title\nbody\n## Part\nmore\n").expect("doc");
        fs::write(
            &paths.team_dump_path,
            format!(
                "preface\n{TEAM_BLOCK_START}\nbundle:\n  name: Team\nagents:\n  - analyst\n  - dev\nworkflows:\n  - greenfield.yaml\n{TEAM_BLOCK_END}\ntrailer\n"
            ),
        )
        .expect("team dump");

        let summary = run_build(&paths, &config, BuildOptions { release: true }).expect("build");
        assert_eq!(summary.doc.section_count, 2);
        assert_eq!(summary.team.agent_count, 2);
        assert_eq!(summary.team.workflow_count, 1);
        assert!(summary.issues.is_empty(), "issues: {:?}", summary.issues);
        assert!(summary.integrity.site_entry);
        assert!(summary.integrity.docs_packaged);
        assert!(summary.integrity.team_config_packaged);
        assert!(summary.dist.skipped.is_empty());

        let release = summary.release.expect("release");
        assert!(release.zip_path.is_file());
        assert_eq!(release.entry_count, summary.dist.manifest.file_count());

        let report = fs::read_to_string(&summary.report_path).expect("report");
        assert!(report.contains("- No blocking issues"));
        assert!(report.contains("- Release archive: release.zip"));
        assert!(report.contains("- Main directories: docs/, config/, Moneyprinterg/, dist/"));
    }
}
