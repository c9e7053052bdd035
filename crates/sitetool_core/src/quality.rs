use std::fs;
use std::path::Path;

use crate::config::SiteConfig;
use crate::covers::is_cover_image;
use crate::runtime::ResolvedPaths;

/// Read-only checks over the site tree. An empty list means no issues.
pub fn quality_checks(paths: &ResolvedPaths, config: &SiteConfig) -> Vec<String> {
    let mut issues = Vec::new();

    for name in &config.build.required_site_files {
        if !paths.site_dir.join(name).exists() {
            issues.push(format!("missing site file: {name}"));
        }
    }

    for name in &config.build.data_files {
        let path = paths.project_root.join(name);
        if !path.exists() {
            issues.push(format!("missing data file: {name}"));
            continue;
        }
        if let Err(reason) = validate_json_file(&path) {
            issues.push(format!("invalid JSON in {name}: {reason}"));
        }
    }

    let covers_label = format!("{}/", paths.display_relative(&paths.covers_dir));
    if !paths.covers_dir.is_dir() {
        issues.push(format!("missing covers directory: {covers_label}"));
    } else if !has_cover_image(&paths.covers_dir) {
        issues.push(format!("no image files found in {covers_label}"));
    }

    issues
}

fn validate_json_file(path: &Path) -> Result<(), String> {
    let content = fs::read_to_string(path).map_err(|error| error.to_string())?;
    serde_json::from_str::<serde_json::Value>(&content)
        .map(|_| ())
        .map_err(|error| error.to_string())
}

fn has_cover_image(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries
        .filter_map(|entry| entry.ok())
        .any(|entry| is_cover_image(&entry.path()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use crate::config::{PathsSection, SiteConfig};
    use crate::runtime::resolve_paths;

    use super::quality_checks;

    #[test]
    fn empty_project_reports_every_missing_input_in_order() {
        let temp = tempdir().expect("tempdir");
        let paths = resolve_paths(temp.path(), &PathsSection::default());

        let issues = quality_checks(&paths, &SiteConfig::default());
        assert_eq!(issues.len(), 5 + 3 + 1);
        assert_eq!(issues[0], "missing site file: index.html");
        assert_eq!(issues[5], "missing data file: discography.json");
        assert_eq!(issues[8], "missing covers directory: covers/");
    }

    #[test]
    fn complete_project_has_no_issues() {
        let temp = tempdir().expect("tempdir");
        let config = SiteConfig::default();
        let paths = resolve_paths(temp.path(), &config.paths);
        fs::create_dir_all(&paths.site_dir).expect("site dir");
        for name in &config.build.required_site_files {
            fs::write(paths.site_dir.join(name), "ok").expect("site file");
        }
        for name in &config.build.data_files {
            fs::write(paths.project_root.join(name), "{\"items\": []}").expect("data file");
        }
        fs::create_dir_all(&paths.covers_dir).expect("covers");
        fs::write(paths.covers_dir.join("Song.PNG"), b"png").expect("cover");

        assert!(quality_checks(&paths, &config).is_empty());
    }

    #[test]
    fn invalid_json_and_imageless_covers_become_issues() {
        let temp = tempdir().expect("tempdir");
        let mut config = SiteConfig::default();
        config.build.required_site_files.clear();
        config.build.data_files = vec!["events.json".to_string()];
        let paths = resolve_paths(temp.path(), &config.paths);
        fs::write(paths.project_root.join("events.json"), "{\"events\": [").expect("events");
        fs::create_dir_all(&paths.covers_dir).expect("covers");
        fs::write(paths.covers_dir.join("notes.txt"), "not an image").expect("notes");

        let issues = quality_checks(&paths, &config);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].starts_with("invalid JSON in events.json:"));
        assert_eq!(issues[1], "no image files found in covers/");
    }
}
