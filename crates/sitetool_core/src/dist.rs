use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::config::SiteConfig;
use crate::runtime::{ResolvedPaths, normalize_for_display};

pub const DIST_SITE_DIR: &str = "site";
pub const DIST_COVERS_DIR: &str = "covers";
pub const DIST_DOCS_DIR: &str = "docs";
pub const DIST_CONFIG_DIR: &str = "config";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistManifest {
    pub entries: Vec<ManifestEntry>,
    pub total_bytes: u64,
    pub digest: String,
}

impl DistManifest {
    pub fn file_count(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone)]
pub struct DistReport {
    pub dist_dir: PathBuf,
    pub copied: Vec<String>,
    pub skipped: Vec<String>,
    pub manifest: DistManifest,
}

#[derive(Debug, Clone)]
pub struct ReleaseReport {
    pub zip_path: PathBuf,
    pub entry_count: usize,
    pub bytes: u64,
}

/// Rebuild the dist tree from scratch: site, covers, data files, docs and config.
pub fn copy_to_dist(paths: &ResolvedPaths, config: &SiteConfig) -> Result<DistReport> {
    let dist = &paths.dist_dir;
    clear_dir(dist)?;
    fs::create_dir_all(dist).with_context(|| format!("failed to create {}", dist.display()))?;

    let site_out = dist.join(DIST_SITE_DIR);
    let mut copied = Vec::new();
    let mut skipped = Vec::new();

    let trees = [
        (&paths.site_dir, site_out.clone()),
        (&paths.covers_dir, site_out.join(DIST_COVERS_DIR)),
        (&paths.docs_dir, dist.join(DIST_DOCS_DIR)),
        (&paths.config_dir, dist.join(DIST_CONFIG_DIR)),
    ];
    for (source, destination) in trees {
        let label = paths.display_relative(source);
        if source.is_dir() {
            copy_tree(source, &destination)?;
            copied.push(label);
        } else {
            tracing::debug!(source = %label, "dist source missing; skipped");
            skipped.push(label);
        }
    }

    for name in &config.build.data_files {
        let source = paths.project_root.join(name);
        if source.is_file() {
            fs::create_dir_all(&site_out)
                .with_context(|| format!("failed to create {}", site_out.display()))?;
            copy_file(&source, &site_out.join(name))?;
            copied.push(name.clone());
        } else {
            tracing::debug!(source = %name, "dist data file missing; skipped");
            skipped.push(name.clone());
        }
    }

    let manifest = dist_manifest(dist)?;
    Ok(DistReport {
        dist_dir: dist.clone(),
        copied,
        skipped,
        manifest,
    })
}

fn clear_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        } else {
            fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

/// Recursive copy that merges into `destination`, overwriting files of the same name.
fn copy_tree(source: &Path, destination: &Path) -> Result<()> {
    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("failed to relativize {}", entry.path().display()))?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::copy(source, target).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })?;
    Ok(())
}

/// Files under `dir` in sorted order with per-file SHA-256 and an aggregate digest.
pub fn dist_manifest(dir: &Path) -> Result<DistManifest> {
    let mut entries = Vec::new();
    let mut aggregate = Sha256::new();
    let mut total_bytes = 0u64;

    for (relative, path) in sorted_files(dir)? {
        let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let sha256 = hex_digest(&Sha256::digest(&bytes));
        aggregate.update(relative.as_bytes());
        aggregate.update([0u8]);
        aggregate.update(sha256.as_bytes());
        aggregate.update([b'\n']);
        total_bytes += bytes.len() as u64;
        entries.push(ManifestEntry {
            path: relative,
            bytes: bytes.len() as u64,
            sha256,
        });
    }

    Ok(DistManifest {
        entries,
        total_bytes,
        digest: hex_digest(&aggregate.finalize()),
    })
}

fn sorted_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("failed to relativize {}", entry.path().display()))?;
        files.push((normalize_for_display(relative), entry.into_path()));
    }
    files.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(files)
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// Replace `release.zip` with a deflate archive of the dist tree.
pub fn zip_release(paths: &ResolvedPaths) -> Result<ReleaseReport> {
    let zip_path = &paths.release_zip_path;
    if zip_path.exists() {
        fs::remove_file(zip_path)
            .with_context(|| format!("failed to remove {}", zip_path.display()))?;
    }

    let file = File::create(zip_path)
        .with_context(|| format!("failed to create {}", zip_path.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let files = sorted_files(&paths.dist_dir)?;
    for (relative, path) in &files {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        writer
            .start_file(relative.as_str(), options)
            .with_context(|| format!("failed to add {relative} to {}", zip_path.display()))?;
        writer
            .write_all(&bytes)
            .with_context(|| format!("failed to write {relative} to {}", zip_path.display()))?;
    }
    writer
        .finish()
        .with_context(|| format!("failed to finish {}", zip_path.display()))?;

    let bytes = fs::metadata(zip_path)
        .with_context(|| format!("failed to stat {}", zip_path.display()))?
        .len();
    Ok(ReleaseReport {
        zip_path: zip_path.clone(),
        entry_count: files.len(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::Read;

    use tempfile::tempdir;

    use crate::config::SiteConfig;
    use crate::runtime::{ResolvedPaths, resolve_paths};

    use super::{copy_to_dist, dist_manifest, zip_release};

    fn seed_project(root: &std::path::Path, config: &SiteConfig) -> ResolvedPaths {
        let paths = resolve_paths(root, &config.paths);
        fs::create_dir_all(paths.site_dir.join("assets")).expect("site");
        fs::write(paths.site_dir.join("index.html"), "<h1>hi</h1>").expect("index");
        fs::write(paths.site_dir.join("assets").join("app.css"), "body{}").expect("css");
        fs::create_dir_all(&paths.covers_dir).expect("covers");
        fs::write(paths.covers_dir.join("song.png"), b"png").expect("cover");
        fs::create_dir_all(&paths.docs_dir).expect("docs");
        fs::write(paths.docs_dir.join("ProjectDocumentation.md"), "# Doc").expect("doc");
        fs::write(paths.project_root.join("links.json"), "{\"links\": []}").expect("links");
        paths
    }

    #[test]
    fn copy_lays_out_dist_and_records_skips() {
        let temp = tempdir().expect("tempdir");
        let config = SiteConfig::default();
        let paths = seed_project(temp.path(), &config);
        fs::create_dir_all(paths.dist_dir.join("stale")).expect("stale dir");
        fs::write(paths.dist_dir.join("stale").join("old.txt"), "old").expect("stale file");

        let report = copy_to_dist(&paths, &config).expect("copy");
        let dist = &paths.dist_dir;
        assert!(dist.join("site/index.html").is_file());
        assert!(dist.join("site/assets/app.css").is_file());
        assert!(dist.join("site/covers/song.png").is_file());
        assert!(dist.join("site/links.json").is_file());
        assert!(dist.join("docs/ProjectDocumentation.md").is_file());
        assert!(!dist.join("stale").exists());

        assert_eq!(
            report.skipped,
            vec!["config", "discography.json", "events.json"]
        );
        assert_eq!(report.manifest.file_count(), 5);
        assert_eq!(report.manifest.entries[0].path, "docs/ProjectDocumentation.md");
    }

    #[test]
    fn repeated_copies_produce_identical_manifests() {
        let temp = tempdir().expect("tempdir");
        let config = SiteConfig::default();
        let paths = seed_project(temp.path(), &config);

        let first = copy_to_dist(&paths, &config).expect("first");
        let second = copy_to_dist(&paths, &config).expect("second");
        assert_eq!(first.manifest, second.manifest);
        assert_eq!(first.manifest.digest.len(), 64);

        fs::write(paths.site_dir.join("index.html"), "<h1>changed</h1>").expect("edit");
        let third = copy_to_dist(&paths, &config).expect("third");
        assert_ne!(first.manifest.digest, third.manifest.digest);
    }

    #[test]
    fn manifest_of_missing_dir_is_empty() {
        let temp = tempdir().expect("tempdir");
        let manifest = dist_manifest(&temp.path().join("absent")).expect("manifest");
        assert_eq!(manifest.file_count(), 0);
        assert_eq!(manifest.total_bytes, 0);
    }

    #[test]
    fn release_zip_contains_sorted_dist_files_and_is_reproducible() {
        let temp = tempdir().expect("tempdir");
        let config = SiteConfig::default();
        let paths = seed_project(temp.path(), &config);
        copy_to_dist(&paths, &config).expect("copy");

        let release = zip_release(&paths).expect("zip");
        assert_eq!(release.entry_count, 5);
        let first_bytes = fs::read(&release.zip_path).expect("zip bytes");

        let zip_file = File::open(&release.zip_path).expect("open zip");
        let mut archive = zip::ZipArchive::new(zip_file).expect("archive");
        let names = (0..archive.len())
            .map(|index| archive.by_index(index).expect("entry").name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "docs/ProjectDocumentation.md",
                "site/assets/app.css",
                "site/covers/song.png",
                "site/index.html",
                "site/links.json",
            ]
        );
        let mut index = String::new();
        archive
            .by_name("site/index.html")
            .expect("index entry")
            .read_to_string(&mut index)
            .expect("read index");
        assert_eq!(index, "<h1>hi</h1>");

        zip_release(&paths).expect("second zip");
        assert_eq!(fs::read(&release.zip_path).expect("zip bytes"), first_bytes);
    }
}
