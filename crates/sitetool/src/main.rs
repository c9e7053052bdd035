use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use sitetool_core::build::{BuildOptions, run_build};
use sitetool_core::covers::CoverEntry;
use sitetool_core::discography::build_discography;
use sitetool_core::links::verify_links;
use sitetool_core::resize::resize_covers;
use sitetool_core::runtime::{
    PathOverrides, ResolutionContext, SiteRuntime, load_runtime, normalize_for_display,
};
use sitetool_core::upscale::upscale_covers;

#[derive(Debug, Parser)]
#[command(
    name = "sitetool",
    version,
    about = "Build, package and maintain the MoneyPrinter G fan site"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Only log errors"
    )]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Extract docs/config, check quality, package dist/ and write BUILD_REPORT.md")]
    Build(BuildArgs),
    #[command(about = "Rebuild discography.json from covers and links.json")]
    Discography,
    #[command(about = "Normalize cover art in place")]
    Covers(CoversArgs),
    #[command(about = "Verify the link list and rewrite it with statuses")]
    Links,
    #[command(about = "Print the resolved project layout")]
    Paths,
}

#[derive(Debug, Args)]
struct BuildArgs {
    #[arg(long, help = "Also write release.zip from dist/")]
    release: bool,
}

#[derive(Debug, Args)]
struct CoversArgs {
    #[command(subcommand)]
    command: CoversSubcommand,
}

#[derive(Debug, Subcommand)]
enum CoversSubcommand {
    #[command(about = "Upscale top-level covers below the minimum size and resave all of them")]
    Upscale,
    #[command(about = "Resize every cover to the exact target size")]
    Resize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Build(args)) => run_build_command(&runtime, args),
        Some(Commands::Discography) => run_discography(&runtime),
        Some(Commands::Covers(CoversArgs { command })) => match command {
            CoversSubcommand::Upscale => run_covers_upscale(&runtime),
            CoversSubcommand::Resize => run_covers_resize(&runtime),
        },
        Some(Commands::Links) => run_links(&runtime),
        Some(Commands::Paths) => run_paths(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("SITETOOL_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn run_build_command(runtime: &RuntimeOptions, args: BuildArgs) -> Result<()> {
    let site = resolve_runtime(runtime)?;
    let paths = &site.paths;
    let summary = run_build(
        paths,
        &site.config,
        BuildOptions {
            release: args.release,
        },
    )?;

    println!("build");
    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("project_doc.exists: {}", format_flag(summary.doc.exists));
    println!("project_doc.sections: {}", summary.doc.section_count);
    println!("team_config.exists: {}", format_flag(summary.team.exists));
    println!("team_config.extracted: {}", format_flag(summary.team.extracted));
    if let Some(parser) = summary.team.parser {
        println!("team_config.parser: {}", parser.as_str());
    }
    println!("team_config.agents: {}", summary.team.agent_count);
    println!("team_config.workflows: {}", summary.team.workflow_count);
    println!("issues.count: {}", summary.issues.len());
    for issue in &summary.issues {
        println!("issues.item: {issue}");
    }
    println!("dist_dir: {}", normalize_for_display(&summary.dist.dist_dir));
    println!("dist.files: {}", summary.dist.manifest.file_count());
    println!("dist.bytes: {}", summary.dist.manifest.total_bytes);
    println!("dist.digest: {}", summary.dist.manifest.digest);
    for skipped in &summary.dist.skipped {
        println!("dist.skipped: {skipped}");
    }
    println!(
        "integrity.site_entry: {}",
        format_flag(summary.integrity.site_entry)
    );
    println!(
        "integrity.docs_packaged: {}",
        format_flag(summary.integrity.docs_packaged)
    );
    println!(
        "integrity.team_config_packaged: {}",
        format_flag(summary.integrity.team_config_packaged)
    );
    println!("report: {}", normalize_for_display(&summary.report_path));
    match &summary.release {
        Some(release) => {
            println!("release: {}", normalize_for_display(&release.zip_path));
            println!("release.entries: {}", release.entry_count);
            println!("release.bytes: {}", release.bytes);
        }
        None => println!("release: <skipped> (pass --release to write release.zip)"),
    }
    print_diagnostics(runtime, &site);
    Ok(())
}

fn run_discography(runtime: &RuntimeOptions) -> Result<()> {
    let site = resolve_runtime(runtime)?;
    let report = build_discography(&site.paths, &site.config)?;

    println!("discography");
    println!("output: {}", normalize_for_display(&report.output_path));
    println!("tracks: {}", report.tracks.len());
    println!("tracks.matched: {}", report.matched_count());
    println!("tracks.dated: {}", report.dated_count());
    println!("http.requests: {}", report.request_count);
    print_diagnostics(runtime, &site);
    Ok(())
}

fn run_covers_upscale(runtime: &RuntimeOptions) -> Result<()> {
    let site = resolve_runtime(runtime)?;
    let report = upscale_covers(&site.paths, &site.config)?;

    println!("covers upscale");
    println!("covers_dir: {}", normalize_for_display(&site.paths.covers_dir));
    println!("min_size: {}", report.min_size);
    print_cover_entries(&report.covers);
    println!("summary.total: {}", report.summary.total);
    println!("summary.passed: {}", report.summary.passed);
    println!("summary.failed: {}", report.summary.failed);
    println!("report: {}", normalize_for_display(&report.report_path));
    print_diagnostics(runtime, &site);
    Ok(())
}

fn run_covers_resize(runtime: &RuntimeOptions) -> Result<()> {
    let site = resolve_runtime(runtime)?;
    let report = resize_covers(&site.paths, &site.config)?;

    println!("covers resize");
    println!("covers_dir: {}", normalize_for_display(&site.paths.covers_dir));
    println!(
        "target: {}x{} ({})",
        report.target.width,
        report.target.height,
        if report.target.maintain_aspect {
            "cover-fit"
        } else {
            "stretch"
        }
    );
    println!("output_format: {}", report.target.output_format);
    print_cover_entries(&report.results);
    println!("summary.total: {}", report.summary.total);
    println!("summary.passed: {}", report.summary.passed);
    println!("summary.failed: {}", report.summary.failed);
    println!("report: {}", normalize_for_display(&report.report_path));
    print_diagnostics(runtime, &site);
    Ok(())
}

fn print_cover_entries(entries: &[CoverEntry]) {
    for entry in entries {
        let dims = |value: Option<sitetool_core::covers::Dimensions>| match value {
            Some(value) => format!("{}x{}", value.width, value.height),
            None => "?".to_string(),
        };
        println!(
            "cover: {} {} -> {} valid={}",
            entry.file,
            dims(entry.before),
            dims(entry.after),
            format_flag(entry.validation_passed)
        );
        for issue in &entry.issues {
            println!("cover.issue: {}: {issue}", entry.file);
        }
    }
}

fn run_links(runtime: &RuntimeOptions) -> Result<()> {
    let site = resolve_runtime(runtime)?;
    let report = verify_links(&site.paths, &site.config)?;
    let failed = report.failed().collect::<Vec<_>>();

    println!("links");
    println!("links_text: {}", normalize_for_display(&report.text_path));
    println!("links_json: {}", normalize_for_display(&report.json_path));
    println!("links.total: {}", report.records.len());
    println!("links.ok: {}", report.ok_count());
    println!("links.failed: {}", failed.len());
    for record in failed {
        println!(
            "links.failed.item: {} => {}{}",
            record.title,
            record.status_label(),
            record
                .error
                .as_deref()
                .map(|error| format!(" {error}"))
                .unwrap_or_default()
        );
    }
    print_diagnostics(runtime, &site);
    Ok(())
}

fn run_paths(runtime: &RuntimeOptions) -> Result<()> {
    let site = resolve_runtime(runtime)?;
    let paths = &site.paths;

    println!("paths");
    println!(
        "project_root: {} ({})",
        normalize_for_display(&paths.project_root),
        paths.root_source.as_str()
    );
    println!(
        "config: {} ({}, exists: {})",
        normalize_for_display(&paths.config_path),
        paths.config_source.as_str(),
        format_flag(paths.config_path.is_file())
    );
    for (label, path) in [
        ("site_dir", &paths.site_dir),
        ("covers_dir", &paths.covers_dir),
        ("docs_dir", &paths.docs_dir),
        ("config_dir", &paths.config_dir),
        ("dist_dir", &paths.dist_dir),
        ("project_doc", &paths.project_doc_path),
        ("team_dump", &paths.team_dump_path),
        ("links_text", &paths.links_text_path),
        ("links_json", &paths.links_json_path),
        ("discography_json", &paths.discography_json_path),
        ("build_report", &paths.build_report_path),
        ("release_zip", &paths.release_zip_path),
    ] {
        println!(
            "{label}: {} (exists: {})",
            normalize_for_display(path),
            format_flag(path.exists())
        );
    }
    print_diagnostics(runtime, &site);
    Ok(())
}

fn print_diagnostics(runtime: &RuntimeOptions, site: &SiteRuntime) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", site.paths.diagnostics());
    }
}

fn resolve_runtime(runtime: &RuntimeOptions) -> Result<SiteRuntime> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = load_runtime(&context, &overrides)?;
    let project_env = initial.paths.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
        return load_runtime(&context, &overrides);
    }
    Ok(initial)
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
