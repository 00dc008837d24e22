use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use appdir_core::catalog::load_catalog;
use appdir_core::config::{DirectoryConfig, load_config};
use appdir_core::manifest::decode_manifest;
use appdir_core::pipeline::{InjectReport, UpdateOptions, UpdateReport, run_inject, run_update};
use appdir_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, normalize_for_display, resolve_paths,
};
use appdir_core::site::SiteReport;
use appdir_core::view::CatalogView;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(
    name = "appdir",
    version,
    about = "Build the mini-app directory catalog from the upstream app repository"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
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
    #[command(about = "Refresh the catalog from upstream and re-render the site")]
    Update(UpdateArgs),
    #[command(about = "Re-render the site document from the persisted catalog")]
    Inject(InjectArgs),
    #[command(about = "List catalog apps the way the directory page shows them")]
    Browse(BrowseArgs),
    #[command(about = "Parse a local manifest file and print its fields")]
    Manifest(ManifestArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[arg(long, help = "Compute changes and print diffs without writing")]
    dry_run: bool,
    #[arg(long, help = "Only refresh the catalog; leave the HTML document alone")]
    skip_site: bool,
    #[arg(long, value_name = "N", help = "Concurrent manifest fetches")]
    workers: Option<usize>,
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct InjectArgs {
    #[arg(long, help = "Print the HTML diff without writing")]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct BrowseArgs {
    #[arg(short = 'c', long, value_name = "NAME", help = "Filter by category")]
    category: Option<String>,
    #[arg(short = 's', long, value_name = "TERM", help = "Search name, description and publisher")]
    search: Option<String>,
    #[arg(long, value_name = "N", default_value_t = 1, help = "Number of pages to reveal")]
    pages: usize,
    #[arg(long, value_name = "ID", help = "Show a single app regardless of filters")]
    app: Option<String>,
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct ManifestArgs {
    #[arg(value_name = "FILE")]
    path: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Update(args)) => run_update_command(&runtime, args),
        Some(Commands::Inject(args)) => run_inject_command(&runtime, args),
        Some(Commands::Browse(args)) => run_browse(&runtime, args),
        Some(Commands::Manifest(args)) => run_manifest(args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_update_command(runtime: &RuntimeOptions, args: UpdateArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    init_tracing();

    let options = UpdateOptions {
        dry_run: args.dry_run,
        skip_site: args.skip_site,
        workers: args.workers,
    };
    let diagnostics = runtime.diagnostics.then(|| paths.diagnostics(&config));
    let report = match run_update(&paths, &config, &options) {
        Ok(report) => report,
        Err(error) => {
            print!("{}", render_failure("update", &error, diagnostics.as_deref()));
            return Err(error.context("catalog update aborted"));
        }
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_update_report(&report),
    }
    print_diagnostics(diagnostics.as_deref());
    Ok(())
}

fn render_failure(command: &str, error: &anyhow::Error, diagnostics: Option<&str>) -> String {
    let mut out = format!("{command} failed\nreason: {error:#}\n");
    if let Some(diagnostics) = diagnostics {
        out.push_str(&format!("\n[diagnostics]\n{diagnostics}\n"));
    }
    out
}

fn print_diagnostics(diagnostics: Option<&str>) {
    if let Some(diagnostics) = diagnostics {
        println!("\n[diagnostics]\n{diagnostics}");
    }
}

fn print_update_report(report: &UpdateReport) {
    println!("catalog update{}", if report.dry_run { " (dry run)" } else { "" });
    println!("discovered: {}", report.discovered);
    println!("processed: {}", report.processed);
    println!("skipped: {}", report.skipped.len());
    for skipped in &report.skipped {
        println!("  - {}: {}", skipped.id, skipped.reason);
    }
    println!("featured: {}", report.featured);
    println!("icon_fallbacks: {}", report.icon_fallbacks.len());
    for id in &report.icon_fallbacks {
        println!("  - {id}");
    }
    println!("catalog: {}", normalize_for_display(&report.catalog.path));
    println!("catalog_changed: {}", format_flag(report.catalog.changed));
    if let Some(diff) = &report.catalog.diff {
        print!("{diff}");
    }
    match &report.site {
        Some(site) => print_site_report(site),
        None => println!("site: skipped"),
    }
    println!("request_count: {}", report.request_count);
    print_warnings(&report.warnings);
}

fn run_inject_command(runtime: &RuntimeOptions, args: InjectArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    init_tracing();

    let diagnostics = runtime.diagnostics.then(|| paths.diagnostics(&config));
    let report: InjectReport = match run_inject(&paths, &config, args.dry_run) {
        Ok(report) => report,
        Err(error) => {
            print!("{}", render_failure("inject", &error, diagnostics.as_deref()));
            return Err(error.context("site injection aborted"));
        }
    };
    println!("site injection{}", if args.dry_run { " (dry run)" } else { "" });
    println!("apps: {}", report.apps);
    println!("featured: {}", report.featured);
    print_site_report(&report.site);
    print_warnings(&report.site.warnings);
    print_diagnostics(diagnostics.as_deref());
    Ok(())
}

fn print_site_report(site: &SiteReport) {
    println!("site: {}", normalize_for_display(&site.path));
    println!("site_changed: {}", format_flag(site.changed));
    println!("data_embedded: {}", format_flag(site.data_embedded));
    match site.featured_rendered {
        Some(count) => println!("featured_rendered: {count}"),
        None => println!("featured_rendered: <none>"),
    }
    if let Some(diff) = &site.diff {
        print!("{diff}");
    }
}

fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!("warnings:");
    for warning in warnings {
        println!("  - {warning}");
    }
}

fn run_browse(runtime: &RuntimeOptions, args: BrowseArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let catalog = load_catalog(&paths.catalog_path(&config), &config.default_categories())?;
    let mut view = CatalogView::from_config(&catalog, &config);

    if let Some(id) = args.app.as_deref() {
        let app = view
            .find(id)
            .with_context(|| format!("app `{id}` is not in the catalog"))?;
        match args.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(app)?),
            OutputFormat::Text => {
                println!("id: {}", app.id);
                println!("name: {}", app.name);
                println!("publisher: {}", app.publisher);
                println!("version: {}", app.version);
                println!("category: {}", app.category);
                println!("featured: {}", format_flag(app.featured));
                println!("description: {}", app.description);
                println!("icon: {}", app.icon);
                println!("spixi_url: {}", app.spixi_url);
                println!("github: {}", app.github);
                if let Some(website) = &app.website {
                    println!("website: {website}");
                }
            }
        }
        return Ok(());
    }

    if let Some(category) = args.category.as_deref() {
        view.set_category(category);
    }
    if let Some(search) = args.search.as_deref() {
        view.set_search(search);
    }
    for _ in 1..args.pages.max(1) {
        view.load_more();
    }

    let visible = view.visible();
    match args.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "category": view.category(),
                "search": view.search(),
                "matched": view.filtered().len(),
                "has_more": view.has_more(),
                "apps": visible,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        OutputFormat::Text => {
            println!("category: {}", view.category());
            println!("categories: {}", view.categories().join(", "));
            if !view.search().is_empty() {
                println!("search: {}", view.search());
            }
            println!("matched: {}", view.filtered().len());
            println!("showing: {}", visible.len());
            for app in &visible {
                let marker = if app.featured { "*" } else { " " };
                println!(
                    "{marker} {} | {} | {} | v{}",
                    app.id, app.name, app.category, app.version
                );
            }
            println!("has_more: {}", format_flag(view.has_more()));
        }
    }
    Ok(())
}

fn run_manifest(args: ManifestArgs) -> Result<()> {
    let body = fs::read(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let app_id = args
        .path
        .parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<local>".to_string());
    let manifest = decode_manifest(&app_id, &body)?;
    println!("{}", serde_json::to_string_pretty(manifest.entries())?);
    Ok(())
}

fn load_runtime(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, DirectoryConfig)> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    Ok((paths, config))
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_flag("APPDIR_LOG_JSON") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
