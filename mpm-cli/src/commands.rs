//! mpm subcommands
//!
//! Every command works against a project manifest (`package.yml`), its lock
//! file and a plugin directory, all of which can be redirected with global
//! flags.

use anyhow::{bail, Context as _, Result};
use clap::Subcommand;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use mpm_core::catalog::{build_client, ClientConfig, HttpDownloader};
use mpm_core::install::{
    find_installed_file, validate, ArtifactFailure, BatchReport, InstallSettings, Installer,
    PackageLock, ProgressSink, ValidationStatus,
};
use mpm_core::manifest::Package;
use mpm_core::search::{
    lookup_project, parse_source_ref, rank, search_catalogs, SearchHit, SearchOutcome,
};
use mpm_core::server::{install_server, ServerResolver};
use mpm_core::{Catalogs, FallbackPolicy, ServerPlatform, SourceKind, VersionConstraint};

use crate::progress::spawn_renderer;
use crate::SourceChoice;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a package.yml for a new server
    Init {
        /// Replace an existing package.yml
        #[clap(long)]
        overwrite: bool,
    },

    /// Install every declared plugin, or search for and add new ones
    Install {
        /// Plugin names to search for; empty installs package.yml as declared
        queries: Vec<String>,
    },

    /// Search the catalogs without installing anything
    Search {
        query: String,

        /// Output results as JSON
        #[clap(long)]
        json: bool,
    },

    /// Update plugins to their newest compatible version
    Update {
        /// Only update these plugins (name or catalog id)
        names: Vec<String>,

        /// Report available updates without installing
        #[clap(long)]
        check: bool,
    },

    /// Remove a plugin from package.yml, the lock file and disk
    Uninstall { name: String },

    /// List declared plugins and their installed state
    List {
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// Verify installed plugins against the lock file
    Validate,

    /// Download the server jar declared in package.yml
    Server {
        /// Build number; defaults to the manifest's build or the latest one
        #[clap(long)]
        build: Option<String>,
    },
}

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct Context {
    pub package: PathBuf,
    pub lock: PathBuf,
    pub plugins_dir: PathBuf,
    pub force: bool,
    pub source: SourceChoice,
    pub no_fallback: bool,
    pub jobs: usize,
}

impl Context {
    fn catalogs(&self) -> Result<Catalogs> {
        let catalogs =
            Catalogs::http(&ClientConfig::default()).context("Failed to set up HTTP client")?;
        Ok(match self.source {
            SourceChoice::Auto => catalogs,
            SourceChoice::Modrinth => catalogs.restrict_to(&[SourceKind::Modrinth]),
            SourceChoice::Hangar => catalogs.restrict_to(&[SourceKind::Hangar]),
        })
    }

    fn settings(&self) -> InstallSettings {
        InstallSettings {
            plugins_dir: self.plugins_dir.clone(),
            force: self.force,
            max_concurrent: self.jobs.max(1),
            fallback: if self.no_fallback {
                FallbackPolicy::Deny
            } else {
                FallbackPolicy::Automatic
            },
        }
    }

    fn load_package(&self) -> Result<Package> {
        Package::load_from_path(&self.package).with_context(|| {
            format!(
                "Failed to read {} (run `mpm init` to create one)",
                self.package.display()
            )
        })
    }

    fn save_package(&self, package: &Package) -> Result<()> {
        package
            .save_to_path(&self.package)
            .with_context(|| format!("Failed to write {}", self.package.display()))
    }

    fn load_lock(&self) -> Result<PackageLock> {
        PackageLock::load_from_path(&self.lock)
            .with_context(|| format!("Failed to read {}", self.lock.display()))
    }

    fn save_lock(&self, lock: &PackageLock) -> Result<()> {
        lock.save_to_path(&self.lock)
            .with_context(|| format!("Failed to write {}", self.lock.display()))
    }

    /// Directory the server runs from (next to package.yml)
    fn server_root(&self) -> PathBuf {
        self.package
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Command {
    pub async fn execute(self, ctx: &Context) -> Result<()> {
        match self {
            Command::Init { overwrite } => init_command(ctx, overwrite),
            Command::Install { queries } if queries.is_empty() => install_command(ctx).await,
            Command::Install { queries } => add_command(ctx, &queries).await,
            Command::Search { query, json } => search_command(ctx, &query, json).await,
            Command::Update { names, check } => update_command(ctx, &names, check).await,
            Command::Uninstall { name } => uninstall_command(ctx, &name),
            Command::List { json } => list_command(ctx, json),
            Command::Validate => validate_command(ctx).await,
            Command::Server { build } => server_command(ctx, build).await,
        }
    }
}

fn init_command(ctx: &Context, overwrite: bool) -> Result<()> {
    if ctx.package.exists() && !overwrite {
        bail!(
            "{} already exists (use --overwrite to replace it)",
            ctx.package.display()
        );
    }

    let package = Package::template();
    ctx.save_package(&package)?;
    std::fs::create_dir_all(&ctx.plugins_dir)
        .with_context(|| format!("Failed to create {}", ctx.plugins_dir.display()))?;

    println!("Created {}", ctx.package.display());
    println!(
        "Server: {} {}",
        package.server.server_type, package.server.minecraft_version
    );
    println!("\nAdd plugins with: mpm install <name>");
    Ok(())
}

/// Install everything package.yml declares, then write the lock file once
async fn install_command(ctx: &Context) -> Result<()> {
    let package = ctx.load_package()?;
    let mut lock = ctx.load_lock()?;
    let catalogs = ctx.catalogs()?;
    let target = package.target();

    let enabled = catalogs.kinds();
    let declarations: Vec<_> = package
        .declarations()
        .into_iter()
        .filter(|d| {
            let keep = enabled.contains(&d.source);
            if !keep {
                tracing::info!("Skipping {} ({} is not enabled)", d.name, d.source);
            }
            keep
        })
        .collect();

    if declarations.is_empty() {
        println!("No plugins declared in {}", ctx.package.display());
        return Ok(());
    }

    println!(
        "Installing {} plugin(s) for {} {}",
        declarations.len(),
        target.platform_label(),
        target.game_version.as_deref().unwrap_or("(any version)")
    );

    let (sink, rx) = ProgressSink::channel();
    let renderer = spawn_renderer(rx);
    let installer = Installer::new(catalogs, target, ctx.settings()).with_progress(sink);

    let mut report = installer.install_all(&declarations).await;
    drop(installer);
    let _ = renderer.await;

    lock.merge(std::mem::take(&mut report.lock));
    ctx.save_lock(&lock)?;

    print_report(&report);
    if !report.is_success() {
        bail!(
            "{} of {} plugin(s) failed to install",
            report.required_failures().count(),
            report.total()
        );
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!();
    for artifact in &report.installed {
        let note = match (&artifact.platform_key, artifact.fallback_used) {
            (Some(key), true) => format!(" [{key} build]"),
            _ => String::new(),
        };
        let state = if artifact.reused { "kept" } else { "installed" };
        println!(
            "  {} {} {}{}",
            state, artifact.name, artifact.version, note
        );
    }

    if !report.failures.is_empty() {
        println!("\nFailed:");
        for failure in &report.failures {
            println!(
                "  {} [{}] {}",
                failure.name,
                failure_marker(failure),
                failure.error
            );
        }
    }

    println!(
        "\n{} installed, {} failed",
        report.installed.len(),
        report.failures.len()
    );
}

fn failure_marker(failure: &ArtifactFailure) -> &'static str {
    if failure.error.is_integrity_failure() {
        "INTEGRITY"
    } else if failure.optional {
        "optional"
    } else if failure.error.is_resolution_miss() {
        "unavailable"
    } else {
        "error"
    }
}

/// Pick the project a query names: `source:id` directly, else by search
async fn choose_project(
    catalogs: &Catalogs,
    query: &str,
    platform: Option<ServerPlatform>,
) -> Result<Option<SearchHit>> {
    if let Some((kind, identifier)) = parse_source_ref(query) {
        let hit = lookup_project(catalogs, kind, identifier)
            .await
            .with_context(|| format!("No {kind} project '{identifier}'"))?;
        return Ok(Some(hit));
    }

    match rank(search_catalogs(catalogs, query, platform).await) {
        SearchOutcome::Exact(hit) => Ok(Some(hit)),
        SearchOutcome::Suggestions(hits) => prompt_choice(query, &hits),
        SearchOutcome::NoMatches => bail!("No plugins found for '{query}'"),
    }
}

/// Search-and-install for free-text queries, saving after every plugin
async fn add_command(ctx: &Context, queries: &[String]) -> Result<()> {
    let mut package = ctx.load_package()?;
    let mut lock = ctx.load_lock()?;
    let catalogs = ctx.catalogs()?;
    let target = package.target();

    let (sink, rx) = ProgressSink::channel();
    let renderer = spawn_renderer(rx);
    let installer = Installer::new(catalogs.clone(), target.clone(), ctx.settings())
        .with_progress(sink);

    let mut failed = 0usize;
    for query in queries {
        let hit = match choose_project(&catalogs, query, target.platform).await {
            Ok(Some(hit)) => hit,
            Ok(None) => continue,
            Err(e) => {
                println!("{e:#}");
                failed += 1;
                continue;
            }
        };

        match installer.install_one(&hit.declaration()).await {
            Ok(artifact) => {
                lock.record(artifact.key.clone(), artifact.lock_entry());
                ctx.save_lock(&lock)?;
                package.apply_installed(&artifact);
                ctx.save_package(&package)?;
                println!(
                    "Added {} {} from {}",
                    artifact.name, artifact.version, artifact.source
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("Failed to install {}: {e}", hit.project.display_name);
            }
        }
    }

    drop(installer);
    let _ = renderer.await;

    if failed > 0 {
        bail!("{failed} of {} plugin(s) were not installed", queries.len());
    }
    Ok(())
}

#[derive(Tabled)]
struct HitRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Description")]
    description: String,
}

fn hit_rows(hits: &[SearchHit]) -> Vec<HitRow> {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| HitRow {
            index: i + 1,
            name: hit.project.display_name.clone(),
            source: if hit.fallback {
                format!("{} (compat)", hit.source)
            } else {
                hit.source.to_string()
            },
            id: hit.project.stable_id.clone(),
            description: truncate(&hit.project.description, 50),
        })
        .collect()
}

fn render_table<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

fn prompt_choice(query: &str, hits: &[SearchHit]) -> Result<Option<SearchHit>> {
    println!("\nNo exact match for '{query}'. Closest results:\n");
    println!("{}", render_table(&hit_rows(hits)));
    print!("Select a plugin [1-{}], or press enter to skip: ", hits.len());
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read selection")?;

    Ok(parse_choice(&line, hits.len()).map(|i| hits[i].clone()))
}

/// 1-based selection to index; anything else skips
fn parse_choice(input: &str, len: usize) -> Option<usize> {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Some(n - 1),
        _ => None,
    }
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.lines().next().unwrap_or_default();
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

async fn search_command(ctx: &Context, query: &str, json: bool) -> Result<()> {
    let platform = match ctx.load_package() {
        Ok(package) => package.target().platform,
        Err(_) => None,
    };
    let catalogs = ctx.catalogs()?;
    let mut hits = search_catalogs(&catalogs, query, platform).await;

    if json {
        let results: Vec<serde_json::Value> = hits
            .iter()
            .map(|hit| {
                serde_json::json!({
                    "name": hit.project.display_name,
                    "id": hit.project.stable_id,
                    "source": hit.source,
                    "description": hit.project.description,
                    "distance": hit.distance,
                    "fallback": hit.fallback,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("\nNo plugins found.");
        return Ok(());
    }

    hits.truncate(20);
    println!("\nFound {} plugin(s):\n", hits.len());
    println!("{}", render_table(&hit_rows(&hits)));
    println!("\nInstall with: mpm install <name>");
    Ok(())
}

#[derive(Tabled)]
struct UpdateRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Installed")]
    installed: String,
    #[tabled(rename = "Latest")]
    latest: String,
}

async fn update_command(ctx: &Context, names: &[String], check: bool) -> Result<()> {
    let mut package = ctx.load_package()?;
    let mut lock = ctx.load_lock()?;
    let catalogs = ctx.catalogs()?;

    let mut declarations = package.declarations();
    if !names.is_empty() {
        let wanted = names
            .iter()
            .map(|n| {
                package
                    .find_plugin(n)
                    .map(|p| p.name.clone())
                    .with_context(|| format!("'{n}' is not declared in {}", ctx.package.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        declarations.retain(|d| wanted.contains(&d.name));
    }

    // An outdated file may share its name with the new release
    let mut settings = ctx.settings();
    settings.force = true;

    let (sink, rx) = ProgressSink::channel();
    let renderer = spawn_renderer(rx);
    let installer = Installer::new(catalogs, package.target(), settings).with_progress(sink);

    let checks = installer.check_updates(&declarations, &lock).await;

    if check {
        drop(installer);
        let _ = renderer.await;

        let rows: Vec<UpdateRow> = checks
            .iter()
            .map(|c| UpdateRow {
                name: c.name.clone(),
                installed: c.installed.clone().unwrap_or_else(|| "-".to_string()),
                latest: match &c.latest {
                    Ok(v) if c.has_update() => format!("{v} (update)"),
                    Ok(v) => v.clone(),
                    Err(e) => format!("error: {e}"),
                },
            })
            .collect();
        println!("{}", render_table(&rows));
        return Ok(());
    }

    let outdated: Vec<_> = declarations
        .iter()
        .filter(|d| {
            checks
                .iter()
                .any(|c| c.key == d.lock_key() && c.has_update())
        })
        .map(|d| {
            let mut d = d.clone();
            d.version = VersionConstraint::Latest;
            d
        })
        .collect();

    if outdated.is_empty() {
        drop(installer);
        let _ = renderer.await;
        println!("All plugins are up to date");
        return Ok(());
    }

    // Files being replaced, looked up before the new ones land
    let previous: Vec<_> = outdated
        .iter()
        .map(|d| {
            (
                d.lock_key().to_string(),
                find_installed_file(&ctx.plugins_dir, &d.name, lock.get(d.lock_key())),
            )
        })
        .collect();

    let mut report = installer.install_all(&outdated).await;
    drop(installer);
    let _ = renderer.await;

    for artifact in &report.installed {
        let old = previous
            .iter()
            .find(|(key, _)| key == &artifact.key)
            .and_then(|(_, path)| path.as_ref());
        if let Some(old) = old.filter(|old| **old != artifact.path) {
            if let Err(e) = std::fs::remove_file(old) {
                tracing::warn!("Could not remove old file {}: {}", old.display(), e);
            }
        }
        package.apply_installed(artifact);
    }

    lock.merge(std::mem::take(&mut report.lock));
    ctx.save_lock(&lock)?;
    ctx.save_package(&package)?;

    print_report(&report);
    if !report.is_success() {
        bail!("{} plugin(s) failed to update", report.required_failures().count());
    }
    Ok(())
}

fn uninstall_command(ctx: &Context, name: &str) -> Result<()> {
    let mut package = ctx.load_package()?;
    let mut lock = ctx.load_lock()?;

    let plugin = package
        .remove_plugin(name)
        .with_context(|| format!("'{name}' is not declared in {}", ctx.package.display()))?;
    let entry = plugin.source().and_then(|(_, id)| lock.remove(id));

    match find_installed_file(&ctx.plugins_dir, &plugin.name, entry.as_ref()) {
        Some(path) => {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            println!("Removed {}", path.display());
        }
        None => println!("No installed file found for {}", plugin.name),
    }

    ctx.save_package(&package)?;
    ctx.save_lock(&lock)?;
    println!("Uninstalled {}", plugin.name);
    Ok(())
}

#[derive(Tabled)]
struct PluginRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Declared")]
    declared: String,
    #[tabled(rename = "Locked")]
    locked: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "File")]
    file: String,
}

fn list_command(ctx: &Context, json: bool) -> Result<()> {
    let package = ctx.load_package()?;
    let lock = ctx.load_lock()?;

    let rows: Vec<PluginRow> = package
        .plugins
        .iter()
        .map(|plugin| {
            let source = plugin.source();
            let entry = source.and_then(|(_, id)| lock.get(id));
            let file = find_installed_file(&ctx.plugins_dir, &plugin.name, entry)
                .and_then(|p| p.file_name().map(|f| f.to_string_lossy().into_owned()));
            PluginRow {
                name: plugin.name.clone(),
                declared: if plugin.version.is_empty() {
                    "latest".to_string()
                } else {
                    plugin.version.clone()
                },
                locked: entry.map(|e| e.version.clone()).unwrap_or_else(|| "-".to_string()),
                source: source
                    .map(|(kind, id)| format!("{kind}:{id}"))
                    .unwrap_or_else(|| "-".to_string()),
                file: file.unwrap_or_else(|| "missing".to_string()),
            }
        })
        .collect();

    if json {
        let output: Vec<serde_json::Value> = rows
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.name,
                    "declared": r.declared,
                    "locked": r.locked,
                    "source": r.source,
                    "file": r.file,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No plugins declared in {}", ctx.package.display());
        return Ok(());
    }

    println!(
        "\n{} {} ({} {})\n",
        package.name, package.version, package.server.server_type, package.server.minecraft_version
    );
    println!("{}", render_table(&rows));
    Ok(())
}

#[derive(Tabled)]
struct ValidationRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "File")]
    file: String,
}

fn status_label(status: &ValidationStatus) -> String {
    match status {
        ValidationStatus::Ok => "ok".to_string(),
        ValidationStatus::Missing => "missing".to_string(),
        ValidationStatus::Unlocked => "not in lock file".to_string(),
        ValidationStatus::Modified { .. } => "MODIFIED".to_string(),
        ValidationStatus::UnknownDigest => "unknown digest format".to_string(),
    }
}

async fn validate_command(ctx: &Context) -> Result<()> {
    let package = ctx.load_package()?;
    let lock = ctx.load_lock()?;

    let reports = validate(&ctx.plugins_dir, &package.declarations(), &lock)
        .await
        .context("Failed to validate plugins")?;

    let rows: Vec<ValidationRow> = reports
        .iter()
        .map(|r| ValidationRow {
            name: r.name.clone(),
            status: status_label(&r.status),
            file: r
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    println!("{}", render_table(&rows));

    let bad = reports.iter().filter(|r| !r.is_ok()).count();
    if bad > 0 {
        bail!("{bad} of {} plugin(s) failed validation", reports.len());
    }
    println!("\nAll {} plugin(s) verified", reports.len());
    Ok(())
}

async fn server_command(ctx: &Context, build: Option<String>) -> Result<()> {
    let package = ctx.load_package()?;
    let platform: ServerPlatform = package
        .server
        .server_type
        .parse()
        .with_context(|| format!("Unsupported server type '{}'", package.server.server_type))?;
    let build = build
        .or_else(|| Some(package.server.build.clone()).filter(|b| !b.trim().is_empty()))
        .unwrap_or_else(|| "latest".to_string());

    let client = build_client(&ClientConfig::default()).context("Failed to set up HTTP client")?;
    let resolver = ServerResolver::new(client.clone());
    let downloader = HttpDownloader::new(client);

    let (sink, rx) = ProgressSink::channel();
    let renderer = spawn_renderer(rx);
    let result = install_server(
        &resolver,
        &downloader,
        platform,
        &package.server.minecraft_version,
        &build,
        &ctx.server_root(),
        ctx.force,
        &sink.job(platform.as_str()),
    )
    .await;
    drop(sink);
    let _ = renderer.await;

    let (server, outcome) = result.context("Failed to download server jar")?;
    println!(
        "{} {} build {} -> {}{}",
        server.platform,
        server.game_version,
        server.build,
        outcome.path.display(),
        if outcome.reused { " (already present)" } else { "" }
    );
    Ok(())
}
