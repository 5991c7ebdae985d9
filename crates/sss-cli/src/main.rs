use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

use chrono::Local;
use sss_core::{
    ConsolePrompt, Direction, Disambiguator, MetadataLookup, Origin, PlanEntry, PresetChoice,
    SyncConfig, SyncError, SyncSession, SyncState, TitleCatalog, TitleId,
};
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "sss-cli",
    about = "Compare and sync Switch saves between Ryujinx and Citron",
    version
)]
struct Cli {
    /// JSON config file; created with --save-config
    #[arg(long, default_value = "sss.json")]
    config: PathBuf,
    /// Ryujinx base directory (portable layout)
    #[arg(long)]
    ryujinx: Option<PathBuf>,
    /// Citron base directory
    #[arg(long)]
    citron: Option<PathBuf>,
    /// Where zip backups are written
    #[arg(long)]
    backup_dir: Option<PathBuf>,
    /// Backups kept per game
    #[arg(long)]
    max_backups: Option<usize>,
    /// Citron profile folder to use when several qualify
    #[arg(long)]
    profile: Option<String>,
    /// Never download the title catalog
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Recompute fingerprints after every copy
    #[arg(long, default_value_t = false)]
    verify: bool,
    /// Write the effective settings back to --config
    #[arg(long, default_value_t = false)]
    save_config: bool,
    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show every game and how the two sides compare (default)
    Status(StatusArgs),
    /// Sync one game in its suggested direction, or a forced one
    Sync(SyncArgs),
    /// Sync every game that is out of step
    SyncAll(SyncAllArgs),
    /// List backups for a game, newest first
    Backups(TitleArgs),
    /// Restore a backup archive over one side of a game
    Restore(RestoreArgs),
    /// Title catalog maintenance
    Catalog(CatalogArgs),
}

#[derive(ClapArgs, Debug, Default)]
struct StatusArgs {
    /// Hide games whose saves already match
    #[arg(long, default_value_t = false)]
    unsynced: bool,
    /// Print the plan as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Side {
    Ryujinx,
    Citron,
}

#[derive(ClapArgs, Debug)]
struct SyncArgs {
    /// Title id, e.g. 0100ABCD00000000
    title: String,
    /// Copy towards this side regardless of timestamps
    #[arg(long, value_enum)]
    to: Option<Side>,
}

#[derive(ClapArgs, Debug)]
struct SyncAllArgs {
    /// Show what would be copied without touching anything
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(ClapArgs, Debug)]
struct TitleArgs {
    title: String,
}

#[derive(ClapArgs, Debug)]
struct RestoreArgs {
    /// Backup zip to restore
    archive: PathBuf,
    /// Title id the archive belongs to
    title: String,
    /// Side to overwrite
    #[arg(long, value_enum)]
    to: Side,
}

#[derive(ClapArgs, Debug)]
struct CatalogArgs {
    #[command(subcommand)]
    action: CatalogCmd,
}

#[derive(Subcommand, Debug)]
enum CatalogCmd {
    /// Download a fresh copy of the catalog
    Refresh,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_config(&cli);
    match cli.cmd.as_ref().unwrap_or(&Cmd::Status(StatusArgs::default())) {
        Cmd::Status(a) => cmd_status(&cli, config, a),
        Cmd::Sync(a) => cmd_sync(&cli, config, a),
        Cmd::SyncAll(a) => cmd_sync_all(&cli, config, a),
        Cmd::Backups(a) => cmd_backups(&cli, config, a),
        Cmd::Restore(a) => cmd_restore(&cli, config, a),
        Cmd::Catalog(a) => match a.action {
            CatalogCmd::Refresh => cmd_catalog_refresh(config),
        },
    }
}

fn fail(code: i32, msg: impl std::fmt::Display) -> ! {
    eprintln!("error: {}", msg);
    std::process::exit(code);
}

fn load_config(cli: &Cli) -> SyncConfig {
    let mut config = SyncConfig::load(&cli.config).unwrap_or_else(|e| fail(2, e));
    if let Some(p) = &cli.ryujinx {
        config.ryujinx_base = p.clone();
    }
    if let Some(p) = &cli.citron {
        config.citron_base = p.clone();
    }
    if let Some(p) = &cli.backup_dir {
        config.backup_dir = p.clone();
    }
    if let Some(n) = cli.max_backups {
        config.max_backups = n;
    }
    if cli.verify {
        config.verify_transfers = true;
    }
    if cli.save_config {
        config
            .save(&cli.config)
            .unwrap_or_else(|e| fail(2, format!("writing config: {}", e)));
    }
    config
}

fn load_catalog(config: &SyncConfig, offline: bool) -> TitleCatalog {
    let res = if offline {
        TitleCatalog::load_local(&config.catalog_path)
    } else {
        TitleCatalog::load_or_fetch(&config.catalog_path, &config.catalog_url)
    };
    res.unwrap_or_else(|e| {
        warn!(error = %e, "title catalog unavailable, names will show as Unknown");
        TitleCatalog::default()
    })
}

fn open_session(cli: &Cli, config: SyncConfig) -> SyncSession {
    config.validate().unwrap_or_else(|e| fail(2, e));
    let catalog = load_catalog(&config, cli.offline);
    let disambiguator: Option<Box<dyn Disambiguator>> = match &cli.profile {
        Some(p) => Some(Box::new(PresetChoice(p.clone()))),
        None if std::io::stdin().is_terminal() => Some(Box::new(ConsolePrompt::stdio())),
        None => None,
    };
    SyncSession::new(config, Box::new(catalog), disambiguator)
}

fn scan_and_plan(session: &mut SyncSession) -> sss_core::SyncPlan {
    let scan = session.scan().unwrap_or_else(|e| fail(2, e));
    if let Some(e) = &scan.profile_error {
        eprintln!("warning: Citron saves unavailable: {}", e);
    }
    for s in &scan.skipped {
        eprintln!("skipped {} folder {}: {}", s.origin, s.folder, s.reason);
    }
    session.plan(&scan)
}

fn parse_title(s: &str) -> TitleId {
    TitleId::parse(s).unwrap_or_else(|e| fail(3, e))
}

fn fmt_time(entry: &PlanEntry, origin: Origin) -> String {
    entry
        .unit(origin)
        .map(|u| {
            u.modified
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "-".into())
}

fn cmd_status(cli: &Cli, config: SyncConfig, args: &StatusArgs) {
    let mut session = open_session(cli, config);
    let mut plan = scan_and_plan(&mut session);
    if args.unsynced {
        plan.entries.retain(|e| e.state != SyncState::Match);
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan).unwrap_or_else(|e| fail(2, e)));
        return;
    }
    println!(
        "{:<40} {:<16} {:<20} {:<16} {:<16} Action",
        "Title", "TitleID", "Status", "Ryujinx Date", "Citron Date"
    );
    for e in &plan.entries {
        println!(
            "{:<40} {:<16} {:<20} {:<16} {:<16} {}",
            e.name,
            e.title_id,
            e.state.label(),
            fmt_time(e, Origin::Ryujinx),
            fmt_time(e, Origin::Citron),
            e.direction().map(Direction::arrow).unwrap_or("")
        );
    }
    if let Some(p) = session.active_profile() {
        println!("\nCitron profile: {}", p);
    }
}

fn cmd_sync(cli: &Cli, config: SyncConfig, args: &SyncArgs) {
    let title = parse_title(&args.title);
    let mut session = open_session(cli, config);
    let plan = scan_and_plan(&mut session);
    let Some(entry) = plan.get(&title) else {
        fail(3, format!("no save found for {}", title));
    };
    let direction = match args.to {
        Some(Side::Citron) => Some(Direction::RyujinxToCitron),
        Some(Side::Ryujinx) => Some(Direction::CitronToRyujinx),
        None => entry.direction(),
    };
    let Some(direction) = direction else {
        println!("{} ({}): {}, nothing to do", entry.name, title, entry.state);
        return;
    };
    match session.transfer(entry, direction) {
        Ok(r) => {
            println!(
                "{} ({}): {} {} {}, {} file(s)",
                entry.name,
                title,
                direction.source(),
                direction.arrow(),
                direction.target(),
                r.files_copied
            );
            if let Some(b) = r.backup {
                println!("  backup: {}", b.display());
            }
        }
        Err(e @ SyncError::MissingDestination(_)) => fail(3, e),
        Err(e) => fail(4, e),
    }
}

fn cmd_sync_all(cli: &Cli, config: SyncConfig, args: &SyncAllArgs) {
    let mut session = open_session(cli, config);
    let plan = scan_and_plan(&mut session);
    if args.dry_run {
        for e in plan.pending() {
            if let Some(d) = e.direction() {
                println!("{} ({}): {} {} {}", e.name, e.title_id, d.source(), d.arrow(), d.target());
            }
        }
        return;
    }
    let report = session.sync_all(&plan);
    for (id, r) in &report.transferred {
        println!("synced {} ({} file(s))", id, r.files_copied);
    }
    for (id, e) in &report.failed {
        eprintln!("failed {}: {}", id, e);
    }
    println!(
        "{} synced, {} failed, {} need a first launch in Ryujinx",
        report.transferred.len(),
        report.failed.len(),
        plan.count(SyncState::NeedsInitialization)
    );
    if !report.failed.is_empty() {
        std::process::exit(4);
    }
}

fn cmd_backups(cli: &Cli, config: SyncConfig, args: &TitleArgs) {
    let title = parse_title(&args.title);
    let session = open_session(cli, config);
    let archives = session.backups(&title).unwrap_or_else(|e| fail(2, e));
    if archives.is_empty() {
        fail(3, format!("no backups for {}", title));
    }
    for a in archives {
        let when: chrono::DateTime<Local> = a.modified.into();
        println!("{}\t{}", when.format("%Y-%m-%d %H:%M:%S"), a.path.display());
    }
}

fn cmd_restore(cli: &Cli, config: SyncConfig, args: &RestoreArgs) {
    let title = parse_title(&args.title);
    if !args.archive.is_file() {
        fail(3, format!("not found: {}", args.archive.display()));
    }
    let mut session = open_session(cli, config);
    let plan = scan_and_plan(&mut session);
    let direction = match args.to {
        Side::Citron => Direction::RyujinxToCitron,
        Side::Ryujinx => Direction::CitronToRyujinx,
    };
    let entry = plan.get(&title).cloned().unwrap_or_else(|| PlanEntry {
        name: session.catalog().display_name(&title),
        title_id: title.clone(),
        ryujinx: None,
        citron: None,
        state: SyncState::NeedsInitialization,
    });
    let dest = session
        .destination(&entry, direction)
        .unwrap_or_else(|e| fail(3, e));
    match session.restore(&args.archive, &dest) {
        Ok(n) => println!("restored {} entries into {}", n, dest.path.display()),
        Err(e) => fail(4, e),
    }
}

fn cmd_catalog_refresh(config: SyncConfig) {
    TitleCatalog::fetch(&config.catalog_path, &config.catalog_url).unwrap_or_else(|e| fail(2, e));
    let c = TitleCatalog::load_local(&config.catalog_path).unwrap_or_else(|e| fail(2, e));
    println!("{} titles in {}", c.len(), config.catalog_path.display());
}
