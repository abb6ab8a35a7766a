//! Veil node - inspect and maintain the local router contact database

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use veil_core::{Clock, SystemClock};
use veil_node::config::{expand_path, Config};
use veil_node::inspect;
use veil_nodedb::{ensure_archive, NodeDb, TokioDisk};

#[derive(Parser)]
#[command(name = "veil-node")]
#[command(about = "Inspect and maintain the Veil router contact database", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "~/.veil/config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Data directory (overrides config)
    #[arg(short, long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and the contact archive
    Init,

    /// Show database statistics
    Status,

    /// Show a stored router contact
    Show {
        /// Router id (hex-encoded public key)
        #[arg(required = true)]
        id: String,
    },

    /// List the stored routers closest to an id
    Closest {
        /// Target id (hex-encoded)
        #[arg(required = true)]
        target: String,

        /// Number of routers to list
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },

    /// Import signed contact files (a file or a directory of them)
    Import {
        #[arg(required = true)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config_path = expand_path(&cli.config);
    let mut config = Config::load_or_default(&config_path)?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    match cli.command {
        Commands::Init => init(&config, &config_path)?,
        Commands::Status => show_status(&config)?,
        Commands::Show { id } => show_contact(&config, &id)?,
        Commands::Closest { target, count } => show_closest(&config, &target, count)?,
        Commands::Import { path } => import_contacts(&config, Path::new(&path))?,
    }

    Ok(())
}

/// Open the database and load the archive
fn open_db(config: &Config) -> Result<NodeDb> {
    let db = NodeDb::open(
        &config.nodedb(),
        Arc::new(TokioDisk::current()),
        Arc::new(SystemClock),
    )?;
    db.load_from_disk()?;
    Ok(db)
}

fn init(config: &Config, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
    } else {
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let toml = toml::to_string_pretty(config)?;
        std::fs::write(config_path, toml)?;
        tracing::info!("Wrote config: {}", config_path.display());
    }

    let nodedb = config.nodedb();
    if let Some(root) = &nodedb.root {
        let archive = ensure_archive(root)?;
        println!("Initialized node database at: {}", archive.root().display());
    }

    Ok(())
}

fn show_status(config: &Config) -> Result<()> {
    let db = open_db(config)?;

    println!("Veil node v{}", env!("CARGO_PKG_VERSION"));
    println!("Protocol version: {}", veil_core::PROTOCOL_VERSION);
    println!("Network: {}", db.net_id());
    match db.archive() {
        Some(archive) => println!("Archive: {}", archive.root().display()),
        None => println!("Archive: none (memory only)"),
    }

    let now = SystemClock.now_ms();
    let contacts = db.all_contacts()?;
    let expired = contacts.iter().filter(|rc| rc.is_expired(now)).count();
    println!("Router contacts: {}", contacts.len());
    if expired > 0 {
        println!("Expired: {}", expired);
    }

    db.shutdown();
    Ok(())
}

fn show_contact(config: &Config, id: &str) -> Result<()> {
    let id = inspect::parse_router_id(id)?;
    let db = open_db(config)?;

    match db.get(id)? {
        Some(rc) => print!("{}", inspect::describe(&rc, SystemClock.now_ms())),
        None => println!("No contact for {}", id),
    }

    db.shutdown();
    Ok(())
}

fn show_closest(config: &Config, target: &str, count: usize) -> Result<()> {
    let target = inspect::parse_router_id(target)?;
    let db = open_db(config)?;

    let closest = db.k_closest_to(target, count)?;
    if closest.is_empty() {
        println!("No router contacts stored");
    }
    for rc in &closest {
        println!("{}", inspect::distance_line(rc, &target));
    }

    db.shutdown();
    Ok(())
}

fn import_contacts(config: &Config, path: &Path) -> Result<()> {
    let db = open_db(config)?;

    let report = inspect::import(&db, path, SystemClock.now_ms())?;
    let written = db.save_to_disk()?;

    println!(
        "Imported {} contact(s), rejected {}; {} stored",
        report.imported, report.rejected, written
    );

    db.shutdown();
    Ok(())
}
