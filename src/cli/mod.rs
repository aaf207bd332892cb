use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, StoreBackend};
use crate::notes::NoteRepository;
use crate::store;

pub mod commands;

const LOG_FILE: &str = "notecards.log";

#[derive(Parser, Debug)]
#[command(
    name = "notecards",
    version,
    about = "Card-grid notes synced through a document store"
)]
pub struct Cli {
    /// Override the config file location (takes precedence over NOTECARDS_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTECARDS_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Store backend to use instead of the configured one
    #[arg(long, value_enum)]
    pub store: Option<StoreBackend>,

    /// Start the memory store offline so every write fails
    #[arg(long)]
    pub offline: bool,

    /// Print the notes, newest first, instead of opening the card grid
    #[arg(long)]
    pub list: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("NOTECARDS_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("NOTECARDS_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level, &loader.paths().log_dir)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let mut config = loader.load_or_init()?;
    if let Some(backend) = cli.store {
        config.store.backend = backend;
    }
    tracing::info!(backend = %config.store.backend, collection = %config.store.collection, "starting");

    let store = store::open(&config.store, cli.offline)?;
    let repo = NoteRepository::new(store, config.store.collection.as_str());

    if cli.list {
        return commands::list_notes(&repo);
    }
    let mut app = App::new(Arc::new(config), repo)?;
    commands::run_tui(&mut app)
}

fn init_tracing(level: &str, log_dir: &Path) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        let log_path = log_dir.join(LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("opening log file {}", log_path.display()))?;
        fmt()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
        Ok::<(), anyhow::Error>(())
    })
    .map(|_| ())
}
