use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigLoader;
use crate::remote::{HttpRemote, NoteRemote};
use crate::storage::{self, NoteCache};
use crate::sync::{SyncDriver, SyncEngine};

pub mod commands;

use self::commands::{DeleteArgs, EditArgs, ListArgs, NewArgs, NoteRef};

#[derive(Parser, Debug)]
#[command(
    name = "notesync",
    version,
    about = "Offline-first notes with optional sync to a note service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTESYNC_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTESYNC_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Note service base URL (takes precedence over NOTESYNC_API_URL / NOTES_API_URL)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Keep the note cache in memory for this run; nothing is written to disk
    #[arg(long)]
    pub ephemeral: bool,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List notes, newest first (default)
    List(ListArgs),
    /// Print a note (the selected one by default)
    Show(NoteRef),
    /// Create a note
    New(NewArgs),
    /// Change a note's title or content
    Edit(EditArgs),
    /// Delete a note
    Delete(DeleteArgs),
    /// Make a note the selected note
    Select(NoteRef),
    /// Reconcile with the note service and report the outcome
    Sync,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("NOTESYNC_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("NOTESYNC_DATA", path);
    }

    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let loader = ConfigLoader::discover()?;
    let config = loader.load_or_init()?;
    tracing::debug!(path = %loader.paths().config_file.display(), "config loaded");
    let cache = if cli.ephemeral {
        tracing::debug!("using an in-memory note cache");
        NoteCache::in_memory()
    } else {
        let store = storage::init(&config.storage)?;
        tracing::debug!(path = %store.database_path().display(), "note cache ready");
        NoteCache::new(Arc::new(store))
    };

    let base_url = config.remote.resolve_base_url(cli.api_url.as_deref());
    let http = HttpRemote::new(base_url.as_deref(), config.remote.timeout())
        .context("configuring note service client")?;
    match http.base_url() {
        Some(url) => tracing::info!(%url, "note service configured"),
        None => tracing::info!("no note service configured, running local-only"),
    }
    let configured = http.is_configured();
    let remote: Arc<dyn NoteRemote> = Arc::new(http);

    let engine = SyncEngine::open(cache, &config.sync);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    let command = cli.command.unwrap_or(Commands::List(ListArgs::default()));
    runtime.block_on(async move {
        let mut driver = SyncDriver::new(engine, remote);
        driver.start();
        driver.flush().await;
        match command {
            Commands::List(args) => commands::list_notes(&mut driver, args),
            Commands::Show(args) => commands::show_note(&driver, args),
            Commands::New(args) => commands::new_note(&mut driver, args).await,
            Commands::Edit(args) => commands::edit_note(&mut driver, args).await,
            Commands::Delete(args) => commands::delete_note(&mut driver, args).await,
            Commands::Select(args) => commands::select_note(&mut driver, args),
            Commands::Sync => commands::report_sync(&driver, configured),
        }
    })
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
