use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tenor_library::config::{
    AppConfig, CliConfig, FileConfig, DEFAULT_BATCH_DELAY_MS, DEFAULT_MAX_BATCH_SIZE,
};
use tenor_library::scanner::{
    FSWatchProvider, LibraryScanner, ScannerService, SingleScanProvider, DEFAULT_WATCH_BUFFER_SIZE,
};
use tenor_library::{ArtworkStore, LibraryStore, SearchService, SqliteLibraryStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite library database file, created if missing.
    #[clap(value_parser = parse_path)]
    pub library_db: PathBuf,

    /// Root of the music directory to catalog.
    #[clap(value_parser = parse_path)]
    pub music_dir: PathBuf,

    /// Where extracted artwork is stored. Defaults to `.images` next to the database.
    #[clap(long, value_parser = parse_path)]
    pub artwork_dir: Option<PathBuf>,

    /// Keep running and follow changes under the music directory.
    #[clap(long)]
    pub watch: bool,

    /// Milliseconds between batching attempts.
    #[clap(long, default_value_t = DEFAULT_BATCH_DELAY_MS)]
    pub batch_delay_ms: u64,

    /// Maximum number of files scanned per batch.
    #[clap(long, default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,

    /// Filesystem events buffered before new ones are dropped.
    #[clap(long, default_value_t = DEFAULT_WATCH_BUFFER_SIZE)]
    pub watch_buffer_size: usize,

    /// Optional TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            library_db: self.library_db.clone(),
            music_dir: self.music_dir.clone(),
            artwork_dir: self.artwork_dir.clone(),
            watch: self.watch,
            batch_delay_ms: self.batch_delay_ms,
            max_batch_size: self.max_batch_size,
            watch_buffer_size: self.watch_buffer_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    if let Some(parent) = config.library_db.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }
    info!("Opening library database at {:?}...", config.library_db);
    let store = Arc::new(SqliteLibraryStore::new(&config.library_db)?);

    info!("Building search index...");
    let search = Arc::new(SearchService::build(store.as_ref())?);
    store.register_listener(search.clone());

    info!("Storing artwork under {:?}", config.artwork_dir);
    let scanner = LibraryScanner::new(store.clone(), ArtworkStore::new(&config.artwork_dir));

    let shutdown_token = CancellationToken::new();
    let mut service = ScannerService::new(config.scanner, Arc::new(scanner), shutdown_token.clone());

    service.spawn_provider(Arc::new(SingleScanProvider::new(&config.music_dir)));

    #[cfg(not(feature = "no_watch"))]
    let watching = config.watch;
    #[cfg(feature = "no_watch")]
    let watching = false;

    if watching {
        service.spawn_provider(Arc::new(FSWatchProvider::new(
            &config.music_dir,
            config.watch_buffer_size,
        )));
    } else {
        service = service.exit_when_idle();
    }

    let mut service_task = tokio::spawn(service.run());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested, finishing the current batch...");
            shutdown_token.cancel();
            service_task.await?;
        }
        joined = &mut service_task => {
            joined?;
        }
    }

    info!(
        "Library holds {} artists, {} albums, {} tracks, {} images",
        store.get_artists_count(),
        store.get_albums_count(),
        store.get_tracks_count(),
        store.get_images_count()
    );
    Ok(())
}
