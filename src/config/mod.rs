mod file_config;

pub use file_config::{FileConfig, ScannerFileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::scanner::{ScannerConfig, DEFAULT_WATCH_BUFFER_SIZE};

pub const DEFAULT_BATCH_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// CLI arguments that can be used for config resolution.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub library_db: PathBuf,
    pub music_dir: PathBuf,
    pub artwork_dir: Option<PathBuf>,
    pub watch: bool,
    pub batch_delay_ms: u64,
    pub max_batch_size: usize,
    pub watch_buffer_size: usize,
}

impl CliConfig {
    pub fn new(library_db: impl Into<PathBuf>, music_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_db: library_db.into(),
            music_dir: music_dir.into(),
            artwork_dir: None,
            watch: false,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            watch_buffer_size: DEFAULT_WATCH_BUFFER_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub library_db: PathBuf,
    pub music_dir: PathBuf,
    pub artwork_dir: PathBuf,
    pub watch: bool,
    pub watch_buffer_size: usize,
    pub scanner: ScannerConfig,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let library_db = file
            .library_db
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.library_db.clone());

        let music_dir = file
            .music_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.music_dir.clone());
        if !music_dir.exists() {
            bail!("Music directory does not exist: {:?}", music_dir);
        }
        if !music_dir.is_dir() {
            bail!("music_dir is not a directory: {:?}", music_dir);
        }

        // Images live next to the database unless told otherwise
        let artwork_dir = file
            .artwork_dir
            .map(PathBuf::from)
            .or_else(|| cli.artwork_dir.clone())
            .unwrap_or_else(|| {
                library_db
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".images")
            });

        let watch = file.watch.unwrap_or(cli.watch);

        let scanner_file = file.scanner.unwrap_or_default();
        let batch_delay_ms = scanner_file.batch_delay_ms.unwrap_or(cli.batch_delay_ms);
        let max_batch_size = scanner_file.max_batch_size.unwrap_or(cli.max_batch_size);
        let watch_buffer_size = scanner_file
            .watch_buffer_size
            .unwrap_or(cli.watch_buffer_size);

        if batch_delay_ms == 0 {
            bail!("batch_delay_ms must be greater than zero");
        }
        if max_batch_size == 0 {
            bail!("max_batch_size must be greater than zero");
        }
        if watch_buffer_size == 0 {
            bail!("watch_buffer_size must be greater than zero");
        }

        Ok(AppConfig {
            library_db,
            music_dir,
            artwork_dir,
            watch,
            watch_buffer_size,
            scanner: ScannerConfig {
                batch_delay: Duration::from_millis(batch_delay_ms),
                max_batch_size,
            },
        })
    }
}
