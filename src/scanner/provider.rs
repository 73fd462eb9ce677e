//! Sources of paths for the scanner service.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::event::{EventKind, ModifyKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::service::ScannerHandle;
use crate::audio::is_audio_file;

pub const DEFAULT_WATCH_BUFFER_SIZE: usize = 50_000;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, used for registration bookkeeping.
    fn id(&self) -> String;

    /// Feed paths into `handle` until done. One-shot providers return when
    /// their work is complete, watchers run until `shutdown_token` fires.
    async fn run(&self, handle: ScannerHandle, shutdown_token: CancellationToken) -> Result<()>;
}

/// Walks a directory tree once.
pub struct SingleScanProvider {
    root: PathBuf,
}

impl SingleScanProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn collect_audio_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry under {:?}: {}", root, err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

#[async_trait]
impl Provider for SingleScanProvider {
    fn id(&self) -> String {
        format!("scan:{}", self.root.display())
    }

    async fn run(&self, handle: ScannerHandle, shutdown_token: CancellationToken) -> Result<()> {
        let root = self.root.clone();
        let paths = tokio::task::spawn_blocking(move || collect_audio_files(&root))
            .await
            .context("Directory walk task failed")?;
        info!("Found {} audio files under {:?}", paths.len(), self.root);

        for path in paths {
            if shutdown_token.is_cancelled() || !handle.submit(path).await {
                break;
            }
        }
        Ok(())
    }
}

/// Forwards filesystem changes under a directory tree until shutdown.
pub struct FSWatchProvider {
    root: PathBuf,
    buffer_size: usize,
}

impl FSWatchProvider {
    pub fn new(root: impl Into<PathBuf>, buffer_size: usize) -> Self {
        Self {
            root: root.into(),
            buffer_size: buffer_size.max(1),
        }
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

#[async_trait]
impl Provider for FSWatchProvider {
    fn id(&self) -> String {
        format!("watch:{}", self.root.display())
    }

    async fn run(&self, handle: ScannerHandle, shutdown_token: CancellationToken) -> Result<()> {
        // The watcher callback runs on notify's thread and must never block.
        let (sender, mut receiver) = mpsc::channel::<PathBuf>(self.buffer_size);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !is_relevant(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        if !is_audio_file(&path) {
                            continue;
                        }
                        match sender.try_send(path) {
                            Ok(()) => {}
                            Err(TrySendError::Full(path)) => {
                                warn!("Watch buffer full, dropping event for {:?}", path)
                            }
                            Err(TrySendError::Closed(_)) => {}
                        }
                    }
                }
                Err(err) => error!("Watch error: {}", err),
            },
            Config::default(),
        )
        .context("Failed to create filesystem watcher")?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {:?}", self.root))?;
        info!("Watching {:?}", self.root);

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => break,
                path = receiver.recv() => match path {
                    Some(path) => {
                        debug!("Change under watch: {:?}", path);
                        if !handle.submit(path).await {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        info!("Stopped watching {:?}", self.root);
        Ok(())
    }
}
