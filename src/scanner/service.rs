//! Debounced, single-flight batching of scan requests.
//!
//! Providers push paths into the service through a [`ScannerHandle`]. The
//! service loop collects them in a set and, on every tick, hands at most
//! `max_batch_size` of them to the batch scanner. Only one batch runs at a
//! time; when it finishes the next one starts right away if paths are waiting.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::error::ScanResult;
use super::library_scanner::{LibraryScanner, ScanReport};
use super::provider::Provider;

const MESSAGE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Interval between batching attempts. The first attempt waits one interval.
    pub batch_delay: Duration,
    pub max_batch_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(1000),
            max_batch_size: 500,
        }
    }
}

/// What the service runs for each batch. Called from a blocking thread.
pub trait BatchScanner: Send + Sync + 'static {
    fn scan_batch(&self, paths: &[PathBuf]) -> ScanResult<ScanReport>;
}

impl BatchScanner for LibraryScanner {
    fn scan_batch(&self, paths: &[PathBuf]) -> ScanResult<ScanReport> {
        LibraryScanner::scan_batch(self, paths)
    }
}

#[derive(Debug)]
pub enum ScannerMessage {
    ScanFile(PathBuf),
    ProviderStarted(String),
    ProviderFinished(String),
}

/// Sending side of the service, cloned into every provider.
#[derive(Clone)]
pub struct ScannerHandle {
    sender: mpsc::Sender<ScannerMessage>,
}

impl ScannerHandle {
    /// Queue `path` for scanning. Returns false once the service is gone.
    pub async fn submit(&self, path: PathBuf) -> bool {
        self.send(ScannerMessage::ScanFile(path)).await
    }

    async fn send(&self, message: ScannerMessage) -> bool {
        self.sender.send(message).await.is_ok()
    }

    #[cfg(test)]
    pub(crate) fn detached(capacity: usize) -> (ScannerHandle, mpsc::Receiver<ScannerMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (ScannerHandle { sender }, receiver)
    }
}

struct BatchOutcome {
    size: usize,
    result: Result<ScanResult<ScanReport>, JoinError>,
}

pub struct ScannerService {
    config: ScannerConfig,
    scanner: Arc<dyn BatchScanner>,

    pending: BTreeSet<PathBuf>,
    active: bool,
    providers: HashSet<String>,
    providers_seen: usize,
    exit_when_idle: bool,

    handle: ScannerHandle,
    receiver: mpsc::Receiver<ScannerMessage>,
    done_sender: mpsc::Sender<BatchOutcome>,
    done_receiver: mpsc::Receiver<BatchOutcome>,

    shutdown_token: CancellationToken,
}

impl ScannerService {
    pub fn new(
        config: ScannerConfig,
        scanner: Arc<dyn BatchScanner>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (done_sender, done_receiver) = mpsc::channel(1);
        Self {
            config,
            scanner,
            pending: BTreeSet::new(),
            active: false,
            providers: HashSet::new(),
            providers_seen: 0,
            exit_when_idle: false,
            handle: ScannerHandle { sender },
            receiver,
            done_sender,
            done_receiver,
            shutdown_token,
        }
    }

    /// Make `run` return once every provider has finished and all of
    /// their paths are scanned.
    pub fn exit_when_idle(mut self) -> Self {
        self.exit_when_idle = true;
        self
    }

    pub fn handle(&self) -> ScannerHandle {
        self.handle.clone()
    }

    /// Run `provider` on its own task. The provider is registered with the
    /// service while it runs and deregistered when `run` returns.
    pub fn spawn_provider(&self, provider: Arc<dyn Provider>) -> JoinHandle<()> {
        let handle = self.handle();
        let shutdown_token = self.shutdown_token.clone();
        tokio::spawn(async move {
            let id = provider.id();
            handle
                .send(ScannerMessage::ProviderStarted(id.clone()))
                .await;
            if let Err(err) = provider.run(handle.clone(), shutdown_token).await {
                error!("Provider {} failed: {:#}", id, err);
            }
            handle.send(ScannerMessage::ProviderFinished(id)).await;
        })
    }

    /// Service loop. Returns after the shutdown token fires and any batch in
    /// flight has completed.
    pub async fn run(mut self) {
        info!(
            "Starting scanner service (batch delay {:?}, max batch size {})",
            self.config.batch_delay, self.config.max_batch_size
        );
        let mut ticker = interval_at(
            Instant::now() + self.config.batch_delay,
            self.config.batch_delay,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    info!("Scanner service received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.start_batch();
                }
                Some(message) = self.receiver.recv() => {
                    self.handle_message(message);
                }
                Some(outcome) = self.done_receiver.recv() => {
                    self.finish_batch(outcome);
                    self.start_batch();
                }
            }

            if self.exit_when_idle && self.is_idle() {
                info!("All providers finished and nothing is pending");
                break;
            }
        }

        if self.active {
            debug!("Waiting for the batch in flight");
            if let Some(outcome) = self.done_receiver.recv().await {
                self.finish_batch(outcome);
            }
        }
        info!(
            "Scanner service stopped with {} paths pending",
            self.pending.len()
        );
    }

    fn is_idle(&self) -> bool {
        self.providers_seen > 0
            && self.providers.is_empty()
            && self.pending.is_empty()
            && !self.active
    }

    fn handle_message(&mut self, message: ScannerMessage) {
        match message {
            ScannerMessage::ScanFile(path) => {
                trace!("Queued {:?}", path);
                self.pending.insert(path);
            }
            ScannerMessage::ProviderStarted(id) => {
                info!("Provider {} registered", id);
                self.providers.insert(id);
                self.providers_seen += 1;
            }
            ScannerMessage::ProviderFinished(id) => {
                if self.providers.remove(&id) {
                    info!(
                        "Provider {} finished and deregistered, {} still running",
                        id,
                        self.providers.len()
                    );
                }
            }
        }
    }

    fn start_batch(&mut self) {
        if self.active || self.pending.is_empty() {
            return;
        }

        let mut batch = Vec::with_capacity(self.config.max_batch_size.min(self.pending.len()));
        while batch.len() < self.config.max_batch_size {
            match self.pending.pop_first() {
                Some(path) => batch.push(path),
                None => break,
            }
        }
        self.active = true;
        debug!(
            "Starting batch of {} paths, {} left pending",
            batch.len(),
            self.pending.len()
        );

        let scanner = self.scanner.clone();
        let done_sender = self.done_sender.clone();
        tokio::spawn(async move {
            let size = batch.len();
            let result = tokio::task::spawn_blocking(move || scanner.scan_batch(&batch)).await;
            let _ = done_sender.send(BatchOutcome { size, result }).await;
        });
    }

    fn finish_batch(&mut self, outcome: BatchOutcome) {
        self.active = false;
        match outcome.result {
            Ok(Ok(report)) => debug!("Batch of {} finished: {:?}", outcome.size, report),
            Ok(Err(err)) => error!("Batch of {} paths aborted: {}", outcome.size, err),
            Err(err) => error!("Batch of {} paths panicked: {}", outcome.size, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingScanner {
        in_flight: AtomicBool,
        overlapped: AtomicBool,
        batches: Mutex<Vec<Vec<PathBuf>>>,
        work: Duration,
    }

    impl BatchScanner for RecordingScanner {
        fn scan_batch(&self, paths: &[PathBuf]) -> ScanResult<ScanReport> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(self.work);
            self.batches.lock().unwrap().push(paths.to_vec());
            self.in_flight.store(false, Ordering::SeqCst);
            Ok(ScanReport {
                scanned: paths.len(),
                ..Default::default()
            })
        }
    }

    impl RecordingScanner {
        fn scanned(&self) -> usize {
            self.batches.lock().unwrap().iter().map(Vec::len).sum()
        }
    }

    fn config(delay_ms: u64) -> ScannerConfig {
        ScannerConfig {
            batch_delay: Duration::from_millis(delay_ms),
            max_batch_size: 500,
        }
    }

    async fn wait_for(scanner: &RecordingScanner, total: usize) {
        for _ in 0..500 {
            if scanner.scanned() >= total {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("only {} of {} paths scanned", scanner.scanned(), total);
    }

    #[tokio::test]
    async fn batches_are_sequential_and_capped() {
        let scanner = Arc::new(RecordingScanner {
            work: Duration::from_millis(20),
            ..Default::default()
        });
        let token = CancellationToken::new();
        let service = ScannerService::new(config(200), scanner.clone(), token.clone());
        let handle = service.handle();
        let service_task = tokio::spawn(service.run());

        for i in 0..1200 {
            assert!(handle.submit(PathBuf::from(format!("/music/{:04}.mp3", i))).await);
        }
        wait_for(&scanner, 1200).await;
        token.cancel();
        service_task.await.unwrap();

        let batches = scanner.batches.lock().unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![500, 500, 200]);
        assert!(!scanner.overlapped.load(Ordering::SeqCst));
        assert_eq!(batches[0][0], PathBuf::from("/music/0000.mp3"));
        assert_eq!(batches[2][199], PathBuf::from("/music/1199.mp3"));
    }

    #[tokio::test]
    async fn duplicate_paths_coalesce() {
        let scanner = Arc::new(RecordingScanner::default());
        let token = CancellationToken::new();
        let service = ScannerService::new(config(50), scanner.clone(), token.clone());
        let handle = service.handle();
        let service_task = tokio::spawn(service.run());

        for _ in 0..3 {
            handle.submit(PathBuf::from("/music/a.mp3")).await;
        }
        handle.submit(PathBuf::from("/music/b.mp3")).await;
        wait_for(&scanner, 2).await;
        token.cancel();
        service_task.await.unwrap();

        assert_eq!(
            *scanner.batches.lock().unwrap(),
            vec![vec![PathBuf::from("/music/a.mp3"), PathBuf::from("/music/b.mp3")]]
        );
    }

    struct FixedPaths(Vec<&'static str>);

    #[async_trait::async_trait]
    impl Provider for FixedPaths {
        fn id(&self) -> String {
            "fixed".to_string()
        }

        async fn run(
            &self,
            handle: ScannerHandle,
            _shutdown_token: CancellationToken,
        ) -> anyhow::Result<()> {
            for path in &self.0 {
                handle.submit(PathBuf::from(path)).await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn exits_once_providers_are_done() {
        let scanner = Arc::new(RecordingScanner::default());
        let service = ScannerService::new(config(10), scanner.clone(), CancellationToken::new())
            .exit_when_idle();
        let provider = service.spawn_provider(Arc::new(FixedPaths(vec!["/a.mp3", "/b.mp3", "/c.mp3"])));

        tokio::time::timeout(Duration::from_secs(5), service.run())
            .await
            .unwrap();
        provider.await.unwrap();
        assert_eq!(scanner.scanned(), 3);
    }

    #[tokio::test]
    async fn shutdown_waits_for_batch_in_flight() {
        let scanner = Arc::new(RecordingScanner {
            work: Duration::from_millis(300),
            ..Default::default()
        });
        let token = CancellationToken::new();
        let service = ScannerService::new(config(10), scanner.clone(), token.clone());
        let handle = service.handle();
        let service_task = tokio::spawn(service.run());

        handle.submit(PathBuf::from("/music/slow.mp3")).await;
        while !scanner.in_flight.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        token.cancel();
        service_task.await.unwrap();

        assert_eq!(scanner.scanned(), 1);
    }
}
