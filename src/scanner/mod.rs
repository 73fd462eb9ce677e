mod error;
mod library_scanner;
mod metadata;
mod provider;
mod reconcile;
mod service;

pub use error::{ScanError, ScanResult};
pub use library_scanner::{LibraryScanner, ScanReport};
pub use metadata::{FileStat, TrackMetadata};
pub use provider::{FSWatchProvider, Provider, SingleScanProvider, DEFAULT_WATCH_BUFFER_SIZE};
pub use reconcile::{AlbumKey, DiscKey, Reconciliation, Resolved};
pub use service::{BatchScanner, ScannerConfig, ScannerHandle, ScannerMessage, ScannerService};
