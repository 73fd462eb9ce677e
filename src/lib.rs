//! Tenor Library
//!
//! Catalogs a music directory: decodes audio tags, reconciles them into
//! artists, albums, discs and tracks, and keeps a prefix search index over them.

pub mod artwork;
pub mod audio;
pub mod config;
pub mod library_store;
pub mod scanner;
pub mod search;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use artwork::ArtworkStore;
pub use library_store::{LibraryStore, SqliteLibraryStore};
pub use scanner::{LibraryScanner, ScannerConfig, ScannerService};
pub use search::SearchService;
