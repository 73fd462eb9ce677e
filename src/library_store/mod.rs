mod events;
mod models;
mod schema;
mod sqlite_library_store;

pub use events::*;
pub use models::*;
pub use schema::LIBRARY_VERSIONED_SCHEMAS;
pub use sqlite_library_store::SqliteLibraryStore;

use std::sync::Arc;

use anyhow::Result;

/// Upper bound on ids bound into a single `IN (...)` list.
pub const MAX_IDS_PER_STATEMENT: usize = 500;

/// Kind of entity the search index covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchableContentType {
    Artist,
    Album,
    Track,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchableItem {
    pub id: String,
    pub name: String,
    pub content_type: SearchableContentType,
}

pub trait LibraryStore: Send + Sync {
    // Files
    fn find_files_by_inodes(&self, inodes: &[u64]) -> Result<Vec<File>>;
    fn find_file_by_path(&self, path: &str) -> Result<Option<File>>;
    fn create_file(&self, file: &File) -> Result<()>;
    fn update_file(&self, file: &File) -> Result<()>;
    /// Deletes the file row; its track goes with it. Returns false if unknown.
    fn delete_file(&self, id: &str) -> Result<bool>;

    // Images
    fn first_or_create_image(&self, checksum: &str, mime_type: &str) -> Result<Image>;
    fn get_image(&self, id: &str) -> Result<Option<Image>>;

    // Tracks
    fn find_track_by_file_id(&self, file_id: &str) -> Result<Option<Track>>;
    fn get_track(&self, id: &str) -> Result<Option<Track>>;
    fn create_track(&self, track: &Track) -> Result<()>;
    fn update_track(&self, track: &Track) -> Result<()>;
    fn delete_track(&self, id: &str) -> Result<bool>;
    /// Point every listed track at `owner_id` in one statement.
    fn set_track_owner(&self, owner: TrackOwner, owner_id: &str, track_ids: &[String])
        -> Result<usize>;
    fn list_tracks_for_album(&self, album_id: &str) -> Result<Vec<Track>>;

    // Artists, albums, discs: looked up by natural key, created when missing
    fn first_or_create_artist(&self, name: &str) -> Result<Artist>;
    fn first_or_create_album(&self, candidate: &Album) -> Result<Album>;
    fn first_or_create_disc(&self, candidate: &Disc) -> Result<Disc>;
    fn get_artist(&self, id: &str) -> Result<Option<Artist>>;
    fn get_album(&self, id: &str) -> Result<Option<Album>>;
    fn get_disc(&self, id: &str) -> Result<Option<Disc>>;
    fn list_artists(&self, limit: usize, offset: usize) -> Result<Vec<Artist>>;
    fn list_albums(&self, limit: usize, offset: usize) -> Result<Vec<Album>>;

    // Counts
    fn get_artists_count(&self) -> usize;
    fn get_albums_count(&self) -> usize;
    fn get_tracks_count(&self) -> usize;
    fn get_images_count(&self) -> usize;

    /// Every row of one searchable kind, for building the search index.
    fn get_searchable_content(
        &self,
        content_type: SearchableContentType,
    ) -> Result<Vec<SearchableItem>>;

    fn register_listener(&self, listener: Arc<dyn LibraryEventListener>);
}
