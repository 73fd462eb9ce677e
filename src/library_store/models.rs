//! Persisted library entities.
//!
//! Every entity has a UUID v4 string id and a natural key that the store
//! enforces with a unique constraint.

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A file on disk, identified by its inode.
#[derive(Clone, Debug, PartialEq)]
pub struct File {
    pub id: String,
    pub path: String,
    pub inode: u64,
    pub mtime: DateTime<Utc>,
}

impl File {
    pub fn new(path: impl Into<String>, inode: u64, mtime: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            path: path.into(),
            inode,
            mtime,
        }
    }
}

/// Cover art, identified by the checksum of its bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub id: String,
    pub checksum: String,
    pub mime_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

/// Natural key: `(name, artist_id)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub release_date: Option<NaiveDateTime>,
    pub original_release_date: Option<NaiveDateTime>,
    pub total_discs: u32,
    pub artist_id: String,
    pub image_id: Option<String>,
}

/// Natural key: `(position, album_id)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Disc {
    pub id: String,
    pub name: Option<String>,
    pub position: u32,
    pub album_id: String,
}

/// One track per file. The owner ids stay `None` until the scan batch that
/// created the track resolves its artist, album and disc.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub position: u32,
    pub total_tracks: u32,
    pub duration: f64,
    pub release_date: Option<NaiveDateTime>,
    pub original_release_date: Option<NaiveDateTime>,
    pub file_id: String,
    pub artist_id: Option<String>,
    pub album_id: Option<String>,
    pub disc_id: Option<String>,
    pub image_id: Option<String>,
}

/// Foreign keys on `tracks` that are backfilled in bulk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackOwner {
    Artist,
    Album,
    Disc,
}

impl TrackOwner {
    pub fn column(&self) -> &'static str {
        match self {
            TrackOwner::Artist => "artist_id",
            TrackOwner::Album => "album_id",
            TrackOwner::Disc => "disc_id",
        }
    }
}
