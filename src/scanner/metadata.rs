//! Normalized view of a decoded file, as the scanner persists it.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::error::{ScanError, ScanResult};
use crate::audio::Metadata;

/// Identity of a file on disk at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub inode: u64,
    pub mtime: DateTime<Utc>,
}

impl FileStat {
    pub fn of(path: &Path) -> ScanResult<FileStat> {
        let stat_failed = |source| ScanError::StatFailed {
            path: path.to_path_buf(),
            source,
        };
        let metadata = std::fs::metadata(path).map_err(stat_failed)?;
        let modified = metadata.modified().map_err(stat_failed)?;
        Ok(FileStat {
            inode: metadata.ino(),
            mtime: DateTime::<Utc>::from(modified),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub name: String,
    pub position: u32,
    pub total_tracks: u32,
    pub artist_name: Option<String>,
    /// Falls back to the track artist.
    pub album_artist_name: Option<String>,
    pub album_name: Option<String>,
    pub release_date: Option<NaiveDateTime>,
    pub original_release_date: Option<NaiveDateTime>,
    pub disc_name: Option<String>,
    /// 1 when the tags carry no disc number.
    pub disc_position: u32,
    pub total_discs: u32,
    pub duration: f64,
    /// First embedded picture.
    pub image: Option<Vec<u8>>,
}

impl TrackMetadata {
    pub fn from_metadata(metadata: &dyn Metadata, path: &Path) -> TrackMetadata {
        let name = metadata.track_name().unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let artist_name = metadata.artist_name();
        let album_artist_name = metadata.album_artist_name().or_else(|| artist_name.clone());

        let release_date = metadata.release_date();
        let original_release_date = metadata.original_release_date();

        let disc_position = match metadata.disc_position() {
            0 => 1,
            position => position,
        };

        TrackMetadata {
            name,
            position: metadata.track_position(),
            total_tracks: metadata.total_tracks(),
            artist_name,
            album_artist_name,
            album_name: metadata.album_name(),
            release_date: release_date.or(original_release_date),
            original_release_date: original_release_date.or(release_date),
            disc_name: metadata.disc_name(),
            disc_position,
            total_discs: metadata.total_discs().max(disc_position),
            duration: metadata.duration(),
            image: metadata.images().first().map(|image| image.to_vec()),
        }
    }
}
