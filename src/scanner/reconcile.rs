//! Per-batch owner bookkeeping.
//!
//! While a batch is scanned every track id is filed under the artist, album
//! and disc its tags name. Once the batch is done the keys are turned into
//! rows and the owner columns on `tracks` are filled in bulk.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDateTime;
use tracing::debug;

use super::error::{ScanError, ScanResult};
use super::metadata::TrackMetadata;
use crate::library_store::{new_id, Album, Disc, LibraryStore, TrackOwner, MAX_IDS_PER_STATEMENT};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlbumKey {
    pub name: String,
    pub album_artist: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiscKey {
    pub album: AlbumKey,
    pub position: u32,
}

/// Album fields come from the first track seen for the album.
#[derive(Debug)]
struct PendingAlbum {
    release_date: Option<NaiveDateTime>,
    original_release_date: Option<NaiveDateTime>,
    total_discs: u32,
    image_id: Option<String>,
    track_ids: Vec<String>,
}

#[derive(Debug)]
struct PendingDisc {
    name: Option<String>,
    track_ids: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub artists: usize,
    pub albums: usize,
    pub discs: usize,
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    artists: BTreeMap<String, Vec<String>>,
    album_artists: BTreeSet<String>,
    albums: BTreeMap<AlbumKey, PendingAlbum>,
    discs: BTreeMap<DiscKey, PendingDisc>,
}

/// Tag value used as a natural key. Missing tags key on the empty name.
fn key_name(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

impl Reconciliation {
    /// File `track_id` under its artist, album and disc. Tracks without
    /// those tags share the rows keyed by the empty name.
    pub fn add(&mut self, track_id: &str, metadata: &TrackMetadata, image_id: Option<&str>) {
        self.artists
            .entry(key_name(&metadata.artist_name))
            .or_default()
            .push(track_id.to_string());

        let album_artist = key_name(&metadata.album_artist_name);
        self.album_artists.insert(album_artist.clone());

        let album_key = AlbumKey {
            name: key_name(&metadata.album_name),
            album_artist,
        };
        let pending = self
            .albums
            .entry(album_key.clone())
            .or_insert_with(|| PendingAlbum {
                release_date: metadata.release_date,
                original_release_date: metadata.original_release_date,
                total_discs: metadata.total_discs,
                image_id: None,
                track_ids: Vec::new(),
            });
        pending.track_ids.push(track_id.to_string());
        pending.total_discs = pending.total_discs.max(metadata.total_discs);
        if pending.image_id.is_none() {
            pending.image_id = image_id.map(str::to_string);
        }

        self.discs
            .entry(DiscKey {
                album: album_key,
                position: metadata.disc_position,
            })
            .or_insert_with(|| PendingDisc {
                name: metadata.disc_name.clone(),
                track_ids: Vec::new(),
            })
            .track_ids
            .push(track_id.to_string());
    }

    /// Create or find every owner row and point the collected tracks at it.
    /// Artists resolve first, then album artists, albums and discs, each
    /// stage depending on the rows of the previous one.
    pub fn resolve(self, store: &dyn LibraryStore) -> ScanResult<Resolved> {
        let mut artist_ids: HashMap<String, String> = HashMap::new();
        for (name, track_ids) in &self.artists {
            let artist = store.first_or_create_artist(name)?;
            assign(store, TrackOwner::Artist, &artist.id, track_ids)?;
            artist_ids.insert(name.clone(), artist.id);
        }

        for name in &self.album_artists {
            if !artist_ids.contains_key(name) {
                let artist = store.first_or_create_artist(name)?;
                artist_ids.insert(name.clone(), artist.id);
            }
        }

        let mut album_ids: HashMap<AlbumKey, String> = HashMap::new();
        for (key, pending) in self.albums {
            let artist_id = artist_ids.get(&key.album_artist).ok_or_else(|| {
                ScanError::Invariant(format!(
                    "album {:?} has no resolved artist {:?}",
                    key.name, key.album_artist
                ))
            })?;
            let album = store.first_or_create_album(&Album {
                id: new_id(),
                name: key.name.clone(),
                release_date: pending.release_date,
                original_release_date: pending.original_release_date,
                total_discs: pending.total_discs,
                artist_id: artist_id.clone(),
                image_id: pending.image_id,
            })?;
            assign(store, TrackOwner::Album, &album.id, &pending.track_ids)?;
            album_ids.insert(key, album.id);
        }

        let mut discs = 0;
        for (key, pending) in self.discs {
            let album_id = album_ids.get(&key.album).ok_or_else(|| {
                ScanError::Invariant(format!(
                    "disc {} of {:?} has no resolved album",
                    key.position, key.album.name
                ))
            })?;
            let disc = store.first_or_create_disc(&Disc {
                id: new_id(),
                name: pending.name,
                position: key.position,
                album_id: album_id.clone(),
            })?;
            assign(store, TrackOwner::Disc, &disc.id, &pending.track_ids)?;
            discs += 1;
        }

        let resolved = Resolved {
            artists: artist_ids.len(),
            albums: album_ids.len(),
            discs,
        };
        debug!("Resolved owners: {:?}", resolved);
        Ok(resolved)
    }
}

fn assign(
    store: &dyn LibraryStore,
    owner: TrackOwner,
    owner_id: &str,
    track_ids: &[String],
) -> ScanResult<()> {
    for chunk in track_ids.chunks(MAX_IDS_PER_STATEMENT) {
        store.set_track_owner(owner, owner_id, chunk)?;
    }
    Ok(())
}
