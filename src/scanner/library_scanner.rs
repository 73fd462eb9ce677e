use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::{ScanError, ScanResult};
use super::metadata::{FileStat, TrackMetadata};
use super::reconcile::Reconciliation;
use crate::artwork::{content_checksum, sniff_image_mime, ArtworkStore};
use crate::audio::parse_audio_file;
use crate::library_store::{new_id, File, LibraryStore, Track, MAX_IDS_PER_STATEMENT};

/// Outcome of one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Files decoded and persisted.
    pub scanned: usize,
    /// Files that failed to decode or persist.
    pub skipped: usize,
    /// Paths that could not be stat'ed.
    pub missing: usize,
    /// Known files whose path vanished, removed with their track.
    pub removed: usize,
    pub artists: usize,
    pub albums: usize,
    pub discs: usize,
}

/// Turns batches of paths into library rows.
pub struct LibraryScanner {
    store: Arc<dyn LibraryStore>,
    artwork: ArtworkStore,
}

/// State shared by the files of one batch.
#[derive(Default)]
struct BatchState {
    files_by_inode: HashMap<u64, File>,
    image_ids_by_checksum: HashMap<String, String>,
    reconciliation: Reconciliation,
}

impl LibraryScanner {
    pub fn new(store: Arc<dyn LibraryStore>, artwork: ArtworkStore) -> Self {
        Self { store, artwork }
    }

    /// Scan `paths` and reconcile their owners. Per-file failures are logged
    /// and skipped; only an invariant violation fails the batch.
    pub fn scan_batch(&self, paths: &[PathBuf]) -> ScanResult<ScanReport> {
        info!("Scanning batch of {} paths", paths.len());
        let mut report = ScanReport::default();

        let mut stats = Vec::with_capacity(paths.len());
        let mut vanished = Vec::new();
        for path in paths {
            match FileStat::of(path) {
                Ok(stat) => stats.push((path.as_path(), stat)),
                Err(err) => {
                    debug!("{}", err);
                    report.missing += 1;
                    vanished.push(path.as_path());
                }
            }
        }

        let mut state = BatchState::default();
        let inodes: Vec<u64> = stats.iter().map(|(_, stat)| stat.inode).collect();
        for chunk in inodes.chunks(MAX_IDS_PER_STATEMENT) {
            for file in self.store.find_files_by_inodes(chunk)? {
                state.files_by_inode.insert(file.inode, file);
            }
        }

        for (path, stat) in stats {
            match self.scan_file(path, stat, &mut state) {
                Ok(()) => report.scanned += 1,
                Err(err @ ScanError::Invariant(_)) => return Err(err),
                Err(err) => {
                    warn!("Skipping {:?}: {}", path, err);
                    report.skipped += 1;
                }
            }
        }

        // After the upserts, so a rename seen as old and new path in one
        // batch has already moved the row away from the old path.
        for path in vanished {
            match self.remove_vanished(path) {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(err) => warn!("Failed to remove vanished file {:?}: {}", path, err),
            }
        }

        let resolved = state.reconciliation.resolve(self.store.as_ref())?;
        report.artists = resolved.artists;
        report.albums = resolved.albums;
        report.discs = resolved.discs;

        info!(
            "Batch done: {} scanned, {} skipped, {} missing, {} removed",
            report.scanned, report.skipped, report.missing, report.removed
        );
        Ok(report)
    }

    fn scan_file(&self, path: &Path, stat: FileStat, state: &mut BatchState) -> ScanResult<()> {
        let metadata = parse_audio_file(path).map_err(|source| ScanError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata = TrackMetadata::from_metadata(&metadata, path);

        let file = self.upsert_file(path, stat, state)?;
        let image_id = match &metadata.image {
            Some(data) => self.resolve_image(data, state)?,
            None => None,
        };
        let track = self.upsert_track(&file, &metadata, image_id.clone())?;
        state
            .reconciliation
            .add(&track.id, &metadata, image_id.as_deref());
        Ok(())
    }

    /// The stored row for this inode, written back only when the path or
    /// mtime moved.
    fn upsert_file(&self, path: &Path, stat: FileStat, state: &mut BatchState) -> ScanResult<File> {
        let path = path.to_string_lossy().into_owned();

        if let Some(file) = state.files_by_inode.get_mut(&stat.inode) {
            if file.path != path || file.mtime != stat.mtime {
                file.path = path;
                file.mtime = stat.mtime;
                self.store.update_file(file)?;
            }
            return Ok(file.clone());
        }

        // a different file now lives at this path, its old row is stale
        if let Some(stale) = self.store.find_file_by_path(&path)? {
            debug!("Replacing stale file row {} for {}", stale.id, path);
            self.store.delete_file(&stale.id)?;
        }

        let file = File::new(path, stat.inode, stat.mtime);
        self.store.create_file(&file)?;
        state.files_by_inode.insert(file.inode, file.clone());
        Ok(file)
    }

    fn resolve_image(&self, data: &[u8], state: &mut BatchState) -> ScanResult<Option<String>> {
        let checksum = content_checksum(data);
        if let Some(id) = state.image_ids_by_checksum.get(&checksum) {
            return Ok(Some(id.clone()));
        }

        let Some(mime_type) = sniff_image_mime(data) else {
            debug!("Ignoring {} bytes of unrecognized artwork", data.len());
            return Ok(None);
        };

        let image = self.store.first_or_create_image(&checksum, mime_type)?;
        let image_path = self
            .artwork
            .image_path(&checksum)
            .map_err(anyhow::Error::from)?;
        if !image_path.exists() {
            self.artwork
                .write_image(&checksum, data)
                .map_err(anyhow::Error::from)?;
        }

        state
            .image_ids_by_checksum
            .insert(checksum, image.id.clone());
        Ok(Some(image.id))
    }

    /// Owner columns are cleared here and refilled when the batch resolves.
    fn upsert_track(
        &self,
        file: &File,
        metadata: &TrackMetadata,
        image_id: Option<String>,
    ) -> ScanResult<Track> {
        let existing = self.store.find_track_by_file_id(&file.id)?;
        let track = Track {
            id: existing
                .as_ref()
                .map(|track| track.id.clone())
                .unwrap_or_else(new_id),
            name: metadata.name.clone(),
            position: metadata.position,
            total_tracks: metadata.total_tracks,
            duration: metadata.duration,
            release_date: metadata.release_date,
            original_release_date: metadata.original_release_date,
            file_id: file.id.clone(),
            artist_id: None,
            album_id: None,
            disc_id: None,
            image_id,
        };

        match existing {
            Some(_) => self.store.update_track(&track)?,
            None => self.store.create_track(&track)?,
        }
        Ok(track)
    }

    /// Drop the row of a known file whose path no longer stats.
    fn remove_vanished(&self, path: &Path) -> anyhow::Result<bool> {
        let Some(file) = self.store.find_file_by_path(&path.to_string_lossy())? else {
            return Ok(false);
        };
        info!("Removing vanished file {:?}", path);
        self.store.delete_file(&file.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::flac::test_support::{
        cd_stream_info, encode_picture, encode_stream, encode_stream_info, encode_vorbis_comment,
    };
    use crate::library_store::SqliteLibraryStore;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, 1, 2];

    fn flac(comments: &[(&str, &str)], picture: Option<&[u8]>) -> Vec<u8> {
        let mut blocks = vec![
            (0u8, encode_stream_info(&cd_stream_info(44_100 * 60)).to_vec()),
            (4u8, encode_vorbis_comment("test", comments)),
        ];
        if let Some(data) = picture {
            blocks.push((6u8, encode_picture("image/png", data)));
        }
        encode_stream(&blocks)
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        music: PathBuf,
        store: Arc<SqliteLibraryStore>,
        scanner: LibraryScanner,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir_all(&music).unwrap();
        let store = Arc::new(SqliteLibraryStore::in_memory().unwrap());
        let scanner = LibraryScanner::new(store.clone(), ArtworkStore::new(dir.path().join("art")));
        Fixture {
            _dir: dir,
            music,
            store,
            scanner,
        }
    }

    impl Fixture {
        fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
            let path = self.music.join(name);
            std::fs::write(&path, bytes).unwrap();
            path
        }
    }

    fn tags<'a>(title: &'a str, track: &'a str) -> Vec<(&'a str, &'a str)> {
        vec![
            ("TITLE", title),
            ("ARTIST", "Band"),
            ("ALBUM", "Record"),
            ("TRACKNUMBER", track),
        ]
    }

    #[test]
    fn scans_files_into_linked_rows() {
        let f = fixture();
        let a = f.write("a.flac", &flac(&tags("One", "1"), Some(PNG)));
        let b = f.write("b.flac", &flac(&tags("Two", "2"), Some(PNG)));

        let report = f.scanner.scan_batch(&[a, b]).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.artists, 1);
        assert_eq!(report.albums, 1);
        assert_eq!(report.discs, 1);
        assert_eq!(f.store.get_images_count(), 1);

        let album = &f.store.list_albums(10, 0).unwrap()[0];
        let tracks = f.store.list_tracks_for_album(&album.id).unwrap();
        let names: Vec<&str> = tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["One", "Two"]);
        assert!(tracks.iter().all(|t| t.image_id == album.image_id));
        assert_eq!(tracks[0].duration, 60.0);

        let checksum = content_checksum(PNG);
        assert_eq!(f.scanner.artwork.read_image(&checksum).unwrap(), PNG);
    }

    #[test]
    fn rescanning_is_idempotent() {
        let f = fixture();
        let a = f.write("a.flac", &flac(&tags("One", "1"), None));
        f.scanner.scan_batch(&[a.clone()]).unwrap();
        let first = f.store.list_artists(10, 0).unwrap();

        f.scanner.scan_batch(&[a.clone(), a]).unwrap();
        assert_eq!(f.store.get_tracks_count(), 1);
        assert_eq!(f.store.get_albums_count(), 1);
        assert_eq!(f.store.list_artists(10, 0).unwrap(), first);
    }

    #[test]
    fn undecodable_files_are_skipped() {
        let f = fixture();
        let good = f.write("good.flac", &flac(&tags("One", "1"), None));
        let bad = f.write("bad.flac", b"not a flac stream");
        let other = f.write("notes.txt", b"hello");

        let report = f.scanner.scan_batch(&[good, bad, other]).unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(f.store.get_tracks_count(), 1);
    }

    #[test]
    fn vanished_files_are_removed() {
        let f = fixture();
        let a = f.write("a.flac", &flac(&tags("One", "1"), None));
        f.scanner.scan_batch(&[a.clone()]).unwrap();
        assert_eq!(f.store.get_tracks_count(), 1);

        std::fs::remove_file(&a).unwrap();
        let report = f.scanner.scan_batch(&[a.clone()]).unwrap();
        assert_eq!(report.missing, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(f.store.get_tracks_count(), 0);

        let report = f.scanner.scan_batch(&[a]).unwrap();
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn renamed_file_keeps_its_track() {
        let f = fixture();
        let a = f.write("a.flac", &flac(&tags("One", "1"), None));
        f.scanner.scan_batch(&[a.clone()]).unwrap();
        let album_id = f.store.list_albums(1, 0).unwrap()[0].id.clone();
        let track_id = f.store.list_tracks_for_album(&album_id).unwrap()[0].id.clone();

        let moved = f.music.join("moved.flac");
        std::fs::rename(&a, &moved).unwrap();
        f.scanner.scan_batch(&[moved.clone()]).unwrap();

        let file = f
            .store
            .find_file_by_path(&moved.to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(
            f.store.find_track_by_file_id(&file.id).unwrap().unwrap().id,
            track_id
        );
        assert_eq!(f.store.get_tracks_count(), 1);
    }

    #[test]
    fn rename_with_both_paths_in_one_batch_keeps_its_track() {
        let f = fixture();
        let a = f.write("a.flac", &flac(&tags("One", "1"), None));
        f.scanner.scan_batch(&[a.clone()]).unwrap();
        let before = f
            .store
            .find_file_by_path(&a.to_string_lossy())
            .unwrap()
            .unwrap();
        let track_id = f.store.find_track_by_file_id(&before.id).unwrap().unwrap().id;

        let moved = f.music.join("moved.flac");
        std::fs::rename(&a, &moved).unwrap();
        let report = f.scanner.scan_batch(&[a.clone(), moved.clone()]).unwrap();
        assert_eq!(report.missing, 1);
        assert_eq!(report.removed, 0);

        let after = f
            .store
            .find_file_by_path(&moved.to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(
            f.store.find_track_by_file_id(&after.id).unwrap().unwrap().id,
            track_id
        );
        assert!(f.store.find_file_by_path(&a.to_string_lossy()).unwrap().is_none());
        assert_eq!(f.store.get_tracks_count(), 1);
    }

    #[test]
    fn unrecognized_artwork_is_not_stored() {
        let f = fixture();
        let a = f.write("a.flac", &flac(&tags("One", "1"), Some(b"garbage bytes")));
        f.scanner.scan_batch(&[a]).unwrap();
        assert_eq!(f.store.get_images_count(), 0);
        assert_eq!(f.store.get_tracks_count(), 1);
    }
}
