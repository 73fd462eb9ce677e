//! SQLite-backed library store.
//!
//! A single connection behind a mutex. Write operations collect their change
//! events while holding the lock and hand them to the listeners after it is
//! released, so a listener may read from the store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::events::{ChangeKind, ChangedEntity, EventDispatcher, LibraryEvent, LibraryEventListener};
use super::models::*;
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use super::{LibraryStore, SearchableContentType, SearchableItem, MAX_IDS_PER_STATEMENT};
use crate::sqlite_persistence::migrate_if_needed;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const FILE_COLUMNS: &str = "id, path, inode, mtime";
const IMAGE_COLUMNS: &str = "id, checksum, mime_type";
const ARTIST_COLUMNS: &str = "id, name";
const ALBUM_COLUMNS: &str =
    "id, name, release_date, original_release_date, total_discs, artist_id, image_id";
const DISC_COLUMNS: &str = "id, name, position, album_id";
const TRACK_COLUMNS: &str = "t.id, t.name, t.position, t.total_tracks, t.duration, \
     t.release_date, t.original_release_date, t.file_id, t.artist_id, t.album_id, t.disc_id, t.image_id";

fn date_to_sql(date: &Option<NaiveDateTime>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn date_from_sql(value: Option<String>) -> Option<NaiveDateTime> {
    value.and_then(|v| NaiveDateTime::parse_from_str(&v, DATE_FORMAT).ok())
}

fn mtime_to_sql(mtime: &DateTime<Utc>) -> String {
    mtime.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn file_from_row(row: &Row) -> rusqlite::Result<File> {
    let mtime: String = row.get(3)?;
    let mtime = DateTime::parse_from_rfc3339(&mtime)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    Ok(File {
        id: row.get(0)?,
        path: row.get(1)?,
        // stored as the same 64 bits, sqlite integers are signed
        inode: row.get::<_, i64>(2)? as u64,
        mtime,
    })
}

fn image_from_row(row: &Row) -> rusqlite::Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        checksum: row.get(1)?,
        mime_type: row.get(2)?,
    })
}

fn artist_from_row(row: &Row) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn album_from_row(row: &Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        name: row.get(1)?,
        release_date: date_from_sql(row.get(2)?),
        original_release_date: date_from_sql(row.get(3)?),
        total_discs: row.get(4)?,
        artist_id: row.get(5)?,
        image_id: row.get(6)?,
    })
}

fn disc_from_row(row: &Row) -> rusqlite::Result<Disc> {
    Ok(Disc {
        id: row.get(0)?,
        name: row.get(1)?,
        position: row.get(2)?,
        album_id: row.get(3)?,
    })
}

fn track_from_row(row: &Row) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        name: row.get(1)?,
        position: row.get(2)?,
        total_tracks: row.get(3)?,
        duration: row.get(4)?,
        release_date: date_from_sql(row.get(5)?),
        original_release_date: date_from_sql(row.get(6)?),
        file_id: row.get(7)?,
        artist_id: row.get(8)?,
        album_id: row.get(9)?,
        disc_id: row.get(10)?,
        image_id: row.get(11)?,
    })
}

#[derive(Clone)]
pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
    events: Arc<EventDispatcher>,
}

impl SqliteLibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let mut conn = Connection::open(path)
            .with_context(|| format!("Failed to open library database {:?}", path))?;
        migrate_if_needed(&mut conn, LIBRARY_VERSIONED_SCHEMAS, "library")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self::from_connection(conn);
        info!(
            "Opened library {:?}: {} artists, {} albums, {} tracks",
            path,
            store.get_artists_count(),
            store.get_albums_count(),
            store.get_tracks_count()
        );
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate_if_needed(&mut conn, LIBRARY_VERSIONED_SCHEMAS, "library")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            events: Arc::new(EventDispatcher::default()),
        }
    }

    fn query_one<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        map: fn(&Row) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(sql, params, map).optional()?)
    }

    fn query_many<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        map: fn(&Row) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<Result<Vec<T>, _>>()?;
        Ok(rows)
    }

    /// Insert `insert_params` unless a row with the same natural key exists,
    /// then read back whichever row holds that key.
    fn first_or_create<T: Clone>(
        &self,
        insert_sql: &str,
        insert_params: &[&dyn ToSql],
        select_sql: &str,
        select_params: &[&dyn ToSql],
        map: fn(&Row) -> rusqlite::Result<T>,
        wrap: fn(T) -> ChangedEntity,
    ) -> Result<T> {
        let (row, created) = {
            let conn = self.conn.lock().unwrap();
            let inserted = conn.execute(insert_sql, insert_params)?;
            let row = conn.query_row(select_sql, select_params, map)?;
            (row, inserted == 1)
        };
        if created {
            self.events.dispatch(vec![LibraryEvent::new(
                ChangeKind::Created,
                wrap(row.clone()),
            )]);
        }
        Ok(row)
    }

    fn count(&self, table: &str) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get::<_, i64>(0)
        })
        .unwrap_or(0) as usize
    }

    fn delete_track_rows(conn: &Connection, track: Option<Track>) -> Result<Vec<LibraryEvent>> {
        let Some(track) = track else {
            return Ok(Vec::new());
        };
        conn.execute("DELETE FROM tracks WHERE id = ?1", params![track.id])?;
        Ok(vec![LibraryEvent::new(
            ChangeKind::Deleted,
            ChangedEntity::Track(track),
        )])
    }

    fn track_by_column(conn: &Connection, column: &str, value: &str) -> Result<Option<Track>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM tracks t WHERE t.{} = ?1", TRACK_COLUMNS, column),
                params![value],
                track_from_row,
            )
            .optional()?)
    }
}

impl LibraryStore for SqliteLibraryStore {
    fn find_files_by_inodes(&self, inodes: &[u64]) -> Result<Vec<File>> {
        let mut files = Vec::with_capacity(inodes.len());
        for chunk in inodes.chunks(MAX_IDS_PER_STATEMENT) {
            let values: Vec<i64> = chunk.iter().map(|&inode| inode as i64).collect();
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM files WHERE inode IN ({})",
                FILE_COLUMNS,
                placeholders(values.len())
            ))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), file_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            files.extend(rows);
        }
        Ok(files)
    }

    fn find_file_by_path(&self, path: &str) -> Result<Option<File>> {
        self.query_one(
            &format!("SELECT {} FROM files WHERE path = ?1", FILE_COLUMNS),
            &[&path],
            file_from_row,
        )
    }

    fn create_file(&self, file: &File) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO files (id, path, inode, mtime) VALUES (?1, ?2, ?3, ?4)",
                params![file.id, file.path, file.inode as i64, mtime_to_sql(&file.mtime)],
            )
            .with_context(|| format!("Failed to create file row for {}", file.path))?;
        }
        self.events.dispatch(vec![LibraryEvent::new(
            ChangeKind::Created,
            ChangedEntity::File(file.clone()),
        )]);
        Ok(())
    }

    fn update_file(&self, file: &File) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap();
            let updated = conn.execute(
                "UPDATE files SET path = ?2, inode = ?3, mtime = ?4 WHERE id = ?1",
                params![file.id, file.path, file.inode as i64, mtime_to_sql(&file.mtime)],
            )?;
            if updated == 0 {
                bail!("File {} not found", file.id);
            }
        }
        self.events.dispatch(vec![LibraryEvent::new(
            ChangeKind::Updated,
            ChangedEntity::File(file.clone()),
        )]);
        Ok(())
    }

    fn delete_file(&self, id: &str) -> Result<bool> {
        let events = {
            let conn = self.conn.lock().unwrap();
            let Some(file) = conn
                .query_row(
                    &format!("SELECT {} FROM files WHERE id = ?1", FILE_COLUMNS),
                    params![id],
                    file_from_row,
                )
                .optional()?
            else {
                return Ok(false);
            };
            let track = Self::track_by_column(&conn, "file_id", id)?;
            let mut events = Self::delete_track_rows(&conn, track)?;
            conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
            events.push(LibraryEvent::new(ChangeKind::Deleted, ChangedEntity::File(file)));
            events
        };
        self.events.dispatch(events);
        Ok(true)
    }

    fn first_or_create_image(&self, checksum: &str, mime_type: &str) -> Result<Image> {
        let id = new_id();
        self.first_or_create(
            "INSERT INTO images (id, checksum, mime_type) VALUES (?1, ?2, ?3) \
             ON CONFLICT(checksum) DO NOTHING",
            &[&id, &checksum, &mime_type],
            &format!("SELECT {} FROM images WHERE checksum = ?1", IMAGE_COLUMNS),
            &[&checksum],
            image_from_row,
            ChangedEntity::Image,
        )
    }

    fn get_image(&self, id: &str) -> Result<Option<Image>> {
        self.query_one(
            &format!("SELECT {} FROM images WHERE id = ?1", IMAGE_COLUMNS),
            &[&id],
            image_from_row,
        )
    }

    fn find_track_by_file_id(&self, file_id: &str) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        Self::track_by_column(&conn, "file_id", file_id)
    }

    fn get_track(&self, id: &str) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        Self::track_by_column(&conn, "id", id)
    }

    fn create_track(&self, track: &Track) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO tracks (id, name, position, total_tracks, duration, release_date, \
                 original_release_date, file_id, artist_id, album_id, disc_id, image_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    track.id,
                    track.name,
                    track.position,
                    track.total_tracks,
                    track.duration,
                    date_to_sql(&track.release_date),
                    date_to_sql(&track.original_release_date),
                    track.file_id,
                    track.artist_id,
                    track.album_id,
                    track.disc_id,
                    track.image_id,
                ],
            )
            .with_context(|| format!("Failed to create track {}", track.id))?;
        }
        self.events.dispatch(vec![LibraryEvent::new(
            ChangeKind::Created,
            ChangedEntity::Track(track.clone()),
        )]);
        Ok(())
    }

    fn update_track(&self, track: &Track) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap();
            let updated = conn.execute(
                "UPDATE tracks SET name = ?2, position = ?3, total_tracks = ?4, duration = ?5, \
                 release_date = ?6, original_release_date = ?7, file_id = ?8, artist_id = ?9, \
                 album_id = ?10, disc_id = ?11, image_id = ?12 WHERE id = ?1",
                params![
                    track.id,
                    track.name,
                    track.position,
                    track.total_tracks,
                    track.duration,
                    date_to_sql(&track.release_date),
                    date_to_sql(&track.original_release_date),
                    track.file_id,
                    track.artist_id,
                    track.album_id,
                    track.disc_id,
                    track.image_id,
                ],
            )?;
            if updated == 0 {
                bail!("Track {} not found", track.id);
            }
        }
        self.events.dispatch(vec![LibraryEvent::new(
            ChangeKind::Updated,
            ChangedEntity::Track(track.clone()),
        )]);
        Ok(())
    }

    fn delete_track(&self, id: &str) -> Result<bool> {
        let events = {
            let conn = self.conn.lock().unwrap();
            let track = Self::track_by_column(&conn, "id", id)?;
            Self::delete_track_rows(&conn, track)?
        };
        let deleted = !events.is_empty();
        self.events.dispatch(events);
        Ok(deleted)
    }

    fn set_track_owner(
        &self,
        owner: TrackOwner,
        owner_id: &str,
        track_ids: &[String],
    ) -> Result<usize> {
        if track_ids.is_empty() {
            return Ok(0);
        }

        let (updated, tracks) = {
            let conn = self.conn.lock().unwrap();
            let id_list = placeholders(track_ids.len());

            let mut values: Vec<&dyn ToSql> = Vec::with_capacity(track_ids.len() + 1);
            values.push(&owner_id);
            values.extend(track_ids.iter().map(|id| id as &dyn ToSql));
            let updated = conn.execute(
                &format!(
                    "UPDATE tracks SET {} = ? WHERE id IN ({})",
                    owner.column(),
                    id_list
                ),
                values.as_slice(),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tracks t WHERE t.id IN ({})",
                TRACK_COLUMNS, id_list
            ))?;
            let tracks = stmt
                .query_map(params_from_iter(track_ids.iter()), track_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            (updated, tracks)
        };

        debug!(
            "Set {} = {} on {} tracks",
            owner.column(),
            owner_id,
            updated
        );
        self.events.dispatch(
            tracks
                .into_iter()
                .map(|track| LibraryEvent::new(ChangeKind::Updated, ChangedEntity::Track(track)))
                .collect(),
        );
        Ok(updated)
    }

    fn list_tracks_for_album(&self, album_id: &str) -> Result<Vec<Track>> {
        self.query_many(
            &format!(
                "SELECT {} FROM tracks t LEFT JOIN discs d ON d.id = t.disc_id \
                 WHERE t.album_id = ?1 ORDER BY d.position, t.position, t.name",
                TRACK_COLUMNS
            ),
            &[&album_id],
            track_from_row,
        )
    }

    fn first_or_create_artist(&self, name: &str) -> Result<Artist> {
        let id = new_id();
        self.first_or_create(
            "INSERT INTO artists (id, name) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
            &[&id, &name],
            &format!("SELECT {} FROM artists WHERE name = ?1", ARTIST_COLUMNS),
            &[&name],
            artist_from_row,
            ChangedEntity::Artist,
        )
    }

    fn first_or_create_album(&self, candidate: &Album) -> Result<Album> {
        self.first_or_create(
            "INSERT INTO albums (id, name, release_date, original_release_date, total_discs, \
             artist_id, image_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(name, artist_id) DO NOTHING",
            &[
                &candidate.id,
                &candidate.name,
                &date_to_sql(&candidate.release_date),
                &date_to_sql(&candidate.original_release_date),
                &candidate.total_discs,
                &candidate.artist_id,
                &candidate.image_id,
            ],
            &format!(
                "SELECT {} FROM albums WHERE name = ?1 AND artist_id = ?2",
                ALBUM_COLUMNS
            ),
            &[&candidate.name, &candidate.artist_id],
            album_from_row,
            ChangedEntity::Album,
        )
    }

    fn first_or_create_disc(&self, candidate: &Disc) -> Result<Disc> {
        self.first_or_create(
            "INSERT INTO discs (id, name, position, album_id) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(position, album_id) DO NOTHING",
            &[
                &candidate.id,
                &candidate.name,
                &candidate.position,
                &candidate.album_id,
            ],
            &format!(
                "SELECT {} FROM discs WHERE position = ?1 AND album_id = ?2",
                DISC_COLUMNS
            ),
            &[&candidate.position, &candidate.album_id],
            disc_from_row,
            ChangedEntity::Disc,
        )
    }

    fn get_artist(&self, id: &str) -> Result<Option<Artist>> {
        self.query_one(
            &format!("SELECT {} FROM artists WHERE id = ?1", ARTIST_COLUMNS),
            &[&id],
            artist_from_row,
        )
    }

    fn get_album(&self, id: &str) -> Result<Option<Album>> {
        self.query_one(
            &format!("SELECT {} FROM albums WHERE id = ?1", ALBUM_COLUMNS),
            &[&id],
            album_from_row,
        )
    }

    fn get_disc(&self, id: &str) -> Result<Option<Disc>> {
        self.query_one(
            &format!("SELECT {} FROM discs WHERE id = ?1", DISC_COLUMNS),
            &[&id],
            disc_from_row,
        )
    }

    fn list_artists(&self, limit: usize, offset: usize) -> Result<Vec<Artist>> {
        self.query_many(
            &format!(
                "SELECT {} FROM artists ORDER BY name, id LIMIT ?1 OFFSET ?2",
                ARTIST_COLUMNS
            ),
            &[&(limit as i64), &(offset as i64)],
            artist_from_row,
        )
    }

    fn list_albums(&self, limit: usize, offset: usize) -> Result<Vec<Album>> {
        self.query_many(
            &format!(
                "SELECT {} FROM albums ORDER BY name, id LIMIT ?1 OFFSET ?2",
                ALBUM_COLUMNS
            ),
            &[&(limit as i64), &(offset as i64)],
            album_from_row,
        )
    }

    fn get_artists_count(&self) -> usize {
        self.count("artists")
    }

    fn get_albums_count(&self) -> usize {
        self.count("albums")
    }

    fn get_tracks_count(&self) -> usize {
        self.count("tracks")
    }

    fn get_images_count(&self) -> usize {
        self.count("images")
    }

    fn get_searchable_content(
        &self,
        content_type: SearchableContentType,
    ) -> Result<Vec<SearchableItem>> {
        let table = match content_type {
            SearchableContentType::Artist => "artists",
            SearchableContentType::Album => "albums",
            SearchableContentType::Track => "tracks",
        };
        let rows = self.query_many(
            &format!("SELECT id, name FROM {}", table),
            &[],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;
        info!("Loaded {} {} for indexing", rows.len(), table);
        Ok(rows
            .into_iter()
            .map(|(id, name)| SearchableItem {
                id,
                name,
                content_type,
            })
            .collect())
    }

    fn register_listener(&self, listener: Arc<dyn LibraryEventListener>) {
        self.events.register(listener);
    }
}
