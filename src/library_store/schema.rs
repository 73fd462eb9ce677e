//! SQLite schema for the library database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, ForeignKey, OnDelete, SqlType, Table, VersionedSchema};

const FILES_TABLE: Table = Table {
    name: "files",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!("inode", &SqlType::Integer, non_null = true),
        sqlite_column!("mtime", &SqlType::Text, non_null = true), // RFC 3339, nanosecond precision
    ],
    indices: &[("idx_files_path", "path")],
    unique_constraints: &[&["inode"]],
};

const IMAGES_TABLE: Table = Table {
    name: "images",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("checksum", &SqlType::Text, non_null = true),
        sqlite_column!("mime_type", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["checksum"]],
};

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("release_date", &SqlType::Text),
        sqlite_column!("original_release_date", &SqlType::Text),
        sqlite_column!(
            "total_discs",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "artists",
                foreign_column: "id",
                on_delete: OnDelete::Cascade,
            })
        ),
        sqlite_column!(
            "image_id",
            &SqlType::Text,
            foreign_key = Some(&ForeignKey {
                foreign_table: "images",
                foreign_column: "id",
                on_delete: OnDelete::SetNull,
            })
        ),
    ],
    indices: &[("idx_albums_artist", "artist_id")],
    unique_constraints: &[&["name", "artist_id"]],
};

const DISCS_TABLE: Table = Table {
    name: "discs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "album_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "albums",
                foreign_column: "id",
                on_delete: OnDelete::Cascade,
            })
        ),
    ],
    indices: &[],
    unique_constraints: &[&["position", "album_id"]],
};

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("total_tracks", &SqlType::Integer, non_null = true),
        sqlite_column!("duration", &SqlType::Real, non_null = true),
        sqlite_column!("release_date", &SqlType::Text),
        sqlite_column!("original_release_date", &SqlType::Text),
        sqlite_column!(
            "file_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "files",
                foreign_column: "id",
                on_delete: OnDelete::Cascade,
            })
        ),
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            foreign_key = Some(&ForeignKey {
                foreign_table: "artists",
                foreign_column: "id",
                on_delete: OnDelete::SetNull,
            })
        ),
        sqlite_column!(
            "album_id",
            &SqlType::Text,
            foreign_key = Some(&ForeignKey {
                foreign_table: "albums",
                foreign_column: "id",
                on_delete: OnDelete::SetNull,
            })
        ),
        sqlite_column!(
            "disc_id",
            &SqlType::Text,
            foreign_key = Some(&ForeignKey {
                foreign_table: "discs",
                foreign_column: "id",
                on_delete: OnDelete::SetNull,
            })
        ),
        sqlite_column!(
            "image_id",
            &SqlType::Text,
            foreign_key = Some(&ForeignKey {
                foreign_table: "images",
                foreign_column: "id",
                on_delete: OnDelete::SetNull,
            })
        ),
    ],
    indices: &[
        ("idx_tracks_artist", "artist_id"),
        ("idx_tracks_album", "album_id"),
        ("idx_tracks_disc", "disc_id"),
    ],
    unique_constraints: &[&["file_id"]],
};

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        FILES_TABLE,
        IMAGES_TABLE,
        ARTISTS_TABLE,
        ALBUMS_TABLE,
        DISCS_TABLE,
        TRACKS_TABLE,
    ],
    migration: None,
}];
