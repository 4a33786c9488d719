//! Persistance SQLite des slideshows

use super::{Change, ChangeSet, SlideshowStore};
use crate::model::{Entry, Image, ImageId, PlayEvent, Playlist, PlaylistId, PlaylistSnapshot};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS images (
        id INTEGER PRIMARY KEY,
        url TEXT NOT NULL,
        name TEXT NOT NULL,
        duration INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_images_name ON images(name);

    CREATE TABLE IF NOT EXISTS playlists (
        id INTEGER PRIMARY KEY,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS playlist_entries (
        playlist_id INTEGER NOT NULL,
        image_id INTEGER NOT NULL,
        appended_at INTEGER NOT NULL,
        position INTEGER NOT NULL,
        is_current INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (playlist_id, image_id),
        FOREIGN KEY (playlist_id) REFERENCES playlists(id) ON DELETE CASCADE,
        FOREIGN KEY (image_id) REFERENCES images(id)
    );
    CREATE INDEX IF NOT EXISTS idx_entries_order
        ON playlist_entries(playlist_id, appended_at, position);
    CREATE INDEX IF NOT EXISTS idx_entries_image ON playlist_entries(image_id);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_single_current
        ON playlist_entries(playlist_id) WHERE is_current = 1;

    CREATE TABLE IF NOT EXISTS play_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        playlist_id INTEGER NOT NULL,
        image_id INTEGER NOT NULL,
        played_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_play_events_playlist ON play_events(playlist_id, id);

    CREATE TABLE IF NOT EXISTS sequences (
        name TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );
    INSERT OR IGNORE INTO sequences (name, value) VALUES ('images', 0);
    INSERT OR IGNORE INTO sequences (name, value) VALUES ('playlists', 0);
";

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(0, micros)
    })
}

fn image_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Image> {
    Ok(Image {
        id: ImageId(row.get(offset)?),
        url: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        duration: row.get(offset + 3)?,
        created_at: from_micros(row.get(offset + 4)?)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        playlist_id: PlaylistId(row.get(0)?),
        image_id: ImageId(row.get(1)?),
        appended_at: from_micros(row.get(2)?)?,
        position: row.get(3)?,
        current: row.get(4)?,
    })
}

const ENTRY_COLUMNS: &str = "e.playlist_id, e.image_id, e.appended_at, e.position, e.is_current";
const IMAGE_COLUMNS: &str = "i.id, i.url, i.name, i.duration, i.created_at";

/// Store SQLite (une base pour toutes les playlists)
///
/// La connexion est partagée derrière un `Mutex` : chaque commit s'exécute
/// dans une transaction, chaque snapshot dans une transaction de lecture.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Ouvre (ou crée) la base et son schéma
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::PersistenceError(format!("Failed to create directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::PersistenceError(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    /// Base en mémoire (tests)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::PersistenceError(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::PersistenceError(format!("Failed to create schema: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("sqlite connection lock poisoned"))
    }

    fn next_value(&self, sequence: &str) -> Result<i64> {
        let conn = self.conn()?;
        let value = conn.query_row(
            "UPDATE sequences SET value = value + 1 WHERE name = ?1 RETURNING value",
            params![sequence],
            |row| row.get(0),
        )?;
        Ok(value)
    }

    fn apply(tx: &Transaction<'_>, change: Change) -> Result<()> {
        match change {
            Change::PutImage(image) => {
                tx.execute(
                    "INSERT OR REPLACE INTO images (id, url, name, duration, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        image.id.0,
                        image.url,
                        image.name,
                        image.duration,
                        to_micros(image.created_at)
                    ],
                )?;
            }
            Change::DeleteImage(id) => {
                let referenced: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM playlist_entries WHERE image_id = ?1)",
                    params![id.0],
                    |row| row.get(0),
                )?;
                if referenced {
                    return Err(Error::Conflict(format!(
                        "image {} is still referenced by a playlist",
                        id
                    )));
                }
                tx.execute("DELETE FROM images WHERE id = ?1", params![id.0])?;
            }
            Change::PutPlaylist(playlist) => {
                tx.execute(
                    "INSERT OR REPLACE INTO playlists (id, created_at) VALUES (?1, ?2)",
                    params![playlist.id.0, to_micros(playlist.created_at)],
                )?;
            }
            Change::DeletePlaylist(id) => {
                tx.execute(
                    "DELETE FROM playlist_entries WHERE playlist_id = ?1",
                    params![id.0],
                )?;
                tx.execute("DELETE FROM playlists WHERE id = ?1", params![id.0])?;
            }
            Change::PutEntry(entry) => {
                let playlist_exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM playlists WHERE id = ?1)",
                    params![entry.playlist_id.0],
                    |row| row.get(0),
                )?;
                if !playlist_exists {
                    return Err(Error::PlaylistNotFound(entry.playlist_id));
                }
                let image_exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM images WHERE id = ?1)",
                    params![entry.image_id.0],
                    |row| row.get(0),
                )?;
                if !image_exists {
                    return Err(Error::ImageNotFound(entry.image_id));
                }

                tx.execute(
                    "INSERT INTO playlist_entries (playlist_id, image_id, appended_at, position, is_current)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(playlist_id, image_id) DO UPDATE SET
                         appended_at = excluded.appended_at,
                         position = excluded.position,
                         is_current = excluded.is_current",
                    params![
                        entry.playlist_id.0,
                        entry.image_id.0,
                        to_micros(entry.appended_at),
                        entry.position,
                        entry.current
                    ],
                )?;
            }
            Change::DeleteEntry {
                playlist_id,
                image_id,
            } => {
                tx.execute(
                    "DELETE FROM playlist_entries WHERE playlist_id = ?1 AND image_id = ?2",
                    params![playlist_id.0, image_id.0],
                )?;
            }
            Change::DeleteEntriesOf(id) => {
                tx.execute(
                    "DELETE FROM playlist_entries WHERE playlist_id = ?1",
                    params![id.0],
                )?;
            }
            Change::AppendPlayEvent(event) => {
                tx.execute(
                    "INSERT INTO play_events (playlist_id, image_id, played_at) VALUES (?1, ?2, ?3)",
                    params![
                        event.playlist_id.0,
                        event.image_id.0,
                        to_micros(event.played_at)
                    ],
                )?;
            }
        }
        Ok(())
    }

    fn query_entries(conn: &Connection, playlist_id: PlaylistId) -> Result<Vec<Entry>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM playlist_entries e
             WHERE e.playlist_id = ?1
             ORDER BY e.appended_at ASC, e.position ASC"
        ))?;
        let entries = stmt
            .query_map(params![playlist_id.0], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn query_playlist(conn: &Connection, id: PlaylistId) -> Result<Option<Playlist>> {
        let playlist = conn
            .query_row(
                "SELECT id, created_at FROM playlists WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(Playlist {
                        id: PlaylistId(row.get(0)?),
                        created_at: from_micros(row.get(1)?)?,
                    })
                },
            )
            .optional()?;
        Ok(playlist)
    }
}

impl SlideshowStore for SqliteStore {
    fn next_image_id(&self) -> Result<ImageId> {
        self.next_value("images").map(ImageId)
    }

    fn next_playlist_id(&self) -> Result<PlaylistId> {
        self.next_value("playlists").map(PlaylistId)
    }

    fn image(&self, id: ImageId) -> Result<Option<Image>> {
        let conn = self.conn()?;
        let image = conn
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM images i WHERE i.id = ?1"),
                params![id.0],
                |row| image_from_row(row, 0),
            )
            .optional()?;
        Ok(image)
    }

    fn playlist(&self, id: PlaylistId) -> Result<Option<Playlist>> {
        let conn = self.conn()?;
        Self::query_playlist(&conn, id)
    }

    fn entries(&self, playlist_id: PlaylistId) -> Result<Vec<Entry>> {
        let conn = self.conn()?;
        Self::query_entries(&conn, playlist_id)
    }

    fn snapshot(&self, playlist_id: PlaylistId) -> Result<Option<PlaylistSnapshot>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let Some(playlist) = Self::query_playlist(&tx, playlist_id)? else {
            return Ok(None);
        };

        let entries = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {ENTRY_COLUMNS}, {IMAGE_COLUMNS}
                 FROM playlist_entries e JOIN images i ON i.id = e.image_id
                 WHERE e.playlist_id = ?1
                 ORDER BY e.appended_at ASC, e.position ASC"
            ))?;
            let rows = stmt
                .query_map(params![playlist_id.0], |row| {
                    Ok((entry_from_row(row)?, image_from_row(row, 5)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        tx.commit()?;

        Ok(Some(PlaylistSnapshot { playlist, entries }))
    }

    fn playlists_containing(&self, image_id: ImageId) -> Result<Vec<PlaylistId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT playlist_id FROM playlist_entries WHERE image_id = ?1 ORDER BY playlist_id",
        )?;
        let ids = stmt
            .query_map(params![image_id.0], |row| Ok(PlaylistId(row.get(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn find_images_by_name(&self, name: &str) -> Result<Vec<Image>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images i WHERE lower(i.name) = lower(?1) ORDER BY i.id"
        ))?;
        let images = stmt
            .query_map(params![name], |row| image_from_row(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    fn play_events(&self, playlist_id: PlaylistId) -> Result<Vec<PlayEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT playlist_id, image_id, played_at FROM play_events
             WHERE playlist_id = ?1 ORDER BY id ASC",
        )?;
        let events = stmt
            .query_map(params![playlist_id.0], |row| {
                Ok(PlayEvent {
                    playlist_id: PlaylistId(row.get(0)?),
                    image_id: ImageId(row.get(1)?),
                    played_at: from_micros(row.get(2)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for change in changes.into_changes() {
            // En cas d'erreur, le drop de `tx` annule la transaction
            Self::apply(&tx, change)?;
        }

        tx.commit()?;
        Ok(())
    }
}
