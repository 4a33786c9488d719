//! Store en mémoire (tests, déploiements éphémères)

use super::{Change, ChangeSet, SlideshowStore};
use crate::model::{Entry, Image, ImageId, PlayEvent, Playlist, PlaylistId, PlaylistSnapshot};
use crate::ring::Ring;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct Tables {
    images: BTreeMap<ImageId, Image>,
    playlists: BTreeMap<PlaylistId, Playlist>,
    entries: BTreeMap<(PlaylistId, ImageId), Entry>,
    play_events: Vec<PlayEvent>,
}

impl Tables {
    fn entries_of(&self, playlist_id: PlaylistId) -> Vec<Entry> {
        let entries = self
            .entries
            .range((playlist_id, ImageId(i64::MIN))..=(playlist_id, ImageId(i64::MAX)))
            .map(|(_, entry)| entry.clone())
            .collect();
        Ring::new(entries).entries().to_vec()
    }

    fn apply(&mut self, change: Change) -> Result<()> {
        match change {
            Change::PutImage(image) => {
                self.images.insert(image.id, image);
            }
            Change::DeleteImage(id) => {
                if self.entries.keys().any(|(_, image_id)| *image_id == id) {
                    return Err(Error::Conflict(format!(
                        "image {} is still referenced by a playlist",
                        id
                    )));
                }
                self.images.remove(&id);
            }
            Change::PutPlaylist(playlist) => {
                self.playlists.insert(playlist.id, playlist);
            }
            Change::DeletePlaylist(id) => {
                self.entries.retain(|(playlist_id, _), _| *playlist_id != id);
                self.playlists.remove(&id);
            }
            Change::PutEntry(entry) => {
                if !self.playlists.contains_key(&entry.playlist_id) {
                    return Err(Error::PlaylistNotFound(entry.playlist_id));
                }
                if !self.images.contains_key(&entry.image_id) {
                    return Err(Error::ImageNotFound(entry.image_id));
                }
                self.entries
                    .insert((entry.playlist_id, entry.image_id), entry);
            }
            Change::DeleteEntry {
                playlist_id,
                image_id,
            } => {
                self.entries.remove(&(playlist_id, image_id));
            }
            Change::DeleteEntriesOf(id) => {
                self.entries.retain(|(playlist_id, _), _| *playlist_id != id);
            }
            Change::AppendPlayEvent(event) => {
                self.play_events.push(event);
            }
        }
        Ok(())
    }
}

/// Store en mémoire
///
/// Les commits sont appliqués sur une copie des tables puis publiés d'un
/// bloc : un commit refusé ne laisse aucune trace.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    image_seq: AtomicI64,
    playlist_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            image_seq: AtomicI64::new(1),
            playlist_seq: AtomicI64::new(1),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::internal("memory store lock poisoned during read"))
    }

    /// Nombre total de preuves de lecture
    pub fn play_event_count(&self) -> Result<usize> {
        Ok(self.read()?.play_events.len())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SlideshowStore for MemoryStore {
    fn next_image_id(&self) -> Result<ImageId> {
        Ok(ImageId(self.image_seq.fetch_add(1, Ordering::SeqCst)))
    }

    fn next_playlist_id(&self) -> Result<PlaylistId> {
        Ok(PlaylistId(self.playlist_seq.fetch_add(1, Ordering::SeqCst)))
    }

    fn image(&self, id: ImageId) -> Result<Option<Image>> {
        Ok(self.read()?.images.get(&id).cloned())
    }

    fn playlist(&self, id: PlaylistId) -> Result<Option<Playlist>> {
        Ok(self.read()?.playlists.get(&id).cloned())
    }

    fn entries(&self, playlist_id: PlaylistId) -> Result<Vec<Entry>> {
        Ok(self.read()?.entries_of(playlist_id))
    }

    fn snapshot(&self, playlist_id: PlaylistId) -> Result<Option<PlaylistSnapshot>> {
        let tables = self.read()?;
        let Some(playlist) = tables.playlists.get(&playlist_id).cloned() else {
            return Ok(None);
        };

        let mut entries = Vec::new();
        for entry in tables.entries_of(playlist_id) {
            let image = tables
                .images
                .get(&entry.image_id)
                .cloned()
                .ok_or(Error::ImageNotFound(entry.image_id))?;
            entries.push((entry, image));
        }

        Ok(Some(PlaylistSnapshot { playlist, entries }))
    }

    fn playlists_containing(&self, image_id: ImageId) -> Result<Vec<PlaylistId>> {
        Ok(self
            .read()?
            .entries
            .keys()
            .filter(|(_, id)| *id == image_id)
            .map(|(playlist_id, _)| *playlist_id)
            .collect())
    }

    fn find_images_by_name(&self, name: &str) -> Result<Vec<Image>> {
        let name = name.to_lowercase();
        Ok(self
            .read()?
            .images
            .values()
            .filter(|image| image.name.to_lowercase() == name)
            .cloned()
            .collect())
    }

    fn play_events(&self, playlist_id: PlaylistId) -> Result<Vec<PlayEvent>> {
        Ok(self
            .read()?
            .play_events
            .iter()
            .filter(|event| event.playlist_id == playlist_id)
            .cloned()
            .collect())
    }

    fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| Error::internal("memory store lock poisoned during commit"))?;

        let mut staged = tables.clone();
        for change in changes.into_changes() {
            staged.apply(change)?;
        }
        *tables = staged;

        Ok(())
    }
}
