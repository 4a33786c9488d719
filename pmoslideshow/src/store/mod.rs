//! Contrat de stockage durable et backends (mémoire, SQLite)
//!
//! Le store ne connaît pas l'anneau : il range des lignes et applique des
//! [`ChangeSet`] de manière atomique. La sérialisation par playlist est
//! assurée en amont par [`crate::lock::PlaylistLocks`].

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::model::{Entry, Image, ImageId, PlayEvent, Playlist, PlaylistId, PlaylistSnapshot};
use crate::Result;

/// Mutation élémentaire
#[derive(Debug, Clone)]
pub enum Change {
    PutImage(Image),
    DeleteImage(ImageId),
    PutPlaylist(Playlist),
    DeletePlaylist(PlaylistId),
    PutEntry(Entry),
    DeleteEntry {
        playlist_id: PlaylistId,
        image_id: ImageId,
    },
    DeleteEntriesOf(PlaylistId),
    AppendPlayEvent(PlayEvent),
}

/// Lot de mutations appliqué en une seule transaction
///
/// L'ordre d'insertion est l'ordre d'application.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) -> &mut Self {
        self.changes.push(change);
        self
    }

    pub fn put_image(&mut self, image: Image) -> &mut Self {
        self.push(Change::PutImage(image))
    }

    pub fn delete_image(&mut self, id: ImageId) -> &mut Self {
        self.push(Change::DeleteImage(id))
    }

    pub fn put_playlist(&mut self, playlist: Playlist) -> &mut Self {
        self.push(Change::PutPlaylist(playlist))
    }

    pub fn delete_playlist(&mut self, id: PlaylistId) -> &mut Self {
        self.push(Change::DeletePlaylist(id))
    }

    pub fn put_entry(&mut self, entry: Entry) -> &mut Self {
        self.push(Change::PutEntry(entry))
    }

    /// Ajoute plusieurs entrées en conservant leur ordre
    pub fn put_entries(&mut self, entries: impl IntoIterator<Item = Entry>) -> &mut Self {
        for entry in entries {
            self.put_entry(entry);
        }
        self
    }

    pub fn delete_entry(&mut self, playlist_id: PlaylistId, image_id: ImageId) -> &mut Self {
        self.push(Change::DeleteEntry {
            playlist_id,
            image_id,
        })
    }

    pub fn delete_entries_of(&mut self, playlist_id: PlaylistId) -> &mut Self {
        self.push(Change::DeleteEntriesOf(playlist_id))
    }

    pub fn append_play_event(&mut self, event: PlayEvent) -> &mut Self {
        self.push(Change::AppendPlayEvent(event))
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

/// Store durable des images, playlists, entrées et preuves de lecture
///
/// Les lectures sont sans verrou et ne voient jamais un commit partiel.
/// `commit` applique tout ou rien et vérifie :
/// - qu'une entrée ajoutée référence une playlist et une image existantes ;
/// - qu'une image supprimée n'est plus référencée par aucune entrée
///   (sinon [`crate::Error::Conflict`]).
pub trait SlideshowStore: Send + Sync {
    fn next_image_id(&self) -> Result<ImageId>;

    fn next_playlist_id(&self) -> Result<PlaylistId>;

    fn image(&self, id: ImageId) -> Result<Option<Image>>;

    fn playlist(&self, id: PlaylistId) -> Result<Option<Playlist>>;

    /// Entrées d'une playlist triées par ordre d'ajout
    fn entries(&self, playlist_id: PlaylistId) -> Result<Vec<Entry>>;

    /// Playlist et entrées (avec leurs images) lues dans un même état validé
    fn snapshot(&self, playlist_id: PlaylistId) -> Result<Option<PlaylistSnapshot>>;

    fn playlists_containing(&self, image_id: ImageId) -> Result<Vec<PlaylistId>>;

    /// Recherche exacte, insensible à la casse
    fn find_images_by_name(&self, name: &str) -> Result<Vec<Image>>;

    /// Preuves de lecture d'une playlist, de la plus ancienne à la plus récente
    fn play_events(&self, playlist_id: PlaylistId) -> Result<Vec<PlayEvent>>;

    fn commit(&self, changes: ChangeSet) -> Result<()>;
}
