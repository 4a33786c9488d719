//! PlaylistManager : point d'entrée de toutes les opérations sur les slideshows
//!
//! Chaque mutation d'une playlist suit le même schéma :
//! 1. acquisition du verrou de la playlist ;
//! 2. chargement des entrées dans un [`Ring`] ;
//! 3. calcul des changements ;
//! 4. un seul commit dans le store.
//!
//! Les lectures passent directement par le store, sans verrou.

use crate::batch::BatchValidator;
use crate::lock::{PlaylistGuard, PlaylistLocks};
use crate::model::{
    Entry, Image, ImageId, NewImage, PlayEvent, Playlist, PlaylistId, PlaylistSnapshot,
};
use crate::ring::Ring;
use crate::store::{ChangeSet, SlideshowStore};
use crate::validator::ImageValidator;
use crate::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Échéance par défaut d'un lot de validations (30 secondes)
pub const DEFAULT_VALIDATION_TIMEOUT_SECS: u64 = 30;

/// Attente maximale d'un verrou de playlist (5 secondes)
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Taille maximale d'une création groupée
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Nombre de passes de suppression d'une image avant abandon
pub const DEFAULT_DELETE_IMAGE_ATTEMPTS: usize = 3;

/// Réglages du manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    pub validation_timeout: Duration,
    pub lock_timeout: Duration,
    pub max_batch_size: usize,
    pub delete_image_attempts: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            validation_timeout: Duration::from_secs(DEFAULT_VALIDATION_TIMEOUT_SECS),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            delete_image_attempts: DEFAULT_DELETE_IMAGE_ATTEMPTS,
        }
    }
}

/// Résultat d'une preuve de lecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// L'image n'appartient pas (ou plus) à la playlist : rien n'a changé
    Ignored,
    /// Le pointeur a avancé et la lecture a été enregistrée
    Advanced {
        played: ImageId,
        current: ImageId,
        /// L'image jouée n'était pas la courante
        healed: bool,
    },
}

/// Résultat du retrait d'une image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    NotMember,
    /// Entrée retirée ; `promoted` est la nouvelle courante si l'entrée l'était
    Removed { promoted: Option<ImageId> },
    /// C'était la dernière entrée : la playlist a disparu avec elle
    PlaylistDeleted,
}

struct ManagerInner {
    store: Arc<dyn SlideshowStore>,
    batch: BatchValidator,
    locks: PlaylistLocks,
    options: ManagerOptions,
}

/// Gestionnaire des slideshows
#[derive(Clone)]
pub struct PlaylistManager {
    inner: Arc<ManagerInner>,
}

/// Horodatage à la microseconde (précision du stockage)
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn check_new_image(image: &NewImage) -> Result<()> {
    if image.url.trim().is_empty() {
        return Err(Error::InvalidRequest("image url must not be empty".into()));
    }
    if image.duration == 0 {
        return Err(Error::InvalidRequest(format!(
            "duration of {} must be greater than zero",
            image.url
        )));
    }
    Ok(())
}

impl PlaylistManager {
    pub fn new(
        store: Arc<dyn SlideshowStore>,
        validator: Arc<dyn ImageValidator>,
        options: ManagerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                batch: BatchValidator::new(validator, options.validation_timeout),
                locks: PlaylistLocks::new(options.lock_timeout),
                options,
            }),
        }
    }

    fn store_ref(&self) -> &dyn SlideshowStore {
        self.inner.store.as_ref()
    }

    fn load_ring(&self, playlist_id: PlaylistId) -> Result<Ring> {
        if self.store_ref().playlist(playlist_id)?.is_none() {
            return Err(Error::PlaylistNotFound(playlist_id));
        }
        Ok(Ring::new(self.store_ref().entries(playlist_id)?))
    }

    /// Verrouille la playlist puis charge son anneau
    ///
    /// Une playlist inconnue ne laisse aucun verrou derrière elle.
    async fn lock_ring(&self, playlist_id: PlaylistId) -> Result<(PlaylistGuard, Ring)> {
        let guard = self.inner.locks.acquire(playlist_id).await?;
        match self.load_ring(playlist_id) {
            Ok(ring) => Ok((guard, ring)),
            Err(e) => {
                drop(guard);
                if matches!(e, Error::PlaylistNotFound(_)) {
                    self.inner.locks.forget(playlist_id);
                }
                Err(e)
            }
        }
    }

    /// Crée une image isolée après validation de son URL
    pub async fn create_image(&self, request: NewImage) -> Result<Image> {
        check_new_image(&request)?;
        self.inner
            .batch
            .validate_all(std::slice::from_ref(&request.url))
            .await?;

        let image = request.into_image(self.store_ref().next_image_id()?, now());
        let mut changes = ChangeSet::new();
        changes.put_image(image.clone());
        self.store_ref().commit(changes)?;

        tracing::info!("Created image {} ({})", image.id, image.url);
        Ok(image)
    }

    /// Crée une playlist à partir d'un lot d'images (tout ou rien)
    ///
    /// L'ordre de la requête est l'ordre de l'anneau ; la première image
    /// devient courante.
    pub async fn create_playlist(&self, requests: Vec<NewImage>) -> Result<PlaylistSnapshot> {
        if requests.is_empty() {
            return Err(Error::InvalidRequest(
                "a playlist needs at least one image".into(),
            ));
        }
        if requests.len() > self.inner.options.max_batch_size {
            return Err(Error::InvalidRequest(format!(
                "too many images: {} (max {})",
                requests.len(),
                self.inner.options.max_batch_size
            )));
        }
        for request in &requests {
            check_new_image(request)?;
        }

        let urls: Vec<String> = requests.iter().map(|r| r.url.clone()).collect();
        if let Err(e) = self.inner.batch.validate_all(&urls).await {
            tracing::warn!("Rejected playlist of {} images: {}", urls.len(), e);
            return Err(e);
        }

        let created_at = now();
        let playlist = Playlist {
            id: self.store_ref().next_playlist_id()?,
            created_at,
        };

        let mut images = Vec::with_capacity(requests.len());
        for request in requests {
            images.push(request.into_image(self.store_ref().next_image_id()?, created_at));
        }

        let image_ids: Vec<ImageId> = images.iter().map(|image| image.id).collect();
        let mut ring = Ring::default();
        let entries = ring.insert_initial(playlist.id, &image_ids, created_at);

        let mut changes = ChangeSet::new();
        changes.put_playlist(playlist.clone());
        for image in &images {
            changes.put_image(image.clone());
        }
        changes.put_entries(entries.iter().cloned());
        self.store_ref().commit(changes)?;

        tracing::info!(
            "Created playlist {} with {} images",
            playlist.id,
            images.len()
        );

        Ok(PlaylistSnapshot {
            playlist,
            entries: entries.into_iter().zip(images).collect(),
        })
    }

    /// Ajoute une image existante en fin de playlist
    ///
    /// Si l'image est déjà membre, l'entrée existante est retournée.
    pub async fn append_image(&self, playlist_id: PlaylistId, image_id: ImageId) -> Result<Entry> {
        let (_guard, mut ring) = self.lock_ring(playlist_id).await?;

        if self.store_ref().image(image_id)?.is_none() {
            return Err(Error::ImageNotFound(image_id));
        }

        if let Some(existing) = ring.get(image_id) {
            tracing::debug!(
                "Image {} already in playlist {}, append ignored",
                image_id,
                playlist_id
            );
            return Ok(existing.clone());
        }

        let entry = ring.insert_tail(playlist_id, image_id, now());
        let mut changes = ChangeSet::new();
        changes.put_entry(entry.clone());
        self.store_ref().commit(changes)?;

        tracing::info!("Appended image {} to playlist {}", image_id, playlist_id);
        Ok(entry)
    }

    /// Preuve de lecture : avance le pointeur courant
    ///
    /// La nouvelle courante est le successeur de l'image jouée, même si
    /// celle-ci n'était pas la courante (le décalage est journalisé). Le
    /// déplacement du pointeur et l'évènement de lecture sont validés ensemble.
    pub async fn advance_on_play(
        &self,
        playlist_id: PlaylistId,
        played: ImageId,
    ) -> Result<AdvanceOutcome> {
        let (_guard, mut ring) = self.lock_ring(playlist_id).await?;

        let Some(played_entry) = ring.get(played) else {
            tracing::warn!(
                "Proof of play for image {} ignored: not in playlist {}",
                played,
                playlist_id
            );
            return Ok(AdvanceOutcome::Ignored);
        };

        let healed = !played_entry.current;
        if healed {
            tracing::warn!(
                "Proof of play for image {} on playlist {} but current is {:?}, resynchronising",
                played,
                playlist_id,
                ring.current().map(|entry| entry.image_id)
            );
        }

        let next = ring
            .successor(played)
            .map(|entry| entry.image_id)
            .ok_or_else(|| Error::internal("successor of a member entry must exist"))?;
        let changed = ring
            .designate_current(next)
            .ok_or_else(|| Error::internal("successor must belong to the ring"))?;

        let mut changes = ChangeSet::new();
        changes.put_entries(changed).append_play_event(PlayEvent {
            playlist_id,
            image_id: played,
            played_at: now(),
        });
        self.store_ref().commit(changes)?;

        tracing::debug!(
            "Playlist {} advanced from {} to {}",
            playlist_id,
            played,
            next
        );

        Ok(AdvanceOutcome::Advanced {
            played,
            current: next,
            healed,
        })
    }

    /// Retire une image d'une playlist
    ///
    /// Si l'entrée retirée était courante, son successeur est promu dans le
    /// même commit. Retirer la dernière entrée supprime la playlist.
    pub async fn remove_image(&self, playlist_id: PlaylistId, image_id: ImageId) -> Result<Removal> {
        let (guard, mut ring) = self.lock_ring(playlist_id).await?;

        let Some(entry) = ring.get(image_id).cloned() else {
            tracing::debug!(
                "Image {} not in playlist {}, nothing to remove",
                image_id,
                playlist_id
            );
            return Ok(Removal::NotMember);
        };

        let mut changes = ChangeSet::new();
        let removal = if ring.len() == 1 {
            changes.delete_entries_of(playlist_id).delete_playlist(playlist_id);
            Removal::PlaylistDeleted
        } else if entry.current {
            let next = ring
                .successor(image_id)
                .map(|entry| entry.image_id)
                .ok_or_else(|| Error::internal("successor of a member entry must exist"))?;
            let changed = ring
                .designate_current(next)
                .ok_or_else(|| Error::internal("successor must belong to the ring"))?;
            // L'entrée retirée est effacée en premier : elle ne repasse jamais par l'état non courant
            changes
                .delete_entry(playlist_id, image_id)
                .put_entries(changed.into_iter().filter(|e| e.image_id != image_id));
            Removal::Removed {
                promoted: Some(next),
            }
        } else {
            changes.delete_entry(playlist_id, image_id);
            Removal::Removed { promoted: None }
        };

        self.store_ref().commit(changes)?;

        match &removal {
            Removal::PlaylistDeleted => {
                tracing::info!(
                    "Removed last image {} of playlist {}, playlist deleted",
                    image_id,
                    playlist_id
                );
                drop(guard);
                self.inner.locks.forget(playlist_id);
            }
            Removal::Removed { promoted } => {
                tracing::info!(
                    "Removed image {} from playlist {} (promoted: {:?})",
                    image_id,
                    playlist_id,
                    promoted
                );
            }
            Removal::NotMember => {}
        }

        Ok(removal)
    }

    /// Supprime une image et la retire de toutes ses playlists
    ///
    /// Chaque playlist est traitée sous son propre verrou, l'une après
    /// l'autre. Retourne `false` si l'image n'existait déjà plus.
    pub async fn delete_image(&self, image_id: ImageId) -> Result<bool> {
        if self.store_ref().image(image_id)?.is_none() {
            tracing::info!("Image {} already deleted", image_id);
            return Ok(false);
        }

        let attempts = self.inner.options.delete_image_attempts.max(1);
        for attempt in 1..=attempts {
            for playlist_id in self.store_ref().playlists_containing(image_id)? {
                match self.remove_image(playlist_id, image_id).await {
                    Ok(_) | Err(Error::PlaylistNotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }

            let mut changes = ChangeSet::new();
            changes.delete_image(image_id);
            match self.store_ref().commit(changes) {
                Ok(()) => {
                    tracing::info!("Deleted image {}", image_id);
                    return Ok(true);
                }
                // Ajout concurrent dans une playlist : on recommence
                Err(Error::Conflict(reason)) if attempt < attempts => {
                    tracing::debug!(
                        "Deleting image {} raced with an append (attempt {}): {}",
                        image_id,
                        attempt,
                        reason
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Conflict(format!(
            "image {} is still being added to playlists",
            image_id
        )))
    }

    /// Supprime une playlist (les images sont conservées)
    pub async fn delete_playlist(&self, playlist_id: PlaylistId) -> Result<bool> {
        let guard = self.inner.locks.acquire(playlist_id).await?;

        if self.store_ref().playlist(playlist_id)?.is_none() {
            drop(guard);
            self.inner.locks.forget(playlist_id);
            tracing::info!("Playlist {} already deleted", playlist_id);
            return Ok(false);
        }

        let mut changes = ChangeSet::new();
        changes
            .delete_entries_of(playlist_id)
            .delete_playlist(playlist_id);
        self.store_ref().commit(changes)?;

        drop(guard);
        self.inner.locks.forget(playlist_id);

        tracing::info!("Deleted playlist {}", playlist_id);
        Ok(true)
    }

    /// Vue ordonnée d'une playlist (sans verrou)
    pub async fn get_ordered_playlist(&self, playlist_id: PlaylistId) -> Result<PlaylistSnapshot> {
        self.store_ref()
            .snapshot(playlist_id)?
            .ok_or(Error::PlaylistNotFound(playlist_id))
    }

    pub async fn get_image(&self, image_id: ImageId) -> Result<Image> {
        self.store_ref()
            .image(image_id)?
            .ok_or(Error::ImageNotFound(image_id))
    }

    /// Recherche d'images par nom (exacte, insensible à la casse)
    pub async fn search_images_by_name(&self, name: &str) -> Result<Vec<Image>> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(Error::InvalidRequest("search name must not be blank".into()));
        }
        self.store_ref().find_images_by_name(&name)
    }

    /// Journal des lectures d'une playlist, du plus ancien au plus récent
    pub async fn play_events(&self, playlist_id: PlaylistId) -> Result<Vec<PlayEvent>> {
        self.store_ref().play_events(playlist_id)
    }
}
