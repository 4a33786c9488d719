//! Modèle de données : images, playlists, entrées et évènements de lecture
//!
//! Deux règles d'égalité coexistent et ne se mélangent jamais :
//! - les requêtes transitoires ([`NewImage`]) se comparent par clé métier ;
//! - les entités persistées ([`Image`], [`Playlist`]) se comparent uniquement par identifiant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

#[cfg(feature = "pmoserver")]
use utoipa::ToSchema;

/// Identifiant d'image (alloué par le store)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "pmoserver", derive(ToSchema))]
#[serde(transparent)]
pub struct ImageId(pub i64);

/// Identifiant de playlist (alloué par le store)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "pmoserver", derive(ToSchema))]
#[serde(transparent)]
pub struct PlaylistId(pub i64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Demande de création d'image (non persistée)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "pmoserver", derive(ToSchema))]
pub struct NewImage {
    /// URL de téléchargement de l'image (JPEG, PNG, WEBP)
    #[cfg_attr(
        feature = "pmoserver",
        schema(example = "https://images.example.com/slides/beach.jpg")
    )]
    pub url: String,
    /// Durée d'affichage en secondes
    #[cfg_attr(feature = "pmoserver", schema(example = 20))]
    pub duration: u32,
}

impl NewImage {
    pub fn new(url: impl Into<String>, duration: u32) -> Self {
        Self {
            url: url.into(),
            duration,
        }
    }

    /// Nom dérivé de l'URL : dernier segment, sans extension, en minuscules
    pub fn name(&self) -> String {
        derive_name(&self.url)
    }

    /// Matérialise l'image avec son identifiant
    pub fn into_image(self, id: ImageId, created_at: DateTime<Utc>) -> Image {
        let name = self.name();
        Image {
            id,
            url: self.url,
            name,
            duration: self.duration,
            created_at,
        }
    }
}

/// Dérive le nom d'une image à partir de son URL
pub fn derive_name(url: &str) -> String {
    let without_query = url
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let segment = without_query
        .rsplit('/')
        .next()
        .unwrap_or(without_query);
    segment
        .split('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Image persistée (immuable hormis la suppression)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "pmoserver", derive(ToSchema))]
pub struct Image {
    pub id: ImageId,
    pub url: String,
    pub name: String,
    pub duration: u32,
    pub created_at: DateTime<Utc>,
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Image {}

impl Hash for Image {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Playlist persistée
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "pmoserver", derive(ToSchema))]
pub struct Playlist {
    pub id: PlaylistId,
    pub created_at: DateTime<Utc>,
}

impl PartialEq for Playlist {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Playlist {}

impl Hash for Playlist {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Appartenance d'une image à une playlist
///
/// L'ordre dans l'anneau est donné par `(appended_at, position)` : `position`
/// départage les entrées créées dans la même milliseconde (index de la requête
/// pour une création groupée).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "pmoserver", derive(ToSchema))]
pub struct Entry {
    pub playlist_id: PlaylistId,
    pub image_id: ImageId,
    pub appended_at: DateTime<Utc>,
    pub position: i64,
    pub current: bool,
}

impl Entry {
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.appended_at, self.position)
    }
}

/// Preuve de lecture (append-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "pmoserver", derive(ToSchema))]
pub struct PlayEvent {
    pub playlist_id: PlaylistId,
    pub image_id: ImageId,
    pub played_at: DateTime<Utc>,
}

/// Vue ordonnée et cohérente d'une playlist
#[derive(Debug, Clone)]
pub struct PlaylistSnapshot {
    pub playlist: Playlist,
    pub entries: Vec<(Entry, Image)>,
}

impl PlaylistSnapshot {
    pub fn id(&self) -> PlaylistId {
        self.playlist.id
    }

    /// Entrée courante (absente uniquement si la playlist est vide)
    pub fn current(&self) -> Option<&(Entry, Image)> {
        self.entries.iter().find(|(entry, _)| entry.current)
    }

    /// Identifiants d'images dans l'ordre d'ajout
    pub fn image_ids(&self) -> Vec<ImageId> {
        self.entries.iter().map(|(entry, _)| entry.image_id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_name() {
        assert_eq!(derive_name("http://minio:9000/images/Tree.jpg"), "tree");
        assert_eq!(
            derive_name("https://nvs.s3.us-east-2.amazonaws.com/images/Sea.jpg"),
            "sea"
        );
        assert_eq!(derive_name("https://host/a/b/Beach.Large.PNG"), "beach");
        assert_eq!(derive_name("https://host/photos/birds.webp?w=800"), "birds");
        assert_eq!(derive_name("butterfly"), "butterfly");
        assert_eq!(derive_name("https://host/dir/"), "");
    }

    #[test]
    fn test_transient_equality_uses_business_key() {
        let a = NewImage::new("https://host/beach.jpg", 10);
        let b = NewImage::new("https://host/beach.jpg", 10);
        assert_eq!(a, b);
        assert_ne!(a, NewImage::new("https://host/birds.jpg", 10));
    }

    #[test]
    fn test_persisted_equality_uses_identity() {
        let now = Utc::now();
        let a = NewImage::new("https://host/beach.jpg", 10).into_image(ImageId(1), now);
        let b = NewImage::new("https://host/beach.jpg", 10).into_image(ImageId(2), now);
        let c = NewImage::new("https://host/other.jpg", 99).into_image(ImageId(1), now);
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.name, "beach");
    }
}
