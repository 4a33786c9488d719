//! # pmoslideshow - Slideshows circulaires avec preuve de lecture
//!
//! Cette crate gère des playlists d'images parcourues en boucle :
//! - un anneau ordonné par date d'ajout, avec exactement une image courante ;
//! - l'avancement du pointeur à chaque preuve de lecture (avec auto-correction
//!   des évènements décalés) ;
//! - la création groupée validée en tout-ou-rien contre une échéance unique ;
//! - la persistance SQLite (ou en mémoire pour les tests).
//!
//! # Architecture
//!
//! - **PlaylistManager** : toutes les opérations, sérialisées par playlist
//! - **Ring** : index circulaire des entrées d'une playlist
//! - **BatchValidator** : validation concurrente des URLs d'un lot
//! - **SlideshowStore** : stockage transactionnel ([`SqliteStore`], [`MemoryStore`])
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use std::sync::Arc;
//! use pmoslideshow::{
//!     AdvanceOutcome, HttpImageValidator, ManagerOptions, NewImage, PlaylistManager, SqliteStore,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> pmoslideshow::Result<()> {
//! let store = Arc::new(SqliteStore::open(std::path::Path::new("slideshow.db"))?);
//! let validator = Arc::new(HttpImageValidator::builder().build()?);
//! let manager = PlaylistManager::new(store, validator, ManagerOptions::default());
//!
//! let slideshow = manager
//!     .create_playlist(vec![
//!         NewImage::new("https://images.example.com/beach.jpg", 10),
//!         NewImage::new("https://images.example.com/birds.jpg", 15),
//!     ])
//!     .await?;
//!
//! let beach = slideshow.image_ids()[0];
//! if let AdvanceOutcome::Advanced { current, .. } =
//!     manager.advance_on_play(slideshow.id(), beach).await?
//! {
//!     println!("Now showing image {}", current);
//! }
//! # Ok(())
//! # }
//! ```

mod batch;
mod error;
mod lock;
mod manager;
mod model;
mod ring;
pub mod store;
mod validator;

#[cfg(feature = "pmoconfig")]
mod config_ext;

#[cfg(feature = "pmoserver")]
pub mod api;
#[cfg(feature = "pmoserver")]
pub mod openapi;

// Réexports publics
pub use batch::BatchValidator;
pub use error::{Error, ErrorClass, ErrorKind, Result};
pub use lock::{PlaylistGuard, PlaylistLocks};
pub use manager::{AdvanceOutcome, ManagerOptions, PlaylistManager, Removal};
pub use model::{
    derive_name, Entry, Image, ImageId, NewImage, PlayEvent, Playlist, PlaylistId,
    PlaylistSnapshot,
};
pub use ring::Ring;
pub use store::{ChangeSet, MemoryStore, SlideshowStore, SqliteStore};
pub use validator::{HttpImageValidator, ImageValidator, ValidatorBuilder, ValidatorOptions};

#[cfg(feature = "pmoconfig")]
pub use config_ext::SlideshowConfigExt;

#[cfg(feature = "pmoserver")]
pub use api::slideshow_api_router;
#[cfg(feature = "pmoserver")]
pub use openapi::ApiDoc;
