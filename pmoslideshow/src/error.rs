//! Types d'erreurs pour pmoslideshow

use crate::model::{ImageId, PlaylistId};

/// Erreurs de gestion des slideshows
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Playlist not found: {0}")]
    PlaylistNotFound(PlaylistId),

    #[error("Image not found: {0}")]
    ImageNotFound(ImageId),

    #[error("Invalid image {url}: {reason}")]
    InvalidImage { url: String, reason: String },

    #[error("Image validation timed out: {url}")]
    ValidationTimeout { url: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict, retry later: {0}")]
    Conflict(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type Result spécialisé pour pmoslideshow
pub type Result<T> = std::result::Result<T, Error>;

/// Catégorie métier d'une erreur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidImage,
    ValidationTimeout,
    InvalidRequest,
    Conflict,
    Internal,
}

/// Classe visible par l'utilisateur (mappée sur un statut HTTP par la couche REST)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    BadRequest,
    Retry,
    ServerError,
}

impl Error {
    pub fn invalid_image(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PlaylistNotFound(_) | Error::ImageNotFound(_) => ErrorKind::NotFound,
            Error::InvalidImage { .. } => ErrorKind::InvalidImage,
            Error::ValidationTimeout { .. } => ErrorKind::ValidationTimeout,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::PersistenceError(_) | Error::Internal(_) | Error::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.kind().class()
    }
}

impl ErrorKind {
    pub fn class(self) -> ErrorClass {
        match self {
            ErrorKind::NotFound => ErrorClass::NotFound,
            ErrorKind::InvalidImage | ErrorKind::ValidationTimeout | ErrorKind::InvalidRequest => {
                ErrorClass::BadRequest
            }
            ErrorKind::Conflict => ErrorClass::Retry,
            ErrorKind::Internal => ErrorClass::ServerError,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::PersistenceError(err.to_string())
    }
}
