//! API REST des slideshows.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{Error, ErrorClass};
use crate::manager::{AdvanceOutcome, PlaylistManager, Removal};
use crate::model::{Image, ImageId, NewImage, PlayEvent, PlaylistId, PlaylistSnapshot};

/// Router des slideshows et des images.
pub fn slideshow_api_router(manager: PlaylistManager) -> Router {
    Router::new()
        .route("/image", post(create_image))
        .route("/image/{image_id}", delete(delete_image))
        .route("/images/search", get(search_images))
        .route("/slideshow", post(create_slideshow))
        .route("/slideshow/{slideshow_id}", delete(delete_slideshow))
        .route("/slideshow/{slideshow_id}/ordered", get(get_ordered_slideshow))
        .route(
            "/slideshow/{slideshow_id}/append/{image_id}",
            post(append_image),
        )
        .route(
            "/slideshow/{slideshow_id}/images/{image_id}",
            delete(remove_image),
        )
        .route(
            "/slideshow/{slideshow_id}/proof-of-play/{image_id}",
            post(proof_of_play),
        )
        .route(
            "/slideshow/{slideshow_id}/proof-of-play",
            get(list_proofs_of_play),
        )
        .with_state(manager)
}

/// Image d'un slideshow, dans l'ordre de l'anneau.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderedImageResponse {
    pub id: ImageId,
    pub url: String,
    pub name: String,
    pub duration: u32,
    pub is_current: bool,
    pub appended_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Slideshow ordonné.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderedSlideshowResponse {
    pub slideshow_id: PlaylistId,
    pub created_at: DateTime<Utc>,
    pub current_image_id: Option<ImageId>,
    pub images: Vec<OrderedImageResponse>,
}

impl From<PlaylistSnapshot> for OrderedSlideshowResponse {
    fn from(snapshot: PlaylistSnapshot) -> Self {
        let current_image_id = snapshot.current().map(|(entry, _)| entry.image_id);
        Self {
            slideshow_id: snapshot.playlist.id,
            created_at: snapshot.playlist.created_at,
            current_image_id,
            images: snapshot
                .entries
                .into_iter()
                .map(|(entry, image)| OrderedImageResponse {
                    id: image.id,
                    url: image.url,
                    name: image.name,
                    duration: image.duration,
                    is_current: entry.current,
                    appended_at: entry.appended_at,
                    created_at: image.created_at,
                })
                .collect(),
        }
    }
}

/// Requête de recherche d'images (égalité stricte, insensible à la casse).
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ImageSearchQuery {
    /// Nom dérivé de l'URL (ex: `beach` pour `.../Beach.jpg`)
    pub name: String,
}

/// Issue d'une preuve de lecture.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProofOfPlayResponse {
    /// `advanced` ou `ignored`
    pub status: String,
    pub played_image_id: ImageId,
    pub current_image_id: Option<ImageId>,
    /// L'image jouée n'était pas la courante
    pub resynchronized: bool,
}

/// Issue du retrait d'une image.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RemovalResponse {
    /// `not_member`, `removed` ou `slideshow_deleted`
    pub status: String,
    pub promoted_image_id: Option<ImageId>,
}

impl From<Removal> for RemovalResponse {
    fn from(removal: Removal) -> Self {
        match removal {
            Removal::NotMember => Self {
                status: "not_member".into(),
                promoted_image_id: None,
            },
            Removal::Removed { promoted } => Self {
                status: "removed".into(),
                promoted_image_id: promoted,
            },
            Removal::PlaylistDeleted => Self {
                status: "slideshow_deleted".into(),
                promoted_image_id: None,
            },
        }
    }
}

/// Résultat d'une suppression.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletionResponse {
    /// `false` si l'objet n'existait déjà plus
    pub deleted: bool,
}

/// Réponse d'erreur REST générique.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/image",
    tag = "slideshows",
    request_body = NewImage,
    responses(
        (status = 201, description = "Image validée et enregistrée", body = Image),
        (status = 400, description = "URL invalide ou injoignable", body = ErrorResponse)
    )
)]
pub async fn create_image(
    State(manager): State<PlaylistManager>,
    payload: Result<Json<NewImage>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(value) => value,
        Err(rejection) => return rejected(rejection),
    };
    tracing::info!("Adding new image {}", req.url);
    match manager.create_image(req).await {
        Ok(image) => (StatusCode::CREATED, Json(image)).into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    post,
    path = "/slideshow",
    tag = "slideshows",
    request_body = Vec<NewImage>,
    responses(
        (status = 201, description = "Slideshow créé, première image courante", body = OrderedSlideshowResponse),
        (status = 400, description = "Lot vide ou image invalide", body = ErrorResponse)
    )
)]
pub async fn create_slideshow(
    State(manager): State<PlaylistManager>,
    payload: Result<Json<Vec<NewImage>>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(value) => value,
        Err(rejection) => return rejected(rejection),
    };
    tracing::info!("Adding new slideshow, images size = {}", req.len());
    match manager.create_playlist(req).await {
        Ok(snapshot) => (
            StatusCode::CREATED,
            Json(OrderedSlideshowResponse::from(snapshot)),
        )
            .into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/slideshow/{slideshow_id}/ordered",
    tag = "slideshows",
    params(
        ("slideshow_id" = i64, Path, description = "Identifiant du slideshow")
    ),
    responses(
        (status = 200, description = "Images dans l'ordre d'ajout", body = OrderedSlideshowResponse),
        (status = 404, description = "Slideshow introuvable", body = ErrorResponse)
    )
)]
pub async fn get_ordered_slideshow(
    State(manager): State<PlaylistManager>,
    path: Result<Path<i64>, PathRejection>,
) -> Response {
    let Path(slideshow_id) = match path {
        Ok(value) => value,
        Err(rejection) => return rejected(rejection),
    };
    match manager.get_ordered_playlist(PlaylistId(slideshow_id)).await {
        Ok(snapshot) => (StatusCode::OK, Json(OrderedSlideshowResponse::from(snapshot))).into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/images/search",
    tag = "slideshows",
    params(ImageSearchQuery),
    responses(
        (status = 200, description = "Images portant ce nom", body = [Image]),
        (status = 400, description = "Nom vide", body = ErrorResponse)
    )
)]
pub async fn search_images(
    State(manager): State<PlaylistManager>,
    query: Result<Query<ImageSearchQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(value) => value,
        Err(rejection) => return rejected(rejection),
    };
    match manager.search_images_by_name(&query.name).await {
        Ok(images) => (StatusCode::OK, Json(images)).into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    post,
    path = "/slideshow/{slideshow_id}/append/{image_id}",
    tag = "slideshows",
    params(
        ("slideshow_id" = i64, Path, description = "Identifiant du slideshow"),
        ("image_id" = i64, Path, description = "Identifiant de l'image")
    ),
    responses(
        (status = 200, description = "Image ajoutée en fin de slideshow", body = crate::model::Entry),
        (status = 404, description = "Slideshow ou image introuvable", body = ErrorResponse),
        (status = 409, description = "Slideshow occupé, réessayer", body = ErrorResponse)
    )
)]
pub async fn append_image(
    State(manager): State<PlaylistManager>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Response {
    let Path((slideshow_id, image_id)) = match path {
        Ok(value) => value,
        Err(rejection) => return rejected(rejection),
    };
    tracing::info!("Appending image {} to slideshow {}", image_id, slideshow_id);
    match manager
        .append_image(PlaylistId(slideshow_id), ImageId(image_id))
        .await
    {
        Ok(entry) => (StatusCode::OK, Json(entry)).into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    delete,
    path = "/slideshow/{slideshow_id}/images/{image_id}",
    tag = "slideshows",
    params(
        ("slideshow_id" = i64, Path, description = "Identifiant du slideshow"),
        ("image_id" = i64, Path, description = "Identifiant de l'image")
    ),
    responses(
        (status = 200, description = "Image retirée du slideshow", body = RemovalResponse),
        (status = 404, description = "Slideshow introuvable", body = ErrorResponse),
        (status = 409, description = "Slideshow occupé, réessayer", body = ErrorResponse)
    )
)]
pub async fn remove_image(
    State(manager): State<PlaylistManager>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Response {
    let Path((slideshow_id, image_id)) = match path {
        Ok(value) => value,
        Err(rejection) => return rejected(rejection),
    };
    match manager
        .remove_image(PlaylistId(slideshow_id), ImageId(image_id))
        .await
    {
        Ok(removal) => (StatusCode::OK, Json(RemovalResponse::from(removal))).into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    delete,
    path = "/image/{image_id}",
    tag = "slideshows",
    params(
        ("image_id" = i64, Path, description = "Identifiant de l'image")
    ),
    responses(
        (status = 200, description = "Image supprimée de tous les slideshows", body = DeletionResponse),
        (status = 409, description = "Suppression concurrente, réessayer", body = ErrorResponse)
    )
)]
pub async fn delete_image(
    State(manager): State<PlaylistManager>,
    path: Result<Path<i64>, PathRejection>,
) -> Response {
    let Path(image_id) = match path {
        Ok(value) => value,
        Err(rejection) => return rejected(rejection),
    };
    tracing::info!("Deleting image {}", image_id);
    match manager.delete_image(ImageId(image_id)).await {
        Ok(deleted) => (StatusCode::OK, Json(DeletionResponse { deleted })).into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    delete,
    path = "/slideshow/{slideshow_id}",
    tag = "slideshows",
    params(
        ("slideshow_id" = i64, Path, description = "Identifiant du slideshow")
    ),
    responses(
        (status = 200, description = "Slideshow supprimé, images conservées", body = DeletionResponse),
        (status = 409, description = "Slideshow occupé, réessayer", body = ErrorResponse)
    )
)]
pub async fn delete_slideshow(
    State(manager): State<PlaylistManager>,
    path: Result<Path<i64>, PathRejection>,
) -> Response {
    let Path(slideshow_id) = match path {
        Ok(value) => value,
        Err(rejection) => return rejected(rejection),
    };
    tracing::info!("Deleting slideshow {}", slideshow_id);
    match manager.delete_playlist(PlaylistId(slideshow_id)).await {
        Ok(deleted) => (StatusCode::OK, Json(DeletionResponse { deleted })).into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    post,
    path = "/slideshow/{slideshow_id}/proof-of-play/{image_id}",
    tag = "slideshows",
    params(
        ("slideshow_id" = i64, Path, description = "Identifiant du slideshow"),
        ("image_id" = i64, Path, description = "Image affichée")
    ),
    responses(
        (status = 200, description = "Lecture enregistrée, image suivante courante", body = ProofOfPlayResponse),
        (status = 404, description = "Slideshow introuvable", body = ErrorResponse),
        (status = 409, description = "Slideshow occupé, réessayer", body = ErrorResponse)
    )
)]
pub async fn proof_of_play(
    State(manager): State<PlaylistManager>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Response {
    let Path((slideshow_id, image_id)) = match path {
        Ok(value) => value,
        Err(rejection) => return rejected(rejection),
    };
    tracing::info!(
        "Saving proof of play, slideshow = {}, image = {}",
        slideshow_id,
        image_id
    );
    let played = ImageId(image_id);
    match manager
        .advance_on_play(PlaylistId(slideshow_id), played)
        .await
    {
        Ok(AdvanceOutcome::Ignored) => (
            StatusCode::OK,
            Json(ProofOfPlayResponse {
                status: "ignored".into(),
                played_image_id: played,
                current_image_id: None,
                resynchronized: false,
            }),
        )
            .into_response(),
        Ok(AdvanceOutcome::Advanced {
            played,
            current,
            healed,
        }) => (
            StatusCode::OK,
            Json(ProofOfPlayResponse {
                status: "advanced".into(),
                played_image_id: played,
                current_image_id: Some(current),
                resynchronized: healed,
            }),
        )
            .into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/slideshow/{slideshow_id}/proof-of-play",
    tag = "slideshows",
    params(
        ("slideshow_id" = i64, Path, description = "Identifiant du slideshow")
    ),
    responses(
        (status = 200, description = "Historique des lectures, du plus ancien au plus récent", body = [PlayEvent])
    )
)]
pub async fn list_proofs_of_play(
    State(manager): State<PlaylistManager>,
    path: Result<Path<i64>, PathRejection>,
) -> Response {
    let Path(slideshow_id) = match path {
        Ok(value) => value,
        Err(rejection) => return rejected(rejection),
    };
    match manager.play_events(PlaylistId(slideshow_id)).await {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(err) => map_error(err),
    }
}

/// Corps ou paramètres illisibles : même format que les autres erreurs
fn rejected(rejection: impl std::fmt::Display) -> Response {
    map_error(Error::InvalidRequest(rejection.to_string()))
}

fn map_error(error: Error) -> Response {
    let status = match error.class() {
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
        ErrorClass::Retry => StatusCode::CONFLICT,
        ErrorClass::ServerError => {
            tracing::error!("Slideshow request failed: {}", error);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: format!("{:?}", error.kind()),
            message: error.to_string(),
        }),
    )
        .into_response()
}
