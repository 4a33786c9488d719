//! Documentation OpenAPI de l'API slideshows.

use utoipa::OpenApi;

/// Documentation OpenAPI pour l'API slideshow.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::create_image,
        crate::api::create_slideshow,
        crate::api::get_ordered_slideshow,
        crate::api::search_images,
        crate::api::append_image,
        crate::api::remove_image,
        crate::api::delete_image,
        crate::api::delete_slideshow,
        crate::api::proof_of_play,
        crate::api::list_proofs_of_play,
    ),
    components(
        schemas(
            crate::model::ImageId,
            crate::model::PlaylistId,
            crate::model::NewImage,
            crate::model::Image,
            crate::model::Entry,
            crate::model::PlayEvent,
            crate::api::OrderedImageResponse,
            crate::api::OrderedSlideshowResponse,
            crate::api::ImageSearchQuery,
            crate::api::ProofOfPlayResponse,
            crate::api::RemovalResponse,
            crate::api::DeletionResponse,
            crate::api::ErrorResponse,
        )
    ),
    tags(
        (name = "slideshows", description = "Slideshows circulaires et preuves de lecture")
    ),
    info(
        title = "PMO Slideshow API",
        version = "0.1.0",
        description = r#"
# Slideshows

Un slideshow est un anneau d'images parcouru dans l'ordre d'ajout, avec
exactement une image courante. Chaque preuve de lecture fait avancer
l'image courante vers le successeur de l'image jouée.

Codes d'erreur :
- `404` : slideshow ou image introuvable
- `400` : requête invalide, image invalide ou validation trop longue
- `409` : slideshow occupé, réessayer
- `500` : erreur interne
        "#,
        license(
            name = "MIT",
        ),
    )
)]
pub struct ApiDoc;
