#![cfg(feature = "pmoserver")]

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::{url, FakeValidator};
use pmoslideshow::api::{
    DeletionResponse, ErrorResponse, OrderedSlideshowResponse, ProofOfPlayResponse,
};
use pmoslideshow::{slideshow_api_router, Image, MemoryStore, PlaylistManager};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

fn app(validator: FakeValidator) -> Router {
    let manager = PlaylistManager::new(
        Arc::new(MemoryStore::new()),
        Arc::new(validator),
        common::options(),
    );
    slideshow_api_router(manager)
}

async fn call<T: DeserializeOwned>(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, T) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_slideshow_lifecycle_over_http() {
    let app = app(FakeValidator::new());

    let (status, created): (_, OrderedSlideshowResponse) = call(
        &app,
        Method::POST,
        "/slideshow",
        Some(json!([
            { "url": url("beach"), "duration": 10 },
            { "url": url("birds"), "duration": 15 },
            { "url": url("butterfly"), "duration": 20 },
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.images.len(), 3);
    assert_eq!(created.current_image_id, Some(created.images[0].id));

    let id = created.slideshow_id;
    let beach = created.images[0].id;

    let (status, played): (_, ProofOfPlayResponse) = call(
        &app,
        Method::POST,
        &format!("/slideshow/{}/proof-of-play/{}", id, beach),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(played.status, "advanced");
    assert_eq!(played.current_image_id, Some(created.images[1].id));

    let (status, ordered): (_, OrderedSlideshowResponse) =
        call(&app, Method::GET, &format!("/slideshow/{}/ordered", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = ordered.images.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["beach", "birds", "butterfly"]);
    assert!(ordered.images[1].is_current);

    let (status, events): (_, Vec<serde_json::Value>) = call(
        &app,
        Method::GET,
        &format!("/slideshow/{}/proof-of-play", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.len(), 1);

    let (status, deleted): (_, DeletionResponse) =
        call(&app, Method::DELETE, &format!("/slideshow/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(deleted.deleted);

    let (status, error): (_, ErrorResponse) =
        call(&app, Method::GET, &format!("/slideshow/{}/ordered", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error.error, "NotFound");
}

#[tokio::test]
async fn test_invalid_image_is_bad_request() {
    let app = app(FakeValidator::new().reject(url("gone")));

    let (status, error): (_, ErrorResponse) = call(
        &app,
        Method::POST,
        "/slideshow",
        Some(json!([
            { "url": url("here"), "duration": 5 },
            { "url": url("gone"), "duration": 5 },
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error.message.contains(&url("gone")));

    let (status, _): (_, ErrorResponse) = call(
        &app,
        Method::POST,
        "/image",
        Some(json!({ "url": url("gone"), "duration": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_image_endpoints() {
    let app = app(FakeValidator::new());

    let (status, image): (_, Image) = call(
        &app,
        Method::POST,
        "/image",
        Some(json!({ "url": url("Tree"), "duration": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(image.name, "tree");

    let (status, found): (_, Vec<Image>) =
        call(&app, Method::GET, "/images/search?name=TREE", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, image.id);

    let (_, deleted): (_, DeletionResponse) =
        call(&app, Method::DELETE, &format!("/image/{}", image.id), None).await;
    assert!(deleted.deleted);
    let (_, deleted): (_, DeletionResponse) =
        call(&app, Method::DELETE, &format!("/image/{}", image.id), None).await;
    assert!(!deleted.deleted);

    let (status, _): (_, ErrorResponse) = call(
        &app,
        Method::POST,
        &format!("/slideshow/1/append/{}", image.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_requests_get_json_bad_request() {
    let app = app(FakeValidator::new());

    let (status, error): (_, ErrorResponse) = call(
        &app,
        Method::POST,
        "/image",
        Some(json!({ "url": url("tree") })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error.error, "InvalidRequest");
    assert!(error.message.contains("duration"));

    let (status, error): (_, ErrorResponse) = call(
        &app,
        Method::POST,
        "/slideshow",
        Some(json!({ "url": url("tree"), "duration": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error.error, "InvalidRequest");

    let (status, error): (_, ErrorResponse) =
        call(&app, Method::GET, "/slideshow/abc/ordered", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error.error, "InvalidRequest");

    let (status, _): (_, ErrorResponse) = call(
        &app,
        Method::POST,
        "/slideshow/1/proof-of-play/latest",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, error): (_, ErrorResponse) =
        call(&app, Method::GET, "/images/search", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error.error, "InvalidRequest");
}
