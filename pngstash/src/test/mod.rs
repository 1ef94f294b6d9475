
use std::{sync::Arc, time::Duration};

use axum::http::{Method, StatusCode, header};
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::{
    Application,
    api::models::images::ImageResponse,
    index::tests::{ChannelIndex, FailingIndex},
    ingest::data_url,
};
use utils::{auth_header, create_test_config, create_test_server, create_test_state, png_bytes, stored_files, upload_body};

/// End-to-end: a PNG data URL is stored under the site name and served back from /images/
#[test_log::test(tokio::test)]
async fn test_e2e_upload_and_fetch() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(dir.path()), None);
    let server = create_test_server(&state);
    let (name, value) = auth_header();

    let response = server
        .post("/stringtopng")
        .add_header(name, value)
        .json(&upload_body("acme", &data_url::encode("image/png", &png_bytes())))
        .await;

    response.assert_status_ok();
    assert_eq!(response.header(header::CONTENT_TYPE), "application/json");
    let body: ImageResponse = response.json();
    assert_eq!(
        body,
        ImageResponse {
            success: true,
            filepath: "acme-20240102030405.png".to_string(),
        }
    );
    assert_eq!(std::fs::read(dir.path().join(&body.filepath)).unwrap(), png_bytes());

    let image = server.get(&format!("/images/{}", body.filepath)).await;
    image.assert_status_ok();
    assert_eq!(image.as_bytes().as_ref(), png_bytes().as_slice());
    assert_eq!(image.header(header::CONTENT_TYPE), "image/png");
}

#[tokio::test]
async fn test_trailing_slash_route() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(dir.path()), None);
    let server = create_test_server(&state);
    let (name, value) = auth_header();

    let response = server
        .post("/stringtopng/")
        .add_header(name, value)
        .json(&upload_body("acme", &data_url::encode("image/png", &png_bytes())))
        .await;

    response.assert_status_ok();
    assert_eq!(stored_files(dir.path()), vec!["acme-20240102030405.png"]);
}

#[tokio::test]
async fn test_body_is_json_whatever_the_content_type() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(dir.path()), None);
    let server = create_test_server(&state);
    let (name, value) = auth_header();

    let body = upload_body("acme", &data_url::encode("image/png", &png_bytes())).to_string();
    let response = server.post("/stringtopng").add_header(name, value).text(body).await;

    response.assert_status_ok();
    assert_eq!(stored_files(dir.path()).len(), 1);
}

#[tokio::test]
async fn test_minimal_png_data_url() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(&create_test_state(create_test_config(dir.path()), None));
    let (name, value) = auth_header();

    let response = server
        .post("/stringtopng")
        .add_header(name, value)
        .json(&serde_json::json!({
            "Sitename": "acme",
            "Dataurl": "data:image/png;base64,iVBORw0KGgo="
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<serde_json::Value>(),
        serde_json::json!({"Success": true, "Filepath": "acme-20240102030405.png"})
    );
    assert_eq!(
        std::fs::read(dir.path().join("acme-20240102030405.png")).unwrap(),
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
    );
}

#[tokio::test]
async fn test_jpeg_data_url_is_rejected() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(&create_test_state(create_test_config(dir.path()), None));
    let (name, value) = auth_header();

    let response = server
        .post("/stringtopng")
        .add_header(name, value)
        .json(&serde_json::json!({
            "Sitename": "acme",
            "Dataurl": "data:image/jpeg;base64,/9j/4AAQ=="
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(stored_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_non_png_is_rejected_without_write() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(dir.path()), None);
    let server = create_test_server(&state);
    let (name, value) = auth_header();

    let response = server
        .post("/stringtopng")
        .add_header(name, value)
        .json(&upload_body("acme", &data_url::encode("image/jpeg", &[0xFF, 0xD8, 0xFF, 0xE0])))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "Unsupported image type");
    assert!(stored_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(dir.path()), None);
    let server = create_test_server(&state);
    let (name, value) = auth_header();

    let response = server.post("/stringtopng").add_header(name, value).text("{\"Sitename\": ").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "Malformed JSON body");
    assert!(stored_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_malformed_data_url_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(dir.path()), None);
    let server = create_test_server(&state);
    let (name, value) = auth_header();

    let response = server
        .post("/stringtopng")
        .add_header(name, value)
        .json(&upload_body("acme", "data:image/png;base64,@@@not-base64@@@"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "Bad request");
    assert!(stored_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_traversal_sitename_is_rejected() {
    let dir = TempDir::new().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir(&images).unwrap();
    let state = create_test_state(create_test_config(&images), None);
    let server = create_test_server(&state);
    let (name, value) = auth_header();

    let response = server
        .post("/stringtopng")
        .add_header(name, value)
        .json(&upload_body("../escape", &data_url::encode("image/png", &png_bytes())))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(stored_files(&images).is_empty());
    assert_eq!(stored_files(dir.path()), vec!["images"]);
}

#[tokio::test]
async fn test_other_methods_are_not_allowed() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(dir.path()), None);
    let server = create_test_server(&state);

    let response = server.get("/stringtopng").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.header(header::ALLOW), "POST");
    assert_eq!(response.text(), "GET not allowed");

    let response = server.method(Method::PUT, "/stringtopng").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.text(), "PUT not allowed");

    assert!(stored_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_upload_requires_credentials() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(dir.path()), None);
    let server = create_test_server(&state);
    let payload = upload_body("acme", &data_url::encode("image/png", &png_bytes()));

    let response = server.post("/stringtopng").json(&payload).await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.header(header::WWW_AUTHENTICATE), "Basic realm=\"pngstash\"");

    let response = server
        .post("/stringtopng")
        .add_header("authorization", "Basic aW1hZ2VzOndyb25n")
        .json(&payload)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    assert!(stored_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_auth_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.auth.enabled = false;
    let server = create_test_server(&create_test_state(config, None));

    let response = server
        .post("/stringtopng")
        .json(&upload_body("acme", &data_url::encode("image/png", &png_bytes())))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_static_images_need_no_credentials() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("acme-20240102030405.png"), png_bytes()).unwrap();
    let server = create_test_server(&create_test_state(create_test_config(dir.path()), None));

    server.get("/images/acme-20240102030405.png").await.assert_status_ok();
    server.get("/images/missing.png").await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_response_carries_cors_header() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(&create_test_state(create_test_config(dir.path()), None));
    let (name, value) = auth_header();

    let response = server
        .post("/stringtopng")
        .add_header(name, value)
        .add_header("origin", "https://uploader.example.com")
        .json(&upload_body("acme", &data_url::encode("image/png", &png_bytes())))
        .await;

    response.assert_status_ok();
    assert_eq!(response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
}

#[tokio::test]
async fn test_preflight_bypasses_auth() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(&create_test_state(create_test_config(dir.path()), None));

    let response = server
        .method(Method::OPTIONS, "/stringtopng")
        .add_header("origin", "https://uploader.example.com")
        .add_header("access-control-request-method", "POST")
        .add_header("access-control-request-headers", "authorization, content-type")
        .await;

    response.assert_status_ok();
    assert_eq!(response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.limits.max_body_size = 1024;
    let server = create_test_server(&create_test_state(config, None));
    let (name, value) = auth_header();

    let mut big = png_bytes();
    big.resize(4096, 0);
    let response = server
        .post("/stringtopng")
        .add_header(name, value)
        .json(&upload_body("acme", &data_url::encode("image/png", &big)))
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert!(stored_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_stored_image_is_indexed() {
    let dir = TempDir::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let state = create_test_state(create_test_config(dir.path()), Some(Arc::new(ChannelIndex(tx))));
    let server = create_test_server(&state);
    let (name, value) = auth_header();

    server
        .post("/stringtopng")
        .add_header(name, value)
        .json(&upload_body("acme", &data_url::encode("image/png", &png_bytes())))
        .await
        .assert_status_ok();

    let entry = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("index record was not written")
        .unwrap();
    assert_eq!(entry.filename, "acme-20240102030405.png");
    assert_eq!(entry.label, "acme");
    assert_eq!(entry.size_bytes, png_bytes().len() as u64);
    assert_eq!(entry.stored_at, utils::test_time());
}

#[test_log::test(tokio::test)]
async fn test_failing_index_does_not_fail_upload() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(dir.path()), Some(Arc::new(FailingIndex)));
    let server = create_test_server(&state);
    let (name, value) = auth_header();

    let response = server
        .post("/stringtopng")
        .add_header(name, value)
        .json(&upload_body("acme", &data_url::encode("image/png", &png_bytes())))
        .await;

    response.assert_status_ok();
    assert_eq!(stored_files(dir.path()), vec!["acme-20240102030405.png"]);
}

#[tokio::test]
async fn test_disambiguate_policy_over_http() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.naming.collision = crate::ingest::CollisionPolicy::Disambiguate;
    let server = create_test_server(&create_test_state(config, None));
    let payload = upload_body("acme", &data_url::encode("image/png", &png_bytes()));

    let mut names = Vec::new();
    for _ in 0..2 {
        let (name, value) = auth_header();
        let response = server.post("/stringtopng").add_header(name, value).json(&payload).await;
        response.assert_status_ok();
        names.push(response.json::<ImageResponse>().filepath);
    }

    assert_eq!(names, vec!["acme-20240102030405.png", "acme-20240102030405-1.png"]);
}

#[tokio::test]
async fn test_application_creates_image_dir() {
    let dir = TempDir::new().unwrap();
    let images = dir.path().join("nested").join("images");
    let app = Application::new(create_test_config(&images)).await.unwrap();
    assert!(images.is_dir());

    let server = app.into_test_server();
    let response = server.get("/healthz").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn test_application_rejects_file_as_image_dir() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("images");
    std::fs::write(&file, b"not a directory").unwrap();

    assert!(Application::new(create_test_config(&file)).await.is_err());
}

#[tokio::test]
async fn test_openapi_json_endpoints() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(&create_test_state(create_test_config(dir.path()), None));

    let response = server.get("/api-docs/openapi.json").await;
    response.assert_status_ok();
    let content = response.text();
    assert!(content.contains("\"openapi\""));
    assert!(content.contains("/stringtopng"));

    server.get("/docs").await.assert_status_ok();
}
