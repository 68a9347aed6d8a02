//! HTTP endpoint integration tests.
//!
//! A mock upscale provider runs on a local port: predictions made from PNG
//! uploads succeed and point at a result image the mock serves; anything else
//! fails, exercising the error paths without touching the real provider.

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use base64::Engine as _;
use http_body_util::BodyExt;
use media_relay_server::app::{AppState, create_app};
use media_relay_server::upscale::UpscaleClient;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower::ServiceExt;

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

// ============================================================================
// Mock provider
// ============================================================================

#[derive(Clone)]
struct MockProvider {
    base_url: String,
}

async fn spawn_mock_provider() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let app = Router::new()
        .route("/v1/predictions", post(create_prediction))
        .route("/v1/predictions/{id}", get(get_prediction))
        .route("/result.png", get(result_image))
        .route("/slow_result.png", get(slow_result_image))
        .with_state(MockProvider {
            base_url: base_url.clone(),
        });

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    base_url
}

// The prediction id encodes the verdict so the mock stays stateless: PNG
// inputs succeed, everything else fails.
async fn create_prediction(Json(body): Json<Value>) -> Json<Value> {
    let data_uri = body["input"]["image"].as_str().unwrap_or_default();
    let encoded = data_uri.split("base64,").nth(1).unwrap_or_default();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap_or_default();

    let id = if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "ok"
    } else {
        "bad"
    };
    Json(json!({ "id": id, "status": "starting" }))
}

async fn get_prediction(
    State(provider): State<MockProvider>,
    Path(id): Path<String>,
) -> Json<Value> {
    if id == "ok" {
        Json(json!({
            "id": "ok",
            "status": "succeeded",
            "output": format!("{}/result.png", provider.base_url),
        }))
    } else {
        Json(json!({
            "id": "bad",
            "status": "failed",
            "error": "invalid input image",
        }))
    }
}

async fn result_image() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], png_bytes(16, 16))
}

// Serves the result only after a pause, standing in for a large download.
async fn slow_result_image() -> impl IntoResponse {
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    ([(header::CONTENT_TYPE, "image/png")], png_bytes(16, 16))
}

// ============================================================================
// Helpers
// ============================================================================

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut img = image::RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = image::Rgb([(x % 256) as u8, (y % 256) as u8, 64]);
    }
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn multipart_body(parts: &[(&str, &str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, bytes) in parts {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[(&str, &str, Vec<u8>)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

async fn test_app(provider_base: &str) -> (Router, tempfile::TempDir) {
    let work_dir = tempfile::tempdir().unwrap();
    let state = AppState {
        upscaler: Arc::new(UpscaleClient::new(provider_base, "test-token").unwrap()),
        upscale_permits: Arc::new(Semaphore::new(4)),
        ffmpeg: "ffmpeg".into(),
        work_dir: work_dir.path().to_path_buf(),
    };
    let app = create_app(state, "http://localhost:3000".parse().unwrap());
    (app, work_dir)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn assert_no_temp_files(dir: &std::path::Path) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().to_string();
        assert!(
            !name.starts_with("temp_"),
            "staged file left behind: {}",
            name
        );
    }
}

// ============================================================================
// /upscale
// ============================================================================

#[tokio::test]
async fn upscale_success_produces_webp_and_success_body() {
    let provider = spawn_mock_provider().await;
    let (app, work_dir) = test_app(&provider).await;

    let response = app
        .oneshot(multipart_request(
            "/upscale",
            &[("file", "photo.png", png_bytes(8, 8))],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "success");

    let image_path = body["image_path"].as_str().unwrap();
    assert!(image_path.ends_with("upscaled_photo.png.webp"));
    let reopened = image::open(image_path).unwrap();
    assert_eq!((reopened.width(), reopened.height()), (16, 16));

    assert_no_temp_files(work_dir.path());
}

#[tokio::test]
async fn upscale_provider_failure_returns_error_body_with_http_200() {
    let provider = spawn_mock_provider().await;
    let (app, work_dir) = test_app(&provider).await;

    let response = app
        .oneshot(multipart_request(
            "/upscale",
            &[("file", "notes.txt", b"plain text, not an image".to_vec())],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["filename"], "notes.txt");
    assert!(!body["message"].as_str().unwrap().is_empty());

    assert_no_temp_files(work_dir.path());
}

#[tokio::test]
async fn upscale_without_file_field_is_bad_request() {
    let provider = spawn_mock_provider().await;
    let (app, _work_dir) = test_app(&provider).await;

    let response = app
        .oneshot(multipart_request("/upscale", &[]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["status"], 400);
}

// Result downloads have no overall deadline; a slow provider must not fail
// the fetch.
#[tokio::test]
async fn fetch_result_image_waits_out_slow_downloads() {
    let provider = spawn_mock_provider().await;
    let client = UpscaleClient::new(&provider, "test-token").unwrap();

    let image = client
        .fetch_result_image(&format!("{}/slow_result.png", provider))
        .await
        .unwrap();

    assert_eq!((image.width(), image.height()), (16, 16));
}

// ============================================================================
// /upscale_multiple
// ============================================================================

#[tokio::test]
async fn upscale_multiple_partial_failure_returns_207() {
    let provider = spawn_mock_provider().await;
    let (app, work_dir) = test_app(&provider).await;

    let png = png_bytes(8, 8);
    let response = app
        .oneshot(multipart_request(
            "/upscale_multiple",
            &[
                ("files", "a.png", png.clone()),
                ("files", "b.txt", b"not an image".to_vec()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let body = json_body(response).await;
    assert_eq!(body["successful_files"].as_array().unwrap().len(), 1);
    assert_eq!(body["error_files"], json!(["b.txt"]));

    assert_no_temp_files(work_dir.path());
}

#[tokio::test]
async fn upscale_multiple_all_success_returns_200() {
    let provider = spawn_mock_provider().await;
    let (app, work_dir) = test_app(&provider).await;

    let png = png_bytes(8, 8);
    let response = app
        .oneshot(multipart_request(
            "/upscale_multiple",
            &[("files", "a.png", png.clone()), ("files", "b.png", png)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["successful_files"].as_array().unwrap().len(), 2);
    assert_eq!(body["error_files"].as_array().unwrap().len(), 0);

    assert_no_temp_files(work_dir.path());
}

// ============================================================================
// /compress
// ============================================================================

#[tokio::test]
async fn compress_round_trip_preserves_dimensions() {
    let provider = spawn_mock_provider().await;
    let (app, work_dir) = test_app(&provider).await;

    let response = app
        .oneshot(multipart_request(
            "/compress",
            &[("file", "pic.png", png_bytes(24, 16))],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "success");

    let image_path = body["image_path"].as_str().unwrap();
    assert!(image_path.ends_with("compressed_pic.png.webp"));
    let reopened = image::open(image_path).unwrap();
    assert_eq!((reopened.width(), reopened.height()), (24, 16));

    assert_no_temp_files(work_dir.path());
}

#[tokio::test]
async fn compress_rejects_undecodable_input_with_structured_error() {
    let provider = spawn_mock_provider().await;
    let (app, work_dir) = test_app(&provider).await;

    let response = app
        .oneshot(multipart_request(
            "/compress",
            &[("file", "junk.bin", b"garbage bytes".to_vec())],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["status"], 400);
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());

    // The staged file must be released even though decoding failed before
    // compression began.
    assert_no_temp_files(work_dir.path());
}

// ============================================================================
// /normalize_audio
// ============================================================================

#[tokio::test]
async fn normalize_audio_rejects_undecodable_input_with_structured_error() {
    let provider = spawn_mock_provider().await;
    let (app, work_dir) = test_app(&provider).await;

    let response = app
        .oneshot(multipart_request(
            "/normalize_audio",
            &[("file", "noise.bin", b"not an audio container".to_vec())],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["status"], 415);
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());

    // Decoding fails before any encoder runs; the staged file must still be
    // released.
    assert_no_temp_files(work_dir.path());
}
