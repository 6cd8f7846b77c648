/// Integration tests for the face service HTTP API
use auth_service::{AuthConfig, AuthService, AuthState, SqliteUserRepository};
use axum::http::{header, HeaderValue};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use face_core::synthetic::{BlobFaceDetector, MeanColorEmbedder};
use face_core::{BoundingBox, FsEnrollmentStore, RecognitionConfig, RecognitionPipeline, StoreLayout};
use face_service::{api, AccessPolicy, AppState};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

const JWT_SECRET: &str = "test-jwt-secret";
const MAX_UPLOAD: usize = 10 * 1024 * 1024;

fn face_image(faces: &[(BoundingBox, [u8; 3])]) -> Vec<u8> {
    let mut image = RgbImage::from_pixel(96, 64, Rgb([0, 0, 0]));
    for (bbox, color) in faces {
        for y in bbox.top..bbox.bottom {
            for x in bbox.left..bbox.right {
                image.put_pixel(x, y, Rgb(*color));
            }
        }
    }
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn alice_face() -> (BoundingBox, [u8; 3]) {
    (BoundingBox::from_xywh(8, 8, 24, 24), [220, 40, 40])
}

fn image_form(bytes: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "image",
        Part::bytes(bytes).file_name("upload.png").mime_type("image/png"),
    )
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

/// Helper function to create a test face service over `dir`
async fn setup_test_service(
    dir: &Path,
    access: AccessPolicy,
    layout: StoreLayout,
    max_upload_bytes: usize,
) -> TestServer {
    let pipeline = RecognitionPipeline::new(
        Arc::new(BlobFaceDetector::new()),
        Arc::new(MeanColorEmbedder::new()),
        RecognitionConfig::default(),
    );
    let store = Arc::new(FsEnrollmentStore::new(dir, layout));
    let users = SqliteUserRepository::in_memory().await.unwrap();
    let auth = AuthState::new(Arc::new(AuthService::new(
        Arc::new(users),
        AuthConfig::with_secret(JWT_SECRET),
    )));

    let state = AppState::new(pipeline, store, auth, access, max_upload_bytes);
    TestServer::new(api::router(state)).unwrap()
}

async fn open_service(dir: &Path) -> TestServer {
    setup_test_service(dir, AccessPolicy::open(), StoreLayout::PerLabel, MAX_UPLOAD).await
}

async fn register_and_login(server: &TestServer, username: &str, password: &str) -> String {
    let response = server
        .post("/register")
        .json(&json!({ "username": username, "password": password }))
        .await;
    assert_eq!(response.status_code(), 200);

    let response = server
        .post("/login")
        .form(&[("username", username), ("password", password)])
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let server = open_service(dir.path()).await;

    let response = server.get("/healthz").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["status"], "healthy");

    let response = server.get("/readyz").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["detector"], "synthetic_blob");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let server = open_service(dir.path()).await;

    server
        .post("/recognizer")
        .multipart(image_form(face_image(&[alice_face()])))
        .await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("facegate_recognition_requests_total"));
}

#[tokio::test]
async fn test_open_mode_enroll_and_recognize() {
    let dir = tempfile::tempdir().unwrap();
    let server = open_service(dir.path()).await;
    let photo = face_image(&[alice_face()]);

    let response = server
        .post("/add_image")
        .add_query_param("name", "alice")
        .multipart(image_form(photo.clone()))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["message"], "Image added successfully");
    let filename = body["filename"].as_str().unwrap();
    assert!(dir.path().join("alice").join(filename).is_file());

    let response = server.post("/recognizer").multipart(image_form(photo)).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(
        body,
        json!([{ "top": 8, "right": 32, "bottom": 32, "left": 8, "name": "alice" }])
    );
}

#[tokio::test]
async fn test_recognizer_distinguishes_bad_image_from_no_faces() {
    let dir = tempfile::tempdir().unwrap();
    let server = open_service(dir.path()).await;

    let response = server
        .post("/recognizer")
        .multipart(image_form(b"not an image at all".to_vec()))
        .await;
    assert_eq!(response.status_code(), 400);
    assert!(response.json::<Value>()["error"].is_string());

    let response = server
        .post("/recognizer")
        .multipart(image_form(face_image(&[])))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>(), json!([]));
}

#[tokio::test]
async fn test_recognizer_requires_image_field() {
    let dir = tempfile::tempdir().unwrap();
    let server = open_service(dir.path()).await;

    let form = MultipartForm::new().add_text("note", "no image here");
    let response = server.post("/recognizer").multipart(form).await;
    assert_eq!(response.status_code(), 422);
}

#[tokio::test]
async fn test_add_image_rejections() {
    let dir = tempfile::tempdir().unwrap();
    let server = open_service(dir.path()).await;
    let photo = face_image(&[alice_face()]);

    let missing_name = server.post("/add_image").multipart(image_form(photo.clone())).await;
    assert_eq!(missing_name.status_code(), 422);

    let traversal = server
        .post("/add_image")
        .add_query_param("name", "../escape")
        .multipart(image_form(photo))
        .await;
    assert_eq!(traversal.status_code(), 400);

    let garbage = server
        .post("/add_image")
        .add_query_param("name", "alice")
        .multipart(image_form(b"garbage".to_vec()))
        .await;
    assert_eq!(garbage.status_code(), 400);

    // Nothing reached the store.
    assert_eq!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0), 0);
}

#[tokio::test]
async fn test_flat_files_layout_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let server =
        setup_test_service(dir.path(), AccessPolicy::open(), StoreLayout::FlatFiles, MAX_UPLOAD).await;
    let photo = face_image(&[alice_face()]);

    let first = server
        .post("/add_image")
        .add_query_param("name", "alice")
        .multipart(image_form(photo.clone()))
        .await;
    assert_eq!(first.status_code(), 200);
    assert_eq!(first.json::<Value>()["filename"], "alice.png");

    let second = server
        .post("/add_image")
        .add_query_param("name", "alice")
        .multipart(image_form(photo))
        .await;
    assert_eq!(second.status_code(), 500);
}

#[tokio::test]
async fn test_upload_limit() {
    let dir = tempfile::tempdir().unwrap();
    let server = setup_test_service(dir.path(), AccessPolicy::open(), StoreLayout::PerLabel, 1024).await;

    let oversized: Vec<u8> = (0..16 * 1024).map(|i| (i % 251) as u8).collect();
    let response = server.post("/recognizer").multipart(image_form(oversized)).await;
    assert_eq!(response.status_code(), 413);
}

#[tokio::test]
async fn test_list_labels() {
    let dir = tempfile::tempdir().unwrap();
    let server = open_service(dir.path()).await;

    for name in ["bob", "alice", "bob"] {
        let response = server
            .post("/add_image")
            .add_query_param("name", name)
            .multipart(image_form(face_image(&[alice_face()])))
            .await;
        assert_eq!(response.status_code(), 200);
    }

    let response = server.get("/labels").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.json::<Value>(),
        json!({
            "labels": [
                { "label": "alice", "images": 1 },
                { "label": "bob", "images": 2 }
            ],
            "count": 2
        })
    );
}

#[tokio::test]
async fn test_authenticated_mode_enrollment_uses_account() {
    let dir = tempfile::tempdir().unwrap();
    let server = setup_test_service(
        dir.path(),
        AccessPolicy::authenticated(false),
        StoreLayout::PerUserPics,
        MAX_UPLOAD,
    )
    .await;
    let photo = face_image(&[alice_face()]);

    let anonymous = server
        .post("/add_image")
        .add_query_param("name", "alice")
        .multipart(image_form(photo.clone()))
        .await;
    assert_eq!(anonymous.status_code(), 401);
    assert_eq!(anonymous.header(header::WWW_AUTHENTICATE), "Bearer");

    let token = register_and_login(&server, "alice", "wonderland").await;

    // The query name is ignored; the account decides the label.
    let response = server
        .post("/add_image")
        .add_query_param("name", "someone_else")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .multipart(image_form(photo.clone()))
        .await;
    assert_eq!(response.status_code(), 200);
    let filename = response.json::<Value>()["filename"].as_str().unwrap().to_string();
    assert!(dir.path().join("alice").join("pics").join(&filename).is_file());
    assert!(!dir.path().join("someone_else").exists());

    // Recognition stays open unless explicitly protected.
    let response = server.post("/recognizer").multipart(image_form(photo)).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.json::<Value>(),
        json!([{
            "face_location": { "top": 8, "right": 32, "bottom": 32, "left": 8 },
            "name": "alice"
        }])
    );
}

#[tokio::test]
async fn test_protected_recognizer() {
    let dir = tempfile::tempdir().unwrap();
    let server = setup_test_service(
        dir.path(),
        AccessPolicy::authenticated(true),
        StoreLayout::PerUserPics,
        MAX_UPLOAD,
    )
    .await;
    let photo = face_image(&[alice_face()]);

    let anonymous = server.post("/recognizer").multipart(image_form(photo.clone())).await;
    assert_eq!(anonymous.status_code(), 401);

    let forged = server
        .post("/recognizer")
        .add_header(header::AUTHORIZATION, bearer("forged.token.value"))
        .multipart(image_form(photo.clone()))
        .await;
    assert_eq!(forged.status_code(), 401);

    let token = register_and_login(&server, "bob", "builder").await;
    let response = server
        .post("/recognizer")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .multipart(image_form(photo))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()[0]["name"], "Unknown");
}
