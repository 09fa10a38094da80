use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use pinboard::{
    image_host::{ImageHost, ImageHostError, ImageUpload},
    pin::Image,
    routes::routes,
    state::{AppState, ServerConfig},
    token::TokenConfig,
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt as _;
use uuid::Uuid;

const SECRET: &[u8] = b"api-test-secret";
const BOUNDARY: &str = "pinboard-test-boundary";

/// Every test here is rejected before the image host is reached
struct UnreachableImageHost;

#[async_trait]
impl ImageHost for UnreachableImageHost {
    async fn upload(&self, _upload: ImageUpload) -> Result<Image, ImageHostError> {
        panic!("image host should not be called")
    }

    async fn destroy(&self, _public_id: &str) -> Result<(), ImageHostError> {
        panic!("image host should not be called")
    }
}

/// Refuses every upload
struct DownImageHost;

#[async_trait]
impl ImageHost for DownImageHost {
    async fn upload(&self, _upload: ImageUpload) -> Result<Image, ImageHostError> {
        Err(ImageHostError::Rejected {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: "maintenance".to_string(),
        })
    }

    async fn destroy(&self, _public_id: &str) -> Result<(), ImageHostError> {
        Ok(())
    }
}

/// Accepts uploads and remembers what was destroyed
#[derive(Default)]
struct RecordingImageHost {
    destroyed: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageHost for RecordingImageHost {
    async fn upload(&self, upload: ImageUpload) -> Result<Image, ImageHostError> {
        Ok(Image {
            id: format!("pinterest-clone/{}", upload.file_name),
            url: format!("https://img.example.com/{}", upload.file_name),
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), ImageHostError> {
        self.destroyed.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

/// A router whose pool never connects. Requests that hit the database fail,
/// which keeps these tests honest about rejecting early.
fn app() -> Router {
    app_with(Arc::new(UnreachableImageHost), ServerConfig::default())
}

fn app_with(image_host: Arc<dyn ImageHost>, config: ServerConfig) -> Router {
    let db = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(500))
        .connect_lazy("postgres://nobody@127.0.0.1:1/pinboard")
        .unwrap();

    let state = AppState::new(db, TokenConfig::new(SECRET), image_host, config, false);

    routes(state).unwrap()
}

const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
];

fn token_cookie(user_id: Uuid) -> String {
    let token = TokenConfig::new(SECRET).issue(user_id).unwrap();
    format!("token={token}")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn new_pin_request(user_id: Uuid, body: Vec<u8>) -> Request<Body> {
    Request::post("/api/pin/new")
        .header(header::COOKIE, token_cookie(user_id))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: &str, uri: &str, user_id: Uuid, json: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, token_cookie(user_id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_login() {
    for uri in ["/api/user/me", "/api/pin/all", "/api/user/logout"] {
        let response = app()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body_json(response).await["message"], "Please Login");
    }
}

#[tokio::test]
async fn test_bad_token_is_rejected() {
    let response = app()
        .oneshot(
            Request::get("/api/user/me")
                .header(header::COOKIE, "token=not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Invalid token");
}

#[tokio::test]
async fn test_token_from_other_secret_is_rejected() {
    let token = TokenConfig::new(b"someone-else").issue(Uuid::new_v4()).unwrap();

    let response = app()
        .oneshot(
            Request::get("/api/pin/all")
                .header(header::COOKIE, format!("token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Invalid token");
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let response = app()
        .oneshot(
            Request::get("/api/user/logout")
                .header(header::COOKIE, token_cookie(Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("token=;"), "{set_cookie}");
    assert!(set_cookie.contains("Max-Age=0"), "{set_cookie}");

    assert_eq!(
        body_json(response).await["message"],
        "Logged Out Successfully"
    );
}

#[tokio::test]
async fn test_cannot_follow_yourself() {
    let me = Uuid::new_v4();

    let response = app()
        .oneshot(json_request(
            "POST",
            &format!("/api/user/follow/{me}"),
            me,
            "",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "You can't follow yourself");
}

#[tokio::test]
async fn test_invalid_ids_are_bad_requests() {
    let me = Uuid::new_v4();

    let cases = [
        ("GET", "/api/pin/not-an-id", "Invalid pin ID"),
        ("GET", "/api/user/not-an-id", "Invalid user ID"),
        ("POST", "/api/user/follow/not-an-id", "Invalid user ID"),
        ("DELETE", "/api/pin/not-an-id", "Invalid pin ID"),
    ];

    for (method, uri, message) in cases {
        let response = app()
            .oneshot(json_request(method, uri, me, ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{method} {uri}");
        assert_eq!(body_json(response).await["message"], message);
    }
}

#[tokio::test]
async fn test_delete_comment_requires_comment_id() {
    let me = Uuid::new_v4();
    let pin_id = Uuid::new_v4();

    let response = app()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/pin/comment/{pin_id}"),
            me,
            "",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Invalid comment ID");
}

#[tokio::test]
async fn test_blank_comment_is_rejected() {
    let pin_id = Uuid::new_v4();

    let response = app()
        .oneshot(json_request(
            "POST",
            &format!("/api/pin/comment/{pin_id}"),
            Uuid::new_v4(),
            r#"{"comment": "   "}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Comment is required");
}

#[tokio::test]
async fn test_update_with_blank_title_is_rejected() {
    let pin_id = Uuid::new_v4();

    let response = app()
        .oneshot(json_request(
            "PUT",
            &format!("/api/pin/{pin_id}"),
            Uuid::new_v4(),
            r#"{"title": "", "pin": "new body"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Title is required");
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let response = app()
        .oneshot(
            Request::post("/api/user/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["message"].is_string());
}

#[tokio::test]
async fn test_register_requires_all_fields() {
    let response = app()
        .oneshot(
            Request::post("/api/user/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name": "Ada", "email": "", "password": "pw"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Name, email and password are required"
    );
}

#[tokio::test]
async fn test_new_pin_without_file() {
    let body = multipart_body(&[("title", "Sunset"), ("pin", "Nice")], None);

    let response = app()
        .oneshot(new_pin_request(Uuid::new_v4(), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "No file uploaded");
}

#[tokio::test]
async fn test_new_pin_rejects_non_images() {
    let body = multipart_body(
        &[("title", "Sunset"), ("pin", "Nice")],
        Some(("notes.txt", b"just some text, not a picture")),
    );

    let response = app()
        .oneshot(new_pin_request(Uuid::new_v4(), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Uploaded file must be an image"
    );
}

#[tokio::test]
async fn test_new_pin_requires_title() {
    let body = multipart_body(&[("pin", "No title here")], Some(("pin.png", PNG_BYTES)));

    let response = app()
        .oneshot(new_pin_request(Uuid::new_v4(), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Title is required");
}

#[tokio::test]
async fn test_register_rejects_whitespace_password() {
    let response = app()
        .oneshot(
            Request::post("/api/user/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"name": "Ada", "email": "ada@example.com", "password": "   "}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Name, email and password are required"
    );
}

#[tokio::test]
async fn test_blank_comment_is_reported_before_bad_pin_id() {
    let response = app()
        .oneshot(json_request(
            "POST",
            "/api/pin/comment/not-an-id",
            Uuid::new_v4(),
            r#"{"comment": ""}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Comment is required");
}

#[tokio::test]
async fn test_malformed_comment_query_is_json() {
    let pin_id = Uuid::new_v4();
    let comment_id = Uuid::new_v4();

    let response = app()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/pin/comment/{pin_id}?commentId={comment_id}&commentId={comment_id}"),
            Uuid::new_v4(),
            "",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["message"].is_string());
}

#[tokio::test]
async fn test_oversized_upload_is_payload_too_large() {
    let config = ServerConfig {
        max_upload_bytes: 1024,
        ..ServerConfig::default()
    };
    let mut big = PNG_BYTES.to_vec();
    big.resize(16 * 1024, 0);
    let body = multipart_body(&[("title", "Huge")], Some(("huge.png", big.as_slice())));

    let response = app_with(Arc::new(UnreachableImageHost), config)
        .oneshot(new_pin_request(Uuid::new_v4(), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body_json(response).await["message"].is_string());
}

#[tokio::test]
async fn test_image_host_failure_on_upload() {
    let body = multipart_body(&[("title", "Sunset")], Some(("pin.png", PNG_BYTES)));

    let response = app_with(Arc::new(DownImageHost), ServerConfig::default())
        .oneshot(new_pin_request(Uuid::new_v4(), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["message"], "Error uploading file");
}

#[tokio::test]
async fn test_uploaded_image_is_destroyed_when_pin_cannot_be_saved() {
    let host = Arc::new(RecordingImageHost::default());
    let body = multipart_body(&[("title", "Sunset")], Some(("pin.png", PNG_BYTES)));

    // The pool can't connect, so the insert fails after the upload succeeded
    let response = app_with(host.clone(), ServerConfig::default())
        .oneshot(new_pin_request(Uuid::new_v4(), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["message"], "Error creating pin");
    assert_eq!(
        *host.destroyed.lock().unwrap(),
        vec!["pinterest-clone/pin.png".to_string()]
    );
}
