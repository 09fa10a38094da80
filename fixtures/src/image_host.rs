//! A stand-in for the Cloudinary upload API.
//!
//! Only the endpoints the server calls are implemented: signed upload,
//! signed destroy, and a way to fetch the stored bytes back. Images live in
//! memory for as long as the process does.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub cloud_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Shared view of everything uploaded so far
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: Arc<RwLock<HashMap<String, StoredImage>>>,
}

impl ImageStore {
    pub async fn get(&self, public_id: &str) -> Option<StoredImage> {
        self.images.read().await.get(public_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.images.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.images.read().await.is_empty()
    }
}

/// Largest upload the fake host accepts
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
struct HostState {
    public_url: String,
    store: ImageStore,
}

/// Build the fake image host. `public_url` is where clients can reach it and
/// is used to build the `secure_url` of uploaded images.
pub fn routes(public_url: String, store: ImageStore) -> Router {
    Router::new()
        .route("/v1_1/:cloud/image/upload", post(upload))
        .route("/v1_1/:cloud/image/destroy", post(destroy))
        .route("/images/*public_id", get(fetch))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(HostState { public_url, store })
}

/// Bind an ephemeral port on localhost and serve the fake host in the
/// background. Handy for tests.
pub async fn spawn() -> anyhow::Result<(SocketAddr, ImageStore)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let store = ImageStore::default();

    let app = routes(format!("http://{addr}"), store.clone());
    tokio::spawn(async move { axum::serve(listener, app).await });

    Ok((addr, store))
}

fn cloudinary_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": { "message": message } }))).into_response()
}

async fn upload(
    State(state): State<HostState>,
    Path(cloud): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let mut fields = HashMap::<String, String>::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return cloudinary_error(StatusCode::BAD_REQUEST, &err.body_text()),
        };

        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            match field.bytes().await {
                Ok(bytes) => file = Some((content_type, bytes.to_vec())),
                Err(err) => return cloudinary_error(StatusCode::BAD_REQUEST, &err.body_text()),
            }
        } else {
            match field.text().await {
                Ok(value) => {
                    fields.insert(name, value);
                }
                Err(err) => return cloudinary_error(StatusCode::BAD_REQUEST, &err.body_text()),
            }
        }
    }

    for required in ["api_key", "timestamp", "signature"] {
        if fields.get(required).map_or(true, |v| v.is_empty()) {
            return cloudinary_error(
                StatusCode::UNAUTHORIZED,
                &format!("Missing required parameter - {required}"),
            );
        }
    }

    let Some((content_type, bytes)) = file else {
        return cloudinary_error(StatusCode::BAD_REQUEST, "Missing required parameter - file");
    };

    let asset_id = Uuid::new_v4().simple().to_string();
    let public_id = match fields.get("folder").filter(|f| !f.is_empty()) {
        Some(folder) => format!("{folder}/{asset_id}"),
        None => asset_id.clone(),
    };
    let secure_url = format!("{}/images/{}", state.public_url, public_id);
    let size = bytes.len();

    state.store.images.write().await.insert(
        public_id.clone(),
        StoredImage {
            cloud_name: cloud,
            content_type: content_type.clone(),
            bytes,
        },
    );

    info!("Stored image {} ({} bytes)", public_id, size);

    Json(json!({
        "asset_id": asset_id,
        "public_id": public_id,
        "resource_type": "image",
        "format": content_type.rsplit('/').next().unwrap_or("bin"),
        "bytes": size,
        "url": &secure_url,
        "secure_url": secure_url,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct DestroyParams {
    public_id: Option<String>,
    api_key: Option<String>,
    timestamp: Option<String>,
    signature: Option<String>,
}

async fn destroy(State(state): State<HostState>, Form(params): Form<DestroyParams>) -> Response {
    let required = [
        ("api_key", &params.api_key),
        ("timestamp", &params.timestamp),
        ("signature", &params.signature),
        ("public_id", &params.public_id),
    ];
    for (name, value) in required {
        if value.as_deref().map_or(true, str::is_empty) {
            return cloudinary_error(
                StatusCode::UNAUTHORIZED,
                &format!("Missing required parameter - {name}"),
            );
        }
    }

    let public_id = params.public_id.unwrap_or_default();
    let removed = state.store.images.write().await.remove(&public_id);

    let result = if removed.is_some() { "ok" } else { "not found" };
    info!("Destroy {}: {}", public_id, result);

    Json(json!({ "result": result })).into_response()
}

async fn fetch(State(state): State<HostState>, Path(public_id): Path<String>) -> Response {
    match state.store.get(&public_id).await {
        Some(image) => ([(header::CONTENT_TYPE, image.content_type)], image.bytes).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
