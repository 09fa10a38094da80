use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::eyre::eyre;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::pin::Image;

/// A file received from a client, on its way to the image host
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageHostError {
    #[error("request to image host failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("image host responded {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("image host could not delete {public_id}: {result}")]
    DestroyFailed { public_id: String, result: String },
}

/// Where pin images live
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, upload: ImageUpload) -> Result<Image, ImageHostError>;

    async fn destroy(&self, public_id: &str) -> Result<(), ImageHostError>;
}

#[derive(Clone)]
pub struct CloudinaryConfig {
    pub base_url: String,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("base_url", &self.base_url)
            .field("cloud_name", &self.cloud_name)
            .field("folder", &self.folder)
            .finish_non_exhaustive()
    }
}

impl CloudinaryConfig {
    pub fn from_env() -> color_eyre::Result<Self> {
        let required = |name: &str| {
            std::env::var(name).map_err(|_| eyre!("{name} environment variable not set"))
        };

        Ok(Self {
            base_url: std::env::var("IMAGE_HOST_URL")
                .unwrap_or_else(|_| "https://api.cloudinary.com".to_string()),
            cloud_name: required("CLOUD_NAME")?,
            api_key: required("CLOUD_API_KEY")?,
            api_secret: required("CLOUD_API_SECRET")?,
            folder: std::env::var("IMAGE_FOLDER").unwrap_or_else(|_| "pinterest-clone".to_string()),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/v1_1/{}/image/{}",
            self.base_url.trim_end_matches('/'),
            self.cloud_name,
            action
        )
    }
}

/// Talks to a Cloudinary-compatible upload API
#[derive(Debug, Clone)]
pub struct CloudinaryClient {
    config: CloudinaryConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig) -> color_eyre::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .use_rustls_tls()
            .build()?;

        Ok(Self { config, client })
    }

    fn sign(&self, params: &[(&str, &str)]) -> String {
        signature(params, &self.config.api_secret)
    }
}

#[async_trait]
impl ImageHost for CloudinaryClient {
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, size = upload.bytes.len()), err)]
    async fn upload(&self, upload: ImageUpload) -> Result<Image, ImageHostError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("folder", self.config.folder.as_str()),
            ("timestamp", timestamp.as_str()),
        ]);

        let file = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)?;

        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("folder", self.config.folder.clone())
            .text("timestamp", timestamp)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.config.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        let uploaded: UploadResponse = ensure_success(response).await?.json().await?;
        info!("Uploaded image {}", uploaded.public_id);

        Ok(Image {
            id: uploaded.public_id,
            url: uploaded.secure_url,
        })
    }

    #[instrument(skip(self), err)]
    async fn destroy(&self, public_id: &str) -> Result<(), ImageHostError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);

        let form = [
            ("public_id", public_id),
            ("timestamp", timestamp.as_str()),
            ("api_key", self.config.api_key.as_str()),
            ("signature", signature.as_str()),
            ("signature_algorithm", "sha256"),
        ];

        let response = self
            .client
            .post(self.config.endpoint("destroy"))
            .form(&form)
            .send()
            .await?;

        let destroyed: DestroyResponse = ensure_success(response).await?.json().await?;

        // Already gone counts as deleted
        match destroyed.result.as_str() {
            "ok" | "not found" => {
                info!("Destroyed image {} ({})", public_id, destroyed.result);
                Ok(())
            }
            _ => Err(ImageHostError::DestroyFailed {
                public_id: public_id.to_string(),
                result: destroyed.result,
            }),
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ImageHostError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    Err(ImageHostError::Rejected { status, body })
}

/// The string the image host expects us to sign: parameters sorted by
/// name, `key=value` joined with `&`.
fn string_to_sign(params: &[(&str, &str)]) -> String {
    let mut params: Vec<_> = params
        .iter()
        .filter(|(key, value)| {
            !value.is_empty() && !matches!(*key, "file" | "api_key" | "signature_algorithm")
        })
        .collect();
    params.sort_by(|a, b| a.0.cmp(b.0));

    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) fn signature(params: &[(&str, &str)], api_secret: &str) -> String {
    let payload = format!("{}{}", string_to_sign(params), api_secret);
    format!("{:x}", Sha256::digest(payload.as_bytes()))
}
