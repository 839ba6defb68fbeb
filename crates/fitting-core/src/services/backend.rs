//! Backend abstraction over the reconstruction service's HTTP API.
//!
//! Every network call in the crate goes through [`FittingBackend`], so the
//! orchestration can be exercised against a test double.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, FittingResult};
use crate::models::{Asset, Collection, RotationRequest, SelectedFile};
use crate::settings::ClientSettings;

/// Raw response body of a streamed request, chunk by chunk.
pub type ByteStream = BoxStream<'static, FittingResult<Bytes>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Type alias for the boxed futures returned by a backend
pub type BackendFuture<T> = Pin<Box<dyn Future<Output = FittingResult<T>> + Send>>;

/// Reply of `POST /upload/body`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct BodyUploadResponse {
    pub status: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Trait for abstracting the fitting room backend.
///
/// This trait is object-safe and can be used with `Arc<dyn FittingBackend>`.
pub trait FittingBackend: Send + Sync {
    /// Upload a garment photo and open its progress stream.
    ///
    /// Resolves once the response headers are in; a non-success status is an
    /// error and no body is read.
    fn open_cloth_stream(&self, file: SelectedFile) -> BackendFuture<ByteStream>;

    /// Upload a body photo; the reply arrives when reconstruction is done.
    fn upload_body(&self, file: SelectedFile) -> BackendFuture<BodyUploadResponse>;

    /// Fetch the authoritative asset list of a collection.
    ///
    /// Entries that do not match the [`Asset`] shape are skipped.
    fn list_assets(&self, collection: Collection) -> BackendFuture<Vec<Asset>>;

    /// Persist a garment rotation.
    fn rotate(&self, request: RotationRequest) -> BackendFuture<()>;

    /// Download model bytes from a server path or absolute URL.
    fn fetch_model(&self, url: String) -> BackendFuture<Bytes>;
}

/// Implementation for Arc<dyn FittingBackend>
impl FittingBackend for Arc<dyn FittingBackend> {
    fn open_cloth_stream(&self, file: SelectedFile) -> BackendFuture<ByteStream> {
        (**self).open_cloth_stream(file)
    }

    fn upload_body(&self, file: SelectedFile) -> BackendFuture<BodyUploadResponse> {
        (**self).upload_body(file)
    }

    fn list_assets(&self, collection: Collection) -> BackendFuture<Vec<Asset>> {
        (**self).list_assets(collection)
    }

    fn rotate(&self, request: RotationRequest) -> BackendFuture<()> {
        (**self).rotate(request)
    }

    fn fetch_model(&self, url: String) -> BackendFuture<Bytes> {
        (**self).fetch_model(url)
    }
}

/// Backend implementation over HTTP
///
/// Only connecting is bounded client-wide. The request timeout applies per
/// request to every call except the progress stream, which stays open for as
/// long as the generation runs.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpBackend {
    pub fn new(settings: &ClientSettings) -> FittingResult<Self> {
        let request_timeout = settings.request_timeout();
        let client = reqwest::Client::builder()
            .user_agent(concat!("fitting-room/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
            .build()
            .map_err(|e| ErrorKind::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.base_url().to_string(),
            client,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Turn a server path into an absolute URL; absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn file_form(file: SelectedFile) -> FittingResult<reqwest::multipart::Form> {
        let part = reqwest::multipart::Part::bytes(file.contents.to_vec())
            .file_name(file.name)
            .mime_str(&file.media_type)
            .map_err(|e| ErrorKind::InvalidFileType(e.to_string()))?;
        Ok(reqwest::multipart::Form::new().part("file", part))
    }

    async fn open_cloth_stream_inner(&self, file: SelectedFile) -> FittingResult<ByteStream> {
        let url = self.resolve("/clothes/upload/cloth/stream");
        info!(url = %url, file = %file.name, size = file.size, "Uploading garment photo");

        let response = self
            .client
            .post(&url)
            .multipart(Self::file_form(file)?)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response).await;
            warn!(status = %status, detail = %detail, "Progress stream rejected");
            return Err(ErrorKind::Transport(format!("{}: {}", status, detail)));
        }

        debug!("Progress stream opened");
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ErrorKind::from))
            .boxed())
    }

    async fn upload_body_inner(&self, file: SelectedFile) -> FittingResult<BodyUploadResponse> {
        let url = self.resolve("/upload/body");
        info!(url = %url, file = %file.name, size = file.size, "Uploading body photo");

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .multipart(Self::file_form(file)?)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response).await;
            return Err(ErrorKind::Transport(format!("{}: {}", status, detail)));
        }

        response
            .json::<BodyUploadResponse>()
            .await
            .map_err(|e| ErrorKind::Transport(format!("Failed to parse upload response: {}", e)))
    }

    async fn list_assets_inner(&self, collection: Collection) -> FittingResult<Vec<Asset>> {
        let url = self.resolve(collection.list_path());
        debug!(url = %url, "Fetching asset list");

        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ErrorKind::Catalog(format!(
                "API returned status: {}",
                response.status()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ErrorKind::Catalog(format!("Failed to parse asset list: {}", e)))?;

        parse_asset_list(&payload, collection)
    }

    async fn rotate_inner(&self, request: RotationRequest) -> FittingResult<()> {
        let url = self.resolve("/clothes/rotate");
        info!(
            filename = %request.filename,
            x = request.rotation_x,
            y = request.rotation_y,
            z = request.rotation_z,
            "Saving garment rotation"
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ErrorKind::SaveFailed(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        if status.is_success() && body.get("status").and_then(|s| s.as_str()) == Some("success") {
            Ok(())
        } else {
            let detail = detail_from_json(&body).unwrap_or_else(|| status.to_string());
            Err(ErrorKind::SaveFailed(detail))
        }
    }

    async fn fetch_model_inner(&self, url: String) -> FittingResult<Bytes> {
        let url = self.resolve(&url);
        debug!(url = %url, "Downloading model");

        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ErrorKind::Transport(format!(
                "Model download returned status: {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?)
    }
}

impl FittingBackend for HttpBackend {
    fn open_cloth_stream(&self, file: SelectedFile) -> BackendFuture<ByteStream> {
        let this = self.clone();
        Box::pin(async move { this.open_cloth_stream_inner(file).await })
    }

    fn upload_body(&self, file: SelectedFile) -> BackendFuture<BodyUploadResponse> {
        let this = self.clone();
        Box::pin(async move { this.upload_body_inner(file).await })
    }

    fn list_assets(&self, collection: Collection) -> BackendFuture<Vec<Asset>> {
        let this = self.clone();
        Box::pin(async move { this.list_assets_inner(collection).await })
    }

    fn rotate(&self, request: RotationRequest) -> BackendFuture<()> {
        let this = self.clone();
        Box::pin(async move { this.rotate_inner(request).await })
    }

    fn fetch_model(&self, url: String) -> BackendFuture<Bytes> {
        let this = self.clone();
        Box::pin(async move { this.fetch_model_inner(url).await })
    }
}

/// Coerce a `{status, bodies|clothes: [...]}` payload into typed assets.
pub fn parse_asset_list(
    payload: &serde_json::Value,
    collection: Collection,
) -> FittingResult<Vec<Asset>> {
    let status = payload.get("status").and_then(|s| s.as_str());
    if status != Some("success") {
        let detail = detail_from_json(payload).unwrap_or_else(|| "unknown error".to_string());
        return Err(ErrorKind::Catalog(detail));
    }

    let entries = payload
        .get(collection.payload_key())
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let assets = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Asset>(entry.clone()) {
            Ok(asset) => Some(asset),
            Err(e) => {
                warn!(collection = %collection, error = %e, entry = %entry, "Skipping malformed asset");
                None
            }
        })
        .collect();

    Ok(assets)
}

fn detail_from_json(body: &serde_json::Value) -> Option<String> {
    ["detail", "message"]
        .iter()
        .find_map(|key| body.get(key).and_then(|v| v.as_str()).map(str::to_string))
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<serde_json::Value>().await {
        Ok(body) => detail_from_json(&body).unwrap_or_else(|| status.to_string()),
        Err(_) => status.to_string(),
    }
}
