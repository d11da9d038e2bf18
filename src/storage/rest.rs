use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use serde_json::json;

use crate::auth::SessionHandle;
use crate::config::BackendConfig;
use crate::error::StorageError;
use crate::http::{authorize, backend_message, build_client};
use crate::storage::{ObjectStorage, public_object_url};

fn map_reqwest_error(e: reqwest::Error) -> StorageError {
    StorageError::Transport(e.to_string())
}

/// Storage bucket client for `{url}/storage/v1`.
pub struct RestStorage {
    http: Client,
    config: Arc<BackendConfig>,
    session: SessionHandle,
}

impl RestStorage {
    pub fn new(config: Arc<BackendConfig>, session: SessionHandle) -> Result<Self, StorageError> {
        let http = build_client(&config).map_err(map_reqwest_error)?;
        Ok(Self {
            http,
            config,
            session,
        })
    }

    fn object_endpoint(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        self.config.endpoint(&format!(
            "storage/v1/object/{}/{}",
            self.config.bucket,
            encoded.join("/")
        ))
    }

    async fn check(response: Response) -> Result<Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Backend {
            status: status.as_u16(),
            message: backend_message(&body),
        })
    }
}

#[async_trait]
impl ObjectStorage for RestStorage {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn public_url(&self, path: &str) -> String {
        public_object_url(self.config.url.as_str(), &self.config.bucket, path)
    }

    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = body.len();
        let request = self
            .http
            .post(self.object_endpoint(path))
            .header("content-type", content_type)
            .header("x-upsert", "false")
            .body(body);
        let response = authorize(request, &self.config.anon_key, &self.session)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response).await?;
        tracing::debug!(path, size, "Uploaded object");
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        if paths.is_empty() {
            return Ok(());
        }
        let request = self
            .http
            .delete(
                self.config
                    .endpoint(&format!("storage/v1/object/{}", self.config.bucket)),
            )
            .json(&json!({ "prefixes": paths }));
        let response = authorize(request, &self.config.anon_key, &self.session)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response).await?;
        tracing::info!(count = paths.len(), "Deleted objects from storage");
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Bytes, StorageError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Fetch {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.bytes().await.map_err(map_reqwest_error)
    }
}
