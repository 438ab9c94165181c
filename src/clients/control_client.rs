use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::models::{AddFileRequest, AddFileResponse, HealthResponse};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to the preview server failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("preview server answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Talks to a running coordinator over its control API
#[derive(Debug, Clone)]
pub struct ControlClient {
    client: Client,
    base_url: String,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status, body })
    }

    /// Register a file with the coordinator and return its session id
    pub async fn add_file(&self, path: &Path) -> Result<String, ClientError> {
        debug!(path = ?path, "adding file through control API");
        let request = AddFileRequest {
            path: path.display().to_string(),
        };
        let response = self
            .client
            .post(format!("{}/", self.base_url))
            .json(&request)
            .send()
            .await?;
        let added: AddFileResponse = Self::check(response).await?.json().await?;
        Ok(added.id)
    }

    /// Session id of a previewed file, `None` when it is not previewed
    pub async fn get_id(&self, path: &Path) -> Result<Option<String>, ClientError> {
        let response = self
            .client
            .get(format!("{}/getid", self.base_url))
            .query(&[("path", path.display().to_string())])
            .send()
            .await?;
        let id = Self::check(response).await?.text().await?;
        Ok(Some(id).filter(|id| !id.is_empty()))
    }

    /// Stop previewing one session
    pub async fn delete_session(&self, id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(format!("{}/", self.base_url))
            .query(&[("id", id)])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Remove every session and stop the coordinator
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(format!("{}/", self.base_url))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
