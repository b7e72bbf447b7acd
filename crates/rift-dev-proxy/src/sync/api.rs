//! HTTP client for the remote interface-definition service.

use super::types::{RemoteId, RepositoryGraph, RepositoryResponse, SyncError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// The three remote calls a sync cycle needs.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Exchange application credentials for a bearer token.
    async fn fetch_token(&self) -> Result<String, SyncError>;

    /// Fetch one repository graph.
    async fn fetch_repository(&self, id: &RemoteId, token: &str)
        -> Result<RepositoryGraph, SyncError>;

    /// Fetch the mock payload template of one interface.
    async fn fetch_payload(&self, interface_id: &RemoteId) -> Result<Value, SyncError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

/// [`RemoteApi`] over HTTP.
pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
    app_id: String,
    app_secret: String,
}

impl HttpRemoteApi {
    pub fn new(
        base_url: &str,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Fetch(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn check(resp: Response, what: &str) -> Result<Response, SyncError> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SyncError::Auth(format!("{what} returned {status}")));
        }
        if !status.is_success() {
            return Err(SyncError::Fetch(format!("{what} returned {status}")));
        }
        Ok(resp)
    }
}

fn transport(what: &str, e: reqwest::Error) -> SyncError {
    SyncError::Fetch(format!("{what}: {e}"))
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn fetch_token(&self) -> Result<String, SyncError> {
        let url = format!("{}/oauth/token", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("appid", &self.app_id), ("secret", &self.app_secret)])
            .send()
            .await
            .map_err(|e| transport("token request", e))?;
        let resp = Self::check(resp, "token request")?;

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::decode("token response", e))?;
        match body.token {
            Some(token) if !token.is_empty() => {
                debug!("Obtained remote access token");
                Ok(token)
            }
            _ => Err(SyncError::Auth("token missing from response".to_string())),
        }
    }

    async fn fetch_repository(
        &self,
        id: &RemoteId,
        token: &str,
    ) -> Result<RepositoryGraph, SyncError> {
        let url = format!("{}/repository/get", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("id", id.to_string())])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport("repository request", e))?;
        let resp = Self::check(resp, "repository request")?;

        let body: RepositoryResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::decode(format!("repository {id}"), e))?;

        if body.is_ok == Some(false) {
            return Err(SyncError::RemoteData(
                body.err_msg.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        body.data
            .ok_or_else(|| SyncError::RemoteData(format!("repository {id} has no data")))
    }

    async fn fetch_payload(&self, interface_id: &RemoteId) -> Result<Value, SyncError> {
        let url = format!("{}/app/mock/template/{}", self.base_url, interface_id);
        let resp = self
            .client
            .get(&url)
            .query(&[("scope", "response")])
            .send()
            .await
            .map_err(|e| transport("payload request", e))?;
        let resp = Self::check(resp, "payload request")?;

        resp.json()
            .await
            .map_err(|e| SyncError::decode(format!("payload of interface {interface_id}"), e))
    }
}
