use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, header};
use serde::{Deserialize, Serialize};

use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};

/// Deployment metadata mirrored from the orchestrator. Only labels and
/// annotations are ever mutated, and only via merge-patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Deployment {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Merge-patch over deployment metadata; a `None` value removes the key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetaPatch {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, Option<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Option<String>>,
}

impl MetaPatch {
    #[must_use]
    pub fn set_label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.labels.insert(key.to_string(), Some(value.into()));
        self
    }

    #[must_use]
    pub fn clear_label(mut self, key: &str) -> Self {
        self.labels.insert(key.to_string(), None);
        self
    }

    #[must_use]
    pub fn set_annotation(mut self, key: &str, value: impl Into<String>) -> Self {
        self.annotations.insert(key.to_string(), Some(value.into()));
        self
    }

    #[must_use]
    pub fn clear_annotation(mut self, key: &str) -> Self {
        self.annotations.insert(key.to_string(), None);
        self
    }
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Whether the app is known to the orchestrator.
    async fn app_exists(&self, namespace: &str, app: &str) -> Result<bool>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    /// Cross-namespace label selection; every pair must match.
    async fn select_deployments(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Deployment>>;

    /// One atomic merge-patch of labels and annotations.
    async fn patch_deployment(&self, namespace: &str, name: &str, patch: &MetaPatch)
    -> Result<()>;
}

/// REST client for the platform's orchestrator adapter.
pub struct HttpOrchestrator {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpOrchestrator {
    pub fn new(config: &OrchestratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }
}

#[async_trait]
impl Orchestrator for HttpOrchestrator {
    async fn app_exists(&self, namespace: &str, app: &str) -> Result<bool> {
        let resp = self
            .request(Method::GET, &format!("/apps/{namespace}/{app}"))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::Internal(format!(
                "orchestrator returned {status} resolving {namespace}/{app}"
            ))),
        }
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let resp = self
            .request(Method::GET, &format!("/deployments/{namespace}/{name}"))
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let deployment = resp.error_for_status()?.json().await?;
        Ok(Some(deployment))
    }

    async fn select_deployments(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Deployment>> {
        let selector = labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");

        let deployments = self
            .request(Method::GET, "/deployments")
            .query(&[("selector", selector)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(deployments)
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &MetaPatch,
    ) -> Result<()> {
        let body = serde_json::to_vec(patch)
            .map_err(|e| Error::Internal(format!("encode deployment patch: {e}")))?;

        let resp = self
            .request(Method::PATCH, &format!("/deployments/{namespace}/{name}"))
            .header(header::CONTENT_TYPE, "application/merge-patch+json")
            .body(body)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::NotFound),
            status => Err(Error::Internal(format!(
                "orchestrator returned {status} patching {namespace}/{name}"
            ))),
        }
    }
}
