use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::IdentityConfig;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

/// Exchanges a platform user for the short-lived GitHub token stored with
/// their linked identity. Needed only for private clone URLs.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn github_access_token(&self, user: &str) -> Result<String>;
}

pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn github_access_token(&self, user: &str) -> Result<String> {
        let mut req = self
            .client
            .get(format!("{}/users/{user}/tokens/github", self.base_url));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound);
        }
        let body: AccessTokenResponse = resp.error_for_status()?.json().await?;
        Ok(body.access_token)
    }
}
