//! Server configuration, loaded with the following priority (highest to
//! lowest): CLI flags, environment variables (SLIPWAY_*), TOML config file,
//! default values.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public base URL GitHub can reach (e.g. "https://git.example.com").
    /// Webhook callback URLs are derived from it.
    pub public_base_url: Option<String>,
    pub auth: AuthConfig,
    pub github: GitHubConfig,
    pub orchestrator: OrchestratorConfig,
    pub identity: IdentityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
            auth: AuthConfig::default(),
            github: GitHubConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            identity: IdentityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret for verifying and signing HS256 system tokens.
    pub secret: String,
    /// PEM file with the RSA public key for user tokens. RS256 tokens are
    /// rejected when unset.
    pub public_key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    /// Platform token used for hook management and repository listing.
    pub token: Option<String>,
    /// Shared secret GitHub signs webhook deliveries with.
    pub webhook_secret: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            webhook_secret: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub url: String,
    pub token: Option<String>,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("slipway.db")
    }

    /// Where GitHub should deliver webhooks; also the ownership discriminant
    /// for hooks this platform created.
    pub fn callback_url(&self) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/hooks", base.trim_end_matches('/')))
    }

    /// Base URL the update hook calls back on. Falls back to the bind address
    /// when no public URL is configured.
    #[must_use]
    pub fn api_base_url(&self) -> String {
        match &self.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Loads the file when given, otherwise starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)
                    .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(host) = std::env::var("SLIPWAY_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("SLIPWAY_PORT") {
            self.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid SLIPWAY_PORT: {port}")))?;
        }
        if let Ok(dir) = std::env::var("SLIPWAY_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("SLIPWAY_PUBLIC_URL") {
            self.public_base_url = Some(url);
        }
        if let Ok(secret) = std::env::var("SLIPWAY_AUTH_SECRET") {
            self.auth.secret = secret;
        }
        if let Ok(path) = std::env::var("SLIPWAY_AUTH_PUBLIC_KEY") {
            self.auth.public_key_path = Some(PathBuf::from(path));
        }
        if let Ok(url) = std::env::var("SLIPWAY_GITHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Ok(token) = std::env::var("SLIPWAY_GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Ok(secret) = std::env::var("SLIPWAY_WEBHOOK_SECRET") {
            self.github.webhook_secret = Some(secret);
        }
        if let Ok(url) = std::env::var("SLIPWAY_ORCHESTRATOR_URL") {
            self.orchestrator.url = url;
        }
        if let Ok(token) = std::env::var("SLIPWAY_ORCHESTRATOR_TOKEN") {
            self.orchestrator.token = Some(token);
        }
        if let Ok(url) = std::env::var("SLIPWAY_IDENTITY_URL") {
            self.identity.url = url;
        }
        if let Ok(token) = std::env::var("SLIPWAY_IDENTITY_TOKEN") {
            self.identity.token = Some(token);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.secret.is_empty() {
            return Err(Error::Config(
                "auth.secret must be set (SLIPWAY_AUTH_SECRET)".to_string(),
            ));
        }
        if self.orchestrator.url.is_empty() {
            return Err(Error::Config(
                "orchestrator.url must be set (SLIPWAY_ORCHESTRATOR_URL)".to_string(),
            ));
        }
        Ok(())
    }
}
