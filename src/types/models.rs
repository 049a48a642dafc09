use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies an app as `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// `namespace/name`, the form stored in release records as `kube_ref`.
    pub fn qualified(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Variable names passed to git subprocesses; receive-pack forwards them to
/// the update hook, and the receive-hook subcommand reads them back.
pub const ENV_NAMESPACE: &str = "SLIPWAY_NAMESPACE";
pub const ENV_APP: &str = "SLIPWAY_APP";
pub const ENV_GIT_HOME: &str = "SLIPWAY_GIT_HOME";
pub const ENV_ORCHESTRATOR_HOST: &str = "SLIPWAY_ORCHESTRATOR_HOST";
pub const ENV_API_HOST: &str = "SLIPWAY_API_HOST";

/// Environment for one git subprocess. Built per request, never persisted.
#[derive(Debug, Clone)]
pub struct GitEnv {
    pub namespace: String,
    pub app: String,
    pub git_home: PathBuf,
    pub orchestrator_host: String,
    pub api_host: String,
}

impl GitEnv {
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_NAMESPACE, self.namespace.clone()),
            (ENV_APP, self.app.clone()),
            (ENV_GIT_HOME, self.git_home.display().to_string()),
            (ENV_ORCHESTRATOR_HOST, self.orchestrator_host.clone()),
            (ENV_API_HOST, self.api_host.clone()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    User,
    System,
}

/// Authenticated caller decoded from a JWT, threaded through handlers as a
/// per-request value.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub subject: String,
    pub customer: String,
    pub organization: String,
    pub kind: TokenKind,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn is_system(&self) -> bool {
        self.kind == TokenKind::System
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadCommit {
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub compare: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub url: String,
}

/// One recorded release revision. `head_commit` is written at creation and
/// never replaced; updates only merge `files` entries and `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitInfo {
    pub name: String,
    pub namespace: String,
    pub kube_ref: String,
    pub git_branch: String,
    pub source_type: String,
    pub head_commit: HeadCommit,
    #[serde(default)]
    pub files: BTreeMap<String, u64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Partial update to a release record: `files` entries merge in, `status`
/// replaces when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleasePatch {
    #[serde(default)]
    pub files: BTreeMap<String, u64>,
    #[serde(default)]
    pub status: Option<String>,
}
