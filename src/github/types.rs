use serde::{Deserialize, Serialize};

/// `push` webhook payload, reduced to the fields the dispatcher reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
    pub repository: EventRepository,
    #[serde(default)]
    pub compare: String,
    #[serde(default)]
    pub head_commit: Option<EventCommit>,
    #[serde(default)]
    pub sender: Option<EventSender>,
}

impl PushEvent {
    /// Branch name for `refs/heads/*` refs, `None` for tags and other refs.
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRepository {
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub clone_url: String,
    pub owner: EventOwner,
}

/// Push payloads carry the owner under `name`, most others under `login`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventOwner {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
}

impl EventOwner {
    pub fn login_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.login.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventCommit {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub author: EventAuthor,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventAuthor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSender {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// `ping` webhook payload; the zen line is echoed back to the sender.
#[derive(Debug, Clone, Deserialize)]
pub struct PingEvent {
    #[serde(default)]
    pub zen: String,
    #[serde(default)]
    pub hook_id: Option<u64>,
}

/// Repository webhook as returned by the hooks API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub id: u64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub config: HookConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Body for hook creation.
#[derive(Debug, Clone, Serialize)]
pub struct NewHook {
    pub name: &'static str,
    pub active: bool,
    pub events: Vec<String>,
    pub config: HookConfig,
}

impl NewHook {
    /// Push-only `web` hook delivering JSON to `callback_url`.
    pub fn push_hook(callback_url: &str, secret: Option<&str>) -> Self {
        Self {
            name: "web",
            active: true,
            events: vec!["push".to_string()],
            config: HookConfig {
                url: callback_url.to_string(),
                content_type: "json".to_string(),
                secret: secret.map(str::to_string),
            },
        }
    }
}

/// Repository summary for the listing and search proxies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSummary {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub clone_url: String,
    #[serde(default)]
    pub default_branch: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSearchPage {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<RepoSummary>,
}
