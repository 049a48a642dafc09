use async_trait::async_trait;
use reqwest::{Method, StatusCode, header};

use crate::config::GitHubConfig;
use crate::error::{Error, Result};

use super::types::{Hook, NewHook, RepoSearchPage, RepoSummary};

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";

/// Repository host operations the hook manager and listing proxies need.
#[async_trait]
pub trait GitHost: Send + Sync {
    async fn list_hooks(&self, owner: &str, repo: &str) -> Result<Vec<Hook>>;
    async fn create_hook(&self, owner: &str, repo: &str, hook: &NewHook) -> Result<Hook>;
    async fn delete_hook(&self, owner: &str, repo: &str, id: u64) -> Result<()>;
    async fn org_repos(&self, org: &str) -> Result<Vec<RepoSummary>>;
    async fn user_repos(&self) -> Result<Vec<RepoSummary>>;
    async fn search_repos(&self, query: &str) -> Result<RepoSearchPage>;
}

/// GitHub REST v3 client authenticated with the platform token.
pub struct GitHubApi {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubApi {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{path}", self.api_url))
            .header(header::ACCEPT, ACCEPT_GITHUB_JSON);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }
}

#[async_trait]
impl GitHost for GitHubApi {
    async fn list_hooks(&self, owner: &str, repo: &str) -> Result<Vec<Hook>> {
        let resp = self
            .request(Method::GET, &format!("/repos/{owner}/{repo}/hooks"))
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound);
        }
        Ok(resp.error_for_status()?.json().await?)
    }

    async fn create_hook(&self, owner: &str, repo: &str, hook: &NewHook) -> Result<Hook> {
        let resp = self
            .request(Method::POST, &format!("/repos/{owner}/{repo}/hooks"))
            .json(hook)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound);
        }
        Ok(resp.error_for_status()?.json().await?)
    }

    async fn delete_hook(&self, owner: &str, repo: &str, id: u64) -> Result<()> {
        let resp = self
            .request(Method::DELETE, &format!("/repos/{owner}/{repo}/hooks/{id}"))
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound);
        }
        resp.error_for_status()?;
        Ok(())
    }

    async fn org_repos(&self, org: &str) -> Result<Vec<RepoSummary>> {
        let resp = self
            .request(Method::GET, &format!("/orgs/{org}/repos"))
            .query(&[("per_page", "100")])
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound);
        }
        Ok(resp.error_for_status()?.json().await?)
    }

    async fn user_repos(&self) -> Result<Vec<RepoSummary>> {
        let repos = self
            .request(Method::GET, "/user/repos")
            .query(&[("per_page", "100")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(repos)
    }

    async fn search_repos(&self, query: &str) -> Result<RepoSearchPage> {
        let page = self
            .request(Method::GET, "/search/repositories")
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(page)
    }
}


#[cfg(test)]
pub(crate) mod fake {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    /// In-memory host keyed by (owner, repo), recording hook churn.
    pub struct FakeGitHost {
        pub hooks: Mutex<BTreeMap<(String, String), Vec<Hook>>>,
        pub created: Mutex<Vec<(String, String, u64)>>,
        pub deleted: Mutex<Vec<(String, String, u64)>>,
        next_id: AtomicU64,
    }

    impl Default for FakeGitHost {
        fn default() -> Self {
            Self {
                hooks: Mutex::default(),
                created: Mutex::default(),
                deleted: Mutex::default(),
                next_id: AtomicU64::new(1),
            }
        }
    }

    impl FakeGitHost {
        pub fn with_hook(owner: &str, repo: &str, hook: Hook) -> Self {
            let host = Self {
                next_id: AtomicU64::new(hook.id + 1),
                ..Default::default()
            };
            host.hooks
                .lock()
                .unwrap()
                .insert((owner.to_string(), repo.to_string()), vec![hook]);
            host
        }
    }

    #[async_trait]
    impl GitHost for FakeGitHost {
        async fn list_hooks(&self, owner: &str, repo: &str) -> Result<Vec<Hook>> {
            Ok(self
                .hooks
                .lock()
                .unwrap()
                .get(&(owner.to_string(), repo.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn create_hook(&self, owner: &str, repo: &str, hook: &NewHook) -> Result<Hook> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let created = Hook {
                id,
                active: hook.active,
                events: hook.events.clone(),
                config: hook.config.clone(),
            };
            self.hooks
                .lock()
                .unwrap()
                .entry((owner.to_string(), repo.to_string()))
                .or_default()
                .push(created.clone());
            self.created
                .lock()
                .unwrap()
                .push((owner.to_string(), repo.to_string(), id));
            Ok(created)
        }

        async fn delete_hook(&self, owner: &str, repo: &str, id: u64) -> Result<()> {
            let mut hooks = self.hooks.lock().unwrap();
            let Some(repo_hooks) = hooks.get_mut(&(owner.to_string(), repo.to_string())) else {
                return Err(Error::NotFound);
            };
            let before = repo_hooks.len();
            repo_hooks.retain(|h| h.id != id);
            if repo_hooks.len() == before {
                return Err(Error::NotFound);
            }
            self.deleted
                .lock()
                .unwrap()
                .push((owner.to_string(), repo.to_string(), id));
            Ok(())
        }

        async fn org_repos(&self, _org: &str) -> Result<Vec<RepoSummary>> {
            Ok(Vec::new())
        }

        async fn user_repos(&self) -> Result<Vec<RepoSummary>> {
            Ok(Vec::new())
        }

        async fn search_repos(&self, _query: &str) -> Result<RepoSearchPage> {
            Ok(RepoSearchPage {
                total_count: 0,
                items: Vec::new(),
            })
        }
    }
}
