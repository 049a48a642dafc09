use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::git::git_router;
use super::github::github_router;
use super::hooks::hooks_router;
use super::releases::releases_router;
use crate::auth::TokenCodec;
use crate::config::ServerConfig;
use crate::github::{GitHost, IdentityProvider};
use crate::orchestrator::Orchestrator;
use crate::repos::RepoHome;
use crate::store::ReleaseStore;
use crate::types::{GitEnv, ObjectMeta};

pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn ReleaseStore>,
    pub tokens: TokenCodec,
    pub repos: RepoHome,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub github: Arc<dyn GitHost>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Environment receive-pack passes down to the update hook.
    pub fn git_env(&self, meta: &ObjectMeta) -> GitEnv {
        GitEnv {
            namespace: meta.namespace.clone(),
            app: meta.name.clone(),
            git_home: self.repos.root().to_path_buf(),
            orchestrator_host: self.config.orchestrator.url.clone(),
            api_host: self.config.api_base_url(),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .nest("/releases", releases_router())
        .nest("/github", github_router())
        .merge(hooks_router())
        .merge(git_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

#[cfg(test)]
pub(crate) fn test_state(dir: &std::path::Path) -> Arc<AppState> {
    test_state_with(dir, crate::orchestrator::fake::FakeOrchestrator::default())
}

#[cfg(test)]
pub(crate) fn test_state_with(
    dir: &std::path::Path,
    orchestrator: crate::orchestrator::fake::FakeOrchestrator,
) -> Arc<AppState> {
    use crate::github::client::fake::FakeGitHost;
    use crate::github::identity::fake::FakeIdentityProvider;
    use crate::store::SqliteStore;

    let mut config = ServerConfig::default();
    config.data_dir = dir.to_path_buf();
    config.auth.secret = "router-test-secret".to_string();
    config.orchestrator.url = "http://orchestrator.invalid".to_string();
    config.github.webhook_secret = Some("hook-test-secret".to_string());
    config.public_base_url = Some("http://127.0.0.1:8080".to_string());

    std::fs::create_dir_all(&config.data_dir).unwrap();
    let store = SqliteStore::new(config.db_path()).unwrap();
    crate::store::ReleaseStore::initialize(&store).unwrap();

    Arc::new(AppState {
        tokens: TokenCodec::new(&config.auth.secret, None).unwrap(),
        repos: RepoHome::new(dir.join("git"), std::path::PathBuf::from("/bin/false")),
        store: Arc::new(store),
        orchestrator: Arc::new(orchestrator),
        github: Arc::new(FakeGitHost::default()),
        identity: Arc::new(FakeIdentityProvider::default()),
        config,
    })
}

#[cfg(test)]
pub(crate) fn test_user_token(state: &AppState) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    use crate::auth::token::Claims;
    use crate::types::TokenKind;

    let claims = Claims {
        sub: "user-1".to_string(),
        customer: "cust-1".to_string(),
        org: "org-1".to_string(),
        kind: TokenKind::User,
        iat: chrono::Utc::now().timestamp(),
        exp: Some(chrono::Utc::now().timestamp() + 600),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.auth.secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
pub(crate) fn test_basic_auth(user: &str, password: &str) -> String {
    use base64::Engine;

    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
    format!("Basic {encoded}")
}
