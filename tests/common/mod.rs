use std::net::SocketAddr;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use tempfile::TempDir;

pub const AUTH_SECRET: &str = "integration-test-secret";
pub const WEBHOOK_SECRET: &str = "integration-hook-secret";

/// Orchestrator stand-in. Knows a fixed set of apps and deployments and
/// records every merge-patch it receives.
#[derive(Clone, Default)]
pub struct StubOrchestrator {
    pub deployments: Arc<Vec<Value>>,
    pub patches: Arc<Mutex<Vec<(String, Value)>>>,
}

impl StubOrchestrator {
    pub fn with_deployments(deployments: Vec<Value>) -> Self {
        Self {
            deployments: Arc::new(deployments),
            ..Default::default()
        }
    }

    pub async fn serve(&self) -> SocketAddr {
        async fn app_exists(AxumPath((namespace, app)): AxumPath<(String, String)>) -> StatusCode {
            if namespace == "acme" && app == "web" {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            }
        }

        async fn select(
            State(stub): State<StubOrchestrator>,
            Query(_query): Query<std::collections::HashMap<String, String>>,
        ) -> Json<Value> {
            Json(Value::Array(stub.deployments.as_ref().clone()))
        }

        async fn apply_patch(
            State(stub): State<StubOrchestrator>,
            AxumPath((_namespace, name)): AxumPath<(String, String)>,
            Json(body): Json<Value>,
        ) -> StatusCode {
            stub.patches.lock().unwrap().push((name, body));
            StatusCode::OK
        }

        let router = Router::new()
            .route("/apps/{namespace}/{app}", get(app_exists))
            .route("/deployments", get(select))
            .route("/deployments/{namespace}/{name}", patch(apply_patch))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub orchestrator");
        let addr = listener.local_addr().expect("stub local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("stub orchestrator");
        });
        addr
    }
}

pub struct TestServer {
    pub temp_dir: TempDir,
    pub base_url: String,
    server_process: Option<Child>,
}

impl TestServer {
    pub async fn start(orchestrator_url: &str) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let base_url = format!("http://127.0.0.1:{port}");

        let server_process = Command::new(env!("CARGO_BIN_EXE_slipway"))
            .args(["serve", "--data-dir"])
            .arg(temp_dir.path())
            .args(["--host", "127.0.0.1", "--port", &port.to_string()])
            .args(["--public-base-url", &base_url])
            .env("SLIPWAY_AUTH_SECRET", AUTH_SECRET)
            .env("SLIPWAY_ORCHESTRATOR_URL", orchestrator_url)
            .env("SLIPWAY_WEBHOOK_SECRET", WEBHOOK_SECRET)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("start server");

        Self::wait_for_ready(&base_url).await;

        Self {
            temp_dir,
            base_url,
            server_process: Some(server_process),
        }
    }

    async fn wait_for_ready(base_url: &str) {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if let Ok(resp) = client.get(format!("{base_url}/healthz")).send().await {
                if resp.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        panic!("Server did not become ready");
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(mut process) = self.server_process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

/// HS256 user token accepted by the server's auth gate.
pub fn user_token() -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = json!({
        "sub": "test-user",
        "customer": "cust-1",
        "org": "org-1",
        "type": "user",
        "iat": now,
        "exp": now + 3600,
    });
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(AUTH_SECRET.as_bytes()),
    )
    .expect("encode token")
}

pub fn sign_webhook(body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("webhook hmac key");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

pub fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

/// Work repository with one commit on `main`, built the same way the server
/// fixtures are, so pushes have real history behind them.
pub fn create_work_repo(dir: &Path) -> String {
    let repo = git2::Repository::init(dir).expect("init work repo");
    repo.set_head("refs/heads/main").expect("set HEAD");

    let procfile = repo.blob(b"web: ./run.sh\n").expect("create blob");
    let mut tree = repo.treebuilder(None).expect("create treebuilder");
    tree.insert("Procfile", procfile, 0o100644)
        .expect("insert Procfile");
    let tree_oid = tree.write().expect("write tree");
    let tree = repo.find_tree(tree_oid).expect("find tree");

    let sig = git2::Signature::now("Test User", "test@example.com").expect("create signature");
    let commit = repo
        .commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
        .expect("create commit");

    commit.to_string()
}
