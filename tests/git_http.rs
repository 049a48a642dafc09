mod common;

use std::process::Command;

use serde_json::{Value, json};

use common::{StubOrchestrator, TestServer, create_work_repo, git_available, sign_webhook, user_token};

fn authed_url(base_url: &str, token: &str, path: &str) -> String {
    let creds = format!("http://x:{token}@");
    format!("{}{path}", base_url.replace("http://", &creds))
}

fn tracked_deployment() -> Value {
    json!({
        "name": "web",
        "namespace": "acme",
        "labels": {
            "slipway.io/git-owner": "octo",
            "slipway.io/git-repo": "widgets"
        },
        "annotations": {
            "slipway.io/git-branch": "main",
            "slipway.io/customer": "cust-1",
            "slipway.io/organization": "org-1"
        }
    })
}

// Uses a multi-thread runtime: the blocking `git` subprocess calls must not
// starve the in-process stub orchestrator the server calls back into.
#[tokio::test(flavor = "multi_thread")]
async fn git_push_records_release_and_clones_back() {
    if !git_available() {
        eprintln!("Skipping git integration test: git not found in PATH");
        return;
    }

    let stub = StubOrchestrator::default();
    let addr = stub.serve().await;
    let server = TestServer::start(&format!("http://{addr}")).await;

    let work_dir = tempfile::TempDir::new().expect("work dir");
    let commit_sha = create_work_repo(work_dir.path());

    let token = user_token();
    let push_url = authed_url(&server.base_url, &token, "/acme/web");

    let push = Command::new("git")
        .arg("-C")
        .arg(work_dir.path())
        .args(["push", &push_url, "refs/heads/main:refs/heads/main"])
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("run git push");
    assert!(
        push.status.success(),
        "git push failed: {}",
        String::from_utf8_lossy(&push.stderr)
    );

    // The update hook reported the ref update before the push returned.
    let client = reqwest::Client::new();
    let releases: Value = client
        .get(format!("{}/releases/acme/web", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("list releases")
        .json()
        .await
        .expect("parse releases");
    let records = releases["data"].as_array().expect("release array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["head_commit"]["id"], commit_sha.as_str());
    assert_eq!(records[0]["source_type"], "push");
    assert_eq!(records[0]["git_branch"], "main");
    assert_eq!(records[0]["status"], "pending");

    let bare = git2::Repository::open_bare(server.data_dir().join("git/repos/acme/web"))
        .expect("open server repo");
    let oid = git2::Oid::from_str(&commit_sha).expect("parse oid");
    bare.find_commit(oid).expect("pushed commit present");

    let clone_dir = tempfile::TempDir::new().expect("clone dir");
    let clone = Command::new("git")
        .args(["clone", &push_url])
        .arg(clone_dir.path().join("web"))
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("run git clone");
    assert!(
        clone.status.success(),
        "git clone failed: {}",
        String::from_utf8_lossy(&clone.stderr)
    );
    let procfile =
        std::fs::read_to_string(clone_dir.path().join("web/Procfile")).expect("read Procfile");
    assert_eq!(procfile, "web: ./run.sh\n");
}

#[tokio::test]
async fn upload_pack_advertisement() {
    if !git_available() {
        eprintln!("Skipping git integration test: git not found in PATH");
        return;
    }

    let stub = StubOrchestrator::default();
    let addr = stub.serve().await;
    let server = TestServer::start(&format!("http://{addr}")).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!(
            "{}/acme/web/info/refs?service=git-upload-pack",
            server.base_url
        ))
        .basic_auth("x", Some(user_token()))
        .send()
        .await
        .expect("info/refs");

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/x-git-upload-pack-advertisement")
    );
    let body = resp.bytes().await.expect("advertisement body");
    assert!(body.starts_with(b"001e# service=git-upload-pack\n"));
    assert!(body.ends_with(b"0000"));
}

#[tokio::test]
async fn git_surface_rejections() {
    let stub = StubOrchestrator::default();
    let addr = stub.serve().await;
    let server = TestServer::start(&format!("http://{addr}")).await;

    let client = reqwest::Client::new();
    let token = user_token();

    // No credentials at all.
    let resp = client
        .get(format!(
            "{}/acme/web/info/refs?service=git-upload-pack",
            server.base_url
        ))
        .send()
        .await
        .expect("unauthenticated info/refs");
    assert_eq!(resp.status(), 401);
    let challenge = resp
        .headers()
        .get("www-authenticate")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(challenge.starts_with("Basic"));

    // Malformed app segment.
    let resp = client
        .get(format!(
            "{}/acme/Bad_App/info/refs?service=git-upload-pack",
            server.base_url
        ))
        .basic_auth("x", Some(&token))
        .send()
        .await
        .expect("invalid path info/refs");
    assert_eq!(resp.status(), 403);

    // App the orchestrator does not know.
    let resp = client
        .get(format!(
            "{}/acme/ghost/info/refs?service=git-upload-pack",
            server.base_url
        ))
        .basic_auth("x", Some(&token))
        .send()
        .await
        .expect("unknown app info/refs");
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn webhook_push_triggers_build() {
    let stub = StubOrchestrator::with_deployments(vec![tracked_deployment()]);
    let addr = stub.serve().await;
    let server = TestServer::start(&format!("http://{addr}")).await;

    let body = serde_json::to_vec(&json!({
        "ref": "refs/heads/main",
        "after": "8f6a9232cc5302fc97ee1e1e81021dcf816d7212",
        "deleted": false,
        "repository": {
            "name": "widgets",
            "full_name": "octo/widgets",
            "private": false,
            "clone_url": "https://github.com/octo/widgets.git",
            "owner": {"name": "octo"}
        },
        "compare": "https://github.com/octo/widgets/compare/aaa...8f6a923",
        "head_commit": {
            "id": "8f6a9232cc5302fc97ee1e1e81021dcf816d7212",
            "message": "Ship it",
            "url": "https://github.com/octo/widgets/commit/8f6a923",
            "author": {"name": "Octo Cat", "username": "octocat"}
        },
        "sender": {"login": "octocat", "avatar_url": "https://avatars.example.com/u/1"}
    }))
    .expect("encode push payload");

    let client = reqwest::Client::new();
    let resp: Value = client
        .post(format!("{}/hooks", server.base_url))
        .header("X-GitHub-Event", "push")
        .header("X-Hub-Signature-256", sign_webhook(&body))
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .expect("deliver webhook")
        .json()
        .await
        .expect("parse webhook response");
    assert_eq!(resp["data"], 1);

    let patches = stub.patches.lock().unwrap().clone();
    assert_eq!(patches.len(), 1);
    let (name, patch) = &patches[0];
    assert_eq!(name, "web");
    let annotations = &patch["annotations"];
    assert_eq!(annotations["slipway.io/build"], "true");
    assert_eq!(annotations["slipway.io/build-revision"], "1");
    assert_eq!(annotations["slipway.io/build-source"], "github");
    assert_eq!(
        annotations["slipway.io/git-remote"],
        "https://github.com/octo/widgets.git"
    );
    assert!(annotations["slipway.io/auth-token"].is_string());

    let releases: Value = client
        .get(format!("{}/releases/acme/web?source=github", server.base_url))
        .bearer_auth(user_token())
        .send()
        .await
        .expect("list releases")
        .json()
        .await
        .expect("parse releases");
    let records = releases["data"].as_array().expect("release array");
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0]["head_commit"]["id"],
        "8f6a9232cc5302fc97ee1e1e81021dcf816d7212"
    );
    assert_eq!(records[0]["head_commit"]["author"], "Octo Cat");
}
