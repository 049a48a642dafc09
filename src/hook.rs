//! The `receive-hook` subcommand, invoked by the installed update hook from
//! inside `git receive-pack`. Reports the ref update to the server's internal
//! build-record endpoint; a non-zero exit makes git refuse the ref update, so
//! the pusher sees the failure instead of losing the build silently.

use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ENV_API_HOST, ENV_APP, ENV_NAMESPACE};

const ZERO_REV: &str = "0000000000000000000000000000000000000000";

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("{name} is not set; not running under receive-pack?")))
}

/// Runs the ref-update report. Non-branch refs and deletions are not builds
/// and succeed without contacting the server.
pub async fn run(refname: &str, oldrev: &str, newrev: &str) -> Result<()> {
    if !refname.starts_with("refs/heads/") {
        debug!(refname, "not a branch ref, nothing to record");
        return Ok(());
    }
    if newrev == ZERO_REV {
        debug!(refname, "ref deletion, nothing to record");
        return Ok(());
    }

    let namespace = required_var(ENV_NAMESPACE)?;
    let app = required_var(ENV_APP)?;
    let api_host = required_var(ENV_API_HOST)?;

    let client = reqwest::Client::builder()
        .user_agent(crate::USER_AGENT)
        .build()?;

    let response = client
        .post(format!("{api_host}/hooks/build"))
        .json(&json!({
            "namespace": namespace,
            "app": app,
            "refname": refname,
            "oldrev": oldrev,
            "newrev": newrev,
        }))
        .send()
        .await?;

    match response.status() {
        status if status.is_success() => Ok(()),
        // Same revision pushed twice; the record already exists.
        StatusCode::CONFLICT => {
            debug!(newrev, "revision already recorded");
            Ok(())
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Internal(format!(
                "build report rejected with {status}: {body}"
            )))
        }
    }
}
