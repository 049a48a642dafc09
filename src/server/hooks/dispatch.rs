use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::auth::TokenCodec;
use crate::error::{Error, Result};
use crate::github::{IdentityProvider, PushEvent};
use crate::orchestrator::{Deployment, MetaPatch, Orchestrator};
use crate::server::github::manager::repo_selector;
use crate::store::ReleaseStore;
use crate::types::{GitInfo, HeadCommit, ObjectMeta, keys};

/// Turns one GitHub push event into build triggers on every tracked
/// deployment. Each matched deployment gets a release record and a single
/// merge-patch; failures are per-deployment and never block siblings.
pub struct Dispatcher {
    store: Arc<dyn ReleaseStore>,
    orchestrator: Arc<dyn Orchestrator>,
    identity: Arc<dyn IdentityProvider>,
    tokens: TokenCodec,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ReleaseStore>,
        orchestrator: Arc<dyn Orchestrator>,
        identity: Arc<dyn IdentityProvider>,
        tokens: TokenCodec,
    ) -> Self {
        Self {
            store,
            orchestrator,
            identity,
            tokens,
        }
    }

    /// Returns how many deployments were triggered.
    pub async fn handle_push(&self, event: &PushEvent) -> Result<usize> {
        let Some(branch) = event.branch() else {
            debug!(git_ref = %event.git_ref, "ignoring non-branch push");
            return Ok(0);
        };
        if event.deleted {
            debug!(git_ref = %event.git_ref, "ignoring branch deletion");
            return Ok(0);
        }

        let owner = event.repository.owner.login_name();
        let repo = &event.repository.name;

        let deployments = self
            .orchestrator
            .select_deployments(&repo_selector(owner, repo))
            .await?;
        debug!(
            owner,
            repo,
            branch,
            candidates = deployments.len(),
            "dispatching push event"
        );

        let mut triggered = 0;
        for deployment in &deployments {
            // Exact match only, no branch patterns.
            if deployment.annotation(keys::ANNOTATION_GIT_BRANCH) != Some(branch) {
                debug!(
                    deployment = %deployment.name,
                    namespace = %deployment.namespace,
                    branch,
                    "branch does not match, skipping"
                );
                continue;
            }

            match self.trigger_build(event, branch, deployment).await {
                Ok(()) => triggered += 1,
                Err(e) => {
                    warn!(
                        deployment = %deployment.name,
                        namespace = %deployment.namespace,
                        error = %e,
                        "build trigger failed, continuing with remaining deployments"
                    );
                }
            }
        }

        Ok(triggered)
    }

    async fn trigger_build(
        &self,
        event: &PushEvent,
        branch: &str,
        deployment: &Deployment,
    ) -> Result<()> {
        let customer = deployment
            .annotation(keys::ANNOTATION_CUSTOMER)
            .ok_or_else(|| missing_annotation(keys::ANNOTATION_CUSTOMER))?;
        let organization = deployment
            .annotation(keys::ANNOTATION_ORGANIZATION)
            .ok_or_else(|| missing_annotation(keys::ANNOTATION_ORGANIZATION))?;

        let remote = if event.repository.private {
            let user = deployment
                .annotation(keys::ANNOTATION_GITHUB_USER)
                .ok_or_else(|| missing_annotation(keys::ANNOTATION_GITHUB_USER))?;
            let access_token = self.identity.github_access_token(user).await?;
            embed_token(&event.repository.clone_url, &access_token)?
        } else {
            event.repository.clone_url.clone()
        };

        let build_revision = deployment
            .annotation(keys::ANNOTATION_BUILD_REVISION)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;

        let auth_token = self.tokens.issue_system(customer, organization)?;

        self.record_release(event, branch, deployment);

        let patch = MetaPatch::default()
            .set_annotation(keys::ANNOTATION_BUILD, "true")
            .set_annotation(keys::ANNOTATION_BUILD_REVISION, build_revision.to_string())
            .set_annotation(keys::ANNOTATION_BUILD_SOURCE, "github")
            .set_annotation(keys::ANNOTATION_GIT_REMOTE, remote)
            .set_annotation(
                keys::ANNOTATION_GIT_REPOSITORY,
                event.repository.full_name.clone(),
            )
            .set_annotation(keys::ANNOTATION_GIT_REVISION, event.after.clone())
            .set_annotation(keys::ANNOTATION_GIT_COMPARE, event.compare.clone())
            .set_annotation(keys::ANNOTATION_AUTH_TOKEN, auth_token);
        self.orchestrator
            .patch_deployment(&deployment.namespace, &deployment.name, &patch)
            .await?;

        info!(
            deployment = %deployment.name,
            namespace = %deployment.namespace,
            revision = %event.after,
            build_revision,
            "build triggered"
        );
        Ok(())
    }

    /// Records the pushed revision before the patch goes out. A record left
    /// by an earlier delivery of the same revision is kept as-is.
    fn record_release(&self, event: &PushEvent, branch: &str, deployment: &Deployment) {
        let meta = ObjectMeta::new(&deployment.namespace, &deployment.name);
        let record = GitInfo {
            name: deployment.name.clone(),
            namespace: deployment.namespace.clone(),
            kube_ref: meta.qualified(),
            git_branch: branch.to_string(),
            source_type: "github".to_string(),
            head_commit: head_commit_from(event),
            files: Default::default(),
            status: "pending".to_string(),
            created_at: chrono::Utc::now(),
        };

        match self
            .store
            .create(&deployment.namespace, &deployment.name, &event.after, &record)
        {
            Ok(_) => {}
            Err(Error::AlreadyExists) => {
                debug!(revision = %event.after, "release already recorded");
            }
            Err(e) => {
                warn!(revision = %event.after, error = %e, "release record failed");
            }
        }
    }
}

fn missing_annotation(key: &str) -> Error {
    Error::Internal(format!("deployment is missing annotation {key}"))
}

/// Embeds a short-lived access token into a clone URL as the userinfo part,
/// the form git accepts for token auth over HTTPS.
fn embed_token(clone_url: &str, token: &str) -> Result<String> {
    let mut url = Url::parse(clone_url)
        .map_err(|e| Error::Internal(format!("invalid clone URL {clone_url}: {e}")))?;
    url.set_username(token)
        .map_err(|_| Error::Internal(format!("clone URL {clone_url} cannot carry credentials")))?;
    Ok(url.to_string())
}

fn head_commit_from(event: &PushEvent) -> HeadCommit {
    let commit = event.head_commit.clone().unwrap_or_default();
    HeadCommit {
        id: event.after.clone(),
        author: commit.author.name,
        avatar_url: event
            .sender
            .as_ref()
            .map(|s| s.avatar_url.clone())
            .unwrap_or_default(),
        compare: event.compare.clone(),
        message: commit.message,
        url: commit.url,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::github::identity::fake::FakeIdentityProvider;
    use crate::github::types::{EventAuthor, EventCommit, EventOwner, EventRepository, EventSender};
    use crate::orchestrator::fake::FakeOrchestrator;
    use crate::store::SqliteStore;

    fn tracked(namespace: &str, name: &str, branch: &str) -> Deployment {
        Deployment {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: BTreeMap::from([
                (keys::LABEL_GIT_OWNER.to_string(), "octo".to_string()),
                (keys::LABEL_GIT_REPO.to_string(), "widgets".to_string()),
            ]),
            annotations: BTreeMap::from([
                (keys::ANNOTATION_GIT_BRANCH.to_string(), branch.to_string()),
                (keys::ANNOTATION_CUSTOMER.to_string(), "cust-1".to_string()),
                (keys::ANNOTATION_ORGANIZATION.to_string(), "org-1".to_string()),
                (keys::ANNOTATION_GITHUB_USER.to_string(), "octocat".to_string()),
            ]),
        }
    }

    fn push_event(private: bool) -> PushEvent {
        PushEvent {
            git_ref: "refs/heads/main".to_string(),
            after: "94e1aeb".to_string(),
            deleted: false,
            repository: EventRepository {
                name: "widgets".to_string(),
                full_name: "octo/widgets".to_string(),
                private,
                clone_url: "https://github.com/octo/widgets.git".to_string(),
                owner: EventOwner {
                    name: Some("octo".to_string()),
                    login: None,
                },
            },
            compare: "https://github.com/octo/widgets/compare/aaa...94e1aeb".to_string(),
            head_commit: Some(EventCommit {
                id: "94e1aeb".to_string(),
                message: "fix widget alignment".to_string(),
                url: "https://github.com/octo/widgets/commit/94e1aeb".to_string(),
                author: EventAuthor {
                    name: "Octo Cat".to_string(),
                    username: Some("octocat".to_string()),
                },
            }),
            sender: Some(EventSender {
                login: "octocat".to_string(),
                avatar_url: "https://avatars.example.com/u/1".to_string(),
            }),
        }
    }

    fn dispatcher(
        dir: &std::path::Path,
        orchestrator: Arc<FakeOrchestrator>,
    ) -> (Dispatcher, Arc<dyn ReleaseStore>) {
        let store = SqliteStore::new(dir.join("dispatch.db")).unwrap();
        ReleaseStore::initialize(&store).unwrap();
        let store: Arc<dyn ReleaseStore> = Arc::new(store);
        let dispatcher = Dispatcher::new(
            store.clone(),
            orchestrator,
            Arc::new(FakeIdentityProvider::with_token("octocat", "gho_abc123")),
            TokenCodec::new("dispatch-test-secret", None).unwrap(),
        );
        (dispatcher, store)
    }

    #[tokio::test]
    async fn test_push_triggers_matching_deployment() {
        let dir = tempfile::TempDir::new().unwrap();
        let orchestrator = Arc::new(FakeOrchestrator::with_deployments(vec![
            tracked("acme", "web", "main"),
        ]));
        let (dispatcher, store) = dispatcher(dir.path(), orchestrator.clone());

        let triggered = dispatcher.handle_push(&push_event(false)).await.unwrap();
        assert_eq!(triggered, 1);

        let deployment = orchestrator
            .get_deployment("acme", "web")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deployment.annotation(keys::ANNOTATION_BUILD), Some("true"));
        assert_eq!(
            deployment.annotation(keys::ANNOTATION_BUILD_REVISION),
            Some("1")
        );
        assert_eq!(
            deployment.annotation(keys::ANNOTATION_BUILD_SOURCE),
            Some("github")
        );
        assert_eq!(
            deployment.annotation(keys::ANNOTATION_GIT_REMOTE),
            Some("https://github.com/octo/widgets.git")
        );
        assert_eq!(
            deployment.annotation(keys::ANNOTATION_GIT_REVISION),
            Some("94e1aeb")
        );
        assert!(deployment.annotation(keys::ANNOTATION_AUTH_TOKEN).is_some());

        let record = store.get("acme", "web", "94e1aeb").unwrap().unwrap();
        assert_eq!(record.source_type, "github");
        assert_eq!(record.git_branch, "main");
        assert_eq!(record.head_commit.author, "Octo Cat");
        assert_eq!(
            record.head_commit.avatar_url,
            "https://avatars.example.com/u/1"
        );
    }

    #[tokio::test]
    async fn test_push_increments_build_revision() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut deployment = tracked("acme", "web", "main");
        deployment.annotations.insert(
            keys::ANNOTATION_BUILD_REVISION.to_string(),
            "7".to_string(),
        );
        let orchestrator = Arc::new(FakeOrchestrator::with_deployments(vec![deployment]));
        let (dispatcher, _) = dispatcher(dir.path(), orchestrator.clone());

        dispatcher.handle_push(&push_event(false)).await.unwrap();

        let deployment = orchestrator
            .get_deployment("acme", "web")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            deployment.annotation(keys::ANNOTATION_BUILD_REVISION),
            Some("8")
        );
    }

    #[tokio::test]
    async fn test_private_repo_embeds_access_token() {
        let dir = tempfile::TempDir::new().unwrap();
        let orchestrator = Arc::new(FakeOrchestrator::with_deployments(vec![
            tracked("acme", "web", "main"),
        ]));
        let (dispatcher, _) = dispatcher(dir.path(), orchestrator.clone());

        let triggered = dispatcher.handle_push(&push_event(true)).await.unwrap();
        assert_eq!(triggered, 1);

        let deployment = orchestrator
            .get_deployment("acme", "web")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            deployment.annotation(keys::ANNOTATION_GIT_REMOTE),
            Some("https://gho_abc123@github.com/octo/widgets.git")
        );
    }

    #[tokio::test]
    async fn test_branch_mismatch_triggers_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let orchestrator = Arc::new(FakeOrchestrator::with_deployments(vec![
            tracked("acme", "web", "develop"),
        ]));
        let (dispatcher, store) = dispatcher(dir.path(), orchestrator.clone());

        let triggered = dispatcher.handle_push(&push_event(false)).await.unwrap();
        assert_eq!(triggered, 0);
        assert!(orchestrator.patches().is_empty());
        assert!(store.get("acme", "web", "94e1aeb").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tag_push_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let orchestrator = Arc::new(FakeOrchestrator::with_deployments(vec![
            tracked("acme", "web", "main"),
        ]));
        let (dispatcher, _) = dispatcher(dir.path(), orchestrator.clone());

        let mut event = push_event(false);
        event.git_ref = "refs/tags/v1.2.3".to_string();
        let triggered = dispatcher.handle_push(&event).await.unwrap();
        assert_eq!(triggered, 0);
        assert!(orchestrator.patches().is_empty());
    }

    #[tokio::test]
    async fn test_patch_failure_does_not_block_siblings() {
        let dir = tempfile::TempDir::new().unwrap();
        let orchestrator = Arc::new(FakeOrchestrator::with_deployments(vec![
            tracked("acme", "web", "main"),
            tracked("acme", "worker", "main"),
        ]));
        orchestrator
            .fail_patches_for
            .lock()
            .unwrap()
            .push("web".to_string());
        let (dispatcher, _) = dispatcher(dir.path(), orchestrator.clone());

        let triggered = dispatcher.handle_push(&push_event(false)).await.unwrap();
        assert_eq!(triggered, 1);

        let sibling = orchestrator
            .get_deployment("acme", "worker")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sibling.annotation(keys::ANNOTATION_BUILD), Some("true"));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_still_patches() {
        let dir = tempfile::TempDir::new().unwrap();
        let orchestrator = Arc::new(FakeOrchestrator::with_deployments(vec![
            tracked("acme", "web", "main"),
        ]));
        let (dispatcher, _) = dispatcher(dir.path(), orchestrator.clone());

        dispatcher.handle_push(&push_event(false)).await.unwrap();
        let triggered = dispatcher.handle_push(&push_event(false)).await.unwrap();

        assert_eq!(triggered, 1);
        assert_eq!(orchestrator.patches().len(), 2);
    }
}
