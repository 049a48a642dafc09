use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::github::{GitHost, Hook, NewHook};
use crate::orchestrator::{MetaPatch, Orchestrator};
use crate::types::{ObjectMeta, keys};

/// Webhook lifecycle against one GitHub repository. A hook belongs to this
/// platform iff its `config.url` equals the configured callback URL, and a
/// single hook is shared by every deployment built from the same repository.
pub struct HookManager {
    github: Arc<dyn GitHost>,
    orchestrator: Arc<dyn Orchestrator>,
    callback_url: String,
    webhook_secret: Option<String>,
}

impl HookManager {
    pub fn new(
        github: Arc<dyn GitHost>,
        orchestrator: Arc<dyn Orchestrator>,
        callback_url: String,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            github,
            orchestrator,
            callback_url,
            webhook_secret,
        }
    }

    /// Reuses the repository's existing callback hook or creates one, then
    /// records the association on the deployment in a single merge-patch.
    pub async fn get_or_create(
        &self,
        owner: &str,
        repo: &str,
        target: &ObjectMeta,
        github_user: &str,
    ) -> Result<Hook> {
        self.orchestrator
            .get_deployment(&target.namespace, &target.name)
            .await?
            .ok_or(Error::NotFound)?;

        let existing = self
            .github
            .list_hooks(owner, repo)
            .await?
            .into_iter()
            .find(|hook| hook.config.url == self.callback_url);

        let hook = match existing {
            Some(hook) => {
                debug!(owner, repo, hook_id = hook.id, "reusing existing hook");
                hook
            }
            None => {
                let hook = self
                    .github
                    .create_hook(
                        owner,
                        repo,
                        &NewHook::push_hook(&self.callback_url, self.webhook_secret.as_deref()),
                    )
                    .await?;
                info!(owner, repo, hook_id = hook.id, "created repository hook");
                hook
            }
        };

        let patch = MetaPatch::default()
            .set_label(keys::LABEL_GIT_OWNER, owner)
            .set_label(keys::LABEL_GIT_REPO, repo)
            .set_annotation(keys::ANNOTATION_GITHUB_USER, github_user)
            .set_annotation(keys::ANNOTATION_HOOK_ID, hook.id.to_string());
        self.orchestrator
            .patch_deployment(&target.namespace, &target.name, &patch)
            .await?;

        Ok(hook)
    }

    /// Strips the deployment's association unconditionally, and deletes the
    /// remote hook only when no other deployment still references the
    /// repository.
    pub async fn delete(&self, owner: &str, repo: &str, target: &ObjectMeta) -> Result<()> {
        let deployment = self
            .orchestrator
            .get_deployment(&target.namespace, &target.name)
            .await?
            .ok_or(Error::NotFound)?;
        let hook_id = deployment
            .annotation(keys::ANNOTATION_HOOK_ID)
            .and_then(|id| id.parse::<u64>().ok());

        let referencing = self
            .orchestrator
            .select_deployments(&repo_selector(owner, repo))
            .await?;

        let patch = MetaPatch::default()
            .clear_label(keys::LABEL_GIT_OWNER)
            .clear_label(keys::LABEL_GIT_REPO)
            .clear_annotation(keys::ANNOTATION_GITHUB_USER)
            .clear_annotation(keys::ANNOTATION_HOOK_ID);
        self.orchestrator
            .patch_deployment(&target.namespace, &target.name, &patch)
            .await?;

        if referencing.len() > 1 {
            debug!(
                owner,
                repo,
                deployments = referencing.len(),
                "hook still shared, keeping it"
            );
            return Ok(());
        }

        if let Some(id) = hook_id {
            match self.github.delete_hook(owner, repo, id).await {
                Ok(()) => info!(owner, repo, hook_id = id, "deleted repository hook"),
                // Already gone remotely; the association is what mattered.
                Err(Error::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

pub(crate) fn repo_selector(owner: &str, repo: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (keys::LABEL_GIT_OWNER.to_string(), owner.to_string()),
        (keys::LABEL_GIT_REPO.to_string(), repo.to_string()),
    ])
}
