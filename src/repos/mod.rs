use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::ObjectMeta;

/// Per-app storage under one root: `repos/{namespace}/{app}` holds the bare
/// repository, `releases/{namespace}/{app}/{revision}` the build artifacts.
/// Directories are created lazily and never deleted.
pub struct RepoHome {
    root: PathBuf,
    hook_binary: PathBuf,
    // Two pushes creating the same app must not race git init.
    init_lock: Mutex<()>,
}

impl RepoHome {
    /// `hook_binary` is the absolute path the update hook script execs,
    /// normally the running binary itself.
    pub fn new(root: PathBuf, hook_binary: PathBuf) -> Self {
        Self {
            root,
            hook_binary,
            init_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_path(&self, meta: &ObjectMeta) -> PathBuf {
        self.root
            .join("repos")
            .join(&meta.namespace)
            .join(&meta.name)
    }

    #[must_use]
    pub fn release_path(&self, meta: &ObjectMeta, revision: &str) -> PathBuf {
        self.root
            .join("releases")
            .join(&meta.namespace)
            .join(&meta.name)
            .join(revision)
    }

    /// Creates the bare repository on first use and (re)installs the update
    /// hook. Safe to call on every request.
    pub async fn ensure(&self, meta: &ObjectMeta) -> Result<PathBuf> {
        let path = self.repo_path(meta);

        let _guard = self.init_lock.lock().await;
        if !path.join("HEAD").exists() {
            init_bare_repo(&path).await?;
        }
        self.install_update_hook(&path).await?;

        Ok(path)
    }

    /// Writes the update hook when missing or stale. The script execs one
    /// absolute binary path with the three positional args; nothing
    /// user-controlled is interpolated.
    async fn install_update_hook(&self, repo_path: &Path) -> Result<()> {
        let script = format!(
            "#!/bin/sh\nexec \"{}\" receive-hook --refname \"$1\" --oldrev \"$2\" --newrev \"$3\"\n",
            self.hook_binary.display(),
        );

        let hook_path = repo_path.join("hooks").join("update");
        if let Ok(existing) = fs::read(&hook_path).await {
            if existing == script.as_bytes() {
                return Ok(());
            }
        }

        // Replace via rename so a receive-pack mid-flight never reads a
        // half-written script.
        let tmp_path = repo_path.join("hooks").join(".update.tmp");
        fs::write(&tmp_path, &script).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o755)).await?;
        }
        fs::rename(&tmp_path, &hook_path).await?;

        Ok(())
    }
}

async fn init_bare_repo(repo_path: &Path) -> Result<()> {
    if let Some(parent) = repo_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let output = Command::new("git")
        .args(["init", "--bare"])
        .arg(repo_path)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Internal(format!(
            "failed to init bare repo: {stderr}"
        )));
    }

    fs::write(repo_path.join("HEAD"), "ref: refs/heads/main\n").await?;

    Ok(())
}
