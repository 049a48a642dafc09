use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::GitEnv;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitService {
    UploadPack,
    ReceivePack,
}

impl GitService {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }

    pub fn command_name(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    pub fn subcommand(&self) -> &'static str {
        match self {
            Self::UploadPack => "upload-pack",
            Self::ReceivePack => "receive-pack",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-result",
            Self::ReceivePack => "application/x-git-receive-pack-result",
        }
    }

    pub fn advertisement_content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-advertisement",
            Self::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::ReceivePack)
    }
}

/// Spawns the service against `repo_path` in its own process group with a
/// scrubbed environment: PATH plus the platform vars the update hook reads.
pub fn spawn_git(
    service: GitService,
    repo_path: &Path,
    env: &GitEnv,
    advertise_refs: bool,
) -> Result<Child> {
    let mut cmd = Command::new("git");
    cmd.arg(service.subcommand());
    cmd.arg("--stateless-rpc");
    if advertise_refs {
        cmd.arg("--advertise-refs");
    }
    cmd.arg(repo_path);

    cmd.env_clear();
    if let Ok(path) = std::env::var("PATH") {
        cmd.env("PATH", path);
    }
    for (key, value) in env.vars() {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(Error::Io)?;
    drain_stderr(&mut child);
    Ok(child)
}

/// Writes the request body to the child's stdin on a separate task and closes
/// the pipe. Write failures past this point mean the client or the subprocess
/// went away; they are logged, not surfaced.
pub fn feed_stdin(child: &mut Child, body: Bytes) {
    let Some(mut stdin) = child.stdin.take() else {
        return;
    };
    tokio::spawn(async move {
        if let Err(err) = stdin.write_all(&body).await {
            debug!(error = %err, "git stdin write ended early");
        }
    });
}

fn drain_stderr(child: &mut Child) {
    let Some(stderr) = child.stderr.take() else {
        return;
    };
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(line, "git stderr");
        }
    });
}

/// Response body: the advertisement header (if any) followed by subprocess
/// stdout, frame by frame. Dropping it mid-stream tears down the process
/// group, which is how a client disconnect cancels a hung service.
pub struct GitStream {
    header: Option<Bytes>,
    stdout: ReaderStream<ChildStdout>,
    child: Option<Child>,
}

impl GitStream {
    pub fn new(mut child: Child, header: Option<Bytes>) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("git subprocess has no stdout".to_string()))?;
        Ok(Self {
            header,
            stdout: ReaderStream::new(stdout),
            child: Some(child),
        })
    }

    fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) if !status.success() => {
                        warn!(code = ?status.code(), "git exited non-zero");
                    }
                    Err(err) => warn!(error = %err, "failed to reap git subprocess"),
                    _ => {}
                }
            });
        }
    }
}

impl Stream for GitStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(header) = self.header.take() {
            return Poll::Ready(Some(Ok(header)));
        }

        match Pin::new(&mut self.stdout).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(err))) => {
                // Headers are already on the wire; all we can do is log.
                warn!(error = %err, "git stdout read failed mid-stream");
                self.reap();
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                self.reap();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for GitStream {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            let pgid = Pid::from_raw(-(pid as i32));
            if let Err(err) = signal::kill(pgid, Signal::SIGTERM) {
                if err != nix::errno::Errno::ESRCH {
                    warn!(pid, error = %err, "SIGTERM to git process group failed");
                }
            }
        }

        // kill_on_drop is the backstop when no runtime is left to reap on.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = child.wait().await;
            });
        }
    }
}
