// ABOUTME: Git worktree isolation - a detached worktree in a temporary directory
// ABOUTME: that a subagent runs in, removed again once the subagent finishes.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::SupervisorError;

/// A throwaway detached worktree of the repository containing `cwd`.
#[derive(Debug)]
pub struct Worktree {
    repo: PathBuf,
    root: PathBuf,
    path: PathBuf,
    _dir: tempfile::TempDir,
}

impl Worktree {
    /// `git worktree add --detach` into a fresh temporary directory.
    ///
    /// When `cwd` is below the repository root, [`Worktree::path`] points at
    /// the same subdirectory inside the new tree.
    pub async fn create(cwd: &Path) -> Result<Self, SupervisorError> {
        let prefix = git(cwd, &["rev-parse", "--show-prefix"]).await?;
        let dir = tempfile::Builder::new().prefix("fleet-worktree-").tempdir()?;
        let root = dir.path().join("tree");
        let target = root.to_string_lossy().into_owned();
        git(cwd, &["worktree", "add", "--detach", &target, "HEAD"]).await?;

        let path = match prefix.trim() {
            "" => root.clone(),
            prefix => root.join(prefix),
        };
        tracing::debug!(repo = %cwd.display(), path = %path.display(), "created worktree");
        Ok(Self {
            repo: cwd.to_path_buf(),
            root,
            path,
            _dir: dir,
        })
    }

    /// Directory the subagent should run in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the worktree. Failures are logged; the temp directory is deleted regardless.
    pub async fn remove(self) {
        let target = self.root.to_string_lossy().into_owned();
        if let Err(e) = git(&self.repo, &["worktree", "remove", "--force", &target]).await {
            tracing::warn!(path = %self.root.display(), "failed to remove worktree: {}", e);
        }
    }
}

/// Run git in `cwd`, returning its stdout.
async fn git(cwd: &Path, args: &[&str]) -> Result<String, SupervisorError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| SupervisorError::Spawn {
            program: "git".to_string(),
            source,
        })?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(SupervisorError::Worktree(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}
