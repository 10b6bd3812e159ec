//! Bare clones and per-version worktrees.
//!
//! Nothing is cached in memory: every operation looks at the filesystem
//! (does the bare repo exist, does the worktree directory exist) and acts on
//! that, so all operations are safe to retry.
//!
//! The git binary sits behind [`GitBackend`] so the control flow and the error
//! classification can be exercised without a real repository.

use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::coords;
use crate::error::{IndexerError, Result};
use crate::storage::StorageLayout;

pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(300);
pub const FALLBACK_BRANCH: &str = "main";
const CANDIDATE_BRANCHES: [&str; 3] = ["main", "master", "develop"];

/// Credentials passed through to the git client untouched.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub ssh_key: Option<PathBuf>,
}

impl AuthConfig {
    fn config_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(key) = &self.ssh_key {
            args.push(OsString::from("-c"));
            args.push(OsString::from(format!(
                "core.sshCommand=ssh -i {} -o StrictHostKeyChecking=no",
                key.display()
            )));
        }
        args
    }
}

#[derive(Debug, Error)]
pub enum GitCommandError {
    #[error("failed to execute git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed (exit code {code:?}): {output}")]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("git {command} timed out after {}s", timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
}

impl GitCommandError {
    fn output_contains(&self, needle: &str) -> bool {
        match self {
            Self::Failed { output, .. } => output.contains(needle),
            other => other.to_string().contains(needle),
        }
    }
}

type GitResult<T> = std::result::Result<T, GitCommandError>;

/// The git plumbing the manager needs, and nothing more.
pub trait GitBackend {
    fn clone_bare(
        &self,
        url: &str,
        dest: &Path,
        auth: Option<&AuthConfig>,
        timeout: Duration,
    ) -> GitResult<()>;

    fn fetch(&self, bare: &Path, auth: Option<&AuthConfig>) -> GitResult<()>;

    fn worktree_add(&self, bare: &Path, path: &Path, git_ref: &str) -> GitResult<()>;

    fn worktree_remove(&self, bare: &Path, path: &Path) -> GitResult<()>;

    fn worktree_prune(&self, bare: &Path) -> GitResult<()>;

    /// Porcelain output of `git worktree list`.
    fn worktree_list(&self, bare: &Path) -> GitResult<String>;

    /// Resolves `rev` to a commit id.
    fn resolve_commit(&self, bare: &Path, rev: &str) -> GitResult<String>;

    /// Target of symbolic ref `name`, e.g. `refs/heads/main`.
    fn symbolic_ref(&self, bare: &Path, name: &str) -> GitResult<String>;

    /// Short names under `refs/remotes/origin/*`, in git's sort order. A bare
    /// clone keeps its branches under `refs/heads`, so this is usually empty.
    fn remote_branches(&self, bare: &Path) -> GitResult<Vec<String>>;
}

/// [`GitBackend`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    git_bin: OsString,
}

impl Default for GitCli {
    fn default() -> Self {
        let git_bin = std::env::var_os("JAR_INDEXER_GIT").unwrap_or_else(|| OsString::from("git"));
        Self { git_bin }
    }
}

impl GitCli {
    pub fn new(git_bin: impl Into<OsString>) -> Self {
        Self {
            git_bin: git_bin.into(),
        }
    }

    fn command(&self, bare: Option<&Path>, args: &[&OsStr]) -> Command {
        let mut cmd = Command::new(&self.git_bin);
        if let Some(dir) = bare {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn run(&self, bare: Option<&Path>, args: &[&OsStr], timeout: Option<Duration>) -> GitResult<String> {
        let label = args
            .iter()
            .map(|a| a.to_string_lossy())
            .find(|a| !a.starts_with('-') && !a.contains('='))
            .map(|a| a.to_string())
            .unwrap_or_default();

        let mut child = self.command(bare, args).spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_reader = std::thread::spawn(move || drain(stdout));
        let err_reader = std::thread::spawn(move || drain(stderr));

        let status = match timeout {
            None => child.wait()?,
            Some(limit) => {
                let started = Instant::now();
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if started.elapsed() >= limit {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(GitCommandError::TimedOut {
                            command: label,
                            timeout: limit,
                        });
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        };

        let stdout = out_reader.join().unwrap_or_default();
        let stderr = err_reader.join().unwrap_or_default();

        if !status.success() {
            let output = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(GitCommandError::Failed {
                command: label,
                code: status.code(),
                output: if output.is_empty() {
                    "Unknown git error".to_string()
                } else {
                    output
                },
            });
        }

        Ok(stdout)
    }
}

fn drain<R: Read>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).to_string()
}

impl GitBackend for GitCli {
    fn clone_bare(
        &self,
        url: &str,
        dest: &Path,
        auth: Option<&AuthConfig>,
        timeout: Duration,
    ) -> GitResult<()> {
        let auth_args = auth.map(AuthConfig::config_args).unwrap_or_default();
        let mut args: Vec<&OsStr> = auth_args.iter().map(OsString::as_os_str).collect();
        args.extend([
            OsStr::new("clone"),
            OsStr::new("--bare"),
            OsStr::new("--"),
            OsStr::new(url),
            dest.as_os_str(),
        ]);
        self.run(None, &args, Some(timeout)).map(|_| ())
    }

    fn fetch(&self, bare: &Path, auth: Option<&AuthConfig>) -> GitResult<()> {
        let auth_args = auth.map(AuthConfig::config_args).unwrap_or_default();
        let mut args: Vec<&OsStr> = auth_args.iter().map(OsString::as_os_str).collect();
        args.extend([
            OsStr::new("fetch"),
            OsStr::new("--prune"),
            OsStr::new("origin"),
            OsStr::new("+refs/heads/*:refs/heads/*"),
            OsStr::new("+refs/tags/*:refs/tags/*"),
        ]);
        self.run(Some(bare), &args, None).map(|_| ())
    }

    fn worktree_add(&self, bare: &Path, path: &Path, git_ref: &str) -> GitResult<()> {
        let args = [
            OsStr::new("worktree"),
            OsStr::new("add"),
            OsStr::new("--detach"),
            path.as_os_str(),
            OsStr::new(git_ref),
        ];
        self.run(Some(bare), &args, None).map(|_| ())
    }

    fn worktree_remove(&self, bare: &Path, path: &Path) -> GitResult<()> {
        let args = [
            OsStr::new("worktree"),
            OsStr::new("remove"),
            OsStr::new("--force"),
            path.as_os_str(),
        ];
        self.run(Some(bare), &args, None).map(|_| ())
    }

    fn worktree_prune(&self, bare: &Path) -> GitResult<()> {
        let args = [OsStr::new("worktree"), OsStr::new("prune")];
        self.run(Some(bare), &args, None).map(|_| ())
    }

    fn worktree_list(&self, bare: &Path) -> GitResult<String> {
        let args = [
            OsStr::new("worktree"),
            OsStr::new("list"),
            OsStr::new("--porcelain"),
        ];
        self.run(Some(bare), &args, None)
    }

    fn resolve_commit(&self, bare: &Path, rev: &str) -> GitResult<String> {
        let spec = format!("{rev}^{{commit}}");
        let args = [
            OsStr::new("rev-parse"),
            OsStr::new("--verify"),
            OsStr::new("--quiet"),
            OsStr::new(&spec),
        ];
        self.run(Some(bare), &args, None)
            .map(|out| out.trim().to_string())
    }

    fn symbolic_ref(&self, bare: &Path, name: &str) -> GitResult<String> {
        let args = [OsStr::new("symbolic-ref"), OsStr::new(name)];
        self.run(Some(bare), &args, None)
            .map(|out| out.trim().to_string())
    }

    fn remote_branches(&self, bare: &Path) -> GitResult<Vec<String>> {
        let args = [
            OsStr::new("for-each-ref"),
            OsStr::new("--format=%(refname)"),
            OsStr::new("refs/remotes/origin"),
        ];
        let out = self.run(Some(bare), &args, None)?;
        Ok(out.lines().filter_map(remote_branch_name).collect())
    }
}

/// `refs/remotes/origin/x` → `x`. Local heads and the remote's `HEAD`
/// pointer are not remote branches.
fn remote_branch_name(refname: &str) -> Option<String> {
    let name = refname.trim().strip_prefix("refs/remotes/origin/")?;
    (!name.is_empty() && name != "HEAD").then(|| name.to_string())
}

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorktreeInfo {
    pub path: String,
    pub branch: Option<String>,
    pub head: Option<String>,
}

/// Records are separated by their `worktree ` line; unknown lines are
/// ignored and attribute lines before the first record are dropped.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeInfo> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorktreeInfo> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(done) = current.take() {
                worktrees.push(done);
            }
            current = Some(WorktreeInfo {
                path: path.to_string(),
                ..Default::default()
            });
        } else if let Some(branch) = line.strip_prefix("branch ") {
            if let Some(wt) = current.as_mut() {
                wt.branch = Some(branch.to_string());
            }
        } else if let Some(head) = line.strip_prefix("HEAD ") {
            if let Some(wt) = current.as_mut() {
                wt.head = Some(head.to_string());
            }
        }
    }

    if let Some(done) = current {
        worktrees.push(done);
    }
    worktrees
}

pub struct GitRepositoryManager<B: GitBackend = GitCli> {
    layout: StorageLayout,
    backend: B,
    clone_timeout: Duration,
}

impl GitRepositoryManager<GitCli> {
    pub fn with_cli(layout: StorageLayout) -> Self {
        Self::new(layout, GitCli::default())
    }
}

impl<B: GitBackend> GitRepositoryManager<B> {
    pub fn new(layout: StorageLayout, backend: B) -> Self {
        Self {
            layout,
            backend,
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
        }
    }

    pub fn with_clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = timeout;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Bare-clones `url` unless the bare repository already exists, in which
    /// case the existing path is returned as is.
    pub fn clone_bare(
        &self,
        url: &str,
        group_id: &str,
        artifact_id: &str,
        auth: Option<&AuthConfig>,
    ) -> Result<PathBuf> {
        coords::validate(group_id, artifact_id, None)?;
        let bare_path = self.layout.git_bare_path(group_id, artifact_id);

        if bare_path.exists() {
            info!(path = %bare_path.display(), "bare repository already exists");
            return Ok(bare_path);
        }
        if let Some(parent) = bare_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(url, path = %bare_path.display(), "cloning bare repository");
        match self
            .backend
            .clone_bare(url, &bare_path, auth, self.clone_timeout)
        {
            Ok(()) => {
                info!(path = %bare_path.display(), "bare clone complete");
                Ok(bare_path)
            }
            Err(err) => {
                remove_partial_clone(&bare_path);
                Err(classify_clone_error(err))
            }
        }
    }

    /// Fetches `origin` into an existing bare repository. Never creates one;
    /// failures are logged and reported as `false`.
    pub fn update_bare(&self, group_id: &str, artifact_id: &str, auth: Option<&AuthConfig>) -> bool {
        if coords::validate(group_id, artifact_id, None).is_err() {
            return false;
        }
        let bare_path = self.layout.git_bare_path(group_id, artifact_id);
        if !bare_path.exists() {
            warn!(path = %bare_path.display(), "bare repository not found, nothing to update");
            return false;
        }

        info!(path = %bare_path.display(), "updating bare repository");
        match self.backend.fetch(&bare_path, auth) {
            Ok(()) => true,
            Err(err) => {
                error!(path = %bare_path.display(), %err, "failed to update repository");
                false
            }
        }
    }

    /// Checks out `git_ref` (or the default branch) into the version's code
    /// directory. An existing directory is returned untouched.
    pub fn create_worktree(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
        git_ref: Option<&str>,
    ) -> Result<PathBuf> {
        coords::validate(group_id, artifact_id, Some(version))?;
        let bare_path = self.layout.git_bare_path(group_id, artifact_id);
        let worktree_path = self.layout.code_path(group_id, artifact_id, version);

        if worktree_path.exists() {
            info!(path = %worktree_path.display(), "worktree already exists");
            return Ok(worktree_path);
        }
        if !bare_path.exists() {
            return Err(IndexerError::GitWorktree(format!(
                "Bare repository not found at {}",
                bare_path.display()
            )));
        }

        let git_ref = match git_ref {
            Some(r) => r.trim().to_string(),
            None => self.default_branch(&bare_path),
        };
        if let Err(err) = coords::validate_git_ref(&git_ref) {
            return Err(IndexerError::GitRefNotFound(err.to_string()));
        }
        let Some(resolved) = self.resolve_ref(&bare_path, &git_ref) else {
            return Err(IndexerError::GitRefNotFound(format!(
                "Git reference '{git_ref}' not found in repository"
            )));
        };

        if let Some(parent) = worktree_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(err) = self.backend.worktree_prune(&bare_path) {
            debug!(%err, "worktree prune failed");
        }

        info!(path = %worktree_path.display(), git_ref = %resolved, "creating worktree");
        match self.backend.worktree_add(&bare_path, &worktree_path, &resolved) {
            Ok(()) => Ok(worktree_path),
            Err(err) if err.output_contains("already exists") => {
                info!(path = %worktree_path.display(), "worktree already exists");
                Ok(worktree_path)
            }
            Err(err) => Err(IndexerError::GitWorktree(format!(
                "Failed to create worktree: {err}"
            ))),
        }
    }

    /// Removes the version's worktree. Uses git when the bare repository is
    /// still there so its worktree metadata stays consistent; otherwise the
    /// directory is deleted directly.
    pub fn remove_worktree(&self, group_id: &str, artifact_id: &str, version: &str) -> bool {
        if coords::validate(group_id, artifact_id, Some(version)).is_err() {
            return false;
        }
        let bare_path = self.layout.git_bare_path(group_id, artifact_id);
        let worktree_path = self.layout.code_path(group_id, artifact_id, version);

        if !worktree_path.exists() {
            info!(path = %worktree_path.display(), "worktree does not exist");
            return true;
        }

        let outcome = if bare_path.exists() {
            self.backend
                .worktree_remove(&bare_path, &worktree_path)
                .map_err(|e| e.to_string())
        } else {
            std::fs::remove_dir_all(&worktree_path).map_err(|e| e.to_string())
        };

        match outcome {
            Ok(()) => {
                info!(path = %worktree_path.display(), "removed worktree");
                true
            }
            Err(err) => {
                error!(path = %worktree_path.display(), %err, "failed to remove worktree");
                false
            }
        }
    }

    pub fn list_worktrees(&self, group_id: &str, artifact_id: &str) -> Vec<WorktreeInfo> {
        if coords::validate(group_id, artifact_id, None).is_err() {
            return Vec::new();
        }
        let bare_path = self.layout.git_bare_path(group_id, artifact_id);
        if !bare_path.exists() {
            return Vec::new();
        }
        match self.backend.worktree_list(&bare_path) {
            Ok(output) => parse_worktree_list(&output),
            Err(err) => {
                error!(%err, "failed to list worktrees");
                Vec::new()
            }
        }
    }

    /// Symbolic HEAD of the remote, then `main`, `master`, `develop`, then the
    /// first `origin/*` remote-tracking branch, then the literal `main`.
    /// Branches only present under `refs/heads` are never picked here.
    pub fn default_branch(&self, bare: &Path) -> String {
        for head in ["refs/remotes/origin/HEAD", "HEAD"] {
            if let Ok(target) = self.backend.symbolic_ref(bare, head) {
                let name = target
                    .strip_prefix("refs/remotes/origin/")
                    .or_else(|| target.strip_prefix("refs/heads/"))
                    .unwrap_or(&target);
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }

        for candidate in CANDIDATE_BRANCHES {
            if self.resolve_ref(bare, candidate).is_some() {
                return candidate.to_string();
            }
        }

        match self.backend.remote_branches(bare) {
            Ok(branches) => {
                if let Some(first) = branches.into_iter().next() {
                    debug!(bare = %bare.display(), branch = %first, "using first remote branch");
                    return first;
                }
            }
            Err(err) => debug!(%err, "branch listing failed"),
        }

        debug!(bare = %bare.display(), "no default branch found, falling back to {FALLBACK_BRANCH}");
        FALLBACK_BRANCH.to_string()
    }

    /// Returns the spelling of `git_ref` that resolves: as given, or as
    /// `origin/<ref>`.
    fn resolve_ref(&self, bare: &Path, git_ref: &str) -> Option<String> {
        if self.backend.resolve_commit(bare, git_ref).is_ok() {
            return Some(git_ref.to_string());
        }
        let remote = format!("origin/{git_ref}");
        self.backend
            .resolve_commit(bare, &remote)
            .ok()
            .map(|_| remote)
    }
}

fn classify_clone_error(err: GitCommandError) -> IndexerError {
    match &err {
        GitCommandError::TimedOut { timeout, .. } => IndexerError::GitCloneFailed(format!(
            "Git clone operation timed out after {}s",
            timeout.as_secs()
        )),
        GitCommandError::Failed { output, .. }
            if output.contains("Authentication failed") || output.contains("Permission denied") =>
        {
            IndexerError::GitAuthentication(output.clone())
        }
        GitCommandError::Failed { output, .. } => IndexerError::GitCloneFailed(output.clone()),
        GitCommandError::Spawn(_) => {
            IndexerError::GitCloneFailed(format!("Failed to clone repository: {err}"))
        }
    }
}

fn remove_partial_clone(bare_path: &Path) {
    if !bare_path.exists() {
        return;
    }
    match std::fs::remove_dir_all(bare_path) {
        Ok(()) => info!(path = %bare_path.display(), "removed partial clone"),
        Err(err) => warn!(path = %bare_path.display(), %err, "failed to remove partial clone"),
    }
}
