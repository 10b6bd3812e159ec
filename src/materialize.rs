//! Registration: turning a source locator into staged bytes on disk.
//!
//! Jars land in `source-jar/`, directories and git worktrees land directly in
//! `code/`. Nothing here extracts jars; that is a separate, explicit step.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::archive;
use crate::coords::{self, Coordinate};
use crate::download::{self, DownloadPolicy};
use crate::error::{IndexerError, Result};
use crate::fsops;
use crate::git::{AuthConfig, GitBackend, GitCli, GitRepositoryManager};
use crate::storage::StorageLayout;
use crate::uri::{self, SourceLocator};

pub const DEFAULT_GIT_REF: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingMethod {
    Copy,
    Download,
    CopyTree,
    GitWorktree,
}

/// Where a registered source ended up.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub coordinate: Coordinate,
    pub source: SourceLocator,
    pub location: PathBuf,
    pub method: StagingMethod,
}

pub struct SourceMaterializer<B: GitBackend = GitCli> {
    git: GitRepositoryManager<B>,
    download_policy: DownloadPolicy,
    auth: Option<AuthConfig>,
}

impl SourceMaterializer<GitCli> {
    pub fn with_cli(layout: StorageLayout) -> Self {
        Self::new(GitRepositoryManager::with_cli(layout))
    }
}

impl<B: GitBackend> SourceMaterializer<B> {
    pub fn new(git: GitRepositoryManager<B>) -> Self {
        Self {
            git,
            download_policy: DownloadPolicy::default(),
            auth: None,
        }
    }

    pub fn with_download_policy(mut self, policy: DownloadPolicy) -> Self {
        self.download_policy = policy;
        self
    }

    pub fn with_auth(mut self, auth: Option<AuthConfig>) -> Self {
        self.auth = auth;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        self.git.layout()
    }

    pub fn git(&self) -> &GitRepositoryManager<B> {
        &self.git
    }

    /// Registers `source_uri` under the given coordinates. Coordinates and
    /// URI syntax are checked before anything touches the disk.
    pub fn register(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
        source_uri: &str,
        git_ref: Option<&str>,
    ) -> Result<RegistrationOutcome> {
        let coord = Coordinate::new(group_id, artifact_id, version)?;
        uri::validate_format(source_uri)?;
        if let Some(r) = git_ref {
            coords::validate_git_ref(r).map_err(|e| IndexerError::GitRefNotFound(e.to_string()))?;
        }

        let source = uri::classify(source_uri)?;
        info!(coordinate = %coord, kind = source.kind(), "registering source");

        let (location, method) = match &source {
            SourceLocator::LocalJar { path } => (self.stage_local_jar(&coord, path)?, StagingMethod::Copy),
            SourceLocator::LocalDirectory { path } => {
                (self.stage_directory(&coord, path)?, StagingMethod::CopyTree)
            }
            SourceLocator::RemoteJar { url } => {
                (self.stage_remote_jar(&coord, url)?, StagingMethod::Download)
            }
            SourceLocator::GitRepo { url, .. } => (
                self.stage_git(&coord, url, git_ref.unwrap_or(DEFAULT_GIT_REF))?,
                StagingMethod::GitWorktree,
            ),
        };

        info!(coordinate = %coord, location = %location.display(), "source registered");
        Ok(RegistrationOutcome {
            coordinate: coord,
            source,
            location,
            method,
        })
    }

    fn stage_local_jar(&self, coord: &Coordinate, path: &Path) -> Result<PathBuf> {
        archive::validate_jar(path)?;
        let target = self.layout().staged_jar_path(coord);
        fsops::copy_file_verified(path, &target).map_err(|e| {
            IndexerError::Internal(format!(
                "Failed to copy {} to {}: {e}",
                path.display(),
                target.display()
            ))
        })?;
        info!(target = %target.display(), "copied jar");
        Ok(target)
    }

    fn stage_directory(&self, coord: &Coordinate, path: &Path) -> Result<PathBuf> {
        if !path.is_dir() {
            return Err(IndexerError::InvalidSource(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }
        if path.join(".git").exists() {
            return Err(IndexerError::UnsupportedSourceType(format!(
                "Git repository directory must be registered with git_ref parameter: {}",
                path.display()
            )));
        }

        let target = self.layout().code_path_of(coord);
        fsops::remove_path(&target)?;
        let copied = fsops::copy_tree(path, &target).map_err(|e| {
            IndexerError::Internal(format!(
                "Failed to copy directory {} to {}: {e}",
                path.display(),
                target.display()
            ))
        })?;
        info!(target = %target.display(), files = copied, "copied directory");
        Ok(target)
    }

    fn stage_remote_jar(&self, coord: &Coordinate, url: &str) -> Result<PathBuf> {
        let target = self.layout().staged_jar_path(coord);
        download::download(url, &target, &self.download_policy).map_err(|e| match e {
            IndexerError::DownloadFailed(_) => e,
            other => IndexerError::DownloadFailed(format!("Failed to download JAR file: {url} - {other}")),
        })?;

        if let Err(err) = archive::validate_jar(&target) {
            if let Err(rm) = fsops::remove_path(&target) {
                warn!(path = %target.display(), %rm, "failed to remove invalid download");
            }
            return Err(IndexerError::DownloadFailed(format!(
                "Downloaded file is not a valid JAR file: {url} - {err}"
            )));
        }
        Ok(target)
    }

    fn stage_git(&self, coord: &Coordinate, url: &str, git_ref: &str) -> Result<PathBuf> {
        let (g, a, v) = (&coord.group_id, &coord.artifact_id, &coord.version);
        let bare = self.layout().git_bare_path_of(coord);

        if bare.exists() {
            if !self.git.update_bare(g, a, self.auth.as_ref()) {
                warn!(bare = %bare.display(), "fetch failed, continuing with existing refs");
            }
        } else {
            self.git.clone_bare(url, g, a, self.auth.as_ref())?;
        }

        let worktree = self.layout().code_path_of(coord);
        if worktree.exists() && !self.git.remove_worktree(g, a, v) {
            fsops::remove_path(&worktree)?;
        }
        self.git.create_worktree(g, a, v, Some(git_ref))
    }
}
