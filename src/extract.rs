//! Producing the browsable `code/` tree from whatever registration staged.
//!
//! [`registered_source`] reconstructs the registration from the storage
//! layout on every call. It is a query, not a cache: there is no persisted
//! record to go stale, so there is nothing to invalidate after a register or
//! an extraction.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::archive;
use crate::coords::Coordinate;
use crate::error::{IndexerError, Result};
use crate::fsops;
use crate::git::{GitBackend, GitCli, GitRepositoryManager};
use crate::materialize::DEFAULT_GIT_REF;
use crate::storage::StorageLayout;

/// Bookkeeping inside a git code tree, kept apart from the checked-out files.
const GIT_METADATA_FILE: &str = ".jar-indexer/metadata.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Jar,
    Git,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredSource {
    pub coordinate: Coordinate,
    pub source_type: SourceType,
    pub source_uri: String,
    pub git_ref: Option<String>,
    /// Relative to the storage root.
    pub local_path: String,
}

#[derive(Deserialize)]
struct GitMetadata {
    git_ref: Option<String>,
}

/// Jar files directly inside `dir`, sorted by file name.
pub fn jar_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut jars: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "jar"))
        .collect();
    jars.sort();
    jars
}

/// Works out how `coord` was registered by probing, in order: a staged jar,
/// a bare repository with a checked-out version, a plain code directory.
pub fn registered_source(layout: &StorageLayout, coord: &Coordinate) -> Option<RegisteredSource> {
    let jar_dir = layout.source_jar_path_of(coord);
    if let Some(jar) = jar_files_in(&jar_dir).first() {
        return Some(RegisteredSource {
            coordinate: coord.clone(),
            source_type: SourceType::Jar,
            source_uri: format!("file://{}", jar.display()),
            git_ref: None,
            local_path: layout.relative_to_root(&jar_dir),
        });
    }

    let code_dir = layout.code_path_of(coord);
    if layout.git_bare_path_of(coord).exists() && code_dir.exists() {
        let git_ref = read_git_ref(&code_dir).unwrap_or_else(|| DEFAULT_GIT_REF.to_string());
        return Some(RegisteredSource {
            coordinate: coord.clone(),
            source_type: SourceType::Git,
            source_uri: "git://unknown".to_string(),
            git_ref: Some(git_ref),
            local_path: layout.relative_to_root(&code_dir),
        });
    }

    if code_dir.is_dir() {
        return Some(RegisteredSource {
            coordinate: coord.clone(),
            source_type: SourceType::Directory,
            source_uri: format!("file://{}", code_dir.display()),
            git_ref: None,
            local_path: layout.relative_to_root(&code_dir),
        });
    }

    None
}

fn read_git_ref(code_dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(code_dir.join(GIT_METADATA_FILE)).ok()?;
    serde_json::from_str::<GitMetadata>(&raw).ok()?.git_ref
}

pub struct ArtifactExtractor<'a, B: GitBackend = GitCli> {
    git: &'a GitRepositoryManager<B>,
}

impl<'a, B: GitBackend> ArtifactExtractor<'a, B> {
    pub fn new(git: &'a GitRepositoryManager<B>) -> Self {
        Self { git }
    }

    fn layout(&self) -> &StorageLayout {
        self.git.layout()
    }

    /// Rebuilds the code tree for `source` from scratch. Every failure comes
    /// back as [`IndexerError::ExtractionFailed`].
    pub fn materialize_code(&self, source: &RegisteredSource) -> Result<PathBuf> {
        let target = self.layout().code_path_of(&source.coordinate);
        match self.populate(source, &target) {
            Ok(()) => Ok(target),
            Err(err) => {
                error!(coordinate = %source.coordinate, %err, "source extraction failed");
                Err(match err {
                    IndexerError::ExtractionFailed(_) => err,
                    other => IndexerError::ExtractionFailed(other.to_string()),
                })
            }
        }
    }

    fn populate(&self, source: &RegisteredSource, target: &Path) -> Result<()> {
        match source.source_type {
            SourceType::Jar => self.extract_staged_jar(source, target),
            SourceType::Directory => self.copy_directory(source, target),
            SourceType::Git => self.checkout_worktree(source),
        }
    }

    fn extract_staged_jar(&self, source: &RegisteredSource, target: &Path) -> Result<()> {
        let jar_dir = self.layout().root().join(&source.local_path);
        let jars = jar_files_in(&jar_dir);
        let Some(jar) = jars.first() else {
            return Err(IndexerError::ExtractionFailed(format!(
                "No JAR files found in directory: {}",
                jar_dir.display()
            )));
        };
        if jars.len() > 1 {
            warn!(dir = %jar_dir.display(), chosen = %jar.display(), "multiple jars staged, using the first");
        }

        fsops::remove_path(target)?;
        let files = archive::extract_jar(jar, target)?;
        info!(jar = %jar.display(), target = %target.display(), files, "extracted jar source");
        Ok(())
    }

    fn copy_directory(&self, source: &RegisteredSource, target: &Path) -> Result<()> {
        let source_dir = self.layout().root().join(&source.local_path);
        if !source_dir.is_dir() {
            return Err(IndexerError::ExtractionFailed(format!(
                "Source directory not found: {}",
                source_dir.display()
            )));
        }

        if source_dir == target {
            if fsops::is_non_empty_dir(target) {
                return Ok(());
            }
            return Err(IndexerError::ExtractionFailed(format!(
                "Source directory is empty: {}. Register the source again",
                target.display()
            )));
        }

        fsops::remove_path(target)?;
        let files = fsops::copy_tree(&source_dir, target)?;
        info!(target = %target.display(), files, "copied directory source");
        Ok(())
    }

    fn checkout_worktree(&self, source: &RegisteredSource) -> Result<()> {
        let coord = &source.coordinate;
        let bare = self.layout().git_bare_path_of(coord);
        if !bare.exists() {
            return Err(IndexerError::ExtractionFailed(format!(
                "Git bare repository not found: {}",
                bare.display()
            )));
        }
        let git_ref = source.git_ref.as_deref().unwrap_or(DEFAULT_GIT_REF);

        let (g, a, v) = (&coord.group_id, &coord.artifact_id, &coord.version);
        if !self.git.remove_worktree(g, a, v) {
            fsops::remove_path(&self.layout().code_path_of(coord))?;
        }
        let path = self.git.create_worktree(g, a, v, Some(git_ref))?;
        info!(path = %path.display(), git_ref, "created git worktree");
        Ok(())
    }
}
