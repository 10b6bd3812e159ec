//! The tool surface: one method per tool, each taking a flat request and
//! returning a status-tagged response record. No method returns an error;
//! every failure is folded into the response's `status` and `message`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::catalog::{self, ArtifactEntry, ListFilter, Pagination};
use crate::coords::{self, Coordinate};
use crate::error::{IndexerError, Result};
use crate::explore::{
    self, ContentQuery, ContentSearch, ExploreError, FileContent, FileInfo, FileMatch, NamePattern, SearchMatch,
    TreeListing,
};
use crate::extract::{self, ArtifactExtractor};
use crate::git::{GitBackend, GitCli};
use crate::materialize::SourceMaterializer;
use crate::scan::{self, CacheRoots};
use crate::status::{self, StatusSet};
use crate::storage::StorageLayout;
use crate::uri;

pub const REGISTERED_ONLY: &str = "registered_only";
pub const SUCCESS: &str = "success";
const REGISTERED_MESSAGE: &str = "Source registered successfully. Use index_artifact tool to perform indexing.";

const TREE_DEPTH: (usize, usize) = (1, 10);
const SEARCH_DEPTH: (usize, usize) = (1, 20);
const CONTEXT_LINES_MAX: usize = 10;
const MAX_RESULTS: (usize, usize) = (1, 1000);

fn default_true() -> bool {
    true
}
fn default_tree_depth() -> usize {
    3
}
fn default_search_depth() -> usize {
    10
}
fn default_context() -> usize {
    2
}
fn default_max_results() -> usize {
    100
}
fn default_glob() -> String {
    "glob".to_string()
}
fn default_string() -> String {
    "string".to_string()
}
fn default_caches() -> String {
    "maven,gradle".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterSourceRequest {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub source_uri: String,
    /// Accepted for compatibility; registration never indexes.
    #[serde(default = "default_true")]
    pub auto_index: bool,
    #[serde(default)]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexArtifactRequest {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListArtifactsRequest {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub group_filter: Option<String>,
    pub artifact_filter: Option<String>,
    pub version_filter: Option<String>,
    pub status_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListFolderTreeRequest {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub include_files: bool,
    #[serde(default = "default_tree_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetFileRequest {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub file_path: String,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchFileNamesRequest {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub pattern: String,
    #[serde(default = "default_glob")]
    pub pattern_type: String,
    #[serde(default)]
    pub start_path: String,
    #[serde(default = "default_search_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchFileContentRequest {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub query: String,
    #[serde(default = "default_string")]
    pub query_type: String,
    #[serde(default)]
    pub start_path: String,
    #[serde(default = "default_search_depth")]
    pub max_depth: usize,
    #[serde(default = "default_context")]
    pub context_before: usize,
    #[serde(default = "default_context")]
    pub context_after: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchCachedArtifactRequest {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default)]
    pub version_filter: Option<String>,
    #[serde(default = "default_caches")]
    pub cache: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterSourceResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexArtifactResponse {
    pub status: String,
    pub cache_location: String,
    pub processing_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListArtifactsResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub artifacts: Vec<ArtifactEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListFolderTreeResponse {
    pub status: String,
    #[serde(flatten)]
    pub listing: TreeListing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetFileResponse {
    pub status: String,
    pub file_info: FileInfo,
    pub content: FileContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSearchConfig {
    pub start_path: String,
    pub max_depth: usize,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchFileNamesResponse {
    pub status: String,
    pub search_config: FileSearchConfig,
    pub files: Vec<FileMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentSearchConfig {
    pub query: String,
    pub query_type: String,
    pub start_path: String,
    pub context_before: usize,
    pub context_after: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchFileContentResponse {
    pub status: String,
    pub search_config: ContentSearchConfig,
    pub matches: BTreeMap<String, Vec<SearchMatch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchCachedArtifactResponse {
    pub status: String,
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A status other than success, with the reason.
#[derive(Debug)]
struct Refusal {
    status: &'static str,
    message: String,
}

impl Refusal {
    fn new(status: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// `ExploreError` → status, where the "missing" and "wrong kind" codes
    /// differ per tool.
    fn explore(err: ExploreError, missing: &'static str, wrong_kind: &'static str) -> Self {
        let status = match &err {
            ExploreError::PathNotFound(_) => missing,
            ExploreError::NotDirectory(_) | ExploreError::NotFile(_) => wrong_kind,
            ExploreError::UnsupportedKind(_) | ExploreError::InvalidPattern(_) | ExploreError::Io(_) => {
                "internal_error"
            }
        };
        Self::new(status, err.to_string())
    }

    fn log(&self, tool: &str) {
        if self.status == "internal_error" {
            error!(tool, status = self.status, message = %self.message, "tool failed");
        } else {
            warn!(tool, status = self.status, message = %self.message, "tool refused");
        }
    }
}

impl From<IndexerError> for Refusal {
    fn from(err: IndexerError) -> Self {
        Self::new(err.status(), err.to_string())
    }
}

fn clamp(value: usize, (min, max): (usize, usize)) -> usize {
    value.clamp(min, max)
}

pub struct ToolService<B: GitBackend = GitCli> {
    materializer: SourceMaterializer<B>,
    cache_roots: CacheRoots,
}

impl ToolService<GitCli> {
    pub fn from_layout(layout: StorageLayout) -> Self {
        Self::new(SourceMaterializer::with_cli(layout))
    }
}

impl<B: GitBackend> ToolService<B> {
    /// Local build caches are discovered once, here.
    pub fn new(materializer: SourceMaterializer<B>) -> Self {
        Self {
            materializer,
            cache_roots: CacheRoots::discover(),
        }
    }

    pub fn with_cache_roots(mut self, roots: CacheRoots) -> Self {
        self.cache_roots = roots;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        self.materializer.layout()
    }

    pub fn register_source(&self, req: &RegisterSourceRequest) -> RegisterSourceResponse {
        match self.try_register(req) {
            Ok(()) => RegisterSourceResponse {
                status: REGISTERED_ONLY.to_string(),
                group_id: Some(req.group_id.clone()),
                artifact_id: Some(req.artifact_id.clone()),
                version: Some(req.version.clone()),
                indexed: false,
                message: Some(REGISTERED_MESSAGE.to_string()),
            },
            Err(refusal) => {
                refusal.log("register_source");
                RegisterSourceResponse {
                    status: refusal.status.to_string(),
                    group_id: None,
                    artifact_id: None,
                    version: None,
                    indexed: false,
                    message: Some(refusal.message),
                }
            }
        }
    }

    fn try_register(&self, req: &RegisterSourceRequest) -> std::result::Result<(), Refusal> {
        coords::validate(&req.group_id, &req.artifact_id, Some(&req.version))?;
        uri::validate_format(&req.source_uri)?;
        self.layout().ensure_directories().map_err(IndexerError::from)?;
        self.materializer.register(
            &req.group_id,
            &req.artifact_id,
            &req.version,
            &req.source_uri,
            req.git_ref.as_deref(),
        )?;
        Ok(())
    }

    pub fn index_artifact(&self, req: &IndexArtifactRequest) -> IndexArtifactResponse {
        let started = Instant::now();
        let outcome = self.try_index(req);
        let processing_time = format!("{:.2}s", started.elapsed().as_secs_f64());
        match outcome {
            Ok((status, location)) => IndexArtifactResponse {
                status: status.to_string(),
                cache_location: location.display().to_string(),
                processing_time,
                message: None,
            },
            Err(err) => {
                let refusal = Refusal::from(err);
                refusal.log("index_artifact");
                IndexArtifactResponse {
                    status: refusal.status.to_string(),
                    cache_location: String::new(),
                    processing_time,
                    message: Some(refusal.message),
                }
            }
        }
    }

    /// Extracts only when the code tree is missing or empty.
    fn try_index(&self, req: &IndexArtifactRequest) -> Result<(StatusSet, PathBuf)> {
        let coord = Coordinate::new(&req.group_id, &req.artifact_id, &req.version)?;
        let layout = self.layout();
        layout.ensure_directories()?;

        let (g, a, v) = (&coord.group_id, &coord.artifact_id, &coord.version);
        if status::is_code_available(layout, g, a, v) {
            info!(coordinate = %coord, "code already available");
        } else {
            let source = extract::registered_source(layout, &coord).ok_or_else(|| {
                IndexerError::NotRegistered(format!(
                    "Artifact {coord} is not registered. Use register_source tool first."
                ))
            })?;
            ArtifactExtractor::new(self.materializer.git()).materialize_code(&source)?;
        }
        Ok((status::status_of(layout, g, a, v), layout.code_path_of(&coord)))
    }

    pub fn list_artifacts(&self, req: &ListArtifactsRequest) -> ListArtifactsResponse {
        if let Err(err) = self.layout().ensure_directories() {
            let refusal = Refusal::from(IndexerError::from(err));
            refusal.log("list_artifacts");
            return ListArtifactsResponse {
                status: refusal.status.to_string(),
                pagination: None,
                artifacts: Vec::new(),
                message: Some(refusal.message),
            };
        }

        let filter = ListFilter::default()
            .group_prefix(req.group_filter.as_deref())
            .artifact_prefix(req.artifact_filter.as_deref())
            .version(req.version_filter.as_deref())
            .status(req.status_filter.as_deref());
        let kept = filter.apply(catalog::scan_all(self.layout()));
        let (artifacts, pagination) = catalog::paginate(kept, req.page, req.page_size);

        ListArtifactsResponse {
            status: SUCCESS.to_string(),
            pagination: Some(pagination),
            artifacts,
            message: None,
        }
    }

    /// The code tree of an indexed artifact. A missing tree is `not_found`,
    /// an empty one `not_available`.
    fn code_root(&self, coord: &Coordinate) -> std::result::Result<PathBuf, Refusal> {
        let root = self.layout().code_path_of(coord);
        if !root.exists() {
            return Err(Refusal::new(
                "not_found",
                format!("Artifact {coord} has no code directory. Use index_artifact first."),
            ));
        }
        if !status::is_code_available(self.layout(), &coord.group_id, &coord.artifact_id, &coord.version) {
            return Err(Refusal::new(
                "not_available",
                format!("Artifact {coord} is not indexed. Use index_artifact first."),
            ));
        }
        Ok(root)
    }

    fn coordinate(group_id: &str, artifact_id: &str, version: &str) -> std::result::Result<Coordinate, Refusal> {
        Ok(Coordinate::new(group_id, artifact_id, version)?)
    }

    pub fn list_folder_tree(&self, req: &ListFolderTreeRequest) -> ListFolderTreeResponse {
        let max_depth = clamp(req.max_depth, TREE_DEPTH);
        let outcome = Self::coordinate(&req.group_id, &req.artifact_id, &req.version)
            .and_then(|coord| self.code_root(&coord))
            .and_then(|root| {
                explore::list_tree(&root, &req.path, max_depth, req.include_files)
                    .map_err(|e| Refusal::explore(e, "path_not_found", "not_directory"))
            });
        match outcome {
            Ok(listing) => ListFolderTreeResponse {
                status: SUCCESS.to_string(),
                listing,
                message: None,
            },
            Err(refusal) => {
                refusal.log("list_folder_tree");
                ListFolderTreeResponse {
                    status: refusal.status.to_string(),
                    listing: TreeListing {
                        path: req.path.clone(),
                        max_depth,
                        ..TreeListing::default()
                    },
                    message: Some(refusal.message),
                }
            }
        }
    }

    pub fn get_file(&self, req: &GetFileRequest) -> GetFileResponse {
        let outcome = Self::coordinate(&req.group_id, &req.artifact_id, &req.version)
            .and_then(|coord| self.code_root(&coord))
            .and_then(|root| {
                explore::read_file(&root, &req.file_path, req.start_line, req.end_line)
                    .map_err(|e| Refusal::explore(e, "file_not_found", "not_file"))
            });
        match outcome {
            Ok((file_info, content)) => GetFileResponse {
                status: SUCCESS.to_string(),
                file_info,
                content,
                message: None,
            },
            Err(refusal) => {
                refusal.log("get_file");
                GetFileResponse {
                    status: refusal.status.to_string(),
                    file_info: FileInfo::default(),
                    content: FileContent::default(),
                    message: Some(refusal.message),
                }
            }
        }
    }

    pub fn search_file_names(&self, req: &SearchFileNamesRequest) -> SearchFileNamesResponse {
        let max_depth = clamp(req.max_depth, SEARCH_DEPTH);
        let outcome = Self::coordinate(&req.group_id, &req.artifact_id, &req.version).and_then(|coord| {
            let pattern = NamePattern::parse(&req.pattern, &req.pattern_type).map_err(|e| match e {
                ExploreError::UnsupportedKind(_) => Refusal::new("invalid_pattern_type", e.to_string()),
                other => Refusal::new("invalid_pattern", other.to_string()),
            })?;
            let root = self.code_root(&coord)?;
            explore::find_files(&root, &req.start_path, &pattern, max_depth)
                .map_err(|e| Refusal::explore(e, "start_path_not_found", "start_path_not_directory"))
        });

        let search_config = FileSearchConfig {
            start_path: req.start_path.clone(),
            max_depth,
            pattern: req.pattern.clone(),
        };
        match outcome {
            Ok(files) => SearchFileNamesResponse {
                status: SUCCESS.to_string(),
                search_config,
                files,
                message: None,
            },
            Err(refusal) => {
                refusal.log("search_file_names");
                SearchFileNamesResponse {
                    status: refusal.status.to_string(),
                    search_config,
                    files: Vec::new(),
                    message: Some(refusal.message),
                }
            }
        }
    }

    pub fn search_file_content(&self, req: &SearchFileContentRequest) -> SearchFileContentResponse {
        let opts = ContentSearch {
            max_depth: clamp(req.max_depth, SEARCH_DEPTH),
            context_before: req.context_before.min(CONTEXT_LINES_MAX),
            context_after: req.context_after.min(CONTEXT_LINES_MAX),
            max_results: clamp(req.max_results, MAX_RESULTS),
        };
        let outcome = Self::coordinate(&req.group_id, &req.artifact_id, &req.version).and_then(|coord| {
            let query = ContentQuery::parse(&req.query, &req.query_type).map_err(|e| match e {
                ExploreError::UnsupportedKind(_) => Refusal::new("invalid_query_type", e.to_string()),
                other => Refusal::new("invalid_query", other.to_string()),
            })?;
            let root = self.code_root(&coord)?;
            explore::search_content(&root, &req.start_path, &query, &opts)
                .map_err(|e| Refusal::explore(e, "start_path_not_found", "start_path_not_directory"))
        });

        let search_config = ContentSearchConfig {
            query: req.query.clone(),
            query_type: req.query_type.clone(),
            start_path: req.start_path.clone(),
            context_before: opts.context_before,
            context_after: opts.context_after,
        };
        match outcome {
            Ok(matches) => SearchFileContentResponse {
                status: SUCCESS.to_string(),
                search_config,
                matches,
                message: None,
            },
            Err(refusal) => {
                refusal.log("search_file_content");
                SearchFileContentResponse {
                    status: refusal.status.to_string(),
                    search_config,
                    matches: BTreeMap::new(),
                    message: Some(refusal.message),
                }
            }
        }
    }

    pub fn search_cached_artifact(&self, req: &SearchCachedArtifactRequest) -> SearchCachedArtifactResponse {
        let version_filter = req.version_filter.as_deref().filter(|v| !v.trim().is_empty());
        let kinds = scan::parse_cache_kinds(&req.cache);
        match scan::search_cached_sources(&self.cache_roots, &req.group_id, &req.artifact_id, version_filter, &kinds) {
            Ok(paths) if !paths.is_empty() => SearchCachedArtifactResponse {
                status: SUCCESS.to_string(),
                paths: paths.iter().map(|p| p.display().to_string()).collect(),
                message: None,
            },
            Ok(_) => {
                let versions = version_filter.map_or_else(|| " (all versions)".to_string(), |v| format!(":{v}"));
                SearchCachedArtifactResponse {
                    status: "not_found".to_string(),
                    paths: Vec::new(),
                    message: Some(format!(
                        "No source JAR files found for {}:{}{versions}",
                        req.group_id, req.artifact_id
                    )),
                }
            }
            Err(err) => {
                let status = match err {
                    IndexerError::InvalidCoordinate(_) => "invalid_coordinates",
                    _ => "internal_error",
                };
                let refusal = Refusal::new(status, err.to_string());
                refusal.log("search_cached_artifact");
                SearchCachedArtifactResponse {
                    status: status.to_string(),
                    paths: Vec::new(),
                    message: Some(refusal.message),
                }
            }
        }
    }
}
