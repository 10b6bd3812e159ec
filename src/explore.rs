//! Read-only browsing of a materialized `code/` tree: tree listing, file
//! retrieval, file-name search and content search.
//!
//! Every relative path handed in is resolved inside the tree; absolute paths
//! and `..` components never resolve.

use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const BINARY_PROBE_LEN: usize = 1024;
const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    #[error("Path is not a directory: {0}")]
    NotDirectory(String),

    #[error("Path is not a file: {0}")]
    NotFile(String),

    #[error("Unsupported pattern type: {0}")]
    UnsupportedKind(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: String,
    pub line_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderInfo {
    pub name: String,
    pub file_count: usize,
    pub files: Vec<FileInfo>,
    pub folders: Vec<FolderInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeListing {
    pub path: String,
    pub max_depth: usize,
    pub folders: Vec<FolderInfo>,
    pub files: Vec<FileInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileContent {
    pub start_line: usize,
    pub end_line: usize,
    pub source_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMatch {
    pub name: String,
    pub path: String,
    pub size: String,
    pub line_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub content: String,
    pub content_range: String,
    pub match_lines: String,
}

/// `0B`, `512B`, `1.5KB`, `2.0MB`.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{size:.1}{}", SIZE_UNITS[unit])
    }
}

fn looks_binary(path: &Path) -> io::Result<bool> {
    let mut head = Vec::with_capacity(BINARY_PROBE_LEN);
    File::open(path)?
        .take(BINARY_PROBE_LEN as u64)
        .read_to_end(&mut head)?;
    Ok(head.contains(&0))
}

/// Text of `path` with undecodable bytes replaced, or `None` for binaries.
fn read_text(path: &Path) -> io::Result<Option<String>> {
    if looks_binary(path)? {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Name, human-readable size and line count (0 for binary files).
pub fn file_info(path: &Path) -> io::Result<FileInfo> {
    let meta = fs::metadata(path)?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file: {}", path.display()),
        ));
    }
    let line_count = match read_text(path) {
        Ok(Some(text)) => text.lines().count(),
        Ok(None) => 0,
        Err(err) => {
            debug!(path = %path.display(), %err, "cannot read file for line count");
            0
        }
    };
    Ok(FileInfo {
        name: file_name(path),
        size: format_size(meta.len()),
        line_count,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `relative` joined onto `base`, or `None` if it is absolute or climbs out.
pub fn resolve_within(base: &Path, relative: &str) -> Option<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in Path::new(relative.trim()).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

fn relative_string(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn existing_dir(base: &Path, relative: &str) -> Result<PathBuf, ExploreError> {
    let dir = resolve_within(base, relative)
        .filter(|p| p.exists())
        .ok_or_else(|| ExploreError::PathNotFound(relative.to_string()))?;
    if !dir.is_dir() {
        return Err(ExploreError::NotDirectory(relative.to_string()));
    }
    Ok(dir)
}

/// Entries of `dir` split into files and directories, each sorted by name.
fn sorted_children(dir: &Path) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        } else if path.is_dir() {
            dirs.push(path);
        }
    }
    files.sort();
    dirs.sort();
    Ok((files, dirs))
}

fn file_infos(files: &[PathBuf]) -> Vec<FileInfo> {
    files.iter().filter_map(|f| file_info(f).ok()).collect()
}

fn folder_info(dir: &Path, depth: usize, max_depth: usize, include_files: bool) -> io::Result<FolderInfo> {
    let (files, dirs) = sorted_children(dir)?;
    let mut folders = Vec::new();
    if depth < max_depth {
        for sub in &dirs {
            match folder_info(sub, depth + 1, max_depth, include_files) {
                Ok(info) => folders.push(info),
                Err(err) => warn!(path = %sub.display(), %err, "skipping unreadable directory"),
            }
        }
    }
    Ok(FolderInfo {
        name: file_name(dir),
        file_count: files.len(),
        files: if include_files { file_infos(&files) } else { Vec::new() },
        folders,
    })
}

/// Directory tree below `start` (relative to `base`). Immediate children of
/// `start` sit at depth 1 and are expanded while their depth is below
/// `max_depth`.
pub fn list_tree(
    base: &Path,
    start: &str,
    max_depth: usize,
    include_files: bool,
) -> Result<TreeListing, ExploreError> {
    let dir = existing_dir(base, start)?;
    let (files, dirs) = sorted_children(&dir)?;

    let mut folders = Vec::with_capacity(dirs.len());
    for sub in &dirs {
        match folder_info(sub, 1, max_depth, include_files) {
            Ok(info) => folders.push(info),
            Err(err) => warn!(path = %sub.display(), %err, "skipping unreadable directory"),
        }
    }

    Ok(TreeListing {
        path: relative_string(base, &dir),
        max_depth,
        folders,
        files: if include_files { file_infos(&files) } else { Vec::new() },
    })
}

/// Contents of `file_path` with an optional 1-based inclusive line range,
/// clamped to the file.
pub fn read_file(
    base: &Path,
    file_path: &str,
    start_line: Option<usize>,
    end_line: Option<usize>,
) -> Result<(FileInfo, FileContent), ExploreError> {
    let path = resolve_within(base, file_path)
        .filter(|p| p.exists())
        .ok_or_else(|| ExploreError::PathNotFound(file_path.to_string()))?;
    if !path.is_file() {
        return Err(ExploreError::NotFile(file_path.to_string()));
    }

    let info = file_info(&path)?;
    let bytes = fs::read(&path)?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.split_inclusive('\n').collect();

    let from = start_line.map_or(0, |s| s.saturating_sub(1));
    let to = end_line.map_or(lines.len(), |e| e.min(lines.len()));
    let source_code = if from < to { lines[from..to].concat() } else { String::new() };

    Ok((
        info,
        FileContent {
            start_line: from + 1,
            end_line: to,
            source_code,
        },
    ))
}

/// File-name matcher for [`find_files`].
#[derive(Debug, Clone)]
pub enum NamePattern {
    /// Matched against the file name, or against the path relative to the
    /// tree root when the glob itself contains `/`.
    Glob { matcher: GlobMatcher, by_path: bool },
    Regex(Regex),
}

impl NamePattern {
    pub fn parse(pattern: &str, kind: &str) -> Result<Self, ExploreError> {
        match kind {
            "glob" => {
                let by_path = pattern.contains('/');
                let source = if by_path && !pattern.starts_with("**/") {
                    format!("**/{}", pattern.trim_start_matches('/'))
                } else {
                    pattern.to_string()
                };
                let glob = GlobBuilder::new(&source)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| ExploreError::InvalidPattern(e.to_string()))?;
                Ok(Self::Glob {
                    matcher: glob.compile_matcher(),
                    by_path,
                })
            }
            "regex" => Regex::new(pattern)
                .map(Self::Regex)
                .map_err(|e| ExploreError::InvalidPattern(e.to_string())),
            other => Err(ExploreError::UnsupportedKind(other.to_string())),
        }
    }

    fn is_match(&self, name: &str, relative: &str) -> bool {
        match self {
            Self::Glob { matcher, by_path } => {
                if *by_path {
                    matcher.is_match(relative)
                } else {
                    matcher.is_match(name)
                }
            }
            Self::Regex(re) => re.is_match(name),
        }
    }
}

fn walker(dir: &Path, max_depth: usize) -> WalkBuilder {
    let mut builder = WalkBuilder::new(dir);
    builder
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .max_depth(Some(max_depth + 1))
        .sort_by_file_name(|a, b| a.cmp(b));
    builder
}

/// Files below `start`, at most `max_depth` directories down, in walk order.
fn files_below(dir: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in walker(dir, max_depth).build() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_some_and(|t| t.is_file()) {
                    out.push(entry.into_path());
                }
            }
            Err(err) => warn!(%err, "skipping unreadable entry"),
        }
    }
    out
}

/// Files under `start` whose names match `pattern`. Files directly in
/// `start` are at depth 0.
pub fn find_files(
    base: &Path,
    start: &str,
    pattern: &NamePattern,
    max_depth: usize,
) -> Result<Vec<FileMatch>, ExploreError> {
    let dir = existing_dir(base, start)?;
    let found = files_below(&dir, max_depth)
        .into_iter()
        .filter_map(|path| {
            let name = file_name(&path);
            let relative = relative_string(base, &path);
            if !pattern.is_match(&name, &relative) {
                return None;
            }
            let info = file_info(&path).ok()?;
            Some(FileMatch {
                name,
                path: relative,
                size: info.size,
                line_count: info.line_count,
            })
        })
        .collect();
    Ok(found)
}

/// Line matcher for [`search_content`].
#[derive(Debug, Clone)]
pub enum ContentQuery {
    Literal(String),
    Regex(Regex),
}

impl ContentQuery {
    pub fn parse(query: &str, kind: &str) -> Result<Self, ExploreError> {
        match kind {
            "string" => Ok(Self::Literal(query.to_string())),
            "regex" => Regex::new(query)
                .map(Self::Regex)
                .map_err(|e| ExploreError::InvalidPattern(e.to_string())),
            other => Err(ExploreError::UnsupportedKind(other.to_string())),
        }
    }

    fn is_match(&self, line: &str) -> bool {
        match self {
            Self::Literal(needle) => line.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(line),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentSearch {
    pub max_depth: usize,
    pub context_before: usize,
    pub context_after: usize,
    /// Cap on matches across all files.
    pub max_results: usize,
}

impl Default for ContentSearch {
    fn default() -> Self {
        Self {
            max_depth: 10,
            context_before: 2,
            context_after: 2,
            max_results: 100,
        }
    }
}

fn search_file(path: &Path, query: &ContentQuery, opts: &ContentSearch) -> Vec<SearchMatch> {
    let text = match read_text(path) {
        Ok(Some(text)) => text,
        Ok(None) => return Vec::new(),
        Err(err) => {
            debug!(path = %path.display(), %err, "skipping unreadable file");
            return Vec::new();
        }
    };
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut matches = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if matches.len() >= opts.max_results {
            break;
        }
        if !query.is_match(line.trim_end_matches(['\n', '\r'])) {
            continue;
        }
        let line_no = idx + 1;
        let first = line_no.saturating_sub(opts.context_before).max(1);
        let last = (line_no + opts.context_after).min(lines.len());
        let content: String = (first..=last)
            .map(|n| format!("{n:4}: {}", lines[n - 1]))
            .collect();
        matches.push(SearchMatch {
            content: content.trim_end().to_string(),
            content_range: format!("{first}-{last}"),
            match_lines: line_no.to_string(),
        });
    }
    matches
}

/// Matching lines with surrounding context, keyed by path relative to the
/// tree root. Files are searched in parallel; the total cap is applied in
/// walk order so the result does not depend on scheduling.
pub fn search_content(
    base: &Path,
    start: &str,
    query: &ContentQuery,
    opts: &ContentSearch,
) -> Result<BTreeMap<String, Vec<SearchMatch>>, ExploreError> {
    let dir = existing_dir(base, start)?;
    let files = files_below(&dir, opts.max_depth);

    let per_file: Vec<(PathBuf, Vec<SearchMatch>)> = files
        .into_par_iter()
        .map(|path| {
            let found = search_file(&path, query, opts);
            (path, found)
        })
        .collect();

    let mut remaining = opts.max_results;
    let mut out = BTreeMap::new();
    for (path, mut found) in per_file {
        if remaining == 0 {
            break;
        }
        if found.is_empty() {
            continue;
        }
        found.truncate(remaining);
        remaining -= found.len();
        out.insert(relative_string(base, &path), found);
    }
    Ok(out)
}
