//! Discovery of every stored artifact, plus the filters and pagination the
//! listing tool applies on top.
//!
//! Three passes run in a fixed order: `source-jar/`, then `git-bare/`
//! (versions come from `code/`), then a heuristic walk of `code/`. A
//! coordinate is recorded by the first pass that sees it; its status is
//! derived afresh afterwards, so the pass that found it does not colour the
//! result.

use ignore::{WalkBuilder, WalkState};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, warn};

use crate::coords;
use crate::status::{self, StatusSet};
use crate::storage::{maven_relative_path, StorageLayout};
use crate::version::VersionFilter;

const SOURCE_EXTENSIONS: [&str; 5] = ["java", "kt", "scala", "groovy", "class"];

type Triple = (String, String, String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactEntry {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub status: StatusSet,
}

fn walker(root: &Path) -> WalkBuilder {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false);
    builder
}

fn segments(base: &Path, path: &Path) -> Option<Vec<String>> {
    let rel = path.strip_prefix(base).ok()?;
    Some(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect(),
    )
}

/// `<group...>/<artifact>/<version>` → triple.
fn triple_from(parts: &[String]) -> Option<Triple> {
    if parts.len() < 3 {
        return None;
    }
    let n = parts.len();
    Some((parts[..n - 2].join("."), parts[n - 2].clone(), parts[n - 1].clone()))
}

/// Version directories under `source-jar/` holding at least one jar.
fn scan_source_jars(root: &Path) -> Vec<Triple> {
    if !root.is_dir() {
        return Vec::new();
    }
    let (tx, rx) = mpsc::channel();
    walker(root).build_parallel().run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if path.is_file() && path.extension().is_some_and(|e| e == "jar") {
                        if let Some(parent) = path.parent() {
                            let _ = tx.send(parent.to_path_buf());
                        }
                    }
                }
                Err(err) => warn!(%err, "skipping unreadable entry"),
            }
            WalkState::Continue
        })
    });
    drop(tx);

    let mut dirs: Vec<PathBuf> = rx.iter().collect();
    dirs.sort();
    dirs.dedup();
    dirs.iter()
        .filter_map(|d| segments(root, d))
        .filter_map(|parts| triple_from(&parts))
        .collect()
}

/// `(group, artifact)` of every bare repository (a directory with a `HEAD`
/// file) under `git-bare/`.
fn scan_bare_repos(root: &Path) -> Vec<(String, String)> {
    if !root.is_dir() {
        return Vec::new();
    }
    let (tx, rx) = mpsc::channel();
    walker(root).build_parallel().run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(%err, "skipping unreadable entry");
                    return WalkState::Continue;
                }
            };
            let path = entry.path();
            if entry.depth() > 0 && path.is_dir() && path.join("HEAD").is_file() {
                let _ = tx.send(path.to_path_buf());
                return WalkState::Skip;
            }
            WalkState::Continue
        })
    });
    drop(tx);

    let mut repos: Vec<(String, String)> = rx
        .iter()
        .filter_map(|p| segments(root, &p))
        .filter(|parts| parts.len() >= 2)
        .map(|parts| {
            let n = parts.len();
            (parts[..n - 1].join("."), parts[n - 1].clone())
        })
        .collect();
    repos.sort();
    repos
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
}

/// Source files directly in `dir` or in one of its immediate subdirectories.
fn holds_sources(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && is_source_file(&path) {
            return true;
        }
        if path.is_dir() {
            subdirs.push(path);
        }
    }
    subdirs.iter().any(|sub| {
        fs::read_dir(sub)
            .map(|it| it.flatten().any(|e| e.path().is_file() && is_source_file(&e.path())))
            .unwrap_or(false)
    })
}

/// Heuristic pass over `code/`: a directory at depth three or more whose name
/// contains a digit and which holds source files is taken as a version
/// directory. Known or matched version directories are not descended into.
fn scan_code_tree(root: &Path, known: &HashSet<Triple>) -> Vec<Triple> {
    if !root.is_dir() {
        return Vec::new();
    }
    let (tx, rx) = mpsc::channel();
    walker(root).build_parallel().run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(%err, "skipping unreadable entry");
                    return WalkState::Continue;
                }
            };
            let path = entry.path();
            if entry.depth() < 3 || !path.is_dir() {
                return WalkState::Continue;
            }
            let Some(triple) = segments(root, path).and_then(|p| triple_from(&p)) else {
                return WalkState::Continue;
            };
            if known.contains(&triple) {
                return WalkState::Skip;
            }
            if triple.2.chars().any(|c| c.is_ascii_digit()) && holds_sources(path) {
                let _ = tx.send(triple);
                return WalkState::Skip;
            }
            WalkState::Continue
        })
    });
    drop(tx);

    let mut found: Vec<Triple> = rx
        .iter()
        .filter(|(g, a, v)| coords::validate(g, a, Some(v)).is_ok())
        .collect();
    found.sort();
    found
}

/// Every artifact in the store, de-duplicated by coordinate, first pass wins.
pub fn scan_all(layout: &StorageLayout) -> Vec<ArtifactEntry> {
    let mut seen: HashSet<Triple> = HashSet::new();
    let mut ordered: Vec<Triple> = Vec::new();
    let mut record = |t: Triple, seen: &mut HashSet<Triple>| {
        if seen.insert(t.clone()) {
            ordered.push(t);
        }
    };

    for t in scan_source_jars(&layout.source_jar_dir()) {
        record(t, &mut seen);
    }

    for (group, artifact) in scan_bare_repos(&layout.git_bare_dir()) {
        let artifact_dir = layout
            .code_dir()
            .join(maven_relative_path(&group, &artifact, None));
        let Ok(entries) = fs::read_dir(&artifact_dir) else {
            continue;
        };
        let mut versions: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        versions.sort();
        for version in versions {
            record((group.clone(), artifact.clone(), version), &mut seen);
        }
    }

    for t in scan_code_tree(&layout.code_dir(), &seen) {
        record(t, &mut seen);
    }

    ordered
        .into_par_iter()
        .map(|(group_id, artifact_id, version)| {
            let status = status::status_of(layout, &group_id, &artifact_id, &version);
            ArtifactEntry {
                group_id,
                artifact_id,
                version,
                status,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    group_prefix: Option<String>,
    artifact_prefix: Option<String>,
    version: Option<VersionFilter>,
    status: Option<StatusSet>,
    unsatisfiable: bool,
}

impl ListFilter {
    pub fn group_prefix(mut self, prefix: Option<&str>) -> Self {
        self.group_prefix = prefix.filter(|p| !p.is_empty()).map(str::to_string);
        self
    }

    pub fn artifact_prefix(mut self, prefix: Option<&str>) -> Self {
        self.artifact_prefix = prefix.filter(|p| !p.is_empty()).map(str::to_string);
        self
    }

    /// An unparsable constraint is logged and ignored.
    pub fn version(mut self, filter: Option<&str>) -> Self {
        if let Some(raw) = filter.filter(|f| !f.trim().is_empty()) {
            match raw.parse::<VersionFilter>() {
                Ok(parsed) => self.version = Some(parsed),
                Err(err) => warn!(filter = raw, %err, "ignoring version filter"),
            }
        }
        self
    }

    /// Required labels. A label no artifact can carry matches nothing.
    pub fn status(mut self, filter: Option<&str>) -> Self {
        if let Some(raw) = filter.filter(|f| !f.trim().is_empty()) {
            match raw.parse::<StatusSet>() {
                Ok(parsed) => self.status = Some(parsed),
                Err(err) => {
                    debug!(filter = raw, %err, "status filter cannot match");
                    self.unsatisfiable = true;
                }
            }
        }
        self
    }

    pub fn matches(&self, entry: &ArtifactEntry) -> bool {
        if self.unsatisfiable {
            return false;
        }
        if let Some(p) = &self.group_prefix {
            if !entry.group_id.starts_with(p.as_str()) {
                return false;
            }
        }
        if let Some(p) = &self.artifact_prefix {
            if !entry.artifact_id.starts_with(p.as_str()) {
                return false;
            }
        }
        if let Some(v) = &self.version {
            if !v.matches(&entry.version) {
                return false;
            }
        }
        if let Some(s) = &self.status {
            if !entry.status.is_superset(s) {
                return false;
            }
        }
        true
    }

    /// Filters and sorts by `(group, artifact, version)`.
    pub fn apply(&self, entries: Vec<ArtifactEntry>) -> Vec<ArtifactEntry> {
        let mut kept: Vec<ArtifactEntry> = entries.into_iter().filter(|e| self.matches(e)).collect();
        kept.sort_by(|a, b| {
            (&a.group_id, &a.artifact_id, &a.version).cmp(&(&b.group_id, &b.artifact_id, &b.version))
        });
        kept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub total_count: usize,
    pub total_pages: usize,
}

/// 1-based pagination. Without both `page` and `page_size` everything is
/// returned as a single page.
pub fn paginate<T>(items: Vec<T>, page: Option<usize>, page_size: Option<usize>) -> (Vec<T>, Pagination) {
    let total_count = items.len();
    let (Some(page), Some(page_size)) = (page, page_size) else {
        return (
            items,
            Pagination {
                page: 1,
                total_count,
                total_pages: 1,
            },
        );
    };
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total_pages = total_count.div_ceil(page_size);
    let slice = items
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();
    (
        slice,
        Pagination {
            page,
            total_count,
            total_pages,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "jar_indexer_catalog_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn stage_jar(layout: &StorageLayout, g: &str, a: &str, v: &str) {
        let dir = layout.source_jar_path(g, a, v);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{a}-{v}-sources.jar")), b"PK").unwrap();
    }

    fn entry(g: &str, a: &str, v: &str, status: &str) -> ArtifactEntry {
        ArtifactEntry {
            group_id: g.to_string(),
            artifact_id: a.to_string(),
            version: v.to_string(),
            status: status.parse().unwrap(),
        }
    }

    #[test]
    fn scan_finds_all_three_kinds() {
        let root = temp_dir("scan_all");
        let layout = StorageLayout::new(&root);
        layout.ensure_directories().unwrap();

        stage_jar(&layout, "org.springframework", "spring-core", "5.3.21");

        let bare = layout.git_bare_path("com.example", "gitlib");
        fs::create_dir_all(bare.join("refs")).unwrap();
        fs::write(bare.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        let wt = layout.code_path("com.example", "gitlib", "2.0");
        fs::create_dir_all(&wt).unwrap();
        fs::write(wt.join("README.md"), "x").unwrap();

        let dir_src = layout.code_path("io.acme", "plain", "0.1.0");
        fs::create_dir_all(&dir_src).unwrap();
        fs::write(dir_src.join("Main.java"), "class Main {}").unwrap();

        let found = scan_all(&layout);
        let keys: Vec<String> = found
            .iter()
            .map(|e| format!("{}:{}:{}={}", e.group_id, e.artifact_id, e.version, e.status))
            .collect();
        assert_eq!(
            keys,
            vec![
                "org.springframework:spring-core:5.3.21=source-jar",
                "com.example:gitlib:2.0=source-git,file-searchable",
                "io.acme:plain:0.1.0=source-dir,file-searchable",
            ]
        );

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn code_pass_requires_digit_and_sources() {
        let root = temp_dir("heuristic");
        let layout = StorageLayout::new(&root);
        let no_digit = layout.code_dir().join("com/example/lib/latest");
        fs::create_dir_all(&no_digit).unwrap();
        fs::write(no_digit.join("A.java"), "class A {}").unwrap();
        let no_sources = layout.code_path("com.example", "lib", "1.0");
        fs::create_dir_all(&no_sources).unwrap();
        fs::write(no_sources.join("notes.txt"), "x").unwrap();
        let nested = layout.code_path("com.example", "lib", "2.0");
        fs::create_dir_all(nested.join("pkg")).unwrap();
        fs::write(nested.join("pkg/B.kt"), "class B").unwrap();

        let found = scan_all(&layout);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version, "2.0");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn jar_pass_wins_over_code_pass() {
        let root = temp_dir("dedupe");
        let layout = StorageLayout::new(&root);
        stage_jar(&layout, "com.example", "lib", "1.0");
        let code = layout.code_path("com.example", "lib", "1.0");
        fs::create_dir_all(&code).unwrap();
        fs::write(code.join("A.java"), "class A {}").unwrap();

        let found = scan_all(&layout);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status.to_string(), "source-jar,file-searchable");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn empty_store_scans_to_nothing() {
        let layout = StorageLayout::new(temp_dir("empty"));
        assert!(scan_all(&layout).is_empty());
    }

    #[test]
    fn filters_compose() {
        let entries = vec![
            entry("org.b", "lib", "1.0.0", "source-jar"),
            entry("org.a", "lib", "1.5.0", "source-jar,file-searchable"),
            entry("org.a", "lib", "2.0.0", "source-jar,file-searchable"),
            entry("org.a", "lib", "2.5.0", "source-jar"),
            entry("com.x", "other", "2.0.0", "source-dir,file-searchable"),
        ];

        let picked = ListFilter::default()
            .group_prefix(Some("org."))
            .version(Some(">=1.5.0,<2.5.0"))
            .apply(entries.clone());
        let versions: Vec<&str> = picked.iter().map(|e| e.version.as_str()).collect();
        assert_eq!(versions, vec!["1.5.0", "2.0.0"]);

        let searchable = ListFilter::default()
            .status(Some("file-searchable"))
            .apply(entries.clone());
        assert_eq!(searchable.len(), 3);
        assert_eq!(searchable[0].group_id, "com.x");

        let none = ListFilter::default()
            .status(Some("index"))
            .apply(entries.clone());
        assert!(none.is_empty());

        let all = ListFilter::default().version(Some(">=")).apply(entries);
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn pagination_is_one_based() {
        let items: Vec<u32> = (1..=5).collect();
        let (page, info) = paginate(items.clone(), Some(2), Some(2));
        assert_eq!(page, vec![3, 4]);
        assert_eq!(
            info,
            Pagination {
                page: 2,
                total_count: 5,
                total_pages: 3
            }
        );

        let (page, info) = paginate(items.clone(), Some(9), Some(2));
        assert!(page.is_empty());
        assert_eq!(info.total_pages, 3);

        let (page, info) = paginate(items, None, Some(2));
        assert_eq!(page.len(), 5);
        assert_eq!(info.total_pages, 1);
    }
}
