//! Lookup of `-sources.jar` files in the local Maven and Gradle caches.
//! These trees belong to the build tools; nothing here writes to them.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::coords;
use crate::error::{IndexerError, Result};
use crate::storage::{maven_relative_path, staged_jar_name};
use crate::version::{Op, VersionFilter};

const GRADLE_FILES_DIR: [&str; 2] = ["modules-2", "files-2.1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Maven,
    Gradle,
}

/// `"maven,gradle"` style list; unknown names are dropped.
pub fn parse_cache_kinds(raw: &str) -> Vec<CacheKind> {
    let mut kinds = Vec::new();
    for name in raw.split(',').map(|s| s.trim().to_ascii_lowercase()) {
        let kind = match name.as_str() {
            "maven" => CacheKind::Maven,
            "gradle" => CacheKind::Gradle,
            _ => continue,
        };
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    kinds
}

/// Existing cache roots, in search order.
#[derive(Debug, Clone, Default)]
pub struct CacheRoots {
    pub maven: Vec<PathBuf>,
    pub gradle: Vec<PathBuf>,
}

fn push_existing(paths: &mut Vec<PathBuf>, candidate: PathBuf) {
    if candidate.is_dir() && !paths.contains(&candidate) {
        paths.push(candidate);
    }
}

impl CacheRoots {
    pub fn new(maven: Vec<PathBuf>, gradle: Vec<PathBuf>) -> Self {
        Self { maven, gradle }
    }

    /// `~/.m2/repository` then `$M2_HOME/repository`; `~/.gradle/caches`
    /// then `$GRADLE_HOME/caches`.
    pub fn discover() -> Self {
        let mut roots = Self::default();
        if let Some(home) = dirs::home_dir() {
            push_existing(&mut roots.maven, home.join(".m2").join("repository"));
            push_existing(&mut roots.gradle, home.join(".gradle").join("caches"));
        }
        if let Some(m2) = env::var_os("M2_HOME") {
            push_existing(&mut roots.maven, PathBuf::from(m2).join("repository"));
        }
        if let Some(gradle) = env::var_os("GRADLE_HOME") {
            push_existing(&mut roots.gradle, PathBuf::from(gradle).join("caches"));
        }
        roots
    }
}

/// How the version filter selects version directories.
enum VersionSelection {
    All,
    Exact(String),
    Matching(VersionFilter),
}

fn selection(version_filter: Option<&str>) -> Result<VersionSelection> {
    let Some(raw) = version_filter.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(VersionSelection::All);
    };
    let filter: VersionFilter = raw
        .parse()
        .map_err(|e: String| IndexerError::InvalidCoordinate(format!("Invalid version filter: {e}")))?;
    match filter.constraints() {
        [only] if only.op == Op::Eq => Ok(VersionSelection::Exact(only.version.clone())),
        _ => Ok(VersionSelection::Matching(filter)),
    }
}

/// Version directory names under `artifact_dir` that pass `sel`, sorted.
fn versions_in(artifact_dir: &Path, sel: &VersionSelection) -> Vec<String> {
    if let VersionSelection::Exact(v) = sel {
        return vec![v.clone()];
    }
    let Ok(entries) = fs::read_dir(artifact_dir) else {
        return Vec::new();
    };
    let mut versions: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|v| match sel {
            VersionSelection::Matching(filter) => filter.matches(v),
            _ => true,
        })
        .collect();
    versions.sort();
    versions
}

fn search_maven(root: &Path, group_id: &str, artifact_id: &str, sel: &VersionSelection) -> Vec<PathBuf> {
    let artifact_dir = root.join(maven_relative_path(group_id, artifact_id, None));
    if !artifact_dir.is_dir() {
        return Vec::new();
    }
    versions_in(&artifact_dir, sel)
        .into_iter()
        .map(|v| artifact_dir.join(&v).join(staged_jar_name(artifact_id, &v)))
        .filter(|jar| jar.is_file())
        .collect()
}

/// Gradle keeps each file under a per-checksum directory:
/// `modules-2/files-2.1/<group>/<artifact>/<v>/<hash>/<artifact>-<v>-sources.jar`.
fn search_gradle(root: &Path, group_id: &str, artifact_id: &str, sel: &VersionSelection) -> Vec<PathBuf> {
    let mut artifact_dir = root.to_path_buf();
    artifact_dir.extend(GRADLE_FILES_DIR);
    artifact_dir.push(group_id);
    artifact_dir.push(artifact_id);
    if !artifact_dir.is_dir() {
        return Vec::new();
    }

    let mut found = Vec::new();
    for v in versions_in(&artifact_dir, sel) {
        let Ok(hashes) = fs::read_dir(artifact_dir.join(&v)) else {
            continue;
        };
        let mut jars: Vec<PathBuf> = hashes
            .flatten()
            .map(|h| h.path().join(staged_jar_name(artifact_id, &v)))
            .filter(|jar| jar.is_file())
            .collect();
        jars.sort();
        found.extend(jars);
    }
    found
}

/// Absolute paths of matching source jars, Maven roots first, without
/// duplicates.
pub fn search_cached_sources(
    roots: &CacheRoots,
    group_id: &str,
    artifact_id: &str,
    version_filter: Option<&str>,
    kinds: &[CacheKind],
) -> Result<Vec<PathBuf>> {
    coords::validate(group_id, artifact_id, None)?;
    let (group_id, artifact_id) = (group_id.trim(), artifact_id.trim());
    let sel = selection(version_filter)?;
    if let VersionSelection::Exact(v) = &sel {
        coords::validate(group_id, artifact_id, Some(v))?;
    }

    let mut results = Vec::new();
    if kinds.contains(&CacheKind::Maven) {
        for root in &roots.maven {
            results.extend(search_maven(root, group_id, artifact_id, &sel));
        }
    }
    if kinds.contains(&CacheKind::Gradle) {
        for root in &roots.gradle {
            results.extend(search_gradle(root, group_id, artifact_id, &sel));
        }
    }

    let mut seen = HashSet::new();
    results.retain(|p| seen.insert(p.clone()));
    debug!(group_id, artifact_id, found = results.len(), "searched local caches");
    Ok(results)
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
            "jar_indexer_scan_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"PK").unwrap();
    }

    fn populated(name: &str) -> (PathBuf, CacheRoots) {
        let base = temp_dir(name);
        let m2 = base.join("m2");
        let gradle = base.join("gradle");
        for v in ["5.3.20", "5.3.21", "6.0.0"] {
            touch(&m2.join(format!("org/springframework/spring-core/{v}/spring-core-{v}-sources.jar")));
        }
        fs::create_dir_all(m2.join("org/springframework/spring-core/7.0.0")).unwrap();
        touch(&gradle.join(
            "modules-2/files-2.1/org.springframework/spring-core/5.3.21/abc123/spring-core-5.3.21-sources.jar",
        ));
        (base, CacheRoots::new(vec![m2], vec![gradle]))
    }

    #[test]
    fn cache_kinds_parse_leniently() {
        assert_eq!(parse_cache_kinds("maven, Gradle"), vec![CacheKind::Maven, CacheKind::Gradle]);
        assert_eq!(parse_cache_kinds("gradle,ivy,gradle"), vec![CacheKind::Gradle]);
        assert!(parse_cache_kinds("").is_empty());
    }

    #[test]
    fn exact_version_hits_both_caches() {
        let (base, roots) = populated("exact");
        let kinds = parse_cache_kinds("maven,gradle");
        let found =
            search_cached_sources(&roots, "org.springframework", "spring-core", Some("5.3.21"), &kinds).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("org/springframework/spring-core/5.3.21/spring-core-5.3.21-sources.jar"));
        assert!(found[1].ends_with("5.3.21/abc123/spring-core-5.3.21-sources.jar"));
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn range_and_all_versions() {
        let (base, roots) = populated("range");
        let maven = [CacheKind::Maven];
        let ranged =
            search_cached_sources(&roots, "org.springframework", "spring-core", Some(">=5.3.21,<7"), &maven).unwrap();
        assert_eq!(ranged.len(), 2);

        let all = search_cached_sources(&roots, "org.springframework", "spring-core", None, &maven).unwrap();
        assert_eq!(all.len(), 3);

        let none = search_cached_sources(&roots, "org.example", "missing", None, &maven).unwrap();
        assert!(none.is_empty());
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn invalid_coordinates_are_rejected() {
        let roots = CacheRoots::default();
        let kinds = [CacheKind::Maven];
        assert!(matches!(
            search_cached_sources(&roots, "../etc", "x", None, &kinds),
            Err(IndexerError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            search_cached_sources(&roots, "org.x", "x", Some("../1.0"), &kinds),
            Err(IndexerError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            search_cached_sources(&roots, "org.x", "x", Some(">="), &kinds),
            Err(IndexerError::InvalidCoordinate(_))
        ));
    }
}
