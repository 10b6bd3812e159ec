//! Derived artifact status. Recomputed from the filesystem on every call and
//! never stored.

use serde::{Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::extract::jar_files_in;
use crate::fsops;
use crate::storage::StorageLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusLabel {
    SourceJar,
    SourceGit,
    SourceDir,
    FileSearchable,
}

impl StatusLabel {
    pub const ALL: [StatusLabel; 4] = [
        StatusLabel::SourceJar,
        StatusLabel::SourceGit,
        StatusLabel::SourceDir,
        StatusLabel::FileSearchable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceJar => "source-jar",
            Self::SourceGit => "source-git",
            Self::SourceDir => "source-dir",
            Self::FileSearchable => "file-searchable",
        }
    }
}

impl FromStr for StatusLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == s.trim())
            .ok_or_else(|| format!("unknown status label: {s}"))
    }
}

/// Subset of [`StatusLabel`]. Renders as the comma-joined labels in the
/// fixed order `source-jar,source-git,source-dir,file-searchable`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StatusSet(u8);

impl StatusSet {
    fn bit(label: StatusLabel) -> u8 {
        1 << (label as u8)
    }

    pub fn insert(&mut self, label: StatusLabel) {
        self.0 |= Self::bit(label);
    }

    pub fn contains(&self, label: StatusLabel) -> bool {
        self.0 & Self::bit(label) != 0
    }

    pub fn is_superset(&self, other: &StatusSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn labels(&self) -> impl Iterator<Item = StatusLabel> + '_ {
        StatusLabel::ALL.into_iter().filter(|l| self.contains(*l))
    }
}

impl FromIterator<StatusLabel> for StatusSet {
    fn from_iter<I: IntoIterator<Item = StatusLabel>>(iter: I) -> Self {
        let mut set = StatusSet::default();
        for label in iter {
            set.insert(label);
        }
        set
    }
}

impl fmt::Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.labels().map(StatusLabel::as_str).collect();
        f.write_str(&joined.join(","))
    }
}

impl FromStr for StatusSet {
    type Err = String;

    /// Comma-separated labels; blanks between commas are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(StatusLabel::from_str)
            .collect()
    }
}

impl Serialize for StatusSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Status of one coordinate. Missing directories at any level simply leave
/// labels out.
pub fn status_of(layout: &StorageLayout, group_id: &str, artifact_id: &str, version: &str) -> StatusSet {
    let jar_dir = layout.source_jar_path(group_id, artifact_id, version);
    let bare = layout.git_bare_path(group_id, artifact_id);
    let code = layout.code_path(group_id, artifact_id, version);

    let has_jar = !jar_files_in(&jar_dir).is_empty();
    let has_git = bare.is_dir();

    let mut set = StatusSet::default();
    if has_jar {
        set.insert(StatusLabel::SourceJar);
    }
    if has_git {
        set.insert(StatusLabel::SourceGit);
    }
    if !has_jar && !has_git && fsops::is_non_empty_dir(&code) {
        set.insert(StatusLabel::SourceDir);
    }
    if has_searchable_files(&code) {
        set.insert(StatusLabel::FileSearchable);
    }
    set
}

/// True when the code tree exists and has content; indexing is skipped then.
pub fn is_code_available(layout: &StorageLayout, group_id: &str, artifact_id: &str, version: &str) -> bool {
    fsops::is_non_empty_dir(&layout.code_path(group_id, artifact_id, version))
}

/// A non-dot file directly in `code`, or any file inside a non-dot
/// subdirectory one level down.
fn has_searchable_files(code: &Path) -> bool {
    let Ok(entries) = fs::read_dir(code) else {
        return false;
    };
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_file() {
            return true;
        }
        if path.is_dir() {
            match fs::read_dir(&path) {
                Ok(children) => {
                    if children.flatten().any(|c| c.path().is_file()) {
                        return true;
                    }
                }
                Err(err) => debug!(path = %path.display(), %err, "skipping unreadable directory"),
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "jar_indexer_status_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    #[test]
    fn display_uses_fixed_order() {
        let set: StatusSet = [StatusLabel::FileSearchable, StatusLabel::SourceJar]
            .into_iter()
            .collect();
        assert_eq!(set.to_string(), "source-jar,file-searchable");
        assert_eq!(StatusSet::default().to_string(), "");
    }

    #[test]
    fn parse_and_superset() {
        let wanted: StatusSet = "file-searchable".parse().unwrap();
        let have: StatusSet = "source-git, file-searchable".parse().unwrap();
        assert!(have.is_superset(&wanted));
        assert!(!wanted.is_superset(&have));
        assert!("source-zip".parse::<StatusSet>().is_err());
        assert!("".parse::<StatusSet>().unwrap().is_empty());
    }

    #[test]
    fn missing_everything_is_empty() {
        let layout = StorageLayout::new(temp_dir("missing"));
        assert!(status_of(&layout, "com.example", "lib", "1.0").is_empty());
        assert!(!is_code_available(&layout, "com.example", "lib", "1.0"));
    }

    #[test]
    fn status_is_monotonic_in_populated_roots() {
        let root = temp_dir("monotonic");
        let layout = StorageLayout::new(&root);
        let jar_dir = layout.source_jar_path("com.example", "lib", "1.0");
        fs::create_dir_all(&jar_dir).unwrap();
        fs::write(jar_dir.join("lib-1.0-sources.jar"), b"PK").unwrap();
        assert_eq!(
            status_of(&layout, "com.example", "lib", "1.0").to_string(),
            "source-jar"
        );

        let code = layout.code_path("com.example", "lib", "1.0");
        fs::create_dir_all(&code).unwrap();
        fs::write(code.join("Lib.java"), "class Lib {}").unwrap();
        assert_eq!(
            status_of(&layout, "com.example", "lib", "1.0").to_string(),
            "source-jar,file-searchable"
        );

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn directory_source_and_dot_files() {
        let root = temp_dir("dir_source");
        let layout = StorageLayout::new(&root);
        let code = layout.code_path("com.example", "lib", "1.0");
        fs::create_dir_all(code.join(".git")).unwrap();
        fs::write(code.join(".hidden"), "x").unwrap();
        fs::write(code.join(".git/config"), "x").unwrap();
        assert_eq!(
            status_of(&layout, "com.example", "lib", "1.0").to_string(),
            "source-dir"
        );

        fs::create_dir_all(code.join("src")).unwrap();
        fs::write(code.join("src/A.java"), "class A {}").unwrap();
        assert_eq!(
            status_of(&layout, "com.example", "lib", "1.0").to_string(),
            "source-dir,file-searchable"
        );

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn git_bare_suppresses_source_dir() {
        let root = temp_dir("git");
        let layout = StorageLayout::new(&root);
        fs::create_dir_all(layout.git_bare_path("com.example", "lib")).unwrap();
        let code = layout.code_path("com.example", "lib", "2.0");
        fs::create_dir_all(&code).unwrap();
        fs::write(code.join("README.md"), "x").unwrap();
        assert_eq!(
            status_of(&layout, "com.example", "lib", "2.0").to_string(),
            "source-git,file-searchable"
        );

        let _ = fs::remove_dir_all(root);
    }
}
