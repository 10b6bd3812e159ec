//! On-disk layout of the artifact store.
//!
//! ```text
//! <root>/code/<group-path>/<artifact>/<version>/        browsable tree
//! <root>/source-jar/<group-path>/<artifact>/<version>/  staged source jar
//! <root>/git-bare/<group-path>/<artifact>/              shared bare clone
//! ```
//!
//! `group-path` is the group id with every `.` replaced by `/`. Nothing else
//! is normalized; callers are expected to validate coordinates first.

use std::path::{Path, PathBuf};

use crate::coords::Coordinate;

pub const CODE_DIR: &str = "code";
pub const SOURCE_JAR_DIR: &str = "source-jar";
pub const GIT_BARE_DIR: &str = "git-bare";

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn code_dir(&self) -> PathBuf {
        self.root.join(CODE_DIR)
    }

    pub fn source_jar_dir(&self) -> PathBuf {
        self.root.join(SOURCE_JAR_DIR)
    }

    pub fn git_bare_dir(&self) -> PathBuf {
        self.root.join(GIT_BARE_DIR)
    }

    pub fn code_path(&self, group_id: &str, artifact_id: &str, version: &str) -> PathBuf {
        self.code_dir()
            .join(maven_relative_path(group_id, artifact_id, Some(version)))
    }

    pub fn source_jar_path(&self, group_id: &str, artifact_id: &str, version: &str) -> PathBuf {
        self.source_jar_dir()
            .join(maven_relative_path(group_id, artifact_id, Some(version)))
    }

    pub fn git_bare_path(&self, group_id: &str, artifact_id: &str) -> PathBuf {
        self.git_bare_dir()
            .join(maven_relative_path(group_id, artifact_id, None))
    }

    pub fn code_path_of(&self, coord: &Coordinate) -> PathBuf {
        self.code_path(&coord.group_id, &coord.artifact_id, &coord.version)
    }

    pub fn source_jar_path_of(&self, coord: &Coordinate) -> PathBuf {
        self.source_jar_path(&coord.group_id, &coord.artifact_id, &coord.version)
    }

    pub fn git_bare_path_of(&self, coord: &Coordinate) -> PathBuf {
        self.git_bare_path(&coord.group_id, &coord.artifact_id)
    }

    /// Path of the staged jar inside `source_jar_path`.
    pub fn staged_jar_path(&self, coord: &Coordinate) -> PathBuf {
        self.source_jar_path_of(coord)
            .join(staged_jar_name(&coord.artifact_id, &coord.version))
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.root.clone(),
            self.code_dir(),
            self.source_jar_dir(),
            self.git_bare_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Path relative to the storage root, as recorded in registration info.
    pub fn relative_to_root(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// `<group-path>/<artifact>[/<version>]`
pub fn maven_relative_path(group_id: &str, artifact_id: &str, version: Option<&str>) -> String {
    let group_path = group_id.replace('.', "/");
    match version {
        Some(v) => format!("{group_path}/{artifact_id}/{v}"),
        None => format!("{group_path}/{artifact_id}"),
    }
}

/// `<artifact>-<version>-sources.jar`
pub fn staged_jar_name(artifact_id: &str, version: &str) -> String {
    format!("{artifact_id}-{version}-sources.jar")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_path_uses_group_segments() {
        let layout = StorageLayout::new("/data/store");
        assert_eq!(
            layout.code_path("org.springframework", "spring-core", "5.3.21"),
            PathBuf::from("/data/store/code/org/springframework/spring-core/5.3.21")
        );
    }

    #[test]
    fn git_bare_path_has_no_version() {
        let layout = StorageLayout::new("/data/store");
        assert_eq!(
            layout.git_bare_path("com.example", "lib"),
            PathBuf::from("/data/store/git-bare/com/example/lib")
        );
        assert_eq!(
            layout.source_jar_path("com.example", "lib", "1.0"),
            PathBuf::from("/data/store/source-jar/com/example/lib/1.0")
        );
    }

    #[test]
    fn staged_jar_follows_sources_convention() {
        let layout = StorageLayout::new("/s");
        let coord = Coordinate::new("com.example", "lib", "1.0.0").unwrap();
        assert_eq!(
            layout.staged_jar_path(&coord),
            PathBuf::from("/s/source-jar/com/example/lib/1.0.0/lib-1.0.0-sources.jar")
        );
    }

    #[test]
    fn relative_to_root_strips_prefix() {
        let layout = StorageLayout::new("/s");
        let p = layout.code_path("a.b", "c", "1");
        assert_eq!(layout.relative_to_root(&p), "code/a/b/c/1");
    }
}
