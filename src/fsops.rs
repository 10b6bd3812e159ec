use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Copies a single file and checks the copy has the source's size. A short
/// copy is deleted before the error is returned.
pub fn copy_file_verified(source: &Path, target: &Path) -> io::Result<u64> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let copied = match fs::copy(source, target) {
        Ok(n) => n,
        Err(err) => {
            let _ = fs::remove_file(target);
            return Err(err);
        }
    };
    let expected = fs::metadata(source)?.len();
    let actual = fs::metadata(target)?.len();
    if expected != actual || copied != expected {
        let _ = fs::remove_file(target);
        return Err(io::Error::other(format!(
            "copy verification failed: size mismatch ({expected} != {actual})"
        )));
    }
    Ok(copied)
}

/// Recursively copies `source` into a fresh `target`. Symlinked files are
/// copied by content; symlinked directories are skipped. A failed copy is
/// removed entirely. Returns the number of files copied.
pub fn copy_tree(source: &Path, target: &Path) -> io::Result<usize> {
    let result = copy_dir_contents(source, target);
    if result.is_err() && target.exists() {
        if let Err(err) = remove_path(target) {
            warn!(path = %target.display(), %err, "failed to clean up partial copy");
        }
    }
    result
}

fn copy_dir_contents(source: &Path, target: &Path) -> io::Result<usize> {
    fs::create_dir_all(target)?;
    let mut copied = 0;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copied += copy_dir_contents(&from, &to)?;
        } else if file_type.is_symlink() {
            match fs::metadata(&from) {
                Ok(meta) if meta.is_file() => {
                    fs::copy(&from, &to)?;
                    copied += 1;
                }
                Ok(_) => debug!(path = %from.display(), "skipping symlinked directory"),
                Err(err) => warn!(path = %from.display(), %err, "skipping dangling symlink"),
            }
        } else {
            fs::copy(&from, &to)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Removes a file, a symlink, or a whole directory tree. Missing paths are
/// fine.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// True when `dir` exists, is a directory, and has at least one entry.
pub fn is_non_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
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
            "jar_indexer_fsops_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    #[test]
    fn copy_tree_copies_nested_files() {
        let base = temp_dir("copy_tree");
        let src = base.join("src");
        fs::create_dir_all(src.join("com/example")).unwrap();
        fs::write(src.join("com/example/A.java"), "class A {}").unwrap();
        fs::write(src.join("pom.xml"), "<project/>").unwrap();

        let dst = base.join("dst");
        assert_eq!(copy_tree(&src, &dst).unwrap(), 2);
        assert_eq!(
            fs::read_to_string(dst.join("com/example/A.java")).unwrap(),
            "class A {}"
        );

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn copy_file_verified_copies_bytes() {
        let base = temp_dir("copy_file");
        fs::create_dir_all(&base).unwrap();
        let src = base.join("a.bin");
        fs::write(&src, [1u8, 2, 3, 0, 5]).unwrap();
        let dst = base.join("nested/b.bin");
        assert_eq!(copy_file_verified(&src, &dst).unwrap(), 5);
        assert_eq!(fs::read(&dst).unwrap(), vec![1u8, 2, 3, 0, 5]);

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn remove_path_handles_files_dirs_and_missing() {
        let base = temp_dir("remove");
        fs::create_dir_all(base.join("d/e")).unwrap();
        fs::write(base.join("f.txt"), "x").unwrap();

        remove_path(&base.join("f.txt")).unwrap();
        remove_path(&base.join("d")).unwrap();
        remove_path(&base.join("never-existed")).unwrap();
        assert!(!base.join("f.txt").exists());
        assert!(!base.join("d").exists());

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn non_empty_dir_check() {
        let base = temp_dir("non_empty");
        assert!(!is_non_empty_dir(&base));
        fs::create_dir_all(&base).unwrap();
        assert!(!is_non_empty_dir(&base));
        fs::write(base.join("x"), "y").unwrap();
        assert!(is_non_empty_dir(&base));

        let _ = fs::remove_dir_all(base);
    }
}
