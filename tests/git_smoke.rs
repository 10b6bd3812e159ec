use jar_indexer::git::GitRepositoryManager;
use jar_indexer::status;
use jar_indexer::storage::StorageLayout;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "jar_indexer_git_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> anyhow::Result<()> {
    git_output(dir, args).map(|_| ())
}

fn git_output(dir: &Path, args: &[&str]) -> anyhow::Result<String> {
    let out = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.email=dev@example.com",
            "-c",
            "user.name=dev",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .output()?;
    anyhow::ensure!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

fn source_repo(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir.join("src/main/java"))?;
    std::fs::write(dir.join("README.md"), "# lib\n")?;
    std::fs::write(dir.join("src/main/java/Lib.java"), "public class Lib {}\n")?;
    git(dir, &["init", "-q"])?;
    git(dir, &["add", "."])?;
    git(dir, &["commit", "-q", "-m", "initial"])?;
    git(dir, &["branch", "-M", "main"])?;
    git(dir, &["tag", "v1.0.0"])?;
    Ok(())
}

#[test]
fn clone_and_checkout_versions() -> anyhow::Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }

    let base = temp_dir("worktrees");
    let origin = base.join("origin");
    source_repo(&origin)?;

    let manager = GitRepositoryManager::with_cli(StorageLayout::new(base.join("store")));
    let url = origin.display().to_string();
    let bare = manager.clone_bare(&url, "com.example", "lib", None)?;
    assert!(bare.ends_with("git-bare/com/example/lib"));
    assert_eq!(manager.default_branch(&bare), "main");

    // Cloning again reuses the bare repository.
    assert_eq!(manager.clone_bare(&url, "com.example", "lib", None)?, bare);
    assert!(manager.update_bare("com.example", "lib", None));

    let main = manager.create_worktree("com.example", "lib", "1.0.0-SNAPSHOT", None)?;
    assert!(main.join("src/main/java/Lib.java").is_file());
    assert_eq!(
        manager.create_worktree("com.example", "lib", "1.0.0-SNAPSHOT", None)?,
        main
    );

    let tagged = manager.create_worktree("com.example", "lib", "1.0.0", Some("v1.0.0"))?;
    assert!(tagged.join("README.md").is_file());
    assert_eq!(
        status::status_of(manager.layout(), "com.example", "lib", "1.0.0").to_string(),
        "source-git,file-searchable"
    );

    let listed = manager.list_worktrees("com.example", "lib");
    assert!(listed.iter().any(|w| w.path.ends_with("1.0.0")));
    assert!(listed.iter().any(|w| w.path.ends_with("1.0.0-SNAPSHOT")));

    let missing = manager.create_worktree("com.example", "lib", "9.9.9", Some("no-such-branch"));
    assert_eq!(missing.unwrap_err().status(), "git_ref_not_found");

    assert!(manager.remove_worktree("com.example", "lib", "1.0.0"));
    assert!(!tagged.exists());
    assert!(manager.remove_worktree("com.example", "lib", "1.0.0"));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn failed_clone_leaves_nothing_behind() -> anyhow::Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }

    let base = temp_dir("bad_clone");
    let manager = GitRepositoryManager::with_cli(StorageLayout::new(base.join("store")));
    let missing = base.join("nowhere").display().to_string();

    let err = manager
        .clone_bare(&missing, "com.example", "lib", None)
        .unwrap_err();
    assert_eq!(err.status(), "git_clone_failed");
    assert!(!base.join("store/git-bare/com/example/lib").exists());

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn unguessable_branch_falls_back_to_main() -> anyhow::Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }

    let base = temp_dir("fallback_branch");
    let origin = base.join("origin");
    std::fs::create_dir_all(&origin)?;
    std::fs::write(origin.join("README.md"), "# lib\n")?;
    git(&origin, &["init", "-q"])?;
    git(&origin, &["add", "."])?;
    git(&origin, &["commit", "-q", "-m", "initial"])?;
    git(&origin, &["branch", "-M", "develop-v2"])?;
    let commit = git_output(&origin, &["rev-parse", "HEAD"])?;

    let manager = GitRepositoryManager::with_cli(StorageLayout::new(base.join("store")));
    let bare = manager.clone_bare(&origin.display().to_string(), "com.example", "lib", None)?;
    assert_eq!(manager.default_branch(&bare), "develop-v2");

    // Without a symbolic HEAD only the fixed guesses and origin/* remain.
    std::fs::write(bare.join("HEAD"), format!("{commit}\n"))?;
    assert_eq!(manager.default_branch(&bare), "main");

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}
