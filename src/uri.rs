//! Classification of source locators.
//!
//! Decision order: `git@` prefix, then `file://`, then `http(s)://`.
//! Anything else is rejected rather than guessed at.

use serde::Serialize;
use std::path::PathBuf;

use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceLocator {
    LocalJar {
        path: PathBuf,
    },
    LocalDirectory {
        path: PathBuf,
    },
    RemoteJar {
        url: String,
    },
    GitRepo {
        url: String,
        host: Option<String>,
        repo_path: Option<String>,
        is_ssh: bool,
    },
}

impl SourceLocator {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocalJar { .. } => "jar",
            Self::LocalDirectory { .. } => "directory",
            Self::RemoteJar { .. } => "http",
            Self::GitRepo { .. } => "git",
        }
    }
}

/// Splits `scheme://rest`. Returns `None` when there is no `://`.
fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = uri.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

/// Syntax-only check. Does not touch the filesystem or the network, so it can
/// run before any side effect.
pub fn validate_format(uri: &str) -> Result<()> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(unsupported("URI must be a non-empty string"));
    }
    if uri.starts_with("git@") {
        return parse_ssh(uri).map(|_| ());
    }
    match split_scheme(uri) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("file") => {
            if !rest.starts_with('/') {
                return Err(unsupported("file:// URI must have an absolute path"));
            }
            Ok(())
        }
        Some((scheme, rest))
            if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") =>
        {
            http_kind(rest).map(|_| ())
        }
        Some((scheme, _)) => Err(unsupported(&format!(
            "Unsupported URI scheme: {scheme}. Supported schemes: file, http, https, git@"
        ))),
        None => Err(unsupported(&format!(
            "Unsupported URI: {uri}. Supported schemes: file, http, https, git@"
        ))),
    }
}

/// Classifies `uri`, probing the local filesystem for `file://` locators.
pub fn classify(uri: &str) -> Result<SourceLocator> {
    let uri = uri.trim();
    validate_format(uri)?;

    if uri.starts_with("git@") {
        let (host, repo_path) = parse_ssh(uri)?;
        return Ok(SourceLocator::GitRepo {
            url: format!("git@{host}:{repo_path}"),
            host: Some(host),
            repo_path: Some(repo_path),
            is_ssh: true,
        });
    }

    let Some((scheme, rest)) = split_scheme(uri) else {
        return Err(unsupported(&format!("Unsupported URI: {uri}")));
    };

    if scheme.eq_ignore_ascii_case("file") {
        return classify_file(rest);
    }

    match http_kind(rest)? {
        HttpKind::Git => Ok(SourceLocator::GitRepo {
            url: uri.to_string(),
            host: host_of(rest),
            repo_path: None,
            is_ssh: false,
        }),
        HttpKind::Jar => Ok(SourceLocator::RemoteJar {
            url: uri.to_string(),
        }),
    }
}

fn classify_file(rest: &str) -> Result<SourceLocator> {
    let path = PathBuf::from(rest);
    if !path.exists() {
        return Err(IndexerError::ResourceNotFound(format!(
            "File or directory does not exist: {}",
            path.display()
        )));
    }
    if path.is_file() {
        let is_jar = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("jar"));
        if is_jar {
            return Ok(SourceLocator::LocalJar { path });
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        return Err(unsupported(&format!("Unsupported file type: .{ext}")));
    }
    if path.is_dir() {
        return Ok(SourceLocator::LocalDirectory { path });
    }
    Err(unsupported(&format!(
        "Path is neither file nor directory: {}",
        path.display()
    )))
}

enum HttpKind {
    Git,
    Jar,
}

fn http_kind(rest: &str) -> Result<HttpKind> {
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(unsupported("HTTP/HTTPS URI must have a hostname"));
    }
    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if path.ends_with(".git") {
        Ok(HttpKind::Git)
    } else if path.ends_with(".jar") {
        Ok(HttpKind::Jar)
    } else {
        Err(unsupported(
            "HTTP/HTTPS URI must end with .jar (JAR file) or .git (Git repository)",
        ))
    }
}

fn host_of(rest: &str) -> Option<String> {
    let authority = rest.split('/').next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    (!host.is_empty()).then(|| host.to_string())
}

/// `git@<host>:<path>` with exactly one `@`, a host made of
/// `[A-Za-z0-9.-]` and a non-empty path of `[A-Za-z0-9._/-]`.
fn parse_ssh(uri: &str) -> Result<(String, String)> {
    let err = || {
        unsupported(&format!(
            "Invalid SSH Git URI format: {uri}. Expected format: git@hostname:path/to/repo"
        ))
    };
    let rest = uri.strip_prefix("git@").ok_or_else(err)?;
    if rest.contains('@') {
        return Err(err());
    }
    let (host, path) = rest.split_once(':').ok_or_else(err)?;
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'));
    let path_ok = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'));
    if !host_ok || !path_ok {
        return Err(err());
    }
    Ok((host.to_string(), path.to_string()))
}

fn unsupported(message: &str) -> IndexerError {
    IndexerError::UnsupportedUri(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "jar_indexer_uri_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    #[test]
    fn ssh_git_uri_is_parsed() {
        let loc = classify("git@github.com:spring-projects/spring-framework").unwrap();
        assert_eq!(
            loc,
            SourceLocator::GitRepo {
                url: "git@github.com:spring-projects/spring-framework".to_string(),
                host: Some("github.com".to_string()),
                repo_path: Some("spring-projects/spring-framework".to_string()),
                is_ssh: true,
            }
        );
    }

    #[test]
    fn malformed_ssh_uri_is_rejected() {
        for uri in ["git@github.com", "git@:repo", "git@host:", "git@a@b:repo"] {
            assert!(matches!(
                classify(uri),
                Err(IndexerError::UnsupportedUri(_))
            ), "{uri}");
        }
    }

    #[test]
    fn https_suffix_selects_kind() {
        assert!(matches!(
            classify("https://github.com/org/repo.git").unwrap(),
            SourceLocator::GitRepo { is_ssh: false, .. }
        ));
        assert_eq!(
            classify("https://repo1.maven.org/a/b/lib-1.0-sources.jar").unwrap(),
            SourceLocator::RemoteJar {
                url: "https://repo1.maven.org/a/b/lib-1.0-sources.jar".to_string()
            }
        );
    }

    #[test]
    fn https_with_other_suffix_names_both_options() {
        let err = classify("https://example.com/file.txt").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(".jar"));
        assert!(msg.contains(".git"));
    }

    #[test]
    fn ambiguous_at_sign_without_scheme_is_unsupported() {
        assert!(matches!(
            classify("user@example.com:repo"),
            Err(IndexerError::UnsupportedUri(_))
        ));
        assert!(matches!(
            classify("ftp://example.com/lib.jar"),
            Err(IndexerError::UnsupportedUri(_))
        ));
    }

    #[test]
    fn file_uri_distinguishes_jar_directory_and_missing() {
        let base = temp_dir("file_kinds");
        fs::create_dir_all(&base).unwrap();
        let jar = base.join("sample.jar");
        fs::write(&jar, b"x").unwrap();
        let txt = base.join("notes.txt");
        fs::write(&txt, b"x").unwrap();

        assert_eq!(
            classify(&format!("file://{}", jar.display())).unwrap(),
            SourceLocator::LocalJar { path: jar.clone() }
        );
        assert_eq!(
            classify(&format!("file://{}", base.display())).unwrap(),
            SourceLocator::LocalDirectory { path: base.clone() }
        );
        assert!(matches!(
            classify(&format!("file://{}", txt.display())),
            Err(IndexerError::UnsupportedUri(_))
        ));
        assert!(matches!(
            classify(&format!("file://{}", base.join("missing.jar").display())),
            Err(IndexerError::ResourceNotFound(_))
        ));

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn relative_file_uri_fails_format_check() {
        assert!(validate_format("file://relative/path").is_err());
    }
}
