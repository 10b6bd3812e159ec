//! Maven coordinate validation.
//!
//! Every coordinate component ends up as a directory name under the storage
//! root, so validation here is the only thing standing between a tool
//! argument and a path traversal.

use serde::Serialize;
use std::fmt;

use crate::error::{IndexerError, Result};

const MAX_COMPONENT_LEN: usize = 100;
const MAX_TOTAL_LEN: usize = 250;
const SEPARATOR_MARGIN: usize = 20;

const TRAVERSAL_PATTERNS: [&str; 5] = ["../", "./", "~", "..", "//"];
const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// A validated `(group_id, artifact_id, version)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Coordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl Coordinate {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Result<Self> {
        validate(group_id, artifact_id, Some(version))?;
        Ok(Self {
            group_id: group_id.trim().to_string(),
            artifact_id: artifact_id.trim().to_string(),
            version: version.trim().to_string(),
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Validates coordinate components. `version` is `None` when addressing the
/// per-artifact bare repository, which has no version segment.
pub fn validate(group_id: &str, artifact_id: &str, version: Option<&str>) -> Result<()> {
    let mut components = vec![("group_id", group_id.trim()), ("artifact_id", artifact_id.trim())];
    if let Some(v) = version {
        components.push(("version", v.trim()));
    }

    for (name, value) in &components {
        if value.is_empty() {
            return Err(invalid(format!(
                "{name} must be a non-empty string (whitespace only is not allowed)"
            )));
        }
    }

    for (_, value) in &components {
        if let Some(pattern) = TRAVERSAL_PATTERNS.iter().find(|p| value.contains(*p)) {
            return Err(invalid(format!(
                "Coordinate contains dangerous path traversal pattern '{pattern}': {value}"
            )));
        }
    }

    for (name, value) in &components {
        if let Some(c) = value.chars().find(|c| RESERVED_CHARS.contains(c)) {
            return Err(invalid(format!(
                "{name} contains invalid file system character '{c}': {value}"
            )));
        }
    }

    for (name, value) in &components {
        if value.len() > MAX_COMPONENT_LEN {
            return Err(invalid(format!(
                "{name} is too long (max {MAX_COMPONENT_LEN} chars): {} chars",
                value.len()
            )));
        }
    }

    let total: usize = components.iter().map(|(_, v)| v.len()).sum::<usize>() + SEPARATOR_MARGIN;
    if total > MAX_TOTAL_LEN {
        return Err(invalid(format!(
            "Combined Maven coordinates too long (max {MAX_TOTAL_LEN} chars): {total} chars"
        )));
    }

    for (name, value) in &components {
        if !value.chars().all(is_safe_char) {
            return Err(invalid(format!(
                "{name} contains invalid characters. Only letters, numbers, dots, underscores, and hyphens allowed: {value}"
            )));
        }
    }

    Ok(())
}

/// Syntax check for a user-supplied git reference. Runs before the ref is
/// handed to the git binary as an argument.
pub fn validate_git_ref(git_ref: &str) -> Result<()> {
    let git_ref = git_ref.trim();
    if git_ref.is_empty() {
        return Err(invalid("git_ref cannot be empty or whitespace only".to_string()));
    }
    if git_ref.starts_with('-') {
        return Err(invalid(format!("git_ref cannot start with '-': {git_ref}")));
    }
    if let Some(c) = git_ref
        .chars()
        .find(|c| matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
    {
        return Err(invalid(format!("git_ref cannot contain '{c}': {git_ref}")));
    }
    if git_ref.starts_with('/') || git_ref.ends_with('/') {
        return Err(invalid(format!("git_ref cannot start or end with '/': {git_ref}")));
    }
    if git_ref.starts_with('.') || git_ref.ends_with('.') {
        return Err(invalid(format!("git_ref cannot start or end with '.': {git_ref}")));
    }
    if git_ref.contains("//") || git_ref.contains("..") {
        return Err(invalid(format!(
            "git_ref cannot contain consecutive '/' or '.': {git_ref}"
        )));
    }
    Ok(())
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn invalid(message: String) -> IndexerError {
    IndexerError::InvalidCoordinate(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_coordinates() {
        assert!(validate("org.springframework", "spring-core", Some("5.3.21")).is_ok());
        assert!(validate("com.example", "my_lib", Some("1.0.0-SNAPSHOT")).is_ok());
        assert!(validate("com.example", "lib", None).is_ok());
    }

    #[test]
    fn rejects_traversal_and_separators() {
        for (g, a, v) in [
            ("../etc", "lib", "1.0"),
            ("com.example", "lib", "~root"),
            ("com.example", "a/b", "1.0"),
            ("com.example", "lib", "1.0\\x"),
            ("com..example", "lib", "1.0"),
        ] {
            let err = validate(g, a, Some(v)).unwrap_err();
            assert!(matches!(err, IndexerError::InvalidCoordinate(_)), "{g}:{a}:{v}");
        }
    }

    #[test]
    fn traversal_check_runs_before_reserved_chars() {
        let err = validate("com.example", "../lib", Some("1.0")).unwrap_err();
        assert!(err.to_string().contains("path traversal pattern '../'"));
    }

    #[test]
    fn rejects_blank_components() {
        let err = validate("   ", "lib", Some("1.0")).unwrap_err();
        assert!(err.to_string().contains("group_id"));
        assert!(validate("com.example", "lib", Some("")).is_err());
    }

    #[test]
    fn enforces_length_limits() {
        let long = "a".repeat(101);
        let err = validate(&long, "lib", Some("1.0")).unwrap_err();
        assert!(err.to_string().contains("too long"));

        let group = "b".repeat(100);
        let artifact = "c".repeat(100);
        let version = "1".repeat(31);
        let err = validate(&group, &artifact, Some(&version)).unwrap_err();
        assert!(err.to_string().contains("Combined"));
        assert!(validate(&group, &artifact, Some(&"1".repeat(30))).is_ok());
    }

    #[test]
    fn rejects_unsafe_characters() {
        let err = validate("com.example", "lib", Some("1.0+build")).unwrap_err();
        assert!(err.to_string().contains("invalid characters"));
        assert!(validate("com.exämple", "lib", Some("1.0")).is_err());
    }

    #[test]
    fn coordinate_is_trimmed() {
        let c = Coordinate::new(" com.example ", "lib", "1.0 ").unwrap();
        assert_eq!(c.group_id, "com.example");
        assert_eq!(c.version, "1.0");
        assert_eq!(c.to_string(), "com.example:lib:1.0");
    }

    #[test]
    fn git_ref_syntax() {
        assert!(validate_git_ref("main").is_ok());
        assert!(validate_git_ref("release/5.3.x").is_ok());
        assert!(validate_git_ref("v1.0.0").is_ok());
        assert!(validate_git_ref("--upload-pack=x").is_err());
        assert!(validate_git_ref("HEAD~1").is_err());
        assert!(validate_git_ref("a..b").is_err());
        assert!(validate_git_ref("feature/").is_err());
    }
}
