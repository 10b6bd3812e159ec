//! Error taxonomy shared by every component.
//!
//! Each variant corresponds to one status code of the tool surface, so the
//! outer layer can turn any failure into a `{status, message}` pair without
//! inspecting messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("{0}")]
    InvalidCoordinate(String),

    #[error("{0}")]
    UnsupportedUri(String),

    #[error("{0}")]
    ResourceNotFound(String),

    #[error("{0}")]
    DownloadFailed(String),

    #[error("{0}")]
    InvalidSource(String),

    #[error("{0}")]
    UnsupportedSourceType(String),

    #[error("Git clone failed: {0}")]
    GitCloneFailed(String),

    #[error("Git reference not found: {0}")]
    GitRefNotFound(String),

    #[error("Git authentication failed: {0}")]
    GitAuthentication(String),

    #[error("Git worktree error: {0}")]
    GitWorktree(String),

    #[error("Failed to extract source: {0}")]
    ExtractionFailed(String),

    #[error("{0}")]
    NotRegistered(String),

    #[error("Internal error occurred: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexerError>;

impl IndexerError {
    /// Wire status code reported by the tool surface.
    pub fn status(&self) -> &'static str {
        match self {
            Self::UnsupportedUri(_) | Self::UnsupportedSourceType(_) => "unsupported_source_type",
            Self::ResourceNotFound(_) => "resource_not_found",
            Self::DownloadFailed(_) => "download_failed",
            Self::InvalidSource(_) => "invalid_source",
            Self::GitCloneFailed(_) => "git_clone_failed",
            Self::GitRefNotFound(_) => "git_ref_not_found",
            Self::GitAuthentication(_) => "git_authentication_failed",
            Self::ExtractionFailed(_) => "extraction_failed",
            Self::NotRegistered(_) => "not_registered",
            Self::InvalidCoordinate(_)
            | Self::GitWorktree(_)
            | Self::Internal(_)
            | Self::Io(_) => "internal_error",
        }
    }

    pub fn is_git(&self) -> bool {
        matches!(
            self,
            Self::GitCloneFailed(_)
                | Self::GitRefNotFound(_)
                | Self::GitAuthentication(_)
                | Self::GitWorktree(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            IndexerError::GitAuthentication("x".into()).status(),
            "git_authentication_failed"
        );
        assert_eq!(
            IndexerError::UnsupportedUri("x".into()).status(),
            "unsupported_source_type"
        );
        assert_eq!(
            IndexerError::InvalidCoordinate("x".into()).status(),
            "internal_error"
        );
        let io = IndexerError::from(std::io::Error::other("disk"));
        assert_eq!(io.status(), "internal_error");
    }

    #[test]
    fn git_errors_are_grouped() {
        assert!(IndexerError::GitRefNotFound("v1".into()).is_git());
        assert!(!IndexerError::DownloadFailed("x".into()).is_git());
    }
}
