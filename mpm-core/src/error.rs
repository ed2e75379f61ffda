//! Error types for the resolution and fetch pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while resolving, fetching, and recording plugins.
///
/// Every variant except [`MpmError::Persistence`] is scoped to a single
/// artifact: the batch coordinator records it and moves on.
#[derive(Error, Debug)]
pub enum MpmError {
    /// A catalog call returned a non-success status
    #[error("catalog request to {url} failed with HTTP {status}: {body}")]
    Catalog {
        status: u16,
        body: String,
        url: String,
    },

    /// Compatibility filtering eliminated every candidate, fallbacks included
    #[error("no version of '{name}' found for any platform compatible with {platform}")]
    NoCompatibleVersion { name: String, platform: String },

    /// A pinned version label is not among the compatible candidates
    #[error("version '{requested}' not found for '{name}'")]
    VersionNotFound { name: String, requested: String },

    /// Downloaded bytes do not hash to the published digest
    #[error("checksum mismatch for {filename}:\nExpected: {expected}\nActual:   {actual}")]
    ChecksumMismatch {
        expected: String,
        actual: String,
        filename: String,
    },

    /// The selected version publishes no files
    #[error("no downloadable file for '{name}' {version}")]
    NoDownloadableFile { name: String, version: String },

    /// An identifier does not have the shape its catalog expects
    #[error("invalid {source_kind} identifier '{identifier}': {reason}")]
    InvalidIdentifier {
        source_kind: String,
        identifier: String,
        reason: String,
    },

    /// The declaration names a catalog that is not configured
    #[error("catalog '{0}' is not enabled")]
    SourceUnavailable(String),

    /// A platform was requested but fallback platforms are disabled
    #[error("'{name}' has no {requested} build and platform fallback is disabled (closest: {available})")]
    FallbackDenied {
        name: String,
        requested: String,
        available: String,
    },

    /// The lock state could not be written; fatal to the run
    #[error("failed to persist lock state to {}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A catalog-supplied filename would escape the destination directory
    #[error("refusing unsafe filename '{0}'")]
    UnsafeFilename(String),

    /// A job panicked or was cancelled before reporting
    #[error("install task failed: {0}")]
    TaskFailed(String),
}

impl MpmError {
    /// Integrity failures must surface as hard failures, never warnings.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, MpmError::ChecksumMismatch { .. })
    }

    /// Resolution misses (nothing to install) as opposed to real faults.
    pub fn is_resolution_miss(&self) -> bool {
        matches!(
            self,
            MpmError::NoCompatibleVersion { .. }
                | MpmError::VersionNotFound { .. }
                | MpmError::FallbackDenied { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MpmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_is_integrity_failure() {
        let err = MpmError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
            filename: "x.jar".into(),
        };
        assert!(err.is_integrity_failure());
        assert!(!err.is_resolution_miss());
        assert!(err.to_string().contains("x.jar"));
    }

    #[test]
    fn test_catalog_error_carries_status_and_body() {
        let err = MpmError::Catalog {
            status: 503,
            body: "maintenance".into(),
            url: "https://api.modrinth.com/v2/search".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("maintenance"));
        assert!(!err.is_integrity_failure());
    }
}
