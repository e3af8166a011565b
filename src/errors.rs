//! Error types for the mirror operation.
//!
//! Store implementations report failures as [`anyhow::Error`]; the mirror
//! wraps them in [`MirrorError`] so callers can tell a fatal listing
//! failure apart from a single object that could not be fetched.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by [`crate::mirror`].
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Listing the bucket failed. Always fatal.
    #[error("failed to list s3://{bucket}/{prefix}")]
    List {
        bucket: String,
        prefix: String,
        #[source]
        source: anyhow::Error,
    },

    /// A single object could not be downloaded.
    #[error("failed to download {key}")]
    Download {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// A local directory could not be created.
    #[error("failed to create directory {}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The key would resolve outside the local root.
    #[error("object key escapes the local root: {key}")]
    UnsafeKey { key: String },
}

impl MirrorError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorError::List { .. } => "list",
            MirrorError::Download { .. } => "download",
            MirrorError::Filesystem { .. } => "filesystem",
            MirrorError::UnsafeKey { .. } => "unsafe_key",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_error_message_names_bucket_and_prefix() {
        let err = MirrorError::List {
            bucket: "photos".to_string(),
            prefix: "2024/".to_string(),
            source: anyhow::anyhow!("AccessDenied"),
        };
        assert_eq!(err.to_string(), "failed to list s3://photos/2024/");
        assert_eq!(err.kind(), "list");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "AccessDenied");
    }

    #[test]
    fn test_filesystem_error_message_names_path() {
        let err = MirrorError::Filesystem {
            path: PathBuf::from("downloads/docs"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to create directory downloads/docs");
        assert_eq!(err.kind(), "filesystem");
    }

    #[test]
    fn test_unsafe_key_kind() {
        let err = MirrorError::UnsafeKey {
            key: "../etc/passwd".to_string(),
        };
        assert_eq!(err.kind(), "unsafe_key");
        assert!(err.to_string().contains("../etc/passwd"));
    }
}
