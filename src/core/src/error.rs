use std::path::PathBuf;

use thiserror::Error;

/// Stratum error types
#[derive(Error, Debug)]
pub enum PlanError {
    /// Reference to a layer that does not exist in the layer table
    #[error("unknown layer: {0}")]
    UnknownLayer(String),

    /// Base refers to neither a configured image nor an external reference
    #[error("unknown image: {0}")]
    UnknownImage(String),

    /// Cycle in the layer dependency graph
    #[error("cycle detected in layer dependency graph")]
    LayerCycle,

    /// Cycle in the image base graph
    #[error("cycle detected in image base graph")]
    ImageCycle,

    /// Malformed configuration value
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Filesystem error with the path that caused it
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tar read/write error during a layer merge
    #[error("merge failed: {0}")]
    MergeError(String),

    /// Subprocess failure during an engine-to-engine transfer
    #[error("transfer failed: {0}")]
    TransferError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl PlanError {
    /// Wrap an `io::Error` together with the path being accessed.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PlanError::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a validation error for a named field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        PlanError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for PlanError {
    fn from(err: serde_yaml::Error) -> Self {
        PlanError::SerializationError(err.to_string())
    }
}

/// Result type alias for Stratum operations
pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlanError::UnknownLayer("pixi".to_string());
        assert_eq!(err.to_string(), "unknown layer: pixi");

        let err = PlanError::validation("images.app.base", "missing");
        assert_eq!(err.to_string(), "invalid images.app.base: missing");
    }

    #[test]
    fn test_io_error_carries_path() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PlanError::io("/tmp/layers", inner);
        let msg = err.to_string();
        assert!(msg.contains("/tmp/layers"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: PlanError = json_err.into();
        assert!(matches!(err, PlanError::SerializationError(_)));
    }
}
