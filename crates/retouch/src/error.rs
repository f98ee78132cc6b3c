use std::path::PathBuf;

use thiserror::Error;

use crate::types::FileState;

#[derive(Error, Debug)]
pub enum RetouchError {
    #[error("Failed to decode image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Stage '{stage}' produced an empty image")]
    EmptyResult { stage: FileState },

    #[error("Stage '{stage}' failed: {message}")]
    Transform { stage: FileState, message: String },

    #[error("Failed to save {path:?}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to rename {from:?} -> {to:?}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,

    #[error("Processing cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl RetouchError {
    /// Errors after which the current file cannot be finished. Anything else
    /// raised by a stage leaves the pre-stage image in place.
    pub fn is_fatal_for_file(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::EmptyResult { .. } | Self::Save { .. } | Self::Cancelled
        )
    }

    pub(crate) fn transform(stage: FileState, message: impl Into<String>) -> Self {
        Self::Transform {
            stage,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RetouchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_is_recoverable() {
        let error = RetouchError::transform(FileState::Cropped, "bad buffer");
        assert!(!error.is_fatal_for_file());
        assert_eq!(error.to_string(), "Stage 'cropped' failed: bad buffer");
    }

    #[test]
    fn test_empty_result_is_fatal() {
        let error = RetouchError::EmptyResult {
            stage: FileState::BackgroundRemoved,
        };
        assert!(error.is_fatal_for_file());
        assert_eq!(
            error.to_string(),
            "Stage 'background_removed' produced an empty image"
        );
    }

    #[test]
    fn test_cancelled_is_fatal() {
        assert!(RetouchError::Cancelled.is_fatal_for_file());
    }
}
