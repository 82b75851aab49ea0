//! Error types shared across ClipForge crates.

use std::path::PathBuf;

/// Top-level error type for ClipForge operations.
#[derive(Debug, thiserror::Error)]
pub enum ClipforgeError {
    #[error("Timeline error: {message}")]
    Timeline { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Export error: {message}")]
    Export { message: String },

    #[error("Encoder error: {message}")]
    Encoder { message: String },

    #[error("Asset error: {message}")]
    Asset { message: String },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Export already running for {destination}")]
    ExportBusy { destination: PathBuf },

    #[error("Export cancelled")]
    Cancelled,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ClipforgeError.
pub type ClipforgeResult<T> = Result<T, ClipforgeError>;

impl ClipforgeError {
    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
        }
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether a retry of the same request can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExportBusy { .. } | Self::Encoder { .. } | Self::Cancelled | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ClipforgeError::encoder("ffmpeg exited with status 1");
        assert_eq!(err.to_string(), "Encoder error: ffmpeg exited with status 1");

        let busy = ClipforgeError::ExportBusy {
            destination: PathBuf::from("/tmp/out.mp4"),
        };
        assert!(busy.to_string().contains("/tmp/out.mp4"));
        assert!(busy.is_retryable());
        assert!(!ClipforgeError::timeline("bad trim").is_retryable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ClipforgeError = io.into();
        assert!(matches!(err, ClipforgeError::Io(_)));
    }
}
