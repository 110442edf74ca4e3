/// Core error types for the Montage engine.
use std::path::PathBuf;

/// A specialized Result type for Montage operations.
pub type MontageResult<T> = Result<T, MontageError>;

/// Top-level error type encompassing all Montage subsystems.
#[derive(Debug, thiserror::Error)]
pub enum MontageError {
    /// The composition cannot be rendered or exported as configured
    /// (no clips, zero duration, bad frame rate). Raised before any I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// A source frame could not be produced for the requested time.
    #[error("decode error: {message} ({source_ref})")]
    Decode { message: String, source_ref: String },

    /// The output sink rejected data or failed to finalize.
    #[error("sink error: {0}")]
    Sink(String),

    /// No drawable output buffer could be obtained for a render request.
    #[error("resource error: {0}")]
    Resource(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("asset error: {message} ({path:?})")]
    Asset { message: String, path: PathBuf },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("keyframe at {time:.3} is within {spacing} of an existing keyframe")]
    KeyframeTooClose { time: f64, spacing: f64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("time {time:.3}s is outside the composition [0, {duration:.3}s]")]
    OutOfRange { time: f64, duration: f64 },

    #[error("nothing to render: the composition has no segments")]
    NothingToRender,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

impl MontageError {
    /// Create a decode error for a source reference.
    pub fn decode(message: impl Into<String>, source_ref: impl std::fmt::Display) -> Self {
        MontageError::Decode {
            message: message.into(),
            source_ref: source_ref.to_string(),
        }
    }

    /// Create an asset error.
    pub fn asset(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        MontageError::Asset {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Whether this error only affects a single layer of a single frame.
    /// The compositor drops the layer and keeps going when this is true.
    pub fn is_layer_local(&self) -> bool {
        matches!(self, MontageError::Decode { .. } | MontageError::Asset { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = MontageError::decode("no frame at 3.2s", "clips/a.mp4");
        assert_eq!(err.to_string(), "decode error: no frame at 3.2s (clips/a.mp4)");
        assert!(err.is_layer_local());
    }

    #[test]
    fn test_config_error_is_not_layer_local() {
        let err = MontageError::Config("no clips".into());
        assert!(err.to_string().contains("no clips"));
        assert!(!err.is_layer_local());
    }

    #[test]
    fn test_out_of_range_display() {
        let err = MontageError::OutOfRange {
            time: 9.5,
            duration: 8.0,
        };
        assert_eq!(
            err.to_string(),
            "time 9.500s is outside the composition [0, 8.000s]"
        );
    }
}
