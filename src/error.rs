// Error handling for the video playback service

use std::fmt;

/// Video playback error types
#[derive(Debug, Clone)]
pub enum VideoError {
    /// Failed to open or prepare the media source (bad/unreachable URI,
    /// local file open failure, no playable representation)
    Initialization(String),

    /// Engine-level decode/crypto/track error
    Decoder(String),

    /// Unexpected engine fault surfaced through the error callback
    Runtime(String),
}

impl fmt::Display for VideoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VideoError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
            VideoError::Decoder(msg) => write!(f, "Decoder error: {}", msg),
            VideoError::Runtime(msg) => write!(f, "Runtime fault: {}", msg),
        }
    }
}

impl std::error::Error for VideoError {}

/// Result type alias for video service operations
pub type Result<T> = std::result::Result<T, VideoError>;
