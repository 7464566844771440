//! Error types for animplayer
//!
//! The playback pipeline itself never surfaces errors: decode failures and
//! shutdown races degrade to "this frame/iteration/session ends". The error
//! type here covers the edges around it: configuration, input validation
//! and session setup. We use thiserror for the library and anyhow in the
//! binary.

use thiserror::Error;

/// Main error type for animplayer
#[derive(Error, Debug)]
pub enum AnimError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The decoder was lost (producer thread panicked) and no session can start
    #[error("Decoder unavailable: {0}")]
    DecoderUnavailable(String),

    /// Background producer could not be launched
    #[error("Failed to spawn producer: {0}")]
    Spawn(String),
}

impl AnimError {
    /// Create an invalid input error from string
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        AnimError::InvalidInput(msg.into())
    }
}

/// Convenience type alias for Results in animplayer
pub type Result<T> = std::result::Result<T, AnimError>;

/// Extension trait for converting other errors to AnimError
pub trait IntoAnimError<T> {
    /// Convert this error into a configuration error with the given context
    fn config_err(self, context: &str) -> Result<T>;
    /// Convert this error into a spawn error with the given context
    fn spawn_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoAnimError<T> for std::result::Result<T, E> {
    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| AnimError::Config(format!("{}: {}", context, e)))
    }

    fn spawn_err(self, context: &str) -> Result<T> {
        self.map_err(|e| AnimError::Spawn(format!("{}: {}", context, e)))
    }
}
