//! Error types for the capture and analysis pipeline

use std::fmt;

/// Errors that can occur while building or running the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpectrogramError {
    /// Invalid pipeline configuration, detected at construction
    Configuration(String),

    /// Arithmetic on a degenerate size (zero capacity or transform length)
    Domain(String),

    /// Capture device could not be opened or negotiated
    Device(String),
}

impl SpectrogramError {
    pub fn config(msg: impl Into<String>) -> Self {
        SpectrogramError::Configuration(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        SpectrogramError::Device(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, SpectrogramError::Configuration(_))
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, SpectrogramError::Domain(_))
    }

    pub fn is_device(&self) -> bool {
        matches!(self, SpectrogramError::Device(_))
    }
}

impl fmt::Display for SpectrogramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpectrogramError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            SpectrogramError::Domain(msg) => write!(f, "Domain error: {}", msg),
            SpectrogramError::Device(msg) => write!(f, "Device error: {}", msg),
        }
    }
}

impl std::error::Error for SpectrogramError {}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, SpectrogramError>;
