// SPDX-License-Identifier: MPL-2.0

//! Error types for the effects pipeline

use std::fmt;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type alias for effect engine collaborators
pub type EngineResult<T> = Result<T, EngineError>;

/// Main pipeline error type
///
/// Construction errors are fatal to the pipeline instance. Every other
/// variant is scoped to a single call, and the pipeline stays usable.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Surface or engine allocation failed while building the pipeline
    InitializationFailure(String),
    /// The input frame could not be adapted for the engine
    FrameIngestFailure(String),
    /// The engine reported a processing error
    TransformFailure { code: i32, message: String },
    /// The transformed frame could not be read back
    OutputAdaptFailure(String),
    /// The engine rejected background replacement
    BackgroundEnableFailure { code: i32, message: String },
    /// Background image could not be loaded or decoded
    BackgroundLoadFailure(String),
    /// Configuration errors
    Config(String),
}

/// Error reported by an opaque collaborator (effect engine, image loader, allocator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    /// Collaborator-specific error code
    pub code: i32,
    /// Human readable description
    pub message: String,
}

impl EngineError {
    /// Create a new engine error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl PipelineError {
    /// Whether the pipeline remains usable after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PipelineError::InitializationFailure(_) | PipelineError::Config(_)
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InitializationFailure(msg) => {
                write!(f, "Initialization failed: {}", msg)
            }
            PipelineError::FrameIngestFailure(msg) => write!(f, "Frame ingest failed: {}", msg),
            PipelineError::TransformFailure { code, message } => {
                write!(f, "Transform failed (code {}): {}", code, message)
            }
            PipelineError::OutputAdaptFailure(msg) => write!(f, "Output adapt failed: {}", msg),
            PipelineError::BackgroundEnableFailure { code, message } => {
                write!(
                    f,
                    "Background replacement rejected (code {}): {}",
                    code, message
                )
            }
            PipelineError::BackgroundLoadFailure(msg) => {
                write!(f, "Background load failed: {}", msg)
            }
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for PipelineError {}
impl std::error::Error for EngineError {}

// Conversions for I/O errors
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::InitializationFailure(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}
