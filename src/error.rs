//! # Error Types
//!
//! Custom error types for Dengo Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Dengo Bridge
#[derive(Debug, Error)]
pub enum DengoError {
    /// Configuration parsing or validation errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be serialized for saving
    #[error("Configuration write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No controller with the requested identity is known
    #[error("Controller not found: {0}")]
    ControllerNotFound(String),

    /// An operation needed an active controller but none is selected
    #[error("No active controller")]
    NoActiveController,

    /// Calibration could not be started or continued
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// A calibration step was not confirmed before its deadline
    #[error("Calibration step timed out")]
    CalibrationTimeout,

    /// Raw USB/HID transport failures
    #[error("USB transport error: {0}")]
    Transport(String),
}

/// Result type alias for Dengo Bridge
pub type Result<T> = std::result::Result<T, DengoError>;
