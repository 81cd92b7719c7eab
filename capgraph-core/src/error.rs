//! Error types for capture negotiation and pipeline assembly
//!
//! Two layers are defined here. [`PlatformError`] is the result code returned by
//! the platform capture service seams in [`crate::platform`]; [`CaptureError`] is
//! what the rest of the subsystem reports to its callers.

use thiserror::Error;

/// Result code reported by the platform capture service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The object does not implement the requested operation
    #[error("Operation not implemented: {operation}")]
    NotImplemented {
        /// Operation that was attempted
        operation: String,
    },

    /// The platform service (or one of its factories) could not be reached
    #[error("Platform service unavailable: {reason}")]
    Unavailable {
        /// Reason reported by the platform
        reason: String,
    },

    /// The platform refused the operation
    #[error("{operation} rejected: {reason}")]
    Rejected {
        /// Operation that was attempted
        operation: String,
        /// Reason reported by the platform
        reason: String,
    },

    /// A requested object does not exist
    #[error("Not found: {what}")]
    NotFound {
        /// Description of the missing object
        what: String,
    },

    /// The connection point has no peer
    #[error("Connection point is not connected")]
    NotConnected,
}

impl PlatformError {
    /// Shorthand for a rejection of `operation`
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        PlatformError::Rejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a not-implemented result on `operation`
    pub fn not_implemented(operation: impl Into<String>) -> Self {
        PlatformError::NotImplemented {
            operation: operation.into(),
        }
    }

    /// Whether this is the "not implemented" result code
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, PlatformError::NotImplemented { .. })
    }
}

/// Result type alias for platform service calls
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Main error type for capture operations
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The pipeline service could not be created
    #[error("Capture environment unavailable: {reason}")]
    Environment {
        /// Reason for the failure
        reason: String,
    },

    /// No capture device matched the requested url
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device url (stable id or display name)
        device_id: String,
    },

    /// No device candidate accepted the requested format
    #[error("Format not acceptable: {format}")]
    FormatNotAcceptable {
        /// Description of the requested format
        format: String,
    },

    /// A node has no connection point matching the query
    #[error("Connection point not found: {what}")]
    ConnectionNotFound {
        /// Description of the query
        what: String,
    },

    /// Connecting or adding pipeline nodes failed
    #[error("Graph construction failed at {stage}: {reason}")]
    GraphConstruction {
        /// Pipeline stage being assembled
        stage: String,
        /// Failure reason
        reason: String,
    },

    /// The device refused a format change
    #[error("Format rejected by device: {reason}")]
    FormatRejected {
        /// Failure reason
        reason: String,
    },

    /// Track index out of range or not selectable
    #[error("Invalid track index {index}")]
    InvalidTrack {
        /// Requested track index
        index: usize,
    },

    /// Format index out of range
    #[error("Invalid format index {index} on track {track}")]
    InvalidFormat {
        /// Track index
        track: usize,
        /// Requested format index
        index: usize,
    },

    /// Operation not allowed in the current state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Unhandled platform result
    #[error("Platform error: {source}")]
    Platform {
        /// Underlying platform result
        #[from]
        source: PlatformError,
    },
}

/// Result type alias for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

impl CaptureError {
    /// Check if error is recoverable
    ///
    /// Recoverable errors leave the subsystem usable; the caller can try another
    /// device, format or track.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CaptureError::Environment { .. } => false,
            CaptureError::Configuration { .. } => false,
            CaptureError::DeviceNotFound { .. } => true,
            CaptureError::FormatNotAcceptable { .. } => true,
            CaptureError::ConnectionNotFound { .. } => true,
            CaptureError::GraphConstruction { .. } => true,
            CaptureError::FormatRejected { .. } => true,
            CaptureError::InvalidTrack { .. } => true,
            CaptureError::InvalidFormat { .. } => true,
            CaptureError::InvalidState { .. } => true,
            CaptureError::Platform { source } => !matches!(source, PlatformError::Unavailable { .. }),
        }
    }

    /// Whether this is an expected, non-alarming outcome
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            CaptureError::DeviceNotFound { .. } | CaptureError::FormatNotAcceptable { .. }
        )
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            CaptureError::Environment { .. } => ErrorCategory::Environment,
            CaptureError::DeviceNotFound { .. } => ErrorCategory::Device,
            CaptureError::FormatNotAcceptable { .. } => ErrorCategory::Format,
            CaptureError::ConnectionNotFound { .. } => ErrorCategory::Device,
            CaptureError::GraphConstruction { .. } => ErrorCategory::Pipeline,
            CaptureError::FormatRejected { .. } => ErrorCategory::Format,
            CaptureError::InvalidTrack { .. } => ErrorCategory::Track,
            CaptureError::InvalidFormat { .. } => ErrorCategory::Track,
            CaptureError::InvalidState { .. } => ErrorCategory::State,
            CaptureError::Configuration { .. } => ErrorCategory::Configuration,
            CaptureError::Platform { .. } => ErrorCategory::Platform,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Pipeline service could not be created
    Environment,
    /// Device lookup and connection point errors
    Device,
    /// Format negotiation errors
    Format,
    /// Graph assembly errors
    Pipeline,
    /// Track and format selection errors
    Track,
    /// State management errors
    State,
    /// Configuration errors
    Configuration,
    /// Raw platform result codes
    Platform,
}
