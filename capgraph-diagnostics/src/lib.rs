//! # capgraph diagnostics
//!
//! Logging bootstrap and human-readable reports of negotiated media types.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod media_type_logger;

// Re-export main types
pub use debug_logger::{DebugLogger, LoggingConfig};
pub use media_type_logger::{describe_capability, log_media_type, MediaTypeReport};
