//! Vigil Observability Library
//!
//! Provides unified logging and tracing setup for the Vigil engine and any
//! host embedding it.
//!
//! # Features
//! - Structured JSON logging with consistent schema
//! - Pretty console output for development
//! - Env-driven level, format and span configuration

pub mod init;

pub use init::*;

// Re-export tracing for convenience
pub use tracing::{debug, error, info, instrument, span, trace, warn, Instrument, Level};
