//! # Tools Hub Common
//!
//! Shared utilities for the AI Tools Hub offline worker crates.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Wall-clock timestamps for cache bookkeeping

pub mod clock;
pub mod logging;

pub use clock::unix_millis;
pub use logging::{init_logging, LogConfig, LogFormat, ParseLogFormatError};
