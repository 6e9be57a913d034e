//! Common utilities and types shared across the DNS failover crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{LogBuffer, LogBufferLayer, LogEntry};
