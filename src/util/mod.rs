//! Utility modules for venvpack
//!
//! - Structured logging setup and configuration
//! - `.env` parsing for container environment forwarding

pub mod env_file;
pub mod logging;

pub use logging::{init_default, init_from_env, init_logging, LoggingConfig};
