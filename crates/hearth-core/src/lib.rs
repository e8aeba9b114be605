//! Hearth Core Library
//!
//! This crate provides shared configuration, errors and logging setup for
//! the Hearth bootstrap.

pub mod config;
pub mod error;
pub mod logging;

pub use config::BootConfig;
pub use error::{HearthError, HearthResult};
pub use logging::{init_logging, LogConfig, LogFormat};
