//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the cache service:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
