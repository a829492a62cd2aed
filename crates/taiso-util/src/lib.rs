//! Shared utilities for taiso
//!
//! This crate provides:
//! - A clock (`now()`) with a mock-time override for development
//! - Epoch-millisecond helpers shared by the record model
//! - Error types
//! - Default paths for config and data directories

mod error;
mod paths;
mod time;

pub use error::*;
pub use paths::*;
pub use time::*;
