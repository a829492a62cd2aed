//! Record keeping core for taiso
//!
//! This crate sits between storage and the front end:
//! - Recording completions under their local calendar date
//! - Migrating legacy records to timezone-aware ones
//! - Streaks and calendar projection in any display zone
//! - Watching the ambient timezone for changes

mod detector;
mod locks;
mod migration;
mod projector;
mod records;

pub use detector::*;
pub use locks::*;
pub use migration::*;
pub use projector::*;
pub use records::*;
