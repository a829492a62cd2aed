//! Data model for taiso
//!
//! This crate defines the types shared by every layer:
//! - Exercise records (legacy and timezone-aware)
//! - Timezone snapshots and the error taxonomy
//! - Calendar projections, filters and statistics

mod record;
mod timezone;

pub use record::*;
pub use timezone::*;
