//! Timezone resolution for taiso
//!
//! This crate wraps the platform timezone capability behind [`ZoneSource`]
//! and builds on it:
//! - [`TimezoneResolver`]: detection, validation, offsets, UTC/wall-clock conversion
//! - [`TimezoneErrorReporter`]: the funnel for every user-facing timezone failure
//!
//! Non-strict resolver methods never fail; they report through the
//! reporter and return a documented fallback. `try_*` variants return
//! [`TimezoneError`] instead and report nothing.

mod mock;
mod reporter;
mod resolver;
mod source;
mod traits;

pub use mock::*;
pub use reporter::*;
pub use resolver::*;
pub use source::*;
pub use traits::*;
