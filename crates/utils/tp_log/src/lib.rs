//! Text logging for the teleplay crates.
//!
//! Every crate in the workspace logs through these re-exported macros so that
//! the logging backend can be swapped in exactly one place.

pub use log::{debug, error, info, trace, warn};

#[cfg(feature = "setup")]
mod setup;

#[cfg(feature = "setup")]
pub use setup::setup_logging;
