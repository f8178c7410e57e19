//! Pure domain types with minimal dependencies
//!
//! Types here have no device or recognizer dependencies so the controller,
//! the camera session and the CLI can all share them.

pub mod mode;
pub mod state;

pub use mode::*;
pub use state::*;
