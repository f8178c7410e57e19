//! Capture session management module
//!
//! This module contains:
//! - The capture controller state machine
//! - Message types driving it

pub mod controller;
pub mod messages;

pub use controller::CaptureController;
pub use messages::Msg;
