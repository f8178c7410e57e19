//! Image capture and recognition module
//!
//! This module consolidates:
//! - Live camera session and display surface (camera.rs)
//! - GStreamer camera backend (gst.rs)
//! - Still image acquisition from camera or file (source.rs)
//! - OCR text recognition (ocr.rs)
//! - QR code detection (qr.rs)
//! - Unified recognition engine (engine.rs)
//! - Still image type (image.rs)

pub mod camera;
pub mod engine;
pub mod gst;
pub mod image;
pub mod ocr;
pub mod qr;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;
