//! Still image type shared by the camera and file paths

use chrono::{DateTime, Local};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;

use crate::domain::ImageOrigin;
use crate::error::{CaptureError, Result};

/// A single decoded frame, independent of where it came from
#[derive(Clone, Debug)]
pub struct StillImage {
    pub rgba: RgbaImage,
    pub origin: ImageOrigin,
    pub captured_at: DateTime<Local>,
}

impl StillImage {
    pub fn new(rgba: RgbaImage, origin: ImageOrigin) -> Self {
        log::debug!(
            "StillImage from {:?}: {}x{} pixels",
            origin,
            rgba.width(),
            rgba.height()
        );
        Self {
            rgba,
            origin,
            captured_at: Local::now(),
        }
    }

    /// Decode an encoded image (JPEG, PNG, ...) from memory
    pub fn decode(bytes: &[u8], origin: ImageOrigin) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).map_err(CaptureError::unreadable)?;
        Ok(Self::new(decoded.to_rgba8(), origin))
    }

    /// Get the width of the image
    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    /// Get the height of the image
    pub fn height(&self) -> u32 {
        self.rgba.height()
    }

    /// Encode as JPEG, dropping alpha
    pub fn to_jpeg(&self) -> anyhow::Result<Vec<u8>> {
        let rgb = image::DynamicImage::ImageRgba8(self.rgba.clone()).to_rgb8();
        let mut out = Cursor::new(Vec::new());
        rgb.write_to(&mut out, ImageFormat::Jpeg)?;
        Ok(out.into_inner())
    }

    /// Encode as PNG
    pub fn to_png(&self) -> anyhow::Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.rgba.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}
