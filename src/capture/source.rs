//! Still image acquisition from the camera or the gallery
//!
//! Both paths end in a [`StillImage`], so recognition never needs to know
//! where the pixels came from.

use std::path::{Path, PathBuf};

use crate::capture::camera::CameraSession;
use crate::capture::image::StillImage;
use crate::domain::ImageOrigin;
use crate::error::{CaptureError, Result};

/// Extensions offered by the gallery picker. Decoding decides what is accepted.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif", "tif", "tiff"];

pub struct FrameSource;

impl FrameSource {
    /// Take the current frame of an open camera session
    pub fn from_camera(session: &mut CameraSession) -> Result<StillImage> {
        session.capture_still()
    }

    /// Read a file fully and decode it
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<StillImage> {
        let path = path.into();
        tokio::task::spawn_blocking(move || Self::read_and_decode(&path))
            .await
            .unwrap_or_else(|e| Err(CaptureError::unreadable(e)))
    }

    /// Decode an in-memory upload
    pub async fn from_bytes(bytes: Vec<u8>) -> Result<StillImage> {
        tokio::task::spawn_blocking(move || StillImage::decode(&bytes, ImageOrigin::File))
            .await
            .unwrap_or_else(|e| Err(CaptureError::unreadable(e)))
    }

    fn read_and_decode(path: &Path) -> Result<StillImage> {
        let bytes = std::fs::read(path).map_err(|e| {
            log::warn!("Failed to read {}: {}", path.display(), e);
            CaptureError::unreadable(e)
        })?;
        log::info!("Decoding {} ({} bytes)", path.display(), bytes.len());
        StillImage::decode(&bytes, ImageOrigin::File)
    }

    /// Let the user pick an image. `None` if the dialog was dismissed.
    pub async fn pick_file() -> Option<PathBuf> {
        let mut dialog = rfd::AsyncFileDialog::new()
            .set_title("Choose a label photo")
            .add_filter("Images", IMAGE_EXTENSIONS);
        if let Some(pictures) = dirs::picture_dir() {
            dialog = dialog.set_directory(pictures);
        }
        dialog
            .pick_file()
            .await
            .map(|handle| handle.path().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeCamera;
    use crate::config::CameraConstraints;
    use crate::error::ErrorKind;
    use image::RgbaImage;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_from_file_decodes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label.png");
        RgbaImage::new(32, 16).save(&path).unwrap();

        let still = FrameSource::from_file(&path).await.unwrap();
        assert_eq!((still.width(), still.height()), (32, 16));
        assert_eq!(still.origin, ImageOrigin::File);
    }

    #[tokio::test]
    async fn test_from_file_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label.jpg");
        std::fs::write(&path, "plain text pretending to be a jpeg").unwrap();

        let err = FrameSource::from_file(&path).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreadableFile);
    }

    #[tokio::test]
    async fn test_from_file_missing() {
        let err = FrameSource::from_file("/nonexistent/label.png")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreadableFile);
    }

    #[tokio::test]
    async fn test_camera_and_file_share_representation() {
        let camera = FakeCamera::new();
        let mut session =
            CameraSession::new(Arc::new(camera.clone()), CameraConstraints::default());
        session.open().await.unwrap();
        session.attach_and_play().unwrap();
        camera.present(RgbaImage::new(640, 480));
        let from_camera = FrameSource::from_camera(&mut session).unwrap();

        let png = from_camera.to_png().unwrap();
        let from_bytes = FrameSource::from_bytes(png).await.unwrap();
        assert_eq!(from_camera.rgba, from_bytes.rgba);
    }
}
