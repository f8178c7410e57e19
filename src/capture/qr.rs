//! QR code detection module using rqrr

use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::capture::camera::DisplaySurface;
use crate::config::QrSettings;

/// Decodes every QR payload visible in one frame. Blocking.
pub trait CodeDecoder: Send + Sync {
    fn decode(&self, frame: &RgbaImage) -> Vec<String>;
}

/// Decode QR codes in an image at a specific resolution
/// max_dim: maximum dimension to downsample to (0 = no downsampling)
pub fn detect_qr_codes_at_resolution(img: &RgbaImage, max_dim: u32) -> Vec<String> {
    use rqrr::PreparedImage;

    let (orig_w, orig_h) = (img.width(), img.height());
    let downsample_factor = if max_dim > 0 && (orig_w > max_dim || orig_h > max_dim) {
        orig_w.max(orig_h) as f32 / max_dim as f32
    } else {
        1.0
    };

    let gray = if downsample_factor > 1.0 {
        let new_w = ((orig_w as f32 / downsample_factor) as u32).max(1);
        let new_h = ((orig_h as f32 / downsample_factor) as u32).max(1);
        let resized =
            image::imageops::resize(img, new_w, new_h, image::imageops::FilterType::Nearest);
        image::DynamicImage::ImageRgba8(resized).to_luma8()
    } else {
        image::DynamicImage::ImageRgba8(img.clone()).to_luma8()
    };

    let mut prepared = PreparedImage::prepare(gray);
    let grids = prepared.detect_grids();

    let mut results: Vec<String> = Vec::new();
    for grid in grids {
        match grid.decode() {
            Ok((_, content)) => {
                if !results.contains(&content) {
                    results.push(content);
                }
            }
            Err(e) => log::debug!("QR grid found but not decodable: {:?}", e),
        }
    }
    results
}

/// rqrr decoder with progressive passes, cheapest first
#[derive(Debug, Clone)]
pub struct RqrrDecoder {
    resolutions: Vec<u32>,
}

impl Default for RqrrDecoder {
    fn default() -> Self {
        Self::new(&QrSettings::default())
    }
}

impl RqrrDecoder {
    pub fn new(settings: &QrSettings) -> Self {
        let resolutions = if settings.resolutions.is_empty() {
            vec![0]
        } else {
            settings.resolutions.clone()
        };
        Self { resolutions }
    }
}

impl CodeDecoder for RqrrDecoder {
    fn decode(&self, frame: &RgbaImage) -> Vec<String> {
        for &max_dim in &self.resolutions {
            let found = detect_qr_codes_at_resolution(frame, max_dim);
            if !found.is_empty() {
                log::debug!("QR pass at max_dim={} found {} code(s)", max_dim, found.len());
                return found;
            }
        }
        Vec::new()
    }
}

/// A running scan of a live surface.
///
/// The callback fires once for every frame that decodes. The scan keeps going
/// until [`stop`](Self::stop) is called or the handle is dropped.
#[derive(Debug)]
pub struct CodeSubscription {
    task: Option<JoinHandle<()>>,
}

impl CodeSubscription {
    pub fn start<F>(
        surface: DisplaySurface,
        decoder: Arc<dyn CodeDecoder>,
        interval: Duration,
        on_decoded: F,
    ) -> Self
    where
        F: Fn(String) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut last_scanned = 0u64;
            loop {
                if let Some((sequence, frame)) = surface.snapshot()
                    && sequence != last_scanned
                {
                    last_scanned = sequence;
                    let decoder = decoder.clone();
                    let found = tokio::task::spawn_blocking(move || decoder.decode(&frame))
                        .await
                        .unwrap_or_default();
                    if let Some(payload) = found.into_iter().next() {
                        log::info!("QR code decoded from frame #{}", sequence);
                        on_decoded(payload);
                    }
                }
                tokio::time::sleep(interval).await;
            }
        });
        Self { task: Some(task) }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the scan. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            log::debug!("Stopping QR subscription");
            task.abort();
        }
    }
}

impl Drop for CodeSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeCode;
    use image::Rgba;

    #[test]
    fn test_blank_frame_has_no_codes() {
        let decoder = RqrrDecoder::default();
        assert!(decoder.decode(&RgbaImage::new(640, 480)).is_empty());
    }

    #[test]
    fn test_empty_resolution_list_scans_full_frame() {
        let decoder = RqrrDecoder::new(&QrSettings {
            scan_interval_ms: 10,
            resolutions: Vec::new(),
        });
        assert_eq!(decoder.resolutions, vec![0]);
    }

    #[tokio::test]
    async fn test_subscription_reports_until_stopped() {
        let surface = DisplaySurface::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let decoder: Arc<dyn CodeDecoder> = Arc::new(FakeCode {
            payload: "FUR-0042".to_string(),
        });
        let mut subscription =
            CodeSubscription::start(surface.clone(), decoder, Duration::from_millis(5), move |p| {
                let _ = tx.send(p);
            });

        // Transparent frame: nothing decodes
        surface.present(RgbaImage::new(4, 4));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());

        surface.present(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        assert_eq!(rx.recv().await.as_deref(), Some("FUR-0042"));
        assert!(subscription.is_active());

        subscription.stop();
        subscription.stop();
        assert!(!subscription.is_active());
    }
}
