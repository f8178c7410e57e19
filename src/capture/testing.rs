//! In-memory camera and recognizers for tests

use image::RgbaImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::capture::camera::{CameraBackend, DeviceStream, DisplaySurface};
use crate::capture::ocr::{ProgressFn, TextRecognizer};
use crate::capture::qr::CodeDecoder;
use crate::config::CameraConstraints;
use crate::domain::Playback;
use crate::error::{CaptureError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOutcome {
    Ok,
    NoDevice,
    Denied,
    Busy,
    /// Opens fine, then fails with `DeviceBusy` when asked to play
    BusyOnPlay,
}

#[derive(Debug, Default)]
struct FakeCameraInner {
    tracks: AtomicUsize,
    opens: AtomicUsize,
    autoplay_failures: AtomicUsize,
    surface: Mutex<Option<DisplaySurface>>,
}

#[derive(Debug, Clone)]
pub struct FakeCamera {
    outcome: FakeOutcome,
    inner: Arc<FakeCameraInner>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::with_outcome(FakeOutcome::Ok)
    }

    pub fn with_outcome(outcome: FakeOutcome) -> Self {
        Self {
            outcome,
            inner: Arc::default(),
        }
    }

    pub fn active_tracks(&self) -> usize {
        self.inner.tracks.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Make the next `n` play calls fail
    pub fn block_autoplay(&self, n: usize) {
        self.inner.autoplay_failures.store(n, Ordering::SeqCst);
    }

    /// Push a frame to whatever surface the stream is attached to
    pub fn present(&self, frame: RgbaImage) {
        if let Some(surface) = self.inner.surface.lock().unwrap().as_ref() {
            surface.present(frame);
        }
    }
}

impl CameraBackend for FakeCamera {
    fn open(&self, _constraints: &CameraConstraints) -> Result<Box<dyn DeviceStream>> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        let detail = "fake".to_string();
        match self.outcome {
            FakeOutcome::Ok | FakeOutcome::BusyOnPlay => {
                self.inner.tracks.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FakeStream {
                    inner: self.inner.clone(),
                    live: true,
                    busy_on_play: self.outcome == FakeOutcome::BusyOnPlay,
                }))
            }
            FakeOutcome::NoDevice => Err(CaptureError::DeviceUnavailable { detail }),
            FakeOutcome::Denied => Err(CaptureError::PermissionDenied { detail }),
            FakeOutcome::Busy => Err(CaptureError::DeviceBusy { detail }),
        }
    }
}

#[derive(Debug)]
pub struct FakeStream {
    inner: Arc<FakeCameraInner>,
    live: bool,
    busy_on_play: bool,
}

impl DeviceStream for FakeStream {
    fn attach(&mut self, surface: DisplaySurface) {
        *self.inner.surface.lock().unwrap() = Some(surface);
    }

    fn play(&mut self) -> Result<Playback> {
        if self.busy_on_play {
            return Err(CaptureError::DeviceBusy {
                detail: "fake: in use by another process".to_string(),
            });
        }
        let failures = self.inner.autoplay_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.inner
                .autoplay_failures
                .store(failures - 1, Ordering::SeqCst);
            return Ok(Playback::Blocked);
        }
        Ok(Playback::Playing)
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.inner.tracks.fetch_sub(1, Ordering::SeqCst);
            *self.inner.surface.lock().unwrap() = None;
        }
    }

    fn active_tracks(&self) -> usize {
        usize::from(self.live)
    }

    fn label(&self) -> String {
        "fake camera".to_string()
    }
}

/// Text recognizer returning canned text
pub struct FakeText {
    pub text: Result<String, String>,
}

impl FakeText {
    pub fn ok(text: &str) -> Self {
        Self {
            text: Ok(text.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            text: Err(message.to_string()),
        }
    }
}

impl TextRecognizer for FakeText {
    fn recognize(
        &self,
        _image: &RgbaImage,
        _languages: &[String],
        progress: &ProgressFn,
    ) -> Result<String> {
        progress(30);
        progress(70);
        self.text.clone().map_err(CaptureError::RecognitionFailed)
    }
}

/// Decodes `payload` from any frame whose top-left pixel is opaque
pub struct FakeCode {
    pub payload: String,
}

impl CodeDecoder for FakeCode {
    fn decode(&self, frame: &RgbaImage) -> Vec<String> {
        match frame.get_pixel_checked(0, 0) {
            Some(p) if p[3] == 255 => vec![self.payload.clone()],
            _ => Vec::new(),
        }
    }
}
