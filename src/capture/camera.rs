//! Live camera session
//!
//! A [`CameraSession`] owns at most one device stream at a time. The stream
//! pushes frames onto a [`DisplaySurface`]; stills and QR scans read from that
//! surface and never touch the device directly.

use image::RgbaImage;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::capture::image::StillImage;
use crate::config::CameraConstraints;
use crate::domain::{ImageOrigin, Playback};
use crate::error::{CaptureError, Result};

/// Latest frame of a live stream, shared between the stream and its readers
#[derive(Clone, Debug, Default)]
pub struct DisplaySurface {
    inner: Arc<Mutex<SurfaceInner>>,
}

#[derive(Debug, Default)]
struct SurfaceInner {
    frame: Option<RgbaImage>,
    /// Bumped on every presented frame
    sequence: u64,
}

impl DisplaySurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the current frame
    pub fn present(&self, frame: RgbaImage) {
        let mut inner = self.lock();
        inner.frame = Some(frame);
        inner.sequence += 1;
    }

    /// Copy of the current frame at its native resolution
    pub fn snapshot(&self) -> Option<(u64, RgbaImage)> {
        let inner = self.lock();
        inner.frame.as_ref().map(|f| (inner.sequence, f.clone()))
    }

    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    pub fn has_frame(&self) -> bool {
        self.lock().frame.is_some()
    }

    /// Drop the current frame (the sequence keeps counting)
    pub fn clear(&self) {
        self.lock().frame = None;
    }
}

/// An acquired camera stream
pub trait DeviceStream: Send + std::fmt::Debug {
    /// Bind the stream to a surface; frames go there once playing
    fn attach(&mut self, surface: DisplaySurface);
    /// Start delivering frames.
    ///
    /// `Ok(Playback::Blocked)` means the platform refused to start without a
    /// user gesture and a later call may succeed. Device failures surfacing
    /// only at this point (busy, denied) are errors.
    fn play(&mut self) -> Result<Playback>;
    /// Stop every track and release the device. Must be idempotent.
    fn stop(&mut self);
    /// Number of tracks still holding the device
    fn active_tracks(&self) -> usize;
    /// Human-readable device name for logs
    fn label(&self) -> String;
}

/// Something that can open camera devices
pub trait CameraBackend: Send + Sync {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn DeviceStream>>;
}

/// Device-level lifecycle, independent of the capture mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraState {
    #[default]
    Idle,
    Requesting,
    Streaming {
        playback: Playback,
    },
    Captured,
}

pub struct CameraSession {
    backend: Arc<dyn CameraBackend>,
    constraints: CameraConstraints,
    state: CameraState,
    stream: Option<Box<dyn DeviceStream>>,
    surface: DisplaySurface,
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("state", &self.state)
            .field("stream", &self.stream)
            .finish()
    }
}

impl CameraSession {
    pub fn new(backend: Arc<dyn CameraBackend>, constraints: CameraConstraints) -> Self {
        Self {
            backend,
            constraints,
            state: CameraState::Idle,
            stream: None,
            surface: DisplaySurface::new(),
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn surface(&self) -> &DisplaySurface {
        &self.surface
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, CameraState::Streaming { .. })
    }

    /// Tracks still held by the current stream (0 when closed)
    pub fn active_tracks(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.active_tracks())
    }

    /// Enter `Requesting`. Returns false if a stream is already requested or
    /// open, in which case nothing changes.
    pub fn begin_open(&mut self) -> bool {
        match self.state {
            CameraState::Requesting | CameraState::Streaming { .. } => {
                log::debug!("Ignoring duplicate camera open in state {:?}", self.state);
                false
            }
            CameraState::Idle | CameraState::Captured => {
                self.state = CameraState::Requesting;
                true
            }
        }
    }

    /// Open the device off the async executor. Does not touch session state.
    pub fn acquire(
        &self,
    ) -> impl Future<Output = Result<Box<dyn DeviceStream>>> + Send + 'static {
        let backend = self.backend.clone();
        let constraints = self.constraints.clone();
        async move {
            tokio::task::spawn_blocking(move || backend.open(&constraints))
                .await
                .unwrap_or_else(|e| {
                    Err(CaptureError::DeviceUnavailable {
                        detail: format!("camera open task failed: {}", e),
                    })
                })
        }
    }

    /// Complete a request started with [`begin_open`](Self::begin_open).
    ///
    /// A stream arriving after the request was abandoned is stopped at once.
    pub fn finish_open(&mut self, result: Result<Box<dyn DeviceStream>>) -> Result<()> {
        if self.state != CameraState::Requesting {
            if let Ok(mut stream) = result {
                log::warn!(
                    "Camera {} opened after request was abandoned, releasing",
                    stream.label()
                );
                stream.stop();
            }
            return Err(CaptureError::NotStreaming);
        }
        match result {
            Ok(stream) => {
                log::info!("Camera stream acquired: {}", stream.label());
                self.stream = Some(stream);
                self.surface.clear();
                self.state = CameraState::Streaming {
                    playback: Playback::Blocked,
                };
                Ok(())
            }
            Err(err) => {
                log::error!("Camera open failed: {}", err);
                self.state = CameraState::Idle;
                Err(err)
            }
        }
    }

    /// Request the device and wait for it
    pub async fn open(&mut self) -> Result<()> {
        if !self.begin_open() {
            return Ok(());
        }
        let result = self.acquire().await;
        self.finish_open(result)
    }

    /// Bind the stream to the display surface and start playback.
    ///
    /// A refused autoplay leaves the session streaming with
    /// [`Playback::Blocked`] so the user can start it by hand. Any other
    /// failure releases the device.
    pub fn attach_and_play(&mut self) -> Result<Playback> {
        let CameraState::Streaming { .. } = self.state else {
            return Err(CaptureError::NotStreaming);
        };
        let Some(stream) = self.stream.as_mut() else {
            return Err(CaptureError::NotStreaming);
        };
        stream.attach(self.surface.clone());
        self.play()
    }

    /// Manual "start" for a blocked preview
    pub fn start_playback(&mut self) -> Result<Playback> {
        let CameraState::Streaming { playback } = self.state else {
            return Err(CaptureError::NotStreaming);
        };
        if playback == Playback::Playing {
            return Ok(playback);
        }
        self.play()
    }

    fn play(&mut self) -> Result<Playback> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(CaptureError::NotStreaming);
        };
        match stream.play() {
            Ok(playback) => {
                if playback == Playback::Blocked {
                    log::warn!("Playback did not start, waiting for manual start");
                }
                self.state = CameraState::Streaming { playback };
                Ok(playback)
            }
            Err(err) => {
                log::error!("Camera failed to start: {}", err);
                self.close();
                Err(err)
            }
        }
    }

    /// Copy the current frame into a still image and release the device.
    ///
    /// Fails with `NotStreaming` unless a stream is open and has produced a
    /// frame; nothing changes in that case.
    pub fn capture_still(&mut self) -> Result<StillImage> {
        if !self.is_streaming() {
            return Err(CaptureError::NotStreaming);
        }
        let Some((sequence, frame)) = self.surface.snapshot() else {
            return Err(CaptureError::NotStreaming);
        };
        log::info!(
            "Captured frame #{} at {}x{}",
            sequence,
            frame.width(),
            frame.height()
        );
        self.release();
        self.state = CameraState::Captured;
        Ok(StillImage::new(frame, ImageOrigin::Camera))
    }

    /// Stop every track and return to `Idle`. Safe to call in any state.
    pub fn close(&mut self) {
        if self.state != CameraState::Idle {
            log::info!("Closing camera session from {:?}", self.state);
        }
        self.release();
        self.state = CameraState::Idle;
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.surface.clear();
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}
