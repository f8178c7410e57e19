//! Capture controller
//!
//! The only part of the pipeline the host talks to. It sequences camera or
//! file acquisition, recognition and extraction, and calls the host back at
//! most once with the extracted value.

use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::capture::camera::{CameraBackend, CameraSession, DeviceStream, DisplaySurface};
use crate::capture::engine::{Recognition, RecognitionEngine, RecognitionEvent, RecognitionRequest};
use crate::capture::gst::GstCamera;
use crate::capture::image::StillImage;
use crate::capture::source::FrameSource;
use crate::config::CaptureConfig;
use crate::domain::{Activity, CaptureMode, CaptureState, Playback};
use crate::error::{CaptureError, ErrorKind, Result};
use crate::extract::FieldExtractor;
use crate::session::messages::Msg;

/// Host callback receiving the extracted value
pub type ValueCallback = Box<dyn FnOnce(String) + Send>;

/// Drives one capture modal from open to close.
///
/// Camera requests, file decodes and recognition are spawned onto the
/// current Tokio runtime, so `open` and `update` must be called from inside
/// one. Completions come back through [`pump`](Self::pump).
pub struct CaptureController {
    mode: CaptureMode,
    state: CaptureState,
    camera: CameraSession,
    engine: RecognitionEngine,
    extractor: FieldExtractor,
    recognition: Option<Recognition>,
    still: Option<StillImage>,
    /// Bumped whenever an attempt starts or is abandoned
    attempt: u64,
    /// Persistent notice shown after a permission failure
    banner: Option<&'static str>,
    on_value: Option<ValueCallback>,
    tx: UnboundedSender<Msg>,
    rx: UnboundedReceiver<Msg>,
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("attempt", &self.attempt)
            .field("camera", &self.camera)
            .finish_non_exhaustive()
    }
}

impl CaptureController {
    pub fn new<F>(
        mode: CaptureMode,
        camera: CameraSession,
        engine: RecognitionEngine,
        extractor: FieldExtractor,
        on_value: F,
    ) -> Self
    where
        F: FnOnce(String) + Send + 'static,
    {
        let (tx, rx) = unbounded_channel();
        Self {
            mode,
            state: CaptureState::Idle,
            camera,
            engine,
            extractor,
            recognition: None,
            still: None,
            attempt: 0,
            banner: None,
            on_value: Some(Box::new(on_value)),
            tx,
            rx,
        }
    }

    /// Controller wired to the system camera, tesseract and rqrr
    pub fn from_config<F>(mode: CaptureMode, config: &CaptureConfig, on_value: F) -> Self
    where
        F: FnOnce(String) + Send + 'static,
    {
        let backend: Arc<dyn CameraBackend> = Arc::new(GstCamera::new());
        Self::new(
            mode,
            CameraSession::new(backend, config.camera.clone()),
            RecognitionEngine::from_config(config),
            FieldExtractor::with_keywords(config.keywords.iter().cloned()),
            on_value,
        )
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Persistent permission notice, if any
    pub fn banner(&self) -> Option<&'static str> {
        self.banner
    }

    /// The captured or picked image being recognized
    pub fn still_image(&self) -> Option<&StillImage> {
        self.still.as_ref()
    }

    /// Live preview surface while streaming
    pub fn preview(&self) -> Option<&DisplaySurface> {
        matches!(self.state, CaptureState::Streaming { .. }).then(|| self.camera.surface())
    }

    /// Tracks still held by the camera (0 unless streaming)
    pub fn active_tracks(&self) -> usize {
        self.camera.active_tracks()
    }

    /// What is in flight right now, for a matching indicator
    pub fn activity(&self) -> Option<Activity> {
        match &self.state {
            CaptureState::Requesting => Some(Activity::AcquiringCamera),
            CaptureState::Streaming { .. } if !self.camera.surface().has_frame() => {
                Some(Activity::WaitingForFrame)
            }
            CaptureState::Streaming { .. } if self.mode == CaptureMode::Qr => {
                Some(Activity::Scanning)
            }
            CaptureState::DecodingFile => Some(Activity::DecodingFile),
            CaptureState::Captured => Some(Activity::Recognizing(0)),
            CaptureState::Processing { progress } => Some(Activity::Recognizing(*progress)),
            _ => None,
        }
    }

    /// Whether the capture button should be enabled
    pub fn can_capture(&self) -> bool {
        self.mode == CaptureMode::Ocr
            && self.state
                == (CaptureState::Streaming {
                    playback: Playback::Playing,
                })
            && self.camera.surface().has_frame()
    }

    /// Show the modal: pick a source for labels, go straight to the camera
    /// for QR codes
    pub fn open(&mut self) {
        if self.state != CaptureState::Idle {
            log::debug!("Capture already opened ({})", self.state.name());
            return;
        }
        log::info!("Opening {} capture", self.mode.name());
        if self.mode.has_source_choice() {
            self.state = CaptureState::ChoosingSource;
        } else {
            self.request_camera();
        }
    }

    /// Wait for the next background completion
    pub async fn next_message(&mut self) -> Option<Msg> {
        self.rx.recv().await
    }

    /// Handle one background completion. Returns false once closed.
    pub async fn pump(&mut self) -> bool {
        if self.state.is_closed() {
            return false;
        }
        match self.next_message().await {
            Some(msg) => {
                self.update(msg);
                true
            }
            None => false,
        }
    }

    /// Pump messages until `done` holds or the modal closes
    pub async fn wait_for<F>(&mut self, done: F)
    where
        F: Fn(&CaptureState) -> bool,
    {
        while !done(&self.state) && self.pump().await {}
    }

    pub fn update(&mut self, msg: Msg) {
        if self.state.is_closed() {
            log::debug!("Ignoring {} after close", msg.name());
            if let Msg::CameraOpened {
                result: Ok(mut stream),
                ..
            } = msg
            {
                stream.stop();
            }
            return;
        }

        match msg {
            Msg::ChooseCamera => {
                if self.state == CaptureState::ChoosingSource {
                    self.request_camera();
                } else {
                    self.ignore("choose-camera");
                }
            }
            Msg::ChooseFile(path) => {
                if self.state == CaptureState::ChoosingSource {
                    let attempt = self.next_attempt();
                    self.state = CaptureState::DecodingFile;
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let result = FrameSource::from_file(path).await;
                        let _ = tx.send(Msg::FileDecoded { attempt, result });
                    });
                } else {
                    self.ignore("choose-file");
                }
            }
            Msg::StartPlayback => {
                if let CaptureState::Streaming {
                    playback: Playback::Blocked,
                } = self.state
                {
                    match self.camera.start_playback() {
                        Ok(playback) => self.state = CaptureState::Streaming { playback },
                        Err(err) => self.fail(err),
                    }
                } else {
                    self.ignore("start-playback");
                }
            }
            Msg::Capture => self.capture(),
            Msg::Apply => {
                if let CaptureState::ResultReady { value, .. } = &self.state {
                    let value = value.clone();
                    self.deliver(value);
                } else {
                    self.ignore("apply");
                }
            }
            Msg::Retry => self.retry(),
            Msg::Close => {
                log::info!("Capture closed by user in {}", self.state.name());
                self.shutdown();
            }
            Msg::CameraOpened { attempt, result } => {
                if attempt != self.attempt || self.state != CaptureState::Requesting {
                    log::debug!("Dropping stale camera open (attempt {})", attempt);
                    if let Ok(mut stream) = result {
                        stream.stop();
                    }
                    return;
                }
                self.camera_opened(result);
            }
            Msg::FileDecoded { attempt, result } => {
                if attempt != self.attempt || self.state != CaptureState::DecodingFile {
                    log::debug!("Dropping stale file decode (attempt {})", attempt);
                    return;
                }
                match result {
                    Ok(still) => self.recognize(still),
                    Err(err) => self.fail(err),
                }
            }
            Msg::Recognition { attempt, event } => {
                if attempt != self.attempt {
                    log::debug!("Dropping stale recognition event (attempt {})", attempt);
                    return;
                }
                self.recognition_event(event);
            }
        }
    }

    /// Close the modal
    pub fn close(&mut self) {
        self.update(Msg::Close);
    }

    fn ignore(&self, what: &str) {
        log::debug!("Ignoring {} in state {}", what, self.state.name());
    }

    fn next_attempt(&mut self) -> u64 {
        self.attempt += 1;
        self.attempt
    }

    fn request_camera(&mut self) {
        if !self.camera.begin_open() {
            return;
        }
        let attempt = self.next_attempt();
        self.state = CaptureState::Requesting;
        let pending = self.camera.acquire();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = pending.await;
            let _ = tx.send(Msg::CameraOpened { attempt, result });
        });
    }

    fn camera_opened(&mut self, result: Result<Box<dyn DeviceStream>>) {
        if let Err(err) = self.camera.finish_open(result) {
            self.fail(err);
            return;
        }
        let playback = match self.camera.attach_and_play() {
            Ok(playback) => playback,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        self.state = CaptureState::Streaming { playback };
        if self.mode == CaptureMode::Qr {
            let request = RecognitionRequest::Code(self.camera.surface().clone());
            self.start_recognition(request);
        }
    }

    fn capture(&mut self) {
        if self.mode != CaptureMode::Ocr || !matches!(self.state, CaptureState::Streaming { .. }) {
            self.ignore("capture");
            return;
        }
        match FrameSource::from_camera(&mut self.camera) {
            Ok(still) => self.recognize(still),
            Err(CaptureError::NotStreaming) if self.camera.is_streaming() => {
                log::warn!("Capture requested before the first frame arrived");
            }
            Err(err) => self.fail(err),
        }
    }

    /// Start OCR. The state stays `Captured` until the first progress report.
    fn recognize(&mut self, still: StillImage) {
        log::info!(
            "Recognizing {:?} image taken at {}",
            still.origin,
            still.captured_at.format("%H:%M:%S")
        );
        self.state = CaptureState::Captured;
        self.still = Some(still.clone());
        self.start_recognition(RecognitionRequest::Text(still));
    }

    fn start_recognition(&mut self, request: RecognitionRequest) {
        let attempt = self.attempt;
        let tx = self.tx.clone();
        self.recognition = Some(self.engine.start(request, move |event| {
            let _ = tx.send(Msg::Recognition { attempt, event });
        }));
    }

    fn recognition_event(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Progress(p) => {
                if self.state == CaptureState::Captured {
                    log::debug!("OCR started");
                    self.state = CaptureState::Processing { progress: p };
                } else if let CaptureState::Processing { progress } = &mut self.state
                    && p > *progress
                {
                    log::debug!("OCR progress {}%", p);
                    *progress = p;
                }
            }
            RecognitionEvent::Text(result) => {
                if !matches!(
                    self.state,
                    CaptureState::Captured | CaptureState::Processing { .. }
                ) {
                    self.ignore("ocr result");
                    return;
                }
                self.recognition = None;
                match result {
                    Ok(raw_text) => {
                        let field = self.extractor.extract(&raw_text);
                        self.state = if field.found {
                            log::info!("Extracted product name: {}", field.value);
                            CaptureState::ResultReady {
                                value: field.value,
                                raw_text,
                            }
                        } else {
                            log::info!("No product name found in OCR text");
                            CaptureState::NoMatch { raw_text }
                        };
                    }
                    Err(err) => self.fail(err),
                }
            }
            RecognitionEvent::Code(payload) => {
                if self.mode == CaptureMode::Qr
                    && matches!(self.state, CaptureState::Streaming { .. })
                {
                    log::info!("QR code decoded, delivering");
                    self.deliver(payload);
                } else {
                    self.ignore("qr code");
                }
            }
        }
    }

    fn retry(&mut self) {
        let retryable_state = matches!(
            self.state,
            CaptureState::ResultReady { .. }
                | CaptureState::NoMatch { .. }
                | CaptureState::Error { .. }
        );
        if !retryable_state {
            self.ignore("retry");
            return;
        }
        self.abandon_attempt();
        match self.mode {
            CaptureMode::Ocr => self.state = CaptureState::ChoosingSource,
            CaptureMode::Qr => {
                if let CaptureState::Error { kind } = self.state
                    && !kind.is_retryable()
                {
                    log::warn!("Not retrying {:?}, the user has to change settings first", kind);
                    return;
                }
                self.request_camera();
            }
        }
    }

    fn fail(&mut self, err: CaptureError) {
        let kind = err.kind();
        log::error!("Capture attempt failed: {}", err);
        if kind == ErrorKind::PermissionDenied {
            self.banner = Some(kind.user_message());
        }
        self.abandon_attempt();
        self.state = CaptureState::Error { kind };
    }

    /// Stop recognition, hand the value to the host (once) and close
    fn deliver(&mut self, value: String) {
        if let Some(mut recognition) = self.recognition.take() {
            recognition.cancel();
        }
        if let Some(on_value) = self.on_value.take() {
            on_value(value);
        }
        self.shutdown();
    }

    /// Stop recognition, release the camera and drop the still image
    fn abandon_attempt(&mut self) {
        if let Some(mut recognition) = self.recognition.take() {
            recognition.cancel();
        }
        self.camera.close();
        self.still = None;
        self.attempt += 1;
    }

    fn shutdown(&mut self) {
        self.abandon_attempt();
        self.on_value = None;
        self.state = CaptureState::Closed;
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if !self.state.is_closed() {
            self.shutdown();
        }
    }
}
