//! Recognition engine
//!
//! Puts one-shot OCR on a still image and continuous QR scanning of a live
//! surface behind a single start call. Callers only care which
//! [`RecognitionRequest`] variant they started.

use std::sync::Arc;
use std::sync::atomic::{AtomicI16, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::capture::camera::DisplaySurface;
use crate::capture::image::StillImage;
use crate::capture::ocr::{TesseractRecognizer, TextRecognizer};
use crate::capture::qr::{CodeDecoder, CodeSubscription, RqrrDecoder};
use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};

/// What to recognize
#[derive(Debug)]
pub enum RecognitionRequest {
    /// OCR on a single still image
    Text(StillImage),
    /// QR scan of a live preview
    Code(DisplaySurface),
}

/// Reported by a running recognition
#[derive(Debug)]
pub enum RecognitionEvent {
    /// OCR progress, never decreasing within one run
    Progress(u8),
    /// OCR finished
    Text(Result<String>),
    /// A QR payload was decoded
    Code(String),
}

/// Handle to a running recognition
#[derive(Debug)]
pub enum Recognition {
    Text(JoinHandle<()>),
    Code(CodeSubscription),
}

impl Recognition {
    /// Stop scanning, or abandon an OCR run. A blocking OCR call already in
    /// progress finishes in the background and its result is dropped.
    pub fn cancel(&mut self) {
        match self {
            Recognition::Text(task) => task.abort(),
            Recognition::Code(subscription) => subscription.stop(),
        }
    }
}

impl Drop for Recognition {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Clone)]
pub struct RecognitionEngine {
    text: Arc<dyn TextRecognizer>,
    code: Arc<dyn CodeDecoder>,
    languages: Vec<String>,
    scan_interval: Duration,
}

impl std::fmt::Debug for RecognitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionEngine")
            .field("languages", &self.languages)
            .field("scan_interval", &self.scan_interval)
            .finish_non_exhaustive()
    }
}

impl RecognitionEngine {
    pub fn new(text: Arc<dyn TextRecognizer>, code: Arc<dyn CodeDecoder>) -> Self {
        Self {
            text,
            code,
            languages: vec!["kor".to_string(), "eng".to_string()],
            scan_interval: Duration::from_millis(200),
        }
    }

    /// Tesseract and rqrr, configured from settings
    pub fn from_config(config: &CaptureConfig) -> Self {
        let missing = TesseractRecognizer::missing_languages(&config.ocr.languages);
        if !missing.is_empty() {
            log::warn!("Tesseract language data not installed: {:?}", missing);
        }
        Self::new(
            Arc::new(TesseractRecognizer::new(&config.ocr)),
            Arc::new(RqrrDecoder::new(&config.qr)),
        )
        .with_languages(config.ocr.languages.clone())
        .with_scan_interval(Duration::from_millis(config.qr.scan_interval_ms))
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Run OCR on a still image off the executor
    pub async fn recognize_text<P>(&self, image: StillImage, progress: P) -> Result<String>
    where
        P: Fn(u8) + Send + Sync + 'static,
    {
        let recognizer = self.text.clone();
        let languages = self.languages.clone();
        let progress = monotonic(progress);
        tokio::task::spawn_blocking(move || {
            recognizer.recognize(&image.rgba, &languages, &progress)
        })
        .await
        .unwrap_or_else(|e| {
            Err(CaptureError::RecognitionFailed(format!(
                "OCR task panicked: {}",
                e
            )))
        })
    }

    /// Scan a live surface until the returned subscription is stopped
    pub fn recognize_code<F>(&self, surface: DisplaySurface, on_decoded: F) -> CodeSubscription
    where
        F: Fn(String) + Send + 'static,
    {
        CodeSubscription::start(surface, self.code.clone(), self.scan_interval, on_decoded)
    }

    /// Start either kind of recognition, reporting through `on_event`.
    ///
    /// Spawns onto the current Tokio runtime and panics outside one.
    pub fn start<F>(&self, request: RecognitionRequest, on_event: F) -> Recognition
    where
        F: Fn(RecognitionEvent) + Send + Sync + 'static,
    {
        let on_event = Arc::new(on_event);
        match request {
            RecognitionRequest::Text(image) => {
                let engine = self.clone();
                let task = tokio::spawn(async move {
                    let progress_sink = on_event.clone();
                    let result = engine
                        .recognize_text(image, move |p| {
                            (*progress_sink)(RecognitionEvent::Progress(p))
                        })
                        .await;
                    (*on_event)(RecognitionEvent::Text(result));
                });
                Recognition::Text(task)
            }
            RecognitionRequest::Code(surface) => {
                Recognition::Code(self.recognize_code(surface, move |payload| {
                    (*on_event)(RecognitionEvent::Code(payload))
                }))
            }
        }
    }
}

/// Clamp to 100 and drop any report lower than one already made
fn monotonic<P>(progress: P) -> impl Fn(u8) + Send + Sync + 'static
where
    P: Fn(u8) + Send + Sync + 'static,
{
    let last = AtomicI16::new(-1);
    move |p| {
        let p = p.min(100);
        let prev = last.fetch_max(i16::from(p), Ordering::SeqCst);
        if i16::from(p) > prev {
            progress(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::{FakeCode, FakeText};
    use crate::domain::ImageOrigin;
    use image::RgbaImage;
    use std::sync::Mutex;

    fn engine(text: FakeText) -> RecognitionEngine {
        RecognitionEngine::new(
            Arc::new(text),
            Arc::new(FakeCode {
                payload: "FUR-0042".to_string(),
            }),
        )
    }

    fn still() -> StillImage {
        StillImage::new(RgbaImage::new(8, 8), ImageOrigin::File)
    }

    #[test]
    fn test_monotonic_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let report = monotonic(move |p| sink.lock().unwrap().push(p));
        for p in [0, 10, 5, 10, 60, 250, 99] {
            report(p);
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 10, 60, 100]);
    }

    #[tokio::test]
    async fn test_recognize_text() {
        let engine = engine(FakeText::ok("상품명: 책상"));
        let text = engine.recognize_text(still(), |_| {}).await.unwrap();
        assert_eq!(text, "상품명: 책상");
    }

    #[tokio::test]
    async fn test_recognize_text_failure() {
        let engine = engine(FakeText::failing("tesseract not found"));
        let err = engine.recognize_text(still(), |_| {}).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RecognitionFailed);
    }

    #[tokio::test]
    async fn test_start_text_reports_progress_then_result() {
        let engine = engine(FakeText::ok(""));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _recognition = engine.start(RecognitionRequest::Text(still()), move |event| {
            let _ = tx.send(event);
        });

        let mut progress = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                RecognitionEvent::Progress(p) => progress.push(p),
                RecognitionEvent::Text(result) => {
                    assert_eq!(result.unwrap(), "");
                    break;
                }
                RecognitionEvent::Code(_) => panic!("unexpected code event"),
            }
        }
        assert_eq!(progress, vec![30, 70]);
    }
}
