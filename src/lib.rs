//! Label and QR capture with product-name extraction
//!
//! The host opens a [`CaptureController`] in label (OCR) or code (QR) mode and
//! gets called back at most once with the extracted value.

pub mod capture;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod session;

pub use capture::camera::{CameraBackend, CameraSession, DeviceStream, DisplaySurface};
pub use capture::engine::{Recognition, RecognitionEngine, RecognitionEvent, RecognitionRequest};
pub use capture::image::StillImage;
pub use capture::source::FrameSource;
pub use config::CaptureConfig;
pub use domain::{Activity, CaptureMode, CaptureState, ImageOrigin, Playback};
pub use error::{CaptureError, ErrorKind};
pub use extract::{ExtractedField, FieldExtractor};
pub use session::{CaptureController, Msg};
