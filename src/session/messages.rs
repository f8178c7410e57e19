//! Message types for the capture controller
//!
//! User intents come from the host UI; completions are posted back by the
//! background tasks the controller spawns, tagged with the attempt that
//! started them.

use std::path::PathBuf;

use crate::capture::camera::DeviceStream;
use crate::capture::engine::RecognitionEvent;
use crate::capture::image::StillImage;
use crate::error::Result;

#[derive(Debug)]
pub enum Msg {
    /// Use the live camera (label mode)
    ChooseCamera,
    /// Use an image from the gallery (label mode)
    ChooseFile(PathBuf),
    /// Manual start when the preview did not autoplay
    StartPlayback,
    /// Take the still and run OCR
    Capture,
    /// Hand the extracted value to the host
    Apply,
    /// Drop the current attempt and start over
    Retry,
    /// Close the modal
    Close,

    /// Camera request finished
    CameraOpened {
        attempt: u64,
        result: Result<Box<dyn DeviceStream>>,
    },
    /// Gallery image decoded
    FileDecoded {
        attempt: u64,
        result: Result<StillImage>,
    },
    /// Progress, result or decoded code from the recognizer
    Recognition {
        attempt: u64,
        event: RecognitionEvent,
    },
}

impl Msg {
    pub fn choose_camera() -> Self {
        Msg::ChooseCamera
    }

    pub fn choose_file(path: impl Into<PathBuf>) -> Self {
        Msg::ChooseFile(path.into())
    }

    pub fn capture() -> Self {
        Msg::Capture
    }

    pub fn apply() -> Self {
        Msg::Apply
    }

    pub fn retry() -> Self {
        Msg::Retry
    }

    pub fn close() -> Self {
        Msg::Close
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Msg::ChooseCamera => "choose-camera",
            Msg::ChooseFile(_) => "choose-file",
            Msg::StartPlayback => "start-playback",
            Msg::Capture => "capture",
            Msg::Apply => "apply",
            Msg::Retry => "retry",
            Msg::Close => "close",
            Msg::CameraOpened { .. } => "camera-opened",
            Msg::FileDecoded { .. } => "file-decoded",
            Msg::Recognition { .. } => "recognition",
        }
    }
}
