//! Capture flow state

use crate::error::ErrorKind;

/// Whether the live preview is actually playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Playback {
    #[default]
    Playing,
    /// Playback did not start on its own; the user has to press "start"
    Blocked,
}

/// Work currently in flight, each shown with its own indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Waiting for the device (and possibly a permission prompt)
    AcquiringCamera,
    /// Stream is open, waiting for the first frame to land on the surface
    WaitingForFrame,
    /// Reading and decoding a gallery image
    DecodingFile,
    /// OCR running, with advisory progress
    Recognizing(u8),
    /// QR scanner watching the live preview
    Scanning,
}

/// State of one capture modal
///
/// Each variant carries only the data valid in that state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// Not opened yet
    #[default]
    Idle,
    /// Label mode: user picks camera or gallery
    ChoosingSource,
    /// Camera stream requested
    Requesting,
    /// Live preview open
    Streaming { playback: Playback },
    /// Gallery image being read and decoded
    DecodingFile,
    /// Still image taken and handed to OCR, no progress reported yet
    Captured,
    /// OCR running
    Processing { progress: u8 },
    /// A product name was found, waiting for the user to apply it
    ResultReady { value: String, raw_text: String },
    /// No product name found, raw text shown for manual reading
    NoMatch { raw_text: String },
    /// The current attempt failed
    Error { kind: ErrorKind },
    /// Modal closed, nothing more will happen
    Closed,
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::ChoosingSource => "choosing-source",
            CaptureState::Requesting => "requesting",
            CaptureState::Streaming { .. } => "streaming",
            CaptureState::DecodingFile => "decoding-file",
            CaptureState::Captured => "captured",
            CaptureState::Processing { .. } => "processing",
            CaptureState::ResultReady { .. } => "result-ready",
            CaptureState::NoMatch { .. } => "no-match",
            CaptureState::Error { .. } => "error",
            CaptureState::Closed => "closed",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, CaptureState::Closed)
    }

    /// Raw OCR text to show, if any
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            CaptureState::ResultReady { raw_text, .. } | CaptureState::NoMatch { raw_text } => {
                Some(raw_text)
            }
            _ => None,
        }
    }

    /// Error message to show inline, if any
    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            CaptureState::Error { kind } => Some(kind.user_message()),
            _ => None,
        }
    }
}
