//! Capture modes requested by the host

/// What the host wants extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Read a label and extract the product name
    #[default]
    Ocr,
    /// Decode a QR code from the live preview
    Qr,
}

impl CaptureMode {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureMode::Ocr => "ocr",
            CaptureMode::Qr => "qr",
        }
    }

    /// Only label capture lets the user choose between camera and gallery
    pub fn has_source_choice(&self) -> bool {
        matches!(self, CaptureMode::Ocr)
    }
}

impl std::str::FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ocr" | "label" => Ok(CaptureMode::Ocr),
            "qr" | "code" => Ok(CaptureMode::Qr),
            other => Err(format!("unknown capture mode '{}'", other)),
        }
    }
}

/// Where a still image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    Camera,
    File,
}
