//! OCR (Optical Character Recognition) module using rusty-tesseract

use image::{DynamicImage, RgbaImage};
use std::collections::HashMap;

use crate::config::OcrSettings;
use crate::error::{CaptureError, Result};

/// Progress sink, called with percentages in 0..=100
pub type ProgressFn = dyn Fn(u8) + Send + Sync;

/// One-shot text recognition on a still image. Blocking.
pub trait TextRecognizer: Send + Sync {
    /// Recognize all text. An image without text yields an empty string.
    fn recognize(
        &self,
        image: &RgbaImage,
        languages: &[String],
        progress: &ProgressFn,
    ) -> Result<String>;
}

/// Tesseract language argument, e.g. "kor+eng"
pub fn language_arg(languages: &[String]) -> String {
    let joined = languages
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("+");
    if joined.is_empty() {
        "eng".to_string()
    } else {
        joined
    }
}

/// Upscale small images so text is tall enough for tesseract.
///
/// Returns the processed image and the factor applied.
pub fn prepare_for_ocr(img: &RgbaImage) -> (DynamicImage, u32) {
    let dynamic_img = DynamicImage::ImageRgba8(img.clone());
    let min_dimension = img.width().min(img.height());
    let factor = if min_dimension < 100 {
        4
    } else if min_dimension < 200 {
        2
    } else {
        1
    };
    if factor == 1 {
        return (dynamic_img, 1);
    }
    let new_width = img.width() * factor;
    let new_height = img.height() * factor;
    log::info!("Upscaling small image {}x to {}x{}", factor, new_width, new_height);
    (
        dynamic_img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3),
        factor,
    )
}

/// Text recognizer backed by the system tesseract binary
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    psm: i32,
    oem: i32,
    dpi: Option<i32>,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new(&OcrSettings::default())
    }
}

impl TesseractRecognizer {
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            psm: settings.psm,
            oem: settings.oem,
            dpi: settings.dpi,
        }
    }

    /// Languages requested but not installed for tesseract
    pub fn missing_languages(languages: &[String]) -> Vec<String> {
        match rusty_tesseract::get_tesseract_langs() {
            Ok(installed) => languages
                .iter()
                .filter(|l| !installed.contains(l))
                .cloned()
                .collect(),
            Err(e) => {
                log::warn!("Could not list tesseract languages: {}", e);
                languages.to_vec()
            }
        }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(
        &self,
        img: &RgbaImage,
        languages: &[String],
        progress: &ProgressFn,
    ) -> Result<String> {
        use rusty_tesseract::{Args, Image};

        progress(0);
        log::info!(
            "Running OCR with rusty-tesseract on {}x{} image...",
            img.width(),
            img.height()
        );

        let (processed_img, _factor) = prepare_for_ocr(img);
        let tess_img = Image::from_dynamic_image(&processed_img).map_err(|e| {
            CaptureError::RecognitionFailed(format!("Failed to create tesseract image: {}", e))
        })?;
        progress(10);

        // Higher DPI hint for small crops
        let min_dimension = img.width().min(img.height());
        let dpi = self
            .dpi
            .unwrap_or(if min_dimension < 200 { 300 } else { 150 });
        let args = Args {
            lang: language_arg(languages),
            config_variables: HashMap::new(),
            dpi: Some(dpi),
            psm: Some(self.psm),
            oem: Some(self.oem),
        };
        progress(25);

        let text = rusty_tesseract::image_to_string(&tess_img, &args)
            .map_err(|e| CaptureError::RecognitionFailed(format!("Tesseract OCR failed: {}", e)))?;
        progress(100);

        let text = text.trim().to_string();
        log::info!("OCR returned {} characters", text.chars().count());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_arg() {
        let langs = vec!["kor".to_string(), "eng".to_string()];
        assert_eq!(language_arg(&langs), "kor+eng");
        assert_eq!(language_arg(&[]), "eng");
        assert_eq!(language_arg(&[" ".to_string()]), "eng");
    }

    #[test]
    fn test_small_images_are_upscaled() {
        let (img, factor) = prepare_for_ocr(&RgbaImage::new(80, 300));
        assert_eq!(factor, 4);
        assert_eq!((img.width(), img.height()), (320, 1200));

        let (img, factor) = prepare_for_ocr(&RgbaImage::new(150, 400));
        assert_eq!(factor, 2);
        assert_eq!((img.width(), img.height()), (300, 800));

        let (img, factor) = prepare_for_ocr(&RgbaImage::new(1280, 720));
        assert_eq!(factor, 1);
        assert_eq!((img.width(), img.height()), (1280, 720));
    }
}
