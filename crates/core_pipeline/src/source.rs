//! Image sources
//!
//! Where the source bitmap comes from: the system clipboard or a file on
//! disk. A source either yields a decoded [`SourceImage`] or fails with one
//! of the two fatal errors, before any OCR is attempted.

use crate::error::PipelineError;
use crate::types::SourceImage;
use image::{DynamicImage, RgbaImage};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::debug;

/// Base name used for clipboard images when persisting artifacts
pub const CLIPBOARD_SOURCE_NAME: &str = "image_from_clipboard";

/// Supplies the source image for an ensemble run
pub trait ImageSource {
    /// Human readable description for logs
    fn describe(&self) -> String;

    /// Obtain and decode the image
    fn acquire(&self) -> Result<SourceImage, PipelineError>;
}

/// Reads the current image from the system clipboard
#[derive(Debug, Default)]
pub struct ClipboardSource;

impl ClipboardSource {
    pub fn new() -> Self {
        Self
    }
}

impl ImageSource for ClipboardSource {
    fn describe(&self) -> String {
        "clipboard".to_string()
    }

    fn acquire(&self) -> Result<SourceImage, PipelineError> {
        let mut clipboard = arboard::Clipboard::new().map_err(|e| {
            PipelineError::NoImageAvailable(format!("can't open clipboard: {}", e))
        })?;

        let data = clipboard.get_image().map_err(|e| match e {
            arboard::Error::ContentNotAvailable => PipelineError::NoImageAvailable(
                "couldn't find image data in clipboard".to_string(),
            ),
            arboard::Error::ConversionFailure => {
                PipelineError::UnsupportedFormat(format!("clipboard image: {}", e))
            }
            other => PipelineError::NoImageAvailable(format!("clipboard read failed: {}", other)),
        })?;

        debug!(
            width = data.width,
            height = data.height,
            bytes = data.bytes.len(),
            "Read image from clipboard"
        );

        let image = rgba_from_raw(data.width, data.height, data.bytes.into_owned())?;
        SourceImage::new(CLIPBOARD_SOURCE_NAME, DynamicImage::ImageRgba8(image))
    }
}

/// Build an RGBA raster from a clipboard buffer
fn rgba_from_raw(width: usize, height: usize, bytes: Vec<u8>) -> Result<RgbaImage, PipelineError> {
    let (w, h) = match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(PipelineError::UnsupportedFormat(format!(
                "clipboard image too large: {}x{}",
                width, height
            )))
        }
    };
    let len = bytes.len();
    RgbaImage::from_raw(w, h, bytes).ok_or_else(|| {
        PipelineError::UnsupportedFormat(format!(
            "clipboard buffer of {} bytes does not match {}x{} RGBA",
            len, w, h
        ))
    })
}

/// Decodes an image file (PNG, BMP, JPEG, ...)
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Artifact base name: the file name without its extension
    fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string())
    }
}

impl ImageSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn acquire(&self) -> Result<SourceImage, PipelineError> {
        if !self.path.is_file() {
            return Err(PipelineError::NoImageAvailable(format!(
                "{} does not exist or is not a file",
                self.path.display()
            )));
        }

        let image = image::open(&self.path).map_err(|e| {
            PipelineError::UnsupportedFormat(format!("{}: {}", self.path.display(), e))
        })?;

        debug!(
            path = %self.path.display(),
            width = image.width(),
            height = image.height(),
            "Decoded image file"
        );

        SourceImage::new(self.base_name(), image)
    }
}

/// Compute SHA-256 hash of an image's raw pixel data
///
/// Returns a 64-character hexadecimal string, used to tell apart reports of
/// different clipboard captures.
pub fn compute_image_hash(image: &DynamicImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.as_bytes());
    format!("{:x}", hasher.finalize())
}
