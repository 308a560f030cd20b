//! Core types for the OCR ensemble pipeline
//!
//! A run starts from one [`SourceImage`], derives an [`ImageVariant`] per
//! [`ScaleSpec`] and records one [`OcrResult`] per attempt.

use crate::error::PipelineError;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Label used for the OCR attempt on the unscaled source image
pub const ORIGINAL_LABEL: &str = "ORIGINAL";

/// Resampling filter used when enlarging an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
}

impl Interpolation {
    /// The `image` crate filter implementing this interpolation
    pub fn filter_type(self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::Bicubic => FilterType::CatmullRom,
            Interpolation::Lanczos => FilterType::Lanczos3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Interpolation::Nearest => "NEAREST",
            Interpolation::Bilinear => "BILINEAR",
            Interpolation::Bicubic => "BICUBIC",
            Interpolation::Lanczos => "LANCZOS",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpolation {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Interpolation::Nearest),
            "bilinear" => Ok(Interpolation::Bilinear),
            "bicubic" => Ok(Interpolation::Bicubic),
            "lanczos" => Ok(Interpolation::Lanczos),
            other => Err(PipelineError::InvalidScaleSpec(format!(
                "unknown interpolation '{}' (expected nearest, bilinear, bicubic or lanczos)",
                other
            ))),
        }
    }
}

/// One resampling strategy: independent horizontal/vertical magnification
/// plus the filter used to get there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScaleSpec {
    scale_x: u32,
    scale_y: u32,
    interpolation: Interpolation,
}

impl ScaleSpec {
    /// Create a spec; both factors must be at least 1
    pub fn new(
        scale_x: u32,
        scale_y: u32,
        interpolation: Interpolation,
    ) -> Result<Self, PipelineError> {
        if scale_x == 0 || scale_y == 0 {
            return Err(PipelineError::InvalidScaleSpec(format!(
                "scale factors must be >= 1, got {}x{}",
                scale_x, scale_y
            )));
        }
        Ok(Self::fixed(scale_x, scale_y, interpolation))
    }

    /// Unchecked constructor for the built-in catalog
    pub(crate) const fn fixed(scale_x: u32, scale_y: u32, interpolation: Interpolation) -> Self {
        Self {
            scale_x,
            scale_y,
            interpolation,
        }
    }

    pub fn scale_x(&self) -> u32 {
        self.scale_x
    }

    pub fn scale_y(&self) -> u32 {
        self.scale_y
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// A 1x1 spec reproduces the original and only adds a duplicate OCR pass
    pub fn is_identity(&self) -> bool {
        self.scale_x == 1 && self.scale_y == 1
    }

    /// Deterministic label, e.g. `2_2_BICUBIC`
    pub fn label(&self) -> String {
        format!("{}_{}_{}", self.scale_x, self.scale_y, self.interpolation)
    }

    /// Target size for a source of `width` x `height`, `None` on overflow
    pub fn target_dimensions(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        Some((
            width.checked_mul(self.scale_x)?,
            height.checked_mul(self.scale_y)?,
        ))
    }
}

impl fmt::Display for ScaleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Parses `<sx>x<sy>:<filter>`, e.g. `3x2:bilinear`
impl FromStr for ScaleSpec {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            PipelineError::InvalidScaleSpec(format!(
                "'{}' is not of the form <sx>x<sy>:<filter>",
                s
            ))
        };

        let (factors, filter) = s.split_once(':').ok_or_else(invalid)?;
        let (sx, sy) = factors
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let scale_x = sx.trim().parse::<u32>().map_err(|_| invalid())?;
        let scale_y = sy.trim().parse::<u32>().map_err(|_| invalid())?;

        ScaleSpec::new(scale_x, scale_y, filter.parse()?)
    }
}

/// The decoded input bitmap, shared read-only for the duration of a run
#[derive(Debug, Clone)]
pub struct SourceImage {
    name: String,
    image: Arc<DynamicImage>,
}

impl SourceImage {
    /// Wrap a decoded image; `name` is the base name used for artifacts
    pub fn new(name: impl Into<String>, image: DynamicImage) -> Result<Self, PipelineError> {
        let name = name.into();
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::UnsupportedFormat(format!(
                "{} has zero size ({}x{})",
                name,
                image.width(),
                image.height()
            )));
        }
        // PNG, which the engine and the artifact store write, has no float color types
        let image = match image {
            DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb8(image.to_rgb8()),
            DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba8(image.to_rgba8()),
            other => other,
        };
        Ok(Self {
            name,
            image: Arc::new(image),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Shared handle to the raster, for handing to concurrent OCR tasks
    pub fn shared_image(&self) -> Arc<DynamicImage> {
        Arc::clone(&self.image)
    }
}

/// A resampled copy of a source image
#[derive(Debug)]
pub struct ImageVariant<'a> {
    pub source: &'a SourceImage,
    pub spec: ScaleSpec,
    pub label: String,
    pub image: DynamicImage,
}

impl ImageVariant<'_> {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Which stage an ensemble entry failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Resample,
    OcrEngine,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Resample => f.write_str("resample"),
            FailureKind::OcrEngine => f.write_str("ocr engine"),
        }
    }
}

/// Outcome of one OCR attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OcrOutcome {
    /// Text recognized by the engine (may be empty)
    Recognized { text: String },
    /// Failure marker for this entry
    Failed { kind: FailureKind, message: String },
}

impl OcrOutcome {
    /// Failure marker for a per-entry error
    pub fn from_error(err: &PipelineError) -> Self {
        let kind = match err {
            PipelineError::ResampleFailure { .. } => FailureKind::Resample,
            _ => FailureKind::OcrEngine,
        };
        OcrOutcome::Failed {
            kind,
            message: err.to_string(),
        }
    }
}

/// One entry of an ensemble report
#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    /// `ORIGINAL` or the variant label
    pub label: String,
    /// Spec that produced the image, `None` for the original
    pub spec: Option<ScaleSpec>,
    /// Size of the image handed to OCR, `None` when no image was produced
    pub dimensions: Option<(u32, u32)>,
    /// Where the image was persisted, if an artifact sink wrote it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    pub outcome: OcrOutcome,
}

impl OcrResult {
    /// Recognized text, `None` for failure markers
    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            OcrOutcome::Recognized { text } => Some(text),
            OcrOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, OcrOutcome::Failed { .. })
    }
}

/// Summary of the source image a report was produced from
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// SHA-256 of the raw pixel data
    pub content_hash: String,
}

/// The ordered results of one ensemble run, ORIGINAL first
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleReport {
    pub run_id: Uuid,
    pub source: SourceSummary,
    pub results: Vec<OcrResult>,
}

impl EnsembleReport {
    pub fn labels(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.label.as_str()).collect()
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }
}
