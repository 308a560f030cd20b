//! Error types for the OCR ensemble pipeline
//!
//! Two kinds abort a run before any OCR happens (`NoImageAvailable`,
//! `UnsupportedFormat`). Resampling and OCR failures are scoped to a single
//! ensemble entry and end up in the report as failure markers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the pipeline and its collaborators
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No source image could be obtained (empty clipboard, missing file)
    #[error("no image available: {0}")]
    NoImageAvailable(String),

    /// The source image could not be decoded or is unusable
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// One scale spec could not be applied to the source
    #[error("resampling failed for {label}: {reason}")]
    ResampleFailure { label: String, reason: String },

    /// The OCR engine could not produce text for one image
    #[error("OCR engine failed for {label}: {reason}")]
    OcrEngineFailure { label: String, reason: String },

    /// A scale spec or catalog definition is invalid
    #[error("invalid scale spec: {0}")]
    InvalidScaleSpec(String),

    /// A configuration value could not be parsed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Writing an artifact to disk failed
    #[error("failed to write artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// True for errors that abort the whole ensemble run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::NoImageAvailable(_) | PipelineError::UnsupportedFormat(_)
        )
    }

    pub(crate) fn ocr(label: &str, reason: impl Into<String>) -> Self {
        PipelineError::OcrEngineFailure {
            label: label.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(PipelineError::NoImageAvailable("empty".into()).is_fatal());
        assert!(PipelineError::UnsupportedFormat("bad".into()).is_fatal());
        assert!(!PipelineError::ocr("ORIGINAL", "exit 1").is_fatal());
        assert!(!PipelineError::ResampleFailure {
            label: "2_2_BICUBIC".into(),
            reason: "overflow".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_ocr_failure_message_names_label() {
        let err = PipelineError::ocr("3_3_BILINEAR", "timed out after 5s");
        let msg = err.to_string();
        assert!(msg.contains("3_3_BILINEAR"));
        assert!(msg.contains("timed out"));
    }
}
