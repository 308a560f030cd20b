//! Core pipeline for clipocr
//!
//! Runs an external OCR engine over one source image and over several
//! rescaled variants of it, and reports every attempt's text. OCR accuracy
//! on screen captures depends heavily on pixel scale and resampling filter,
//! so instead of guessing one setting the pipeline tries a fixed catalog of
//! them and lets the reader compare.

pub mod artifacts;
pub mod catalog;
pub mod ensemble;
pub mod error;
pub mod ocr;
pub mod report;
pub mod source;
pub mod types;
pub mod variants;

pub use artifacts::{ArtifactSink, FsArtifactStore, NoopSink};
pub use catalog::ScaleCatalog;
pub use ensemble::{EnsembleConfig, EnsembleRunner};
pub use error::PipelineError;
pub use ocr::{OcrEngine, TesseractCli, TesseractConfig};
pub use report::{ReportFormat, Reporter};
pub use source::{ClipboardSource, FileSource, ImageSource};
pub use types::*;
pub use variants::{generate_variant, generate_variants};
