//! Artifact persistence
//!
//! Optional side output of a run: the images handed to OCR and the text
//! recognized in each. Files are named `<source>__<label>.<ext>`.

use crate::error::PipelineError;
use image::DynamicImage;
use std::path::PathBuf;
use tracing::debug;

/// Receives intermediate images and recognized texts
pub trait ArtifactSink: Send + Sync {
    /// Store the image attempted for `label`; returns where it went
    fn persist_image(
        &self,
        source_name: &str,
        label: &str,
        image: &DynamicImage,
    ) -> Result<Option<PathBuf>, PipelineError>;

    /// Store the text recognized for `label`
    fn persist_text(
        &self,
        source_name: &str,
        label: &str,
        text: &str,
    ) -> Result<Option<PathBuf>, PipelineError>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ArtifactSink for NoopSink {
    fn persist_image(
        &self,
        _source_name: &str,
        _label: &str,
        _image: &DynamicImage,
    ) -> Result<Option<PathBuf>, PipelineError> {
        Ok(None)
    }

    fn persist_text(
        &self,
        _source_name: &str,
        _label: &str,
        _text: &str,
    ) -> Result<Option<PathBuf>, PipelineError> {
        Ok(None)
    }
}

/// File name for an artifact, e.g. `capture__2_2_BICUBIC.png`
pub fn artifact_file_name(source_name: &str, label: &str, extension: &str) -> String {
    format!("{}__{}.{}", source_name, label, extension)
}

/// Writes PNG images and UTF-8 text files into a directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    /// Use `dir` for artifacts, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| PipelineError::Artifact {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, source_name: &str, label: &str, extension: &str) -> PathBuf {
        self.dir
            .join(artifact_file_name(source_name, label, extension))
    }
}

impl ArtifactSink for FsArtifactStore {
    fn persist_image(
        &self,
        source_name: &str,
        label: &str,
        image: &DynamicImage,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let path = self.path_for(source_name, label, "png");
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| PipelineError::Artifact {
                path: path.clone(),
                source: std::io::Error::other(e),
            })?;
        debug!(path = %path.display(), "Saved image artifact");
        Ok(Some(path))
    }

    fn persist_text(
        &self,
        source_name: &str,
        label: &str,
        text: &str,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let path = self.path_for(source_name, label, "txt");
        std::fs::write(&path, text).map_err(|source| PipelineError::Artifact {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Saved text artifact");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    #[test]
    fn test_artifact_file_name() {
        assert_eq!(
            artifact_file_name("image_from_clipboard", "3_2_BILINEAR", "png"),
            "image_from_clipboard__3_2_BILINEAR.png"
        );
    }

    #[test]
    fn test_fs_store_writes_image_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("out")).unwrap();
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(4, 3, Luma([10u8])));

        let image_path = store
            .persist_image("capture", "2_2_BICUBIC", &img)
            .unwrap()
            .unwrap();
        assert_eq!(
            image_path.file_name().unwrap().to_str().unwrap(),
            "capture__2_2_BICUBIC.png"
        );
        let reloaded = image::open(&image_path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (4, 3));

        let text_path = store
            .persist_text("capture", "ORIGINAL", "hello\n")
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read_to_string(text_path).unwrap(), "hello\n");
    }

    #[test]
    fn test_noop_sink_writes_nothing() {
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(1, 1, Luma([0u8])));
        assert!(NoopSink.persist_image("a", "b", &img).unwrap().is_none());
        assert!(NoopSink.persist_text("a", "b", "c").unwrap().is_none());
    }
}
