//! OCR module
//!
//! Defines the contract every OCR engine satisfies and the default engine,
//! which drives the `tesseract` command line utility as a subprocess.

use crate::error::PipelineError;
use async_trait::async_trait;
use image::DynamicImage;
use std::io::Write;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Recognizes text in a single image
///
/// One call is one attempt: implementations do not retry. Every failure is
/// reported as [`PipelineError::OcrEngineFailure`] carrying `label`.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &str;

    /// Extract text from `image`; the result may be empty
    async fn recognize(&self, label: &str, image: &DynamicImage) -> Result<String, PipelineError>;
}

/// Configuration for the Tesseract subprocess
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Executable to run (default: `tesseract` from PATH)
    pub program: String,
    /// Language passed with `-l` (default: eng)
    pub language: String,
    /// Page segmentation mode, engine default when unset
    pub psm: Option<u8>,
    /// Resolution hint, engine default when unset
    pub dpi: Option<u32>,
    /// Per-invocation timeout
    pub timeout: Duration,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            program: "tesseract".to_string(),
            language: "eng".to_string(),
            psm: None,
            dpi: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl TesseractConfig {
    /// Defaults overridden by `CLIPOCR_TESSERACT`, `CLIPOCR_LANG`,
    /// `CLIPOCR_PSM`, `CLIPOCR_DPI` and `CLIPOCR_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(env_value)
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mut config = Self::default();

        if let Some(program) = setting::<String>(&lookup, "CLIPOCR_TESSERACT")? {
            config.program = program;
        }
        if let Some(language) = setting::<String>(&lookup, "CLIPOCR_LANG")? {
            config.language = language;
        }
        if let Some(psm) = setting::<u8>(&lookup, "CLIPOCR_PSM")? {
            config.psm = Some(psm);
        }
        if let Some(dpi) = setting::<u32>(&lookup, "CLIPOCR_DPI")? {
            config.dpi = Some(dpi);
        }
        if let Some(secs) = setting::<u64>(&lookup, "CLIPOCR_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(PipelineError::InvalidConfig(
                    "CLIPOCR_TIMEOUT_SECS must be at least 1".to_string(),
                ));
            }
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Raw value of an environment variable, if set and valid Unicode
pub(crate) fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Look up and parse one setting; unset or blank yields `None`
pub(crate) fn setting<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, PipelineError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PipelineError::InvalidConfig(format!("{}={} is not valid", key, raw))),
        _ => Ok(None),
    }
}

/// OCR engine backed by the `tesseract` executable
///
/// Each call writes the image to a temporary PNG, runs
/// `tesseract <png> stdout -l <lang>` and returns its standard output.
pub struct TesseractCli {
    config: TesseractConfig,
}

impl TesseractCli {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    fn command(&self, image_path: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language);
        if let Some(psm) = self.config.psm {
            cmd.arg("--psm").arg(psm.to_string());
        }
        if let Some(dpi) = self.config.dpi {
            cmd.arg("--dpi").arg(dpi.to_string());
        }
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new(TesseractConfig::default())
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, label: &str, image: &DynamicImage) -> Result<String, PipelineError> {
        // The engine reads images from disk
        let mut png = tempfile::Builder::new()
            .prefix("clipocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| PipelineError::ocr(label, format!("failed to create temp file: {}", e)))?;
        image
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| PipelineError::ocr(label, format!("failed to encode PNG: {}", e)))?;
        png.flush()
            .map_err(|e| PipelineError::ocr(label, format!("failed to write temp image: {}", e)))?;

        debug!(
            label,
            program = %self.config.program,
            path = %png.path().display(),
            "Running OCR engine"
        );

        let mut command = self.command(png.path());
        let output = match tokio::time::timeout(self.config.timeout, command.output()).await {
            Err(_) => {
                return Err(PipelineError::ocr(
                    label,
                    format!("timed out after {}s", self.config.timeout.as_secs_f32()),
                ))
            }
            Ok(Err(e)) => {
                return Err(PipelineError::ocr(
                    label,
                    format!(
                        "failed to run {} (is it installed?): {}",
                        self.config.program, e
                    ),
                ))
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::ocr(
                label,
                format!(
                    "{} exited with {}: {}",
                    self.config.program,
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| PipelineError::ocr(label, format!("unreadable output: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceImage;
    use image::{ImageBuffer, Luma, Rgb};
    use std::collections::HashMap;

    fn blank(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_pixel(100, 100, Luma([value])))
    }

    #[cfg(unix)]
    fn fake_engine(dir: &tempfile::TempDir, script: &str, timeout: Duration) -> TesseractCli {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        TesseractCli::new(TesseractConfig {
            program: path.to_string_lossy().into_owned(),
            timeout,
            ..TesseractConfig::default()
        })
    }

    #[test]
    fn test_tesseract_config_default() {
        let config = TesseractConfig::default();
        assert_eq!(config.program, "tesseract");
        assert_eq!(config.language, "eng");
        assert_eq!(config.psm, None);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_value_reads_environment() {
        assert!(env_value("CLIPOCR_TEST_SURELY_UNSET_VARIABLE").is_none());

        std::env::set_var("CLIPOCR_TEST_ENV_VALUE_SET", " 42 ");
        let lookup = env_value;
        let value: Option<u32> = setting(&lookup, "CLIPOCR_TEST_ENV_VALUE_SET").unwrap();
        assert_eq!(value, Some(42));
        std::env::remove_var("CLIPOCR_TEST_ENV_VALUE_SET");
    }

    #[test]
    fn test_config_unset_or_blank_keeps_defaults() {
        let config = TesseractConfig::from_lookup(vars(&[("CLIPOCR_PSM", "  ")])).unwrap();
        assert_eq!(config.program, "tesseract");
        assert_eq!(config.psm, None);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_config_variables_override_defaults() {
        let config = TesseractConfig::from_lookup(vars(&[
            ("CLIPOCR_TESSERACT", "/opt/tesseract/bin/tesseract"),
            ("CLIPOCR_LANG", "jpn"),
            ("CLIPOCR_PSM", "6"),
            ("CLIPOCR_DPI", "300"),
            ("CLIPOCR_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();

        assert_eq!(config.program, "/opt/tesseract/bin/tesseract");
        assert_eq!(config.language, "jpn");
        assert_eq!(config.psm, Some(6));
        assert_eq!(config.dpi, Some(300));
        assert_eq!(config.timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_config_rejects_unparsable_numbers() {
        for (key, raw) in [
            ("CLIPOCR_PSM", "six"),
            ("CLIPOCR_PSM", "300"),
            ("CLIPOCR_DPI", "-1"),
            ("CLIPOCR_TIMEOUT_SECS", "1m"),
        ] {
            let err = TesseractConfig::from_lookup(vars(&[(key, raw)])).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidConfig(_)), "{key}={raw}");
            assert!(err.to_string().contains(key));
        }
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let err =
            TesseractConfig::from_lookup(vars(&[("CLIPOCR_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_engine_failure() {
        let engine = TesseractCli::new(TesseractConfig {
            program: "/nonexistent/clipocr-tesseract".to_string(),
            ..TesseractConfig::default()
        });

        let err = engine.recognize("ORIGINAL", &blank(255)).await.unwrap_err();
        match err {
            PipelineError::OcrEngineFailure { label, reason } => {
                assert_eq!(label, "ORIGINAL");
                assert!(reason.contains("clipocr-tesseract"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(
            &dir,
            r#"test -s "$1" && test "$2" = stdout && echo "HELLO $4""#,
            Duration::from_secs(10),
        );

        let text = engine.recognize("2_2_BICUBIC", &blank(0)).await.unwrap();
        assert_eq!(text, "HELLO eng\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_float_source_can_be_recognized() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(&dir, r#"test -s "$1" && echo OK"#, Duration::from_secs(10));
        let hdr = ImageBuffer::from_pixel(10, 10, Rgb([0.5f32, 0.5, 0.5]));
        let source = SourceImage::new("hdr", DynamicImage::ImageRgb32F(hdr)).unwrap();

        let text = engine.recognize("ORIGINAL", source.image()).await.unwrap();
        assert_eq!(text, "OK\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_output_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(&dir, "exit 0", Duration::from_secs(10));

        let text = engine.recognize("ORIGINAL", &blank(0)).await.unwrap();
        assert!(text.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(
            &dir,
            "echo 'Error opening data file' >&2; exit 1",
            Duration::from_secs(10),
        );

        let err = engine.recognize("3_3_BILINEAR", &blank(0)).await.unwrap_err();
        assert!(!err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("3_3_BILINEAR"));
        assert!(msg.contains("Error opening data file"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(&dir, "sleep 10", Duration::from_millis(300));

        let err = engine.recognize("ORIGINAL", &blank(0)).await.unwrap_err();
        assert!(matches!(err, PipelineError::OcrEngineFailure { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    // Requires a local Tesseract installation
    // Run with: cargo test -p core_pipeline test_tesseract_blank_image -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_tesseract_blank_image() {
        let engine = TesseractCli::default();
        let text = engine.recognize("ORIGINAL", &blank(255)).await.unwrap();
        assert!(text.trim().is_empty());
    }
}
