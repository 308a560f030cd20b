//! Ensemble runner
//!
//! Runs the OCR engine on the unmodified source image and on every variant
//! of the catalog, then assembles the labeled results in catalog order with
//! the original first.
//!
//! Entries run concurrently, bounded by `max_concurrency`. Each entry holds
//! its permit from rasterization to recognition, so at most that many
//! variant images exist at once; resampling runs on the blocking pool.
//! Tasks are spawned in catalog order and awaited in catalog order, so the
//! report order never depends on which engine call finishes first. A
//! failing entry becomes a failure marker; only a missing or undecodable
//! source image aborts the run.

use crate::artifacts::{ArtifactSink, NoopSink};
use crate::catalog::ScaleCatalog;
use crate::error::PipelineError;
use crate::ocr::{env_value, setting, OcrEngine};
use crate::source::{compute_image_hash, ImageSource};
use crate::types::{
    EnsembleReport, OcrOutcome, OcrResult, ScaleSpec, SourceImage, SourceSummary, ORIGINAL_LABEL,
};
use crate::variants::generate_variant;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Configuration for an ensemble run
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    /// Scale specs to try, in report order
    pub catalog: ScaleCatalog,
    /// Maximum number of OCR calls in flight (1 = strictly sequential)
    pub max_concurrency: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            catalog: ScaleCatalog::default(),
            max_concurrency: default_concurrency(),
        }
    }
}

impl EnsembleConfig {
    /// Defaults overridden by `CLIPOCR_JOBS`
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(env_value)
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mut config = Self::default();
        if let Some(jobs) = setting::<usize>(&lookup, "CLIPOCR_JOBS")? {
            if jobs == 0 {
                return Err(PipelineError::InvalidConfig(
                    "CLIPOCR_JOBS must be at least 1".to_string(),
                ));
            }
            config.max_concurrency = jobs;
        }
        Ok(config)
    }
}

/// One worker per available CPU core
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// What one scheduled entry produced
struct Attempt {
    dimensions: Option<(u32, u32)>,
    artifact: Option<PathBuf>,
    text: Result<String, PipelineError>,
}

impl Attempt {
    fn failed(err: PipelineError) -> Self {
        Self {
            dimensions: None,
            artifact: None,
            text: Err(err),
        }
    }
}

/// An ensemble entry between scheduling and collection
struct Entry {
    label: String,
    spec: Option<ScaleSpec>,
    task: JoinHandle<Attempt>,
}

/// Drives one OCR engine over a source image and its variants
pub struct EnsembleRunner {
    engine: Arc<dyn OcrEngine>,
    sink: Arc<dyn ArtifactSink>,
    config: EnsembleConfig,
}

impl EnsembleRunner {
    /// Create a runner that persists nothing
    pub fn new(engine: Arc<dyn OcrEngine>, config: EnsembleConfig) -> Self {
        Self {
            engine,
            sink: Arc::new(NoopSink),
            config,
        }
    }

    /// Persist attempted images and recognized texts through `sink`
    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Acquire the source image, then run the ensemble on it
    ///
    /// Fails without invoking OCR if the source yields no usable image.
    pub async fn run_from(&self, source: &dyn ImageSource) -> Result<EnsembleReport, PipelineError> {
        let image = source.acquire().map_err(|e| {
            warn!(source = %source.describe(), error = %e, "No source image");
            e
        })?;
        Ok(self.run(&image).await)
    }

    /// Run OCR on `source` and on each catalog variant
    ///
    /// Always returns `catalog.len() + 1` results: `ORIGINAL`, then one per
    /// catalog entry in catalog order.
    pub async fn run(&self, source: &SourceImage) -> EnsembleReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("ensemble", %run_id, source = source.name());
        self.run_inner(run_id, source).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, source: &SourceImage) -> EnsembleReport {
        let catalog = &self.config.catalog;
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        info!(
            width = source.width(),
            height = source.height(),
            variants = catalog.len(),
            engine = self.engine.name(),
            max_concurrency = self.config.max_concurrency,
            "Starting OCR ensemble"
        );

        let mut entries = Vec::with_capacity(catalog.len() + 1);
        // The original always goes first
        entries.push(self.spawn_entry(&semaphore, source, None).await);
        for spec in catalog {
            entries.push(self.spawn_entry(&semaphore, source, Some(*spec)).await);
        }

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            results.push(self.collect(source.name(), entry).await);
        }

        let failures = results.iter().filter(|r| r.is_failure()).count();
        info!(attempts = results.len(), failures, "OCR ensemble finished");

        EnsembleReport {
            run_id,
            source: SourceSummary {
                name: source.name().to_string(),
                width: source.width(),
                height: source.height(),
                content_hash: compute_image_hash(source.image()),
            },
            results,
        }
    }

    /// Wait for a permit, then start one entry: resample (unless `spec` is
    /// `None`, the original), persist the image and run OCR on it
    async fn spawn_entry(
        &self,
        semaphore: &Arc<Semaphore>,
        source: &SourceImage,
        spec: Option<ScaleSpec>,
    ) -> Entry {
        let label = spec.map_or_else(|| ORIGINAL_LABEL.to_string(), |spec| spec.label());
        // Never closed, so acquisition only fails if that changes
        let permit = Arc::clone(semaphore).acquire_owned().await.ok();
        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);
        let source = source.clone();
        let task_label = label.clone();

        debug!(label = %label, "Scheduling OCR");
        let task = tokio::spawn(
            async move {
                let _permit = permit;
                let label = task_label;
                let prepared = {
                    let label = label.clone();
                    tokio::task::spawn_blocking(move || {
                        prepare(&source, spec, sink.as_ref(), &label)
                    })
                    .await
                };
                let (image, artifact) = match prepared {
                    Ok(Ok(prepared)) => prepared,
                    Ok(Err(err)) => return Attempt::failed(err),
                    Err(join_err) => {
                        return Attempt::failed(PipelineError::ResampleFailure {
                            label,
                            reason: format!("resampling aborted: {}", join_err),
                        })
                    }
                };
                let text = engine.recognize(&label, &image).await;
                Attempt {
                    dimensions: Some((image.width(), image.height())),
                    artifact,
                    text,
                }
            }
            .in_current_span(),
        );

        Entry { label, spec, task }
    }

    /// Await one entry and turn it into a result
    async fn collect(&self, source_name: &str, entry: Entry) -> OcrResult {
        let Entry { label, spec, task } = entry;
        let attempt = task.await.unwrap_or_else(|join_err| {
            Attempt::failed(PipelineError::ocr(
                &label,
                format!("OCR task aborted: {}", join_err),
            ))
        });

        let outcome = match attempt.text {
            Ok(text) => {
                debug!(label = %label, chars = text.chars().count(), "OCR succeeded");
                if let Err(e) = self.sink.persist_text(source_name, &label, &text) {
                    warn!(label = %label, error = %e, "Failed to persist OCR text");
                }
                OcrOutcome::Recognized { text }
            }
            Err(err) => {
                warn!(label = %label, error = %err, "Ensemble entry failed");
                OcrOutcome::from_error(&err)
            }
        };

        OcrResult {
            label,
            spec,
            dimensions: attempt.dimensions,
            artifact: attempt.artifact,
            outcome,
        }
    }
}

/// Build the image one entry hands to OCR and persist it
fn prepare(
    source: &SourceImage,
    spec: Option<ScaleSpec>,
    sink: &dyn ArtifactSink,
    label: &str,
) -> Result<(Arc<DynamicImage>, Option<PathBuf>), PipelineError> {
    let image = match spec {
        None => source.shared_image(),
        Some(spec) => Arc::new(generate_variant(source, spec)?.image),
    };
    let artifact = match sink.persist_image(source.name(), label, &image) {
        Ok(path) => path,
        Err(e) => {
            warn!(label, error = %e, "Failed to persist image");
            None
        }
    };
    Ok((image, artifact))
}
