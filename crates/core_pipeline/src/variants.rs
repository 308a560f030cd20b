//! Variant generation
//!
//! Turns one source image into one resampled copy per catalog entry:
//! - target size is the exact integer multiple of the source size
//! - each scale spec's interpolation picks the resampling filter
//! - a failing entry is reported on its own and does not stop the rest

use crate::catalog::ScaleCatalog;
use crate::error::PipelineError;
use crate::types::{ImageVariant, ScaleSpec, SourceImage};
use tracing::{debug, warn};

/// Largest raster (in pixels) a single variant may allocate
pub const MAX_VARIANT_PIXELS: u64 = 1 << 28;

/// Resample `source` once per catalog entry, in catalog order
///
/// The returned vector always has `catalog.len()` entries, in the order
/// `catalog.iter()` yields the specs. Every variant is held in memory at
/// once; the ensemble runner calls [`generate_variant`] per entry instead.
pub fn generate_variants<'a>(
    source: &'a SourceImage,
    catalog: &ScaleCatalog,
) -> Vec<Result<ImageVariant<'a>, PipelineError>> {
    catalog
        .iter()
        .map(|spec| {
            let variant = generate_variant(source, *spec);
            if let Err(e) = &variant {
                warn!(error = %e, "Skipping OCR for variant");
            }
            variant
        })
        .collect()
}

/// Resample `source` according to a single spec
pub fn generate_variant(
    source: &SourceImage,
    spec: ScaleSpec,
) -> Result<ImageVariant<'_>, PipelineError> {
    let label = spec.label();
    let failure = |reason: String| PipelineError::ResampleFailure {
        label: label.clone(),
        reason,
    };

    let (width, height) = spec
        .target_dimensions(source.width(), source.height())
        .ok_or_else(|| {
            failure(format!(
                "{}x{} scaled by {}x{} overflows",
                source.width(),
                source.height(),
                spec.scale_x(),
                spec.scale_y()
            ))
        })?;

    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_VARIANT_PIXELS {
        return Err(failure(format!(
            "{}x{} exceeds the {} pixel limit",
            width, height, MAX_VARIANT_PIXELS
        )));
    }

    let image = source
        .image()
        .resize_exact(width, height, spec.interpolation().filter_type());

    if image.width() != width || image.height() != height {
        return Err(failure(format!(
            "resampler produced {}x{}, expected {}x{}",
            image.width(),
            image.height(),
            width,
            height
        )));
    }

    debug!(label = %label, width, height, "Generated variant");

    Ok(ImageVariant {
        source,
        spec,
        label,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Interpolation;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::collections::HashSet;

    fn source(width: u32, height: u32) -> SourceImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
        });
        SourceImage::new("test", DynamicImage::ImageRgb8(img)).unwrap()
    }

    fn spec(x: u32, y: u32, interpolation: Interpolation) -> ScaleSpec {
        ScaleSpec::new(x, y, interpolation).unwrap()
    }

    #[test]
    fn test_variant_dimensions_exact() {
        let src = source(37, 11);
        let catalog = ScaleCatalog::default();
        let variants = generate_variants(&src, &catalog);

        assert_eq!(variants.len(), catalog.len());
        for (spec, variant) in catalog.iter().zip(&variants) {
            let variant = variant.as_ref().unwrap();
            assert_eq!(variant.width(), 37 * spec.scale_x());
            assert_eq!(variant.height(), 11 * spec.scale_y());
            assert_eq!(variant.label, spec.label());
            assert_eq!(variant.spec, *spec);
            assert_eq!(variant.source.name(), "test");
        }
    }

    #[test]
    fn test_end_to_end_example_dimensions() {
        let src = source(100, 50);
        let catalog = ScaleCatalog::new(vec![
            spec(2, 2, Interpolation::Bicubic),
            spec(3, 3, Interpolation::Bilinear),
        ])
        .unwrap();

        let variants: Vec<_> = generate_variants(&src, &catalog)
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(variants[0].label, "2_2_BICUBIC");
        assert_eq!((variants[0].width(), variants[0].height()), (200, 100));
        assert_eq!(variants[1].label, "3_3_BILINEAR");
        assert_eq!((variants[1].width(), variants[1].height()), (300, 150));
    }

    #[test]
    fn test_all_interpolations_resample() {
        let src = source(8, 4);
        for interpolation in [
            Interpolation::Nearest,
            Interpolation::Bilinear,
            Interpolation::Bicubic,
            Interpolation::Lanczos,
        ] {
            let variant = generate_variant(&src, spec(2, 3, interpolation)).unwrap();
            assert_eq!((variant.width(), variant.height()), (16, 12));
        }
    }

    #[test]
    fn test_labels_pairwise_distinct() {
        let src = source(4, 4);
        let mut specs = Vec::new();
        for x in 1..=3 {
            for y in 1..=3 {
                specs.push(spec(x, y, Interpolation::Bicubic));
                specs.push(spec(x, y, Interpolation::Lanczos));
            }
        }
        let catalog = ScaleCatalog::new(specs).unwrap();
        let variants = generate_variants(&src, &catalog);
        let labels: HashSet<_> = variants
            .iter()
            .map(|v| v.as_ref().unwrap().label.clone())
            .collect();
        assert_eq!(labels.len(), catalog.len());
    }

    #[test]
    fn test_generation_repeatable() {
        let src = source(20, 10);
        let catalog = ScaleCatalog::default();

        fn describe(
            variants: Vec<Result<ImageVariant<'_>, PipelineError>>,
        ) -> Vec<(String, u32, u32)> {
            variants
                .into_iter()
                .map(|v| {
                    let v = v.unwrap();
                    (v.label.clone(), v.width(), v.height())
                })
                .collect()
        }

        let first = describe(generate_variants(&src, &catalog));
        let second = describe(generate_variants(&src, &catalog));
        assert_eq!(first, second);
    }

    #[test]
    fn test_failure_isolated_to_entry() {
        let src = source(2, 2);
        let catalog = ScaleCatalog::new(vec![
            spec(2, 2, Interpolation::Bicubic),
            spec(u32::MAX, 1, Interpolation::Bicubic),
            spec(1 << 20, 1 << 20, Interpolation::Nearest),
            spec(3, 3, Interpolation::Bilinear),
        ])
        .unwrap();

        let variants = generate_variants(&src, &catalog);
        assert_eq!(variants.len(), 4);
        assert!(variants[0].is_ok());
        assert!(matches!(
            &variants[1],
            Err(PipelineError::ResampleFailure { label, .. }) if label == &format!("{}_1_BICUBIC", u32::MAX)
        ));
        assert!(matches!(
            &variants[2],
            Err(PipelineError::ResampleFailure { .. })
        ));
        let last = variants[3].as_ref().unwrap();
        assert_eq!((last.width(), last.height()), (6, 6));
    }

    #[test]
    fn test_source_not_modified() {
        let src = source(5, 5);
        let before = src.image().to_rgb8().into_raw();
        let _ = generate_variants(&src, &ScaleCatalog::default());
        assert_eq!(src.image().to_rgb8().into_raw(), before);
        assert_eq!((src.width(), src.height()), (5, 5));
    }
}
