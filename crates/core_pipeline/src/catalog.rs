//! The fixed, ordered menu of rescale-and-refilter strategies

use crate::error::PipelineError;
use crate::types::{Interpolation, ScaleSpec};
use std::collections::HashSet;
use tracing::warn;

/// Built-in catalog, empirically chosen for screen captures
const DEFAULT_SPECS: [ScaleSpec; 6] = [
    ScaleSpec::fixed(2, 2, Interpolation::Bicubic),
    ScaleSpec::fixed(2, 2, Interpolation::Bilinear),
    ScaleSpec::fixed(3, 2, Interpolation::Bicubic),
    ScaleSpec::fixed(3, 2, Interpolation::Bilinear),
    ScaleSpec::fixed(3, 3, Interpolation::Bicubic),
    ScaleSpec::fixed(3, 3, Interpolation::Bilinear),
];

/// Ordered, read-only sequence of scale specs
///
/// Order is significant: reports list variants in catalog order so users
/// can compare them positionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleCatalog {
    specs: Vec<ScaleSpec>,
}

impl ScaleCatalog {
    /// Build a custom catalog; rejects empty lists and duplicate specs
    pub fn new(specs: Vec<ScaleSpec>) -> Result<Self, PipelineError> {
        if specs.is_empty() {
            return Err(PipelineError::InvalidScaleSpec(
                "catalog must contain at least one scale spec".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(*spec) {
                return Err(PipelineError::InvalidScaleSpec(format!(
                    "duplicate scale spec {} in catalog",
                    spec
                )));
            }
            if spec.is_identity() {
                warn!(label = %spec, "1x1 scale spec duplicates the original image");
            }
        }

        Ok(Self { specs })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScaleSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Labels in catalog order
    pub fn labels(&self) -> Vec<String> {
        self.specs.iter().map(ScaleSpec::label).collect()
    }
}

impl Default for ScaleCatalog {
    fn default() -> Self {
        Self {
            specs: DEFAULT_SPECS.to_vec(),
        }
    }
}

impl<'a> IntoIterator for &'a ScaleCatalog {
    type Item = &'a ScaleSpec;
    type IntoIter = std::slice::Iter<'a, ScaleSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}
