use crate::call::SourceLocation;
use crate::error::TranslationError;
use crate::path::Path;
use crate::runner::{RunCondition, Strategy};
use crate::source::{ResultMeta, SourceCall};

use super::{BackwardTranslator, ForwardTranslator, Requirement, Requirements};

/// Functions of the shape alone: `shape`, `len`, `ndim`, `size`, `zeros_like`, `ones_like`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeOnlyTranslator;

impl Strategy for ShapeOnlyTranslator {
    fn run_conditions(&self) -> &'static [RunCondition] {
        &[RunCondition::NoMetadata]
    }
}

impl BackwardTranslator for ShapeOnlyTranslator {
    fn backward(
        &self,
        call: &SourceCall,
        _path: &Path,
        _meta: Option<&ResultMeta>,
    ) -> Result<Requirements, TranslationError> {
        let mut requirements = Requirements::new();
        for (location, _) in call.source_locations() {
            if location.is_data {
                requirements.insert(location.occurrence, Requirement::Shape);
            }
        }
        Ok(requirements)
    }
}

impl ForwardTranslator for ShapeOnlyTranslator {
    fn forward(
        &self,
        _call: &SourceCall,
        _source: &SourceLocation,
        path: &Path,
        _meta: Option<&ResultMeta>,
    ) -> Result<Vec<Path>, TranslationError> {
        if path.is_root() {
            Ok(vec![Path::root()])
        } else {
            Ok(Vec::new())
        }
    }
}

/// The result depends on the whole of every data source: casts and proxies.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeValueTranslator;

impl Strategy for WholeValueTranslator {
    fn run_conditions(&self) -> &'static [RunCondition] {
        &[RunCondition::NoMetadata]
    }
}

impl BackwardTranslator for WholeValueTranslator {
    fn backward(
        &self,
        call: &SourceCall,
        _path: &Path,
        _meta: Option<&ResultMeta>,
    ) -> Result<Requirements, TranslationError> {
        Ok(Requirements::everything(call))
    }
}

impl ForwardTranslator for WholeValueTranslator {
    fn forward(
        &self,
        _call: &SourceCall,
        _source: &SourceLocation,
        _path: &Path,
        _meta: Option<&ResultMeta>,
    ) -> Result<Vec<Path>, TranslationError> {
        Ok(vec![Path::root()])
    }
}
