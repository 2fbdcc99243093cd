use crate::call::{Arg, SourceLocation};
use crate::error::TranslationError;
use crate::path::Path;
use crate::runner::{RunCondition, Strategy};
use crate::source::{ResultMeta, SourceCall};

use super::codes::{self, Located};
use super::{require_meta, BackwardTranslator, ForwardTranslator, Requirements};

/// Result position `i` depends on position `i` of every (broadcast) data argument.
///
/// A unary function of a plain source needs no metadata: the path passes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElementwiseTranslator;

impl ElementwiseTranslator {
    /// The occurrence of the single, directly passed data source, if that is the whole story.
    fn unary_source(call: &SourceCall) -> Option<usize> {
        let data = call.data_arguments();
        match &data[..] {
            [only] => match only.arg {
                Arg::Source(source) => Some(source.occurrence),
                _ => None,
            },
            _ => None,
        }
    }

    fn check_meta<'a>(
        call: &SourceCall,
        meta: Option<&'a ResultMeta>,
    ) -> Result<Option<&'a ResultMeta>, TranslationError> {
        match meta {
            None if call.definition.flags.operator => Err(TranslationError::MetadataUnknown),
            Some(meta) if call.definition.flags.operator && !meta.is_numeric_or_array() => {
                Err(TranslationError::NotApplicable)
            }
            other => Ok(other),
        }
    }
}

impl Strategy for ElementwiseTranslator {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::ALL
    }
}

impl BackwardTranslator for ElementwiseTranslator {
    fn backward(
        &self,
        call: &SourceCall,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Requirements, TranslationError> {
        let meta = Self::check_meta(call, meta)?;
        if let Some(occurrence) = Self::unary_source(call) {
            let mut requirements = Requirements::new();
            requirements.require(occurrence, path.clone());
            return Ok(requirements);
        }
        let meta = require_meta(meta)?;
        codes::backward_each_source(call, path, &meta.shape, |location, source, needed| {
            let arg = codes::data_arg_of(call, location)?;
            let codes = codes::arg_codes(arg, location.occurrence)?.broadcast_to(&meta.shape)?;
            Ok(Located {
                codes,
                needed: needed.clone(),
                source_shape: source.value()?.shape(),
            })
        })
    }
}

impl ForwardTranslator for ElementwiseTranslator {
    fn forward(
        &self,
        call: &SourceCall,
        source: &SourceLocation,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Vec<Path>, TranslationError> {
        let meta = Self::check_meta(call, meta)?;
        if Self::unary_source(call) == Some(source.occurrence) {
            return Ok(vec![path.clone()]);
        }
        let meta = require_meta(meta)?;
        let value = codes::source_at(call, source.occurrence)?.value()?;
        let (mask, _) = codes::source_mask(&value.shape(), path)?;
        let arg = codes::data_arg_of(call, source)?;
        let affected = codes::arg_mask(arg, source.occurrence, &mask)?.broadcast_to(&meta.shape)?;
        Ok(codes::read_off_forward(affected, &Path::root(), false))
    }
}
