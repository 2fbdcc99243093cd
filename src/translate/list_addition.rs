use crate::array::NdArray;
use crate::call::{Arg, SourceLocation};
use crate::error::TranslationError;
use crate::path::{Path, PathComponent};
use crate::runner::{RunCondition, Strategy};
use crate::source::{ResultMeta, Source, SourceCall};
use crate::value::ContainerKind;

use super::codes::{self, Located, FOCAL_SOURCE_SCALAR, OTHERS_ELEMENT};
use super::{require_meta, BackwardTranslator, ForwardTranslator, Requirements};

/// `+` on two sequences: the result is the first sequence followed by the second.
///
/// Each operand is seen as a 1-d array of its elements, whatever they hold.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListAdditionTranslator;

/// The number of elements `arg` contributes to the concatenation.
pub(crate) fn arg_len(arg: &Arg<Source>) -> Result<usize, TranslationError> {
    let value = match arg {
        Arg::Seq(items) => return Ok(items.len()),
        Arg::Const(value) => value,
        Arg::Source(source) => source.value()?,
    };
    value
        .as_sequence()
        .map(|items| items.len())
        .ok_or(TranslationError::NotApplicable)
}

/// One entry per element of `arg`, built with `focal` for the focal source.
fn elements<T: Clone>(
    arg: &Arg<Source>,
    occurrence: usize,
    whole: impl FnOnce(usize) -> NdArray<T>,
    nested: T,
    other: T,
) -> Result<NdArray<T>, TranslationError> {
    let len = arg_len(arg)?;
    Ok(match arg {
        Arg::Source(source) if source.occurrence == occurrence => whole(len),
        Arg::Seq(items) => NdArray::from_vec(
            items
                .iter()
                .map(|item| match item {
                    Arg::Source(s) if s.occurrence == occurrence => nested.clone(),
                    _ => other.clone(),
                })
                .collect(),
        ),
        _ => NdArray::from_elem(vec![len], other),
    })
}

impl ListAdditionTranslator {
    fn check(call: &SourceCall, meta: &ResultMeta) -> Result<usize, TranslationError> {
        if !meta.ty.is_sequence() {
            return Err(TranslationError::NotApplicable);
        }
        call.data_arguments().iter().map(|d| arg_len(d.arg)).sum()
    }
}

impl Strategy for ListAdditionTranslator {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::METADATA
    }
}

impl BackwardTranslator for ListAdditionTranslator {
    fn backward(
        &self,
        call: &SourceCall,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Requirements, TranslationError> {
        let total = Self::check(call, require_meta(meta)?)?;
        let data = call.data_arguments();
        codes::backward_each_source(call, path, &[total], |location, _, needed| {
            let parts = data
                .iter()
                .map(|d| {
                    elements(
                        d.arg,
                        location.occurrence,
                        |len| NdArray::arange(&[len]).map(|&i| i as i64),
                        FOCAL_SOURCE_SCALAR,
                        OTHERS_ELEMENT,
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            let source_shape = if location.within.is_empty() {
                smallvec::smallvec![arg_len(codes::data_arg_of(call, location)?)?]
            } else {
                Default::default()
            };
            Ok(Located {
                codes: NdArray::concatenate(&parts, 0)?,
                needed: needed.clone(),
                source_shape,
            })
        })
    }
}

impl ForwardTranslator for ListAdditionTranslator {
    fn forward(
        &self,
        call: &SourceCall,
        source: &SourceLocation,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Vec<Path>, TranslationError> {
        Self::check(call, require_meta(meta)?)?;
        let (mask, remaining) = if source.within.is_empty() {
            let len = arg_len(codes::data_arg_of(call, source)?)?;
            codes::source_mask(&[len], path)?
        } else {
            (NdArray::scalar(true), path.clone())
        };
        let parts = call
            .data_arguments()
            .iter()
            .map(|d| elements(d.arg, source.occurrence, |_| mask.clone(), true, false))
            .collect::<Result<Vec<_>, _>>()?;
        let affected = NdArray::concatenate(&parts, 0)?;
        let hits: Vec<usize> = affected
            .iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .map(|(i, _)| i)
            .collect();
        Ok(match hits[..] {
            [] => Vec::new(),
            [only] => vec![Path::from(vec![PathComponent::with_kind(
                crate::path::Component::Index(only as isize),
                ContainerKind::Sequence,
            )])
            .join(&remaining)],
            _ => codes::read_off_forward(affected, &Path::root(), false),
        })
    }
}
