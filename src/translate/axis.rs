use crate::array::NdArray;
use crate::call::SourceLocation;
use crate::error::TranslationError;
use crate::params;
use crate::path::Path;
use crate::runner::{RunCondition, Strategy};
use crate::source::{ResultMeta, SourceCall};

use super::codes::{self, Located};
use super::{require_meta, BackwardTranslator, ForwardTranslator, Requirements};

fn reduced_axes(call: &SourceCall, ndim: usize) -> Result<Vec<usize>, TranslationError> {
    Ok(params::axes(call.param("axis").as_ref(), ndim)?.unwrap_or_else(|| (0..ndim).collect()))
}

fn where_mask(call: &SourceCall, shape: &[usize]) -> Result<Option<NdArray<bool>>, TranslationError> {
    match params::mask(call.param("where").as_ref())? {
        Some(mask) => Ok(Some(mask.broadcast_to(shape)?)),
        None => Ok(None),
    }
}

/// `sum`, `prod`, `min`, `max`, `any`, `all`, `mean` over `axis`, with `keepdims` and an
/// optional `where` mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReductionTranslator;

impl Strategy for ReductionTranslator {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::METADATA
    }
}

impl BackwardTranslator for ReductionTranslator {
    fn backward(
        &self,
        call: &SourceCall,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Requirements, TranslationError> {
        let meta = require_meta(meta)?;
        codes::backward_each_source(call, path, &meta.shape, |location, source, needed| {
            let codes = codes::arg_codes(codes::data_arg_of(call, location)?, location.occurrence)?;
            let shape = codes.shape().to_vec();
            let axes = reduced_axes(call, shape.len())?;
            let kept: Vec<isize> = shape
                .iter()
                .enumerate()
                .map(|(axis, &d)| if axes.contains(&axis) { 1 } else { d as isize })
                .collect();
            let mut needed = needed.reshape(&kept)?.broadcast_to(&shape)?;
            if let Some(mask) = where_mask(call, &shape)? {
                needed = needed.and(&mask)?;
            }
            Ok(Located {
                codes,
                needed,
                source_shape: source.value()?.shape(),
            })
        })
    }
}

impl ForwardTranslator for ReductionTranslator {
    fn forward(
        &self,
        call: &SourceCall,
        source: &SourceLocation,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Vec<Path>, TranslationError> {
        let meta = require_meta(meta)?;
        let value = codes::source_at(call, source.occurrence)?.value()?;
        let (mask, _) = codes::source_mask(&value.shape(), path)?;
        let mut changed = codes::arg_mask(codes::data_arg_of(call, source)?, source.occurrence, &mask)?;
        let shape = changed.shape().to_vec();
        if let Some(mask) = where_mask(call, &shape)? {
            changed = changed.and(&mask)?;
        }
        let axes = reduced_axes(call, shape.len())?;
        let keepdims = params::flag(call.param("keepdims").as_ref());
        let affected = changed.any_axes(&axes, keepdims)?;
        if affected.shape() != &meta.shape[..] {
            return Err(TranslationError::NotApplicable);
        }
        Ok(codes::read_off_forward(affected, &Path::root(), false))
    }
}

/// `cumsum` and `cumprod`: position `i` along the axis depends on every position up to `i`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccumulationTranslator;

impl Strategy for AccumulationTranslator {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::METADATA
    }
}

fn or(a: &bool, b: &bool) -> bool {
    *a || *b
}

impl BackwardTranslator for AccumulationTranslator {
    fn backward(
        &self,
        call: &SourceCall,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Requirements, TranslationError> {
        let meta = require_meta(meta)?;
        codes::backward_each_source(call, path, &meta.shape, |location, source, needed| {
            let codes = codes::arg_codes(codes::data_arg_of(call, location)?, location.occurrence)?;
            let shape: Vec<isize> = codes.shape().iter().map(|&d| d as isize).collect();
            let needed = match params::axis(call.param("axis").as_ref(), codes.ndim())? {
                Some(axis) => needed
                    .flip(Some(axis))?
                    .accumulate(Some(axis), or)?
                    .flip(Some(axis))?,
                None => needed
                    .flip(None)?
                    .accumulate(None, or)?
                    .flip(None)?
                    .into_shape(&shape)?,
            };
            Ok(Located {
                codes,
                needed,
                source_shape: source.value()?.shape(),
            })
        })
    }
}

impl ForwardTranslator for AccumulationTranslator {
    fn forward(
        &self,
        call: &SourceCall,
        source: &SourceLocation,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Vec<Path>, TranslationError> {
        let meta = require_meta(meta)?;
        let value = codes::source_at(call, source.occurrence)?.value()?;
        let (mask, _) = codes::source_mask(&value.shape(), path)?;
        let changed = codes::arg_mask(codes::data_arg_of(call, source)?, source.occurrence, &mask)?;
        let axis = params::axis(call.param("axis").as_ref(), changed.ndim())?;
        let affected = changed.accumulate(axis, or)?;
        if affected.shape() != &meta.shape[..] {
            return Err(TranslationError::NotApplicable);
        }
        Ok(codes::read_off_forward(affected, &Path::root(), false))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::call::Arg;
    use crate::path;
    use crate::source::Source;
    use crate::test_support::{call_of, call_with, mask};
    use crate::value::Value;
    use test_log::test;

    fn grid(shape: &[usize]) -> Value {
        let n: usize = shape.iter().product();
        Value::array(shape, (0..n as i64).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn full_reduction() {
        let call = call_of("sum", vec![Arg::Source(Source::known(0, grid(&[3])))]);
        let meta = ResultMeta::of(&Value::Int(3));
        let requirements = ReductionTranslator.backward(&call, &path![], Some(&meta)).unwrap();
        assert_eq!(requirements.path(0), Some(&path![]));
        let location = call.location_of(0).unwrap();
        let paths = ReductionTranslator
            .forward(&call, &location, &path![0], Some(&meta))
            .unwrap();
        assert_eq!(paths, vec![path![]]);
    }

    #[test]
    fn reduction_along_an_axis() {
        let call = call_with(
            "sum",
            vec![Arg::Source(Source::known(0, grid(&[2, 3])))],
            vec![("axis", Arg::Const(Value::Int(1)))],
        );
        let meta = ResultMeta::of(&grid(&[2]));
        let requirements = ReductionTranslator.backward(&call, &path![1], Some(&meta)).unwrap();
        assert_eq!(requirements.path(0), Some(&path![mask(&[2, 3], &[3, 4, 5])]));
        let location = call.location_of(0).unwrap();
        let paths = ReductionTranslator
            .forward(&call, &location, &path![[0, 2]], Some(&meta))
            .unwrap();
        assert_eq!(paths, vec![path![mask(&[2], &[0])]]);
    }

    #[test]
    fn where_mask_limits_requirements() {
        let call = call_with(
            "sum",
            vec![Arg::Source(Source::known(0, grid(&[3])))],
            vec![("where", Arg::Const(Value::from(vec![true, false, true])))],
        );
        let meta = ResultMeta::of(&Value::Int(2));
        let requirements = ReductionTranslator.backward(&call, &path![], Some(&meta)).unwrap();
        assert_eq!(requirements.path(0), Some(&path![mask(&[3], &[0, 2])]));
        let location = call.location_of(0).unwrap();
        assert!(ReductionTranslator
            .forward(&call, &location, &path![1], Some(&meta))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn accumulation_depends_on_prefixes() {
        let call = call_of("cumsum", vec![Arg::Source(Source::known(0, grid(&[4])))]);
        let meta = ResultMeta::of(&grid(&[4]));
        let requirements = AccumulationTranslator
            .backward(&call, &path![2], Some(&meta))
            .unwrap();
        assert_eq!(requirements.path(0), Some(&path![mask(&[4], &[0, 1, 2])]));
        let location = call.location_of(0).unwrap();
        let paths = AccumulationTranslator
            .forward(&call, &location, &path![1], Some(&meta))
            .unwrap();
        assert_eq!(paths, vec![path![mask(&[4], &[1, 2, 3])]]);
    }
}
