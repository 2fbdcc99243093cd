use crate::array::NdArray;
use crate::call::SourceLocation;
use crate::error::{ShapeError, TranslationError};
use crate::path::Path;
use crate::runner::{RunCondition, Strategy};
use crate::source::{ResultMeta, SourceCall};

use super::codes::{self, Located};
use super::{require_meta, BackwardTranslator, ForwardTranslator, Requirements};

/// Core dimensions of a vectorized function: how many trailing axes each argument hands to
/// one call of the inner function, and how many the inner function returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreDims {
    pub inputs: Vec<usize>,
    pub output: usize,
}

impl CoreDims {
    pub fn new(inputs: impl IntoIterator<Item = usize>, output: usize) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
            output,
        }
    }

    pub fn input(&self, formal: usize) -> usize {
        self.inputs.get(formal).copied().unwrap_or(0)
    }
}

fn split_core(shape: &[usize], core: usize) -> Result<(&[usize], &[usize]), ShapeError> {
    if core > shape.len() {
        return Err(ShapeError::Other(format!(
            "{core} core dimensions do not fit in shape {shape:?}"
        )));
    }
    Ok(shape.split_at(shape.len() - core))
}

/// Give `mask` (over `loop_shape`) `core` trailing axes and broadcast to `full`.
fn expand_core(mask: &NdArray<bool>, core: usize, full: &[usize]) -> Result<NdArray<bool>, ShapeError> {
    let mut shape: Vec<isize> = mask.shape().iter().map(|&d| d as isize).collect();
    shape.extend(std::iter::repeat(1).take(core));
    mask.reshape(&shape)?.broadcast_to(full)
}

/// Trailing axes of `mask` collapsed with `any`.
fn reduce_core(mask: &NdArray<bool>, core: usize) -> Result<NdArray<bool>, ShapeError> {
    if core == 0 {
        return Ok(mask.clone());
    }
    let ndim = mask.ndim();
    let axes: Vec<usize> = (ndim - core..ndim).collect();
    mask.any_axes(&axes, false)
}

#[derive(Debug, Clone, Default)]
pub struct VectorizeTranslator(pub CoreDims);

impl Strategy for VectorizeTranslator {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::METADATA
    }
}

impl BackwardTranslator for VectorizeTranslator {
    fn backward(
        &self,
        call: &SourceCall,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Requirements, TranslationError> {
        let meta = require_meta(meta)?;
        let data = call.data_arguments();
        codes::backward_each_source(call, path, &meta.shape, |location, source, needed| {
            let arg = data
                .iter()
                .find(|d| d.contains(location))
                .ok_or(TranslationError::NotApplicable)?;
            let codes = codes::arg_codes(arg.arg, location.occurrence)?;
            let core = self.0.input(arg.formal);
            let (arg_loop, _) = split_core(codes.shape(), core)?;
            let result_loop = reduce_core(needed, self.0.output)?;
            let needed = result_loop.unbroadcast_or_broadcast(arg_loop)?;
            let needed = expand_core(&needed, core, codes.shape())?;
            Ok(Located {
                codes,
                needed,
                source_shape: source.value()?.shape(),
            })
        })
    }
}

impl ForwardTranslator for VectorizeTranslator {
    fn forward(
        &self,
        call: &SourceCall,
        source: &SourceLocation,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Vec<Path>, TranslationError> {
        let meta = require_meta(meta)?;
        let data = call.data_arguments();
        let arg = data
            .iter()
            .find(|d| d.contains(source))
            .ok_or(TranslationError::NotApplicable)?;
        let value = codes::source_at(call, source.occurrence)?.value()?;
        let (mask, _) = codes::source_mask(&value.shape(), path)?;
        let changed = codes::arg_mask(arg.arg, source.occurrence, &mask)?;
        let changed_loop = reduce_core(&changed, self.0.input(arg.formal))?;
        let (result_loop, _) = split_core(&meta.shape, self.0.output)?;
        let affected = changed_loop.broadcast_to(result_loop)?;
        let affected = expand_core(&affected, self.0.output, &meta.shape)?;
        Ok(codes::read_off_forward(affected, &Path::root(), false))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::call::{Arg, FuncCall, Signature};
    use crate::definition::{DataArgumentSpec, FunctionDefinition};
    use crate::path;
    use crate::source::Source;
    use crate::test_support::mask;
    use crate::value::Value;
    use std::rc::Rc;
    use test_log::test;

    fn row_sums(source: Value) -> SourceCall {
        let definition = FunctionDefinition::builder("row_sums")
            .signature(Signature::new(["arg0"]))
            .data_arguments([DataArgumentSpec::single(0)])
            .translator(VectorizeTranslator(CoreDims::new([1], 0)))
            .build();
        FuncCall::new(Rc::new(definition), vec![Arg::Source(Source::known(0, source))], vec![])
    }

    #[test]
    fn core_axes_travel_together() {
        let a = Value::array(&[2, 3], vec![0i64; 6]).unwrap();
        let call = row_sums(a);
        let meta = ResultMeta::of(&Value::array(&[2], vec![0i64; 2]).unwrap());
        let requirements = VectorizeTranslator(CoreDims::new([1], 0))
            .backward(&call, &path![0], Some(&meta))
            .unwrap();
        assert_eq!(requirements.path(0), Some(&path![mask(&[2, 3], &[0, 1, 2])]));

        let location = call.location_of(0).unwrap();
        let paths = VectorizeTranslator(CoreDims::new([1], 0))
            .forward(&call, &location, &path![[1, 1]], Some(&meta))
            .unwrap();
        assert_eq!(paths, vec![path![mask(&[2], &[1])]]);
    }
}
