use crate::array::{normalize_axis, NdArray};
use crate::call::{FuncCall, SourceLocation, SourceValue};
use crate::error::{PathError, ShapeError, TranslationError};
use crate::params;
use crate::path::{self, Component, Path};
use crate::runner::{RunCondition, Strategy};
use crate::source::{ResultMeta, SourceCall};
use crate::value::Value;

use super::codes::{self, Located};
use super::{require_meta, BackwardTranslator, ForwardTranslator, Requirements};

/// Functions that only move elements around. Each is defined once, generically, so the same
/// code runs on values, on index codes and on masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transposition {
    Array,
    Reshape,
    Transpose,
    Rot90,
    Flip,
    Concatenate,
    Tile,
    Repeat,
    ExpandDims,
    GetItem,
}

fn required<S: Clone + SourceValue>(call: &FuncCall<S>, name: &str) -> Result<Value, ShapeError> {
    call.param(name)
        .ok_or_else(|| ShapeError::Other(format!("missing parameter `{name}`")))
}

impl Transposition {
    /// Apply the data movement to one array per data argument.
    pub fn apply<S, T>(&self, call: &FuncCall<S>, inputs: Vec<NdArray<T>>) -> Result<NdArray<T>, PathError>
    where
        S: Clone + SourceValue,
        T: Clone,
    {
        if let Transposition::Concatenate = self {
            let ndim = inputs.first().map_or(0, |a| a.ndim());
            let axis = match call.param("axis") {
                Some(v) => normalize_axis(params::int(&v)? as isize, ndim)?,
                None => 0,
            };
            return Ok(NdArray::concatenate(&inputs, axis)?);
        }
        let input = inputs
            .into_iter()
            .next()
            .ok_or_else(|| ShapeError::Other("no data argument".into()))?;
        let ndim = input.ndim();
        let out = match self {
            Transposition::Array | Transposition::Concatenate => input,
            Transposition::Reshape => {
                let shape: Vec<isize> = params::int_list(&required(call, "newshape")?)?
                    .into_iter()
                    .map(|d| d as isize)
                    .collect();
                input.into_shape(&shape)?
            }
            Transposition::Transpose => {
                let axes = params::axes(call.param("axes").as_ref(), ndim)?;
                input.transpose(axes.as_deref())?
            }
            Transposition::Rot90 => {
                let k = match call.param("k") {
                    Some(v) => params::int(&v)?,
                    None => 1,
                };
                let axes = match params::axes(call.param("axes").as_ref(), ndim)? {
                    Some(axes) if axes.len() == 2 => (axes[0], axes[1]),
                    Some(axes) => {
                        return Err(ShapeError::Other(format!(
                            "rot90 needs exactly two axes, got {}",
                            axes.len()
                        ))
                        .into())
                    }
                    None => (0, 1),
                };
                input.rot90(k, axes)?
            }
            Transposition::Flip => {
                let axis = params::axis(call.param("axis").as_ref(), ndim)?;
                input.flip(axis)?
            }
            Transposition::Tile => input.tile(&params::usize_list(&required(call, "reps")?)?),
            Transposition::Repeat => {
                let repeats = usize::try_from(params::int(&required(call, "repeats")?)?)
                    .map_err(|_| ShapeError::Other("negative repeat count".into()))?;
                let axis = params::axis(call.param("axis").as_ref(), ndim)?;
                input.repeat(repeats, axis)?
            }
            Transposition::ExpandDims => {
                input.expand_dims(params::int(&required(call, "axis")?)? as isize)?
            }
            Transposition::GetItem => {
                let item = required(call, "item")?;
                let component = Component::from_value(&item).ok_or_else(|| {
                    PathError::InvalidComponent {
                        component: format!("{item:?}"),
                        ty: "array",
                    }
                })?;
                let selection = path::selection(input.shape(), &component)?;
                input.take(&selection)
            }
        };
        Ok(out)
    }
}

/// Backward and forward by re-running the transposition on index codes and masks.
#[derive(Debug, Clone, Copy)]
pub struct TranspositionalTranslator(pub Transposition);

impl Strategy for TranspositionalTranslator {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::METADATA
    }
}

impl BackwardTranslator for TranspositionalTranslator {
    fn backward(
        &self,
        call: &SourceCall,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Requirements, TranslationError> {
        let meta = require_meta(meta)?;
        let data = call.data_arguments();
        codes::backward_each_source(call, path, &meta.shape, |location, source, needed| {
            let inputs = data
                .iter()
                .map(|d| codes::arg_codes(d.arg, location.occurrence))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Located {
                codes: self.0.apply(call, inputs)?,
                needed: needed.clone(),
                source_shape: source.value()?.shape(),
            })
        })
    }
}

impl ForwardTranslator for TranspositionalTranslator {
    fn forward(
        &self,
        call: &SourceCall,
        source: &SourceLocation,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Vec<Path>, TranslationError> {
        let meta = require_meta(meta)?;
        let value = codes::source_at(call, source.occurrence)?.value()?;
        let (mask, remaining) = codes::source_mask(&value.shape(), path)?;
        let inputs = call
            .data_arguments()
            .iter()
            .map(|d| codes::arg_mask(d.arg, source.occurrence, &mask))
            .collect::<Result<Vec<_>, _>>()?;
        let affected = self.0.apply(call, inputs)?;
        if affected.shape() != &meta.shape[..] {
            return Err(TranslationError::NotApplicable);
        }
        if let Value::Record(_) = value {
            // Field names are still field names on the result.
            return Ok(codes::read_off_forward(affected, &Path::root(), false)
                .into_iter()
                .map(|p| p.join(&remaining))
                .collect());
        }
        Ok(codes::read_off_forward(affected, &remaining, true))
    }
}
