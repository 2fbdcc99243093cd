//! Index-code arrays.
//!
//! To find out where the elements of a source end up, each data argument is replaced by an
//! `i64` array: the focal source contributes its own linear indices, everything else a
//! negative marker. Running the function's data movement on these arrays instead of on the
//! values tells, for every result position, which source element it came from. Forward
//! translation does the same with boolean masks.

use crate::array::{size_of, NdArray, Selection, Shape};
use crate::call::{Arg, SourceLocation};
use crate::error::TranslationError;
use crate::path::{self, Component, Path, PathComponent};
use crate::source::{Source, SourceCall};
use crate::value::{ContainerKind, Value};

use super::Requirements;

pub const NON_CHOSEN_ELEMENT: i64 = -1;
pub const OTHERS_ELEMENT: i64 = -2;
pub const FOCAL_SOURCE_SCALAR: i64 = -3;

pub(crate) fn is_focal(code: i64) -> bool {
    code >= 0 || code == FOCAL_SOURCE_SCALAR
}

/// Replace the focal occurrence in `arg` through `focal` and everything else with `other`.
/// Literal sequences are stacked.
pub(crate) fn build_arg<T: Clone>(
    arg: &Arg<Source>,
    occurrence: usize,
    focal: &mut dyn FnMut(&Value) -> NdArray<T>,
    other: &T,
) -> Result<NdArray<T>, TranslationError> {
    match arg {
        Arg::Const(value) => Ok(NdArray::from_elem(value.shape(), other.clone())),
        Arg::Source(source) => {
            let value = source.value()?;
            if source.occurrence == occurrence {
                Ok(focal(value))
            } else {
                Ok(NdArray::from_elem(value.shape(), other.clone()))
            }
        }
        Arg::Seq(items) => {
            let parts = items
                .iter()
                .map(|item| build_arg(item, occurrence, focal, other))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(NdArray::stack(&parts)?)
        }
    }
}

pub(crate) fn source_codes(shape: &[usize]) -> NdArray<i64> {
    if shape.is_empty() {
        NdArray::scalar(FOCAL_SOURCE_SCALAR)
    } else {
        NdArray::arange(shape).map(|&i| i as i64)
    }
}

pub(crate) fn arg_codes(arg: &Arg<Source>, occurrence: usize) -> Result<NdArray<i64>, TranslationError> {
    build_arg(
        arg,
        occurrence,
        &mut |value| source_codes(&value.shape()),
        &OTHERS_ELEMENT,
    )
}

pub(crate) fn arg_mask(
    arg: &Arg<Source>,
    occurrence: usize,
    mask: &NdArray<bool>,
) -> Result<NdArray<bool>, TranslationError> {
    build_arg(arg, occurrence, &mut |_| mask.clone(), &false)
}

/// The positions of an array of `shape` that `path` reaches, and the part of `path` that
/// continues into an extracted element.
pub(crate) fn select_within(
    shape: &[usize],
    path: &[PathComponent],
) -> Result<(Selection, Path), TranslationError> {
    let mut selection = Selection {
        shape: shape.into(),
        flat: (0..size_of(shape)).collect(),
    };
    // Field names ahead of any position, as on a record, move behind the positions.
    let fields = path.iter().take_while(|c| c.is_key()).count();
    let (keys, path) = path.split_at(fields);
    for (i, component) in path.iter().enumerate() {
        if selection.is_element() {
            return Ok((selection, Path::from(&path[i..]).join(keys)));
        }
        match &component.component {
            Component::OutOfArray => {
                return Ok((selection, Path::from(&path[i + 1..]).join(keys)))
            }
            Component::Key(_) => return Err(TranslationError::NotApplicable),
            other => {
                let inner = path::selection(&selection.shape, other)?;
                selection = Selection {
                    shape: inner.shape,
                    flat: inner.flat.iter().map(|&f| selection.flat[f]).collect(),
                };
            }
        }
    }
    Ok((selection, Path::from(keys)))
}

/// Where a source path lands in the source's own positions.
pub(crate) fn source_mask(
    shape: &[usize],
    path: &[PathComponent],
) -> Result<(NdArray<bool>, Path), TranslationError> {
    if shape.is_empty() {
        return Ok((NdArray::scalar(true), path.into()));
    }
    let (selection, remaining) = select_within(shape, path)?;
    Ok((selection.to_mask(shape), remaining))
}

fn element_path(flat: usize, shape: &[usize]) -> PathComponent {
    if shape.len() == 1 {
        PathComponent::with_kind(Component::Index(flat as isize), ContainerKind::Tensor)
    } else {
        let layout = NdArray::from_elem(shape, ());
        let index = layout.unravel_index(flat);
        PathComponent::with_kind(
            Component::Tuple(
                index
                    .iter()
                    .map(|&i| crate::array::AxisIndex::Index(i as isize))
                    .collect(),
            ),
            ContainerKind::Tensor,
        )
    }
}

/// Turn the focal codes at the needed positions into a path within the source, or `None` if
/// no focal element is needed.
pub(crate) fn read_off_backward(
    codes: &NdArray<i64>,
    needed: &NdArray<bool>,
    element: bool,
    source_shape: &[usize],
    remaining: &Path,
) -> Option<Path> {
    let mut scalar = false;
    let mut hits = Vec::new();
    for (&code, &need) in codes.iter().zip(needed.iter()) {
        if !need {
            continue;
        }
        if code == FOCAL_SOURCE_SCALAR {
            scalar = true;
        } else if code >= 0 {
            hits.push(code as usize);
        }
    }
    if !scalar && hits.is_empty() {
        return None;
    }
    hits.sort_unstable();
    hits.dedup();
    let head = if scalar || source_shape.is_empty() {
        Path::root()
    } else if element && hits.len() == 1 {
        Path::from(vec![element_path(hits[0], source_shape)])
    } else if hits.len() == size_of(source_shape) {
        Path::root()
    } else {
        let mut mask = NdArray::from_elem(source_shape, false);
        for &hit in &hits {
            mask.data_mut()[hit] = true;
        }
        Path::from(vec![PathComponent::with_kind(
            Component::Mask(mask),
            ContainerKind::Tensor,
        )])
    };
    Some(head.join(remaining))
}

/// Turn an affected-result mask into invalidation paths.
pub(crate) fn read_off_forward(mask: NdArray<bool>, remaining: &Path, out_of_array: bool) -> Vec<Path> {
    if !mask.any() {
        return Vec::new();
    }
    if mask.ndim() == 0 {
        return vec![remaining.clone()];
    }
    let mut path = Path::from(vec![PathComponent::with_kind(
        Component::Mask(mask),
        ContainerKind::Tensor,
    )]);
    if out_of_array && !remaining.is_root() {
        path.push(Component::OutOfArray);
        path = path.join(remaining);
    }
    vec![path]
}

/// The data argument (or multi-argument element) holding a source occurrence.
pub(crate) fn data_arg_of<'a>(
    call: &'a SourceCall,
    location: &SourceLocation,
) -> Result<&'a Arg<Source>, TranslationError> {
    call.data_arguments()
        .into_iter()
        .find(|d| d.contains(location))
        .map(|d| d.arg)
        .ok_or(TranslationError::NotApplicable)
}

pub(crate) fn source_at(call: &SourceCall, occurrence: usize) -> Result<&Source, TranslationError> {
    call.source_locations()
        .into_iter()
        .find(|(l, _)| l.occurrence == occurrence)
        .map(|(_, s)| s)
        .ok_or(TranslationError::NotApplicable)
}

/// What a translator computes for one focal source: its codes and the needed positions, in a
/// common index space, plus the shape the source path is read off against.
pub(crate) struct Located {
    pub codes: NdArray<i64>,
    pub needed: NdArray<bool>,
    pub source_shape: Shape,
}

/// Run `locate` for every data source and collect the read-off requirements.
pub(crate) fn backward_each_source(
    call: &SourceCall,
    path: &Path,
    result_shape: &[usize],
    mut locate: impl FnMut(&SourceLocation, &Source, &NdArray<bool>) -> Result<Located, TranslationError>,
) -> Result<Requirements, TranslationError> {
    let (selection, remaining) = select_within(result_shape, path)?;
    let needed = selection.to_mask(result_shape);
    let mut requirements = Requirements::new();
    for (location, source) in call.source_locations() {
        if !location.is_data {
            continue;
        }
        let located = locate(&location, source, &needed)?;
        if located.codes.shape() != located.needed.shape() {
            return Err(TranslationError::NotApplicable);
        }
        if let Some(path) = read_off_backward(
            &located.codes,
            &located.needed,
            selection.is_element(),
            &located.source_shape,
            &remaining,
        ) {
            requirements.require(location.occurrence, path);
        }
    }
    Ok(requirements)
}
