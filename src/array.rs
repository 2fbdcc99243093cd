//! A small row-major n-dimensional array.
//!
//! Generic over the element so the same machinery serves numeric values,
//! validity masks and the index-code arrays the translators run functions on.

use smallvec::{smallvec, SmallVec};
use std::fmt;

use crate::error::{PathError, ShapeError};

mod select;
mod transform;

pub(crate) use select::normalize_index;
pub use select::{AxisIndex, Selection, Slice};

pub type Shape = SmallVec<[usize; 4]>;

#[derive(Clone, PartialEq)]
pub struct NdArray<T> {
    shape: Shape,
    data: Vec<T>,
}

impl<T: fmt::Debug> fmt::Debug for NdArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shape.is_empty() {
            return write!(f, "array({:?})", self.data[0]);
        }
        write!(f, "array(shape={:?}, {:?})", &self.shape[..], self.data)
    }
}

pub fn size_of(shape: &[usize]) -> usize {
    shape.iter().product()
}

pub(crate) fn strides(shape: &[usize]) -> Shape {
    let mut strides: Shape = smallvec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

pub(crate) fn normalize_axis(axis: isize, ndim: usize) -> Result<usize, ShapeError> {
    let n = ndim as isize;
    let normalized = if axis < 0 { axis + n } else { axis };
    if normalized < 0 || normalized >= n {
        return Err(ShapeError::InvalidAxis { axis, ndim });
    }
    Ok(normalized as usize)
}

/// Iterates the multi-indices of a shape in row-major order.
pub(crate) struct MultiIndices {
    shape: Shape,
    next: Option<Shape>,
}

impl MultiIndices {
    pub(crate) fn new(shape: &[usize]) -> Self {
        let next = if shape.iter().any(|&d| d == 0) {
            None
        } else {
            Some(smallvec![0; shape.len()])
        };
        Self {
            shape: shape.into(),
            next,
        }
    }
}

impl Iterator for MultiIndices {
    type Item = Shape;
    fn next(&mut self) -> Option<Shape> {
        let current = self.next.take()?;
        let mut following = current.clone();
        let mut axis = following.len();
        loop {
            if axis == 0 {
                break;
            }
            axis -= 1;
            following[axis] += 1;
            if following[axis] < self.shape[axis] {
                self.next = Some(following);
                break;
            }
            following[axis] = 0;
        }
        Some(current)
    }
}

/// numpy's broadcasting rule for two shapes.
pub fn broadcast_shapes(left: &[usize], right: &[usize]) -> Result<Shape, ShapeError> {
    let ndim = left.len().max(right.len());
    let mut out: Shape = smallvec![0; ndim];
    for i in 0..ndim {
        let l = if i + left.len() >= ndim {
            left[i + left.len() - ndim]
        } else {
            1
        };
        let r = if i + right.len() >= ndim {
            right[i + right.len() - ndim]
        } else {
            1
        };
        out[i] = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => {
                return Err(ShapeError::Incompatible {
                    left: left.to_vec(),
                    right: right.to_vec(),
                })
            }
        };
    }
    Ok(out)
}

impl<T> NdArray<T> {
    pub fn from_shape_vec(shape: impl Into<Shape>, data: Vec<T>) -> Result<Self, ShapeError> {
        let shape = shape.into();
        if size_of(&shape) != data.len() {
            return Err(ShapeError::Reshape {
                size: data.len(),
                shape: shape.iter().map(|&d| d as isize).collect(),
            });
        }
        Ok(Self { shape, data })
    }

    pub(crate) fn from_parts(shape: Shape, data: Vec<T>) -> Self {
        debug_assert_eq!(size_of(&shape), data.len());
        Self { shape, data }
    }

    pub fn scalar(value: T) -> Self {
        Self {
            shape: Shape::new(),
            data: vec![value],
        }
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            shape: smallvec![data.len()],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn ravel_index(&self, index: &[usize]) -> usize {
        let strides = strides(&self.shape);
        index.iter().zip(strides.iter()).map(|(i, s)| i * s).sum()
    }

    pub fn unravel_index(&self, mut flat: usize) -> Shape {
        let strides = strides(&self.shape);
        let mut out: Shape = smallvec![0; self.shape.len()];
        for (axis, stride) in strides.iter().enumerate() {
            out[axis] = flat / stride;
            flat %= stride;
        }
        out
    }

    pub fn get(&self, index: &[usize]) -> Option<&T> {
        if index.len() != self.ndim() || index.iter().zip(&self.shape).any(|(i, d)| i >= d) {
            return None;
        }
        self.data.get(self.ravel_index(index))
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> NdArray<U> {
        NdArray {
            shape: self.shape.clone(),
            data: self.data.iter().map(f).collect(),
        }
    }

    pub fn try_map<U, E>(&self, f: impl FnMut(&T) -> Result<U, E>) -> Result<NdArray<U>, E> {
        Ok(NdArray {
            shape: self.shape.clone(),
            data: self.data.iter().map(f).collect::<Result<_, _>>()?,
        })
    }

    /// Reshape without copying, inferring at most one `-1` dimension.
    pub fn into_shape(self, shape: &[isize]) -> Result<Self, ShapeError> {
        let size = self.data.len();
        let err = || ShapeError::Reshape {
            size,
            shape: shape.to_vec(),
        };
        let mut unknown = None;
        let mut known = 1usize;
        let mut out: Shape = Shape::with_capacity(shape.len());
        for (axis, &d) in shape.iter().enumerate() {
            if d == -1 {
                if unknown.replace(axis).is_some() {
                    return Err(err());
                }
                out.push(0);
            } else if d < 0 {
                return Err(err());
            } else {
                known *= d as usize;
                out.push(d as usize);
            }
        }
        if let Some(axis) = unknown {
            if known == 0 || size % known != 0 {
                return Err(err());
            }
            out[axis] = size / known;
        } else if known != size {
            return Err(err());
        }
        Ok(Self {
            shape: out,
            data: self.data,
        })
    }

    pub fn flatten(self) -> Self {
        let n = self.data.len();
        Self {
            shape: smallvec![n],
            data: self.data,
        }
    }
}

impl<T: Clone> NdArray<T> {
    pub fn from_elem(shape: impl Into<Shape>, value: T) -> Self {
        let shape = shape.into();
        let data = vec![value; size_of(&shape)];
        Self { shape, data }
    }

    /// `out[i] = self[indices[i]]`, shaped as `shape`.
    pub(crate) fn gather(&self, shape: Shape, indices: &[usize]) -> Self {
        debug_assert_eq!(size_of(&shape), indices.len());
        Self {
            shape,
            data: indices.iter().map(|&i| self.data[i].clone()).collect(),
        }
    }

    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self, ShapeError> {
        if self.shape() == shape {
            return Ok(self.clone());
        }
        let target = broadcast_shapes(self.shape(), shape)?;
        if &target[..] != shape {
            return Err(ShapeError::Incompatible {
                left: self.shape.to_vec(),
                right: shape.to_vec(),
            });
        }
        let offset = shape.len() - self.ndim();
        let src_strides = strides(&self.shape);
        let indices: Vec<usize> = MultiIndices::new(shape)
            .map(|out| {
                (0..self.ndim())
                    .map(|axis| {
                        if self.shape[axis] == 1 {
                            0
                        } else {
                            out[axis + offset] * src_strides[axis]
                        }
                    })
                    .sum()
            })
            .collect();
        Ok(self.gather(shape.into(), &indices))
    }

    pub fn reshape(&self, shape: &[isize]) -> Result<Self, ShapeError> {
        self.clone().into_shape(shape)
    }

    /// Fold over `axes` (all axes when `None`), skipping elements masked out by `where_`.
    pub fn fold_axes<U: Clone>(
        &self,
        axes: Option<&[usize]>,
        keepdims: bool,
        where_: Option<&NdArray<bool>>,
        init: U,
        mut f: impl FnMut(U, &T) -> U,
    ) -> Result<NdArray<U>, ShapeError> {
        let reduced: SmallVec<[bool; 4]> = match axes {
            None => smallvec![true; self.ndim()],
            Some(axes) => {
                let mut reduced: SmallVec<[bool; 4]> = smallvec![false; self.ndim()];
                for &axis in axes {
                    if axis >= self.ndim() {
                        return Err(ShapeError::InvalidAxis {
                            axis: axis as isize,
                            ndim: self.ndim(),
                        });
                    }
                    reduced[axis] = true;
                }
                reduced
            }
        };
        let where_ = match where_ {
            Some(mask) => Some(mask.broadcast_to(self.shape())?),
            None => None,
        };
        let kept_shape: Shape = self
            .shape
            .iter()
            .zip(&reduced)
            .map(|(&d, &r)| if r { 1 } else { d })
            .collect();
        let kept_strides = strides(&kept_shape);
        let mut acc = vec![init; size_of(&kept_shape)];
        for (flat, index) in MultiIndices::new(&self.shape).enumerate() {
            if let Some(mask) = &where_ {
                if !mask.data[flat] {
                    continue;
                }
            }
            let out: usize = index
                .iter()
                .zip(&reduced)
                .zip(&kept_strides)
                .map(|((&i, &r), &s)| if r { 0 } else { i * s })
                .sum();
            let prev = acc[out].clone();
            acc[out] = f(prev, &self.data[flat]);
        }
        let shape = if keepdims {
            kept_shape
        } else {
            self.shape
                .iter()
                .zip(&reduced)
                .filter(|(_, r)| !**r)
                .map(|(&d, _)| d)
                .collect()
        };
        Ok(NdArray::from_parts(shape, acc))
    }

    /// Running combination along `axis`. With no axis the array is flattened first.
    pub fn accumulate(
        &self,
        axis: Option<usize>,
        mut f: impl FnMut(&T, &T) -> T,
    ) -> Result<Self, ShapeError> {
        let (mut out, axis) = match axis {
            None => (self.clone().flatten(), 0),
            Some(axis) if axis < self.ndim() => (self.clone(), axis),
            Some(axis) => {
                return Err(ShapeError::InvalidAxis {
                    axis: axis as isize,
                    ndim: self.ndim(),
                })
            }
        };
        let stride = strides(&out.shape)[axis];
        let indices: Vec<Shape> = MultiIndices::new(&out.shape).collect();
        for (flat, index) in indices.iter().enumerate() {
            if index[axis] > 0 {
                let combined = f(&out.data[flat - stride], &out.data[flat]);
                out.data[flat] = combined;
            }
        }
        Ok(out)
    }
}

impl NdArray<bool> {
    pub fn any(&self) -> bool {
        self.data.iter().any(|&b| b)
    }

    pub fn all(&self) -> bool {
        self.data.iter().all(|&b| b)
    }

    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    pub fn any_axes(&self, axes: &[usize], keepdims: bool) -> Result<Self, ShapeError> {
        self.fold_axes(Some(axes), keepdims, None, false, |acc, &b| acc || b)
    }

    pub fn and(&self, other: &Self) -> Result<Self, ShapeError> {
        zip_with(self, other, |&a, &b| a && b)
    }

    pub fn or(&self, other: &Self) -> Result<Self, ShapeError> {
        zip_with(self, other, |&a, &b| a || b)
    }

    /// `self & !other`, for equal shapes.
    pub(crate) fn zip_and_not(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (a, &b) in out.data.iter_mut().zip(other.data.iter()) {
            *a = *a && !b;
        }
        out
    }

    /// Reduce `self` to `shape` (or broadcast up to it), the way a gradient is un-broadcast:
    /// added leading axes and size-1-broadcast axes collapse with `any`.
    pub fn unbroadcast_or_broadcast(&self, shape: &[usize]) -> Result<Self, ShapeError> {
        if let Ok(target) = broadcast_shapes(self.shape(), shape) {
            if &target[..] == shape {
                return self.broadcast_to(shape);
            }
        }
        if self.ndim() < shape.len() {
            return Err(ShapeError::Incompatible {
                left: self.shape.to_vec(),
                right: shape.to_vec(),
            });
        }
        let extra = self.ndim() - shape.len();
        let leading: Vec<usize> = (0..extra).collect();
        let mut reduced = if leading.is_empty() {
            self.clone()
        } else {
            self.any_axes(&leading, false)?
        };
        let collapse: Vec<usize> = shape
            .iter()
            .enumerate()
            .filter(|&(axis, &d)| d == 1 && reduced.shape[axis] != 1)
            .map(|(axis, _)| axis)
            .collect();
        if !collapse.is_empty() {
            reduced = reduced.any_axes(&collapse, true)?;
        }
        reduced.broadcast_to(shape)
    }
}

impl NdArray<usize> {
    pub fn arange(shape: &[usize]) -> Self {
        let n = size_of(shape);
        NdArray::from_parts(shape.into(), (0..n).collect())
    }
}

pub fn zip_with<A: Clone, B: Clone, C>(
    left: &NdArray<A>,
    right: &NdArray<B>,
    mut f: impl FnMut(&A, &B) -> C,
) -> Result<NdArray<C>, ShapeError> {
    let shape = broadcast_shapes(left.shape(), right.shape())?;
    let l = left.broadcast_to(&shape)?;
    let r = right.broadcast_to(&shape)?;
    let data = l.data.iter().zip(&r.data).map(|(a, b)| f(a, b)).collect();
    Ok(NdArray::from_parts(shape, data))
}

impl<T: Clone> NdArray<T> {
    /// Read the elements addressed by a selection.
    pub fn take(&self, selection: &Selection) -> Self {
        self.gather(selection.shape.clone(), &selection.flat)
    }

    /// Write `values` (broadcast to the selection's shape) into the selected elements.
    pub fn put(&mut self, selection: &Selection, values: &NdArray<T>) -> Result<(), PathError> {
        let values = if values.len() == selection.flat.len() && values.ndim() != 0 {
            values.clone()
        } else {
            values.broadcast_to(&selection.shape)?
        };
        for (&flat, value) in selection.flat.iter().zip(values.data) {
            self.data[flat] = value;
        }
        Ok(())
    }
}
