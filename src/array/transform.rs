//! Structural rearrangements. Each one is a gather, so they work for any element type.

use smallvec::smallvec;

use super::{normalize_axis, size_of, strides, MultiIndices, NdArray, Shape};
use crate::error::ShapeError;

impl<T: Clone> NdArray<T> {
    pub fn transpose(&self, axes: Option<&[usize]>) -> Result<Self, ShapeError> {
        let ndim = self.ndim();
        let axes: Vec<usize> = match axes {
            Some(axes) => {
                let mut seen = vec![false; ndim];
                if axes.len() != ndim {
                    return Err(ShapeError::Other(format!(
                        "axes {axes:?} don't match an array of dimension {ndim}"
                    )));
                }
                for &axis in axes {
                    if axis >= ndim || std::mem::replace(&mut seen[axis], true) {
                        return Err(ShapeError::InvalidAxis {
                            axis: axis as isize,
                            ndim,
                        });
                    }
                }
                axes.to_vec()
            }
            None => (0..ndim).rev().collect(),
        };
        let shape: Shape = axes.iter().map(|&a| self.shape[a]).collect();
        let src = strides(&self.shape);
        let indices: Vec<usize> = MultiIndices::new(&shape)
            .map(|out| {
                out.iter()
                    .zip(&axes)
                    .map(|(&i, &axis)| i * src[axis])
                    .sum()
            })
            .collect();
        Ok(self.gather(shape, &indices))
    }

    pub(crate) fn swap_axes(&self, a: usize, b: usize) -> Result<Self, ShapeError> {
        let mut axes: Vec<usize> = (0..self.ndim()).collect();
        axes.swap(a, b);
        self.transpose(Some(&axes))
    }

    /// Reverse the order of elements along `axis`, or along every axis.
    pub fn flip(&self, axis: Option<usize>) -> Result<Self, ShapeError> {
        let flipped: Vec<bool> = match axis {
            None => vec![true; self.ndim()],
            Some(axis) if axis < self.ndim() => (0..self.ndim()).map(|a| a == axis).collect(),
            Some(axis) => {
                return Err(ShapeError::InvalidAxis {
                    axis: axis as isize,
                    ndim: self.ndim(),
                })
            }
        };
        let src = strides(&self.shape);
        let indices: Vec<usize> = MultiIndices::new(&self.shape)
            .map(|out| {
                (0..self.ndim())
                    .map(|a| {
                        let i = if flipped[a] {
                            self.shape[a] - 1 - out[a]
                        } else {
                            out[a]
                        };
                        i * src[a]
                    })
                    .sum()
            })
            .collect();
        Ok(self.gather(self.shape.clone(), &indices))
    }

    /// Rotate by 90 degrees `k` times in the plane of `axes`, counter-clockwise for positive `k`.
    pub fn rot90(&self, k: i64, axes: (usize, usize)) -> Result<Self, ShapeError> {
        let (a0, a1) = axes;
        if self.ndim() < 2 || a0 == a1 || a0 >= self.ndim() || a1 >= self.ndim() {
            return Err(ShapeError::Other(format!(
                "cannot rotate an array of dimension {} in axes {axes:?}",
                self.ndim()
            )));
        }
        match k.rem_euclid(4) {
            0 => Ok(self.clone()),
            1 => self.flip(Some(a1))?.swap_axes(a0, a1),
            2 => self.flip(Some(a0))?.flip(Some(a1)),
            _ => self.swap_axes(a0, a1)?.flip(Some(a1)),
        }
    }

    pub fn expand_dims(&self, axis: isize) -> Result<Self, ShapeError> {
        let axis = normalize_axis(axis, self.ndim() + 1)?;
        let mut shape = self.shape.clone();
        shape.insert(axis, 1);
        Ok(NdArray::from_parts(shape, self.data.clone()))
    }

    /// Join arrays of equal dimension along an existing axis.
    pub fn concatenate(arrays: &[Self], axis: usize) -> Result<Self, ShapeError> {
        let first = arrays
            .first()
            .ok_or_else(|| ShapeError::Other("need at least one array to concatenate".into()))?;
        let ndim = first.ndim();
        if axis >= ndim {
            return Err(ShapeError::InvalidAxis {
                axis: axis as isize,
                ndim,
            });
        }
        let mut shape = first.shape.clone();
        shape[axis] = 0;
        for array in arrays {
            let compatible = array.ndim() == ndim
                && (0..ndim).all(|a| a == axis || array.shape[a] == first.shape[a]);
            if !compatible {
                return Err(ShapeError::Incompatible {
                    left: first.shape.to_vec(),
                    right: array.shape.to_vec(),
                });
            }
            shape[axis] += array.shape[axis];
        }
        let outer: usize = first.shape[..axis].iter().product();
        let mut data = Vec::with_capacity(size_of(&shape));
        for o in 0..outer {
            for array in arrays {
                let chunk: usize = array.shape[axis..].iter().product();
                data.extend_from_slice(&array.data[o * chunk..(o + 1) * chunk]);
            }
        }
        Ok(NdArray::from_parts(shape, data))
    }

    /// Join arrays of equal shape along a new leading axis.
    pub fn stack(arrays: &[Self]) -> Result<Self, ShapeError> {
        let inner: Shape = match arrays.first() {
            Some(first) => first.shape.clone(),
            None => Shape::new(),
        };
        let mut data = Vec::with_capacity(arrays.len() * size_of(&inner));
        for array in arrays {
            if array.shape != inner {
                return Err(ShapeError::NotRectangular);
            }
            data.extend_from_slice(&array.data);
        }
        let mut shape: Shape = smallvec![arrays.len()];
        shape.extend_from_slice(&inner);
        Ok(NdArray::from_parts(shape, data))
    }

    pub fn tile(&self, reps: &[usize]) -> Self {
        let ndim = self.ndim().max(reps.len());
        let pad = |v: &[usize]| -> Shape {
            let mut padded: Shape = smallvec![1; ndim - v.len()];
            padded.extend_from_slice(v);
            padded
        };
        let src_shape = pad(&self.shape);
        let reps = pad(reps);
        let shape: Shape = src_shape.iter().zip(&reps).map(|(d, r)| d * r).collect();
        let src = strides(&src_shape);
        let indices: Vec<usize> = MultiIndices::new(&shape)
            .map(|out| {
                (0..ndim)
                    .map(|a| (out[a] % src_shape[a]) * src[a])
                    .sum()
            })
            .collect();
        self.gather(shape, &indices)
    }

    /// Repeat each element `repeats` times along `axis`, flattening first when there is none.
    pub fn repeat(&self, repeats: usize, axis: Option<usize>) -> Result<Self, ShapeError> {
        let (source, axis) = match axis {
            None => (self.clone().flatten(), 0),
            Some(axis) if axis < self.ndim() => (self.clone(), axis),
            Some(axis) => {
                return Err(ShapeError::InvalidAxis {
                    axis: axis as isize,
                    ndim: self.ndim(),
                })
            }
        };
        let mut shape = source.shape.clone();
        shape[axis] *= repeats;
        let src = strides(&source.shape);
        let indices: Vec<usize> = MultiIndices::new(&shape)
            .map(|out| {
                (0..shape.len())
                    .map(|a| {
                        let i = if a == axis { out[a] / repeats } else { out[a] };
                        i * src[a]
                    })
                    .sum()
            })
            .collect();
        Ok(source.gather(shape, &indices))
    }
}
