use smallvec::smallvec;
use std::fmt;

use super::{strides, NdArray, Shape};
use crate::error::PathError;

/// Python-style slice bounds. Negative values count from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Slice {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: Option<isize>,
}

impl Slice {
    pub fn new(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> Self {
        Self { start, stop, step }
    }

    pub fn full() -> Self {
        Self::default()
    }

    /// The positions this slice picks from a sequence of length `len`.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        let len = len as isize;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Vec::new();
        }
        let clamp = |bound: Option<isize>, default: isize, lo: isize, hi: isize| match bound {
            None => default,
            Some(b) if b < 0 => (b + len).max(lo),
            Some(b) => b.min(hi),
        };
        let mut out = Vec::new();
        if step > 0 {
            let start = clamp(self.start, 0, 0, len);
            let stop = clamp(self.stop, len, 0, len);
            let mut i = start;
            while i < stop {
                out.push(i as usize);
                i += step;
            }
        } else {
            let start = clamp(self.start, len - 1, -1, len - 1);
            let stop = clamp(self.stop, -1, -1, len - 1);
            let mut i = start;
            while i > stop {
                out.push(i as usize);
                i += step;
            }
        }
        out
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |b: Option<isize>| b.map(|b| b.to_string()).unwrap_or_default();
        write!(f, "{}:{}", show(self.start), show(self.stop))?;
        if let Some(step) = self.step {
            write!(f, ":{step}")?;
        }
        Ok(())
    }
}

/// One entry of a tuple index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisIndex {
    Index(isize),
    Slice(Slice),
}

impl fmt::Display for AxisIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisIndex::Index(i) => write!(f, "{i}"),
            AxisIndex::Slice(s) => write!(f, "{s}"),
        }
    }
}

pub(crate) fn normalize_index(index: isize, len: usize) -> Result<usize, PathError> {
    let normalized = if index < 0 {
        index + len as isize
    } else {
        index
    };
    if normalized < 0 || normalized >= len as isize {
        return Err(PathError::OutOfRange { index, len });
    }
    Ok(normalized as usize)
}

/// The linear positions a component picks out of an array, and the shape they form.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub shape: Shape,
    pub flat: Vec<usize>,
}

impl Selection {
    /// A selection that indexes every axis down to a single element.
    pub fn is_element(&self) -> bool {
        self.shape.is_empty()
    }

    pub fn to_mask(&self, shape: &[usize]) -> NdArray<bool> {
        let mut mask = NdArray::from_elem(shape, false);
        for &flat in &self.flat {
            mask.data[flat] = true;
        }
        mask
    }
}

impl<T> NdArray<T> {
    pub fn select_all(&self) -> Selection {
        Selection {
            shape: self.shape.clone(),
            flat: (0..self.len()).collect(),
        }
    }

    /// Basic indexing with integers and slices over the leading axes.
    pub fn select_axes(&self, items: &[AxisIndex]) -> Result<Selection, PathError> {
        if items.len() > self.ndim() {
            return Err(PathError::InvalidComponent {
                component: format!("{items:?}"),
                ty: "array of lower dimension",
            });
        }
        let mut choices: Vec<Vec<usize>> = Vec::with_capacity(self.ndim());
        let mut shape = Shape::new();
        for (axis, &len) in self.shape.iter().enumerate() {
            match items.get(axis) {
                Some(AxisIndex::Index(i)) => choices.push(vec![normalize_index(*i, len)?]),
                Some(AxisIndex::Slice(s)) => {
                    let picked = s.indices(len);
                    shape.push(picked.len());
                    choices.push(picked);
                }
                None => {
                    shape.push(len);
                    choices.push((0..len).collect());
                }
            }
        }
        let strides = strides(&self.shape);
        let mut flat = Vec::new();
        if choices.iter().all(|c| !c.is_empty()) {
            let mut cursor: Shape = smallvec![0; choices.len()];
            loop {
                flat.push(
                    cursor
                        .iter()
                        .enumerate()
                        .map(|(axis, &c)| choices[axis][c] * strides[axis])
                        .sum(),
                );
                let mut axis = choices.len();
                loop {
                    if axis == 0 {
                        return Ok(Selection { shape, flat });
                    }
                    axis -= 1;
                    cursor[axis] += 1;
                    if cursor[axis] < choices[axis].len() {
                        break;
                    }
                    cursor[axis] = 0;
                }
            }
        }
        Ok(Selection { shape, flat })
    }

    /// Boolean indexing. The mask covers the leading axes.
    pub fn select_mask(&self, mask: &NdArray<bool>) -> Result<Selection, PathError> {
        let leading = mask.ndim();
        if leading > self.ndim() || mask.shape() != &self.shape[..leading] {
            return Err(PathError::InvalidComponent {
                component: format!("mask of shape {:?}", mask.shape()),
                ty: "array of a different shape",
            });
        }
        let inner: usize = self.shape[leading..].iter().product();
        let mut flat = Vec::new();
        let mut count = 0;
        for (position, &chosen) in mask.data.iter().enumerate() {
            if chosen {
                count += 1;
                flat.extend(position * inner..(position + 1) * inner);
            }
        }
        let mut shape: Shape = smallvec![count];
        shape.extend_from_slice(&self.shape[leading..]);
        Ok(Selection { shape, flat })
    }
}
