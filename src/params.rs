//! Reading numeric parameters (axes, shapes, repeat counts) out of argument values.

use crate::array::{normalize_axis, NdArray};
use crate::error::ShapeError;
use crate::value::Value;

fn not_int(value: &Value) -> ShapeError {
    ShapeError::Other(format!("expected an integer, got {value:?}"))
}

pub fn int(value: &Value) -> Result<i64, ShapeError> {
    match value {
        Value::Bool(_) | Value::Float(_) => Err(not_int(value)),
        other => other.as_i64().ok_or_else(|| not_int(other)),
    }
}

/// An integer or a sequence of integers.
pub fn int_list(value: &Value) -> Result<Vec<i64>, ShapeError> {
    match value {
        Value::List(items) | Value::Tuple(items) => items.iter().map(int).collect(),
        Value::Array(a) if a.ndim() == 1 => a
            .iter()
            .map(|s| s.as_i64().ok_or_else(|| not_int(value)))
            .collect(),
        other => Ok(vec![int(other)?]),
    }
}

pub fn usize_list(value: &Value) -> Result<Vec<usize>, ShapeError> {
    int_list(value)?
        .into_iter()
        .map(|i| usize::try_from(i).map_err(|_| ShapeError::Other(format!("{i} is negative"))))
        .collect()
}

/// `None`, one axis or several, normalized against `ndim`.
pub fn axes(value: Option<&Value>, ndim: usize) -> Result<Option<Vec<usize>>, ShapeError> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(v) => int_list(v)?
            .into_iter()
            .map(|a| normalize_axis(a as isize, ndim))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
    }
}

pub fn axis(value: Option<&Value>, ndim: usize) -> Result<Option<usize>, ShapeError> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(v) => normalize_axis(int(v)? as isize, ndim).map(Some),
    }
}

pub fn flag(value: Option<&Value>) -> bool {
    value.and_then(Value::as_scalar).is_some_and(|s| s.truthy())
}

/// A boolean mask parameter, such as the `where` of a reduction.
pub fn mask(value: Option<&Value>) -> Result<Option<NdArray<bool>>, ShapeError> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(v) => Ok(Some(v.to_array()?.map(|s| s.truthy()))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn axes_normalize() {
        assert_eq!(axes(Some(&Value::Int(-1)), 3), Ok(Some(vec![2])));
        assert_eq!(axes(Some(&Value::from(vec![0, 1])), 2), Ok(Some(vec![0, 1])));
        assert_eq!(axes(Some(&Value::None), 2), Ok(None));
        assert!(axes(Some(&Value::Int(4)), 2).is_err());
    }

    #[test]
    fn lists() {
        assert_eq!(int_list(&Value::Int(3)), Ok(vec![3]));
        assert_eq!(usize_list(&Value::tuple([2, 3])), Ok(vec![2, 3]));
        assert!(usize_list(&Value::from(vec![-1])).is_err());
        assert!(int(&Value::Float(1.0)).is_err());
    }
}
