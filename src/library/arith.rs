use crate::array::{zip_with, NdArray};
use crate::error::ShapeError;
use crate::value::{Scalar, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binary {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unary {
    Negative,
    Abs,
    Square,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
}

fn int_of(s: Scalar) -> Option<i64> {
    match s {
        Scalar::Bool(b) => Some(b as i64),
        Scalar::Int(i) => Some(i),
        Scalar::Float(_) => None,
    }
}

impl Binary {
    pub(crate) fn apply(self, a: Scalar, b: Scalar) -> Scalar {
        if let (Some(x), Some(y)) = (int_of(a), int_of(b)) {
            let exact = match self {
                Binary::Add => x.checked_add(y),
                Binary::Subtract => x.checked_sub(y),
                Binary::Multiply => x.checked_mul(y),
                Binary::Divide => None,
                Binary::Power => u32::try_from(y).ok().and_then(|y| x.checked_pow(y)),
            };
            if let Some(exact) = exact {
                return Scalar::Int(exact);
            }
        }
        let (x, y) = (a.as_f64(), b.as_f64());
        Scalar::Float(match self {
            Binary::Add => x + y,
            Binary::Subtract => x - y,
            Binary::Multiply => x * y,
            Binary::Divide => x / y,
            Binary::Power => x.powf(y),
        })
    }
}

impl Unary {
    pub(crate) fn apply(self, a: Scalar) -> Scalar {
        if let Some(i) = int_of(a) {
            let exact = match self {
                Unary::Negative => i.checked_neg(),
                Unary::Abs => i.checked_abs(),
                Unary::Square => i.checked_mul(i),
                _ => None,
            };
            if let Some(exact) = exact {
                return Scalar::Int(exact);
            }
        }
        let x = a.as_f64();
        Scalar::Float(match self {
            Unary::Negative => -x,
            Unary::Abs => x.abs(),
            Unary::Square => x * x,
            Unary::Sqrt => x.sqrt(),
            Unary::Exp => x.exp(),
            Unary::Log => x.ln(),
            Unary::Sin => x.sin(),
            Unary::Cos => x.cos(),
            Unary::Tan => x.tan(),
        })
    }
}

/// Array functions return arrays; plain scalars in give a plain scalar out.
pub(crate) fn array_result(result: NdArray<Scalar>, inputs: &[&Value]) -> Value {
    let any_array = inputs.iter().any(|v| matches!(v, Value::Array(_)));
    if result.ndim() == 0 && !any_array {
        Value::from(result.data()[0])
    } else {
        Value::Array(result)
    }
}

pub(crate) fn binary(op: Binary, a: &Value, b: &Value) -> Result<Value, ShapeError> {
    let out = zip_with(&a.to_array()?, &b.to_array()?, |&x, &y| op.apply(x, y))?;
    Ok(array_result(out, &[a, b]))
}

pub(crate) fn unary(op: Unary, a: &Value) -> Result<Value, ShapeError> {
    let out = a.to_array()?.map(|&x| op.apply(x));
    Ok(array_result(out, &[a]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reduction {
    Sum,
    Prod,
    Min,
    Max,
    Any,
    All,
    Mean,
}

impl Reduction {
    /// Reduce over `axes` (all when `None`).
    pub(crate) fn apply(
        self,
        array: &NdArray<Scalar>,
        axes: Option<&[usize]>,
        keepdims: bool,
        where_: Option<&NdArray<bool>>,
    ) -> Result<NdArray<Scalar>, ShapeError> {
        let fold = |init: Option<Scalar>, f: fn(Scalar, Scalar) -> Scalar| {
            array.fold_axes(axes, keepdims, where_, init, move |acc, &x| {
                Some(match acc {
                    None => x,
                    Some(acc) => f(acc, x),
                })
            })
        };
        let out = match self {
            Reduction::Sum => fold(None, |a, b| Binary::Add.apply(a, b))?
                .map(|s| s.unwrap_or(Scalar::Int(0))),
            Reduction::Prod => fold(None, |a, b| Binary::Multiply.apply(a, b))?
                .map(|s| s.unwrap_or(Scalar::Int(1))),
            Reduction::Min | Reduction::Max => {
                let max = self == Reduction::Max;
                let picked = array.fold_axes(axes, keepdims, where_, None, |acc: Option<Scalar>, &x| {
                    Some(match acc {
                        Some(acc) if (acc.as_f64() >= x.as_f64()) == max => acc,
                        _ => x,
                    })
                })?;
                picked.try_map(|s| {
                    s.ok_or_else(|| ShapeError::Other("zero-size reduction without an identity".into()))
                })?
            }
            Reduction::Any => array
                .fold_axes(axes, keepdims, where_, false, |acc, x| acc || x.truthy())?
                .map(|&b| Scalar::Bool(b)),
            Reduction::All => array
                .fold_axes(axes, keepdims, where_, true, |acc, x| acc && x.truthy())?
                .map(|&b| Scalar::Bool(b)),
            Reduction::Mean => array
                .fold_axes(axes, keepdims, where_, (0.0, 0usize), |(sum, n), x| {
                    (sum + x.as_f64(), n + 1)
                })?
                .map(|&(sum, n)| Scalar::Float(sum / n as f64)),
        };
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Accumulation {
    Sum,
    Prod,
}

impl Accumulation {
    pub(crate) fn apply(
        self,
        array: &NdArray<Scalar>,
        axis: Option<usize>,
    ) -> Result<NdArray<Scalar>, ShapeError> {
        let op = match self {
            Accumulation::Sum => Binary::Add,
            Accumulation::Prod => Binary::Multiply,
        };
        array.accumulate(axis, |&a, &b| op.apply(a, b))
    }
}
