//! Constraints that shape the values assigned into a node before they are stored.

use crate::error::TemplateError;
use crate::value::{Scalar, Value};

/// Fits assigned numbers to a range, casting them to the template's number type.
///
/// Containers are fitted element by element. Anything that is not a number is rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignmentTemplate {
    /// Clamp into `[min, max]`.
    Bound { min: Scalar, max: Scalar },
    /// Snap to the nearest `start + k * step` that lies in `[start, stop]`.
    Range {
        start: Scalar,
        stop: Scalar,
        step: Scalar,
    },
}

fn same_kind(scalars: &[Scalar]) -> Result<(), TemplateError> {
    let numeric = scalars.iter().all(|s| !matches!(s, Scalar::Bool(_)));
    let floats = scalars.iter().filter(|s| s.is_float()).count();
    if !numeric || (floats != 0 && floats != scalars.len()) {
        return Err(TemplateError::MixedTypes);
    }
    Ok(())
}

/// Decimal places needed to write `x` exactly, up to 15.
fn decimals(x: f64) -> i32 {
    (0..15)
        .find(|&d| {
            let scaled = x * 10f64.powi(d);
            (scaled - scaled.round()).abs() < 1e-9
        })
        .unwrap_or(15)
}

impl AssignmentTemplate {
    pub fn bound(min: impl Into<Scalar>, max: impl Into<Scalar>) -> Result<Self, TemplateError> {
        let (min, max) = (min.into(), max.into());
        same_kind(&[min, max])?;
        if max.as_f64() < min.as_f64() {
            return Err(TemplateError::MaxBelowMin { min, max });
        }
        Ok(AssignmentTemplate::Bound { min, max })
    }

    pub fn range(
        start: impl Into<Scalar>,
        stop: impl Into<Scalar>,
        step: impl Into<Scalar>,
    ) -> Result<Self, TemplateError> {
        let (start, stop, step) = (start.into(), stop.into(), step.into());
        same_kind(&[start, stop, step])?;
        if stop.as_f64() < start.as_f64() {
            return Err(TemplateError::StopBelowStart { start, stop });
        }
        if step.as_f64() <= 0.0 {
            return Err(TemplateError::NonPositiveStep(step));
        }
        Ok(AssignmentTemplate::Range { start, stop, step })
    }

    fn integral(&self) -> bool {
        match self {
            AssignmentTemplate::Bound { min, .. } => !min.is_float(),
            AssignmentTemplate::Range { start, .. } => !start.is_float(),
        }
    }

    fn fit_scalar(&self, x: Scalar) -> Scalar {
        let x = x.as_f64();
        let fitted = match *self {
            AssignmentTemplate::Bound { min, max } => x.clamp(min.as_f64(), max.as_f64()),
            AssignmentTemplate::Range { start, stop, step } => {
                let (start, stop, step) = (start.as_f64(), stop.as_f64(), step.as_f64());
                let steps = ((x - start) / step).round();
                let max_steps = ((stop - start) / step).floor();
                let value = start + steps.clamp(0.0, max_steps) * step;
                let places = decimals(start).max(decimals(stop)).max(decimals(step));
                let scale = 10f64.powi(places);
                (value * scale).round() / scale
            }
        };
        if self.integral() {
            Scalar::Int(fitted.round() as i64)
        } else {
            Scalar::Float(fitted)
        }
    }

    /// The value as it will be stored.
    pub fn convert(&self, value: &Value) -> Result<Value, TemplateError> {
        Ok(match value {
            Value::Bool(b) => Value::from(self.fit_scalar(Scalar::Bool(*b))),
            Value::Int(i) => Value::from(self.fit_scalar(Scalar::Int(*i))),
            Value::Float(x) => Value::from(self.fit_scalar(Scalar::Float(*x))),
            Value::Array(array) => Value::Array(array.map(|&s| self.fit_scalar(s))),
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|v| self.convert(v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Tuple(items) => Value::Tuple(
                items
                    .iter()
                    .map(|v| self.convert(v))
                    .collect::<Result<_, _>>()?,
            ),
            other => return Err(TemplateError::InvalidType(other.type_name())),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn bounds_clamp_and_cast() {
        let template = AssignmentTemplate::bound(0, 10).unwrap();
        assert_eq!(template.convert(&Value::Int(12)), Ok(Value::Int(10)));
        assert_eq!(template.convert(&Value::Float(3.6)), Ok(Value::Int(4)));
        assert_eq!(
            template.convert(&Value::from(vec![-3, 5])),
            Ok(Value::from(vec![0, 5]))
        );
    }

    #[test]
    fn ranges_snap_to_steps() {
        let template = AssignmentTemplate::range(0, 100, 10).unwrap();
        assert_eq!(template.convert(&Value::Int(34)), Ok(Value::Int(30)));
        assert_eq!(template.convert(&Value::Int(36)), Ok(Value::Int(40)));
        assert_eq!(template.convert(&Value::Int(1000)), Ok(Value::Int(100)));

        let fine = AssignmentTemplate::range(0.0, 1.0, 0.01).unwrap();
        assert_eq!(fine.convert(&Value::Float(2f64.ln())), Ok(Value::Float(0.69)));

        // 7 is not reachable from 0 in steps of 2
        let odd = AssignmentTemplate::range(0, 7, 2).unwrap();
        assert_eq!(odd.convert(&Value::Int(7)), Ok(Value::Int(6)));
    }

    #[test]
    fn invalid_templates() {
        assert_eq!(
            AssignmentTemplate::bound(5, 1),
            Err(TemplateError::MaxBelowMin {
                min: Scalar::Int(5),
                max: Scalar::Int(1)
            })
        );
        assert_eq!(
            AssignmentTemplate::range(0, 1.0, 0.5),
            Err(TemplateError::MixedTypes)
        );
        assert!(AssignmentTemplate::range(0, 10, 0).is_err());
        let template = AssignmentTemplate::bound(0.0, 1.0).unwrap();
        assert_eq!(
            template.convert(&Value::from("x")),
            Err(TemplateError::InvalidType("str"))
        );
    }
}
