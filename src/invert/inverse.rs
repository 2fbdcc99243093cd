use std::f64::consts::PI;

use crate::error::InversionError;
use crate::value::Scalar;

/// The inverse of an elementwise function with respect to one of its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Inverse {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Negative,
    Exp,
    Log,
    Sqrt,
    Square,
    Abs,
    Sin,
    Cos,
    Tan,
}

fn cannot(value: f64) -> InversionError {
    InversionError::CannotConstruct {
        ty: "number",
        value: value.to_string(),
    }
}

fn both_int(a: Scalar, b: Scalar) -> bool {
    !a.is_float() && !b.is_float()
}

/// Of all `base + period * n` around `previous` (and the same for every base), the closest
/// to `previous`. Ties go to the lower candidate.
fn nearest_periodic(bases: &[f64], period: f64, previous: f64) -> f64 {
    let k = (previous / period).round() as i64;
    let mut best: Option<f64> = None;
    for n in k - 1..=k + 1 {
        for base in bases {
            let candidate = base + period * n as f64;
            best = Some(match best {
                None => candidate,
                Some(b) => {
                    let (db, dc) = ((b - previous).abs(), (candidate - previous).abs());
                    if dc < db || (dc == db && candidate < b) {
                        candidate
                    } else {
                        b
                    }
                }
            });
        }
    }
    best.unwrap_or(bases[0])
}

impl Inverse {
    /// Whether the previous value of the source element changes the answer.
    pub fn needs_previous(self) -> bool {
        matches!(
            self,
            Inverse::Power | Inverse::Square | Inverse::Abs | Inverse::Sin | Inverse::Cos | Inverse::Tan
        )
    }

    /// Solve for the source operand.
    ///
    /// `result` is the new result element, `other` the other operand of a binary function,
    /// `first` whether the source is the first operand, `previous` the source element before
    /// the change.
    pub fn solve(
        self,
        result: Scalar,
        other: Option<Scalar>,
        first: bool,
        previous: Scalar,
    ) -> Result<Scalar, InversionError> {
        let r = result.as_f64();
        let p = previous.as_f64();
        let binary = |other: Option<Scalar>| {
            other.ok_or_else(|| InversionError::CannotConstruct {
                ty: "operand",
                value: "missing".into(),
            })
        };
        let out = match self {
            Inverse::Add => {
                let o = binary(other)?;
                if both_int(result, o) {
                    return Ok(Scalar::Int(result.as_i64().unwrap_or(0) - o.as_i64().unwrap_or(0)));
                }
                r - o.as_f64()
            }
            Inverse::Subtract => {
                let o = binary(other)?;
                if both_int(result, o) {
                    let (r, o) = (result.as_i64().unwrap_or(0), o.as_i64().unwrap_or(0));
                    return Ok(Scalar::Int(if first { r + o } else { o - r }));
                }
                if first {
                    r + o.as_f64()
                } else {
                    o.as_f64() - r
                }
            }
            Inverse::Multiply => {
                let o = binary(other)?.as_f64();
                if o == 0.0 {
                    return Err(cannot(r));
                }
                r / o
            }
            Inverse::Divide => {
                let o = binary(other)?.as_f64();
                if first {
                    r * o
                } else if r == 0.0 {
                    return Err(cannot(r));
                } else {
                    o / r
                }
            }
            Inverse::Power => {
                let o = binary(other)?;
                if first {
                    let exponent = o.as_f64();
                    let magnitude = r.abs().powf(1.0 / exponent);
                    let even = o.as_i64().is_some_and(|e| e % 2 == 0);
                    if even {
                        if r < 0.0 {
                            return Err(cannot(r));
                        }
                        magnitude.copysign(if p < 0.0 { -1.0 } else { 1.0 })
                    } else {
                        magnitude.copysign(r)
                    }
                } else {
                    let base = o.as_f64();
                    if base <= 0.0 || r <= 0.0 {
                        return Err(cannot(r));
                    }
                    r.ln() / base.ln()
                }
            }
            Inverse::Negative => {
                if let Scalar::Int(i) = result {
                    return Ok(Scalar::Int(-i));
                }
                -r
            }
            Inverse::Exp => {
                if r <= 0.0 {
                    return Err(cannot(r));
                }
                r.ln()
            }
            Inverse::Log => r.exp(),
            Inverse::Sqrt => r * r,
            Inverse::Square => {
                if r < 0.0 {
                    return Err(cannot(r));
                }
                r.sqrt().copysign(if p < 0.0 { -1.0 } else { 1.0 })
            }
            Inverse::Abs => {
                if r < 0.0 {
                    return Err(cannot(r));
                }
                r.copysign(if p < 0.0 { -1.0 } else { 1.0 })
            }
            Inverse::Sin => {
                if !(-1.0..=1.0).contains(&r) {
                    return Err(cannot(r));
                }
                let base = r.asin();
                nearest_periodic(&[base, PI - base], 2.0 * PI, p)
            }
            Inverse::Cos => {
                if !(-1.0..=1.0).contains(&r) {
                    return Err(cannot(r));
                }
                let base = r.acos();
                nearest_periodic(&[base, -base], 2.0 * PI, p)
            }
            Inverse::Tan => nearest_periodic(&[r.atan()], PI, p),
        };
        if out.is_finite() {
            Ok(Scalar::Float(out))
        } else {
            Err(cannot(out))
        }
    }
}
