use crate::call::Arg;
use crate::error::InversionError;
use crate::path::{Component, Path, PathComponent};
use crate::runner::{RunCondition, Strategy};
use crate::source::{Source, SourceCall};
use crate::value::Value;

use super::{unsupported, Assignment, Inversal, Inverter};

fn first_source(call: &SourceCall) -> Result<&Source, InversionError> {
    match call.data_arguments().first().map(|d| d.arg) {
        Some(Arg::Source(source)) => Ok(source),
        _ => Err(InversionError::NoDataSource {
            function: call.name().clone(),
        }),
    }
}

/// `container[item]` on maps and sequences: the assignment moves one level up.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetItemInverter;

impl Strategy for GetItemInverter {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::ALL
    }
}

impl Inverter for GetItemInverter {
    fn invert(
        &self,
        call: &SourceCall,
        assignment: &Assignment,
        _previous: &Value,
    ) -> Result<Vec<Inversal>, InversionError> {
        let source = first_source(call)?;
        let item = call
            .param("item")
            .ok_or_else(|| unsupported(&assignment.path))?;
        let component = match Component::from_value(&item) {
            Some(c @ (Component::Key(_) | Component::Index(_))) => c,
            _ => return Err(unsupported(&assignment.path)),
        };
        if let Ok(Value::Array(_) | Value::Record(_)) = source.value() {
            if !matches!(component, Component::Index(_)) {
                return Err(unsupported(&assignment.path));
            }
        }
        let path = Path::from(vec![PathComponent::new(component)]).join(&assignment.path);
        Ok(vec![Inversal {
            occurrence: source.occurrence,
            assignment: Assignment {
                path,
                value: assignment.value.clone(),
            },
        }])
    }
}

/// `to_int`, `to_float`, `to_str`: rebuild the source's own type from the assigned value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CastingInverter;

impl Strategy for CastingInverter {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::METADATA
    }
}

fn construct_like(original: &Value, value: &Value) -> Result<Value, InversionError> {
    let fail = || InversionError::CannotConstruct {
        ty: original.type_name(),
        value: format!("{value:?}"),
    };
    let text = value.as_str().map(str::trim);
    Ok(match original {
        Value::Int(_) => match (value, text) {
            (_, Some(s)) => Value::Int(s.parse().map_err(|_| fail())?),
            (Value::Float(f), _) if f.fract() == 0.0 && f.is_finite() => Value::Int(*f as i64),
            (Value::Float(_), _) => return Err(fail()),
            _ => Value::Int(value.as_i64().ok_or_else(fail)?),
        },
        Value::Float(_) => match text {
            Some(s) => Value::Float(s.parse().map_err(|_| fail())?),
            None => Value::Float(value.as_f64().ok_or_else(fail)?),
        },
        Value::Bool(_) => match (value, text) {
            (_, Some("True" | "true")) => Value::Bool(true),
            (_, Some("False" | "false")) => Value::Bool(false),
            (Value::Int(0), _) => Value::Bool(false),
            (Value::Int(1), _) => Value::Bool(true),
            (Value::Bool(b), _) => Value::Bool(*b),
            _ => return Err(fail()),
        },
        Value::Str(_) => match value {
            Value::Str(s) => Value::Str(s.clone()),
            Value::Int(i) => Value::from(i.to_string()),
            Value::Float(f) => Value::from(f.to_string()),
            Value::Bool(b) => Value::from(if *b { "True" } else { "False" }),
            _ => return Err(fail()),
        },
        _ => return Err(fail()),
    })
}

impl Inverter for CastingInverter {
    fn invert(
        &self,
        call: &SourceCall,
        assignment: &Assignment,
        _previous: &Value,
    ) -> Result<Vec<Inversal>, InversionError> {
        if !assignment.path.is_root() {
            return Err(unsupported(&assignment.path));
        }
        let source = first_source(call)?;
        let value = construct_like(source.value()?, &assignment.value)?;
        Ok(vec![Inversal {
            occurrence: source.occurrence,
            assignment: Assignment {
                path: Path::root(),
                value,
            },
        }])
    }
}

/// Passes assignments through to its argument unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyInverter;

impl Strategy for ProxyInverter {
    fn run_conditions(&self) -> &'static [RunCondition] {
        &[RunCondition::NoMetadata]
    }
}

impl Inverter for ProxyInverter {
    fn invert(
        &self,
        call: &SourceCall,
        assignment: &Assignment,
        _previous: &Value,
    ) -> Result<Vec<Inversal>, InversionError> {
        let source = first_source(call)?;
        Ok(vec![Inversal {
            occurrence: source.occurrence,
            assignment: assignment.clone(),
        }])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path;
    use crate::test_support::call_of;
    use test_log::test;

    #[test]
    fn getitem_moves_up_a_level() {
        let call = call_of(
            "getitem",
            vec![Arg::Source(Source::unknown(0)), Arg::Const(Value::from("x"))],
        );
        let inversals = GetItemInverter
            .invert(&call, &Assignment::new(path![2], 5), &Value::None)
            .unwrap();
        assert_eq!(inversals[0].assignment.path, path!["x", 2]);
        assert_eq!(inversals[0].assignment.value, Value::Int(5));
    }

    #[test]
    fn casts_rebuild_the_source_type() {
        assert_eq!(
            construct_like(&Value::from("3"), &Value::Int(7)),
            Ok(Value::from("7"))
        );
        assert_eq!(
            construct_like(&Value::Int(3), &Value::from(" 12 ")),
            Ok(Value::Int(12))
        );
        assert_eq!(
            construct_like(&Value::Float(1.5), &Value::Int(2)),
            Ok(Value::Float(2.0))
        );
        assert!(construct_like(&Value::Int(3), &Value::from("abc")).is_err());
        assert!(construct_like(&Value::Int(3), &Value::Float(2.5)).is_err());
    }

    #[test]
    fn casting_needs_the_whole_value() {
        let call = call_of("to_str", vec![Arg::Source(Source::known(0, Value::Int(1)))]);
        assert!(CastingInverter
            .invert(&call, &Assignment::new(path![0], "2"), &Value::from("1"))
            .is_err());
        let inversals = CastingInverter
            .invert(&call, &Assignment::new(path![], "42"), &Value::from("1"))
            .unwrap();
        assert_eq!(inversals[0].assignment.value, Value::Int(42));
    }
}
