use crate::array::NdArray;
use crate::call::{Arg, SourceLocation};
use crate::error::{InversionError, TranslationError};
use crate::runner::{RunCondition, Strategy};
use crate::source::{ResultMeta, Source, SourceCall};
use crate::translate::codes;
use crate::value::{Scalar, Value};

use super::{spread, unsupported, Assignment, Inversal, Inverse, Inverter, Scatter};

/// Inverts unary and binary elementwise functions through their inverse function.
#[derive(Debug, Clone, Copy)]
pub struct ElementwiseInverter(pub Inverse);

impl Strategy for ElementwiseInverter {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::METADATA
    }
}

impl ElementwiseInverter {
    /// The data source to change: one in the first data argument if there is one, else the
    /// second. Returns the source, its location and its data-argument position.
    fn choose(call: &SourceCall) -> Result<(SourceLocation, &Source, usize), InversionError> {
        let data = call.data_arguments();
        let locations = call.source_locations();
        for (position, argument) in data.iter().enumerate().take(2) {
            if let Some((location, source)) = locations
                .iter()
                .find(|(l, _)| l.is_data && argument.contains(l))
            {
                return Ok((location.clone(), *source, position));
            }
        }
        Err(InversionError::NoDataSource {
            function: call.name().clone(),
        })
    }
}

fn operand(arg: &Arg<Source>, shape: &[usize]) -> Result<NdArray<Scalar>, InversionError> {
    let value = arg.to_value().ok_or(TranslationError::MetadataUnknown)?;
    Ok(value.to_array()?.broadcast_to(shape)?)
}

impl Inverter for ElementwiseInverter {
    fn invert(
        &self,
        call: &SourceCall,
        assignment: &Assignment,
        previous: &Value,
    ) -> Result<Vec<Inversal>, InversionError> {
        // Operators also concatenate and repeat sequences, which have no inverse function.
        if call.definition.flags.operator && !ResultMeta::of(previous).is_numeric_or_array() {
            return Err(TranslationError::NotApplicable.into());
        }
        let (location, source, position) = Self::choose(call)?;
        let data = call.data_arguments();
        let shape = previous.shape();
        let (selection, remaining) = codes::select_within(&shape, &assignment.path)?;
        if !remaining.is_root() {
            return Err(unsupported(&assignment.path));
        }
        let new_values = spread(&assignment.value, &selection)?;
        let focal = codes::arg_codes(data[position].arg, location.occurrence)?.broadcast_to(&shape)?;
        let other = match data.len() {
            1 => None,
            _ => Some(operand(data[1 - position].arg, &shape)?),
        };
        let mut scatter = Scatter::new(source)?;
        for (&flat, &new) in selection.flat.iter().zip(&new_values) {
            let code = focal.data()[flat];
            if !codes::is_focal(code) {
                continue;
            }
            let solved = self.0.solve(
                new,
                other.as_ref().map(|o| o.data()[flat]),
                position == 0,
                scatter.previous(code),
            )?;
            scatter.write(code, solved);
        }
        if !scatter.touched() {
            return Ok(Vec::new());
        }
        let needed = selection.to_mask(&shape);
        let Some(path) = codes::read_off_backward(
            &focal,
            &needed,
            selection.is_element(),
            &source.value()?.shape(),
            &remaining,
        ) else {
            return Ok(Vec::new());
        };
        Ok(vec![scatter.inversal(path)?])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path;
    use crate::test_support::call_of;
    use test_log::test;

    #[test]
    fn add_inverts_into_the_first_source() {
        let a = Value::array(&[3], vec![1i64, 2, 3]).unwrap();
        let call = call_of(
            "add",
            vec![Arg::Source(Source::known(0, a)), Arg::Const(Value::Int(10))],
        );
        let previous = Value::array(&[3], vec![11i64, 12, 13]).unwrap();
        let inversals = ElementwiseInverter(Inverse::Add)
            .invert(&call, &Assignment::new(path![1], 20), &previous)
            .unwrap();
        assert_eq!(inversals.len(), 1);
        assert_eq!(inversals[0].occurrence, 0);
        assert_eq!(inversals[0].assignment.path, path![1]);
        assert_eq!(inversals[0].assignment.value, Value::Int(10));
    }

    #[test]
    fn second_operand_when_the_first_is_constant() {
        let b = Value::Float(4.0);
        let call = call_of(
            "divide",
            vec![Arg::Const(Value::Float(8.0)), Arg::Source(Source::known(0, b))],
        );
        let inversals = ElementwiseInverter(Inverse::Divide)
            .invert(&call, &Assignment::new(path![], 4.0), &Value::Float(2.0))
            .unwrap();
        assert_eq!(inversals[0].assignment.value, Value::Float(2.0));
    }

    #[test]
    fn lists_stay_lists() {
        let a = Value::from(vec![1, 2]);
        let call = call_of("negative", vec![Arg::Source(Source::known(0, a))]);
        let previous = Value::array(&[2], vec![-1i64, -2]).unwrap();
        let inversals = ElementwiseInverter(Inverse::Negative)
            .invert(&call, &Assignment::new(path![], Value::from(vec![5, 6])), &previous)
            .unwrap();
        assert_eq!(inversals[0].assignment.path, path![]);
        assert_eq!(inversals[0].assignment.value, Value::from(vec![-5, -6]));
    }

    #[test]
    fn operators_on_sequences_decline() {
        let a = Value::from(vec![1]);
        let call = call_of(
            "operator_add",
            vec![Arg::Source(Source::known(0, a)), Arg::Const(Value::from(vec![5]))],
        );
        let previous = Value::from(vec![1, 5]);
        assert_eq!(
            ElementwiseInverter(Inverse::Add).invert(&call, &Assignment::new(path![0], 10), &previous),
            Err(TranslationError::NotApplicable.into())
        );
    }
}
