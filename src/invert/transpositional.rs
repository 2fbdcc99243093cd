use crate::error::InversionError;
use crate::runner::{RunCondition, Strategy};
use crate::source::SourceCall;
use crate::translate::{codes, Transposition};
use crate::value::Value;

use super::{spread, unsupported, Assignment, Inversal, Inverter, Scatter};

/// Inverts data movement exactly: every assigned result element whose code names a source
/// element is written straight back to it.
#[derive(Debug, Clone, Copy)]
pub struct TranspositionalInverter(pub Transposition);

impl Strategy for TranspositionalInverter {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::METADATA
    }
}

impl Inverter for TranspositionalInverter {
    fn invert(
        &self,
        call: &SourceCall,
        assignment: &Assignment,
        previous: &Value,
    ) -> Result<Vec<Inversal>, InversionError> {
        let shape = previous.shape();
        let (selection, remaining) = codes::select_within(&shape, &assignment.path)?;
        if !remaining.is_root() {
            return Err(unsupported(&assignment.path));
        }
        let new_values = spread(&assignment.value, &selection)?;
        let needed = selection.to_mask(&shape);
        let data = call.data_arguments();
        let mut inversals = Vec::new();
        for (location, source) in call.source_locations() {
            if !location.is_data {
                continue;
            }
            let inputs = data
                .iter()
                .map(|d| codes::arg_codes(d.arg, location.occurrence))
                .collect::<Result<Vec<_>, _>>()?;
            let result_codes = self.0.apply(call, inputs)?;
            if result_codes.shape() != &shape[..] {
                return Err(unsupported(&assignment.path));
            }
            let mut scatter = Scatter::new(source)?;
            for (&flat, &new) in selection.flat.iter().zip(&new_values) {
                let code = result_codes.data()[flat];
                if codes::is_focal(code) {
                    scatter.write(code, new);
                }
            }
            if !scatter.touched() {
                continue;
            }
            if let Some(path) = codes::read_off_backward(
                &result_codes,
                &needed,
                selection.is_element(),
                &source.value()?.shape(),
                &remaining,
            ) {
                inversals.push(scatter.inversal(path)?);
            }
        }
        Ok(inversals)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::call::Arg;
    use crate::path;
    use crate::source::Source;
    use crate::test_support::{call_of, call_with};
    use test_log::test;

    #[test]
    fn rotation_writes_back_to_the_moved_element() {
        let a = Value::array(&[2, 2], vec![1i64, 2, 3, 4]).unwrap();
        let call = call_with(
            "rot90",
            vec![Arg::Source(Source::known(0, a))],
            vec![("k", Arg::Const(Value::Int(1)))],
        );
        // rot90 counter-clockwise: [[2, 4], [1, 3]]
        let previous = Value::array(&[2, 2], vec![2i64, 4, 1, 3]).unwrap();
        let inversals = TranspositionalInverter(Transposition::Rot90)
            .invert(&call, &Assignment::new(path![[0, 0]], 20), &previous)
            .unwrap();
        assert_eq!(inversals.len(), 1);
        assert_eq!(inversals[0].assignment.path, path![[0, 1]]);
        assert_eq!(inversals[0].assignment.value, Value::Int(20));
    }

    #[test]
    fn concatenate_splits_the_assignment() {
        let call = call_of(
            "concatenate",
            vec![Arg::Seq(vec![
                Arg::Source(Source::known(0, Value::array(&[2], vec![1i64, 2]).unwrap())),
                Arg::Source(Source::known(1, Value::array(&[1], vec![3i64]).unwrap())),
            ])],
        );
        let previous = Value::array(&[3], vec![1i64, 2, 3]).unwrap();
        let inversals = TranspositionalInverter(Transposition::Concatenate)
            .invert(
                &call,
                &Assignment::new(path![], Value::from(vec![7, 8, 9])),
                &previous,
            )
            .unwrap();
        assert_eq!(inversals.len(), 2);
        assert_eq!(inversals[0].assignment.path, path![]);
        assert_eq!(
            inversals[0].assignment.value,
            Value::array(&[2], vec![7i64, 8]).unwrap()
        );
        assert_eq!(inversals[1].occurrence, 1);
        assert_eq!(
            inversals[1].assignment.value,
            Value::array(&[1], vec![9i64]).unwrap()
        );
    }
}
