use crate::array::normalize_index;
use crate::call::Arg;
use crate::error::{InversionError, TranslationError};
use crate::path::{Component, Path, PathComponent};
use crate::runner::{RunCondition, Strategy};
use crate::source::{Source, SourceCall};
use crate::translate::list_addition::arg_len;
use crate::value::{ContainerKind, Value};

use super::{unsupported, Assignment, Inversal, Inverter};

/// Inverts `+` on sequences: each assigned element goes back to the operand it came from.
/// Elements contributed by a constant operand cannot be changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListAdditionInverter;

impl Strategy for ListAdditionInverter {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::METADATA
    }
}

enum Owner<'a> {
    /// Position `local` of a source operand.
    Operand(&'a Source, usize),
    /// A source passed as one element of a literal sequence operand.
    Element(&'a Source),
    Constant,
}

fn owner(call: &SourceCall, index: usize) -> Result<Owner<'_>, InversionError> {
    let mut start = 0;
    for data in call.data_arguments() {
        let len = arg_len(data.arg)?;
        if index >= start + len {
            start += len;
            continue;
        }
        let local = index - start;
        return Ok(match data.arg {
            Arg::Source(source) => Owner::Operand(source, local),
            Arg::Seq(items) => match &items[local] {
                Arg::Source(source) => Owner::Element(source),
                _ => Owner::Constant,
            },
            Arg::Const(_) => Owner::Constant,
        });
    }
    Err(TranslationError::NotApplicable.into())
}

fn element_at(index: usize, rest: &[PathComponent]) -> Path {
    Path::from(vec![PathComponent::with_kind(
        Component::Index(index as isize),
        ContainerKind::Sequence,
    )])
    .join(rest)
}

impl ListAdditionInverter {
    fn invert_element(
        call: &SourceCall,
        index: usize,
        rest: &[PathComponent],
        value: &Value,
        full: &Path,
    ) -> Result<Inversal, InversionError> {
        let (occurrence, path) = match owner(call, index)? {
            Owner::Operand(source, local) => (source.occurrence, element_at(local, rest)),
            Owner::Element(source) => (source.occurrence, Path::from(rest)),
            Owner::Constant => return Err(unsupported(full)),
        };
        Ok(Inversal {
            occurrence,
            assignment: Assignment {
                path,
                value: value.clone(),
            },
        })
    }
}

impl Inverter for ListAdditionInverter {
    fn invert(
        &self,
        call: &SourceCall,
        assignment: &Assignment,
        previous: &Value,
    ) -> Result<Vec<Inversal>, InversionError> {
        let Some(items) = previous.as_sequence() else {
            return Err(TranslationError::NotApplicable.into());
        };
        let path = &assignment.path;
        let Some(first) = path.first() else {
            // Whole replacement: only the elements that change are sent back.
            let new = match assignment.value.as_sequence() {
                Some(new) if new.len() == items.len() => new,
                _ => {
                    return Err(InversionError::CannotConstruct {
                        ty: previous.type_name(),
                        value: format!("{:?}", assignment.value),
                    })
                }
            };
            return items
                .iter()
                .zip(new.iter())
                .enumerate()
                .filter(|(_, (old, new))| old != new)
                .map(|(index, (_, new))| Self::invert_element(call, index, &[], new, path))
                .collect();
        };
        let Component::Index(index) = first.component else {
            return Err(unsupported(path));
        };
        let index = normalize_index(index, items.len())?;
        Ok(vec![Self::invert_element(
            call,
            index,
            &path[1..],
            &assignment.value,
            path,
        )?])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path;
    use crate::test_support::call_of;
    use test_log::test;

    fn call() -> SourceCall {
        call_of(
            "operator_add",
            vec![
                Arg::Source(Source::known(0, Value::from(vec![0, 1, 2]))),
                Arg::Const(Value::from(vec![3, 4])),
            ],
        )
    }

    #[test]
    fn elements_go_back_to_their_operand() {
        let previous = Value::from(vec![0, 1, 2, 3, 4]);
        let inversals = ListAdditionInverter
            .invert(&call(), &Assignment::new(path![-3], 22), &previous)
            .unwrap();
        assert_eq!(
            inversals,
            vec![Inversal {
                occurrence: 0,
                assignment: Assignment::new(path![2], 22),
            }]
        );
    }

    #[test]
    fn constant_elements_cannot_change() {
        let previous = Value::from(vec![0, 1, 2, 3, 4]);
        assert_eq!(
            ListAdditionInverter.invert(&call(), &Assignment::new(path![3], 9), &previous),
            Err(unsupported(&path![3]))
        );
    }

    #[test]
    fn whole_replacement_sends_only_changes() {
        let previous = Value::from(vec![0, 1, 2, 3, 4]);
        let inversals = ListAdditionInverter
            .invert(
                &call(),
                &Assignment::new(path![], Value::from(vec![0, 7, 2, 3, 4])),
                &previous,
            )
            .unwrap();
        assert_eq!(inversals.len(), 1);
        assert_eq!(inversals[0].assignment, Assignment::new(path![1], 7));

        let changed_constant = ListAdditionInverter.invert(
            &call(),
            &Assignment::new(path![], Value::from(vec![0, 1, 2, 3, 5])),
            &previous,
        );
        assert!(matches!(changed_constant, Err(InversionError::UnsupportedPath(_))));
    }

    #[test]
    fn arrays_are_left_to_elementwise_inversion() {
        let previous = Value::array(&[2], vec![3i64, 5]).unwrap();
        assert_eq!(
            ListAdditionInverter.invert(&call(), &Assignment::new(path![0], 1), &previous),
            Err(TranslationError::NotApplicable.into())
        );
    }
}
