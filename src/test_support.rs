//! Helpers shared by unit tests.

use crate::array::NdArray;
use crate::call::{Arg, FuncCall};
use crate::definition::Registry;
use crate::source::{Source, SourceCall};

/// A call to a built-in with positional arguments only.
pub(crate) fn call_of(name: &str, args: Vec<Arg<Source>>) -> SourceCall {
    call_with(name, args, vec![])
}

pub(crate) fn call_with(
    name: &str,
    args: Vec<Arg<Source>>,
    kwargs: Vec<(&str, Arg<Source>)>,
) -> SourceCall {
    let registry = Registry::with_builtins();
    let definition = registry
        .get(name)
        .unwrap_or_else(|| panic!("no builtin {name}"))
        .clone();
    FuncCall::new(
        definition,
        args,
        kwargs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
    )
}

pub(crate) fn mask(shape: &[usize], on: &[usize]) -> NdArray<bool> {
    let mut mask = NdArray::from_elem(shape, false);
    for &i in on {
        mask.data_mut()[i] = true;
    }
    mask
}
