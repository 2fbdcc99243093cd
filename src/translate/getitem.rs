use crate::call::{Arg, SourceLocation};
use crate::error::TranslationError;
use crate::path::{self, Component, Path, PathComponent};
use crate::runner::{RunCondition, Strategy};
use crate::source::{ResultMeta, Source, SourceCall};
use crate::value::Value;

use super::{BackwardTranslator, ForwardTranslator, Requirements};

/// `container[item]` on maps, lists and tuples, with a key or a single index.
/// Arrays are left to the transpositional translator.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetItemTranslator;

impl GetItemTranslator {
    fn parts(call: &SourceCall) -> Result<(&Source, Component), TranslationError> {
        let data = call.data_arguments();
        let source = match data.first().map(|d| d.arg) {
            Some(Arg::Source(source)) => source,
            _ => return Err(TranslationError::NotApplicable),
        };
        let item = call.param("item").ok_or(TranslationError::NotApplicable)?;
        match Component::from_value(&item) {
            Some(c @ (Component::Key(_) | Component::Index(_))) => Ok((source, c)),
            _ => Err(TranslationError::NotApplicable),
        }
    }

    /// The container length, for resolving negative and non-scalar references.
    fn sequence_len(source: &Source) -> Result<usize, TranslationError> {
        match source.value()? {
            Value::Array(_) | Value::Record(_) => Err(TranslationError::NotApplicable),
            Value::List(items) | Value::Tuple(items) => Ok(items.len()),
            _ => Err(TranslationError::NotApplicable),
        }
    }
}

impl Strategy for GetItemTranslator {
    fn run_conditions(&self) -> &'static [RunCondition] {
        RunCondition::ALL
    }
}

impl BackwardTranslator for GetItemTranslator {
    fn backward(
        &self,
        call: &SourceCall,
        path: &Path,
        _meta: Option<&ResultMeta>,
    ) -> Result<Requirements, TranslationError> {
        let (source, component) = Self::parts(call)?;
        if let Ok(value) = source.value() {
            if matches!(value, Value::Array(_) | Value::Record(_)) {
                return Err(TranslationError::NotApplicable);
            }
        }
        let head = match source.value() {
            Ok(value) => PathComponent::with_kind(component, value.kind()),
            Err(_) => PathComponent::new(component),
        };
        let mut requirements = Requirements::new();
        requirements.require(source.occurrence, Path::from(vec![head]).join(path));
        Ok(requirements)
    }
}

impl ForwardTranslator for GetItemTranslator {
    fn forward(
        &self,
        call: &SourceCall,
        location: &SourceLocation,
        path: &Path,
        _meta: Option<&ResultMeta>,
    ) -> Result<Vec<Path>, TranslationError> {
        let (source, component) = Self::parts(call)?;
        if source.occurrence != location.occurrence {
            return Err(TranslationError::NotApplicable);
        }
        let Some(first) = path.first() else {
            return Ok(vec![Path::root()]);
        };
        let tail = path.tail(1);
        let hit = match (&component, &first.component) {
            (Component::Key(a), Component::Key(b)) => a == b,
            (Component::Key(_), _) | (_, Component::Key(_)) => return Ok(vec![path.clone()]),
            (Component::Index(i), Component::Index(j)) if *i >= 0 && *j >= 0 => {
                if source.value().is_ok() {
                    Self::sequence_len(source)?;
                }
                i == j
            }
            (Component::Index(i), other) => {
                let len = Self::sequence_len(source)?;
                let index = crate::array::normalize_index(*i, len)?;
                path::selection(&[len], other)?.flat.contains(&index)
            }
            _ => return Err(TranslationError::NotApplicable),
        };
        Ok(if hit { vec![tail] } else { Vec::new() })
    }
}
