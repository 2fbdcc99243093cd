//! Inverters: turn an assignment on a function's result into assignments on its sources.

use crate::array::{NdArray, Selection};
use crate::error::InversionError;
use crate::path::Path;
use crate::runner::Strategy;
use crate::source::{Source, SourceCall};
use crate::value::{Scalar, Value};

mod elementwise;
mod inverse;
mod list_addition;
mod simple;
mod transpositional;

pub use elementwise::ElementwiseInverter;
pub use inverse::Inverse;
pub use list_addition::ListAdditionInverter;
pub use simple::{CastingInverter, GetItemInverter, ProxyInverter};
pub use transpositional::TranspositionalInverter;

/// A request to change part of a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub path: Path,
    pub value: Value,
}

impl Assignment {
    pub fn new(path: Path, value: impl Into<Value>) -> Self {
        Self {
            path,
            value: value.into(),
        }
    }
}

/// An assignment aimed at one source occurrence of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Inversal {
    pub occurrence: usize,
    pub assignment: Assignment,
}

pub trait Inverter: Strategy {
    /// Assignments on the sources of `call` that would make its result take
    /// `assignment`. `previous` is the full result before the change.
    fn invert(
        &self,
        call: &SourceCall,
        assignment: &Assignment,
        previous: &Value,
    ) -> Result<Vec<Inversal>, InversionError>;
}

/// The assigned value laid out over a selection, the way a tensor assignment fills it.
pub(crate) fn spread(value: &Value, selection: &Selection) -> Result<Vec<Scalar>, InversionError> {
    let array = value.to_array()?;
    if array.len() == selection.flat.len() && array.ndim() != 0 {
        Ok(array.into_data())
    } else {
        Ok(array.broadcast_to(&selection.shape)?.into_data())
    }
}

/// A modified copy of a source's elements, turned back into a value of the source's kind.
pub(crate) struct Scatter<'a> {
    source: &'a Source,
    original: &'a Value,
    pub(crate) elements: NdArray<Scalar>,
    touched: bool,
}

impl<'a> Scatter<'a> {
    pub(crate) fn new(source: &'a Source) -> Result<Self, InversionError> {
        let original = source.value()?;
        Ok(Self {
            source,
            original,
            elements: original.to_array()?,
            touched: false,
        })
    }

    /// Write at a source code. 0-d sources are written whole.
    pub(crate) fn write(&mut self, code: i64, value: Scalar) {
        let flat = if code >= 0 { code as usize } else { 0 };
        if let Some(slot) = self.elements.data_mut().get_mut(flat) {
            *slot = fit_like(*slot, value);
            self.touched = true;
        }
    }

    pub(crate) fn previous(&self, code: i64) -> Scalar {
        let flat = if code >= 0 { code as usize } else { 0 };
        self.elements.data()[flat]
    }

    pub(crate) fn touched(&self) -> bool {
        self.touched
    }

    /// The updated source value, in the container kind it came in.
    pub(crate) fn into_value(self) -> Value {
        match self.original {
            Value::Array(_) => Value::Array(self.elements),
            Value::List(_) | Value::Tuple(_) => {
                let list = Value::from_array_as_list(&self.elements);
                match (self.original, list) {
                    (Value::Tuple(_), Value::List(items)) => Value::Tuple(items),
                    (_, list) => list,
                }
            }
            _ => Value::from(self.elements.data()[0]),
        }
    }

    /// The inversal for the part of the source at `path`.
    pub(crate) fn inversal(self, path: Path) -> Result<Inversal, InversionError> {
        let occurrence = self.source.occurrence;
        let value = crate::path::get(&self.into_value(), &path)?;
        Ok(Inversal {
            occurrence,
            assignment: Assignment { path, value },
        })
    }
}

/// Keep the element type of the value being replaced where the new value allows it.
pub(crate) fn fit_like(previous: Scalar, new: Scalar) -> Scalar {
    match (previous, new) {
        (Scalar::Int(_), Scalar::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
            Scalar::Int(f as i64)
        }
        (Scalar::Bool(_), Scalar::Int(i)) if i == 0 || i == 1 => Scalar::Bool(i == 1),
        (Scalar::Bool(_), Scalar::Float(f)) if f == 0.0 || f == 1.0 => Scalar::Bool(f == 1.0),
        _ => new,
    }
}

pub(crate) fn unsupported(path: &Path) -> InversionError {
    InversionError::UnsupportedPath(path.clone())
}
