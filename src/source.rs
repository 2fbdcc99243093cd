use std::fmt;

use crate::array::Shape;
use crate::call::{FuncCall, SourceValue};
use crate::error::TranslationError;
use crate::value::{Value, ValueType};

/// One source occurrence of a call, as translators and inverters see it.
#[derive(Clone, PartialEq)]
pub struct Source {
    pub occurrence: usize,
    value: Option<Value>,
}

impl Source {
    pub fn known(occurrence: usize, value: Value) -> Self {
        Self {
            occurrence,
            value: Some(value),
        }
    }

    pub fn unknown(occurrence: usize) -> Self {
        Self {
            occurrence,
            value: None,
        }
    }

    /// The source's value, or [`TranslationError::MetadataUnknown`] so the translator escalates.
    pub fn value(&self) -> Result<&Value, TranslationError> {
        self.value.as_ref().ok_or(TranslationError::MetadataUnknown)
    }
}

impl SourceValue for Source {
    fn known_value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "Source#{}({:?})", self.occurrence, v),
            None => write!(f, "Source#{}", self.occurrence),
        }
    }
}

pub type SourceCall = FuncCall<Source>;

/// Shape and coarse type of a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMeta {
    pub shape: Shape,
    pub ty: ValueType,
}

impl ResultMeta {
    pub fn of(value: &Value) -> Self {
        Self {
            shape: value.shape(),
            ty: value.ty(),
        }
    }

    pub fn is_numeric_or_array(&self) -> bool {
        self.ty.is_numeric() || self.ty == ValueType::Array
    }
}
