use std::rc::Rc;

use crate::node::NodeId;
use crate::path::Path;
use crate::value::Scalar;

/// Something about the shapes of the arrays involved did not line up.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapeError {
    #[error("shapes {left:?} and {right:?} cannot be broadcast together")]
    Incompatible { left: Vec<usize>, right: Vec<usize> },
    #[error("axis {axis} is out of bounds for an array of dimension {ndim}")]
    InvalidAxis { axis: isize, ndim: usize },
    #[error("cannot reshape an array of size {size} into shape {shape:?}")]
    Reshape { size: usize, shape: Vec<isize> },
    #[error("nested sequence is not rectangular")]
    NotRectangular,
    #[error("value of type {0} is not numeric")]
    NotNumeric(&'static str),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("index {index} is out of range for a container of length {len}")]
    OutOfRange { index: isize, len: usize },
    #[error("key {0:?} not found")]
    KeyNotFound(Rc<str>),
    #[error("component {component} cannot index into a value of type {ty}")]
    InvalidComponent { component: String, ty: &'static str },
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

impl PathError {
    /// Out-of-range style errors are tolerated by the override layer.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, PathError::OutOfRange { .. } | PathError::KeyNotFound(_))
    }
}

/// Internal to caching. Always recovered from by the node, never surfaced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("a holistic cache path cannot have components")]
    PathCannotHaveComponents,
    #[error("cannot invalidate a whole shallow cache, its size may have changed")]
    CannotInvalidateWholeShallowCache,
    #[error("cache does not match value: {0}")]
    Mismatch(#[from] PathError),
}

/// A translator declining to run. The runner escalates on any of these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslationError {
    #[error("translator does not apply to this call")]
    NotApplicable,
    #[error("translator needs the shape and type of a source or result")]
    MetadataUnknown,
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InversionError {
    #[error("no inverter of `{function}` could invert the assignment")]
    NoInverter { function: Rc<str> },
    #[error("`{function}` has no data source to invert into")]
    NoDataSource { function: Rc<str> },
    #[error("cannot construct a {ty} from the assigned value {value}")]
    CannotConstruct { ty: &'static str, value: String },
    #[error("cannot assign at {0} through this function")]
    UnsupportedPath(Path),
    /// The assignment reached an input outside the assigned nodes of where it was made.
    #[error("the assignment reached {node:?}, which is not an assigned node")]
    NotAssignable { node: NodeId },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Translation(#[from] TranslationError),
}

/// An assignment template that cannot be built, or a value it cannot fit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("maximum {max:?} is below minimum {min:?}")]
    MaxBelowMin { min: Scalar, max: Scalar },
    #[error("stop {stop:?} is below start {start:?}")]
    StopBelowStart { start: Scalar, stop: Scalar },
    #[error("step {0:?} is not positive")]
    NonPositiveStep(Scalar),
    #[error("template bounds must be all ints or all floats")]
    MixedTypes,
    #[error("a value of type {0} cannot be fitted to an assignment template")]
    InvalidType(&'static str),
}

/// Raised by a function body.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error("{0}")]
    Message(String),
    #[error("missing or invalid argument `{name}`: {reason}")]
    Argument { name: String, reason: String },
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Path(#[from] PathError),
    /// A nested read through an invocation failed.
    #[error(transparent)]
    Engine(Box<EngineError>),
}

impl CallError {
    pub fn msg(message: impl Into<String>) -> Self {
        CallError::Message(message.into())
    }

    pub(crate) fn argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        CallError::Argument {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<EngineError> for CallError {
    fn from(value: EngineError) -> Self {
        CallError::Engine(Box::new(value))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("`{function}` failed (evaluating {chain:?}): {source}")]
    External {
        function: Rc<str>,
        chain: Vec<NodeId>,
        source: CallError,
    },
    #[error(transparent)]
    Inversion(#[from] InversionError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("{node:?} is not readable from the running function")]
    AccessDenied { node: NodeId },
    #[error("{node:?} was read while it was being computed")]
    Reentrant { node: NodeId },
    #[error("no function named `{name}` is registered")]
    UnknownFunction { name: String },
    #[error("node no longer exists in its graph")]
    Collected,
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("invalid argument: {0}")]
    Argument(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
