//! Reactive, incremental computations over nested containers.
//!
//! A [`Graph`] holds input nodes and function nodes. Function nodes compute lazily, cache
//! partially, and invalidate only the parts of their results that a change upstream can reach.
//! Assigning into a function node inverts the assignment through the functions back to the
//! inputs it came from.
//!
//! ```
//! use quiver::{path, Arg, Graph, Value};
//!
//! let graph = Graph::new();
//! let a = graph.input(vec![1, 2, 3]);
//! let b = graph.call("add", vec![Arg::from(&a), Arg::Const(Value::Int(1))]).unwrap();
//! assert_eq!(b.get_value().unwrap(), Value::array(&[3], vec![2i64, 3, 4]).unwrap());
//!
//! b.assign(path![1], 30).unwrap();
//! assert_eq!(a.get_value().unwrap(), Value::from(vec![1, 29, 3]));
//! ```
// Translator closures and nested calls make for long generic signatures.
#![allow(clippy::type_complexity)]

pub mod array;
pub mod cache;
pub mod call;
mod config;
pub mod definition;
pub mod error;
pub mod invert;
pub mod library;
mod node;
mod overrider;
pub mod params;
pub mod path;
mod public;
pub mod runner;
pub mod source;
mod state;
mod syntax;
mod template;
pub mod translate;
pub mod value;

#[cfg(test)]
mod test_support;

pub use array::{NdArray, Shape, Slice};
pub use cache::CacheStatus;
pub use call::{Arg, Signature};
pub use config::Config;
pub use definition::{DataArgumentSpec, DefinitionFlags, FunctionDefinition, Invocation, Registry};
pub use error::{
    CallError, EngineError, InversionError, PathError, Result, ShapeError, TemplateError,
};
pub use invert::Assignment;
pub use node::{CachePolicy, NodeId, NodeState};
pub use overrider::Overrider;
pub use path::{Component, Path, PathComponent};
pub use public::*;
pub use template::AssignmentTemplate;
pub use value::{Scalar, Value, ValueType};

use std::cell::Cell;

/// Internal consistency checks, run in debug builds.
pub trait Invariant {
    fn invariant(&self);
}

/// Little helper trait for bumping a statistic.
pub(crate) trait CellIncrement {
    type Num;
    fn increment(&self);
    fn update_val(&self, f: impl FnOnce(Self::Num) -> Self::Num);
}

macro_rules! impl_cell_increment {
    ($num_ty:ty) => {
        impl CellIncrement for Cell<$num_ty> {
            type Num = $num_ty;
            #[inline]
            fn update_val(&self, f: impl FnOnce(Self::Num) -> Self::Num) {
                self.set(f(self.get()));
            }
            #[inline(always)]
            fn increment(&self) {
                self.update_val(|x| x + 1)
            }
        }
    };
}
impl_cell_increment!(usize);
