//! Operator syntax on nodes: `&a + &b`, `&a * 2`, `-&a`.
//!
//! Each operator creates a node calling the matching `operator_*` function. Mixing nodes of
//! different graphs is an error, so every operator returns a [`Result`].
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::call::Arg;
use crate::error::Result;
use crate::public::Node;
use crate::value::Value;

impl Node {
    fn operator(&self, name: &str, rhs: Arg<Node>) -> Result<Node> {
        self.graph().call(name, vec![self.into(), rhs])
    }
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $name:literal) => {
        impl $trait<&Node> for &Node {
            type Output = Result<Node>;
            fn $method(self, rhs: &Node) -> Self::Output {
                self.operator($name, rhs.into())
            }
        }
        impl $trait<Value> for &Node {
            type Output = Result<Node>;
            fn $method(self, rhs: Value) -> Self::Output {
                self.operator($name, Arg::Const(rhs))
            }
        }
        impl $trait<i64> for &Node {
            type Output = Result<Node>;
            fn $method(self, rhs: i64) -> Self::Output {
                self.operator($name, Arg::Const(rhs.into()))
            }
        }
        impl $trait<f64> for &Node {
            type Output = Result<Node>;
            fn $method(self, rhs: f64) -> Self::Output {
                self.operator($name, Arg::Const(rhs.into()))
            }
        }
    };
}

binary_operator!(Add, add, "operator_add");
binary_operator!(Sub, sub, "operator_sub");
binary_operator!(Mul, mul, "operator_mul");
binary_operator!(Div, div, "operator_truediv");

impl Neg for &Node {
    type Output = Result<Node>;
    fn neg(self) -> Self::Output {
        self.graph().call("operator_neg", vec![self.into()])
    }
}
