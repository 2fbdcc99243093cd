use std::cell::Cell;
use std::fmt;

use crate::CellIncrement;

slotmap::new_key_type! {
    /// Where a node lives in its graph's arena.
    pub(crate) struct NodeKey;
}

/// Stable, human-readable identity of a node within its graph. Used in errors and dot output.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub(crate) fn next(counter: &Cell<usize>) -> Self {
        counter.increment();
        NodeId(counter.get())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
