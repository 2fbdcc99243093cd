use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::cache::{truncate_path_to_shallow, Cache, CacheStatus};
use crate::call::FuncCall;
use crate::error::{EngineError, Result};
use crate::invert::Assignment;
use crate::overrider::Overrider;
use crate::path::Path;
use crate::public::Node;
use crate::state::State;
use crate::template::AssignmentTemplate;
use crate::value::Value;

mod id;
pub use id::NodeId;
pub(crate) use id::NodeKey;

/// When a function node keeps its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CachePolicy {
    Always,
    Never,
    /// Keep results that were slow to compute relative to their size.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Never evaluated.
    Uncomputed,
    /// Its function body is running right now.
    Computing,
    ValidWhole,
    ValidPartial,
    Invalid,
}

/// Marker shared by every public handle to a node. The node is collectable once the last
/// handle is gone and no live node depends on it.
#[derive(Debug)]
pub(crate) struct Handle;

pub(crate) struct NodeData {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    /// Nodes whose calls mention this one. May hold keys of collected nodes.
    pub(crate) children: RefCell<Vec<NodeKey>>,
    pub(crate) handle: Weak<Handle>,
    pub(crate) computing: Cell<bool>,
    /// Where assignments made here may be stored. `None` lets any overridable node upstream
    /// take them.
    pub(crate) assigned: RefCell<Option<Vec<NodeKey>>>,
}

pub(crate) enum NodeKind {
    Input(InputNode),
    Function(FunctionNode),
}

impl fmt::Debug for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("NodeData");
        d.field("id", &self.id);
        match &self.kind {
            NodeKind::Input(input) => d.field("input", &*input.effective.borrow()),
            NodeKind::Function(func) => d.field("call", &func.call),
        };
        d.field("state", &self.state()).finish()
    }
}

impl NodeData {
    pub(crate) fn new(id: NodeId, kind: NodeKind, handle: &Rc<Handle>) -> Self {
        Self {
            id,
            kind,
            children: RefCell::new(Vec::new()),
            handle: Rc::downgrade(handle),
            computing: Cell::new(false),
            assigned: RefCell::new(None),
        }
    }

    pub(crate) fn has_handles(&self) -> bool {
        self.handle.strong_count() > 0
    }

    pub(crate) fn add_child(&self, child: NodeKey) {
        let mut children = self.children.borrow_mut();
        if !children.contains(&child) {
            children.push(child);
        }
    }

    pub(crate) fn parents(&self) -> Vec<NodeKey> {
        match &self.kind {
            NodeKind::Input(_) => Vec::new(),
            NodeKind::Function(f) => f.call.source_locations().into_iter().map(|(_, k)| *k).collect(),
        }
    }

    pub(crate) fn state(&self) -> NodeState {
        if self.computing.get() {
            return NodeState::Computing;
        }
        match &self.kind {
            NodeKind::Input(_) => NodeState::ValidWhole,
            NodeKind::Function(f) if !f.computed_once.get() => NodeState::Uncomputed,
            NodeKind::Function(f) => match f.cache_status() {
                CacheStatus::AllValid => NodeState::ValidWhole,
                CacheStatus::Partial => NodeState::ValidPartial,
                CacheStatus::AllInvalid => NodeState::Invalid,
            },
        }
    }

    pub(crate) fn cache_status(&self) -> CacheStatus {
        match &self.kind {
            NodeKind::Input(_) => CacheStatus::AllValid,
            NodeKind::Function(f) => f.cache_status(),
        }
    }

    pub(crate) fn overrides(&self) -> Vec<Assignment> {
        match &self.kind {
            NodeKind::Input(input) => input.overrider.borrow().assignments().to_vec(),
            NodeKind::Function(f) => f.overrider.borrow().assignments().to_vec(),
        }
    }

    pub(crate) fn update_overrides<R>(&self, f: impl FnOnce(&mut Overrider) -> R) -> R {
        match &self.kind {
            NodeKind::Input(input) => {
                let out = f(&mut input.overrider.borrow_mut());
                input.refresh();
                out
            }
            NodeKind::Function(func) => f(&mut func.overrider.borrow_mut()),
        }
    }

    /// Inputs always take overrides. Function nodes only when they allow it.
    pub(crate) fn allows_overriding(&self) -> bool {
        match &self.kind {
            NodeKind::Input(_) => true,
            NodeKind::Function(func) => func.allow_overriding.get(),
        }
    }

    pub(crate) fn template(&self) -> Option<AssignmentTemplate> {
        match &self.kind {
            NodeKind::Input(input) => input.overrider.borrow().template(),
            NodeKind::Function(func) => func.overrider.borrow().template(),
        }
    }

    /// The assignment fitted to this node's template.
    pub(crate) fn fit(&self, assignment: Assignment) -> Result<Assignment> {
        let fitted = match &self.kind {
            NodeKind::Input(input) => input.overrider.borrow().fit(assignment),
            NodeKind::Function(func) => func.overrider.borrow().fit(assignment),
        };
        Ok(fitted?)
    }
}

/// A value supplied from outside the graph.
pub(crate) struct InputNode {
    base: Value,
    overrider: RefCell<Overrider>,
    /// `base` with the overrides applied.
    effective: RefCell<Value>,
}

impl InputNode {
    pub(crate) fn new(base: Value) -> Self {
        Self {
            effective: RefCell::new(base.clone()),
            base,
            overrider: RefCell::new(Overrider::new()),
        }
    }

    pub(crate) fn value(&self) -> Value {
        self.effective.borrow().clone()
    }

    fn refresh(&self) {
        let value = self.overrider.borrow().apply(&self.base);
        *self.effective.borrow_mut() = value;
    }
}

pub(crate) struct FunctionNode {
    pub(crate) call: FuncCall<NodeKey>,
    pub(crate) cache: RefCell<Option<Box<dyn Cache>>>,
    pub(crate) policy: Cell<CachePolicy>,
    /// Assignments are stored here instead of being inverted into the sources.
    pub(crate) allow_overriding: Cell<bool>,
    pub(crate) overrider: RefCell<Overrider>,
    pub(crate) computed_once: Cell<bool>,
}

impl FunctionNode {
    pub(crate) fn new(call: FuncCall<NodeKey>, policy: CachePolicy) -> Self {
        Self {
            call,
            cache: RefCell::new(None),
            policy: Cell::new(policy),
            allow_overriding: Cell::new(false),
            overrider: RefCell::new(Overrider::new()),
            computed_once: Cell::new(false),
        }
    }

    pub(crate) fn cache_status(&self) -> CacheStatus {
        match self.cache.borrow().as_ref() {
            Some(cache) => cache.status(),
            None => CacheStatus::AllInvalid,
        }
    }

    pub(crate) fn with_overrides(&self, value: Value) -> Value {
        let overrider = self.overrider.borrow();
        if overrider.is_empty() {
            value
        } else {
            overrider.apply(&value)
        }
    }

    /// Mark `path` of the cached result stale. Anything the cache cannot record precisely
    /// discards it.
    pub(crate) fn invalidate_self(&self, id: NodeId, path: &Path) {
        let mut slot = self.cache.borrow_mut();
        let Some(cache) = slot.as_mut() else {
            return;
        };
        let truncated = truncate_path_to_shallow(path, cache.value());
        if truncated.is_root() {
            tracing::trace!(node = ?id, "discarding cache");
            *slot = None;
            return;
        }
        if let Err(e) = cache.set_invalid(&truncated) {
            tracing::warn!(node = ?id, %path, "discarding cache: {e}");
            *slot = None;
        }
    }
}

/// The chain of nodes being evaluated, outermost first.
#[derive(Debug, Default)]
pub(crate) struct EvalContext {
    chain: RefCell<Vec<NodeId>>,
}

impl EvalContext {
    pub(crate) fn with_chain(chain: Vec<NodeId>) -> Self {
        Self {
            chain: RefCell::new(chain),
        }
    }

    pub(crate) fn enter(&self, id: NodeId) {
        self.chain.borrow_mut().push(id);
    }

    pub(crate) fn leave(&self) {
        self.chain.borrow_mut().pop();
    }

    pub(crate) fn chain(&self) -> Vec<NodeId> {
        self.chain.borrow().clone()
    }
}

/// Issued to a running function body. Lets it read exactly the sources of its own call.
pub(crate) struct AccessToken {
    pub(crate) state: Weak<State>,
    pub(crate) allowed: Vec<NodeKey>,
    pub(crate) chain: Vec<NodeId>,
}

impl AccessToken {
    pub(crate) fn read(&self, node: &Node) -> Result<Value> {
        let state = self.state.upgrade().ok_or(EngineError::Collected)?;
        if !Rc::ptr_eq(&state, &node.state) || !self.allowed.contains(&node.key) {
            return Err(EngineError::AccessDenied { node: node.id });
        }
        let ctx = EvalContext::with_chain(self.chain.clone());
        state.value_at(node.key, Some(&Path::root()), &ctx)
    }
}
