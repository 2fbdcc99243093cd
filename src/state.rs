use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt::{self, Write};
use std::rc::{Rc, Weak};

use slotmap::SlotMap;

use crate::config::Config;
use crate::definition::Registry;
use crate::error::{EngineError, Result};
use crate::node::{Handle, NodeData, NodeId, NodeKey, NodeKind, NodeState};
use crate::CellIncrement;

mod evaluate;
mod propagate;

pub(crate) struct State {
    pub(crate) nodes: RefCell<SlotMap<NodeKey, Rc<NodeData>>>,
    pub(crate) registry: RefCell<Registry>,
    pub(crate) config: Config,
    /// Nodes whose function bodies are running, innermost last.
    pub(crate) frames: RefCell<Vec<NodeId>>,
    pub(crate) next_id: Cell<usize>,
    pub(crate) num_nodes_created: Cell<usize>,
    pub(crate) num_nodes_collected: Cell<usize>,
    pub(crate) num_executions: Cell<usize>,
    pub(crate) num_invalidations: Cell<usize>,
    pub(crate) num_inversions: Cell<usize>,
    pub(crate) weak_self: Weak<Self>,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("nodes", &self.nodes.borrow().len())
            .field("frames", &self.frames.borrow())
            .finish()
    }
}

impl State {
    pub(crate) fn new(config: Config, registry: Registry) -> Rc<Self> {
        Rc::new_cyclic(|weak| State {
            nodes: RefCell::new(SlotMap::with_key()),
            registry: RefCell::new(registry),
            config,
            frames: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            num_nodes_created: Cell::new(0),
            num_nodes_collected: Cell::new(0),
            num_executions: Cell::new(0),
            num_invalidations: Cell::new(0),
            num_inversions: Cell::new(0),
            weak_self: weak.clone(),
        })
    }

    /// The node behind `key`. The arena borrow ends before this returns, so callers may recurse.
    pub(crate) fn node(&self, key: NodeKey) -> Result<Rc<NodeData>> {
        self.nodes
            .borrow()
            .get(key)
            .cloned()
            .ok_or(EngineError::Collected)
    }

    /// Insert a node. Its parents must be live.
    pub(crate) fn add_node(&self, kind: NodeKind) -> (NodeKey, NodeId, Rc<Handle>) {
        let id = NodeId::next(&self.next_id);
        let handle = Rc::new(Handle);
        let data = Rc::new(NodeData::new(id, kind, &handle));
        let parents = data.parents();
        let key = self.nodes.borrow_mut().insert(data);
        for parent in parents {
            if let Ok(parent) = self.node(parent) {
                parent.add_child(key);
            }
        }
        self.num_nodes_created.increment();
        tracing::trace!(node = ?id, "created");
        (key, id, handle)
    }

    /// Public reads and writes are not allowed from inside a running function body.
    pub(crate) fn check_outside_evaluation(&self, node: NodeId) -> Result<()> {
        match self.frames.borrow().last() {
            Some(running) => {
                tracing::debug!(?running, ?node, "rejected access during evaluation");
                Err(EngineError::AccessDenied { node })
            }
            None => Ok(()),
        }
    }

    /// Remove every node that has no public handle and no live descendant. Returns how many
    /// were removed.
    pub(crate) fn collect_garbage(&self) -> usize {
        let removed: Vec<Rc<NodeData>> = {
            let mut nodes = self.nodes.borrow_mut();
            let mut live = HashSet::new();
            let mut stack: Vec<NodeKey> = nodes
                .iter()
                .filter(|(_, n)| n.has_handles())
                .map(|(k, _)| k)
                .collect();
            while let Some(key) = stack.pop() {
                if !live.insert(key) {
                    continue;
                }
                if let Some(node) = nodes.get(key) {
                    stack.extend(node.parents());
                }
            }
            let dead: Vec<NodeKey> = nodes.keys().filter(|k| !live.contains(k)).collect();
            for (_, node) in nodes.iter() {
                node.children.borrow_mut().retain(|c| live.contains(c));
            }
            dead.into_iter().filter_map(|k| nodes.remove(k)).collect()
        };
        let count = removed.len();
        // Dropping definitions may drop closures holding node handles.
        drop(removed);
        self.num_nodes_collected.update_val(|n| n + count);
        tracing::debug!(count, "collected nodes");
        count
    }

    pub(crate) fn save_dot_to_string(&self) -> String {
        let mut buf = String::new();
        // Writing to a String cannot fail.
        let _ = self.save_dot(&mut buf);
        buf
    }

    pub(crate) fn save_dot_to_file(&self, named: &str) -> std::io::Result<()> {
        std::fs::write(named, self.save_dot_to_string())
    }

    pub(crate) fn save_dot(&self, f: &mut dyn Write) -> fmt::Result {
        writeln!(f, "digraph G {{")?;
        writeln!(
            f,
            r#"rankdir = BT
        graph [fontname = "Courier"];
        node [fontname = "Courier", shape=box, colorscheme=rdylbu7];
        edge [fontname = "Courier", colorscheme=rdylbu7];"#
        )?;
        let nodes = self.nodes.borrow();
        let mut inputs = vec![];
        for (_, node) in nodes.iter() {
            let (label, parents) = match &node.kind {
                NodeKind::Input(_) => {
                    inputs.push(node.id);
                    ("input".to_string(), vec![])
                }
                NodeKind::Function(func) => (func.call.name().to_string(), node.parents()),
            };
            let color = match node.state() {
                NodeState::ValidWhole => 6,
                NodeState::ValidPartial => 5,
                NodeState::Computing => 3,
                NodeState::Invalid => 2,
                NodeState::Uncomputed => 4,
            };
            writeln!(
                f,
                "  {} [label={:?}, style=filled, fillcolor={}]",
                node.id.0,
                format!("{} {}", node.id, label),
                color
            )?;
            for parent in parents {
                if let Some(parent) = nodes.get(parent) {
                    writeln!(f, "  {} -> {}", parent.id.0, node.id.0)?;
                }
            }
        }
        if !inputs.is_empty() {
            write!(f, "{{ rank=\"min\"; ")?;
            for id in inputs {
                write!(f, "{}; ", id.0)?;
            }
            writeln!(f, "}}")?;
        }
        writeln!(f, "}}")?;
        Ok(())
    }
}
