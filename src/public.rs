use std::fmt::{self, Debug};
use std::ops::Sub;
use std::rc::Rc;

use crate::array::{broadcast_shapes, size_of, NdArray, Shape};
use crate::cache::CacheStatus;
use crate::call::{Arg, FuncCall, Signature};
use crate::config::Config;
use crate::definition::{DataArgumentSpec, FunctionDefinition, Registry};
use crate::error::{CallError, EngineError, Result};
use crate::invert::Assignment;
use crate::library::array_result;
use crate::node::{
    CachePolicy, EvalContext, FunctionNode, Handle, InputNode, NodeData, NodeId, NodeKey, NodeKind,
    NodeState,
};
use crate::path::Path;
use crate::state::State;
use crate::template::AssignmentTemplate;
use crate::translate::{CoreDims, VectorizeTranslator};
use crate::value::{Scalar, Value, ValueType};

/// A graph of nodes. Cloning gives another handle to the same graph.
#[derive(Clone)]
pub struct Graph {
    pub(crate) state: Rc<State>,
}

impl Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.fmt(f)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// A graph with the default [`Config`] and every built-in function registered.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_registry(config, Registry::with_builtins())
    }

    pub fn with_registry(config: Config, registry: Registry) -> Self {
        Graph {
            state: State::new(config, registry),
        }
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Add a function to this graph's registry, replacing any with the same name.
    pub fn register(&self, definition: FunctionDefinition) -> Rc<FunctionDefinition> {
        self.state.registry.borrow_mut().register(definition)
    }

    pub fn definition(&self, name: &str) -> Result<Rc<FunctionDefinition>> {
        self.state
            .registry
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownFunction { name: name.to_string() })
    }

    pub fn input(&self, value: impl Into<Value>) -> Node {
        let (key, id, handle) = self.state.add_node(NodeKind::Input(InputNode::new(value.into())));
        Node::from_parts(self.state.clone(), key, id, handle)
    }

    /// A function node. Nothing runs until a value is requested.
    pub fn create_node(
        &self,
        definition: Rc<FunctionDefinition>,
        args: Vec<Arg<Node>>,
        kwargs: Vec<(&str, Arg<Node>)>,
    ) -> Result<Node> {
        let args = args
            .into_iter()
            .map(|a| self.arg_keys(a))
            .collect::<Result<Vec<_>>>()?;
        let kwargs = kwargs
            .into_iter()
            .map(|(k, a)| Ok((Rc::<str>::from(k), self.arg_keys(a)?)))
            .collect::<Result<Vec<_>>>()?;
        let call = FuncCall::new(definition, args, kwargs).with_bounds(self.state.config.search_bounds());
        let policy = self.state.config.default_cache_policy;
        let (key, id, handle) = self.state.add_node(NodeKind::Function(FunctionNode::new(call, policy)));
        Ok(Node::from_parts(self.state.clone(), key, id, handle))
    }

    pub fn call(&self, name: &str, args: Vec<Arg<Node>>) -> Result<Node> {
        self.call_with(name, args, vec![])
    }

    pub fn call_with(
        &self,
        name: &str,
        args: Vec<Arg<Node>>,
        kwargs: Vec<(&str, Arg<Node>)>,
    ) -> Result<Node> {
        self.create_node(self.definition(name)?, args, kwargs)
    }

    fn arg_keys(&self, arg: Arg<Node>) -> Result<Arg<NodeKey>> {
        Ok(match arg {
            Arg::Const(value) => Arg::Const(value),
            Arg::Source(node) if Rc::ptr_eq(&node.state, &self.state) => Arg::Source(node.key),
            Arg::Source(node) => {
                return Err(EngineError::Argument(format!(
                    "{:?} belongs to another graph",
                    node.id
                )))
            }
            Arg::Seq(items) => Arg::Seq(
                items
                    .into_iter()
                    .map(|a| self.arg_keys(a))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }

    /// Register `f` as a function over arrays that loops over all but the trailing `core`
    /// dimensions of its arguments. Arguments are named `arg0`, `arg1`, and so on.
    pub fn vectorize(
        &self,
        name: &str,
        core: CoreDims,
        f: impl Fn(&[Value]) -> Result<Value, CallError> + 'static,
    ) -> Rc<FunctionDefinition> {
        let arity = core.inputs.len();
        let names: Vec<String> = (0..arity).map(|i| format!("arg{i}")).collect();
        let dims = core.clone();
        let definition = FunctionDefinition::builder(name)
            .signature(Signature::new(names.iter().map(String::as_str)))
            .data_arguments((0..arity).map(DataArgumentSpec::single))
            .evaluate(move |inv| {
                let args = names
                    .iter()
                    .map(|name| inv.arg(name))
                    .collect::<Result<Vec<_>, _>>()?;
                apply_vectorized(&dims, &args, &f)
            })
            .translator(VectorizeTranslator(core))
            .build();
        self.register(definition)
    }

    pub fn node_count(&self) -> usize {
        self.state.nodes.borrow().len()
    }

    /// Drop every node that is neither held by a [`Node`] nor needed by one.
    pub fn collect_garbage(&self) -> usize {
        self.state.collect_garbage()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            created: self.state.num_nodes_created.get(),
            collected: self.state.num_nodes_collected.get(),
            executions: self.state.num_executions.get(),
            invalidations: self.state.num_invalidations.get(),
            inversions: self.state.num_inversions.get(),
            live: self.node_count(),
        }
    }

    pub fn save_dot_to_file(&self, named: &str) -> std::io::Result<()> {
        self.state.save_dot_to_file(named)
    }

    pub fn save_dot_to_string(&self) -> String {
        self.state.save_dot_to_string()
    }

    pub fn save_dot(&self, f: &mut dyn fmt::Write) -> fmt::Result {
        self.state.save_dot(f)
    }
}

fn apply_vectorized(
    core: &CoreDims,
    args: &[Value],
    f: &dyn Fn(&[Value]) -> Result<Value, CallError>,
) -> Result<Value, CallError> {
    let arrays = args
        .iter()
        .map(Value::to_array)
        .collect::<Result<Vec<_>, _>>()?;
    let mut loop_shape = Shape::new();
    for (i, array) in arrays.iter().enumerate() {
        let dims = core.input(i);
        if dims > array.ndim() {
            return Err(CallError::argument(
                format!("arg{i}"),
                format!("needs {dims} core dimensions, has {}", array.ndim()),
            ));
        }
        loop_shape = broadcast_shapes(&loop_shape, &array.shape()[..array.ndim() - dims])?;
    }
    let mut blocks = Vec::with_capacity(arrays.len());
    for (i, array) in arrays.iter().enumerate() {
        let core_shape: Shape = array.shape()[array.ndim() - core.input(i)..].into();
        let mut full = loop_shape.clone();
        full.extend_from_slice(&core_shape);
        blocks.push((array.broadcast_to(&full)?, core_shape));
    }
    let iterations = size_of(&loop_shape);
    let mut outputs: Vec<NdArray<Scalar>> = Vec::with_capacity(iterations);
    for j in 0..iterations {
        let mut inner = Vec::with_capacity(blocks.len());
        for (array, core_shape) in &blocks {
            let size = size_of(core_shape);
            let data = array.data()[j * size..(j + 1) * size].to_vec();
            inner.push(if core_shape.is_empty() {
                Value::from(data[0])
            } else {
                Value::Array(NdArray::from_shape_vec(core_shape.clone(), data)?)
            });
        }
        outputs.push(f(&inner)?.to_array()?);
    }
    if outputs.is_empty() {
        return Ok(Value::Array(NdArray::from_shape_vec(loop_shape, vec![])?));
    }
    let stacked = NdArray::stack(&outputs)?;
    let shape: Vec<isize> = loop_shape
        .iter()
        .chain(&stacked.shape()[1..])
        .map(|&d| d as isize)
        .collect();
    let inputs: Vec<&Value> = args.iter().collect();
    Ok(array_result(stacked.into_shape(&shape)?, &inputs))
}

/// A handle to one node of a [`Graph`].
#[derive(Clone)]
pub struct Node {
    pub(crate) state: Rc<State>,
    pub(crate) key: NodeKey,
    pub(crate) id: NodeId,
    _handle: Rc<Handle>,
}

impl Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.node(self.key) {
            Ok(data) => data.fmt(f),
            Err(_) => write!(f, "Node({:?})", self.id),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state) && self.key == other.key
    }
}

impl From<&Node> for Arg<Node> {
    fn from(node: &Node) -> Self {
        Arg::Source(node.clone())
    }
}

impl From<Node> for Arg<Node> {
    fn from(node: Node) -> Self {
        Arg::Source(node)
    }
}

impl Node {
    fn from_parts(state: Rc<State>, key: NodeKey, id: NodeId, handle: Rc<Handle>) -> Self {
        Node {
            state,
            key,
            id,
            _handle: handle,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn graph(&self) -> Graph {
        Graph {
            state: self.state.clone(),
        }
    }

    fn data(&self) -> Result<Rc<NodeData>> {
        self.state.node(self.key)
    }

    /// The name of the function this node calls. `None` for inputs.
    pub fn function_name(&self) -> Option<Rc<str>> {
        match &self.data().ok()?.kind {
            NodeKind::Input(_) => None,
            NodeKind::Function(func) => Some(func.call.name().clone()),
        }
    }

    pub fn get_value(&self) -> Result<Value> {
        self.get_value_at(&Path::root())
    }

    /// The whole value, guaranteed valid at `path`. Parts elsewhere may be stale.
    pub fn get_value_at(&self, path: &Path) -> Result<Value> {
        self.state.check_outside_evaluation(self.id)?;
        self.state.value_at(self.key, Some(path), &EvalContext::default())
    }

    pub fn get_shape(&self) -> Result<Shape> {
        self.state.check_outside_evaluation(self.id)?;
        Ok(self.state.value_at(self.key, None, &EvalContext::default())?.shape())
    }

    pub fn get_type(&self) -> Result<ValueType> {
        self.state.check_outside_evaluation(self.id)?;
        Ok(self.state.value_at(self.key, None, &EvalContext::default())?.ty())
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.data()
            .map(|d| d.cache_status())
            .unwrap_or(CacheStatus::AllInvalid)
    }

    pub fn state(&self) -> NodeState {
        self.data().map(|d| d.state()).unwrap_or(NodeState::Uncomputed)
    }

    /// Make the node's value at `path` equal `value`, by inverting through functions down to
    /// inputs or overridable nodes.
    pub fn assign(&self, path: Path, value: impl Into<Value>) -> Result<()> {
        self.state.check_outside_evaluation(self.id)?;
        self.state.assign(self.key, Assignment::new(path, value))
    }

    pub fn invalidate_at(&self, path: &Path) -> Result<()> {
        self.state.check_outside_evaluation(self.id)?;
        self.state.invalidate_at(self.key, path)
    }

    /// Invalidate everything. Random nodes draw again on the next read.
    pub fn invalidate(&self) -> Result<()> {
        self.invalidate_at(&Path::root())
    }

    /// `None` for inputs, which have nothing to cache.
    pub fn cache_policy(&self) -> Option<CachePolicy> {
        match &self.data().ok()?.kind {
            NodeKind::Input(_) => None,
            NodeKind::Function(func) => Some(func.policy.get()),
        }
    }

    pub fn set_cache_policy(&self, policy: CachePolicy) {
        if let Ok(data) = self.data() {
            if let NodeKind::Function(func) = &data.kind {
                func.policy.set(policy);
                if policy == CachePolicy::Never {
                    func.cache.borrow_mut().take();
                }
            }
        }
    }

    pub fn allows_overriding(&self) -> bool {
        self.data().is_ok_and(|data| data.allows_overriding())
    }

    /// Let assignments to this function node be stored as overrides of its result instead of
    /// being inverted into its sources.
    pub fn set_allow_overriding(&self, allow: bool) {
        if let Ok(data) = self.data() {
            if let NodeKind::Function(func) = &data.kind {
                func.allow_overriding.set(allow);
            }
        }
    }

    /// Restrict where assignments made to this node end up. An assignment is stored at the
    /// first node on its way upstream that allows overriding and is listed here. Listing the
    /// node itself makes it overridable. An empty list refuses all assignments.
    pub fn set_assigned_nodes(&self, nodes: &[&Node]) -> Result<()> {
        let data = self.data()?;
        let mut keys = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !Rc::ptr_eq(&node.state, &self.state) {
                return Err(EngineError::Argument(format!(
                    "{:?} belongs to another graph",
                    node.id
                )));
            }
            keys.push(node.key);
        }
        if keys.contains(&self.key) {
            self.set_allow_overriding(true);
        }
        *data.assigned.borrow_mut() = Some(keys);
        Ok(())
    }

    /// Let assignments go to any overridable node upstream again.
    pub fn clear_assigned_nodes(&self) {
        if let Ok(data) = self.data() {
            data.assigned.borrow_mut().take();
        }
    }

    pub fn assigned_nodes(&self) -> Option<Vec<NodeId>> {
        let data = self.data().ok()?;
        let keys = data.assigned.borrow().clone()?;
        Some(
            keys.into_iter()
                .filter_map(|key| self.state.node(key).ok().map(|n| n.id))
                .collect(),
        )
    }

    /// Fit future assignments stored at this node to `template`. Overrides already stored
    /// keep their values.
    pub fn set_assignment_template(&self, template: Option<AssignmentTemplate>) -> Result<()> {
        self.data()?.update_overrides(|o| o.set_template(template));
        Ok(())
    }

    pub fn assignment_template(&self) -> Option<AssignmentTemplate> {
        self.data().ok()?.template()
    }

    pub fn list_overrides(&self) -> Vec<Assignment> {
        self.data().map(|d| d.overrides()).unwrap_or_default()
    }

    /// Replace every override, as when restoring saved assignments.
    pub fn apply_overrides(&self, assignments: Vec<Assignment>) -> Result<()> {
        self.state.check_outside_evaluation(self.id)?;
        self.data()?.update_overrides(|o| o.replace(assignments));
        self.state.invalidate_at(self.key, &Path::root())
    }

    pub fn remove_override_at(&self, path: &Path) -> Result<Option<Value>> {
        self.state.check_outside_evaluation(self.id)?;
        let mut removed = None;
        self.data()?.update_overrides(|o| removed = o.remove_at(path));
        if removed.is_some() {
            self.state.invalidate_at(self.key, path)?;
        }
        Ok(removed)
    }

    pub fn clear_overrides(&self) -> Result<()> {
        self.state.check_outside_evaluation(self.id)?;
        self.data()?.update_overrides(|o| o.clear());
        self.state.invalidate_at(self.key, &Path::root())
    }

    /// `self[item]`, as a new node.
    pub fn item(&self, item: impl Into<Value>) -> Result<Node> {
        self.graph()
            .call("getitem", vec![self.into(), Arg::Const(item.into())])
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Stats {
    pub created: usize,
    pub collected: usize,
    /// Function bodies run, including metadata-only runs.
    pub executions: usize,
    pub invalidations: usize,
    pub inversions: usize,
    pub live: usize,
}

#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct StatsDiff {
    pub created: isize,
    pub collected: isize,
    pub executions: isize,
    pub invalidations: isize,
    pub inversions: isize,
    pub live: isize,
}

impl Debug for StatsDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("StatsDiff");
        let mut field = |name: &str, x: isize| {
            if x != 0 {
                f.field(name, &x);
            }
        };
        field("created", self.created);
        field("collected", self.collected);
        field("executions", self.executions);
        field("invalidations", self.invalidations);
        field("inversions", self.inversions);
        field("live", self.live);
        f.finish()
    }
}

impl Stats {
    pub fn diff(&self, other: Self) -> StatsDiff {
        StatsDiff {
            created: self.created as isize - other.created as isize,
            collected: self.collected as isize - other.collected as isize,
            executions: self.executions as isize - other.executions as isize,
            invalidations: self.invalidations as isize - other.invalidations as isize,
            inversions: self.inversions as isize - other.inversions as isize,
            live: self.live as isize - other.live as isize,
        }
    }
}

impl Sub for Stats {
    type Output = StatsDiff;
    fn sub(self, rhs: Self) -> Self::Output {
        self.diff(rhs)
    }
}
