//! What a function is: its body, its signature, which arguments carry data, and how paths and
//! assignments travel through it.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::call::{FuncCall, Signature};
use crate::error::CallError;
use crate::invert::Inverter;
use crate::node::AccessToken;
use crate::public::Node;
use crate::translate::{BackwardTranslator, ForwardTranslator};
use crate::value::Value;

pub type EvaluateFn = Rc<dyn Fn(&Invocation<'_>) -> Result<Value, CallError>>;

/// A formal parameter whose sources are data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataArgumentSpec {
    pub formal: usize,
    /// The argument is a sequence whose every element is a data argument.
    pub multi: bool,
}

impl DataArgumentSpec {
    pub fn single(formal: usize) -> Self {
        Self {
            formal,
            multi: false,
        }
    }

    pub fn multi(formal: usize) -> Self {
        Self {
            formal,
            multi: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefinitionFlags {
    pub random: bool,
    pub file_loading: bool,
    pub graphics: bool,
    pub operator: bool,
    /// Whether the result depends on the sources at all. Proxies say no.
    pub creates_dependency: bool,
}

impl Default for DefinitionFlags {
    fn default() -> Self {
        Self {
            random: false,
            file_loading: false,
            graphics: false,
            operator: false,
            creates_dependency: true,
        }
    }
}

pub struct FunctionDefinition {
    pub name: Rc<str>,
    pub signature: Signature,
    pub data_arguments: Vec<DataArgumentSpec>,
    pub flags: DefinitionFlags,
    pub evaluate: EvaluateFn,
    pub inverters: Vec<Rc<dyn Inverter>>,
    pub backward_translators: Vec<Rc<dyn BackwardTranslator>>,
    pub forward_translators: Vec<Rc<dyn ForwardTranslator>>,
}

impl fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("name", &self.name)
            .field("data_arguments", &self.data_arguments)
            .field("flags", &self.flags)
            .field("inverters", &self.inverters.len())
            .field("backward_translators", &self.backward_translators.len())
            .field("forward_translators", &self.forward_translators.len())
            .finish()
    }
}

impl FunctionDefinition {
    pub fn builder(name: &str) -> DefinitionBuilder {
        DefinitionBuilder {
            def: FunctionDefinition {
                name: name.into(),
                signature: Signature::default(),
                data_arguments: Vec::new(),
                flags: DefinitionFlags::default(),
                evaluate: Rc::new(|_| Err(CallError::msg("function has no body"))),
                inverters: Vec::new(),
                backward_translators: Vec::new(),
                forward_translators: Vec::new(),
            },
        }
    }

    pub fn is_impure(&self) -> bool {
        self.flags.random || self.flags.file_loading
    }

    pub fn is_data_formal(&self, formal: usize) -> bool {
        self.data_arguments.iter().any(|d| d.formal == formal)
    }
}

pub struct DefinitionBuilder {
    def: FunctionDefinition,
}

impl DefinitionBuilder {
    pub fn signature(mut self, signature: Signature) -> Self {
        self.def.signature = signature;
        self
    }

    pub fn data_arguments(mut self, data: impl IntoIterator<Item = DataArgumentSpec>) -> Self {
        self.def.data_arguments = data.into_iter().collect();
        self
    }

    pub fn flags(mut self, flags: DefinitionFlags) -> Self {
        self.def.flags = flags;
        self
    }

    pub fn evaluate(
        mut self,
        f: impl Fn(&Invocation<'_>) -> Result<Value, CallError> + 'static,
    ) -> Self {
        self.def.evaluate = Rc::new(f);
        self
    }

    pub fn inverter(mut self, inverter: impl Inverter + 'static) -> Self {
        self.def.inverters.push(Rc::new(inverter));
        self
    }

    pub fn backward(mut self, translator: impl BackwardTranslator + 'static) -> Self {
        self.def.backward_translators.push(Rc::new(translator));
        self
    }

    pub fn forward(mut self, translator: impl ForwardTranslator + 'static) -> Self {
        self.def.forward_translators.push(Rc::new(translator));
        self
    }

    /// Register the same translator for both directions.
    pub fn translator<T>(mut self, translator: T) -> Self
    where
        T: BackwardTranslator + ForwardTranslator + 'static,
    {
        let translator = Rc::new(translator);
        self.def.backward_translators.push(translator.clone());
        self.def.forward_translators.push(translator);
        self
    }

    pub fn build(self) -> FunctionDefinition {
        self.def
    }
}

/// What a function body sees: its call with every source replaced by its value.
pub struct Invocation<'a> {
    call: &'a FuncCall<Value>,
    token: Option<&'a AccessToken>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(call: &'a FuncCall<Value>, token: Option<&'a AccessToken>) -> Self {
        Self { call, token }
    }

    pub fn call(&self) -> &FuncCall<Value> {
        self.call
    }

    /// A required argument, by parameter name.
    pub fn arg(&self, name: &str) -> Result<Value, CallError> {
        self.call
            .param(name)
            .ok_or_else(|| CallError::argument(name, "missing"))
    }

    /// An optional argument. An explicit `None` counts as absent.
    pub fn arg_opt(&self, name: &str) -> Option<Value> {
        self.call.param(name).filter(|v| !matches!(v, Value::None))
    }

    /// The positional arguments as passed.
    pub fn positional(&self) -> Vec<Value> {
        self.call
            .args
            .iter()
            .filter_map(|a| a.to_value())
            .collect()
    }

    /// Read another node from inside a running body. Only the call's own sources are readable.
    pub fn read(&self, node: &Node) -> Result<Value, CallError> {
        match self.token {
            Some(token) => Ok(token.read(node)?),
            None => Err(CallError::msg("no graph access while computing metadata")),
        }
    }
}

/// Name to definition. Every graph starts with the built-in library.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    definitions: HashMap<Rc<str>, Rc<FunctionDefinition>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::library::register_all(&mut registry);
        registry
    }

    pub fn register(&mut self, definition: FunctionDefinition) -> Rc<FunctionDefinition> {
        let definition = Rc::new(definition);
        if self
            .definitions
            .insert(definition.name.clone(), definition.clone())
            .is_some()
        {
            tracing::debug!(name = %definition.name, "replaced function definition");
        }
        definition
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_function_definition(
        &mut self,
        name: &str,
        data_arguments: impl IntoIterator<Item = DataArgumentSpec>,
        inverters: Vec<Rc<dyn Inverter>>,
        backward_translators: Vec<Rc<dyn BackwardTranslator>>,
        forward_translators: Vec<Rc<dyn ForwardTranslator>>,
        flags: DefinitionFlags,
        signature: Signature,
        evaluate: EvaluateFn,
    ) -> Rc<FunctionDefinition> {
        self.register(FunctionDefinition {
            name: name.into(),
            signature,
            data_arguments: data_arguments.into_iter().collect(),
            flags,
            evaluate,
            inverters,
            backward_translators,
            forward_translators,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Rc<FunctionDefinition>> {
        self.definitions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &Rc<str>> {
        self.definitions.keys()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
