//! Deferred function calls and the sources found in their arguments.

use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

use crate::definition::FunctionDefinition;
use crate::value::Value;

/// One argument. Sources may sit at the top level or inside literal sequences.
#[derive(Clone)]
pub enum Arg<S> {
    Const(Value),
    Source(S),
    Seq(Vec<Arg<S>>),
}

impl<S: fmt::Debug> fmt::Debug for Arg<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Const(v) => v.fmt(f),
            Arg::Source(s) => s.fmt(f),
            Arg::Seq(items) => f.debug_list().entries(items).finish(),
        }
    }
}

/// Anything that may stand in for a source and possibly knows its value.
pub trait SourceValue {
    fn known_value(&self) -> Option<&Value>;
}

impl SourceValue for Value {
    fn known_value(&self) -> Option<&Value> {
        Some(self)
    }
}

impl<S: SourceValue> Arg<S> {
    /// The argument as a plain value, if every source in it is known.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Arg::Const(v) => Some(v.clone()),
            Arg::Source(s) => s.known_value().cloned(),
            Arg::Seq(items) => items
                .iter()
                .map(Arg::to_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::list),
        }
    }
}

impl<S> Arg<S> {
    pub fn as_source(&self) -> Option<&S> {
        match self {
            Arg::Source(s) => Some(s),
            _ => None,
        }
    }
}

impl<S> From<Value> for Arg<S> {
    fn from(value: Value) -> Self {
        Arg::Const(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgId {
    Position(usize),
    Keyword(Rc<str>),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Rc<str>,
    pub default: Option<Value>,
}

/// Formal parameters, in positional order.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            params: names
                .into_iter()
                .map(|name| Param {
                    name: name.into(),
                    default: None,
                })
                .collect(),
        }
    }

    pub fn with_default(mut self, name: &str, default: impl Into<Value>) -> Self {
        let default = Some(default.into());
        match self.params.iter_mut().find(|p| &*p.name == name) {
            Some(param) => param.default = default,
            None => self.params.push(Param {
                name: name.into(),
                default,
            }),
        }
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| &*p.name == name)
    }

    pub fn formal_of(&self, id: &ArgId) -> Option<usize> {
        match id {
            ArgId::Position(i) if *i < self.params.len() => Some(*i),
            ArgId::Position(_) => None,
            ArgId::Keyword(name) => self.index_of(name),
        }
    }
}

/// How deep and how wide the search for sources inside literal sequences goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBounds {
    pub depth: usize,
    pub length: usize,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            depth: 3,
            length: 32,
        }
    }
}

/// Where a source occurrence sits in a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// The argument as it was passed.
    pub argument: ArgId,
    /// The formal parameter it binds to, if any.
    pub formal: Option<usize>,
    /// Positions inside nested literal sequences.
    pub within: SmallVec<[usize; 2]>,
    /// Order of appearance among all sources of the call.
    pub occurrence: usize,
    pub is_data: bool,
}

pub struct FuncCall<S> {
    pub definition: Rc<FunctionDefinition>,
    pub args: Vec<Arg<S>>,
    pub kwargs: Vec<(Rc<str>, Arg<S>)>,
    pub bounds: SearchBounds,
}

impl<S: Clone> Clone for FuncCall<S> {
    fn clone(&self) -> Self {
        Self {
            definition: self.definition.clone(),
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
            bounds: self.bounds,
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for FuncCall<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.definition.name)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{arg:?}")?;
        }
        for (name, arg) in &self.kwargs {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}={arg:?}")?;
        }
        write!(f, ")")
    }
}

impl<S> FuncCall<S> {
    pub fn new(
        definition: Rc<FunctionDefinition>,
        args: Vec<Arg<S>>,
        kwargs: Vec<(Rc<str>, Arg<S>)>,
    ) -> Self {
        Self {
            definition,
            args,
            kwargs,
            bounds: SearchBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: SearchBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn name(&self) -> &Rc<str> {
        &self.definition.name
    }

    /// The argument bound to a formal parameter, however it was passed. Defaults are not included.
    pub fn passed(&self, formal: usize) -> Option<&Arg<S>> {
        if let Some(arg) = self.args.get(formal) {
            return Some(arg);
        }
        let name = &self.definition.signature.params().get(formal)?.name;
        self.kwargs.iter().find(|(k, _)| k == name).map(|(_, a)| a)
    }

    /// The effective argument for an argument id, falling back to the parameter default.
    pub fn resolve(&self, id: &ArgId) -> Option<Arg<S>>
    where
        S: Clone,
    {
        match self.definition.signature.formal_of(id) {
            Some(formal) => self.passed(formal).cloned().or_else(|| {
                self.definition.signature.params()[formal]
                    .default
                    .clone()
                    .map(Arg::Const)
            }),
            None => match id {
                ArgId::Position(i) => self.args.get(*i).cloned(),
                ArgId::Keyword(name) => self
                    .kwargs
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, a)| a.clone()),
            },
        }
    }

    fn classify(&self, argument: &ArgId, within: &[usize]) -> (Option<usize>, bool) {
        let formal = self.definition.signature.formal_of(argument);
        let in_bounds = within.len() <= self.bounds.depth
            && within.iter().all(|&i| i < self.bounds.length);
        let is_data = in_bounds && formal.is_some_and(|f| self.definition.is_data_formal(f));
        (formal, is_data)
    }

    fn walk<'a>(
        &'a self,
        arg: &'a Arg<S>,
        argument: &ArgId,
        within: &mut SmallVec<[usize; 2]>,
        out: &mut Vec<(SourceLocation, &'a S)>,
    ) {
        match arg {
            Arg::Const(_) => {}
            Arg::Source(s) => {
                let (formal, is_data) = self.classify(argument, within);
                let occurrence = out.len();
                out.push((
                    SourceLocation {
                        argument: argument.clone(),
                        formal,
                        within: within.clone(),
                        occurrence,
                        is_data,
                    },
                    s,
                ));
            }
            Arg::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    within.push(i);
                    self.walk(item, argument, within, out);
                    within.pop();
                }
            }
        }
    }

    /// Every source occurrence with its location, in argument order.
    pub fn source_locations(&self) -> Vec<(SourceLocation, &S)> {
        let mut out = Vec::new();
        let mut within = SmallVec::new();
        for (i, arg) in self.args.iter().enumerate() {
            self.walk(arg, &ArgId::Position(i), &mut within, &mut out);
        }
        for (name, arg) in &self.kwargs {
            self.walk(arg, &ArgId::Keyword(name.clone()), &mut within, &mut out);
        }
        out
    }

    pub fn location_of(&self, occurrence: usize) -> Option<SourceLocation> {
        self.source_locations()
            .into_iter()
            .nth(occurrence)
            .map(|(loc, _)| loc)
    }

    /// Rewrite every source occurrence, data and parameter sources each with their own function.
    pub fn transform<T, E>(
        &self,
        mut data_fn: impl FnMut(&SourceLocation, &S) -> Result<Arg<T>, E>,
        mut param_fn: impl FnMut(&SourceLocation, &S) -> Result<Arg<T>, E>,
    ) -> Result<FuncCall<T>, E> {
        let mut occurrence = 0;
        let mut rewrite = |arg: &Arg<S>, argument: ArgId| -> Result<Arg<T>, E> {
            fn go<S, T, E>(
                call: &FuncCall<S>,
                arg: &Arg<S>,
                argument: &ArgId,
                within: &mut SmallVec<[usize; 2]>,
                occurrence: &mut usize,
                f: &mut dyn FnMut(&SourceLocation, &S) -> Result<Arg<T>, E>,
                g: &mut dyn FnMut(&SourceLocation, &S) -> Result<Arg<T>, E>,
            ) -> Result<Arg<T>, E> {
                Ok(match arg {
                    Arg::Const(v) => Arg::Const(v.clone()),
                    Arg::Source(s) => {
                        let (formal, is_data) = call.classify(argument, within);
                        let location = SourceLocation {
                            argument: argument.clone(),
                            formal,
                            within: within.clone(),
                            occurrence: *occurrence,
                            is_data,
                        };
                        *occurrence += 1;
                        if is_data {
                            f(&location, s)?
                        } else {
                            g(&location, s)?
                        }
                    }
                    Arg::Seq(items) => {
                        let mut out = Vec::with_capacity(items.len());
                        for (i, item) in items.iter().enumerate() {
                            within.push(i);
                            out.push(go(call, item, argument, within, occurrence, f, g)?);
                            within.pop();
                        }
                        Arg::Seq(out)
                    }
                })
            }
            let mut within = SmallVec::new();
            go(
                self,
                arg,
                &argument,
                &mut within,
                &mut occurrence,
                &mut data_fn,
                &mut param_fn,
            )
        };
        let mut args = Vec::with_capacity(self.args.len());
        for (i, arg) in self.args.iter().enumerate() {
            args.push(rewrite(arg, ArgId::Position(i))?);
        }
        let mut kwargs = Vec::with_capacity(self.kwargs.len());
        for (name, arg) in &self.kwargs {
            kwargs.push((name.clone(), rewrite(arg, ArgId::Keyword(name.clone()))?));
        }
        Ok(FuncCall {
            definition: self.definition.clone(),
            args,
            kwargs,
            bounds: self.bounds,
        })
    }

    /// The data arguments of the call, with multi-arguments expanded into their elements.
    pub fn data_arguments(&self) -> Vec<DataArgument<'_, S>> {
        let mut out = Vec::new();
        for designation in &self.definition.data_arguments {
            let Some(arg) = self.passed(designation.formal) else {
                continue;
            };
            match (designation.multi, arg) {
                (true, Arg::Seq(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        out.push(DataArgument {
                            formal: designation.formal,
                            element: Some(i),
                            arg: item,
                        });
                    }
                }
                _ => out.push(DataArgument {
                    formal: designation.formal,
                    element: None,
                    arg,
                }),
            }
        }
        out
    }
}

impl<S: Clone + SourceValue> FuncCall<S> {
    /// A fully resolved parameter, from the call or the signature default.
    pub fn param(&self, name: &str) -> Option<Value> {
        self.resolve(&ArgId::Keyword(name.into()))?.to_value()
    }
}

/// One data argument of a call, as seen by translators.
#[derive(Debug)]
pub struct DataArgument<'a, S> {
    pub formal: usize,
    /// Position inside a multi-argument sequence.
    pub element: Option<usize>,
    pub arg: &'a Arg<S>,
}

impl<'a, S> DataArgument<'a, S> {
    /// Whether this data argument holds the source occurrence at `location`.
    pub fn contains(&self, location: &SourceLocation) -> bool {
        location.formal == Some(self.formal)
            && match self.element {
                Some(i) => location.within.first() == Some(&i),
                None => true,
            }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::definition::{DataArgumentSpec, FunctionDefinition};
    use test_log::test;

    fn definition() -> Rc<FunctionDefinition> {
        Rc::new(
            FunctionDefinition::builder("clip")
                .signature(Signature::new(["a", "lo", "hi"]).with_default("hi", 10))
                .data_arguments([DataArgumentSpec::single(0)])
                .evaluate(|inv| inv.arg("a"))
                .build(),
        )
    }

    #[test]
    fn arguments_resolve_by_position_keyword_or_default() {
        let call: FuncCall<Value> = FuncCall::new(
            definition(),
            vec![Arg::Const(Value::Int(1))],
            vec![("lo".into(), Arg::Const(Value::Int(0)))],
        );
        assert_eq!(call.param("a"), Some(Value::Int(1)));
        assert_eq!(call.param("lo"), Some(Value::Int(0)));
        assert_eq!(call.param("hi"), Some(Value::Int(10)));
        assert_eq!(call.resolve(&ArgId::Position(1)).and_then(|a| a.to_value()), Some(Value::Int(0)));
    }

    #[test]
    fn sources_are_classified_by_formal_parameter() {
        let call: FuncCall<&str> = FuncCall::new(
            definition(),
            vec![
                Arg::Seq(vec![Arg::Source("x"), Arg::Const(Value::Int(1))]),
                Arg::Source("lo"),
            ],
            vec![("hi".into(), Arg::Source("hi"))],
        );
        let locations = call.source_locations();
        assert_eq!(locations.len(), 3);
        assert!(locations[0].0.is_data);
        assert_eq!(&locations[0].0.within[..], &[0]);
        assert!(!locations[1].0.is_data);
        assert_eq!(locations[2].0.formal, Some(2));
        assert_eq!(locations[2].0.occurrence, 2);

        let rewritten: FuncCall<usize> = call
            .transform::<usize, ()>(
                |loc, _| Ok(Arg::Source(loc.occurrence)),
                |_, s| Ok(Arg::Const(Value::from(*s))),
            )
            .unwrap();
        assert!(matches!(rewritten.args[1], Arg::Const(Value::Str(_))));
        match &rewritten.args[0] {
            Arg::Seq(items) => assert!(matches!(items[0], Arg::Source(0))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn deep_sources_are_parameters() {
        let mut nested = Arg::Source("deep");
        for _ in 0..5 {
            nested = Arg::Seq(vec![nested]);
        }
        let call: FuncCall<&str> = FuncCall::new(definition(), vec![nested], vec![]);
        let locations = call.source_locations();
        assert_eq!(locations.len(), 1);
        assert!(!locations[0].0.is_data);
    }
}
