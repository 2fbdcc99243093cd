use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::cache::{create_cache, truncate_path_to_shallow, uncached_paths_matching, CacheStatus};
use crate::call::Arg;
use crate::definition::Invocation;
use crate::error::{CallError, EngineError, Result};
use crate::node::{AccessToken, CachePolicy, EvalContext, FunctionNode, NodeData, NodeKey, NodeKind};
use crate::path::{self, Path};
use crate::runner::{run_escalating, RunCondition};
use crate::source::{ResultMeta, Source, SourceCall};
use crate::translate::{Requirement, Requirements};
use crate::value::Value;
use crate::CellIncrement;

use super::State;

/// How much of each data source a [`SourceCall`] is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceDetail {
    Unknown,
    ShapeOnly,
    Full,
}

impl SourceDetail {
    pub(crate) fn for_translation(condition: RunCondition) -> Self {
        match condition {
            RunCondition::NoMetadata => SourceDetail::Unknown,
            RunCondition::WithMetadata => SourceDetail::ShapeOnly,
        }
    }

    pub(crate) fn for_inversion(condition: RunCondition) -> Self {
        match condition {
            RunCondition::NoMetadata => SourceDetail::Unknown,
            RunCondition::WithMetadata => SourceDetail::Full,
        }
    }
}

/// What one run needs from a parent, merged over all its occurrences.
fn merge_need(existing: Option<Path>, new: Option<Path>) -> Option<Path> {
    match (existing, new) {
        (None, need) | (need, None) => need,
        (Some(a), Some(b)) if a == b => Some(a),
        (Some(_), Some(_)) => Some(Path::root()),
    }
}

impl State {
    /// The value of a node, valid at least at `path`. `None` asks only for shape and type.
    #[tracing::instrument(level = "debug", skip(self, ctx))]
    pub(crate) fn value_at(&self, key: NodeKey, path: Option<&Path>, ctx: &EvalContext) -> Result<Value> {
        let node = self.node(key)?;
        let func = match &node.kind {
            NodeKind::Input(input) => return Ok(input.value()),
            NodeKind::Function(func) => func,
        };
        if node.computing.get() {
            return Err(EngineError::Reentrant { node: node.id });
        }
        ctx.enter(node.id);
        let base = match path {
            None => self.shape_only(&node, func, ctx),
            Some(path) => self.valid_at(&node, func, path, ctx),
        };
        ctx.leave();
        Ok(func.with_overrides(base?))
    }

    pub(crate) fn shape_only(&self, node: &NodeData, func: &FunctionNode, ctx: &EvalContext) -> Result<Value> {
        if let Some(cache) = func.cache.borrow().as_ref() {
            return Ok(cache.value().clone());
        }
        if func.call.definition.is_impure() {
            // Two runs of an impure function disagree, so metadata comes from the real thing.
            return self.valid_at(node, func, &Path::root(), ctx);
        }
        let (value, _) = self.run(node, func, None, ctx)?;
        if func.policy.get() != CachePolicy::Never {
            *func.cache.borrow_mut() = Some(create_cache(&value));
        }
        Ok(value)
    }

    fn valid_at(&self, node: &NodeData, func: &FunctionNode, path: &Path, ctx: &EvalContext) -> Result<Value> {
        let missing = uncached_paths_matching(func.cache.borrow().as_deref(), path);
        let mut last = None;
        for missing in missing {
            let (value, elapsed) = self.run(node, func, Some(&missing), ctx)?;
            if self.keeps_cache(func, elapsed, &value) {
                self.store(node, func, &missing, &value);
            } else if func.cache.borrow_mut().take().is_some() {
                tracing::trace!(node = ?node.id, "not worth caching");
            }
            last = Some(value);
        }
        if let Some(cache) = func.cache.borrow().as_ref() {
            return Ok(cache.value().clone());
        }
        match last {
            Some(value) => Ok(value),
            None => Ok(self.run(node, func, Some(path), ctx)?.0),
        }
    }

    fn keeps_cache(&self, func: &FunctionNode, elapsed: Duration, value: &Value) -> bool {
        let flags = &func.call.definition.flags;
        if flags.random || flags.graphics {
            return true;
        }
        match func.policy.get() {
            CachePolicy::Always => true,
            CachePolicy::Never => false,
            CachePolicy::Auto => {
                let established = func
                    .cache
                    .borrow()
                    .as_ref()
                    .is_some_and(|c| c.status() != CacheStatus::AllInvalid);
                established || self.config.worth_caching(elapsed, value.approx_size_bytes())
            }
        }
    }

    /// Record `value`, computed to be valid at `path`, in the node's cache.
    fn store(&self, node: &NodeData, func: &FunctionNode, path: &Path, value: &Value) {
        let mut slot = func.cache.borrow_mut();
        if !slot.as_ref().is_some_and(|c| c.matches_result(value)) {
            if slot.is_some() {
                tracing::debug!(node = ?node.id, "result no longer matches its cache");
            }
            *slot = Some(create_cache(value));
        }
        let Some(cache) = slot.as_mut() else {
            return;
        };
        let truncated = truncate_path_to_shallow(path, value);
        let stored = match path::get(value, &truncated) {
            Ok(part) => cache.set_valid(&truncated, part),
            Err(e) => Err(e.into()),
        };
        match stored {
            Ok(()) => {
                #[cfg(debug_assertions)]
                cache.invariant();
                tracing::trace!(node = ?node.id, path = %truncated, status = ?cache.status(), "cached");
            }
            Err(e) => {
                tracing::warn!(node = ?node.id, %path, "discarding cache: {e}");
                *slot = None;
            }
        }
    }

    /// What each data source must provide for the node to be valid at `path`. `None` when no
    /// translator could say, in which case every data source is needed whole.
    fn requirements(
        &self,
        node: &NodeData,
        func: &FunctionNode,
        path: &Path,
        ctx: &EvalContext,
    ) -> Result<Option<Requirements>> {
        let definition = func.call.definition.clone();
        let requirements = run_escalating(
            &definition.backward_translators,
            |condition| self.source_call(node, func, SourceDetail::for_translation(condition), ctx),
            |translator, (call, meta)| translator.backward(call, path, meta.as_ref()),
        )?;
        if requirements.is_none() {
            tracing::debug!(node = ?node.id, %path, "no backward translation, needing all sources");
        }
        Ok(requirements)
    }

    /// Run the node's function with its sources resolved as far as `path` needs them.
    pub(crate) fn run(
        &self,
        node: &NodeData,
        func: &FunctionNode,
        path: Option<&Path>,
        ctx: &EvalContext,
    ) -> Result<(Value, Duration)> {
        let requirements = match path {
            None => Some(Requirements::new()),
            Some(path) => self.requirements(node, func, path, ctx)?,
        };
        let mut needs: Vec<(NodeKey, Option<Path>)> = Vec::new();
        for (location, parent) in func.call.source_locations() {
            let need = match (&requirements, location.is_data) {
                (_, false) | (None, true) => Some(Path::root()),
                (Some(requirements), true) => match requirements.get(location.occurrence) {
                    Some(Requirement::Path(path)) => Some(path.clone()),
                    Some(Requirement::Shape) | None => None,
                },
            };
            match needs.iter_mut().find(|(k, _)| k == parent) {
                Some((_, existing)) => *existing = merge_need(existing.take(), need),
                None => needs.push((*parent, need)),
            }
        }
        let mut resolved: HashMap<NodeKey, Value> = HashMap::with_capacity(needs.len());
        for (parent, need) in &needs {
            let value = self.value_at(*parent, need.as_ref(), ctx)?;
            resolved.insert(*parent, value);
        }
        let lookup = |key: &NodeKey| -> Result<Arg<Value>> {
            resolved
                .get(key)
                .cloned()
                .map(Arg::Source)
                .ok_or(EngineError::Collected)
        };
        let call = func.call.transform(|_, k| lookup(k), |_, k| lookup(k))?;

        let definition = func.call.definition.clone();
        let mut chain = ctx.chain();
        if chain.last() != Some(&node.id) {
            chain.push(node.id);
        }
        let token = AccessToken {
            state: self.weak_self.clone(),
            allowed: resolved.keys().copied().collect(),
            chain: chain.clone(),
        };
        self.frames.borrow_mut().push(node.id);
        node.computing.set(true);
        let started = Instant::now();
        let result = tracing::info_span!("execute", function = %definition.name, node = ?node.id)
            .in_scope(|| (definition.evaluate)(&Invocation::new(&call, Some(&token))));
        let elapsed = started.elapsed();
        node.computing.set(false);
        self.frames.borrow_mut().pop();
        self.num_executions.increment();
        if path.is_some() {
            func.computed_once.set(true);
        }
        match result {
            Ok(value) => Ok((value, elapsed)),
            Err(CallError::Engine(e)) => Err(*e),
            Err(source) => Err(EngineError::External {
                function: definition.name.clone(),
                chain,
                source,
            }),
        }
    }

    /// The node's call as translators and inverters see it. Parameter sources are always
    /// resolved in full.
    pub(crate) fn source_call(
        &self,
        node: &NodeData,
        func: &FunctionNode,
        detail: SourceDetail,
        ctx: &EvalContext,
    ) -> Result<(SourceCall, Option<ResultMeta>)> {
        let call = func.call.transform::<Source, EngineError>(
            |location, key| {
                let occurrence = location.occurrence;
                Ok(Arg::Source(match detail {
                    SourceDetail::Unknown => Source::unknown(occurrence),
                    SourceDetail::ShapeOnly => Source::known(occurrence, self.value_at(*key, None, ctx)?),
                    SourceDetail::Full => {
                        Source::known(occurrence, self.value_at(*key, Some(&Path::root()), ctx)?)
                    }
                }))
            },
            |_, key| Ok(Arg::Const(self.value_at(*key, Some(&Path::root()), ctx)?)),
        )?;
        let meta = match detail {
            SourceDetail::Unknown => None,
            SourceDetail::ShapeOnly | SourceDetail::Full => {
                Some(ResultMeta::of(&self.shape_only(node, func, ctx)?))
            }
        };
        Ok((call, meta))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path;
    use test_log::test;

    #[test]
    fn needs_merge_to_the_root() {
        assert_eq!(merge_need(None, Some(path![1])), Some(path![1]));
        assert_eq!(merge_need(Some(path![1]), None), Some(path![1]));
        assert_eq!(merge_need(Some(path![1]), Some(path![1])), Some(path![1]));
        assert_eq!(merge_need(Some(path![1]), Some(path![2])), Some(Path::root()));
        assert_eq!(merge_need(None, None), None);
    }
}
