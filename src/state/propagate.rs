use crate::call::SourceLocation;
use crate::error::{EngineError, InversionError, Result};
use crate::invert::{Assignment, Inversal};
use crate::node::{EvalContext, FunctionNode, NodeData, NodeKey, NodeKind};
use crate::path::Path;
use crate::runner::run_escalating;
use crate::CellIncrement;

use super::evaluate::SourceDetail;
use super::State;

impl State {
    /// Mark `path` of a node stale, then everything downstream that depends on it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub(crate) fn invalidate_at(&self, key: NodeKey, path: &Path) -> Result<()> {
        let node = self.node(key)?;
        self.num_invalidations.increment();
        if let NodeKind::Function(func) = &node.kind {
            func.invalidate_self(node.id, path);
        }
        let children: Vec<NodeKey> = node.children.borrow().clone();
        for child_key in children {
            let Ok(child) = self.node(child_key) else {
                continue;
            };
            let NodeKind::Function(child_func) = &child.kind else {
                continue;
            };
            if !child_func.call.definition.flags.creates_dependency {
                continue;
            }
            for (location, parent) in child_func.call.source_locations() {
                if *parent != key {
                    continue;
                }
                let paths = if !location.is_data || !child_func.computed_once.get() {
                    vec![Path::root()]
                } else {
                    self.forward(&child, child_func, &location, path)
                };
                for child_path in paths {
                    self.invalidate_at(child_key, &child_path)?;
                }
            }
        }
        Ok(())
    }

    /// The paths of `child` affected by a change at `path` of the source at `location`.
    fn forward(
        &self,
        child: &NodeData,
        func: &FunctionNode,
        location: &SourceLocation,
        path: &Path,
    ) -> Vec<Path> {
        let ctx = EvalContext::default();
        let definition = func.call.definition.clone();
        let translated = run_escalating(
            &definition.forward_translators,
            |condition| self.source_call(child, func, SourceDetail::for_translation(condition), &ctx),
            |translator, (call, meta)| translator.forward(call, location, path, meta.as_ref()),
        );
        match translated {
            Ok(Some(paths)) => paths,
            Ok(None) => {
                tracing::debug!(node = ?child.id, %path, "no forward translation, invalidating all");
                vec![Path::root()]
            }
            Err(e) => {
                tracing::debug!(node = ?child.id, %path, "metadata unavailable, invalidating all: {e}");
                vec![Path::root()]
            }
        }
    }

    /// Assign into a node. Every inversion is planned before any override is stored, so a
    /// failure leaves all upstream data as it was.
    #[tracing::instrument(level = "debug", skip(self))]
    pub(crate) fn assign(&self, key: NodeKey, assignment: Assignment) -> Result<()> {
        let mut planned = Vec::new();
        self.plan_assignment(key, assignment, None, &mut planned, &EvalContext::default())?;
        for (target, assignment) in planned {
            let node = self.node(target)?;
            tracing::debug!(node = ?node.id, path = %assignment.path, "storing override");
            let path = assignment.path.clone();
            node.update_overrides(|overrider| overrider.push(assignment));
            self.invalidate_at(target, &path)?;
        }
        Ok(())
    }

    /// Store the assignment here if this node takes overrides and is one of `targets`, else
    /// invert it into the sources. The first node on the way with assigned nodes of its own
    /// sets `targets` for everything above it.
    fn plan_assignment(
        &self,
        key: NodeKey,
        assignment: Assignment,
        targets: Option<&[NodeKey]>,
        planned: &mut Vec<(NodeKey, Assignment)>,
        ctx: &EvalContext,
    ) -> Result<()> {
        let node = self.node(key)?;
        let assigned = node.assigned.borrow().clone();
        let targets = targets.or(assigned.as_deref());
        if node.allows_overriding() && targets.map_or(true, |t| t.contains(&key)) {
            planned.push((key, node.fit(assignment)?));
            return Ok(());
        }
        let func = match &node.kind {
            NodeKind::Function(func) => func,
            NodeKind::Input(_) => {
                return Err(InversionError::NotAssignable { node: node.id }.into());
            }
        };
        let inversals = match self.invert(key, &node, func, &assignment, ctx) {
            Ok(inversals) => inversals,
            Err(e) => {
                tracing::debug!(node = ?node.id, path = %assignment.path, "inversion failed: {e}");
                self.invalidate_at(key, &assignment.path)?;
                return Err(e);
            }
        };
        self.num_inversions.increment();
        let locations = func.call.source_locations();
        for inversal in inversals {
            let Some((_, parent)) = locations
                .iter()
                .find(|(location, _)| location.occurrence == inversal.occurrence)
            else {
                continue;
            };
            self.plan_assignment(**parent, inversal.assignment, targets, planned, ctx)?;
        }
        Ok(())
    }

    fn invert(
        &self,
        key: NodeKey,
        node: &NodeData,
        func: &FunctionNode,
        assignment: &Assignment,
        ctx: &EvalContext,
    ) -> Result<Vec<Inversal>> {
        let previous = self.value_at(key, Some(&Path::root()), ctx)?;
        let definition = func.call.definition.clone();
        let mut last_error = None;
        let inversals = run_escalating(
            &definition.inverters,
            |condition| self.source_call(node, func, SourceDetail::for_inversion(condition), ctx),
            |inverter, (call, _)| {
                inverter.invert(call, assignment, &previous).map_err(|e| {
                    last_error = Some(e.clone());
                    e
                })
            },
        )?;
        inversals.ok_or_else(|| {
            EngineError::Inversion(last_error.unwrap_or_else(|| InversionError::NoInverter {
                function: definition.name.clone(),
            }))
        })
    }
}
