//! Backward liveness of locals.
//!
//! A local is live on entry to a node if some path from that node reads it before it is
//! overwritten as a whole. The region of a region-carrying local starts out as exactly
//! the set of nodes where it is live; this is what makes borrows non-lexical.

use crate::borrow_log;
use crate::compiler_frontend::analysis::borrow_checker::FunctionContext;
use crate::compiler_frontend::analysis::borrow_checker::accesses::AccessKind;
use crate::compiler_frontend::analysis::borrow_checker::state::PointSet;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::hir::hir_nodes::{LocalId, Statement};
use crate::return_compiler_error;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub(super) struct Liveness {
    /// Per node, the set of locals live on entry.
    live_in: Vec<PointSet>,

    pub visits: usize,
}

impl Liveness {
    /// Nodes where the local is live on entry.
    pub(super) fn live_points(&self, local: LocalId, node_count: usize) -> PointSet {
        let mut points = PointSet::empty(node_count);
        for (index, set) in self.live_in.iter().enumerate() {
            if set.contains(local.index()) {
                points.insert(index);
            }
        }
        points
    }
}

pub(super) fn compute_liveness(context: &FunctionContext<'_>) -> Result<Liveness, CompilerError> {
    let layout = &context.layout;
    let local_count = layout.local_count;
    let node_count = layout.node_count;

    let mut uses = vec![PointSet::empty(local_count); node_count];
    let mut defs = vec![PointSet::empty(local_count); node_count];

    for node_id in &layout.reachable {
        let index = node_id.index();

        for access in context.accesses.accesses_at(*node_id) {
            let is_whole_write =
                access.kind == AccessKind::Write && access.place.is_whole_local();
            let is_partial_write = access.kind == AccessKind::Write && !access.place.has_deref();

            if is_whole_write {
                defs[index].insert(access.place.root.index());
            } else if !is_partial_write {
                uses[index].insert(access.place.root.index());
            }
        }

        // Storage dies at scope end, so nothing declared there is live above it.
        if let Statement::ScopeEnd(scope) = context.function.nodes[index].statement {
            for local in &layout.locals_by_scope[scope.index()] {
                defs[index].insert(local.index());
            }
        }
    }

    let mut live_in = vec![PointSet::empty(local_count); node_count];
    let mut visits_by_node = vec![0usize; node_count];
    let mut total_visits = 0usize;

    // Seeding in reverse reachable order lets most nodes settle on the first visit.
    let mut worklist = layout.reachable.iter().rev().copied().collect::<VecDeque<_>>();
    let mut queued = layout.reachable_set.clone();

    while let Some(node_id) = worklist.pop_front() {
        let index = node_id.index();
        queued.remove(index);

        visits_by_node[index] += 1;
        total_visits += 1;
        if visits_by_node[index] > context.config.max_dataflow_visits_per_node {
            return_compiler_error!(
                "Liveness did not converge at node {} of function '{}' after {} visits",
                node_id,
                context.function_name(),
                context.config.max_dataflow_visits_per_node;
                {
                    CompilationStage => "Liveness Analysis",
                    IterationCap => "max_dataflow_visits_per_node",
                }
            );
        }

        let mut live_out = PointSet::empty(local_count);
        for successor in &context.function.nodes[index].successors {
            live_out.union_with(&live_in[successor.index()]);
        }

        live_out.subtract(&defs[index]);
        live_out.union_with(&uses[index]);

        if live_out == live_in[index] {
            continue;
        }

        live_in[index] = live_out;
        for predecessor in &layout.predecessors[index] {
            if queued.insert(predecessor.index()) {
                worklist.push_back(*predecessor);
            }
        }
    }

    borrow_log!(format!(
        "[Liveness] '{}' converged after {} node visits",
        context.function_name(),
        total_visits
    ));

    Ok(Liveness {
        live_in,
        visits: total_visits,
    })
}
