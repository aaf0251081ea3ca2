//! Ownership State Tracker
//!
//! Forward dataflow over the CFG computing, for every local at every node, whether it is
//! owned, moved or partially moved. The worklist converges first; violations and drop
//! obligations are then collected in one pass over the converged entry states so each
//! is reported exactly once.

use crate::borrow_log;
use crate::compiler_frontend::analysis::borrow_checker::FunctionContext;
use crate::compiler_frontend::analysis::borrow_checker::accesses::{AccessKind, MoveSite};
use crate::compiler_frontend::analysis::borrow_checker::state::{
    MoveConflict, MoveRecord, OwnershipMap, OwnershipState,
};
use crate::compiler_frontend::analysis::borrow_checker::types::DropObligation;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::hir::hir_datatypes::{TypeId, TypeKind};
use crate::compiler_frontend::hir::hir_nodes::{LocalId, NodeId, ScopeId, Statement};
use crate::compiler_frontend::hir::place::{Place, Projection};
use crate::return_compiler_error;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum OwnershipViolationKind {
    UseAfterMove,
    DoubleMove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct OwnershipViolation {
    pub kind: OwnershipViolationKind,
    pub node: NodeId,
    pub sequence: u32,
    pub place: Place,

    /// Earlier moves that reach this node. Empty if the place was never initialized.
    pub move_sites: BTreeSet<NodeId>,

    /// Only a part of the place was moved.
    pub partial: bool,
}

#[derive(Debug, Clone, Default)]
pub(super) struct OwnershipResult {
    /// Converged state on entry to every node. None for unreachable nodes.
    pub entry_states: Vec<Option<OwnershipMap>>,
    pub violations: Vec<OwnershipViolation>,
    pub drops: BTreeMap<NodeId, Vec<DropObligation>>,
    pub visits: usize,
}

impl OwnershipResult {
    /// Nodes on whose entry the local holds a value on at least one path.
    pub(super) fn holding_points(&self, local: LocalId) -> Vec<NodeId> {
        self.entry_states
            .iter()
            .enumerate()
            .filter_map(|(index, state)| match state.as_ref()?.get(local) {
                OwnershipState::Moved(record) if record.definite => None,
                _ => Some(NodeId(index as u32)),
            })
            .collect()
    }
}

pub(super) fn analyze_ownership(
    context: &FunctionContext<'_>,
) -> Result<OwnershipResult, CompilerError> {
    let function = context.function;
    let node_count = context.layout.node_count;

    let mut in_states: Vec<Option<OwnershipMap>> = vec![None; node_count];
    let mut out_states: Vec<Option<OwnershipMap>> = vec![None; node_count];
    let mut visits_by_node = vec![0usize; node_count];
    let mut total_visits = 0usize;

    in_states[function.entry.index()] = Some(OwnershipMap::at_entry(function));

    let mut worklist = VecDeque::new();
    worklist.push_back(function.entry);

    while let Some(node_id) = worklist.pop_front() {
        let Some(input_state) = in_states[node_id.index()].clone() else {
            continue;
        };

        visits_by_node[node_id.index()] += 1;
        total_visits += 1;
        if visits_by_node[node_id.index()] > context.config.max_dataflow_visits_per_node {
            return_compiler_error!(
                "Ownership dataflow did not converge at node {} of function '{}' after {} visits",
                node_id,
                context.function_name(),
                context.config.max_dataflow_visits_per_node;
                {
                    CompilationStage => "Ownership Analysis",
                    IterationCap => "max_dataflow_visits_per_node",
                }
            );
        }

        let mut output_state = input_state;
        transfer(context, node_id, &mut output_state, None);

        let changed_out = match &out_states[node_id.index()] {
            Some(existing) => existing != &output_state,
            None => true,
        };

        if !changed_out {
            continue;
        }

        for successor in &function.nodes[node_id.index()].successors {
            let next_state = match &in_states[successor.index()] {
                Some(existing) => existing.join(&output_state),
                None => output_state.clone(),
            };

            let changed_in = match &in_states[successor.index()] {
                Some(existing) => existing != &next_state,
                None => true,
            };

            if changed_in {
                in_states[successor.index()] = Some(next_state);
                worklist.push_back(*successor);
            }
        }

        out_states[node_id.index()] = Some(output_state);
    }

    borrow_log!(format!(
        "[Ownership] '{}' converged after {} node visits",
        context.function_name(),
        total_visits
    ));

    // Reporting pass over the fixed point, in node order.
    let mut sink = OwnershipSink::default();
    for index in 0..node_count {
        let Some(state) = &in_states[index] else {
            continue;
        };

        let mut state = state.clone();
        transfer(context, NodeId(index as u32), &mut state, Some(&mut sink));
    }

    Ok(OwnershipResult {
        entry_states: in_states,
        violations: sink.violations,
        drops: sink.drops,
        visits: total_visits,
    })
}

#[derive(Debug, Default)]
struct OwnershipSink {
    violations: Vec<OwnershipViolation>,
    drops: BTreeMap<NodeId, Vec<DropObligation>>,
}

fn transfer(
    context: &FunctionContext<'_>,
    node_id: NodeId,
    state: &mut OwnershipMap,
    mut sink: Option<&mut OwnershipSink>,
) {
    for access in context.accesses.accesses_at(node_id) {
        let place = &access.place;

        // Reaching through a reference reads the reference itself.
        // What lies behind it is not owned here.
        if let Some(first_deref) = place.dereferenced_prefixes().into_iter().next() {
            check_use(state, node_id, access.sequence, &first_deref, sink.as_deref_mut());
            continue;
        }

        match access.kind {
            AccessKind::Read | AccessKind::Borrow(_) => {
                check_use(state, node_id, access.sequence, place, sink.as_deref_mut());
            }
            AccessKind::Move(site) => {
                check_move(state, node_id, access.sequence, place, site, sink.as_deref_mut());
            }
            AccessKind::Write => {
                state.get_mut(place.root).mark_written(&place.projections);
            }
        }
    }

    if let Statement::ScopeEnd(scope) = context.function.nodes[node_id.index()].statement {
        if let Some(sink) = sink {
            let drops = scope_drops(context, scope, state);
            sink.drops.insert(node_id, drops);
        }

        for local in &context.layout.locals_by_scope[scope.index()] {
            *state.get_mut(*local) = OwnershipState::uninitialized();
        }
    }
}

fn check_use(
    state: &mut OwnershipMap,
    node_id: NodeId,
    sequence: u32,
    place: &Place,
    sink: Option<&mut OwnershipSink>,
) {
    let local_state = state.get_mut(place.root);

    let (record, partial) = match local_state.conflict_for(&place.projections) {
        MoveConflict::None => return,
        MoveConflict::Moved(record) => (record.clone(), false),
        MoveConflict::SubPathMoved(record) => (record.clone(), true),
    };

    if let Some(sink) = sink {
        sink.violations.push(OwnershipViolation {
            kind: OwnershipViolationKind::UseAfterMove,
            node: node_id,
            sequence,
            place: place.clone(),
            move_sites: record.sites.clone(),
            partial,
        });
    }

    // Conservative recovery: the whole place counts as moved from here on.
    if partial {
        local_state.mark_moved_with(&place.projections, record);
    }
}

fn check_move(
    state: &mut OwnershipMap,
    node_id: NodeId,
    sequence: u32,
    place: &Place,
    site: MoveSite,
    sink: Option<&mut OwnershipSink>,
) {
    let local_state = state.get_mut(place.root);

    let (kind, record, partial) = match local_state.conflict_for(&place.projections) {
        MoveConflict::None => {
            local_state.mark_moved(&place.projections, node_id);
            return;
        }
        MoveConflict::Moved(record) => {
            let kind = if record.sites.is_empty() || site == MoveSite::CallArgument {
                OwnershipViolationKind::UseAfterMove
            } else {
                OwnershipViolationKind::DoubleMove
            };
            (kind, record.clone(), false)
        }
        MoveConflict::SubPathMoved(record) => {
            (OwnershipViolationKind::UseAfterMove, record.clone(), true)
        }
    };

    if let Some(sink) = sink {
        sink.violations.push(OwnershipViolation {
            kind,
            node: node_id,
            sequence,
            place: place.clone(),
            move_sites: record.sites.clone(),
            partial,
        });
    }

    if partial {
        local_state.mark_moved_with(&place.projections, record);
    }
}

/// Locals of the scope that still own a value, last declared first.
fn scope_drops(
    context: &FunctionContext<'_>,
    scope: ScopeId,
    state: &OwnershipMap,
) -> Vec<DropObligation> {
    let mut drops = Vec::new();

    for local in context.layout.locals_by_scope[scope.index()].iter().rev() {
        if !context.layout.needs_drop[local.index()] {
            continue;
        }

        let place = Place::local(*local);
        match state.get(*local) {
            OwnershipState::Owned => drops.push(DropObligation {
                place,
                conditional: false,
            }),
            OwnershipState::Moved(record) => {
                if !record.definite {
                    drops.push(DropObligation {
                        place,
                        conditional: true,
                    });
                }
            }
            OwnershipState::PartiallyMoved(moved) => {
                if let Some(ty) = context.function.local_type(*local) {
                    remaining_drops(context, place, ty, moved, &mut drops);
                }
            }
        }
    }

    drops
}

/// Drops whatever is still owned below a partially moved place.
fn remaining_drops(
    context: &FunctionContext<'_>,
    place: Place,
    ty: TypeId,
    moved: &BTreeMap<Vec<Projection>, MoveRecord>,
    drops: &mut Vec<DropObligation>,
) {
    let types = context.types();

    if let Some(record) = moved.get(&place.projections) {
        if !record.definite {
            drops.push(DropObligation {
                place,
                conditional: true,
            });
        }
        return;
    }

    let moved_below = moved
        .keys()
        .any(|path| path.len() > place.projections.len() && path.starts_with(&place.projections));

    if !moved_below {
        if types.needs_drop(ty) {
            drops.push(DropObligation {
                place,
                conditional: false,
            });
        }
        return;
    }

    match types.get(ty).map(|hir_type| &hir_type.kind) {
        Some(TypeKind::Struct { fields }) => {
            for (name, field_ty) in fields {
                remaining_drops(context, place.clone().field(*name), *field_ty, moved, drops);
            }
        }

        // Element-wise moves are tracked by drop flags in codegen.
        _ => drops.push(DropObligation {
            place,
            conditional: true,
        }),
    }
}
