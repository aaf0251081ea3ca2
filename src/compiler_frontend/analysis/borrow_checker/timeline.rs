//! Ownership timeline
//!
//! Replays the collected accesses in program order and records what happened to each value:
//! assignments, uses, moves, borrows and the drops at scope exits.

use crate::compiler_frontend::analysis::borrow_checker::FunctionContext;
use crate::compiler_frontend::analysis::borrow_checker::accesses::{Access, AccessKind};
use crate::compiler_frontend::analysis::borrow_checker::diagnostics::BorrowDiagnostics;
use crate::compiler_frontend::analysis::borrow_checker::types::{
    DropObligation, OwnershipEvent, OwnershipEventKind,
};
use crate::compiler_frontend::hir::hir_nodes::NodeId;
use crate::compiler_frontend::hir::place::Place;
use std::collections::BTreeMap;

pub(super) fn build_timeline(
    context: &FunctionContext<'_>,
    names: &BorrowDiagnostics<'_>,
    drops: &BTreeMap<NodeId, Vec<DropObligation>>,
) -> Vec<OwnershipEvent> {
    let mut ordered = context.layout.reachable.clone();
    ordered.sort_unstable();

    let mut events = Vec::new();
    for node_id in ordered {
        for access in context.accesses.accesses_at(node_id) {
            events.push(access_event(context, names, node_id, access));
        }

        for obligation in drops.get(&node_id).into_iter().flatten() {
            let variable = names.place_name(&obligation.place);
            let description = if obligation.conditional {
                format!("'{variable}' dropped at the end of its scope if still owned")
            } else {
                format!("'{variable}' dropped at the end of its scope")
            };

            events.push(event(
                context,
                node_id,
                &obligation.place,
                variable,
                OwnershipEventKind::Release,
                description,
            ));
        }
    }

    events
}

fn access_event(
    context: &FunctionContext<'_>,
    names: &BorrowDiagnostics<'_>,
    node_id: NodeId,
    access: &Access,
) -> OwnershipEvent {
    let variable = names.place_name(&access.place);

    let (kind, description) = match access.kind {
        AccessKind::Borrow(loan) if context.accesses.loan(loan).kind.is_exclusive() => (
            OwnershipEventKind::BorrowMut,
            format!("'{variable}' borrowed as exclusive"),
        ),
        AccessKind::Borrow(_) => (
            OwnershipEventKind::Borrow,
            format!("'{variable}' borrowed as shared"),
        ),

        // Through a reference nothing is owned, so writes and moves there only use it.
        _ if access.place.has_deref() => {
            (OwnershipEventKind::Use, format!("'{variable}' used"))
        }
        AccessKind::Move(_) => {
            let description = match names.move_target(node_id) {
                Some(target) => format!("'{variable}' {target}"),
                None => format!("'{variable}' moved"),
            };
            (OwnershipEventKind::Move, description)
        }
        AccessKind::Write => (OwnershipEventKind::Assign, format!("'{variable}' assigned")),
        AccessKind::Read => (OwnershipEventKind::Use, format!("'{variable}' used")),
    };

    event(context, node_id, &access.place, variable, kind, description)
}

fn event(
    context: &FunctionContext<'_>,
    node_id: NodeId,
    place: &Place,
    variable: String,
    kind: OwnershipEventKind,
    description: String,
) -> OwnershipEvent {
    OwnershipEvent {
        node: node_id,
        line: context.function.node_location(node_id).start_pos.line_number,
        local: place.root,
        variable,
        kind,
        description,
    }
}
