//! Per-node access facts.
//!
//! Every statement is flattened once into the ordered list of place accesses it performs,
//! the loans it creates, and the reference flows it causes. The ownership tracker, liveness,
//! the region solver and the ledger all read these facts instead of re-walking statements.

use crate::compiler_frontend::analysis::borrow_checker::elision::{CallSummary, ModuleSummaries};
use crate::compiler_frontend::analysis::borrow_checker::ledger::{Loan, LoanId};
use crate::compiler_frontend::analysis::borrow_checker::regions::ConstraintCause;
use crate::compiler_frontend::analysis::borrow_checker::state::FunctionLayout;
use crate::compiler_frontend::hir::hir_datatypes::TypeContext;
use crate::compiler_frontend::hir::hir_nodes::{
    BorrowKind, Callee, HirFunction, LocalId, NodeId, Operand, Rvalue, Statement,
};
use crate::compiler_frontend::hir::place::Place;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MoveSite {
    /// Assignment to a new place, including aggregate construction.
    Assignment,
    Return,
    CallArgument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AccessKind {
    /// Non-consuming inspection or a copy.
    Read,
    Move(MoveSite),
    Borrow(LoanId),
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Access {
    pub place: Place,
    pub kind: AccessKind,

    /// Position within the node. Operands are accessed left to right, destinations last.
    pub sequence: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FlowTarget {
    Local(LocalId),
    ReturnSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FlowSource {
    Loan(LoanId),
    Local(LocalId),
}

/// A reference value stored into a region-carrying destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ValueFlow {
    pub node: NodeId,
    pub source: FlowSource,
    pub target: FlowTarget,
    pub cause: ConstraintCause,
}

#[derive(Debug, Clone, Default)]
pub(super) struct FunctionAccesses {
    /// Indexed by node. Unreachable nodes have no accesses.
    pub by_node: Vec<Vec<Access>>,

    /// In creation order: node order, then operand order.
    pub loans: Vec<Loan>,

    pub flows: Vec<ValueFlow>,
}

impl FunctionAccesses {
    pub(super) fn accesses_at(&self, node: NodeId) -> &[Access] {
        self.by_node
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(super) fn loan(&self, id: LoanId) -> &Loan {
        &self.loans[id.index()]
    }
}

pub(super) fn collect_accesses(
    function: &HirFunction,
    types: &TypeContext,
    layout: &FunctionLayout,
    summaries: &ModuleSummaries,
) -> FunctionAccesses {
    let mut collector = AccessCollector {
        function,
        types,
        layout,
        summaries,
        facts: FunctionAccesses {
            by_node: vec![Vec::new(); function.nodes.len()],
            loans: Vec::new(),
            flows: Vec::new(),
        },
        node: NodeId(0),
        sequence: 0,
    };

    let mut ordered = layout.reachable.clone();
    ordered.sort_unstable();

    for node_id in ordered {
        collector.node = node_id;
        collector.sequence = 0;
        collector.collect_statement(&function.nodes[node_id.index()].statement);
    }

    collector.facts
}

struct AccessCollector<'a> {
    function: &'a HirFunction,
    types: &'a TypeContext,
    layout: &'a FunctionLayout,
    summaries: &'a ModuleSummaries,
    facts: FunctionAccesses,
    node: NodeId,
    sequence: u32,
}

/// What an operand contributes to the value it flows into.
enum OperandValue {
    None,
    Source(FlowSource),
}

impl AccessCollector<'_> {
    fn collect_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Assign { destination, value } => {
                let target = self
                    .is_region_carrying(destination.root)
                    .then_some(FlowTarget::Local(destination.root));

                self.collect_rvalue(value, MoveSite::Assignment, target);
                self.push(destination.clone(), AccessKind::Write);
            }
            Statement::Eval(value) => {
                self.collect_rvalue(value, MoveSite::Assignment, None);
            }
            Statement::Return(Some(value)) => {
                self.collect_rvalue(value, MoveSite::Return, Some(FlowTarget::ReturnSlot));
            }
            Statement::Branch(operand) => {
                self.collect_operand(operand, MoveSite::Assignment);
            }
            Statement::Return(None)
            | Statement::ScopeEnd(_)
            | Statement::Nop
            | Statement::Exit => {}
        }
    }

    fn collect_rvalue(&mut self, value: &Rvalue, site: MoveSite, target: Option<FlowTarget>) {
        let direct_cause = match target {
            Some(FlowTarget::ReturnSlot) => ConstraintCause::Return,
            _ => ConstraintCause::Assignment,
        };

        match value {
            Rvalue::Use(operand) => {
                let value = self.collect_operand(operand, site);
                self.flow(value, target, direct_cause);
            }
            Rvalue::Ref(kind, place) => {
                let loan = self.borrow(*kind, place);
                self.flow(
                    OperandValue::Source(FlowSource::Loan(loan)),
                    target,
                    direct_cause,
                );
            }
            Rvalue::Aggregate(operands) => {
                let cause = match target {
                    Some(FlowTarget::ReturnSlot) => ConstraintCause::Return,
                    _ => ConstraintCause::Aggregate,
                };
                for operand in operands {
                    let value = self.collect_operand(operand, site);
                    self.flow(value, target, cause);
                }
            }
            Rvalue::Call { callee, args } => {
                let summary = match callee {
                    Callee::Function(id) => self.summaries.summary_for(*id),
                    Callee::Opaque => CallSummary::AllReferenceArgs,
                };

                for (arg_index, arg) in args.iter().enumerate() {
                    let value = self.collect_operand(arg, MoveSite::CallArgument);
                    if summary.ties_argument(arg_index) {
                        self.flow(value, target, ConstraintCause::CallResult);
                    }
                }
            }
        }
    }

    fn collect_operand(&mut self, operand: &Operand, site: MoveSite) -> OperandValue {
        match operand {
            Operand::Consume(place) => {
                let copyable = place
                    .type_in(self.function, self.types)
                    .is_some_and(|ty| self.types.is_copyable(ty));

                let kind = if copyable {
                    AccessKind::Read
                } else {
                    AccessKind::Move(site)
                };

                self.push(place.clone(), kind);
                self.place_value(place)
            }
            Operand::Read(place) => {
                self.push(place.clone(), AccessKind::Read);
                self.place_value(place)
            }
            Operand::Ref(kind, place) => {
                let loan = self.borrow(*kind, place);
                OperandValue::Source(FlowSource::Loan(loan))
            }
            Operand::Constant => OperandValue::None,
        }
    }

    /// A place carries the region of its root local when the value read holds a borrow.
    fn place_value(&self, place: &Place) -> OperandValue {
        let holds_reference = place
            .type_in(self.function, self.types)
            .is_some_and(|ty| self.types.contains_reference(ty));

        if holds_reference && self.is_region_carrying(place.root) {
            OperandValue::Source(FlowSource::Local(place.root))
        } else {
            OperandValue::None
        }
    }

    fn borrow(&mut self, kind: BorrowKind, place: &Place) -> LoanId {
        let id = LoanId(self.facts.loans.len() as u32);
        let sequence = self.sequence;

        self.facts.loans.push(Loan {
            id,
            place: place.clone(),
            kind,
            created_at: self.node,
            sequence,
        });
        self.push(place.clone(), AccessKind::Borrow(id));
        id
    }

    fn flow(&mut self, value: OperandValue, target: Option<FlowTarget>, cause: ConstraintCause) {
        let (OperandValue::Source(source), Some(target)) = (value, target) else {
            return;
        };

        self.facts.flows.push(ValueFlow {
            node: self.node,
            source,
            target,
            cause,
        });
    }

    fn push(&mut self, place: Place, kind: AccessKind) {
        self.facts.by_node[self.node.index()].push(Access {
            place,
            kind,
            sequence: self.sequence,
        });
        self.sequence += 1;
    }

    fn is_region_carrying(&self, local: LocalId) -> bool {
        self.layout
            .region_carrying
            .get(local.index())
            .copied()
            .unwrap_or(false)
    }
}
