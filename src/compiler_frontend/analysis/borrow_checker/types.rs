use crate::compiler_frontend::analysis::borrow_checker::diagnostics::BorrowDiagnostic;
use crate::compiler_frontend::analysis::borrow_checker::error_codes::BorrowErrorKind;
use crate::compiler_frontend::analysis::borrow_checker::ledger::LoanId;
use crate::compiler_frontend::analysis::borrow_checker::state::{MoveRecord, OwnershipState};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::hir::hir_nodes::{BorrowKind, FunctionId, LocalId, NodeId};
use crate::compiler_frontend::hir::place::{Place, Projection};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything one borrow checking run produces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BorrowCheckReport {
    /// Module order. Functions that hit an internal error are missing.
    pub functions: Vec<FunctionBorrowAnalysis>,

    /// Ordered by function, then by program point.
    pub diagnostics: Vec<BorrowDiagnostic>,

    #[serde(skip)]
    pub internal_errors: Vec<CompilerError>,

    pub stats: BorrowCheckStats,
}

impl BorrowCheckReport {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty() || !self.internal_errors.is_empty()
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionBorrowAnalysis> {
        self.functions.iter().find(|analysis| analysis.function == id)
    }

    pub fn diagnostics_of(&self, kind: BorrowErrorKind) -> impl Iterator<Item = &BorrowDiagnostic> {
        self.diagnostics
            .iter()
            .filter(move |diagnostic| diagnostic.kind == kind)
    }

    pub fn diagnostics_for(&self, function: FunctionId) -> impl Iterator<Item = &BorrowDiagnostic> {
        self.diagnostics
            .iter()
            .filter(move |diagnostic| diagnostic.function == function)
    }

    /// The diagnostic stream as JSON for external renderers.
    pub fn diagnostics_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.diagnostics)
    }
}

/// Annotations for destructor insertion and codegen.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionBorrowAnalysis {
    pub function: FunctionId,
    pub name: String,

    /// Keyed by `ScopeEnd` node. Last declared local first.
    pub drops: BTreeMap<NodeId, Vec<DropObligation>>,

    /// Every local. Reference-carrying locals get their solved region, owned locals the
    /// nodes where they hold a value.
    pub local_regions: BTreeMap<LocalId, RegionInterval>,
    pub loans: Vec<LoanSummary>,

    /// Empty unless `record_ownership_snapshots` is set.
    pub ownership_snapshots: Vec<OwnershipSnapshot>,

    /// Program order. Empty unless `record_ownership_timeline` is set.
    pub timeline: Vec<OwnershipEvent>,

    pub stats: FunctionBorrowStats,
}

impl FunctionBorrowAnalysis {
    pub fn drops_at(&self, node: NodeId) -> &[DropObligation] {
        self.drops.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn snapshot_at(&self, node: NodeId) -> Option<&OwnershipSnapshot> {
        self.ownership_snapshots
            .iter()
            .find(|snapshot| snapshot.node == node)
    }

    pub fn timeline_for(&self, local: LocalId) -> impl Iterator<Item = &OwnershipEvent> {
        self.timeline.iter().filter(move |event| event.local == local)
    }

    /// The timeline as text, optionally for one local. Empty when nothing was recorded.
    pub fn format_timeline(&self, local: Option<LocalId>) -> String {
        let events = self
            .timeline
            .iter()
            .filter(|event| local.is_none_or(|local| event.local == local))
            .collect::<Vec<_>>();

        if events.is_empty() {
            return String::new();
        }

        let rule = "-".repeat(TIMELINE_RULE_WIDTH);
        let mut lines = vec!["Ownership Timeline:".to_owned(), rule.clone()];

        for event in events {
            lines.push(format!(
                "Line {}: '{}' {}",
                event.line,
                event.variable,
                event.kind.as_str()
            ));
            lines.push(format!("  {}", event.description));
        }

        lines.push(rule);
        lines.join("\n")
    }
}

const TIMELINE_RULE_WIDTH: usize = 60;

/// One thing that happened to a local's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnershipEvent {
    pub node: NodeId,
    pub line: i32,
    pub local: LocalId,

    /// The place as written, e.g. `p.left`.
    pub variable: String,
    pub kind: OwnershipEventKind,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OwnershipEventKind {
    Assign,
    Use,
    Move,
    Borrow,
    BorrowMut,
    Release,
}

impl OwnershipEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OwnershipEventKind::Assign => "ASSIGNED",
            OwnershipEventKind::Use => "USED",
            OwnershipEventKind::Move => "MOVED",
            OwnershipEventKind::Borrow => "BORROWED",
            OwnershipEventKind::BorrowMut => "BORROWED (exclusive)",
            OwnershipEventKind::Release => "RELEASED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropObligation {
    pub place: Place,

    /// Only some paths reaching the scope exit still own the value; codegen needs a drop flag.
    pub conditional: bool,
}

/// Solved extent of a region, restricted to body points.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RegionInterval {
    pub points: Vec<NodeId>,

    /// The region reaches past the end of the function body.
    pub outlives_function: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanSummary {
    pub id: LoanId,
    pub place: Place,
    pub kind: BorrowKind,
    pub created_at: NodeId,
    pub region: RegionInterval,

    /// Nodes where the loan is live on entry, after kills.
    pub live_at: Vec<NodeId>,
}

/// Ownership of every local on entry to one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnershipSnapshot {
    pub node: NodeId,
    pub locals: Vec<LocalOwnership>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state")]
pub enum LocalOwnership {
    Owned,
    Moved(MoveRecord),
    PartiallyMoved { paths: Vec<MovedPath> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedPath {
    pub path: Vec<Projection>,
    pub record: MoveRecord,
}

impl From<&OwnershipState> for LocalOwnership {
    fn from(state: &OwnershipState) -> Self {
        match state {
            OwnershipState::Owned => LocalOwnership::Owned,
            OwnershipState::Moved(record) => LocalOwnership::Moved(record.clone()),
            OwnershipState::PartiallyMoved(paths) => LocalOwnership::PartiallyMoved {
                paths: paths
                    .iter()
                    .map(|(path, record)| MovedPath {
                        path: path.clone(),
                        record: record.clone(),
                    })
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FunctionBorrowStats {
    pub reachable_nodes: usize,
    pub loans: usize,
    pub regions: usize,
    pub constraints: usize,
    pub ownership_visits: usize,
    pub liveness_visits: usize,
    pub region_propagation_steps: usize,
    pub ledger_rounds: usize,
    pub conflicts_checked: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BorrowCheckStats {
    pub functions_analyzed: usize,
    pub functions_failed: usize,
    pub nodes_analyzed: usize,
    pub loans_created: usize,
    pub regions_solved: usize,
    pub dataflow_visits: usize,
    pub ledger_rounds: usize,
    pub conflicts_checked: usize,
}

impl BorrowCheckStats {
    pub(crate) fn absorb(&mut self, function: &FunctionBorrowStats) {
        self.functions_analyzed += 1;
        self.nodes_analyzed += function.reachable_nodes;
        self.loans_created += function.loans;
        self.regions_solved += function.regions;
        self.dataflow_visits += function.ownership_visits + function.liveness_visits;
        self.ledger_rounds += function.ledger_rounds;
        self.conflicts_checked += function.conflicts_checked;
    }
}
