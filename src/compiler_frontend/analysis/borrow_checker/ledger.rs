//! Borrow ledger.
//!
//! Every borrow expression creates one loan. A loan stays live from its creation to every
//! node reachable inside its solved region, stopping early where it is killed: by a whole
//! overwrite of the reference it was reborrowed through, or by a move of the borrowed place
//! (reported once at the move, not again at each later conflict).
//!
//! Accesses are then checked against the loans live at their node. Kills depend on the
//! conflicts found and conflicts depend on kills, so the two are iterated to a fixed point.

use crate::borrow_log;
use crate::compiler_frontend::analysis::borrow_checker::FunctionContext;
use crate::compiler_frontend::analysis::borrow_checker::accesses::{Access, AccessKind};
use crate::compiler_frontend::analysis::borrow_checker::regions::RegionSolution;
use crate::compiler_frontend::analysis::borrow_checker::state::PointSet;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::hir::hir_nodes::{BorrowKind, NodeId, Statement};
use crate::compiler_frontend::hir::place::Place;
use crate::return_compiler_error;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LoanId(pub u32);

impl LoanId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for LoanId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Loan {
    pub id: LoanId,
    pub place: Place,
    pub kind: BorrowKind,
    pub created_at: NodeId,

    /// Access sequence of the borrow within its node.
    pub sequence: u32,
}

/// `(loan, node)`: the loan does not flow past this node.
pub(super) type KillSet = BTreeSet<(LoanId, NodeId)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LedgerViolationKind {
    ConflictingBorrow,
    MoveWhileBorrowed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct LedgerViolation {
    pub kind: LedgerViolationKind,
    pub node: NodeId,
    pub sequence: u32,
    pub place: Place,
    pub access: AccessKind,

    /// The earliest created loan the access conflicts with.
    pub loan: LoanId,
}

#[derive(Debug, Clone, Default)]
pub(super) struct LedgerResult {
    pub violations: Vec<LedgerViolation>,

    /// Indexed by loan.
    pub live_sets: Vec<PointSet>,
    pub rounds: usize,
    pub conflicts_checked: usize,
}

/// Runs loan liveness and conflict detection until the kill set stops growing.
pub(super) fn check_ledger(
    context: &FunctionContext<'_>,
    solution: &RegionSolution,
) -> Result<LedgerResult, CompilerError> {
    let mut kills = static_kills(context);
    let mut rounds = 0;

    loop {
        rounds += 1;
        if rounds > context.config.max_fixpoint_rounds {
            return_compiler_error!(
                "Borrow ledger did not stabilize for function '{}' after {} rounds",
                context.function_name(),
                context.config.max_fixpoint_rounds;
                {
                    CompilationStage => "Borrow Ledger",
                    IterationCap => "max_fixpoint_rounds",
                }
            );
        }

        let live_sets = loan_live_sets(context, solution, &kills);
        let round = check_accesses(context, &live_sets);

        let mut next_kills = kills.clone();
        next_kills.extend(round.move_kills.iter().copied());

        if next_kills == kills {
            borrow_log!(format!(
                "[Ledger] '{}' stable after {} rounds, {} loans, {} violations",
                context.function_name(),
                rounds,
                context.accesses.loans.len(),
                round.violations.len()
            ));

            return Ok(LedgerResult {
                violations: round.violations,
                live_sets,
                rounds,
                conflicts_checked: round.conflicts_checked,
            });
        }

        #[cfg(feature = "show_borrow_checker")]
        for (loan, node) in next_kills.difference(&kills) {
            borrow_log!(format!("[Ledger] {} killed by move at {}", loan, node));
        }

        kills = next_kills;
    }
}

/// A whole overwrite of a reference ends every reborrow taken through it.
fn static_kills(context: &FunctionContext<'_>) -> KillSet {
    let mut kills = KillSet::new();

    for node_id in &context.layout.reachable {
        let Statement::Assign { destination, .. } =
            &context.function.nodes[node_id.index()].statement
        else {
            continue;
        };

        if !destination.is_whole_local() {
            continue;
        }

        for loan in &context.accesses.loans {
            if loan.place.root == destination.root && loan.place.has_deref() {
                kills.insert((loan.id, *node_id));
            }
        }
    }

    kills
}

/// Nodes where each loan is live: reachable from its creation without leaving its region.
pub(super) fn loan_live_sets(
    context: &FunctionContext<'_>,
    solution: &RegionSolution,
    kills: &KillSet,
) -> Vec<PointSet> {
    let function = context.function;
    let layout = &context.layout;

    context
        .accesses
        .loans
        .iter()
        .map(|loan| {
            let region = solution.loan_region(loan.id);
            let mut live = PointSet::empty(layout.node_count);

            // `r = &mut *r`: the reborrow ends with the statement that overwrites `r`.
            // The new value of `r` keeps the data borrowed through the reborrow constraint.
            if kills.contains(&(loan.id, loan.created_at)) {
                return live;
            }

            let mut queue = function.nodes[loan.created_at.index()]
                .successors
                .iter()
                .copied()
                .collect::<VecDeque<_>>();

            while let Some(node_id) = queue.pop_front() {
                if !layout.is_reachable(node_id) || !region.contains(node_id.index()) {
                    continue;
                }

                if !live.insert(node_id.index()) {
                    continue;
                }

                if kills.contains(&(loan.id, node_id)) {
                    continue;
                }

                queue.extend(function.nodes[node_id.index()].successors.iter().copied());
            }

            live
        })
        .collect()
}

#[derive(Debug, Default)]
struct LedgerRound {
    violations: Vec<LedgerViolation>,
    move_kills: KillSet,
    conflicts_checked: usize,
}

fn check_accesses(context: &FunctionContext<'_>, live_sets: &[PointSet]) -> LedgerRound {
    let loans = &context.accesses.loans;
    let mut round = LedgerRound::default();

    let mut ordered = context.layout.reachable.clone();
    ordered.sort_unstable();

    for node_id in ordered {
        let live_on_entry = loans
            .iter()
            .filter(|loan| live_sets[loan.id.index()].contains(node_id.index()))
            .map(|loan| loan.id)
            .collect::<Vec<_>>();

        let accesses = context.accesses.accesses_at(node_id);
        for access in accesses {
            // Loans created earlier in this node. A destination write only cares about the
            // ones that outlive the statement.
            let created_here = loans.iter().filter(|loan| {
                loan.created_at == node_id
                    && loan.sequence < access.sequence
                    && (access.kind != AccessKind::Write
                        || !live_sets[loan.id.index()].is_empty())
            });

            let mut candidates = live_on_entry
                .iter()
                .map(|id| &loans[id.index()])
                .chain(created_here)
                .filter(|loan| !is_own_loan(access, loan))
                .collect::<Vec<_>>();
            candidates.sort_by_key(|loan| loan.id);
            candidates.dedup_by_key(|loan| loan.id);

            round.conflicts_checked += candidates.len();

            let conflicting = candidates
                .into_iter()
                .filter(|loan| access_conflicts(context, access, loan))
                .collect::<Vec<_>>();

            let Some(first) = conflicting.first() else {
                continue;
            };

            let kind = match access.kind {
                AccessKind::Move(_) => {
                    for loan in &conflicting {
                        round.move_kills.insert((loan.id, node_id));
                    }
                    LedgerViolationKind::MoveWhileBorrowed
                }
                _ => LedgerViolationKind::ConflictingBorrow,
            };

            round.violations.push(LedgerViolation {
                kind,
                node: node_id,
                sequence: access.sequence,
                place: access.place.clone(),
                access: access.kind,
                loan: first.id,
            });
        }
    }

    round
}

fn is_own_loan(access: &Access, loan: &Loan) -> bool {
    access.kind == AccessKind::Borrow(loan.id)
}

fn access_conflicts(context: &FunctionContext<'_>, access: &Access, loan: &Loan) -> bool {
    if !access.place.overlaps_with(&loan.place) {
        return false;
    }

    match access.kind {
        AccessKind::Read => loan.kind.is_exclusive(),
        AccessKind::Borrow(id) => {
            context.accesses.loan(id).kind.is_exclusive() || loan.kind.is_exclusive()
        }

        // Overwriting a reference leaves whatever was reborrowed through it untouched.
        AccessKind::Write => {
            !(access.place.is_whole_local()
                && loan.place.root == access.place.root
                && loan.place.has_deref())
        }
        AccessKind::Move(_) => true,
    }
}
