//! Borrow checker
//!
//! Proves that a function never uses a value after moving it, never moves a value twice,
//! never holds conflicting borrows and never lets a reference outlive its data.
//!
//! Per function, after validating the CFG:
//!   1. flatten statements into access, loan and reference-flow facts
//!   2. forward ownership dataflow (moves, partial moves, drop obligations)
//!   3. backward liveness of locals
//!   4. region constraint solving
//!   5. loan live sets and conflict checks, iterated with move kills to a fixed point
//!   6. dangling reference detection
//!
//! Diagnostics are only assembled at the end, so every independent violation is reported.
//! Functions share nothing mutable and are checked in parallel.

mod accesses;
mod diagnostics;
mod elision;
pub mod error_codes;
mod ledger;
mod liveness;
mod ownership;
mod regions;
mod state;
mod timeline;
mod types;

#[cfg(test)]
mod tests;

pub use diagnostics::{BorrowDiagnostic, SecondarySpan, suggested_fixes};
pub use error_codes::{BorrowErrorKind, explain};
pub use ledger::LoanId;
pub use state::{MoveRecord, OwnershipState};
pub use types::{
    BorrowCheckReport, BorrowCheckStats, DropObligation, FunctionBorrowAnalysis,
    FunctionBorrowStats, LoanSummary, LocalOwnership, MovedPath, OwnershipEvent,
    OwnershipEventKind, OwnershipSnapshot, RegionInterval,
};

use crate::compiler_frontend::analysis::borrow_checker::accesses::{
    FunctionAccesses, collect_accesses,
};
use crate::compiler_frontend::analysis::borrow_checker::diagnostics::BorrowDiagnostics;
use crate::compiler_frontend::analysis::borrow_checker::elision::{
    ModuleSummaries, RegionSignature, region_signature,
};
use crate::compiler_frontend::analysis::borrow_checker::ledger::{LedgerResult, check_ledger};
use crate::compiler_frontend::analysis::borrow_checker::liveness::compute_liveness;
use crate::compiler_frontend::analysis::borrow_checker::ownership::{
    OwnershipResult, analyze_ownership,
};
use crate::compiler_frontend::analysis::borrow_checker::regions::{
    RegionSolution, find_dangling_references, solve_regions,
};
use crate::compiler_frontend::analysis::borrow_checker::state::FunctionLayout;
use crate::compiler_frontend::analysis::borrow_checker::timeline::build_timeline;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::hir::hir_datatypes::TypeContext;
use crate::compiler_frontend::hir::hir_nodes::{HirFunction, HirModule, LocalId, NodeId};
use crate::compiler_frontend::hir::hir_validation::validate_hir_function;
use crate::compiler_frontend::string_interning::StringTable;
use crate::settings::BorrowCheckConfig;
use crate::{borrow_log, timer_log};
use rayon::prelude::*;
use std::time::Instant;

/// Checks every function of the module.
///
/// Violations in the checked program are returned as diagnostics in the report. An internal
/// error aborts only the function it occurred in and is collected in `internal_errors`.
/// `Err` is reserved for an invalid configuration.
pub fn check_borrows(
    module: &HirModule,
    string_table: &StringTable,
    config: &BorrowCheckConfig,
) -> Result<BorrowCheckReport, CompilerError> {
    config.validate()?;

    let time = Instant::now();
    let summaries = ModuleSummaries::build(module, string_table);
    let checker = BorrowChecker {
        module,
        string_table,
        config,
        summaries: &summaries,
    };

    // Both collect in module order.
    let outcomes: Vec<Result<FunctionOutcome, CompilerError>> = if config.parallel {
        module
            .functions
            .par_iter()
            .map(|function| checker.check_function(function))
            .collect()
    } else {
        module
            .functions
            .iter()
            .map(|function| checker.check_function(function))
            .collect()
    };

    let mut report = BorrowCheckReport::default();
    for outcome in outcomes {
        match outcome {
            Ok(outcome) => {
                report.stats.absorb(&outcome.analysis.stats);
                report.diagnostics.extend(outcome.diagnostics);
                report.functions.push(outcome.analysis);
            }
            Err(error) => {
                report.stats.functions_failed += 1;
                report.internal_errors.push(error);
            }
        }
    }

    borrow_log!(format!(
        "[Borrow] Completed borrow checking: functions={} failed={} nodes={} loans={} diagnostics={}",
        report.stats.functions_analyzed,
        report.stats.functions_failed,
        report.stats.nodes_analyzed,
        report.stats.loans_created,
        report.diagnostics.len()
    ));
    timer_log!(time, "Borrow checked in: ");

    Ok(report)
}

/// Everything the per-function phases read. Built once after validation.
struct FunctionContext<'a> {
    module: &'a HirModule,
    function: &'a HirFunction,
    string_table: &'a StringTable,
    config: &'a BorrowCheckConfig,
    layout: FunctionLayout,
    accesses: FunctionAccesses,
    region_signature: RegionSignature,
}

impl FunctionContext<'_> {
    fn types(&self) -> &TypeContext {
        &self.module.types
    }

    fn function_name(&self) -> &str {
        self.string_table.resolve(self.function.name)
    }
}

struct BorrowChecker<'a> {
    module: &'a HirModule,
    string_table: &'a StringTable,
    config: &'a BorrowCheckConfig,
    summaries: &'a ModuleSummaries,
}

struct FunctionOutcome {
    analysis: FunctionBorrowAnalysis,
    diagnostics: Vec<BorrowDiagnostic>,
}

impl BorrowChecker<'_> {
    fn check_function(&self, function: &HirFunction) -> Result<FunctionOutcome, CompilerError> {
        let time = Instant::now();
        validate_hir_function(self.module, function, self.string_table)?;

        let types = &self.module.types;
        let layout = FunctionLayout::build(function, types);
        let accesses = collect_accesses(function, types, &layout, self.summaries);

        let context = FunctionContext {
            module: self.module,
            function,
            string_table: self.string_table,
            config: self.config,
            layout,
            accesses,
            region_signature: region_signature(function, types, self.string_table),
        };

        borrow_log!(format!(
            "[Borrow] Checking '{}': {} reachable nodes, {} loans",
            context.function_name(),
            context.layout.reachable.len(),
            context.accesses.loans.len()
        ));

        let ownership = analyze_ownership(&context)?;
        let liveness = compute_liveness(&context)?;
        let solution = solve_regions(&context, &liveness);
        let ledger = check_ledger(&context, &solution)?;

        let reporter = BorrowDiagnostics::new(function, self.string_table);
        let mut diagnostics = Vec::new();

        if context.region_signature.is_ambiguous() {
            diagnostics.push(reporter.ambiguous_elision(&context.region_signature));
        }

        for violation in &ownership.violations {
            diagnostics.push(reporter.ownership_violation(violation));
        }

        for violation in &ledger.violations {
            diagnostics.push(reporter.ledger_violation(violation, &context.accesses));
        }

        for finding in find_dangling_references(&context, &solution, &ledger.live_sets) {
            diagnostics.push(reporter.dangling_reference(&finding, &context.accesses, &solution));
        }

        // Stable, so violations found at the same access keep phase order.
        diagnostics.sort_by_key(BorrowDiagnostic::sort_key);

        let stats = FunctionBorrowStats {
            reachable_nodes: context.layout.reachable.len(),
            loans: context.accesses.loans.len(),
            regions: solution.region_count(),
            constraints: solution.constraints.len(),
            ownership_visits: ownership.visits,
            liveness_visits: liveness.visits,
            region_propagation_steps: solution.propagation_steps,
            ledger_rounds: ledger.rounds,
            conflicts_checked: ledger.conflicts_checked,
        };

        let timeline = if self.config.record_ownership_timeline {
            build_timeline(&context, &reporter, &ownership.drops)
        } else {
            Vec::new()
        };

        let analysis = annotate(&context, ownership, &solution, &ledger, stats, timeline);
        timer_log!(time, "Function borrow checked in: ");

        Ok(FunctionOutcome {
            analysis,
            diagnostics,
        })
    }
}

/// Output consumed by destructor insertion and codegen.
fn annotate(
    context: &FunctionContext<'_>,
    ownership: OwnershipResult,
    solution: &RegionSolution,
    ledger: &LedgerResult,
    stats: FunctionBorrowStats,
    timeline: Vec<OwnershipEvent>,
) -> FunctionBorrowAnalysis {
    // References report their solved region. Owned locals report where they hold a value.
    let local_regions = (0..context.layout.local_count)
        .map(|index| {
            let local = LocalId(index as u32);
            let interval = match solution.local_vids[index] {
                Some(vid) => solution.interval(vid),
                None => RegionInterval {
                    points: ownership.holding_points(local),
                    outlives_function: false,
                },
            };
            (local, interval)
        })
        .collect();

    let loans = context
        .accesses
        .loans
        .iter()
        .map(|loan| LoanSummary {
            id: loan.id,
            place: loan.place.clone(),
            kind: loan.kind,
            created_at: loan.created_at,
            region: solution.interval(solution.loan_vids[loan.id.index()]),
            live_at: ledger.live_sets[loan.id.index()]
                .iter_ones()
                .map(|point| NodeId(point as u32))
                .collect(),
        })
        .collect();

    let ownership_snapshots = if context.config.record_ownership_snapshots {
        ownership
            .entry_states
            .iter()
            .enumerate()
            .filter_map(|(index, state)| {
                state.as_ref().map(|state| OwnershipSnapshot {
                    node: NodeId(index as u32),
                    locals: state.states().iter().map(LocalOwnership::from).collect(),
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    FunctionBorrowAnalysis {
        function: context.function.id,
        name: context.function_name().to_owned(),
        drops: ownership.drops,
        local_regions,
        loans,
        ownership_snapshots,
        timeline,
        stats,
    }
}
