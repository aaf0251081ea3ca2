//! Region (lifetime) solver.
//!
//! Regions are integer handles into a per-function constraint store. Each region's value
//! is a set of points: every CFG node plus one end marker per universal region. A universal
//! region contains all nodes and its own end marker; a region that ends up containing an
//! end marker must outlive the function body.
//!
//! Constraints are `sup ⊇ sub` edges. Solving is a worklist least fixed point that pushes
//! point sets from `sub` to `sup` until nothing changes.

use crate::borrow_log;
use crate::compiler_frontend::analysis::borrow_checker::FunctionContext;
use crate::compiler_frontend::analysis::borrow_checker::accesses::{FlowSource, FlowTarget};
use crate::compiler_frontend::analysis::borrow_checker::elision::{RegionSignature, ReturnRegion};
use crate::compiler_frontend::analysis::borrow_checker::ledger::LoanId;
use crate::compiler_frontend::analysis::borrow_checker::liveness::Liveness;
use crate::compiler_frontend::analysis::borrow_checker::state::PointSet;
use crate::compiler_frontend::analysis::borrow_checker::types::RegionInterval;
use crate::compiler_frontend::hir::hir_nodes::{LocalId, NodeId};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionVid(pub u32);

impl RegionVid {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ConstraintCause {
    Assignment,
    Aggregate,
    CallResult,
    Return,
    Reborrow,
}

impl ConstraintCause {
    pub(super) fn describe(self) -> &'static str {
        match self {
            ConstraintCause::Assignment => "the reference is stored here",
            ConstraintCause::Aggregate => "the reference is stored in an aggregate here",
            ConstraintCause::CallResult => "the call result may borrow from this argument",
            ConstraintCause::Return => "the reference is returned here",
            ConstraintCause::Reborrow => "the reborrow must not outlive the reference here",
        }
    }
}

/// `sup ⊇ sub`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct OutlivesConstraint {
    pub sup: RegionVid,
    pub sub: RegionVid,
    pub node: NodeId,
    pub cause: ConstraintCause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RegionOrigin {
    Universal(usize),
    Local(LocalId),
    Loan(LoanId),

    /// Return slot of a function whose returned lifetime could not be elided.
    ReturnSlot,
}

#[derive(Debug, Clone)]
pub(super) struct RegionSolution {
    pub signature: RegionSignature,
    pub node_count: usize,
    pub origins: Vec<RegionOrigin>,
    pub universal_vids: Vec<RegionVid>,
    pub local_vids: Vec<Option<RegionVid>>,
    pub loan_vids: Vec<RegionVid>,
    pub constraints: Vec<OutlivesConstraint>,
    pub propagation_steps: usize,
    seeds: Vec<PointSet>,
    values: Vec<PointSet>,
}

pub(super) fn solve_regions(context: &FunctionContext<'_>, liveness: &Liveness) -> RegionSolution {
    let function = context.function;
    let layout = &context.layout;
    let signature = context.region_signature.clone();
    let node_count = layout.node_count;
    let point_count = node_count + signature.universals.len();

    let mut builder = RegionBuilder {
        origins: Vec::new(),
        seeds: Vec::new(),
        point_count,
    };

    let universal_vids = (0..signature.universals.len())
        .map(|universal| {
            let mut seed = PointSet::full_range(point_count, node_count);
            seed.insert(node_count + universal);
            builder.fresh(RegionOrigin::Universal(universal), seed)
        })
        .collect::<Vec<_>>();

    let mut local_vids = vec![None; layout.local_count];
    for (param_index, param) in function.signature.params.iter().enumerate() {
        if let Some(Some(universal)) = signature.param_universal.get(param_index)
            && let Some(slot) = local_vids.get_mut(param.local.index())
        {
            *slot = Some(universal_vids[*universal]);
        }
    }

    for (index, carrying) in layout.region_carrying.iter().enumerate() {
        if !carrying || local_vids[index].is_some() {
            continue;
        }

        let local = LocalId(index as u32);
        let seed = liveness.live_points(local, node_count);
        local_vids[index] = Some(builder.fresh(RegionOrigin::Local(local), seed));
    }

    let loan_vids = context
        .accesses
        .loans
        .iter()
        .map(|loan| builder.fresh(RegionOrigin::Loan(loan.id), PointSet::empty(point_count)))
        .collect::<Vec<_>>();

    let return_vid = match signature.return_region {
        ReturnRegion::NotReference => None,
        ReturnRegion::Universal(universal) => Some(universal_vids[universal]),
        ReturnRegion::Ambiguous => Some(builder.fresh(
            RegionOrigin::ReturnSlot,
            PointSet::empty(point_count),
        )),
    };

    let mut constraints = Vec::new();

    for flow in &context.accesses.flows {
        let sup = match flow.source {
            FlowSource::Loan(loan) => Some(loan_vids[loan.index()]),
            FlowSource::Local(local) => local_vids[local.index()],
        };
        let sub = match flow.target {
            FlowTarget::Local(local) => local_vids[local.index()],
            FlowTarget::ReturnSlot => return_vid,
        };

        if let (Some(sup), Some(sub)) = (sup, sub) {
            constraints.push(OutlivesConstraint {
                sup,
                sub,
                node: flow.node,
                cause: flow.cause,
            });
        }
    }

    // A reborrow through `r` may not outlive `r`.
    for loan in &context.accesses.loans {
        for prefix in loan.place.dereferenced_prefixes() {
            if let Some(reference_vid) = local_vids[prefix.root.index()] {
                constraints.push(OutlivesConstraint {
                    sup: reference_vid,
                    sub: loan_vids[loan.id.index()],
                    node: loan.created_at,
                    cause: ConstraintCause::Reborrow,
                });
            }
        }
    }

    let RegionBuilder { origins, seeds, .. } = builder;
    let (values, propagation_steps) = propagate(&seeds, &constraints);

    borrow_log!(format!(
        "[Regions] '{}' solved {} regions with {} constraints in {} steps",
        context.function_name(),
        origins.len(),
        constraints.len(),
        propagation_steps
    ));

    RegionSolution {
        signature,
        node_count,
        origins,
        universal_vids,
        local_vids,
        loan_vids,
        constraints,
        propagation_steps,
        seeds,
        values,
    }
}

struct RegionBuilder {
    origins: Vec<RegionOrigin>,
    seeds: Vec<PointSet>,
    point_count: usize,
}

impl RegionBuilder {
    fn fresh(&mut self, origin: RegionOrigin, mut seed: PointSet) -> RegionVid {
        if seed.len() != self.point_count {
            seed = seed.resized(self.point_count);
        }

        let vid = RegionVid(self.origins.len() as u32);
        self.origins.push(origin);
        self.seeds.push(seed);
        vid
    }
}

/// Least fixed point of `value(sup) ⊇ value(sub)` over all constraints.
fn propagate(seeds: &[PointSet], constraints: &[OutlivesConstraint]) -> (Vec<PointSet>, usize) {
    let mut values = seeds.to_vec();
    let mut by_sub = vec![Vec::new(); seeds.len()];
    for (index, constraint) in constraints.iter().enumerate() {
        by_sub[constraint.sub.index()].push(index);
    }

    let mut worklist = (0..seeds.len()).collect::<VecDeque<_>>();
    let mut queued = vec![true; seeds.len()];
    let mut steps = 0;

    while let Some(sub) = worklist.pop_front() {
        queued[sub] = false;
        let sub_value = values[sub].clone();

        for constraint_index in &by_sub[sub] {
            steps += 1;
            let sup = constraints[*constraint_index].sup.index();
            if values[sup].union_with(&sub_value) && !queued[sup] {
                queued[sup] = true;
                worklist.push_back(sup);
            }
        }
    }

    (values, steps)
}

impl RegionSolution {
    pub(super) fn region_count(&self) -> usize {
        self.origins.len()
    }

    pub(super) fn value(&self, vid: RegionVid) -> &PointSet {
        &self.values[vid.index()]
    }

    pub(super) fn loan_region(&self, loan: LoanId) -> &PointSet {
        self.value(self.loan_vids[loan.index()])
    }

    pub(super) fn end_marker(&self, universal: usize) -> usize {
        self.node_count + universal
    }

    /// The first universal region whose end the region has to reach.
    pub(super) fn first_escape(&self, vid: RegionVid) -> Option<usize> {
        (0..self.universal_vids.len()).find(|universal| {
            self.values[vid.index()].contains(self.end_marker(*universal))
        })
    }

    /// The constraints that carried `point` into `from`, outermost first.
    pub(super) fn constraint_chain(&self, from: RegionVid, point: usize) -> Vec<OutlivesConstraint> {
        let region_count = self.origins.len();
        let mut by_sup = vec![Vec::new(); region_count];
        for (index, constraint) in self.constraints.iter().enumerate() {
            by_sup[constraint.sup.index()].push(index);
        }

        // Breadth-first so the shortest explanation wins.
        let mut came_from: Vec<Option<usize>> = vec![None; region_count];
        let mut visited = vec![false; region_count];
        let mut queue = VecDeque::from([from.index()]);
        visited[from.index()] = true;

        while let Some(current) = queue.pop_front() {
            if self.seeds[current].contains(point) {
                let mut chain = Vec::new();
                let mut cursor = current;
                while let Some(constraint_index) = came_from[cursor] {
                    let constraint = self.constraints[constraint_index];
                    chain.push(constraint);
                    cursor = constraint.sup.index();
                }
                chain.reverse();
                return chain;
            }

            for constraint_index in &by_sup[current] {
                let sub = self.constraints[*constraint_index].sub.index();
                if !visited[sub] && self.values[sub].contains(point) {
                    visited[sub] = true;
                    came_from[sub] = Some(*constraint_index);
                    queue.push_back(sub);
                }
            }
        }

        Vec::new()
    }

    pub(super) fn interval(&self, vid: RegionVid) -> RegionInterval {
        let value = &self.values[vid.index()];
        let points = value
            .iter_ones()
            .take_while(|point| *point < self.node_count)
            .map(|point| NodeId(point as u32))
            .collect();

        RegionInterval {
            points,
            outlives_function: value.iter_ones().any(|point| point >= self.node_count),
        }
    }
}

// ============================================================
// Dangling references
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum DanglingReference {
    /// A borrow of local storage flows into a region that outlives the function.
    LoanEscapes {
        loan: LoanId,
        universal: usize,
        storage_end: NodeId,
        chain: Vec<OutlivesConstraint>,
    },

    /// A borrow of local storage is still live where that storage goes away.
    LoanOutlivesScope { loan: LoanId, storage_end: NodeId },

    /// A parameter's region is required to outlive another, unrelated parameter region.
    UniversalMismatch {
        region: usize,
        outlived: usize,
        chain: Vec<OutlivesConstraint>,
    },
}

/// At most one finding per loan, then one per offending pair of universal regions.
pub(super) fn find_dangling_references(
    context: &FunctionContext<'_>,
    solution: &RegionSolution,
    live_sets: &[PointSet],
) -> Vec<DanglingReference> {
    let function = context.function;
    let mut findings = Vec::new();

    for loan in &context.accesses.loans {
        // Reborrows point at storage owned by someone else.
        if loan.place.has_deref() {
            continue;
        }

        let scope = function.local(loan.place.root).map(|local| local.scope);
        let scope_ends = scope
            .and_then(|scope| context.layout.scope_end_nodes.get(scope.index()))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let loan_vid = solution.loan_vids[loan.id.index()];
        if let Some(universal) = solution.first_escape(loan_vid) {
            findings.push(DanglingReference::LoanEscapes {
                loan: loan.id,
                universal,
                storage_end: scope_ends.first().copied().unwrap_or(function.exit),
                chain: solution.constraint_chain(loan_vid, solution.end_marker(universal)),
            });
            continue;
        }

        let live = &live_sets[loan.id.index()];
        if let Some(storage_end) = scope_ends.iter().find(|node| live.contains(node.index())) {
            findings.push(DanglingReference::LoanOutlivesScope {
                loan: loan.id,
                storage_end: *storage_end,
            });
        }
    }

    let free = solution.signature.free_region();
    for region in 0..solution.universal_vids.len() {
        if region == free {
            continue;
        }

        let region_vid = solution.universal_vids[region];
        for outlived in 0..solution.universal_vids.len() {
            if outlived == region {
                continue;
            }

            let marker = solution.end_marker(outlived);
            if solution.value(region_vid).contains(marker) {
                findings.push(DanglingReference::UniversalMismatch {
                    region,
                    outlived,
                    chain: solution.constraint_chain(region_vid, marker),
                });
            }
        }
    }

    findings
}
