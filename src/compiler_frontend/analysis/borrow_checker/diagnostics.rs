use crate::compiler_frontend::analysis::borrow_checker::accesses::{AccessKind, FunctionAccesses};
use crate::compiler_frontend::analysis::borrow_checker::elision::{RegionSignature, UniversalKind};
use crate::compiler_frontend::analysis::borrow_checker::error_codes::BorrowErrorKind;
use crate::compiler_frontend::analysis::borrow_checker::ledger::{LedgerViolation, LedgerViolationKind};
use crate::compiler_frontend::analysis::borrow_checker::ownership::{
    OwnershipViolation, OwnershipViolationKind,
};
use crate::compiler_frontend::analysis::borrow_checker::regions::{
    DanglingReference, OutlivesConstraint, RegionSolution,
};
use crate::compiler_frontend::hir::hir_nodes::{
    FunctionId, HirFunction, LocalId, NodeId, Rvalue, Statement,
};
use crate::compiler_frontend::hir::place::Place;
use crate::compiler_frontend::string_interning::StringTable;
use crate::compiler_frontend::text_location::TextLocation;
use serde::Serialize;

/// One independent ownership or borrow violation, ready for an external renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BorrowDiagnostic {
    pub code: &'static str,
    pub kind: BorrowErrorKind,
    pub function: FunctionId,
    pub function_name: String,

    /// None for violations of the function's declaration rather than of a statement.
    pub node: Option<NodeId>,

    pub primary_span: TextLocation,
    pub secondary_spans: Vec<SecondarySpan>,
    pub message: String,
    pub suggested_fixes: Vec<String>,

    #[serde(skip)]
    pub(crate) sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecondarySpan {
    pub location: TextLocation,
    pub label: String,
}

impl BorrowDiagnostic {
    /// Declaration-level diagnostics come first, then program order.
    pub(crate) fn sort_key(&self) -> (Option<NodeId>, u32) {
        (self.node, self.sequence)
    }
}

/// Fixed suggestion templates, keyed by failure kind.
pub fn suggested_fixes(kind: BorrowErrorKind, subject: &str) -> Vec<String> {
    match kind {
        BorrowErrorKind::UseAfterMove => vec![
            format!("Clone '{subject}' before it is moved"),
            format!("Move '{subject}' only after its last use"),
        ],
        BorrowErrorKind::DoubleMove => vec![
            format!("Clone '{subject}' for one of the moves"),
            format!("Borrow '{subject}' instead of moving it"),
        ],
        BorrowErrorKind::ConflictingBorrow => vec![
            format!("End the earlier borrow of '{subject}' before this access"),
            "Borrow disjoint fields instead of the whole value".to_owned(),
        ],
        BorrowErrorKind::MoveWhileBorrowed => vec![
            format!("Move '{subject}' after the borrow's last use"),
            format!("Clone '{subject}' instead of moving it"),
        ],
        BorrowErrorKind::DanglingReference => vec![
            "Return an owned value instead of a reference".to_owned(),
            format!("Declare '{subject}' in an outer scope so it outlives the reference"),
        ],
        BorrowErrorKind::AmbiguousElision => vec![
            format!("Declare the lifetime of the reference returned by '{subject}'"),
            "Return an owned value instead of a reference".to_owned(),
        ],
    }
}

pub(super) struct BorrowDiagnostics<'a> {
    function: &'a HirFunction,
    string_table: &'a StringTable,
    function_name: String,
}

impl<'a> BorrowDiagnostics<'a> {
    pub(super) fn new(function: &'a HirFunction, string_table: &'a StringTable) -> Self {
        Self {
            function,
            string_table,
            function_name: string_table.resolve(function.name).to_owned(),
        }
    }

    pub(super) fn local_name(&self, local_id: LocalId) -> String {
        self.function
            .local(local_id)
            .and_then(|local| self.string_table.try_resolve(local.name))
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{}", local_id))
    }

    pub(super) fn place_name(&self, place: &Place) -> String {
        place.display(self.function, self.string_table)
    }

    fn node_location(&self, node: NodeId) -> TextLocation {
        self.function.node_location(node)
    }

    /// Where a value moved at this node went, e.g. `moved to 'b'`.
    pub(super) fn move_target(&self, site: NodeId) -> Option<String> {
        let statement = &self.function.node(site)?.statement;

        match statement {
            Statement::Assign {
                value: Rvalue::Call { .. },
                ..
            }
            | Statement::Eval(Rvalue::Call { .. }) => Some("moved into a call".to_owned()),
            Statement::Assign { destination, .. } => {
                Some(format!("moved to '{}'", self.place_name(destination)))
            }
            Statement::Return(Some(_)) => Some("moved out by the return".to_owned()),
            _ => None,
        }
    }

    fn local_location(&self, local_id: LocalId) -> TextLocation {
        self.function
            .local(local_id)
            .map(|local| local.location)
            .unwrap_or(self.function.location)
    }

    fn diagnostic(
        &self,
        kind: BorrowErrorKind,
        node: Option<NodeId>,
        sequence: u32,
        message: String,
        secondary_spans: Vec<SecondarySpan>,
        subject: &str,
    ) -> BorrowDiagnostic {
        let primary_span = match node {
            Some(node) => self.node_location(node),
            None => self.function.location,
        };

        BorrowDiagnostic {
            code: kind.code(),
            kind,
            function: self.function.id,
            function_name: self.function_name.clone(),
            node,
            primary_span,
            secondary_spans,
            message,
            suggested_fixes: suggested_fixes(kind, subject),
            sequence,
        }
    }

    pub(super) fn ownership_violation(&self, violation: &OwnershipViolation) -> BorrowDiagnostic {
        let name = self.place_name(&violation.place);
        let uninitialized = violation.move_sites.is_empty();

        let (kind, message, label) = match violation.kind {
            OwnershipViolationKind::UseAfterMove if uninitialized => (
                BorrowErrorKind::UseAfterMove,
                format!("'{name}' is used before it is initialized on every path"),
                "",
            ),
            OwnershipViolationKind::UseAfterMove if violation.partial => (
                BorrowErrorKind::UseAfterMove,
                format!("Use of partially moved value '{name}'"),
                "part of the value is moved here",
            ),
            OwnershipViolationKind::UseAfterMove => {
                let target = match (violation.move_sites.len(), violation.move_sites.first()) {
                    (1, Some(site)) => self.move_target(*site),
                    _ => None,
                };

                let message = match target {
                    Some(target) => format!("Use of moved value '{name}' ({target})"),
                    None => format!("Use of moved value '{name}'"),
                };
                (BorrowErrorKind::UseAfterMove, message, "value moved here")
            }
            OwnershipViolationKind::DoubleMove => (
                BorrowErrorKind::DoubleMove,
                format!("'{name}' is moved again after it was already moved"),
                "first moved here",
            ),
        };

        let secondary_spans = violation
            .move_sites
            .iter()
            .map(|site| SecondarySpan {
                location: self.node_location(*site),
                label: label.to_owned(),
            })
            .collect();

        self.diagnostic(
            kind,
            Some(violation.node),
            violation.sequence,
            message,
            secondary_spans,
            &name,
        )
    }

    pub(super) fn ledger_violation(
        &self,
        violation: &LedgerViolation,
        accesses: &FunctionAccesses,
    ) -> BorrowDiagnostic {
        let name = self.place_name(&violation.place);
        let loan = accesses.loan(violation.loan);
        let borrowed = self.place_name(&loan.place);

        let (kind, message) = match (violation.kind, violation.access) {
            (LedgerViolationKind::MoveWhileBorrowed, _) => (
                BorrowErrorKind::MoveWhileBorrowed,
                format!("Cannot move out of '{name}' because it is borrowed"),
            ),
            (_, AccessKind::Read) => (
                BorrowErrorKind::ConflictingBorrow,
                format!("Cannot read '{name}' while it is borrowed as exclusive"),
            ),
            (_, AccessKind::Write) => (
                BorrowErrorKind::ConflictingBorrow,
                format!("Cannot assign to '{name}' while it is borrowed"),
            ),
            (_, AccessKind::Borrow(id)) => {
                let requested = accesses.loan(id).kind;
                let message = if requested.is_exclusive() && loan.kind.is_exclusive() {
                    format!("Cannot borrow '{name}' as exclusive more than once at a time")
                } else {
                    format!(
                        "Cannot borrow '{name}' as {} because it is also borrowed as {}",
                        requested.as_str(),
                        loan.kind.as_str()
                    )
                };
                (BorrowErrorKind::ConflictingBorrow, message)
            }
            (_, AccessKind::Move(_)) => (
                BorrowErrorKind::MoveWhileBorrowed,
                format!("Cannot move out of '{name}' because it is borrowed"),
            ),
        };

        let secondary_spans = vec![SecondarySpan {
            location: self.node_location(loan.created_at),
            label: format!("'{borrowed}' is borrowed as {} here", loan.kind.as_str()),
        }];

        self.diagnostic(
            kind,
            Some(violation.node),
            violation.sequence,
            message,
            secondary_spans,
            &name,
        )
    }

    pub(super) fn dangling_reference(
        &self,
        finding: &DanglingReference,
        accesses: &FunctionAccesses,
        solution: &RegionSolution,
    ) -> BorrowDiagnostic {
        match finding {
            DanglingReference::LoanEscapes {
                loan,
                universal,
                storage_end,
                chain,
            } => {
                let loan = accesses.loan(*loan);
                let name = self.local_name(loan.place.root);
                let target = self.universal_name(&solution.signature, *universal);

                let mut secondary_spans = vec![SecondarySpan {
                    location: self.node_location(*storage_end),
                    label: format!("'{name}' is dropped here while still borrowed"),
                }];
                secondary_spans.extend(self.chain_spans(chain));

                self.diagnostic(
                    BorrowErrorKind::DanglingReference,
                    Some(loan.created_at),
                    loan.sequence,
                    format!(
                        "'{name}' does not live long enough: the borrow must be valid for {target}"
                    ),
                    secondary_spans,
                    &name,
                )
            }
            DanglingReference::LoanOutlivesScope { loan, storage_end } => {
                let loan = accesses.loan(*loan);
                let name = self.local_name(loan.place.root);

                self.diagnostic(
                    BorrowErrorKind::DanglingReference,
                    Some(loan.created_at),
                    loan.sequence,
                    format!("'{name}' does not live long enough"),
                    vec![SecondarySpan {
                        location: self.node_location(*storage_end),
                        label: format!("'{name}' goes out of scope here while still borrowed"),
                    }],
                    &name,
                )
            }
            DanglingReference::UniversalMismatch {
                region,
                outlived,
                chain,
            } => {
                let signature = &solution.signature;
                let region_name = self.universal_name(signature, *region);
                let outlived_name = self.universal_name(signature, *outlived);
                let subject = self.universal_subject(signature, *region);

                let mut secondary_spans = self.universal_param_spans(signature, *region);
                secondary_spans.extend(self.chain_spans(chain));

                self.diagnostic(
                    BorrowErrorKind::DanglingReference,
                    None,
                    0,
                    format!(
                        "A reference with {region_name} may outlive its data: it must be valid for {outlived_name}"
                    ),
                    secondary_spans,
                    &subject,
                )
            }
        }
    }

    pub(super) fn ambiguous_elision(&self, signature: &RegionSignature) -> BorrowDiagnostic {
        let secondary_spans = self
            .function
            .signature
            .params
            .iter()
            .zip(signature.param_universal.iter())
            .filter(|(_, universal)| universal.is_some())
            .map(|(param, _)| SecondarySpan {
                location: self.local_location(param.local),
                label: format!("'{}' is a reference parameter", self.local_name(param.local)),
            })
            .collect();

        self.diagnostic(
            BorrowErrorKind::AmbiguousElision,
            None,
            0,
            format!(
                "'{}' returns a reference, but it cannot be inferred which of its {} reference parameters it borrows from",
                self.function_name,
                signature.reference_param_count()
            ),
            secondary_spans,
            &self.function_name,
        )
    }

    fn chain_spans(&self, chain: &[OutlivesConstraint]) -> Vec<SecondarySpan> {
        chain
            .iter()
            .map(|constraint| SecondarySpan {
                location: self.node_location(constraint.node),
                label: constraint.cause.describe().to_owned(),
            })
            .collect()
    }

    fn universal_name(&self, signature: &RegionSignature, universal: usize) -> String {
        match signature.universals.get(universal).map(|region| region.kind) {
            Some(UniversalKind::Named(name)) => {
                format!("lifetime '{}", self.string_table.resolve(name))
            }
            Some(UniversalKind::Elided(param_index)) => {
                format!("the lifetime of parameter '{}'", self.param_name(param_index))
            }
            Some(UniversalKind::Free) | None => "the whole program".to_owned(),
        }
    }

    fn universal_subject(&self, signature: &RegionSignature, universal: usize) -> String {
        signature
            .universals
            .get(universal)
            .and_then(|region| region.params.first())
            .map(|param_index| self.param_name(*param_index))
            .unwrap_or_else(|| self.function_name.clone())
    }

    fn universal_param_spans(&self, signature: &RegionSignature, universal: usize) -> Vec<SecondarySpan> {
        let Some(region) = signature.universals.get(universal) else {
            return Vec::new();
        };

        region
            .params
            .iter()
            .filter_map(|param_index| self.function.signature.params.get(*param_index))
            .map(|param| SecondarySpan {
                location: self.local_location(param.local),
                label: format!("'{}' is borrowed from here", self.local_name(param.local)),
            })
            .collect()
    }

    fn param_name(&self, param_index: usize) -> String {
        self.function
            .signature
            .params
            .get(param_index)
            .map(|param| self.local_name(param.local))
            .unwrap_or_else(|| format!("#{param_index}"))
    }
}
