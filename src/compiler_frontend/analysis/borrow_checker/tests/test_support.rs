#![cfg(test)]

//! Runners and small fixtures shared by the borrow checker tests.

pub(crate) use crate::compiler_frontend::hir::tests::hir_test_support::*;

use crate::compiler_frontend::analysis::borrow_checker::{
    BorrowCheckReport, BorrowDiagnostic, BorrowErrorKind, check_borrows,
};
use crate::compiler_frontend::hir::hir_datatypes::TypeId;
use crate::settings::BorrowCheckConfig;

pub(crate) fn sequential_config() -> BorrowCheckConfig {
    BorrowCheckConfig {
        parallel: false,
        ..BorrowCheckConfig::default()
    }
}

/// Checks the module on the calling thread and fails the test on any internal error.
pub(crate) fn check(module: TestModule) -> BorrowCheckReport {
    check_with(module, &sequential_config())
}

pub(crate) fn check_with(module: TestModule, config: &BorrowCheckConfig) -> BorrowCheckReport {
    let (module, string_table) = module.finish();
    let report = check_borrows(&module, &string_table, config).expect("config is valid");

    assert!(
        report.internal_errors.is_empty(),
        "unexpected internal errors: {:?}",
        report.internal_errors
    );
    report
}

pub(crate) fn kinds(report: &BorrowCheckReport) -> Vec<BorrowErrorKind> {
    report.diagnostics.iter().map(|diagnostic| diagnostic.kind).collect()
}

/// The single diagnostic of the report, of the expected kind.
pub(crate) fn only_diagnostic(report: &BorrowCheckReport, kind: BorrowErrorKind) -> &BorrowDiagnostic {
    assert_eq!(
        kinds(report),
        vec![kind],
        "diagnostics: {:#?}",
        report.diagnostics
    );
    &report.diagnostics[0]
}

pub(crate) fn assert_clean(report: &BorrowCheckReport) {
    assert!(
        report.diagnostics.is_empty(),
        "expected no diagnostics, got: {:#?}",
        report.diagnostics
    );
}

pub(crate) fn primary_line(diagnostic: &BorrowDiagnostic) -> i32 {
    diagnostic.primary_span.start_pos.line_number
}

pub(crate) fn secondary_lines(diagnostic: &BorrowDiagnostic) -> Vec<i32> {
    diagnostic
        .secondary_spans
        .iter()
        .map(|span| span.location.start_pos.line_number)
        .collect()
}

/// `Pair { left: Thing, right: Thing }`
pub(crate) fn pair_of(module: &mut TestModule, thing: TypeId) -> TypeId {
    module.struct_type("Pair", &[("left", thing), ("right", thing)])
}
