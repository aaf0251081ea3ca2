#![cfg(test)]

//! End-to-end programs, each with the exact diagnostics it must produce.

use crate::compiler_frontend::analysis::borrow_checker::BorrowErrorKind;
use crate::compiler_frontend::analysis::borrow_checker::tests::test_support::*;
use crate::compiler_frontend::hir::hir_nodes::NodeId;

#[test]
fn use_after_move_into_another_local() {
    // a = make(); b = a; consume(a)
    let mut module = TestModule::new();
    let thing = module.thing();

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let b = main.local("b", thing);
    main.assign(a, opaque_call(vec![]));
    main.assign(b, use_of(consume(a)));
    main.eval(opaque_call(vec![consume(a)]));
    main.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::UseAfterMove);

    assert_eq!(diagnostic.code, "E0501");
    assert_eq!(diagnostic.node, Some(NodeId(2)));
    assert_eq!(diagnostic.message, "Use of moved value 'a' (moved to 'b')");
    assert_eq!(primary_line(diagnostic), 3);
    assert_eq!(secondary_lines(diagnostic), vec![2]);
    assert_eq!(diagnostic.secondary_spans[0].label, "value moved here");
    assert!(!diagnostic.suggested_fixes.is_empty());
}

#[test]
fn two_shared_borrows_are_accepted() {
    // a = make(); r1 = &a; r2 = &a; use(r1); use(r2)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_ref = module.shared_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let r1 = main.local("r1", thing_ref);
    let r2 = main.local("r2", thing_ref);
    main.assign(a, opaque_call(vec![]));
    main.assign(r1, borrow(a));
    main.assign(r2, borrow(a));
    main.eval(opaque_call(vec![read(r1)]));
    main.eval(opaque_call(vec![read(r2)]));
    main.finish();

    let report = check(module);
    assert_clean(&report);
    assert_eq!(report.functions[0].loans.len(), 2);
}

#[test]
fn shared_borrow_while_exclusive_borrow_is_live() {
    // a = make(); r = &mut a; r2 = &a; use(r)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_mut = module.exclusive_ref(thing);
    let thing_ref = module.shared_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let r = main.local("r", thing_mut);
    let r2 = main.local("r2", thing_ref);
    main.assign(a, opaque_call(vec![]));
    main.assign(r, borrow_mut(a));
    main.assign(r2, borrow(a));
    main.eval(opaque_call(vec![consume(r)]));
    main.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::ConflictingBorrow);

    assert_eq!(diagnostic.code, "E0503");
    assert_eq!(diagnostic.node, Some(NodeId(2)));
    assert_eq!(
        diagnostic.message,
        "Cannot borrow 'a' as shared because it is also borrowed as exclusive"
    );
    assert_eq!(secondary_lines(diagnostic), vec![2]);
}

#[test]
fn returning_reference_to_local_dangles() {
    // fn f() -> &Thing { x = make(); return &x }
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_ref = module.shared_ref(thing);

    let mut f = module.function("f");
    let x = f.local("x", thing);
    f.returns(thing_ref);
    f.assign(x, opaque_call(vec![]));
    f.ret(Some(borrow(x)));
    f.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::DanglingReference);

    assert_eq!(diagnostic.code, "E0505");
    assert_eq!(diagnostic.node, Some(NodeId(1)));
    assert_eq!(primary_line(diagnostic), 2);

    // Storage ends at the scope exit, the escape path goes through the return.
    let lines = secondary_lines(diagnostic);
    assert!(lines.contains(&3), "secondary lines: {lines:?}");
    assert!(lines.contains(&2), "secondary lines: {lines:?}");

    let analysis = &report.functions[0];
    assert!(analysis.loans[0].region.outlives_function);
}

#[test]
fn borrow_ending_in_inner_scope_allows_later_mutation() {
    // a = make(); { r = &a; use(r) } mutate(&mut a)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_ref = module.shared_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    main.assign(a, opaque_call(vec![]));
    main.open_scope();
    let r = main.local("r", thing_ref);
    main.assign(r, borrow(a));
    main.eval(opaque_call(vec![read(r)]));
    main.close_scope();
    main.eval(opaque_call(vec![exclusive(a)]));
    main.finish();

    let report = check(module);
    assert_clean(&report);

    let analysis = &report.functions[0];
    assert_eq!(analysis.loans[0].live_at, vec![NodeId(2)]);
    assert_eq!(analysis.local_regions[&r].points, vec![NodeId(2)]);
    assert!(!analysis.loans[0].region.outlives_function);
}

// ------------------------------------------------------------
// Soundness: each of these must be rejected
// ------------------------------------------------------------

#[test]
fn moving_twice_is_a_double_move() {
    // a = make(); b = a; c = a
    let mut module = TestModule::new();
    let thing = module.thing();

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let b = main.local("b", thing);
    let c = main.local("c", thing);
    main.assign(a, opaque_call(vec![]));
    main.assign(b, use_of(consume(a)));
    main.assign(c, use_of(consume(a)));
    main.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::DoubleMove);

    assert_eq!(diagnostic.code, "E0502");
    assert_eq!(diagnostic.node, Some(NodeId(2)));
    assert_eq!(secondary_lines(diagnostic), vec![2]);
    assert_eq!(diagnostic.secondary_spans[0].label, "first moved here");
}

#[test]
fn two_live_exclusive_borrows_conflict() {
    // a = make(); r1 = &mut a; r2 = &mut a; use(r1); use(r2)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_mut = module.exclusive_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let r1 = main.local("r1", thing_mut);
    let r2 = main.local("r2", thing_mut);
    main.assign(a, opaque_call(vec![]));
    main.assign(r1, borrow_mut(a));
    main.assign(r2, borrow_mut(a));
    main.eval(opaque_call(vec![consume(r1)]));
    main.eval(opaque_call(vec![consume(r2)]));
    main.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::ConflictingBorrow);

    assert_eq!(diagnostic.node, Some(NodeId(2)));
    assert_eq!(
        diagnostic.message,
        "Cannot borrow 'a' as exclusive more than once at a time"
    );
}

#[test]
fn reading_while_exclusively_borrowed_conflicts() {
    // a = make(); r = &mut a; inspect(a); use(r)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_mut = module.exclusive_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let r = main.local("r", thing_mut);
    main.assign(a, opaque_call(vec![]));
    main.assign(r, borrow_mut(a));
    main.eval(opaque_call(vec![read(a)]));
    main.eval(opaque_call(vec![consume(r)]));
    main.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::ConflictingBorrow);

    assert_eq!(diagnostic.node, Some(NodeId(2)));
    assert_eq!(
        diagnostic.message,
        "Cannot read 'a' while it is borrowed as exclusive"
    );
}

#[test]
fn moving_a_borrowed_value_is_reported_once() {
    // a = make(); r = &a; b = a; use(r)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_ref = module.shared_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let r = main.local("r", thing_ref);
    let b = main.local("b", thing);
    main.assign(a, opaque_call(vec![]));
    main.assign(r, borrow(a));
    main.assign(b, use_of(consume(a)));
    main.eval(opaque_call(vec![read(r)]));
    main.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::MoveWhileBorrowed);

    assert_eq!(diagnostic.code, "E0504");
    assert_eq!(diagnostic.node, Some(NodeId(2)));
    assert_eq!(
        diagnostic.message,
        "Cannot move out of 'a' because it is borrowed"
    );

    // The move kills the loan, so it is not live at the later read.
    let analysis = &report.functions[0];
    assert_eq!(analysis.loans[0].live_at, vec![NodeId(2)]);
}

// ------------------------------------------------------------
// Precision: each of these must be accepted
// ------------------------------------------------------------

#[test]
fn moving_after_last_use_is_accepted() {
    // a = make(); inspect(a); b = a; c = b
    let mut module = TestModule::new();
    let thing = module.thing();

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let b = main.local("b", thing);
    let c = main.local("c", thing);
    main.assign(a, opaque_call(vec![]));
    main.eval(opaque_call(vec![read(a)]));
    main.assign(b, use_of(consume(a)));
    main.assign(c, use_of(consume(b)));
    main.finish();

    assert_clean(&check(module));
}

#[test]
fn borrow_ends_at_last_use_before_move() {
    // a = make(); r = &a; use(r); b = a
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_ref = module.shared_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let r = main.local("r", thing_ref);
    let b = main.local("b", thing);
    main.assign(a, opaque_call(vec![]));
    main.assign(r, borrow(a));
    main.eval(opaque_call(vec![read(r)]));
    main.assign(b, use_of(consume(a)));
    main.finish();

    assert_clean(&check(module));
}

#[test]
fn exclusive_borrows_of_disjoint_fields_are_accepted() {
    // p = make(); r1 = &mut p.left; r2 = &mut p.right; use(r1); use(r2)
    let mut module = TestModule::new();
    let thing = module.thing();
    let pair = pair_of(&mut module, thing);
    let thing_mut = module.exclusive_ref(thing);

    let mut main = module.function("main");
    let p = main.local("p", pair);
    let r1 = main.local("r1", thing_mut);
    let r2 = main.local("r2", thing_mut);
    let left = main.field(p, "left");
    let right = main.field(p, "right");
    main.assign(p, opaque_call(vec![]));
    main.assign(r1, borrow_mut(left));
    main.assign(r2, borrow_mut(right));
    main.eval(opaque_call(vec![consume(r1)]));
    main.eval(opaque_call(vec![consume(r2)]));
    main.finish();

    assert_clean(&check(module));
}

#[test]
fn shared_reborrow_through_reference_is_accepted() {
    // a = make(); r = &a; s = &*r; use(s); use(r)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_ref = module.shared_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let r = main.local("r", thing_ref);
    let s = main.local("s", thing_ref);
    main.assign(a, opaque_call(vec![]));
    main.assign(r, borrow(a));
    main.assign(s, borrow(deref(r)));
    main.eval(opaque_call(vec![read(s)]));
    main.eval(opaque_call(vec![read(r)]));
    main.finish();

    assert_clean(&check(module));
}

#[test]
fn copyable_values_can_be_used_repeatedly() {
    // n = 1; m = n; k = n
    let mut module = TestModule::new();
    let int = module.int();

    let mut main = module.function("main");
    let n = main.local("n", int);
    let m = main.local("m", int);
    let k = main.local("k", int);
    main.assign(n, constant());
    main.assign(m, use_of(consume(n)));
    main.assign(k, use_of(consume(n)));
    main.finish();

    let report = check(module);
    assert_clean(&report);
    assert!(report.functions[0].drops_at(NodeId(3)).is_empty());
}

#[test]
fn reinitializing_a_moved_local_is_accepted() {
    // a = make(); b = a; a = make(); c = a
    let mut module = TestModule::new();
    let thing = module.thing();

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let b = main.local("b", thing);
    let c = main.local("c", thing);
    main.assign(a, opaque_call(vec![]));
    main.assign(b, use_of(consume(a)));
    main.assign(a, opaque_call(vec![]));
    main.assign(c, use_of(consume(a)));
    main.finish();

    assert_clean(&check(module));
}

#[test]
fn independent_violations_are_all_reported_in_program_order() {
    // a = make(); b = a; consume(a); r = &mut c; inspect(c); use(r)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_mut = module.exclusive_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let b = main.local("b", thing);
    let c = main.local("c", thing);
    let r = main.local("r", thing_mut);
    main.assign(a, opaque_call(vec![]));
    main.assign(b, use_of(consume(a)));
    main.eval(opaque_call(vec![consume(a)]));
    main.assign(c, opaque_call(vec![]));
    main.assign(r, borrow_mut(c));
    main.eval(opaque_call(vec![read(c)]));
    main.eval(opaque_call(vec![consume(r)]));
    main.finish();

    let report = check(module);
    assert_eq!(
        kinds(&report),
        vec![
            BorrowErrorKind::UseAfterMove,
            BorrowErrorKind::ConflictingBorrow
        ]
    );
    assert_eq!(report.diagnostics[0].node, Some(NodeId(2)));
    assert_eq!(report.diagnostics[1].node, Some(NodeId(5)));
}
