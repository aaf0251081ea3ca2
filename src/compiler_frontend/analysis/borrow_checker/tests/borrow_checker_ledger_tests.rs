#![cfg(test)]

use crate::compiler_frontend::analysis::borrow_checker::BorrowErrorKind;
use crate::compiler_frontend::analysis::borrow_checker::tests::test_support::*;
use crate::compiler_frontend::hir::hir_nodes::{NodeId, Operand};

#[test]
fn assigning_to_a_borrowed_local_conflicts() {
    // a = make(); r = &a; a = make(); use(r)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_ref = module.shared_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let r = main.local("r", thing_ref);
    main.assign(a, opaque_call(vec![]));
    main.assign(r, borrow(a));
    main.assign(a, opaque_call(vec![]));
    main.eval(opaque_call(vec![read(r)]));
    main.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::ConflictingBorrow);
    assert_eq!(diagnostic.node, Some(NodeId(2)));
    assert_eq!(diagnostic.message, "Cannot assign to 'a' while it is borrowed");
    assert_eq!(diagnostic.secondary_spans[0].label, "'a' is borrowed as shared here");
}

#[test]
fn writing_through_an_exclusive_reference_is_accepted() {
    // a = make(); r = &mut a; *r = make(); use(r)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_mut = module.exclusive_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let r = main.local("r", thing_mut);
    main.assign(a, opaque_call(vec![]));
    main.assign(r, borrow_mut(a));
    main.assign(deref(r), opaque_call(vec![]));
    main.eval(opaque_call(vec![consume(r)]));
    main.finish();

    assert_clean(&check(module));
}

#[test]
fn borrow_passed_to_a_call_ends_with_the_call() {
    // a = make(); a = update(&mut a)
    let mut module = TestModule::new();
    let thing = module.thing();

    let mut main = module.function("main");
    let a = main.local("a", thing);
    main.assign(a, opaque_call(vec![]));
    main.assign(a, opaque_call(vec![exclusive(a)]));
    main.finish();

    let report = check(module);
    assert_clean(&report);
    assert!(report.functions[0].loans[0].live_at.is_empty());
}

#[test]
fn argument_read_after_exclusive_argument_borrow_conflicts() {
    // a = make(); combine(&mut a, a)
    let mut module = TestModule::new();
    let thing = module.thing();

    let mut main = module.function("main");
    let a = main.local("a", thing);
    main.assign(a, opaque_call(vec![]));
    main.eval(opaque_call(vec![exclusive(a), read(a)]));
    main.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::ConflictingBorrow);
    assert_eq!(diagnostic.node, Some(NodeId(1)));
    assert_eq!(
        diagnostic.message,
        "Cannot read 'a' while it is borrowed as exclusive"
    );
}

#[test]
fn constant_indices_are_borrowed_independently() {
    // arr = make(); r1 = &mut arr[0]; r2 = &mut arr[1]; use(r1); use(r2)
    let mut module = TestModule::new();
    let thing = module.thing();
    let things = module.array(thing, 2);
    let thing_mut = module.exclusive_ref(thing);

    let mut main = module.function("main");
    let arr = main.local("arr", things);
    let r1 = main.local("r1", thing_mut);
    let r2 = main.local("r2", thing_mut);
    main.assign(arr, opaque_call(vec![]));
    main.assign(r1, borrow_mut(index(arr, 0)));
    main.assign(r2, borrow_mut(index(arr, 1)));
    main.eval(opaque_call(vec![consume(r1)]));
    main.eval(opaque_call(vec![consume(r2)]));
    main.finish();

    assert_clean(&check(module));
}

#[test]
fn dynamic_index_overlaps_every_element() {
    // arr = make(); r1 = &mut arr[0]; r2 = &mut arr[i]; use(r1); use(r2)
    let mut module = TestModule::new();
    let thing = module.thing();
    let things = module.array(thing, 2);
    let thing_mut = module.exclusive_ref(thing);

    let mut main = module.function("main");
    let arr = main.local("arr", things);
    let r1 = main.local("r1", thing_mut);
    let r2 = main.local("r2", thing_mut);
    main.assign(arr, opaque_call(vec![]));
    main.assign(r1, borrow_mut(index(arr, 0)));
    main.assign(r2, borrow_mut(dynamic_index(arr)));
    main.eval(opaque_call(vec![consume(r1)]));
    main.eval(opaque_call(vec![consume(r2)]));
    main.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::ConflictingBorrow);
    assert_eq!(diagnostic.node, Some(NodeId(2)));
    assert_eq!(
        diagnostic.message,
        "Cannot borrow 'arr[_]' as exclusive more than once at a time"
    );
}

#[test]
fn borrowing_the_whole_struct_conflicts_with_a_field_borrow() {
    // p = make(); r = &mut p.left; q = &p; use(r)
    let mut module = TestModule::new();
    let thing = module.thing();
    let pair = pair_of(&mut module, thing);
    let thing_mut = module.exclusive_ref(thing);
    let pair_ref = module.shared_ref(pair);

    let mut main = module.function("main");
    let p = main.local("p", pair);
    let r = main.local("r", thing_mut);
    let q = main.local("q", pair_ref);
    let left = main.field(p, "left");
    main.assign(p, opaque_call(vec![]));
    main.assign(r, borrow_mut(left));
    main.assign(q, borrow(p));
    main.eval(opaque_call(vec![consume(r)]));
    main.finish();

    let report = check(module);
    let diagnostic = only_diagnostic(&report, BorrowErrorKind::ConflictingBorrow);
    assert_eq!(diagnostic.secondary_spans[0].label, "'p.left' is borrowed as exclusive here");
}

#[test]
fn overwriting_a_reference_ends_reborrows_through_it() {
    // a, b = make(); r = &mut a; s = &mut *r; r = &mut b; use(s); use(r)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_mut = module.exclusive_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let b = main.local("b", thing);
    let r = main.local("r", thing_mut);
    let s = main.local("s", thing_mut);
    main.assign(a, opaque_call(vec![]));
    main.assign(b, opaque_call(vec![]));
    main.assign(r, borrow_mut(a));
    main.assign(s, borrow_mut(deref(r)));
    let overwrite = main.assign(r, borrow_mut(b));
    main.eval(opaque_call(vec![consume(s)]));
    main.eval(opaque_call(vec![consume(r)]));
    main.finish();

    let report = check(module);
    assert_clean(&report);

    // The reborrow of `*r` stops where `r` is overwritten.
    let reborrow = &report.functions[0].loans[1];
    assert_eq!(reborrow.created_at, NodeId(3));
    assert_eq!(reborrow.live_at, vec![overwrite]);
}

#[test]
fn reborrow_into_the_same_reference_is_accepted() {
    // p = make(); cur = &mut p; cur = &mut *cur; touch(&mut *cur)
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_mut = module.exclusive_ref(thing);

    let mut main = module.function("main");
    let p = main.local("p", thing);
    let cur = main.local("cur", thing_mut);
    main.assign(p, opaque_call(vec![]));
    main.assign(cur, borrow_mut(p));
    main.assign(cur, borrow_mut(deref(cur)));
    let touch = main.eval(opaque_call(vec![exclusive(deref(cur))]));
    main.finish();

    let report = check(module);
    assert_clean(&report);

    // The reborrow is overwritten by its own statement. `p` stays borrowed instead.
    let loans = &report.functions[0].loans;
    assert!(loans[1].live_at.is_empty());
    assert_eq!(loans[0].live_at, vec![NodeId(2), touch]);
}

#[test]
fn reborrow_into_the_same_reference_inside_a_loop_is_accepted() {
    // p = make(); cur = &mut p; loop { cur = &mut *cur; touch(&mut *cur) }
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_mut = module.exclusive_ref(thing);

    let mut main = module.function("main");
    let p = main.local("p", thing);
    let cur = main.local("cur", thing_mut);
    main.assign(p, opaque_call(vec![]));
    main.assign(cur, borrow_mut(p));
    let head = main.branch(Operand::Constant);
    main.assign(cur, borrow_mut(deref(cur)));
    let body = main.eval(opaque_call(vec![exclusive(deref(cur))]));
    main.edge(body, head);
    main.set_frontier(vec![head]);
    main.close_scope();
    main.finish();

    let report = check(module);
    assert_clean(&report);
    assert!(report.functions[0].loans[1].live_at.is_empty());
}

#[test]
fn move_kills_need_a_second_ledger_round() {
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
    only_diagnostic(&report, BorrowErrorKind::MoveWhileBorrowed);
    assert_eq!(report.functions[0].stats.ledger_rounds, 2);
}

#[test]
fn program_without_moves_settles_in_one_ledger_round() {
    let mut module = TestModule::new();
    let thing = module.thing();
    let thing_ref = module.shared_ref(thing);

    let mut main = module.function("main");
    let a = main.local("a", thing);
    let r = main.local("r", thing_ref);
    main.assign(a, opaque_call(vec![]));
    main.assign(r, borrow(a));
    main.eval(opaque_call(vec![read(r)]));
    main.finish();

    let report = check(module);
    assert_clean(&report);

    let stats = report.functions[0].stats;
    assert_eq!(stats.ledger_rounds, 1);
    assert_eq!(stats.loans, 1);
}
