#![cfg(test)]

use crate::compiler_frontend::hir::hir_nodes::LocalId;
use crate::compiler_frontend::hir::place::{IndexKind, Place, PlaceRelation, Projection};
use crate::compiler_frontend::hir::tests::hir_test_support::{TestModule, constant, deref, index};
use crate::compiler_frontend::string_interning::StringTable;

fn fields(string_table: &mut StringTable) -> (Place, Place, Place) {
    let x = string_table.intern("x");
    let y = string_table.intern("y");
    let root = Place::local(LocalId(0));
    (root.clone(), root.clone().field(x), root.field(y))
}

#[test]
fn different_fields_are_disjoint() {
    let mut string_table = StringTable::new();
    let (_, left, right) = fields(&mut string_table);

    assert!(left.is_disjoint_from(&right));
    assert_eq!(left.relation_to(&right), PlaceRelation::Disjoint);
}

#[test]
fn whole_local_contains_its_fields() {
    let mut string_table = StringTable::new();
    let (root, field, _) = fields(&mut string_table);

    assert_eq!(root.relation_to(&field), PlaceRelation::Contains);
    assert_eq!(field.relation_to(&root), PlaceRelation::ContainedBy);
    assert!(root.overlaps_with(&field));
}

#[test]
fn different_roots_never_overlap() {
    let a = Place::local(LocalId(0));
    let b = Place::local(LocalId(1));

    assert_eq!(a.relation_to(&b), PlaceRelation::Disjoint);
    assert_eq!(a.relation_to(&a.clone()), PlaceRelation::Equal);
}

#[test]
fn constant_indices_are_disjoint_only_when_different() {
    let array = Place::local(LocalId(0));

    let first = index(array.clone(), 0);
    let second = index(array.clone(), 1);
    let first_again = index(array.clone(), 0);
    let dynamic = array.index(IndexKind::Dynamic);

    assert!(first.is_disjoint_from(&second));
    assert!(first.overlaps_with(&first_again));
    assert!(dynamic.overlaps_with(&first));
    assert!(dynamic.overlaps_with(&second));
}

#[test]
fn nested_fields_diverge_at_the_first_different_step() {
    let mut string_table = StringTable::new();
    let inner = string_table.intern("inner");
    let a = string_table.intern("a");
    let b = string_table.intern("b");

    let root = Place::local(LocalId(0)).field(inner);
    let left = root.clone().field(a);
    let right = root.clone().field(b);

    assert!(left.is_disjoint_from(&right));
    assert_eq!(root.relation_to(&left), PlaceRelation::Contains);
}

#[test]
fn dereferenced_prefixes_list_every_reference_read() {
    let mut string_table = StringTable::new();
    let f = string_table.intern("f");
    let g = string_table.intern("g");

    // (*(*r).f).g
    let place = deref(deref(LocalId(0)).field(f)).field(g);
    let prefixes = place.dereferenced_prefixes();

    assert_eq!(prefixes.len(), 2);
    assert_eq!(prefixes[0], Place::local(LocalId(0)));
    assert_eq!(
        prefixes[1].projections,
        vec![Projection::Deref, Projection::Field(f)]
    );
    assert!(place.has_deref());
    assert!(!Place::local(LocalId(0)).has_deref());
}

#[test]
fn place_types_follow_projections() {
    let mut module = TestModule::new();
    let int = module.int();
    let pair = module.struct_type("Pair", &[("left", int), ("right", int)]);
    let pair_ref = module.shared_ref(pair);
    let items = module.array(pair, 4);

    let mut function = module.function("main");
    let p = function.local("p", pair_ref);
    let arr = function.local("arr", items);
    let left_through_ref = function.field(deref(p), "left");
    let right_of_second = function.field(index(arr, 1), "right");
    let missing = function.field(arr, "left");
    function.assign(p, constant());
    function.assign(arr, constant());
    function.finish();

    let (hir, _) = module.finish();
    let main = &hir.functions[0];

    assert_eq!(left_through_ref.type_in(main, &hir.types), Some(int));
    assert_eq!(right_of_second.type_in(main, &hir.types), Some(int));
    assert_eq!(missing.type_in(main, &hir.types), None);
}

#[test]
fn display_resolves_names() {
    let mut module = TestModule::new();
    let int = module.int();
    let pair = module.struct_type("Pair", &[("left", int)]);
    let pair_ref = module.shared_ref(pair);

    let mut function = module.function("main");
    let r = function.local("r", pair_ref);
    let field = function.field(deref(r), "left");
    function.assign(r, constant());
    function.finish();

    let (hir, string_table) = module.finish();
    assert_eq!(field.display(&hir.functions[0], &string_table), "(*r).left");
    assert_eq!(deref(r).display(&hir.functions[0], &string_table), "*r");
}
