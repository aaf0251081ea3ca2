pub(crate) mod hir_test_support;
mod place_tests;
