mod borrow_checker_ledger_tests;
mod borrow_checker_scenario_tests;
pub(crate) mod test_support;
