pub mod borrow_checker;
