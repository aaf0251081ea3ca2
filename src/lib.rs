pub mod compiler_frontend;
pub mod settings;

pub use compiler_frontend::analysis::borrow_checker::{
    BorrowCheckReport, BorrowDiagnostic, BorrowErrorKind, check_borrows, explain,
};
pub use compiler_frontend::compiler_errors::{CompilerError, ErrorType};
pub use settings::BorrowCheckConfig;
