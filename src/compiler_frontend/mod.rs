pub mod analysis;

pub mod compiler_messages {
    pub mod compiler_dev_logging;
    pub mod compiler_errors;
}
pub use compiler_messages::compiler_errors;

pub mod hir;
pub mod string_interning;
pub mod text_location;
