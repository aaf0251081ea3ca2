use crate::compiler_frontend::string_interning::StringTable;
use crate::compiler_frontend::text_location::TextLocation;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
pub enum ErrorMetaDataKey {
    CompilationStage,

    /// Which invariant of the input contract was broken.
    BrokenInvariant,
    /// Round or visit count reached before giving up.
    IterationCap,
}

/// Internal failure of the engine or of an upstream phase.
///
/// User-facing ownership and borrow violations are never reported through this
/// type. They are `BorrowDiagnostic` records. A `CompilerError` aborts the
/// analysis of exactly one function.
#[derive(Debug, Clone)]
pub struct CompilerError {
    pub msg: String,
    pub location: TextLocation,
    pub error_type: ErrorType,

    // Structured detail for tooling. Values are static so records stay cheap to clone.
    pub metadata: HashMap<ErrorMetaDataKey, &'static str>,
}

impl CompilerError {
    pub fn new(msg: impl Into<String>, location: TextLocation, error_type: ErrorType) -> Self {
        CompilerError {
            msg: msg.into(),
            location,
            error_type,
            metadata: HashMap::new(),
        }
    }

    /// Create a config error for a malformed settings file
    pub fn config_error(msg: impl Into<String>) -> Self {
        CompilerError::new(msg, TextLocation::default(), ErrorType::Config)
    }

    /// Stable code for internal errors, kept apart from the user-facing taxonomy.
    pub fn code(&self) -> &'static str {
        match self.error_type {
            ErrorType::BorrowChecker => "I0002",
            ErrorType::Compiler => "I0001",
            ErrorType::Config => "I0003",
        }
    }

    pub fn describe(&self, string_table: &StringTable) -> String {
        format!(
            "{}[{}] at {}: {}",
            error_type_to_str(&self.error_type),
            self.code(),
            self.location.describe(string_table),
            self.msg
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// The engine broke one of its own guarantees (e.g. a fixed point did not converge).
    Compiler,
    /// The CFG handed over by an upstream phase violates the input contract.
    BorrowChecker,
    Config,
}

pub fn error_type_to_str(e_type: &ErrorType) -> &'static str {
    match e_type {
        ErrorType::Compiler => "Compiler Bug",
        ErrorType::BorrowChecker => "Malformed Borrow Checker Input",
        ErrorType::Config => "Malformed Config",
    }
}

/// Returns a new CompilerError for input that breaks the borrow checker's contract.
///
/// Usage: `return_borrow_checker_error!(format!("Unknown local '{}'", id), location, {
///     CompilationStage => "Borrow Checking",
/// })`;
#[macro_export]
macro_rules! return_borrow_checker_error {
    // New with metadata
    ($msg:expr, $location:expr, { $( $key:ident => $value:expr ),* $(,)? }) => {
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $location,
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::BorrowChecker,
            metadata: {
                let mut map = std::collections::HashMap::new();
                $( map.insert($crate::compiler_frontend::compiler_errors::ErrorMetaDataKey::$key, $value); )*
                map
            },
        })
    };
    // New simple
    ($msg:expr, $location:expr) => {
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $location,
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::BorrowChecker,
            metadata: std::collections::HashMap::new(),
        })
    };
}

/// Returns a new CompilerError for internal compiler bugs.
///
/// Compiler errors indicate bugs in the engine itself, not user code issues.
#[macro_export]
macro_rules! return_compiler_error {
    // Variant with format string, arguments, and metadata (with semicolon separator)
    ($fmt:expr, $($arg:expr),+ ; { $( $key:ident => $value:expr ),* $(,)? }) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: format!($fmt, $($arg),+),
            location: $crate::compiler_frontend::text_location::TextLocation::default(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Compiler,
            metadata: {
                let mut map = std::collections::HashMap::new();
                $( map.insert($crate::compiler_frontend::compiler_errors::ErrorMetaDataKey::$key, $value); )*
                map
            },
        });
    }};
    // Variant with format string and arguments (no metadata)
    ($fmt:expr, $($arg:expr),+ $(,)?) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: format!($fmt, $($arg),+),
            location: $crate::compiler_frontend::text_location::TextLocation::default(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Compiler,
            metadata: std::collections::HashMap::new(),
        });
    }};
    // Simple variant with just message (no metadata)
    ($msg:expr) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $crate::compiler_frontend::text_location::TextLocation::default(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Compiler,
            metadata: std::collections::HashMap::new(),
        });
    }};
}
