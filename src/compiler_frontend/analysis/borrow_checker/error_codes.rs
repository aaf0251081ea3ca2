//! Stable error codes for borrow checker diagnostics.
//!
//! User-facing violations use the `E05xx` range. Internal failures of the engine or of an
//! upstream phase use `I0xxx` (see `CompilerError::code`). Codes are never reused.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BorrowErrorKind {
    UseAfterMove,
    DoubleMove,
    ConflictingBorrow,
    MoveWhileBorrowed,
    DanglingReference,
    AmbiguousElision,
}

impl BorrowErrorKind {
    pub const ALL: [BorrowErrorKind; 6] = [
        BorrowErrorKind::UseAfterMove,
        BorrowErrorKind::DoubleMove,
        BorrowErrorKind::ConflictingBorrow,
        BorrowErrorKind::MoveWhileBorrowed,
        BorrowErrorKind::DanglingReference,
        BorrowErrorKind::AmbiguousElision,
    ];

    pub fn code(self) -> &'static str {
        match self {
            BorrowErrorKind::UseAfterMove => "E0501",
            BorrowErrorKind::DoubleMove => "E0502",
            BorrowErrorKind::ConflictingBorrow => "E0503",
            BorrowErrorKind::MoveWhileBorrowed => "E0504",
            BorrowErrorKind::DanglingReference => "E0505",
            BorrowErrorKind::AmbiguousElision => "E0506",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BorrowErrorKind::UseAfterMove => "use after move",
            BorrowErrorKind::DoubleMove => "double move",
            BorrowErrorKind::ConflictingBorrow => "conflicting borrow",
            BorrowErrorKind::MoveWhileBorrowed => "move while borrowed",
            BorrowErrorKind::DanglingReference => "dangling reference",
            BorrowErrorKind::AmbiguousElision => "ambiguous lifetime elision",
        }
    }
}

/// Long-form explanation for a diagnostic or internal error code.
pub fn explain(code: &str) -> Option<&'static str> {
    let explanation = match code {
        "E0501" => {
            "A value was used after ownership of it was moved elsewhere.\n\n\
             Once a non-copyable value is passed by value, assigned to another place or \
             returned, the original place no longer owns it. Reading, borrowing or passing \
             it again is rejected on every path where the move may have happened. This also \
             covers locals read before they are initialized and whole values used after one \
             of their fields was moved out.\n\n\
             Clone the value before the move, or move it only after its last use."
        }
        "E0502" => {
            "A value was moved a second time.\n\n\
             Moving an already moved value into a new owner would leave two owners \
             responsible for dropping it.\n\n\
             Clone the value for one of the moves, or borrow it instead of moving it."
        }
        "E0503" => {
            "A place was accessed in a way that conflicts with a live borrow.\n\n\
             While an exclusive borrow of a place is live, no other borrow, read or write \
             of any overlapping place is allowed. While a shared borrow is live, the place \
             may be read and borrowed shared again but not borrowed exclusively or written. \
             A borrow is live from where it is created to the last use of the reference.\n\n\
             End the earlier borrow before this access, or borrow disjoint fields."
        }
        "E0504" => {
            "A value was moved while a borrow of it is still live.\n\n\
             The borrow would refer to a value that has a new owner, which may drop it.\n\n\
             Move the value after the borrow's last use, or clone it."
        }
        "E0505" => {
            "A reference may outlive the value it points to.\n\n\
             A borrow of a local must end before the local's scope ends. Returning a \
             reference to a local, storing it somewhere that outlives the function, or \
             returning a reference derived from a parameter whose lifetime is not tied to \
             the return type all leave the reference dangling.\n\n\
             Return an owned value, or declare the borrowed value in an outer scope."
        }
        "E0506" => {
            "A function returns a reference but its lifetime cannot be inferred.\n\n\
             With several reference parameters and no receiver, it is unclear which of \
             them the returned reference borrows from. The lifetime has to be declared.\n\n\
             Declare the lifetime of the returned reference, or return an owned value."
        }
        "I0001" => {
            "Internal error in the borrow checker itself, for example a fixed point that \
             did not converge within the configured cap. The affected function is not \
             checked. This is a bug in the engine, not in the program being checked."
        }
        "I0002" => {
            "The control flow graph handed to the borrow checker breaks its input \
             contract: an out-of-range node, an unknown local, type or scope, an exit node \
             with successors, or a local that is never initialized. The affected function \
             is not checked. This is a bug in an earlier compiler phase."
        }
        "I0003" => {
            "The borrow checker configuration could not be read or contains invalid values."
        }
        _ => return None,
    };

    Some(explanation)
}
