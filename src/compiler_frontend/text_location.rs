use crate::compiler_frontend::string_interning::{StringId, StringTable};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
pub struct CharPosition {
    pub line_number: i32,
    pub char_column: i32,
}

impl PartialOrd for CharPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CharPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line_number
            .cmp(&other.line_number)
            .then(self.char_column.cmp(&other.char_column))
    }
}

/// Source span attached to every CFG node, local and diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TextLocation {
    /// Source file the span belongs to, if the upstream phase recorded one.
    pub scope: Option<StringId>,
    pub start_pos: CharPosition,
    pub end_pos: CharPosition,
}

impl TextLocation {
    pub fn new(scope: Option<StringId>, start: CharPosition, end: CharPosition) -> Self {
        Self {
            scope,
            start_pos: start,
            end_pos: end,
        }
    }

    pub fn new_just_line(line: i32) -> Self {
        Self {
            scope: None,
            start_pos: CharPosition {
                line_number: line,
                char_column: 0,
            },
            end_pos: CharPosition {
                line_number: line,
                char_column: 120, // Arbitrary number
            },
        }
    }

    pub fn describe(&self, string_table: &StringTable) -> String {
        match self.scope {
            Some(file) => format!(
                "{}:{}:{}",
                string_table.resolve(file),
                self.start_pos.line_number,
                self.start_pos.char_column
            ),
            None => format!(
                "line {}:{}",
                self.start_pos.line_number, self.start_pos.char_column
            ),
        }
    }
}
