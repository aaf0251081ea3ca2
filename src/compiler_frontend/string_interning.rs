use crate::settings::MINIMUM_STRING_TABLE_CAPACITY;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// A unique identifier for an interned string, represented as a u32 for memory efficiency.
/// This provides type safety to prevent mixing string IDs with other integer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StringId(u32);

impl StringId {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Resolve this interned string using the provided StringTable.
    #[inline]
    pub fn resolve(self, table: &StringTable) -> &str {
        table.resolve(self)
    }
}

impl std::fmt::Display for StringId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StringId({})", self.0)
    }
}

/// Stores every local, field and lifetime name used by a module exactly once.
///
/// The table is built by the upstream phases and is read-only while functions
/// are checked, so it is shared across worker threads without locking.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    strings: Vec<Box<str>>,
    string_to_id: FxHashMap<Box<str>, StringId>,
}

impl StringTable {
    pub fn new() -> Self {
        Self {
            strings: Vec::with_capacity(MINIMUM_STRING_TABLE_CAPACITY),
            string_to_id: FxHashMap::default(),
        }
    }

    /// Intern a string slice, returning its unique ID.
    /// If the string already exists, returns the existing ID.
    #[inline]
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&existing_id) = self.string_to_id.get(s) {
            return existing_id;
        }

        self.intern_new(s)
    }

    #[cold]
    #[inline(never)]
    fn intern_new(&mut self, s: &str) -> StringId {
        let new_id = StringId(self.strings.len() as u32);
        let boxed: Box<str> = s.into();
        self.string_to_id.insert(boxed.clone(), new_id);
        self.strings.push(boxed);
        new_id
    }

    /// Resolve an interned string ID back to its string content.
    ///
    /// IDs from another table resolve to a placeholder rather than panicking,
    /// since diagnostics must still be produced for malformed input.
    #[inline]
    pub fn resolve(&self, id: StringId) -> &str {
        self.try_resolve(id).unwrap_or("<unknown>")
    }

    #[inline]
    pub fn try_resolve(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(|s| s.as_ref())
    }

    /// Check if a string is already interned without interning it.
    #[inline]
    pub fn get_existing(&self, s: &str) -> Option<StringId> {
        self.string_to_id.get(s).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
