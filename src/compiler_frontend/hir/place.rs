//! HIR Place model
//!
//! Represents precise memory locations for borrow checking and move analysis.
//! A place is a root local extended by field, index and dereference projections.
//! Places are the unit of ownership and borrowing for every analysis in the checker.

use crate::compiler_frontend::hir::hir_datatypes::{TypeContext, TypeId};
use crate::compiler_frontend::hir::hir_nodes::{HirFunction, LocalId};
use crate::compiler_frontend::string_interning::{StringId, StringTable};
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A Place represents a precise logical memory location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Place {
    pub root: LocalId,
    pub projections: Vec<Projection>,
}

/// A single projection step in a place access chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Projection {
    /// Field access (.field)
    Field(StringId),

    /// Index access ([index])
    Index(IndexKind),

    /// Dereference (*)
    Deref,
}

/// Index access patterns for borrow checking analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum IndexKind {
    /// Constant index (e.g., arr[3])
    Constant(u32),

    /// Dynamic index (e.g., arr[i]) - conservative analysis
    Dynamic,
}

/// How two access paths relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceRelation {
    /// The paths diverge at some projection step.
    Disjoint,

    /// Same length and every step may name the same location.
    Equal,

    /// The left path is a strict prefix of the right one (it contains it).
    Contains,

    /// The right path is a strict prefix of the left one.
    ContainedBy,
}

impl PlaceRelation {
    pub fn overlaps(self) -> bool {
        !matches!(self, PlaceRelation::Disjoint)
    }
}

impl Place {
    /// Create a new local place
    pub fn local(root: LocalId) -> Self {
        Self {
            root,
            projections: Vec::new(),
        }
    }

    /// Add a field projection to this place
    pub fn field(mut self, field: StringId) -> Self {
        self.projections.push(Projection::Field(field));
        self
    }

    /// Add an index projection to this place
    pub fn index(mut self, index: IndexKind) -> Self {
        self.projections.push(Projection::Index(index));
        self
    }

    /// Add a dereference projection to this place
    pub fn deref(mut self) -> Self {
        self.projections.push(Projection::Deref);
        self
    }

    pub fn is_whole_local(&self) -> bool {
        self.projections.is_empty()
    }

    /// True when the place is reached through a reference rather than owned storage.
    pub fn has_deref(&self) -> bool {
        self.projections.contains(&Projection::Deref)
    }

    /// The places whose reference value is read to reach this place, outermost first.
    /// `(*(*r).f).g` yields `r` and `(*r).f`.
    pub fn dereferenced_prefixes(&self) -> Vec<Place> {
        self.projections
            .iter()
            .enumerate()
            .filter(|(_, projection)| matches!(projection, Projection::Deref))
            .map(|(index, _)| Place {
                root: self.root,
                projections: self.projections[..index].to_vec(),
            })
            .collect()
    }

    /// Check how this place relates to another.
    ///
    /// Places with different roots never overlap. Otherwise the projections are compared
    /// pairwise over the common prefix.
    pub fn relation_to(&self, other: &Place) -> PlaceRelation {
        if self.root != other.root {
            return PlaceRelation::Disjoint;
        }

        relate_projections(&self.projections, &other.projections)
    }

    /// Check if this place overlaps with another place
    pub fn overlaps_with(&self, other: &Place) -> bool {
        self.relation_to(other).overlaps()
    }

    pub fn is_disjoint_from(&self, other: &Place) -> bool {
        !self.overlaps_with(other)
    }

    /// Resolves the type of the location this place names.
    /// Returns None if a projection does not fit the type it is applied to.
    pub fn type_in(&self, function: &HirFunction, types: &TypeContext) -> Option<TypeId> {
        let mut current = function.local_type(self.root)?;

        for projection in &self.projections {
            current = match projection {
                Projection::Field(name) => types.field_type(current, *name)?,
                Projection::Index(_) => types.element_type(current)?,
                Projection::Deref => types.pointee(current)?.1,
            };
        }

        Some(current)
    }

    /// Display place with resolved local and field names
    pub fn display(&self, function: &HirFunction, string_table: &StringTable) -> String {
        let mut result = match function.local(self.root) {
            Some(local) => string_table.resolve(local.name).to_owned(),
            None => format!("{}", self.root),
        };

        let mut last_was_deref = false;
        for projection in &self.projections {
            match projection {
                Projection::Deref => {
                    result = format!("*{result}");
                    last_was_deref = true;
                    continue;
                }
                Projection::Field(name) => {
                    if last_was_deref {
                        result = format!("({result})");
                    }
                    result.push('.');
                    result.push_str(string_table.resolve(*name));
                }
                Projection::Index(index) => {
                    if last_was_deref {
                        result = format!("({result})");
                    }
                    result.push_str(&index.to_string());
                }
            }
            last_was_deref = false;
        }

        result
    }
}

impl From<LocalId> for Place {
    fn from(local: LocalId) -> Self {
        Place::local(local)
    }
}

/// Compares two projection paths that share a root.
pub fn relate_projections(left: &[Projection], right: &[Projection]) -> PlaceRelation {
    let common = left.len().min(right.len());

    for index in 0..common {
        if !left[index].overlaps_with(&right[index]) {
            return PlaceRelation::Disjoint;
        }
    }

    match left.len().cmp(&right.len()) {
        std::cmp::Ordering::Equal => PlaceRelation::Equal,
        std::cmp::Ordering::Less => PlaceRelation::Contains,
        std::cmp::Ordering::Greater => PlaceRelation::ContainedBy,
    }
}

impl Projection {
    /// Check if this projection overlaps with another
    fn overlaps_with(&self, other: &Projection) -> bool {
        match (self, other) {
            // Field accesses overlap only if same field
            (Projection::Field(a), Projection::Field(b)) => a == b,

            (Projection::Index(a), Projection::Index(b)) => a.overlaps_with(b),

            // Dereferences always overlap
            (Projection::Deref, Projection::Deref) => true,

            // Type-checked paths never mix projection kinds at the same depth.
            // Treat a mismatch as overlapping rather than guessing disjointness.
            _ => true,
        }
    }
}

impl IndexKind {
    fn overlaps_with(&self, other: &IndexKind) -> bool {
        match (self, other) {
            (IndexKind::Constant(a), IndexKind::Constant(b)) => a == b,

            // Dynamic indices conservatively overlap with everything
            (IndexKind::Dynamic, _) | (_, IndexKind::Dynamic) => true,
        }
    }
}

impl Display for IndexKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            IndexKind::Constant(index) => write!(f, "[{index}]"),
            IndexKind::Dynamic => write!(f, "[_]"),
        }
    }
}

impl Display for Place {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        // Shows raw ids. Use display() for resolved names.
        write!(f, "{}", self.root)?;
        for projection in &self.projections {
            match projection {
                Projection::Field(name) => write!(f, ".{}", name.as_u32())?,
                Projection::Index(index) => write!(f, "{index}")?,
                Projection::Deref => write!(f, ".*")?,
            }
        }
        Ok(())
    }
}
